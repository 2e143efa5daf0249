mod scheduler;

pub(crate) use scheduler::*;
