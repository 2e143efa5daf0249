mod command;
mod launcher;
mod supervisor;
mod types;


pub(crate) use launcher::*;
pub(crate) use supervisor::*;
pub(crate) use types::*;
