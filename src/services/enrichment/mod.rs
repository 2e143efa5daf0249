mod pipeline;
mod summary;
mod traits;

#[cfg(test)]
mod pipeline_tests;

pub(crate) use pipeline::*;
pub(crate) use traits::*;
