mod engine;
mod files;
mod m3u;
mod traits;
mod types;


pub(crate) use engine::*;
pub(crate) use traits::*;
pub(crate) use types::*;
