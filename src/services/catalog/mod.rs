mod batch_fetcher;
mod cache;
mod extended;
mod in_flight;
mod traits;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub(crate) use batch_fetcher::*;
pub(crate) use cache::*;
pub(crate) use extended::*;
pub(crate) use in_flight::*;
pub(crate) use traits::*;
pub(crate) use types::*;
