mod client;
mod parser;

pub(crate) use client::*;
