pub mod config;
pub mod convert;
pub mod inspect;
pub mod pipeline;
pub mod sheet;
pub mod upload;
pub mod write;

#[cfg(test)]
pub(crate) mod testutil;
