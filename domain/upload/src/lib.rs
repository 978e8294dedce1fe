//! Domain of chunked uploads: a file arrives as independently transmitted,
//! index-addressed fragments and is reassembled once every fragment is stored.

pub mod command;
pub mod exception;
#[cfg(feature = "mock")]
pub mod mock;
pub mod model;
pub mod service;
