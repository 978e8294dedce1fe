mod chunk_store;
mod coordinator;

#[rustfmt::skip]
pub use {
    chunk_store::*,
    coordinator::*,
};
