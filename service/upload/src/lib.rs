mod coordinator;
mod local_chunk_store;

#[rustfmt::skip]
pub use {
    coordinator::UploadCoordinatorImpl,
    local_chunk_store::LocalChunkStoreImpl,
};
