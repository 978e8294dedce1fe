use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::exception::UploadResult;

/// Fragment payloads of one upload, yielded strictly in index order.
pub type OrderedFragments = BoxStream<'static, UploadResult<Vec<u8>>>;

/// # Chunk store
///
/// Scratch storage of fragments keyed by `(upload_key, index)`. It has no
/// notion of sequencing and never touches the assembled file's destination.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Durably stores a fragment, creating the upload's namespace on first use.
    ///
    /// Storing an index again replaces its previous content.
    async fn put(&self, upload_key: &str, index: u64, payload: Vec<u8>) -> UploadResult<()>;

    /// Yields fragments `0..total_fragments` in order.
    ///
    /// Fails with `MissingFragment` before yielding anything when an index is absent.
    async fn read_ordered(
        &self,
        upload_key: &str,
        total_fragments: u64,
    ) -> UploadResult<OrderedFragments>;

    /// Removes the upload's namespace. A missing namespace is not an error.
    async fn purge(&self, upload_key: &str) -> UploadResult<()>;

    async fn has_namespace(&self, upload_key: &str) -> UploadResult<bool>;
}
