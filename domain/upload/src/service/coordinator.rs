use async_trait::async_trait;

use crate::command::ReceiveFragmentCommand;
use crate::exception::UploadResult;
use crate::model::entity::UploadSession;
use crate::model::vo::UploadProgress;

/// # Upload coordinator
///
/// Accepts fragments one at a time, tracks which indices of each upload have
/// been stored, and reassembles the file in index order on the fragment that
/// completes the set. Fragments of one upload may arrive in any order and
/// concurrently; reassembly happens at most once per session.
#[async_trait]
pub trait UploadCoordinatorService: Send + Sync {
    /// Handles one fragment.
    ///
    /// Returns `Completed` with the assembled file's location for the
    /// fragment that completes the upload and for any fragment arriving
    /// after that, `Accepted` otherwise.
    async fn receive_fragment(&self, cmd: ReceiveFragmentCommand) -> UploadResult<UploadProgress>;

    /// Get upload session info.
    async fn info(&self, upload_key: &str) -> UploadResult<UploadSession>;

    /// Forget an upload session.
    ///
    /// It will remove the scratch namespace and the in-memory session.
    async fn remove(&self, upload_key: &str) -> UploadResult<()>;
}
