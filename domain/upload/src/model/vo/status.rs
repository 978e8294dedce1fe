use serde::{Deserialize, Serialize};

/// Lifecycle of an upload session.
///
/// `Failed` accepts fragments again, so resending the implicated fragment
/// retriggers reassembly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    #[default]
    Receiving,
    Complete,
    Reassembling,
    Done,
    Failed,
}

impl UploadStatus {
    pub fn accepts_fragments(&self) -> bool {
        matches!(self, UploadStatus::Receiving | UploadStatus::Failed)
    }
}
