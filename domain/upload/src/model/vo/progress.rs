use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Caller visible outcome of a successfully handled fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UploadProgress {
    /// Fragment stored, more are expected.
    #[serde(rename_all = "camelCase")]
    Accepted {
        upload_key: String,
        index: u64,
        received: u64,
        total: u64,
    },
    /// Every fragment arrived and the assembled file is in place.
    #[serde(rename_all = "camelCase")]
    Completed {
        upload_key: String,
        location: PathBuf,
    },
}

impl UploadProgress {
    pub fn location(&self) -> Option<&PathBuf> {
        match self {
            UploadProgress::Accepted { .. } => None,
            UploadProgress::Completed { location, .. } => Some(location),
        }
    }
}

/// Completion signal, emitted once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompleted {
    pub upload_key: String,
    pub location: PathBuf,
    /// Size of the assembled file in bytes.
    pub size: u64,
    /// Upper-case BLAKE3 digest of the assembled file.
    pub hash: String,
}
