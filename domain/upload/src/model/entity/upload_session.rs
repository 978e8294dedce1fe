use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::vo::{HashAlgorithm, UploadStatus};

/// One logical file transfer, grouping all fragments sharing an upload key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub upload_key: String,
    /// Declared by the first fragment, immutable afterwards.
    pub total_fragments: u64,
    /// Indices stored so far.
    pub received: BTreeSet<u64>,
    /// Declared whole-file hash, upper case.
    pub hash: Option<String>,
    pub hash_algorithm: HashAlgorithm,
    pub status: UploadStatus,
    /// Where the assembled file was published, once done.
    pub artifact: Option<PathBuf>,
    pub last_update_timestamp: i64,
}

impl UploadSession {
    pub fn new(upload_key: &str, total_fragments: u64, hash: Option<String>) -> Self {
        Self {
            upload_key: upload_key.to_owned(),
            total_fragments,
            received: BTreeSet::new(),
            hash,
            hash_algorithm: HashAlgorithm::Blake3,
            status: UploadStatus::Receiving,
            artifact: None,
            last_update_timestamp: chrono::Utc::now().timestamp_micros(),
        }
    }

    /// Records a stored fragment. Returns false for a repeated index.
    pub fn mark_received(&mut self, index: u64) -> bool {
        self.last_update_timestamp = chrono::Utc::now().timestamp_micros();
        self.received.insert(index)
    }

    pub fn received_count(&self) -> u64 {
        self.received.len() as u64
    }

    pub fn is_complete(&self) -> bool {
        self.received_count() == self.total_fragments
    }

    /// Indices not stored yet, ascending. Lazy, callers take what they need.
    pub fn missing(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.total_fragments).filter(|n| !self.received.contains(n))
    }

    pub fn missing_count(&self) -> u64 {
        self.total_fragments - self.received_count()
    }

    pub fn set_status(&mut self, status: UploadStatus) {
        self.status = status;
        self.last_update_timestamp = chrono::Utc::now().timestamp_micros();
    }
}
