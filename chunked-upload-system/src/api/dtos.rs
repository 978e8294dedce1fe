use std::path::PathBuf;

use actix_easy_multipart::{tempfile::Tempfile, text::Text, MultipartForm};
use domain_upload::model::{entity::UploadSession, vo::UploadStatus};
use serde::Serialize;

#[derive(MultipartForm)]
pub struct PartialUploadRequest {
    pub upload_key: Text<String>,
    pub index: Text<u64>,
    pub total_fragments: Text<u64>,
    pub hash: Option<Text<String>>,
    pub bin: Vec<Tempfile>,
}

/// Most missing indices listed in one info response.
pub const MISSING_LISTED: usize = 1000;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialUploadInfoResponse {
    pub upload_key: String,
    pub total_fragments: u64,
    pub received: Vec<u64>,
    /// The lowest missing indices, at most `MISSING_LISTED` of them.
    pub missing: Vec<u64>,
    pub missing_count: u64,
    pub status: UploadStatus,
    pub hash: Option<String>,
    pub location: Option<PathBuf>,
}

impl From<UploadSession> for PartialUploadInfoResponse {
    fn from(session: UploadSession) -> Self {
        Self {
            missing: session.missing().take(MISSING_LISTED).collect(),
            missing_count: session.missing_count(),
            received: session.received.into_iter().collect(),
            upload_key: session.upload_key,
            total_fragments: session.total_fragments,
            status: session.status,
            hash: session.hash,
            location: session.artifact,
        }
    }
}
