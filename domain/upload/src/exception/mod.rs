pub type UploadResult<T> = Result<T, UploadException>;

#[derive(Debug, thiserror::Error)]
pub enum UploadException {
    #[error("Fragment {index:?} of upload: {upload_key} is invalid: {reason}.")]
    InvalidFragment {
        upload_key: String,
        index: Option<u64>,
        reason: String,
    },

    #[error("Storing fragment {index} of upload: {upload_key} failed: {source}")]
    Storage {
        upload_key: String,
        index: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("Upload: {upload_key} claims to be complete but fragment {index} is missing.")]
    MissingFragment { upload_key: String, index: u64 },

    #[error("Writing the assembled file of upload: {upload_key} failed: {source}")]
    AssemblyWrite {
        upload_key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "Upload: {upload_key}'s assembled hash: {completed_hash} is unmatched with provided hash: {provided_hash}."
    )]
    UnmatchedHash {
        upload_key: String,
        provided_hash: String,
        completed_hash: String,
    },

    #[error("The upload session: {upload_key} can't be found.")]
    SessionNotFound { upload_key: String },

    #[error("Upload internal error: {source}")]
    InternalError {
        #[source]
        source: anyhow::Error,
    },
}

impl UploadException {
    /// Stable numeric code reported to callers next to the message.
    pub fn status(&self) -> i32 {
        match self {
            UploadException::InvalidFragment { .. } => 110,
            UploadException::Storage { .. } => 111,
            UploadException::MissingFragment { .. } => 112,
            UploadException::AssemblyWrite { .. } => 113,
            UploadException::UnmatchedHash { .. } => 114,
            UploadException::SessionNotFound { .. } => 115,
            UploadException::InternalError { .. } => 500,
        }
    }

    /// Whether resending the same fragment may succeed.
    ///
    /// Invalid metadata has to be corrected before a retry makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadException::Storage { .. }
                | UploadException::MissingFragment { .. }
                | UploadException::AssemblyWrite { .. }
                | UploadException::UnmatchedHash { .. }
        )
    }

    /// The upload key this error concerns, if any.
    pub fn upload_key(&self) -> Option<&str> {
        match self {
            UploadException::InvalidFragment { upload_key, .. }
            | UploadException::Storage { upload_key, .. }
            | UploadException::MissingFragment { upload_key, .. }
            | UploadException::AssemblyWrite { upload_key, .. }
            | UploadException::UnmatchedHash { upload_key, .. }
            | UploadException::SessionNotFound { upload_key } => Some(upload_key),
            UploadException::InternalError { .. } => None,
        }
    }

    pub fn invalid(upload_key: &str, index: Option<u64>, reason: impl Into<String>) -> Self {
        UploadException::InvalidFragment {
            upload_key: upload_key.to_owned(),
            index,
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for UploadException {
    fn from(e: anyhow::Error) -> Self {
        UploadException::InternalError { source: e }
    }
}
