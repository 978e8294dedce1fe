use serde::{Deserialize, Serialize};

use crate::exception::{UploadException, UploadResult};

/// Longest upload key accepted, in bytes.
pub const MAX_UPLOAD_KEY_LEN: usize = 255;

/// Largest fragment count one upload may declare.
pub const MAX_TOTAL_FRAGMENTS: u64 = 1 << 20;

/// One inbound fragment together with the metadata describing its upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveFragmentCommand {
    /// Caller supplied stable name of the target file.
    pub upload_key: String,
    /// Position of the fragment, `0 <= index < total_fragments`.
    pub index: u64,
    /// Declared fragment count of the whole upload.
    pub total_fragments: u64,
    /// Optional BLAKE3 digest of the whole file, hex encoded.
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

impl ReceiveFragmentCommand {
    /// Checks everything that can be checked without looking at the session.
    pub fn validate(&self) -> UploadResult<()> {
        validate_upload_key(&self.upload_key)?;
        let invalid = |reason: &str| {
            UploadException::invalid(&self.upload_key, Some(self.index), reason)
        };
        if self.total_fragments == 0 {
            return Err(invalid("total fragments must be at least 1"));
        }
        if self.total_fragments > MAX_TOTAL_FRAGMENTS {
            return Err(invalid(&format!(
                "total fragments can't exceed {MAX_TOTAL_FRAGMENTS}"
            )));
        }
        if self.index >= self.total_fragments {
            return Err(invalid(&format!(
                "index is out of range for {} fragments",
                self.total_fragments
            )));
        }
        if self.payload.is_empty() {
            return Err(invalid("payload is empty"));
        }
        if let Some(hash) = &self.hash {
            if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid("hash must be a hex string"));
            }
        }
        Ok(())
    }

    /// Declared hash in its canonical upper-case form.
    pub fn normalized_hash(&self) -> Option<String> {
        self.hash.as_ref().map(|h| h.to_uppercase())
    }
}

/// An upload key names both the scratch namespace and the assembled file,
/// so it has to be a single plain path component.
pub fn validate_upload_key(upload_key: &str) -> UploadResult<()> {
    let reason = if upload_key.is_empty() {
        "upload key is empty"
    } else if upload_key.len() > MAX_UPLOAD_KEY_LEN {
        "upload key is too long"
    } else if upload_key == "." || upload_key == ".." {
        "upload key can't be a relative directory"
    } else if upload_key.contains(['/', '\\', '\0']) {
        "upload key can't contain path separators"
    } else {
        return Ok(());
    };
    Err(UploadException::invalid(upload_key, None, reason))
}
