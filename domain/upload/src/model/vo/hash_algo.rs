use serde::{Deserialize, Serialize};

/// Algorithm of the declared whole-file hash.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[default]
    Blake3,
}
