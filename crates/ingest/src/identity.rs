use sha2::{Digest, Sha256};

/// Stable identity token for a file's byte content: lowercase hex SHA-256.
///
/// The same token is embedded into generated documents, so changing the
/// digest or its encoding invalidates every existing marker.
pub fn compute(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
