use sha2::{Digest, Sha256};

/// Hash a bearer token the way it is stored in `session_token` (SHA-256 hex).
pub fn hash_access_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let out = hasher.finalize();
    hex::encode(out)
}
