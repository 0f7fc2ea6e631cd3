use chrono::Utc;
use sha2::{Digest, Sha256};

/// Current Unix time in seconds, with sub-second precision
pub fn get_current_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Cache keys are `<prefix>_<key>`
pub fn format_cache_key(prefix: &str, key: &str) -> String {
    format!("{}_{}", prefix, key)
}

/// Generate a secure token for form protection.
///
/// Hex-encoded SHA-256 of the current time and 16 random bytes.
pub fn generate_secure_token() -> String {
    let mut hasher = Sha256::new();
    hasher.update(get_current_timestamp().to_string().as_bytes());
    hasher.update(rand::random::<[u8; 16]>());
    format!("{:x}", hasher.finalize())
}
