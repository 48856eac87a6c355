// Idempotency cache entry

use serde::{Deserialize, Serialize};

/// Cached prior response for an idempotency key
///
/// Created on the first 2xx response for a key, read-only afterward
/// until expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub status_code: u16,
    pub body: String,
    pub content_type: String,
    /// Hex SHA-256 of the original raw request payload
    pub request_hash: String,
    pub created_at: i64, // epoch ms
    pub expires_at: i64,
}

impl IdempotencyRecord {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry() {
        let record = IdempotencyRecord {
            key: "k".into(),
            status_code: 201,
            body: "{}".into(),
            content_type: "application/json".into(),
            request_hash: "abc".into(),
            created_at: 1000,
            expires_at: 2000,
        };
        assert!(!record.is_expired(1999));
        assert!(record.is_expired(2000));
    }
}
