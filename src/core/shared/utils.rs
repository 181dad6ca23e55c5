use diesel::{
    r2d2::{ConnectionManager, Pool},
    PgConnection,
};
use rand::Rng;

use crate::core::config::DatabaseConfig;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_conn(config: &DatabaseConfig) -> Result<DbPool, diesel::r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(config.url.clone());
    Pool::builder()
        .max_size(config.max_connections.max(1))
        .build(manager)
}

/// 16 random bytes, hex encoded. Public identifier of a webhook dataset.
pub fn generate_webhook_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    hex::encode(bytes)
}

/// 32 random bytes, hex encoded.
pub fn generate_webhook_secret() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// First address of `X-Forwarded-For`, if present.
pub fn forwarded_client_ip(value: &str) -> Option<String> {
    value
        .split(',')
        .next()
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_credentials_shape() {
        let id = generate_webhook_id();
        let secret = generate_webhook_secret();
        assert_eq!(id.len(), 32);
        assert_eq!(secret.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_webhook_secret(), secret);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc123", "abc123"));
        assert!(!constant_time_compare("abc123", "abc124"));
        assert!(!constant_time_compare("abc", "abcd"));
    }

    #[test]
    fn test_forwarded_client_ip() {
        assert_eq!(
            forwarded_client_ip("203.0.113.7, 10.0.0.1").as_deref(),
            Some("203.0.113.7")
        );
        assert_eq!(forwarded_client_ip(" "), None);
    }
}
