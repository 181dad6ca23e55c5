use axum::http::{header::HeaderName, HeaderValue, Method};
use log::info;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::core::config::ServerConfig;

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<Method>,
    pub allowed_headers: Vec<String>,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ],
            allowed_headers: vec![
                "Content-Type".to_string(),
                "Authorization".to_string(),
                "Accept".to_string(),
                "X-Webhook-Secret".to_string(),
            ],
            max_age_secs: 3600,
        }
    }
}

impl CorsConfig {
    pub fn from_server(server: &ServerConfig) -> Self {
        Self::default().with_origins(server.cors_allowed_origins.clone())
    }

    pub fn with_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    /// Explicit origins get credentialed CORS. Without any, every well-formed
    /// http(s) origin is accepted and credentials stay off.
    pub fn build(self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        let headers: Vec<HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();

        let cors = CorsLayer::new()
            .allow_methods(self.allowed_methods)
            .allow_headers(headers)
            .max_age(Duration::from_secs(self.max_age_secs));

        if origins.is_empty() {
            cors.allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
                origin.to_str().map(is_valid_origin_format).unwrap_or(false)
            }))
        } else {
            info!("CORS restricted to {} origins", origins.len());
            cors.allow_origin(origins).allow_credentials(true)
        }
    }
}

pub fn create_cors_layer(server: &ServerConfig) -> CorsLayer {
    CorsConfig::from_server(server).build()
}

fn is_valid_origin_format(origin: &str) -> bool {
    let Some(host) = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
    else {
        return false;
    };
    if host.is_empty() || host.contains('/') || host.contains("..") {
        return false;
    }

    let lower = origin.to_lowercase();
    !["<script", "javascript:", "data:", "%3c", "%3e"]
        .iter()
        .any(|pattern| lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_format() {
        assert!(is_valid_origin_format("https://app.example.com"));
        assert!(is_valid_origin_format("http://localhost:3000"));
        assert!(!is_valid_origin_format("ftp://example.com"));
        assert!(!is_valid_origin_format("https://"));
        assert!(!is_valid_origin_format("https://evil.com/path"));
        assert!(!is_valid_origin_format("http://a..b"));
    }
}
