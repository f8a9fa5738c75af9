//! HTTP Client Factory
//!
//! Provides a factory function for building reqwest clients with a shared
//! timeout policy.

use std::time::Duration;

/// Build a `reqwest::Client` with the given request timeout.
///
/// Providers share one client per instance; connection pooling is handled by
/// reqwest internally.
pub fn build_http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .expect("failed to build reqwest client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let _client = build_http_client(30);
    }
}
