//! Shared HTTP client instances for the external services

use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

static SHARED_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .unwrap_or_else(|_| Client::new())
});

/// The shared pooled client used by every outbound HTTP integration
pub fn shared_client() -> Client {
    SHARED_CLIENT.clone()
}
