//! HTTP liveness probe.

use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::time::Duration;

use super::ProbeError;

pub const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Client for probing home-lab services.
///
/// Follows redirects and accepts self-signed certificates.
pub fn liveness_client(timeout: Duration) -> Result<reqwest::Client, ProbeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(Policy::limited(10))
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| ProbeError::Network(e.to_string()))
}

/// Run an HTTP probe against the given address and return the final status code.
pub async fn run_http_probe(client: &reqwest::Client, address: &str) -> Result<StatusCode, ProbeError> {
    let url = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let response = client.get(&url).send().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(HTTP_PROBE_TIMEOUT)
        } else {
            ProbeError::Network(e.to_string())
        }
    })?;

    Ok(response.status())
}
