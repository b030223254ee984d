//! Reachability probe run before the app opens its socket.

use std::time::Duration;

use gruzreis_shared::ApiError;
use reqwest::Client;

const HEALTH_PATH: &str = "api/health";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

fn health_url(base_url: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), HEALTH_PATH)
}

/// `GET {base_url}/api/health`; any 2xx means the server is up.
pub async fn check_server(base_url: &str) -> Result<(), ApiError> {
    let url = health_url(base_url);
    let client = Client::builder()
        .timeout(HEALTH_TIMEOUT)
        .build()
        .map_err(|e| ApiError::Network(e.to_string()))?;

    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ApiError::Network(e.to_string()))?;

    let status = resp.status();
    if status.is_success() {
        crate::log_debug!("Health check {} -> {}", url, status);
        return Ok(());
    }

    let body = resp
        .text()
        .await
        .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;
    Err(ApiError::Http {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_url_joins_cleanly() {
        assert_eq!(health_url("https://gruzreis.ru"), "https://gruzreis.ru/api/health");
        assert_eq!(health_url("https://gruzreis.ru/"), "https://gruzreis.ru/api/health");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let result = check_server("http://127.0.0.1:1").await;
        assert!(matches!(result, Err(ApiError::Network(_))));
    }
}
