use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::RemoteError;

/// Build the HTTP client shared by every outbound call of a component.
///
/// `timeout` bounds each request end to end, so a hung remote can't stall the
/// polling loop.
pub fn build_http_client(
    timeout: Duration,
    accept_invalid_certs: bool,
) -> Result<reqwest::Client, RemoteError> {
    if accept_invalid_certs {
        tracing::warn!("TLS certificate validation disabled for control-plane calls");
    }

    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .user_agent(concat!("platform-herald/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RemoteError::transport("build_http_client", e))
}

/// Read a response body and decode it as JSON.
///
/// Non-2xx responses become `RemoteError::Status` with the body attached.
pub async fn decode_response<T: DeserializeOwned>(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<T, RemoteError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| RemoteError::transport(operation, e))?;

    if !status.is_success() {
        return Err(RemoteError::Status {
            operation,
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| RemoteError::decode(operation, e))
}
