//! HttpTransport trait - Abstraction over the HTTP client.
//!
//! The GitHub store only needs GET and PUT with custom headers, so that
//! is all the trait exposes. Tests substitute a recording fake; the real
//! implementation wraps a blocking reqwest client.

use crate::error::SyncError;

/// A completed HTTP exchange.
///
/// Non-2xx statuses are ordinary responses here; only failures below the
/// HTTP layer (DNS, TLS, resets) surface as [`SyncError::Transport`].
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw response body
    pub body: String,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal HTTP capability the sync store depends on.
pub trait HttpTransport: Send + Sync {
    /// Perform a GET request.
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, SyncError>;

    /// Perform a PUT request with a JSON body.
    fn put(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: String,
    ) -> Result<HttpResponse, SyncError>;
}

/// Blocking reqwest implementation.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Create a transport with default client settings.
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }

    fn read_response(response: reqwest::blocking::Response) -> Result<HttpResponse, SyncError> {
        let status = response.status().as_u16();
        let body = response.text().map_err(SyncError::transport)?;
        Ok(HttpResponse { status, body })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, SyncError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().map_err(SyncError::transport)?;
        Self::read_response(response)
    }

    fn put(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: String,
    ) -> Result<HttpResponse, SyncError> {
        let mut request = self.client.put(url).header("Content-Type", "application/json");
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.body(body).send().map_err(SyncError::transport)?;
        Self::read_response(response)
    }
}
