//! HTTP transport.
//!
//! Every network call in the crate goes through [`Transport`], so the cascade
//! can be driven by an in-memory implementation in tests.

use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::{DemError, Result};

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

const USER_AGENT: &str = concat!("regiondem/", env!("CARGO_PKG_VERSION"));

/// A completed HTTP exchange. Non-success statuses are returned, not raised.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Response body as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Blocking HTTP GET.
///
/// Implementations return `Err` only when no response was received
/// (connection failure, timeout, TLS). Any status code is an `Ok`.
pub trait Transport {
    /// Issue a GET for `url` with the given query pairs.
    fn get(&self, url: &str, query: &[(&str, &str)], timeout: Duration) -> Result<HttpResponse>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str, query: &[(&str, &str)], timeout: Duration) -> Result<HttpResponse> {
        (**self).get(url, query, timeout)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn get(&self, url: &str, query: &[(&str, &str)], timeout: Duration) -> Result<HttpResponse> {
        (**self).get(url, query, timeout)
    }
}

/// [`Transport`] backed by a blocking `reqwest` client.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a transport whose client-level timeout is `timeout`.
    ///
    /// Per-request timeouts passed to [`Transport::get`] override it.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DemError::Http {
                url: String::new(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, query: &[(&str, &str)], timeout: Duration) -> Result<HttpResponse> {
        tracing::debug!(url, ?query, "GET");

        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .map_err(|e| DemError::Http {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| DemError::Http {
            url: url.to_string(),
            reason: format!("Failed to read body: {}", e),
        })?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Issue a GET and turn a non-success status into [`DemError::SourceUnreachable`].
pub(crate) fn get_ok<T: Transport + ?Sized>(
    transport: &T,
    source_name: &str,
    url: &str,
    query: &[(&str, &str)],
    timeout: Duration,
) -> Result<Vec<u8>> {
    let response = transport.get(url, query, timeout).map_err(|e| match e {
        DemError::Http { reason, .. } => DemError::unreachable(source_name, reason),
        other => other,
    })?;
    if !response.is_success() {
        return Err(DemError::unreachable(
            source_name,
            format!("HTTP {} from {}", response.status, url),
        ));
    }
    Ok(response.body)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(u16);

    impl Transport for Fixed {
        fn get(&self, _: &str, _: &[(&str, &str)], _: Duration) -> Result<HttpResponse> {
            Ok(HttpResponse {
                status: self.0,
                body: b"payload".to_vec(),
            })
        }
    }

    struct Offline;

    impl Transport for Offline {
        fn get(&self, url: &str, _: &[(&str, &str)], _: Duration) -> Result<HttpResponse> {
            Err(DemError::Http {
                url: url.to_string(),
                reason: "connection refused".into(),
            })
        }
    }

    #[test]
    fn test_get_ok_success() {
        let body = get_ok(&Fixed(200), "mirror", "http://x", &[], Duration::from_secs(1)).unwrap();
        assert_eq!(body, b"payload");
    }

    #[test]
    fn test_get_ok_status_is_unreachable() {
        let err = get_ok(&Fixed(500), "admin", "http://x", &[], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DemError::SourceUnreachable { .. }));
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_get_ok_network_error_is_unreachable() {
        let err = get_ok(&Offline, "admin", "http://x", &[], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DemError::SourceUnreachable { .. }));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_boxed_transport() {
        let boxed: Box<dyn Transport> = Box::new(Fixed(204));
        let response = boxed.get("http://x", &[], Duration::from_secs(1)).unwrap();
        assert!(response.is_success());
        assert_eq!(response.text(), "payload");
    }
}
