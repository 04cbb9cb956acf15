//! Probe execution
//!
//! One probe checks one service and always returns a normalized result.
//! Every failure mode (transport error, timeout, unexpected status) is
//! encoded in the result so a broken service can never abort a cycle.

use crate::config::ServiceDefinition;
use crate::errors::{MonitorError, Result};
use crate::health::OFFLINE_SENTINEL_MS;
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Normalized outcome of a single probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub alive: bool,
    pub latency_ms: f64,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn up(latency_ms: f64) -> Self {
        Self {
            alive: true,
            latency_ms,
            error: None,
        }
    }

    pub fn down(latency_ms: f64, error: String) -> Self {
        Self {
            alive: false,
            latency_ms,
            error: Some(error),
        }
    }

    pub fn offline(error: String) -> Self {
        Self::down(OFFLINE_SENTINEL_MS, error)
    }
}

/// Probe seam. The engine only depends on this contract, so tests can
/// script outcomes and alternative transports can be plugged in.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, service: &ServiceDefinition) -> ProbeResult;
}

/// Default prober: HTTP(S) request for URL endpoints, TCP reachability
/// check for bare hosts.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    default_timeout_ms: u64,
}

impl HttpProber {
    pub fn new(default_timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("statuswatch/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(MonitorError::Http)?;

        Ok(Self {
            client,
            default_timeout_ms,
        })
    }

    async fn probe_http(&self, service: &ServiceDefinition) -> ProbeResult {
        let method = service
            .method
            .as_deref()
            .and_then(|m| m.parse::<Method>().ok())
            .unwrap_or(Method::GET);

        let started = Instant::now();
        let response = self
            .client
            .request(method, &service.endpoint)
            .timeout(service.timeout(self.default_timeout_ms))
            .send()
            .await;

        match response {
            Ok(response) => {
                let latency_ms = started.elapsed().as_millis() as f64;
                let code = response.status().as_u16();

                if service.accepts_status(code) {
                    ProbeResult::up(latency_ms)
                } else {
                    ProbeResult::down(latency_ms, format!("unexpected status code: {}", code))
                }
            }
            Err(err) => ProbeResult::offline(err.to_string()),
        }
    }

    async fn probe_host(&self, service: &ServiceDefinition) -> ProbeResult {
        // Bare hostnames get a TCP reachability check; raw-socket ICMP would
        // need elevated privileges.
        let target = if service.endpoint.contains(':') {
            service.endpoint.clone()
        } else {
            format!("{}:80", service.endpoint)
        };

        let started = Instant::now();
        match timeout(
            service.timeout(self.default_timeout_ms),
            TcpStream::connect(&target),
        )
        .await
        {
            Ok(Ok(_)) => ProbeResult::up(started.elapsed().as_millis() as f64),
            Ok(Err(err)) => ProbeResult::offline(err.to_string()),
            Err(_) => ProbeResult::offline(format!("connect timeout to {}", target)),
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, service: &ServiceDefinition) -> ProbeResult {
        let result = if service.is_http() {
            self.probe_http(service).await
        } else {
            self.probe_host(service).await
        };

        debug!(
            service = %service.name,
            alive = result.alive,
            latency_ms = result.latency_ms,
            "probe completed"
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_for(url: String) -> ServiceDefinition {
        ServiceDefinition {
            name: "test".to_string(),
            endpoint: url,
            method: None,
            timeout_ms: None,
            expected_status: None,
            category: None,
        }
    }

    #[tokio::test]
    async fn test_http_probe_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let prober = HttpProber::new(5_000).unwrap();
        let service = service_for(format!("{}/health", server.uri()));

        let result = prober.probe(&service).await;

        assert!(result.alive);
        assert!(result.latency_ms < OFFLINE_SENTINEL_MS);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_http_probe_unexpected_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let prober = HttpProber::new(5_000).unwrap();
        let service = service_for(server.uri());

        let result = prober.probe(&service).await;

        assert!(!result.alive);
        assert_eq!(
            result.error.as_deref(),
            Some("unexpected status code: 503")
        );
    }

    #[tokio::test]
    async fn test_http_probe_accepts_configured_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let prober = HttpProber::new(5_000).unwrap();
        let mut service = service_for(server.uri());
        service.expected_status = Some(vec![200, 204]);

        let result = prober.probe(&service).await;
        assert!(result.alive);
    }

    #[tokio::test]
    async fn test_http_probe_connection_refused_is_offline() {
        // Port reserved by the mock server then dropped, nothing listens.
        // Must be a non-pooled server: pooled `MockServer::start()` servers
        // keep listening after drop, so the port would still answer.
        let server = MockServer::builder().start().await;
        let url = server.uri();
        drop(server);

        let prober = HttpProber::new(500).unwrap();
        let service = service_for(url);

        let result = prober.probe(&service).await;

        assert!(!result.alive);
        assert_eq!(result.latency_ms, OFFLINE_SENTINEL_MS);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_tcp_probe_unreachable_host() {
        let prober = HttpProber::new(200).unwrap();
        // RFC 5737 TEST-NET address, guaranteed unroutable
        let service = service_for("192.0.2.1:80".to_string());

        let result = prober.probe(&service).await;

        assert!(!result.alive);
        assert_eq!(result.latency_ms, OFFLINE_SENTINEL_MS);
    }

    #[tokio::test]
    async fn test_probe_timeout_encoded_in_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(2)))
            .mount(&server)
            .await;

        let prober = HttpProber::new(5_000).unwrap();
        let mut service = service_for(server.uri());
        service.timeout_ms = Some(100);

        let result = prober.probe(&service).await;

        assert!(!result.alive);
        assert_eq!(result.latency_ms, OFFLINE_SENTINEL_MS);
    }
}
