//! Proxy validation
//!
//! Probes a candidate proxy over HTTP and HTTPS against two fixed echo
//! endpoints and infers protocol support, anonymity level, and latency from
//! the response shape. Probe failure is data, not an error: every timeout,
//! connection failure, bad status, or malformed payload collapses into the
//! unknown/-1 sentinels.

mod echo;

pub use echo::EchoResponse;

use std::time::{Duration, Instant};

use reqwest::{Client, Proxy as UpstreamProxy};
use tracing::{debug, instrument};

use crate::models::{Anonymity, ProbeOutcome, Protocol};

/// Validator configuration
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Timeout budget for each sub-probe
    pub timeout: Duration,
    /// Echo endpoint reachable over plain HTTP
    pub http_echo_url: String,
    /// Echo endpoint reachable over HTTPS
    pub https_echo_url: String,
    /// Number of proxies validated concurrently
    pub workers: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            http_echo_url: "http://httpbin.org/get".to_string(),
            https_echo_url: "https://httpbin.org/get".to_string(),
            workers: 20,
        }
    }
}

/// Result of one protocol-specific sub-probe
#[derive(Debug, Clone, Copy)]
struct SubProbe {
    ok: bool,
    anonymity: Anonymity,
    speed: f64,
}

impl SubProbe {
    fn failed() -> Self {
        Self {
            ok: false,
            anonymity: Anonymity::Unknown,
            speed: -1.0,
        }
    }
}

/// Probes candidate proxies and fills in their validation fields
#[derive(Clone)]
pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Probe a candidate proxy over both schemes.
    ///
    /// The two sub-probes are independent and run concurrently, each with
    /// its own timeout budget; one failing never blocks the other. No
    /// retries: a failed sub-probe is final for this invocation.
    #[instrument(skip(self))]
    pub async fn probe(&self, ip: &str, port: u16) -> ProbeOutcome {
        let proxy_url = format!("http://{}:{}", ip, port);

        let (http, https) = tokio::join!(
            self.sub_probe(&proxy_url, &self.config.http_echo_url),
            self.sub_probe(&proxy_url, &self.config.https_echo_url),
        );

        combine(http, https)
    }

    /// Number of proxies a caller should probe concurrently
    pub fn workers(&self) -> usize {
        self.config.workers.max(1)
    }

    /// Run one sub-probe: a single request through the proxy against one
    /// echo endpoint. Returns the failure sentinel on any error.
    async fn sub_probe(&self, proxy_url: &str, echo_url: &str) -> SubProbe {
        let client = match self.build_client(proxy_url) {
            Ok(client) => client,
            Err(e) => {
                debug!(proxy = proxy_url, error = %e, "Failed to build probe client");
                return SubProbe::failed();
            }
        };

        let start = Instant::now();
        let response = match tokio::time::timeout(self.config.timeout, client.get(echo_url).send())
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!(proxy = proxy_url, url = echo_url, error = %e, "Sub-probe request failed");
                return SubProbe::failed();
            }
            Err(_) => {
                debug!(proxy = proxy_url, url = echo_url, "Sub-probe timed out");
                return SubProbe::failed();
            }
        };

        if !response.status().is_success() {
            debug!(
                proxy = proxy_url,
                url = echo_url,
                status = %response.status(),
                "Sub-probe got non-success status"
            );
            return SubProbe::failed();
        }

        let speed = round_secs(start.elapsed());

        match response.json::<EchoResponse>().await {
            Ok(echo) => SubProbe {
                ok: true,
                anonymity: echo.anonymity(),
                speed,
            },
            Err(e) => {
                debug!(proxy = proxy_url, url = echo_url, error = %e, "Malformed echo payload");
                SubProbe::failed()
            }
        }
    }

    fn build_client(&self, proxy_url: &str) -> reqwest::Result<Client> {
        // All traffic through the candidate, so redirects cannot escape it.
        // The client timeout backstops the outer per-sub-probe timeout and
        // also bounds the body read.
        Client::builder()
            .proxy(UpstreamProxy::all(proxy_url)?)
            .timeout(self.config.timeout)
            .build()
    }
}

/// Combine the two sub-probes into a final outcome.
///
/// Protocol is the union of what succeeded. Anonymity and speed come from
/// the HTTP sub-probe when it succeeded, otherwise the HTTPS one.
fn combine(http: SubProbe, https: SubProbe) -> ProbeOutcome {
    let protocol = match (http.ok, https.ok) {
        (true, true) => Protocol::Both,
        (true, false) => Protocol::Http,
        (false, true) => Protocol::Https,
        (false, false) => Protocol::Unknown,
    };

    let (anonymity, speed) = if http.ok {
        (http.anonymity, http.speed)
    } else if https.ok {
        (https.anonymity, https.speed)
    } else {
        (Anonymity::Unknown, -1.0)
    };

    ProbeOutcome {
        protocol,
        anonymity,
        speed,
    }
}

fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_probe(anonymity: Anonymity, speed: f64) -> SubProbe {
        SubProbe {
            ok: true,
            anonymity,
            speed,
        }
    }

    #[test]
    fn test_combine_both_succeed() {
        let outcome = combine(
            ok_probe(Anonymity::Elite, 0.5),
            ok_probe(Anonymity::Transparent, 1.2),
        );
        assert_eq!(outcome.protocol, Protocol::Both);
        // HTTP result wins ties
        assert_eq!(outcome.anonymity, Anonymity::Elite);
        assert_eq!(outcome.speed, 0.5);
    }

    #[test]
    fn test_combine_http_only() {
        let outcome = combine(ok_probe(Anonymity::Anonymous, 0.8), SubProbe::failed());
        assert_eq!(outcome.protocol, Protocol::Http);
        assert_eq!(outcome.anonymity, Anonymity::Anonymous);
        assert_eq!(outcome.speed, 0.8);
    }

    #[test]
    fn test_combine_https_only() {
        let outcome = combine(SubProbe::failed(), ok_probe(Anonymity::Elite, 2.0));
        assert_eq!(outcome.protocol, Protocol::Https);
        assert_eq!(outcome.anonymity, Anonymity::Elite);
        assert_eq!(outcome.speed, 2.0);
    }

    #[test]
    fn test_combine_neither_succeeds() {
        let outcome = combine(SubProbe::failed(), SubProbe::failed());
        assert_eq!(outcome.protocol, Protocol::Unknown);
        assert_eq!(outcome.anonymity, Anonymity::Unknown);
        assert_eq!(outcome.speed, -1.0);
        assert_eq!(outcome, ProbeOutcome::default());
    }

    #[test]
    fn test_round_secs_to_centiseconds() {
        assert_eq!(round_secs(Duration::from_millis(1234)), 1.23);
        assert_eq!(round_secs(Duration::from_millis(1235)), 1.24);
        assert_eq!(round_secs(Duration::from_secs(2)), 2.0);
    }

    #[tokio::test]
    async fn test_probe_unreachable_proxy_yields_sentinels() {
        // Reserved TEST-NET address, nothing listens there; both sub-probes
        // fail fast with a connection error well inside the timeout.
        let validator = Validator::new(ValidatorConfig {
            timeout: Duration::from_millis(500),
            ..ValidatorConfig::default()
        });

        let outcome = validator.probe("192.0.2.1", 3128).await;
        assert_eq!(outcome, ProbeOutcome::default());
    }
}
