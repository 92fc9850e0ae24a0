use std::collections::HashMap;

use serde::Deserialize;

use crate::models::Anonymity;

/// Header a forwarding proxy commonly injects into relayed requests
const PROXY_FORWARD_HEADER: &str = "proxy-connection";

/// Payload returned by an echo endpoint: the source address it observed and
/// the request headers it received.
///
/// The endpoints are untrusted; anything that fails to deserialize into this
/// shape is treated as a failed sub-probe by the caller. Extra fields are
/// ignored for forward compatibility.
#[derive(Debug, Clone, Deserialize)]
pub struct EchoResponse {
    pub origin: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl EchoResponse {
    /// Classify the anonymity level this echo reveals.
    ///
    /// More than one comma-separated address in `origin` means the proxy
    /// forwarded our real address: transparent. A proxy-forwarding marker
    /// header without an address leak means the target can tell a proxy is
    /// involved: anonymous. Neither: elite.
    pub fn anonymity(&self) -> Anonymity {
        if self.origin.contains(',') {
            return Anonymity::Transparent;
        }

        let marked = self
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case(PROXY_FORWARD_HEADER));

        if marked {
            Anonymity::Anonymous
        } else {
            Anonymity::Elite
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(origin: &str, headers: &[(&str, &str)]) -> EchoResponse {
        EchoResponse {
            origin: origin.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_multiple_origins_is_transparent() {
        let response = echo("1.2.3.4, 5.6.7.8", &[("Host", "httpbin.org")]);
        assert_eq!(response.anonymity(), Anonymity::Transparent);
    }

    #[test]
    fn test_forward_marker_is_anonymous() {
        let response = echo("1.2.3.4", &[("Proxy-Connection", "keep-alive")]);
        assert_eq!(response.anonymity(), Anonymity::Anonymous);
    }

    #[test]
    fn test_forward_marker_match_is_case_insensitive() {
        let response = echo("1.2.3.4", &[("proxy-connection", "close")]);
        assert_eq!(response.anonymity(), Anonymity::Anonymous);
    }

    #[test]
    fn test_clean_echo_is_elite() {
        let response = echo("1.2.3.4", &[("Host", "httpbin.org")]);
        assert_eq!(response.anonymity(), Anonymity::Elite);
    }

    #[test]
    fn test_transparent_wins_over_forward_marker() {
        let response = echo("1.2.3.4, 5.6.7.8", &[("Proxy-Connection", "keep-alive")]);
        assert_eq!(response.anonymity(), Anonymity::Transparent);
    }

    #[test]
    fn test_deserialize_tolerates_missing_headers_and_extra_fields() {
        let response: EchoResponse =
            serde_json::from_str(r#"{"origin": "1.2.3.4", "url": "http://httpbin.org/get"}"#)
                .unwrap();
        assert_eq!(response.anonymity(), Anonymity::Elite);
    }

    #[test]
    fn test_deserialize_rejects_payload_without_origin() {
        let result = serde_json::from_str::<EchoResponse>(r#"{"headers": {}}"#);
        assert!(result.is_err());
    }
}
