use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Protocols a proxy was observed to support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Unknown,
    Http,
    Https,
    Both,
}

impl Protocol {
    pub fn as_i16(&self) -> i16 {
        match self {
            Protocol::Unknown => -1,
            Protocol::Http => 0,
            Protocol::Https => 1,
            Protocol::Both => 2,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            -1 => Some(Protocol::Unknown),
            0 => Some(Protocol::Http),
            1 => Some(Protocol::Https),
            2 => Some(Protocol::Both),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Unknown => "unknown",
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Both => "both",
        }
    }

    pub fn supports_http(&self) -> bool {
        matches!(self, Protocol::Http | Protocol::Both)
    }

    pub fn supports_https(&self) -> bool {
        matches!(self, Protocol::Https | Protocol::Both)
    }

    /// Protocol values satisfying a requested scheme.
    ///
    /// `None` asks for proxies usable on either scheme, so only `Both`
    /// qualifies. An unrecognized scheme yields `None` and the caller is
    /// expected to return an empty result set rather than fail.
    pub fn matching(scheme: Option<&str>) -> Option<Vec<Protocol>> {
        match scheme {
            None => Some(vec![Protocol::Both]),
            Some(s) => match s.to_lowercase().as_str() {
                "http" => Some(vec![Protocol::Http, Protocol::Both]),
                "https" => Some(vec![Protocol::Https, Protocol::Both]),
                _ => None,
            },
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Anonymity level a proxy offers the original caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Anonymity {
    #[default]
    Unknown,
    Elite,
    Anonymous,
    Transparent,
}

impl Anonymity {
    pub fn as_i16(&self) -> i16 {
        match self {
            Anonymity::Unknown => -1,
            Anonymity::Elite => 0,
            Anonymity::Anonymous => 1,
            Anonymity::Transparent => 2,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            -1 => Some(Anonymity::Unknown),
            0 => Some(Anonymity::Elite),
            1 => Some(Anonymity::Anonymous),
            2 => Some(Anonymity::Transparent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Anonymity::Unknown => "unknown",
            Anonymity::Elite => "elite",
            Anonymity::Anonymous => "anonymous",
            Anonymity::Transparent => "transparent",
        }
    }
}

impl std::fmt::Display for Anonymity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validation outcome for a single probe pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeOutcome {
    pub protocol: Protocol,
    pub anonymity: Anonymity,
    /// Probe latency in seconds, -1 when no sub-probe succeeded
    pub speed: f64,
}

impl Default for ProbeOutcome {
    fn default() -> Self {
        Self {
            protocol: Protocol::Unknown,
            anonymity: Anonymity::Unknown,
            speed: -1.0,
        }
    }
}

/// A candidate proxy and its accumulated validation state
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProxyRecord {
    /// Primary key, immutable after creation
    pub ip: String,
    pub port: i32,
    pub protocol: i16,  // Stored as smallint in DB
    pub anonymity: i16, // Stored as smallint in DB
    pub speed: f64,
    pub area: Option<String>,
    pub score: i32,
    pub disabled_domains: Vec<String>,
    pub checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProxyRecord {
    /// Create a fresh candidate known only by ip/port.
    ///
    /// Every other field starts at its sentinel; the score starts at the
    /// configured maximum and only moves down from there.
    pub fn new(ip: impl Into<String>, port: u16, max_score: i32) -> Self {
        Self {
            ip: ip.into(),
            port: port as i32,
            protocol: Protocol::Unknown.as_i16(),
            anonymity: Anonymity::Unknown.as_i16(),
            speed: -1.0,
            area: None,
            score: max_score,
            disabled_domains: Vec::new(),
            checked_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Get the protocol enum
    pub fn protocol_enum(&self) -> Protocol {
        Protocol::from_i16(self.protocol).unwrap_or(Protocol::Unknown)
    }

    /// Get the anonymity enum
    pub fn anonymity_enum(&self) -> Anonymity {
        Anonymity::from_i16(self.anonymity).unwrap_or(Anonymity::Unknown)
    }

    /// Merge a probe outcome into this record.
    ///
    /// Domain blacklist and score are untouched; a validation pass only
    /// speaks to protocol support, anonymity, and latency.
    pub fn apply_probe(&mut self, outcome: &ProbeOutcome) {
        self.protocol = outcome.protocol.as_i16();
        self.anonymity = outcome.anonymity.as_i16();
        self.speed = outcome.speed;
        self.checked_at = Some(Utc::now());
    }

    /// Whether a validation has ever confirmed a usable protocol
    pub fn is_validated(&self) -> bool {
        self.protocol_enum() != Protocol::Unknown
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl std::fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}/{} score={} speed={}]",
            self.address(),
            self.protocol_enum(),
            self.anonymity_enum(),
            self.score,
            self.speed
        )
    }
}

/// Conjunctive filter for pool queries.
///
/// Every set field narrows the result; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ProxyFilter {
    /// Accept records whose protocol is any of these
    pub protocols: Option<Vec<Protocol>>,
    pub anonymity: Option<Anonymity>,
    /// Require this domain to be absent from the record's disabled list
    pub usable_for_domain: Option<String>,
    /// Exact match on the stored area
    pub area: Option<String>,
    /// Exact match on the stored port
    pub port: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_i16_round_trip() {
        for protocol in [
            Protocol::Unknown,
            Protocol::Http,
            Protocol::Https,
            Protocol::Both,
        ] {
            assert_eq!(Protocol::from_i16(protocol.as_i16()), Some(protocol));
        }
        assert_eq!(Protocol::from_i16(7), None);
    }

    #[test]
    fn test_protocol_support_helpers() {
        assert!(Protocol::Http.supports_http());
        assert!(!Protocol::Http.supports_https());
        assert!(Protocol::Https.supports_https());
        assert!(Protocol::Both.supports_http());
        assert!(Protocol::Both.supports_https());
        assert!(!Protocol::Unknown.supports_http());
        assert!(!Protocol::Unknown.supports_https());
    }

    #[test]
    fn test_protocol_matching() {
        assert_eq!(Protocol::matching(None), Some(vec![Protocol::Both]));
        assert_eq!(
            Protocol::matching(Some("http")),
            Some(vec![Protocol::Http, Protocol::Both])
        );
        assert_eq!(
            Protocol::matching(Some("HTTPS")),
            Some(vec![Protocol::Https, Protocol::Both])
        );
        assert_eq!(Protocol::matching(Some("socks5")), None);
        assert_eq!(Protocol::matching(Some("")), None);
    }

    #[test]
    fn test_anonymity_i16_round_trip() {
        for anonymity in [
            Anonymity::Unknown,
            Anonymity::Elite,
            Anonymity::Anonymous,
            Anonymity::Transparent,
        ] {
            assert_eq!(Anonymity::from_i16(anonymity.as_i16()), Some(anonymity));
        }
        assert_eq!(Anonymity::from_i16(3), None);
        assert_eq!(Anonymity::Elite.as_i16(), 0);
        assert_eq!(Anonymity::Transparent.as_i16(), 2);
    }

    #[test]
    fn test_new_record_defaults() {
        let record = ProxyRecord::new("1.2.3.4", 8080, 50);
        assert_eq!(record.ip, "1.2.3.4");
        assert_eq!(record.port, 8080);
        assert_eq!(record.protocol_enum(), Protocol::Unknown);
        assert_eq!(record.anonymity_enum(), Anonymity::Unknown);
        assert_eq!(record.speed, -1.0);
        assert_eq!(record.score, 50);
        assert!(record.disabled_domains.is_empty());
        assert!(record.checked_at.is_none());
        assert!(!record.is_validated());
        assert_eq!(record.address(), "1.2.3.4:8080");
    }

    #[test]
    fn test_fresh_records_do_not_share_disabled_domains() {
        let mut first = ProxyRecord::new("1.2.3.4", 8080, 50);
        let second = ProxyRecord::new("5.6.7.8", 3128, 50);

        first.disabled_domains.push("a.com".to_string());
        assert!(second.disabled_domains.is_empty());
    }

    #[test]
    fn test_apply_probe_merges_outcome() {
        let mut record = ProxyRecord::new("1.2.3.4", 8080, 50);
        record.disabled_domains.push("a.com".to_string());
        record.score = 12;

        let outcome = ProbeOutcome {
            protocol: Protocol::Both,
            anonymity: Anonymity::Elite,
            speed: 0.42,
        };
        record.apply_probe(&outcome);

        assert_eq!(record.protocol_enum(), Protocol::Both);
        assert_eq!(record.anonymity_enum(), Anonymity::Elite);
        assert_eq!(record.speed, 0.42);
        assert!(record.checked_at.is_some());
        assert!(record.is_validated());

        // A probe never touches score or the domain blacklist
        assert_eq!(record.score, 12);
        assert_eq!(record.disabled_domains, vec!["a.com".to_string()]);
    }

    #[test]
    fn test_failed_probe_resets_to_sentinels() {
        let mut record = ProxyRecord::new("1.2.3.4", 8080, 50);
        record.apply_probe(&ProbeOutcome {
            protocol: Protocol::Http,
            anonymity: Anonymity::Anonymous,
            speed: 1.5,
        });

        record.apply_probe(&ProbeOutcome::default());
        assert_eq!(record.protocol_enum(), Protocol::Unknown);
        assert_eq!(record.anonymity_enum(), Anonymity::Unknown);
        assert_eq!(record.speed, -1.0);
    }
}
