//! Request and response types for the cockpit backend

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Interval used when the interval field is empty or not a number
pub const DEFAULT_POLL_INTERVAL: f64 = 1.0;

// =============================================================================
// Polling
// =============================================================================

/// Body of `POST /api/polling/start`
///
/// `vin` is always serialized, as `null` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollRequest {
    #[serde(default)]
    pub vin: Option<String>,
    pub pids: Vec<String>,
    pub interval: f64,
}

impl PollRequest {
    /// Build a request from raw form field values
    pub fn from_fields(raw_vin: &str, raw_pids: &str, raw_interval: &str) -> Self {
        Self {
            vin: parse_vin(raw_vin),
            pids: parse_pids(raw_pids),
            interval: parse_interval(raw_interval),
        }
    }
}

/// Split a comma-separated PID list.
///
/// Tokens are trimmed and empty ones dropped. Order and duplicates are kept.
pub fn parse_pids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|pid| !pid.is_empty())
        .map(String::from)
        .collect()
}

/// Parse the interval field in seconds, falling back to [`DEFAULT_POLL_INTERVAL`].
///
/// The longest leading number is taken, so `"2s"` reads as 2. No range
/// check: zero and negative values pass through.
pub fn parse_interval(raw: &str) -> f64 {
    leading_number(raw.trim())
        .filter(|v| v.is_finite())
        .unwrap_or(DEFAULT_POLL_INTERVAL)
}

fn leading_number(text: &str) -> Option<f64> {
    let ends = text
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .collect::<Vec<_>>();
    ends.into_iter()
        .rev()
        .find_map(|end| text[..end].parse::<f64>().ok())
}

/// An empty VIN field means "no VIN"
pub fn parse_vin(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

// =============================================================================
// Backend payloads
// =============================================================================

/// `GET /api/status`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub elm_connected: bool,
    #[serde(default)]
    pub elm_error: Option<String>,
    #[serde(default)]
    pub influx_connected: bool,
    #[serde(default)]
    pub influx_error: Option<String>,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub polling_active: bool,
    #[serde(default)]
    pub polling_config: Option<PollRequest>,
}

/// `POST /api/elm/init`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterInitResponse {
    #[serde(default)]
    pub ok: bool,
    /// Transcript of the AT command handshake
    #[serde(default)]
    pub log: Option<String>,
}

/// Vehicle profile stored by the backend, keyed by VIN
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VehicleProfile {
    pub vin: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub ecus: Vec<String>,
    /// mode -> supported PID hex codes
    #[serde(default)]
    pub supported_pids: BTreeMap<String, Vec<String>>,
}

/// `GET /api/vin/read`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VinResponse {
    pub vin: String,
    #[serde(default)]
    pub profile: Option<VehicleProfile>,
}

/// `POST /api/command`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    pub command: String,
    /// Raw adapter reply
    #[serde(default)]
    pub response: String,
}

/// Plain acknowledgment (`{"ok": true}`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_pids_trims_and_drops_empty() {
        assert_eq!(parse_pids("a, b ,,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_pids("010C, 0105"), vec!["010C", "0105"]);
    }

    #[test]
    fn test_parse_pids_keeps_duplicates() {
        assert_eq!(parse_pids("0C,0C, 0C"), vec!["0C", "0C", "0C"]);
    }

    #[test]
    fn test_parse_pids_empty() {
        assert!(parse_pids("").is_empty());
        assert!(parse_pids(" , ,").is_empty());
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval(""), 1.0);
        assert_eq!(parse_interval("2"), 2.0);
        assert_eq!(parse_interval(" 0.5 "), 0.5);
        assert_eq!(parse_interval("fast"), 1.0);
        assert_eq!(parse_interval("NaN"), 1.0);
        assert_eq!(parse_interval("inf"), 1.0);
    }

    #[test]
    fn test_parse_interval_takes_leading_number() {
        assert_eq!(parse_interval("2s"), 2.0);
        assert_eq!(parse_interval("2abc"), 2.0);
        assert_eq!(parse_interval("0.25 sec"), 0.25);
        assert_eq!(parse_interval("-1x"), -1.0);
        assert_eq!(parse_interval("1e1s"), 10.0);
        assert_eq!(parse_interval("s2"), 1.0);
    }

    #[test]
    fn test_parse_interval_passes_non_positive() {
        assert_eq!(parse_interval("0"), 0.0);
        assert_eq!(parse_interval("-3"), -3.0);
    }

    #[test]
    fn test_parse_vin() {
        assert_eq!(parse_vin(""), None);
        assert_eq!(parse_vin("WF0XXXGCDX1234567").as_deref(), Some("WF0XXXGCDX1234567"));
    }

    #[test]
    fn test_poll_request_serializes_null_vin() {
        let request = PollRequest::from_fields("", "010C, 0105", "2");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"vin": null, "pids": ["010C", "0105"], "interval": 2.0})
        );
    }

    #[test]
    fn test_status_response_is_lenient() {
        let status: StatusResponse = serde_json::from_value(json!({
            "elm_connected": true,
            "polling_active": true,
            "polling_config": {"vin": null, "pids": ["01:0C"], "interval": 1.0}
        }))
        .unwrap();
        assert!(status.elm_connected);
        assert!(status.polling_active);
        assert_eq!(status.polling_config.unwrap().pids, vec!["01:0C"]);
        assert!(status.influx_error.is_none());
    }
}
