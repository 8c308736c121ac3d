use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Channel Status / Health
// ============================================================================

/// Scheduling status of a channel as reported by the proxy.
///
/// The proxy omits the field (or sends an empty string) for channels that were
/// configured before statuses existed; those read as [`ChannelStatus::Unset`]
/// and are treated as active by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ChannelStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "suspended")]
    Suspended,
    #[serde(rename = "disabled")]
    Disabled,
    #[default]
    #[serde(rename = "")]
    Unset,
}

impl ChannelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelStatus::Active => "active",
            ChannelStatus::Suspended => "suspended",
            ChannelStatus::Disabled => "disabled",
            ChannelStatus::Unset => "",
        }
    }

    fn from_wire(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }

    /// Counts toward the active channel total (explicitly active or unset).
    pub fn is_active(self) -> bool {
        matches!(self, ChannelStatus::Active | ChannelStatus::Unset)
    }

    /// Participates in failover (anything not disabled).
    pub fn is_failover_candidate(self) -> bool {
        self != ChannelStatus::Disabled
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Unset => f.pad("unset"),
            other => f.pad(other.as_str()),
        }
    }
}

impl FromStr for ChannelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ChannelStatus::Active),
            "suspended" => Ok(ChannelStatus::Suspended),
            "disabled" => Ok(ChannelStatus::Disabled),
            other => Err(format!(
                "invalid channel status '{other}' (expected active, suspended or disabled)"
            )),
        }
    }
}

impl<'de> Deserialize<'de> for ChannelStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(ChannelStatus::from_wire).unwrap_or_default())
    }
}

/// Reachability verdict attached to a channel by the last ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Error,
    Unknown,
}

impl Health {
    /// Map a ping status string to a health tag. Unrecognized strings yield `None`.
    pub fn normalize(status: &str) -> Option<Health> {
        match status {
            "healthy" => Some(Health::Healthy),
            "error" => Some(Health::Error),
            "unknown" => Some(Health::Unknown),
            _ => None,
        }
    }
}

/// Go encodes an empty slice as `null`; read that as the default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_health<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Health>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Health::normalize))
}

// ============================================================================
// Channel Record
// ============================================================================

/// One upstream route inside a category.
///
/// `index` is assigned by the proxy and is the only identity a channel has; it
/// is unique within its category and stable across fetches. Routing settings
/// this crate does not interpret are kept verbatim in `routing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub index: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: ChannelStatus,
    #[serde(
        default,
        deserialize_with = "lenient_health",
        skip_serializing_if = "Option::is_none"
    )]
    pub health: Option<Health>,
    /// Latency in milliseconds. Client-originated when set by a ping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<u64>,
    /// When `latency` was measured locally. Never sent by the proxy.
    #[serde(
        default,
        rename = "latencyTestTime",
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub latency_measured_at: Option<DateTime<Utc>>,
    /// Lower values are preferred by the scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(flatten)]
    pub routing: serde_json::Map<String, serde_json::Value>,
}

impl Channel {
    pub fn new(index: u32, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            status: ChannelStatus::Unset,
            health: None,
            latency: None,
            latency_measured_at: None,
            priority: None,
            routing: serde_json::Map::new(),
        }
    }
}

/// Editable channel settings sent when adding or updating a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    pub name: String,
    pub service_type: String,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub base_urls: Vec<String>,
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure_skip_verify: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub model_mapping: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub low_quality: bool,
}

// ============================================================================
// Dashboard Payload
// ============================================================================

/// Request/success counters for one time window (15m, 1h, 6h, 24h).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeWindowStats {
    pub request_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
}

/// Server-side metrics for one channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelMetrics {
    pub channel_index: u32,
    pub request_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Percent, 0-100.
    pub success_rate: f64,
    /// Percent, 0-100.
    pub error_rate: f64,
    pub consecutive_failures: u32,
    /// Milliseconds.
    pub latency: f64,
    pub last_success_at: Option<String>,
    pub last_failure_at: Option<String>,
    pub time_windows: Option<HashMap<String, TimeWindowStats>>,
    /// Per-key metrics, kept opaque.
    pub key_metrics: Option<Vec<serde_json::Value>>,
}

/// Scheduler summary for a category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DashboardStats {
    pub multi_channel_mode: bool,
    pub active_channel_count: u32,
    pub trace_affinity_count: u32,
    #[serde(rename = "traceAffinityTTL")]
    pub trace_affinity_ttl: String,
    pub failure_threshold: f64,
    pub window_size: u32,
    pub circuit_recovery_time: String,
}

/// One 6-second bucket of the recent-activity strip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivitySegment {
    pub request_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Last 15 minutes of traffic for one channel, oldest segment first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecentActivity {
    pub channel_index: u32,
    pub segments: Vec<ActivitySegment>,
    pub rpm: f64,
    pub tpm: f64,
}

/// Combined channel list + metrics for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub channels: Vec<Channel>,
    #[serde(default = "default_load_balance")]
    pub load_balance: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metrics: Vec<ChannelMetrics>,
    #[serde(default)]
    pub stats: Option<DashboardStats>,
    #[serde(default)]
    pub recent_activity: Option<Vec<RecentActivity>>,
}

pub(crate) fn default_load_balance() -> String {
    "round-robin".to_string()
}

// ============================================================================
// Ping Payloads
// ============================================================================

/// Result of pinging a single channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingResult {
    pub success: bool,
    pub latency: u64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One entry of a ping sweep, normalized across categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingSweepEntry {
    pub id: u32,
    pub latency: u64,
    pub status: String,
}

/// Sweep entry as returned by the messages and responses endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct RawSweepEntry {
    pub id: u32,
    #[serde(default)]
    pub latency: u64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub success: bool,
}

/// Sweep body as returned by the gemini endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct GeminiSweep {
    #[serde(default, deserialize_with = "null_as_default")]
    pub channels: Vec<GeminiSweepEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiSweepEntry {
    pub index: u32,
    #[serde(default)]
    pub latency: u64,
    #[serde(default)]
    pub success: bool,
}

fn status_from_success(success: bool) -> String {
    let status = if success { "healthy" } else { "error" };
    status.to_string()
}

impl From<RawSweepEntry> for PingSweepEntry {
    fn from(raw: RawSweepEntry) -> Self {
        Self {
            id: raw.id,
            latency: raw.latency,
            status: raw
                .status
                .unwrap_or_else(|| status_from_success(raw.success)),
        }
    }
}

impl From<GeminiSweepEntry> for PingSweepEntry {
    fn from(raw: GeminiSweepEntry) -> Self {
        Self {
            id: raw.index,
            latency: raw.latency,
            status: status_from_success(raw.success),
        }
    }
}
