use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Run states after which the backend reports no further progress.
const TERMINAL_STATES: [&str; 3] = ["stopped", "finished", "cleanup"];

/// Point-in-time statistics reported by the live results endpoint.
///
/// Every field is optional: the backend forwards whatever the load generator
/// last printed, and early snapshots routinely miss most of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveStats {
    pub test_id: Option<String>,
    pub state: Option<String>,
    pub user_count: Option<f64>,
    pub current_rps: Option<f64>,
    pub current_fail_per_sec: Option<f64>,
    pub total_requests: Option<f64>,
    pub total_failures: Option<f64>,
    pub stats: Option<Vec<EndpointStat>>,
    pub stats_total: Option<TotalStat>,
    /// Average response time keyed by `"<METHOD> <name>"`, plus `Total`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub response_times_avg: Map<String, Value>,
    /// Percentile tables keyed by endpoint name, in backend order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub response_times_percentiles: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointStat {
    pub method: Option<String>,
    pub name: Option<String>,
    pub num_requests: Option<f64>,
    pub num_failures: Option<f64>,
    pub avg_response_time: Option<f64>,
    pub current_rps: Option<f64>,
    pub current_fail_per_sec: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TotalStat {
    pub num_requests: Option<f64>,
    pub num_failures: Option<f64>,
    pub avg_response_time: Option<f64>,
    pub total_rps: Option<f64>,
    pub total_fail_per_sec: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub name: Option<String>,
    pub method: Option<String>,
    pub error: Option<String>,
    pub occurrences: Option<f64>,
}

// The backend forwards whatever the load generator printed, `null` included.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl LiveStats {
    pub fn is_terminal(&self) -> bool {
        self.state
            .as_deref()
            .is_some_and(|state| TERMINAL_STATES.iter().any(|t| state.eq_ignore_ascii_case(t)))
    }
}
