use serde::{Deserialize, Serialize};

use super::filter::FilterInput;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonHealth {
    pub version: String,
    pub uptime_secs: u64,
    pub machines: usize,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSummary {
    pub machine: String,
    pub processes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortRequest {
    /// Column index, field name, or label.
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectRequest {
    pub node_name: String,
}

/// Body of a rejected request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Response to a filter update: the active filter after the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResponse {
    pub filter: FilterInput,
}
