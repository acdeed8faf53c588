// Raw check run: one row per completed health-check execution

use serde::{Deserialize, Serialize};

/// Outcome of a single check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl CheckStatus {
    /// TEXT column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Healthy => "healthy",
            CheckStatus::Degraded => "degraded",
            CheckStatus::Unhealthy => "unhealthy",
        }
    }

    /// Parse a TEXT column value. Unknown values map to Unhealthy (fail-closed on corrupt rows).
    pub fn from_column(s: &str) -> CheckStatus {
        match s {
            "healthy" => CheckStatus::Healthy,
            "degraded" => CheckStatus::Degraded,
            _ => CheckStatus::Unhealthy,
        }
    }
}

/// One completed check run. `result` is the strategy's free-form payload;
/// `result.metadata.collectors` (when present) maps correlation ids to
/// per-collector sub-payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: i64,
    pub system_id: String,
    pub configuration_id: String,
    pub status: CheckStatus,
    pub latency_ms: Option<f64>,
    pub result: Option<serde_json::Value>,
    /// Unix ms.
    pub created_at: i64,
}

impl Observation {
    pub fn is_healthy(&self) -> bool {
        self.status == CheckStatus::Healthy
    }

    /// Collector payloads keyed by correlation id, from result.metadata.collectors.
    pub fn collector_payloads(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.result
            .as_ref()?
            .get("metadata")?
            .get("collectors")?
            .as_object()
    }
}
