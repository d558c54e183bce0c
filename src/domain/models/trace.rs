//! Trace context: correlation and span identifiers.
//!
//! The active `(correlation_id, span_id, parent_span_id)` triple is
//! carried explicitly through calls and crosses process boundaries via
//! environment variables only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trace identifiers propagated with every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Shape `corr-<unix-ts>-<6 hex>-<component>`.
    pub correlation_id: String,
    /// Shape `span-<unix-ts-ns>-<4 hex>-<operation>`.
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
}

/// One entry in a per-correlation trace stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub correlation_id: String,
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub operation: String,
    pub component: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
}
