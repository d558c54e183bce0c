//! Correlation/span minting and trace propagation.
//!
//! The active trace context is carried explicitly through calls and
//! crosses process boundaries via the CORRELATION_ID / SPAN_ID /
//! PARENT_SPAN_ID environment variables only.

use chrono::Utc;
use uuid::Uuid;

use crate::domain::error::Result;
use crate::domain::models::{TraceContext, TraceEvent};
use crate::domain::Clock;
use crate::infrastructure::Store;

/// Environment variable names for cross-process propagation.
pub const ENV_CORRELATION_ID: &str = "CORRELATION_ID";
pub const ENV_SPAN_ID: &str = "SPAN_ID";
pub const ENV_PARENT_SPAN_ID: &str = "PARENT_SPAN_ID";

/// Mint a correlation id: `corr-<unix-ts>-<6 hex>-<component>`.
pub fn mint_correlation_id(clock: &dyn Clock, component: &str) -> String {
    let ts = clock.now().timestamp();
    let hex = &Uuid::new_v4().simple().to_string()[..6];
    format!("corr-{ts}-{hex}-{component}")
}

/// Mint a span id: `span-<unix-ts-ns>-<4 hex>-<operation>`.
pub fn mint_span_id(clock: &dyn Clock, operation: &str) -> String {
    let ns = clock.now().timestamp_nanos_opt().unwrap_or_default();
    let hex = &Uuid::new_v4().simple().to_string()[..4];
    format!("span-{ns}-{hex}-{operation}")
}

impl TraceContext {
    /// Start a fresh trace for a component operation.
    pub fn start(clock: &dyn Clock, component: &str, operation: &str) -> Self {
        Self {
            correlation_id: mint_correlation_id(clock, component),
            span_id: mint_span_id(clock, operation),
            parent_span_id: None,
        }
    }

    /// Derive a child context: same correlation, new span, current span
    /// becomes the parent.
    pub fn child(&self, clock: &dyn Clock, operation: &str) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            span_id: mint_span_id(clock, operation),
            parent_span_id: Some(self.span_id.clone()),
        }
    }

    /// Rehydrate from the process environment, if a correlation id is
    /// present.
    pub fn from_env() -> Option<Self> {
        let correlation_id = std::env::var(ENV_CORRELATION_ID).ok()?;
        let span_id = std::env::var(ENV_SPAN_ID).ok()?;
        Some(Self {
            correlation_id,
            span_id,
            parent_span_id: std::env::var(ENV_PARENT_SPAN_ID).ok(),
        })
    }

    /// Environment variable pairs for spawning a child process.
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            (ENV_CORRELATION_ID.to_string(), self.correlation_id.clone()),
            (ENV_SPAN_ID.to_string(), self.span_id.clone()),
        ];
        if let Some(parent) = &self.parent_span_id {
            vars.push((ENV_PARENT_SPAN_ID.to_string(), parent.clone()));
        }
        vars
    }
}

/// Appends trace events to the per-correlation and daily streams.
pub struct Tracer<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
}

impl<'a> Tracer<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Record one operation under the given context.
    pub fn record(
        &self,
        ctx: &TraceContext,
        component: &str,
        operation: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        let now = self.clock.now();
        let event = TraceEvent {
            correlation_id: ctx.correlation_id.clone(),
            span_id: ctx.span_id.clone(),
            parent_span_id: ctx.parent_span_id.clone(),
            operation: operation.to_string(),
            component: component.to_string(),
            timestamp: now,
            data,
        };
        let env = self.store.env();
        let paths = self.store.paths();
        self.store
            .append_jsonl(&paths.trace(env, &ctx.correlation_id), &event)?;
        self.store
            .append_jsonl(&paths.trace_daily(env, now), &event)?;
        Ok(())
    }

    /// Read back the full trace for a correlation id.
    pub fn by_correlation(&self, correlation_id: &str) -> Result<Vec<TraceEvent>> {
        let path = self.store.paths().trace(self.store.env(), correlation_id);
        self.store.read_jsonl(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Environment;
    use crate::domain::SystemClock;
    use crate::services::validator::correlation_id_regex;
    use tempfile::TempDir;

    #[test]
    fn test_correlation_id_shape() {
        let id = mint_correlation_id(&SystemClock, "router");
        assert!(
            correlation_id_regex().is_match(&id),
            "minted id {id} does not match format"
        );
    }

    #[test]
    fn test_span_id_shape() {
        let id = mint_span_id(&SystemClock, "allocate");
        assert!(id.starts_with("span-"));
        assert!(id.ends_with("-allocate"));
    }

    #[test]
    fn test_child_context_links_parent() {
        let root = TraceContext::start(&SystemClock, "intake", "create");
        let child = root.child(&SystemClock, "route");
        assert_eq!(child.correlation_id, root.correlation_id);
        assert_eq!(child.parent_span_id.as_deref(), Some(root.span_id.as_str()));
        assert_ne!(child.span_id, root.span_id);
    }

    #[test]
    fn test_env_roundtrip() {
        let ctx = TraceContext {
            correlation_id: "corr-1-abcdef-x".into(),
            span_id: "span-1-ab-y".into(),
            parent_span_id: Some("span-0-cd-z".into()),
        };
        let vars = ctx.to_env();
        temp_env::with_vars(
            vars.iter()
                .map(|(k, v)| (k.as_str(), Some(v.as_str())))
                .collect::<Vec<_>>(),
            || {
                let back = TraceContext::from_env().unwrap();
                assert_eq!(back, ctx);
            },
        );
    }

    #[test]
    fn test_record_appends_to_both_streams() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path(), Environment::Dev);
        let clock = SystemClock;
        let tracer = Tracer::new(&store, &clock);
        let ctx = TraceContext::start(&clock, "router", "select");

        tracer
            .record(&ctx, "router", "select", serde_json::json!({"task": "t1"}))
            .unwrap();
        tracer
            .record(&ctx, "router", "persist", serde_json::Value::Null)
            .unwrap();

        let events = tracer.by_correlation(&ctx.correlation_id).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].operation, "select");

        let daily = store.paths().trace_daily(Environment::Dev, clock.now());
        let daily_events: Vec<TraceEvent> = store.read_jsonl(&daily).unwrap();
        assert_eq!(daily_events.len(), 2);
    }
}
