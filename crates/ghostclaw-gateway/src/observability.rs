//! Observability (C22, ambient addition): a process-wide event/metric
//! sink plus a component health registry, read by `/health` and the
//! `health` RPC method.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use serde::Serialize;
use tracing::{event, info, Level};

/// Sink for structured events and counters emitted across the gateway.
/// Implementors never block or fail the caller — observability is
/// best-effort by design.
pub trait Observer: Send + Sync {
    fn record_event(&self, name: &str, fields: &HashMap<String, String>);
    fn record_metric(&self, name: &str, value: f64);
}

pub struct NoopObserver;

impl Observer for NoopObserver {
    fn record_event(&self, _name: &str, _fields: &HashMap<String, String>) {}
    fn record_metric(&self, _name: &str, _value: f64) {}
}

/// Forwards events and metrics to `tracing`.
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn record_event(&self, name: &str, fields: &HashMap<String, String>) {
        let fields_str = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        event!(Level::INFO, name, fields = %fields_str, "observability event");
    }

    fn record_metric(&self, name: &str, value: f64) {
        event!(Level::INFO, name, value, "observability metric");
    }
}

static OBSERVER: OnceLock<Mutex<Option<Box<dyn Observer>>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<Box<dyn Observer>>> {
    OBSERVER.get_or_init(|| Mutex::new(None))
}

/// Install the process-wide observer. Call once at startup.
pub fn set_observer(observer: Box<dyn Observer>) {
    *slot().lock().expect("observer lock poisoned") = Some(observer);
}

/// Record an event; degrades to a no-op when no observer is installed.
pub fn record_event(name: &str, fields: &[(&str, &str)]) {
    let guard = slot().lock().expect("observer lock poisoned");
    if let Some(observer) = guard.as_ref() {
        let map = fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        observer.record_event(name, &map);
    }
}

/// Record a metric; degrades to a no-op when no observer is installed.
pub fn record_metric(name: &str, value: f64) {
    let guard = slot().lock().expect("observer lock poisoned");
    if let Some(observer) = guard.as_ref() {
        observer.record_metric(name, value);
    }
}

/// Inbound/outbound channel traffic counter, used by `/webhook` and the
/// WhatsApp handlers.
pub fn record_channel_message(channel: &str, direction: &str) {
    record_event("channel.message", &[("channel", channel), ("direction", direction)]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Ok,
    Degraded,
    Disabled,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Ok => "ok",
            ComponentStatus::Degraded => "degraded",
            ComponentStatus::Disabled => "disabled",
        }
    }
}

static HEALTH: OnceLock<Mutex<HashMap<String, ComponentStatus>>> = OnceLock::new();

fn health_slot() -> &'static Mutex<HashMap<String, ComponentStatus>> {
    HEALTH.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Record a component's current status (written by `gateway`, `websocket`,
/// `memory` subsystems; read by `/health` and the `health` RPC method).
pub fn set_component_status(component: &str, status: ComponentStatus) {
    health_slot()
        .lock()
        .expect("health registry lock poisoned")
        .insert(component.to_string(), status);
    info!(component, status = status.as_str(), "component health updated");
}

pub fn component_status(component: &str) -> Option<ComponentStatus> {
    health_slot().lock().expect("health registry lock poisoned").get(component).copied()
}

pub fn all_component_statuses() -> HashMap<String, ComponentStatus> {
    health_slot().lock().expect("health registry lock poisoned").clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_component_has_no_status() {
        assert_eq!(component_status("nonexistent-test-component"), None);
    }

    #[test]
    fn set_and_read_component_status() {
        set_component_status("test-component", ComponentStatus::Degraded);
        assert_eq!(component_status("test-component"), Some(ComponentStatus::Degraded));
    }

    #[test]
    fn noop_observer_never_panics() {
        let observer = NoopObserver;
        observer.record_event("x", &HashMap::new());
        observer.record_metric("y", 1.0);
    }
}
