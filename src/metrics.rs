use prometheus::{
    register_counter_with_registry, register_gauge_with_registry, register_histogram_with_registry,
    Counter, Gauge, Histogram, Registry,
};
use std::sync::Arc;

pub struct GatewayMetrics {
    pub active_connections: Gauge,
    pub active_rooms: Gauge,
    pub active_sessions: Gauge,
    pub events_relayed: Counter,
    pub activities_recorded: Counter,
    pub protocol_drops: Counter,
    pub store_errors: Counter,
    pub event_latency: Histogram,
    pub registry: Arc<Registry>,
}

impl GatewayMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Arc::new(Registry::new());

        let active_connections = register_gauge_with_registry!(
            "screenlink_gateway_active_connections",
            "Number of live transport connections",
            registry
        )?;

        let active_rooms = register_gauge_with_registry!(
            "screenlink_gateway_active_rooms",
            "Number of rooms with at least one bound connection",
            registry
        )?;

        let active_sessions = register_gauge_with_registry!(
            "screenlink_gateway_active_sessions",
            "Number of active sessions in the store",
            registry
        )?;

        let events_relayed = register_counter_with_registry!(
            "screenlink_gateway_events_relayed_total",
            "Total number of inbound events handled",
            registry
        )?;

        let activities_recorded = register_counter_with_registry!(
            "screenlink_gateway_activities_recorded_total",
            "Total number of activity records written",
            registry
        )?;

        let protocol_drops = register_counter_with_registry!(
            "screenlink_gateway_protocol_drops_total",
            "Total number of malformed or invalid frames dropped",
            registry
        )?;

        let store_errors = register_counter_with_registry!(
            "screenlink_gateway_store_errors_total",
            "Total number of failed storage operations",
            registry
        )?;

        let event_latency = register_histogram_with_registry!(
            "screenlink_gateway_event_latency_seconds",
            "Inbound event handling latency in seconds",
            registry
        )?;

        Ok(Self {
            active_connections,
            active_rooms,
            active_sessions,
            events_relayed,
            activities_recorded,
            protocol_drops,
            store_errors,
            event_latency,
            registry,
        })
    }

    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new().unwrap()
    }
}
