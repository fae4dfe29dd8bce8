use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Metrics for a single device manager, bound to its category label.
#[derive(Clone)]
pub struct RegistryMetrics {
    pub events_received: IntCounter,
    pub events_dropped: IntCounter,
    pub devices_tracked: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    events_received: IntCounterVec,
    events_dropped: IntCounterVec,
    devices_tracked: IntGaugeVec,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let events_received = IntCounterVec::new(
            Opts::new(
                "companion_device_events_received",
                "Device notifications delivered to a manager",
            ),
            &["category"],
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let events_dropped = IntCounterVec::new(
            Opts::new(
                "companion_device_events_dropped",
                "Device notifications dropped without touching the registry",
            ),
            &["category"],
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let devices_tracked = IntGaugeVec::new(
            Opts::new("companion_devices_tracked", "Devices currently in the registry"),
            &["category"],
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let _ = registry.register(Box::new(events_received.clone()));
        let _ = registry.register(Box::new(events_dropped.clone()));
        let _ = registry.register(Box::new(devices_tracked.clone()));
        Ok(Self {
            registry,
            events_received,
            events_dropped,
            devices_tracked,
        })
    }

    pub fn for_category(&self, category: &str) -> RegistryMetrics {
        RegistryMetrics {
            events_received: self.events_received.with_label_values(&[category]),
            events_dropped: self.events_dropped.with_label_values(&[category]),
            devices_tracked: self.devices_tracked.with_label_values(&[category]),
        }
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
