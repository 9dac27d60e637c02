//! Instrument catalogue
//!
//! Typed handles to every instrument the server writes, built once at startup
//! and shared with simulation loops and request handlers.

use prometheus::{
    Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
};

use super::{Instrument, InstrumentRegistry};
use crate::error::Result;

/// Instrument names
pub mod names {
    pub const ONLINE_USERS: &str = "goapp_online_users";
    pub const HTTP_REQUESTS_TOTAL: &str = "goapp_http_requests_total";
    pub const HTTP_REQUEST_DURATION: &str = "goapp_http_request_duration";
    pub const DISK_SPACE_USAGE: &str = "goapp_disk_space_usage";
    pub const NETWORK_TRAFFIC: &str = "goapp_network_traffic";
    pub const NETWORK_TRAFFIC_ERRORS: &str = "goapp_network_traffic_errors_total";
    pub const NETWORK_TRAFFIC_DROPS: &str = "goapp_network_traffic_drops_total";
    pub const NETWORK_SPEED: &str = "goapp_network_speed";
    pub const FILESYSTEM_SPACE_AVAILABLE: &str = "goapp_filesystem_space_available";
    pub const SYSTEM_STATUS: &str = "goapp_system_status";
    pub const SYSTEM_INFO: &str = "goapp_system_info";
    pub const MEMORY_RAM_USAGE: &str = "goapp_memory_ram_usage";
    pub const SIMULATION_TICKS: &str = "goapp_simulation_ticks_total";
}

/// Label attached to request count and duration
pub const HANDLER_LABEL: &str = "handler";

/// Labels of the system info gauge, in order
pub const SYSTEM_INFO_LABELS: [&str; 3] = ["os", "arch", "version"];

/// Handles to all server instruments
#[derive(Clone)]
pub struct Instruments {
    pub online_users: Gauge,
    pub http_requests_total: IntCounterVec,
    pub http_request_duration: HistogramVec,
    pub disk_space_usage: Gauge,
    pub network_traffic: Gauge,
    pub network_traffic_errors: IntCounter,
    pub network_traffic_drops: IntCounter,
    pub network_speed: Gauge,
    pub filesystem_space_available: Gauge,
    pub system_status: Gauge,
    pub system_info: GaugeVec,
    pub memory_ram_usage: Gauge,
    pub simulation_ticks: IntCounterVec,
}

impl Instruments {
    /// Build the catalogue and register every instrument
    pub fn register(registry: &InstrumentRegistry) -> Result<Self> {
        let instruments = Self {
            online_users: Gauge::with_opts(
                Opts::new(names::ONLINE_USERS, "Online users").const_label("course", "funcionameo"),
            )?,
            http_requests_total: IntCounterVec::new(
                Opts::new(
                    names::HTTP_REQUESTS_TOTAL,
                    "Count of all HTTP requests for goapp",
                ),
                &[HANDLER_LABEL],
            )?,
            http_request_duration: HistogramVec::new(
                HistogramOpts::new(
                    names::HTTP_REQUEST_DURATION,
                    "Duration in seconds of all HTTP requests",
                ),
                &[HANDLER_LABEL],
            )?,
            disk_space_usage: Gauge::new(names::DISK_SPACE_USAGE, "Disk space usage in bytes")?,
            network_traffic: Gauge::new(names::NETWORK_TRAFFIC, "Network traffic in bytes")?,
            network_traffic_errors: IntCounter::new(
                names::NETWORK_TRAFFIC_ERRORS,
                "Total number of network traffic errors",
            )?,
            network_traffic_drops: IntCounter::new(
                names::NETWORK_TRAFFIC_DROPS,
                "Total number of network traffic drops",
            )?,
            network_speed: Gauge::new(names::NETWORK_SPEED, "Network speed in Mbps")?,
            filesystem_space_available: Gauge::new(
                names::FILESYSTEM_SPACE_AVAILABLE,
                "Available filesystem space in bytes",
            )?,
            system_status: Gauge::new(
                names::SYSTEM_STATUS,
                "System status (1 = online, 0 = offline)",
            )?,
            system_info: GaugeVec::new(
                Opts::new(names::SYSTEM_INFO, "Basic system information"),
                &SYSTEM_INFO_LABELS,
            )?,
            memory_ram_usage: Gauge::new(names::MEMORY_RAM_USAGE, "Memory RAM usage in bytes")?,
            simulation_ticks: IntCounterVec::new(
                Opts::new(
                    names::SIMULATION_TICKS,
                    "Completed ticks per simulation loop",
                ),
                &["loop"],
            )?,
        };

        for instrument in instruments.all() {
            registry.register(instrument)?;
        }

        Ok(instruments)
    }

    fn all(&self) -> Vec<Instrument> {
        vec![
            Instrument::Gauge(self.online_users.clone()),
            Instrument::CounterVector(self.http_requests_total.clone()),
            Instrument::HistogramVector(self.http_request_duration.clone()),
            Instrument::Gauge(self.disk_space_usage.clone()),
            Instrument::Gauge(self.network_traffic.clone()),
            Instrument::Counter(self.network_traffic_errors.clone()),
            Instrument::Counter(self.network_traffic_drops.clone()),
            Instrument::Gauge(self.network_speed.clone()),
            Instrument::Gauge(self.filesystem_space_available.clone()),
            Instrument::Gauge(self.system_status.clone()),
            Instrument::GaugeVector(self.system_info.clone()),
            Instrument::Gauge(self.memory_ram_usage.clone()),
            Instrument::CounterVector(self.simulation_ticks.clone()),
        ]
    }

    /// Requests served by one handler
    pub fn request_count(&self, handler: &str) -> u64 {
        self.http_requests_total
            .with_label_values(&[handler])
            .get()
    }

    /// Duration observations recorded for one handler
    pub fn duration_count(&self, handler: &str) -> u64 {
        self.http_request_duration
            .with_label_values(&[handler])
            .get_sample_count()
    }

    /// Ticks completed by one simulation loop
    pub fn tick_count(&self, loop_name: &str) -> u64 {
        self.simulation_ticks.with_label_values(&[loop_name]).get()
    }
}

impl std::fmt::Debug for Instruments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instruments").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::registry::InstrumentKind;
    use assert_matches::assert_matches;

    #[test]
    fn test_catalogue_registers_every_instrument() {
        let registry = InstrumentRegistry::new();
        Instruments::register(&registry).unwrap();

        assert_eq!(registry.len(), 13);
        assert_eq!(
            registry.kind_of(names::ONLINE_USERS).unwrap(),
            InstrumentKind::Gauge
        );
        assert_eq!(
            registry.kind_of(names::HTTP_REQUEST_DURATION).unwrap(),
            InstrumentKind::HistogramVector
        );
        assert_eq!(
            registry.kind_of(names::SYSTEM_INFO).unwrap(),
            InstrumentKind::GaugeVector
        );
        assert_eq!(
            registry.kind_of(names::NETWORK_TRAFFIC_DROPS).unwrap(),
            InstrumentKind::Counter
        );
    }

    #[test]
    fn test_catalogue_twice_is_duplicate() {
        let registry = InstrumentRegistry::new();
        Instruments::register(&registry).unwrap();

        let err = Instruments::register(&registry).unwrap_err();
        assert_matches!(err, Error::DuplicateInstrument { ref name } if name == names::ONLINE_USERS);
    }

    #[test]
    fn test_isolated_registries() {
        let a = InstrumentRegistry::new();
        let b = InstrumentRegistry::new();
        let ia = Instruments::register(&a).unwrap();
        let ib = Instruments::register(&b).unwrap();

        ia.online_users.set(10.0);
        assert_eq!(ib.online_users.get(), 0.0);
    }

    #[test]
    fn test_online_users_const_label() {
        let registry = InstrumentRegistry::new();
        let instruments = Instruments::register(&registry).unwrap();
        instruments.online_users.set(12.0);

        let text = registry.render().unwrap();
        assert!(text.contains("goapp_online_users{course=\"funcionameo\"} 12"));
    }
}
