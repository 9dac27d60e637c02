//! Instrument Registry
//!
//! A process-wide collection of named metric instruments backed by a
//! `prometheus::Registry`. Names are indexed on registration so duplicate
//! registration surfaces as a typed error instead of a library message.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   register    ┌──────────────────────────────┐
//! │   Instruments    │──────────────▶│     InstrumentRegistry       │
//! │ (typed handles)  │               │  name index + prom Registry  │
//! └──────────────────┘               └──────────────────────────────┘
//!          ▲                                        │ collect / render
//!          │ set / inc / observe                    ▼
//! ┌──────────────────┐               ┌──────────────────────────────┐
//! │ Simulation Loops │               │       /metrics scrape        │
//! │ Request Handlers │               └──────────────────────────────┘
//! └──────────────────┘
//! ```

mod instruments;

pub use instruments::{names, Instruments};

use std::collections::BTreeMap;

use parking_lot::RwLock;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{
    Encoder, Gauge, GaugeVec, Histogram, HistogramVec, IntCounter, IntCounterVec, Registry,
    TextEncoder,
};
use tracing::debug;

use crate::error::{Error, Result};

// =============================================================================
// Instrument
// =============================================================================

/// Kind of a registered instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    /// Value set arbitrarily up or down
    Gauge,
    /// Monotonically non-decreasing value
    Counter,
    /// Distribution over fixed buckets
    Histogram,
    /// Gauge with one child per label combination
    GaugeVector,
    /// Counter with one child per label combination
    CounterVector,
    /// Histogram with one child per label combination
    HistogramVector,
}

impl InstrumentKind {
    /// Whether this kind carries label names
    pub fn is_vector(&self) -> bool {
        matches!(
            self,
            InstrumentKind::GaugeVector
                | InstrumentKind::CounterVector
                | InstrumentKind::HistogramVector
        )
    }
}

impl std::fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrumentKind::Gauge => write!(f, "gauge"),
            InstrumentKind::Counter => write!(f, "counter"),
            InstrumentKind::Histogram => write!(f, "histogram"),
            InstrumentKind::GaugeVector => write!(f, "gauge vector"),
            InstrumentKind::CounterVector => write!(f, "counter vector"),
            InstrumentKind::HistogramVector => write!(f, "histogram vector"),
        }
    }
}

/// A metric instrument handle ready for registration
///
/// Handles are cheap clones sharing the same underlying value, so the caller
/// keeps its own copy for writing after handing one to the registry.
#[derive(Clone)]
pub enum Instrument {
    Gauge(Gauge),
    Counter(IntCounter),
    Histogram(Histogram),
    GaugeVector(GaugeVec),
    CounterVector(IntCounterVec),
    HistogramVector(HistogramVec),
}

impl Instrument {
    /// Kind of this instrument
    pub fn kind(&self) -> InstrumentKind {
        match self {
            Instrument::Gauge(_) => InstrumentKind::Gauge,
            Instrument::Counter(_) => InstrumentKind::Counter,
            Instrument::Histogram(_) => InstrumentKind::Histogram,
            Instrument::GaugeVector(_) => InstrumentKind::GaugeVector,
            Instrument::CounterVector(_) => InstrumentKind::CounterVector,
            Instrument::HistogramVector(_) => InstrumentKind::HistogramVector,
        }
    }

    /// Fully-qualified name of this instrument
    pub fn name(&self) -> String {
        self.collector()
            .desc()
            .first()
            .map(|desc| desc.fq_name.clone())
            .unwrap_or_default()
    }

    fn collector(&self) -> Box<dyn Collector> {
        match self {
            Instrument::Gauge(m) => Box::new(m.clone()),
            Instrument::Counter(m) => Box::new(m.clone()),
            Instrument::Histogram(m) => Box::new(m.clone()),
            Instrument::GaugeVector(m) => Box::new(m.clone()),
            Instrument::CounterVector(m) => Box::new(m.clone()),
            Instrument::HistogramVector(m) => Box::new(m.clone()),
        }
    }
}

impl std::fmt::Debug for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Name-indexed collection of instruments exposed for scraping
pub struct InstrumentRegistry {
    inner: Registry,
    index: RwLock<BTreeMap<String, InstrumentKind>>,
}

impl InstrumentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Registry::new(),
            index: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register an instrument by name
    ///
    /// Fails with [`Error::DuplicateInstrument`] if the name is taken.
    pub fn register(&self, instrument: Instrument) -> Result<()> {
        let name = instrument.name();
        let kind = instrument.kind();

        // Index and library registry change under the same write lock
        let mut index = self.index.write();
        if index.contains_key(&name) {
            return Err(Error::DuplicateInstrument { name });
        }

        match self.inner.register(instrument.collector()) {
            Ok(()) => {}
            Err(prometheus::Error::AlreadyReg) => {
                return Err(Error::DuplicateInstrument { name });
            }
            Err(e) => return Err(e.into()),
        }

        debug!(instrument = %name, %kind, "Registered instrument");
        index.insert(name, kind);
        Ok(())
    }

    /// Point-in-time read of every registered instrument
    pub fn collect(&self) -> Vec<MetricFamily> {
        self.inner.gather()
    }

    /// Render current state in the Prometheus text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.collect();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| Error::Encode(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| Error::Encode(e.to_string()))
    }

    /// Content type of [`render`](Self::render) output
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Whether an instrument with this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.index.read().contains_key(name)
    }

    /// Kind of the named instrument
    pub fn kind_of(&self, name: &str) -> Result<InstrumentKind> {
        self.index
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownInstrument(name.to_string()))
    }

    /// Registered instrument names, sorted
    pub fn names(&self) -> Vec<String> {
        self.index.read().keys().cloned().collect()
    }

    /// Number of registered instruments
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// Whether no instruments are registered
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InstrumentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentRegistry")
            .field("instruments", &self.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
