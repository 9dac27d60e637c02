//! Metrics Simulator
//!
//! A demo HTTP server that publishes simulated Prometheus metrics. Background
//! loops write pseudo-random values into a registry of instruments every
//! tick, while two endpoints with randomized latency are counted and timed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Server Bootstrap                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  Simulation  │───▶│  Instrument  │◀───│   Request    │       │
//! │  │    Loops     │    │   Registry   │    │   Handlers   │       │
//! │  └──────────────┘    └──────┬───────┘    └──────────────┘       │
//! │                             │ /metrics                          │
//! │                      ┌──────▼───────┐                           │
//! │                      │   Listener   │                           │
//! │                      └──────────────┘                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`app`] - Bootstrap, configuration and simulation task ownership
//! - [`error`] - Error types
//! - [`handlers`] - Simulated endpoints and request instrumentation
//! - [`registry`] - Instrument registry and catalogue
//! - [`server`] - HTTP listener and routing
//! - [`simulation`] - Periodic simulation loops and fact sources

pub mod app;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod server;
pub mod simulation;

// Re-export commonly used types
pub use app::{App, ServerConfig, SimulationHandle};
pub use error::{Error, Result};
pub use registry::{InstrumentKind, InstrumentRegistry, Instruments};
pub use server::{MetricsServer, Routes};
pub use simulation::{FactSource, FactsMode, SimulationLoop};
