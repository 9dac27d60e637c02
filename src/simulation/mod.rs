//! Simulation module
//!
//! Background loops that write pseudo-random samples into the instrument
//! catalogue on a fixed cadence, independent of HTTP traffic.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  tick  ┌──────────────┐  set/inc  ┌──────────────┐
//! │   interval   │───────▶│   Updates    │──────────▶│ Instruments  │
//! └──────────────┘        └──────────────┘           └──────────────┘
//!                                │ optional
//!                                ▼
//!                         ┌──────────────┐
//!                         │ Fact Source  │
//!                         └──────────────┘
//! ```
//!
//! Loops share nothing but the instruments and make no assumption about
//! ordering relative to each other.

mod facts;
mod runner;
mod update;

pub use facts::{FactSource, FactsMode, HostFacts, SyntheticFacts, SystemInfo};
pub use runner::{SimulationLoop, TickReport};
pub use update::{FactKind, Update};
