//! Server Bootstrap
//!
//! Owns the registry, the instrument catalogue and the simulation tasks.
//! Everything that reads or writes metrics receives its handles from here.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::Result;
use crate::handlers::{DelayPolicy, Endpoint, Instrumented};
use crate::registry::{InstrumentRegistry, Instruments};
use crate::server::Routes;
use crate::simulation::{FactSource, FactsMode, SimulationLoop};

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8181";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listener bind address
    pub listen_addr: String,

    /// Period of every simulation loop
    pub tick_period: Duration,

    /// Source of host facts
    pub facts: FactsMode,

    /// Simulated work on `/`
    pub home_delay: DelayPolicy,

    /// Simulated work on `/contact`
    pub contact_delay: DelayPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            tick_period: Duration::from_secs(1),
            facts: FactsMode::Synthetic,
            home_delay: DelayPolicy::seconds(8),
            contact_delay: DelayPolicy::seconds(5),
        }
    }
}

// =============================================================================
// Simulation Handle
// =============================================================================

/// A running simulation loop
pub struct SimulationHandle {
    name: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SimulationHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the loop and wait for it to exit
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(sim_loop = %self.name, "Simulation task failed: {}", e);
        }
    }
}

impl std::fmt::Debug for SimulationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationHandle")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

// =============================================================================
// App
// =============================================================================

/// Shared state of one server instance
pub struct App {
    config: ServerConfig,
    registry: Arc<InstrumentRegistry>,
    instruments: Arc<Instruments>,
    facts: Arc<dyn FactSource>,
    shutdown: CancellationToken,
}

impl App {
    /// Build the registry and register every instrument
    ///
    /// Registration errors are fatal to the caller.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let facts = config.facts.source();
        Self::with_facts(config, facts)
    }

    /// Build with an explicit fact source
    pub fn with_facts(config: ServerConfig, facts: Arc<dyn FactSource>) -> Result<Self> {
        let registry = Arc::new(InstrumentRegistry::new());
        let instruments = Arc::new(Instruments::register(&registry)?);

        info!(
            "Registered {} instruments (facts: {})",
            registry.len(),
            config.facts
        );

        Ok(Self {
            config,
            registry,
            instruments,
            facts,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<InstrumentRegistry> {
        &self.registry
    }

    pub fn instruments(&self) -> &Arc<Instruments> {
        &self.instruments
    }

    /// Root token; cancelling it stops loops and the listener
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Loops run by this server
    pub fn simulation_loops(&self) -> Result<Vec<SimulationLoop>> {
        let period = self.config.tick_period;
        Ok(vec![
            SimulationLoop::traffic(&self.instruments, period, self.facts.clone())?,
            SimulationLoop::system(&self.instruments, period, self.facts.clone())?,
        ])
    }

    /// Spawn every loop as an independent task
    pub fn start_simulations(&self) -> Result<Vec<SimulationHandle>> {
        let handles = self
            .simulation_loops()?
            .into_iter()
            .map(|sim| self.spawn_simulation(sim))
            .collect();
        Ok(handles)
    }

    /// Spawn one loop under a child of the shutdown token
    pub fn spawn_simulation(&self, sim: SimulationLoop) -> SimulationHandle {
        let name = sim.name().to_string();
        let cancel = self.shutdown.child_token();
        let task = tokio::spawn(sim.run(cancel.clone()));

        SimulationHandle { name, cancel, task }
    }

    /// Instrumented handlers and the scrape target
    pub fn routes(&self) -> Routes {
        Routes {
            home: Instrumented::new(
                Endpoint::home(self.config.home_delay),
                self.instruments.clone(),
            ),
            contact: Instrumented::new(
                Endpoint::contact(self.config.contact_delay),
                self.instruments.clone(),
            ),
            registry: self.registry.clone(),
        }
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
