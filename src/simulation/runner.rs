//! Simulation Loop
//!
//! Periodic task that applies a fixed set of [`Update`]s once per tick.

use std::sync::Arc;
use std::time::Duration;

use prometheus::IntCounter;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::facts::FactSource;
use super::update::{FactKind, Update};
use crate::error::Result;
use crate::registry::Instruments;

/// Simulated disk and filesystem ceiling (1 GiB)
const DISK_MAX: u64 = 1024 * 1024 * 1024;

/// Simulated network traffic ceiling (1 MiB)
const TRAFFIC_MAX: u64 = 1024 * 1024;

/// Outcome of a single tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Updates written
    pub applied: usize,
    /// Updates skipped because a fact was unavailable
    pub skipped: usize,
}

/// Background loop writing simulated samples into instruments
pub struct SimulationLoop {
    name: String,
    period: Duration,
    updates: Vec<Update>,
    facts: Arc<dyn FactSource>,
    ticks: IntCounter,
    rng: StdRng,
}

impl SimulationLoop {
    /// Create an empty loop
    pub fn new(
        name: impl Into<String>,
        period: Duration,
        instruments: &Instruments,
        facts: Arc<dyn FactSource>,
    ) -> Self {
        let name = name.into();
        let ticks = instruments.simulation_ticks.with_label_values(&[name.as_str()]);

        Self {
            name,
            period,
            updates: Vec::new(),
            facts,
            ticks,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Add an update applied on every tick
    pub fn with_update(mut self, update: Update) -> Self {
        self.updates.push(update);
        self
    }

    /// Use a deterministic random sequence
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// User and network activity
    pub fn traffic(
        instruments: &Instruments,
        period: Duration,
        facts: Arc<dyn FactSource>,
    ) -> Result<Self> {
        Ok(Self::new("traffic", period, instruments, facts)
            .with_update(Update::uniform(instruments.online_users.clone(), 0, 500)?)
            .with_update(Update::uniform(
                instruments.network_traffic.clone(),
                0,
                TRAFFIC_MAX,
            )?)
            .with_update(Update::increment(
                instruments.network_traffic_errors.clone(),
            ))
            .with_update(Update::increment(instruments.network_traffic_drops.clone()))
            .with_update(Update::uniform(instruments.network_speed.clone(), 0, 1000)?))
    }

    /// Storage, status and host description
    pub fn system(
        instruments: &Instruments,
        period: Duration,
        facts: Arc<dyn FactSource>,
    ) -> Result<Self> {
        Ok(Self::new("system", period, instruments, facts)
            .with_update(Update::uniform(
                instruments.disk_space_usage.clone(),
                0,
                DISK_MAX,
            )?)
            .with_update(Update::uniform(
                instruments.filesystem_space_available.clone(),
                0,
                DISK_MAX,
            )?)
            .with_update(Update::uniform(instruments.system_status.clone(), 0, 2)?)
            .with_update(Update::fact(
                instruments.memory_ram_usage.clone(),
                FactKind::MemoryUsed,
            ))
            .with_update(Update::info(instruments.system_info.clone())))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Apply every update once
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        for update in &self.updates {
            match update.apply(&mut self.rng, self.facts.as_ref()) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    debug!(sim_loop = %self.name, ?update, "Skipping update: {}", e);
                    report.skipped += 1;
                }
            }
        }

        self.ticks.inc();
        report
    }

    /// Tick every period until cancelled
    ///
    /// The first tick fires immediately.
    #[instrument(skip_all, fields(sim_loop = %self.name))]
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "Starting simulation loop ({} updates every {:?})",
            self.updates.len(),
            self.period
        );

        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Simulation loop shutting down");
                    break;
                }

                _ = tick.tick() => {
                    self.tick();
                }
            }
        }
    }
}

impl std::fmt::Debug for SimulationLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationLoop")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("updates", &self.updates)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::registry::InstrumentRegistry;
    use crate::simulation::facts::{SyntheticFacts, SystemInfo};

    struct NoMemory;

    impl FactSource for NoMemory {
        fn memory_used(&self) -> Result<u64> {
            Err(Error::Fact("no memory".to_string()))
        }

        fn system_info(&self) -> Result<SystemInfo> {
            SyntheticFacts.system_info()
        }
    }

    fn instruments() -> (InstrumentRegistry, Instruments) {
        let registry = InstrumentRegistry::new();
        let instruments = Instruments::register(&registry).unwrap();
        (registry, instruments)
    }

    #[test]
    fn test_traffic_tick() {
        let (_registry, instruments) = instruments();
        let mut sim = SimulationLoop::traffic(
            &instruments,
            Duration::from_secs(1),
            Arc::new(SyntheticFacts),
        )
        .unwrap()
        .with_seed(7);

        let report = sim.tick();
        assert_eq!(report, TickReport { applied: 5, skipped: 0 });
        assert_eq!(instruments.network_traffic_errors.get(), 1);
        assert_eq!(instruments.network_traffic_drops.get(), 1);
        assert_eq!(instruments.tick_count("traffic"), 1);
    }

    #[test]
    fn test_online_users_bounds() {
        let (_registry, instruments) = instruments();
        let mut sim = SimulationLoop::traffic(
            &instruments,
            Duration::from_secs(1),
            Arc::new(SyntheticFacts),
        )
        .unwrap()
        .with_seed(42);

        for _ in 0..1000 {
            sim.tick();
            let users = instruments.online_users.get();
            assert!((0.0..500.0).contains(&users));
        }
    }

    #[test]
    fn test_counters_never_decrease() {
        let (_registry, instruments) = instruments();
        let mut sim = SimulationLoop::traffic(
            &instruments,
            Duration::from_secs(1),
            Arc::new(SyntheticFacts),
        )
        .unwrap();

        let mut last = 0;
        for _ in 0..20 {
            sim.tick();
            let errors = instruments.network_traffic_errors.get();
            assert!(errors > last);
            last = errors;
        }
    }

    #[test]
    fn test_missing_fact_skips_single_update() {
        let (registry, instruments) = instruments();
        let mut sim =
            SimulationLoop::system(&instruments, Duration::from_secs(1), Arc::new(NoMemory))
                .unwrap();

        let report = sim.tick();
        assert_eq!(report, TickReport { applied: 4, skipped: 1 });
        assert_eq!(instruments.memory_ram_usage.get(), 0.0);

        let text = registry.render().unwrap();
        assert!(text.contains(
            "goapp_system_info{arch=\"amd64\",os=\"linux\",version=\"1.0\"} 1"
        ));

        // Next tick still runs
        sim.tick();
        assert_eq!(instruments.tick_count("system"), 2);
    }

    #[test]
    fn test_same_seed_same_samples() {
        let (_ra, a) = instruments();
        let (_rb, b) = instruments();
        let facts: Arc<dyn FactSource> = Arc::new(SyntheticFacts);

        let mut sim_a = SimulationLoop::traffic(&a, Duration::from_secs(1), facts.clone())
            .unwrap()
            .with_seed(99);
        let mut sim_b = SimulationLoop::traffic(&b, Duration::from_secs(1), facts)
            .unwrap()
            .with_seed(99);

        for _ in 0..5 {
            sim_a.tick();
            sim_b.tick();
            assert_eq!(a.online_users.get(), b.online_users.get());
            assert_eq!(a.network_speed.get(), b.network_speed.get());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_without_traffic() {
        let (_registry, instruments) = instruments();
        let sim = SimulationLoop::traffic(
            &instruments,
            Duration::from_secs(1),
            Arc::new(SyntheticFacts),
        )
        .unwrap();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sim.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(3_050)).await;
        assert!(instruments.tick_count("traffic") >= 3);

        cancel.cancel();
        handle.await.unwrap();

        // No ticks after cancellation
        let ticks = instruments.tick_count("traffic");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(instruments.tick_count("traffic"), ticks);
    }
}
