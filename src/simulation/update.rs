//! Per-instrument value policies
//!
//! Each [`Update`] pairs one instrument with the generator that feeds it.
//! The variant fixes which instrument kind it may write, so a gauge can never
//! be handed an increment policy.

use prometheus::{Gauge, GaugeVec, IntCounter};
use rand::Rng;

use super::facts::FactSource;
use crate::error::{Error, Result};

/// Fact feeding a gauge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKind {
    /// Memory in use, in bytes
    MemoryUsed,
}

/// One simulated write, applied once per tick
#[derive(Clone)]
pub enum Update {
    /// Set a gauge to a uniform integer in `[low, high)`
    Uniform { gauge: Gauge, low: u64, high: u64 },
    /// Add one to a counter
    Increment { counter: IntCounter },
    /// Set a gauge from a fact source
    Fact { gauge: Gauge, fact: FactKind },
    /// Mark the host label tuple as currently true
    Info { gauge: GaugeVec },
}

impl Update {
    /// Uniform integer policy; the range must be non-empty
    pub fn uniform(gauge: Gauge, low: u64, high: u64) -> Result<Self> {
        if low >= high {
            return Err(Error::InvalidRange { low, high });
        }
        Ok(Update::Uniform { gauge, low, high })
    }

    pub fn increment(counter: IntCounter) -> Self {
        Update::Increment { counter }
    }

    pub fn fact(gauge: Gauge, fact: FactKind) -> Self {
        Update::Fact { gauge, fact }
    }

    pub fn info(gauge: GaugeVec) -> Self {
        Update::Info { gauge }
    }

    /// Draw a sample and write it
    ///
    /// Only fact reads can fail; the instrument is left untouched when they do.
    pub fn apply<R: Rng>(&self, rng: &mut R, facts: &dyn FactSource) -> Result<()> {
        match self {
            Update::Uniform { gauge, low, high } => {
                gauge.set(rng.random_range(*low..*high) as f64);
            }
            Update::Increment { counter } => counter.inc(),
            Update::Fact { gauge, fact } => match fact {
                FactKind::MemoryUsed => gauge.set(facts.memory_used()? as f64),
            },
            Update::Info { gauge } => {
                let info = facts.system_info()?;
                gauge.with_label_values(&info.label_values()).set(1.0);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Update {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Update::Uniform { low, high, .. } => f
                .debug_struct("Uniform")
                .field("low", low)
                .field("high", high)
                .finish_non_exhaustive(),
            Update::Increment { .. } => f.debug_struct("Increment").finish_non_exhaustive(),
            Update::Fact { fact, .. } => f
                .debug_struct("Fact")
                .field("fact", fact)
                .finish_non_exhaustive(),
            Update::Info { .. } => f.debug_struct("Info").finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::facts::{SyntheticFacts, SystemInfo};
    use assert_matches::assert_matches;
    use prometheus::Opts;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct BrokenFacts;

    impl FactSource for BrokenFacts {
        fn memory_used(&self) -> Result<u64> {
            Err(Error::Fact("no memory".to_string()))
        }

        fn system_info(&self) -> Result<SystemInfo> {
            Err(Error::Fact("no info".to_string()))
        }
    }

    #[test]
    fn test_empty_range_rejected() {
        let gauge = Gauge::new("g", "g").unwrap();
        assert_matches!(
            Update::uniform(gauge.clone(), 5, 5),
            Err(Error::InvalidRange { low: 5, high: 5 })
        );
        assert!(Update::uniform(gauge, 0, 1).is_ok());
    }

    #[test]
    fn test_increment_adds_one() {
        let counter = IntCounter::new("c", "c").unwrap();
        let update = Update::increment(counter.clone());
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..3 {
            update.apply(&mut rng, &SyntheticFacts).unwrap();
        }
        assert_eq!(counter.get(), 3);
    }

    #[test]
    fn test_fact_failure_leaves_gauge() {
        let gauge = Gauge::new("mem", "mem").unwrap();
        gauge.set(11.0);
        let update = Update::fact(gauge.clone(), FactKind::MemoryUsed);
        let mut rng = StdRng::seed_from_u64(1);

        assert_matches!(update.apply(&mut rng, &BrokenFacts), Err(Error::Fact(_)));
        assert_eq!(gauge.get(), 11.0);
    }

    #[test]
    fn test_info_marks_label_tuple() {
        let gauge = GaugeVec::new(Opts::new("info", "info"), &["os", "arch", "version"]).unwrap();
        let update = Update::info(gauge.clone());
        let mut rng = StdRng::seed_from_u64(1);

        update.apply(&mut rng, &SyntheticFacts).unwrap();
        assert_eq!(
            gauge.with_label_values(&["linux", "amd64", "1.0"]).get(),
            1.0
        );
    }

    proptest! {
        #[test]
        fn prop_uniform_stays_in_range(seed in any::<u64>(), low in 0u64..1000, width in 1u64..1000) {
            let gauge = Gauge::new("u", "u").unwrap();
            let update = Update::uniform(gauge.clone(), low, low + width).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);

            for _ in 0..20 {
                update.apply(&mut rng, &SyntheticFacts).unwrap();
                let v = gauge.get();
                prop_assert!(v >= low as f64);
                prop_assert!(v < (low + width) as f64);
                prop_assert_eq!(v.fract(), 0.0);
            }
        }
    }
}
