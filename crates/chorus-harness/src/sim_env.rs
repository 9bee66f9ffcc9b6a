//! Deterministic simulation environment.
//!
//! Virtual clock plus seeded RNG so every test run is reproducible from
//! its seed. Time only moves when a test calls [`SimEnv::advance`].

use std::{
    ops::Sub,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chorus_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wall-clock origin for simulated runs, milliseconds since the epoch.
const WALL_CLOCK_BASE_MS: u64 = 1_700_000_000_000;

/// Virtual instant: milliseconds since simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(u64);

impl SimInstant {
    /// Milliseconds since simulation start.
    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(rhs.0))
    }
}

/// Simulation environment with virtual time and seeded randomness.
#[derive(Debug, Clone)]
pub struct SimEnv {
    clock_ms: Arc<AtomicU64>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    /// Environment seeded for reproducibility.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock_ms: Arc::new(AtomicU64::new(0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Advance virtual time. Clones of this environment share the clock.
    pub fn advance(&self, duration: Duration) {
        self.clock_ms.fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Milliseconds since simulation start.
    pub fn elapsed_ms(&self) -> u64 {
        self.clock_ms.load(Ordering::Relaxed)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.clock_ms.load(Ordering::Relaxed))
    }

    fn wall_clock_ms(&self) -> u64 {
        WALL_CLOCK_BASE_MS + self.clock_ms.load(Ordering::Relaxed)
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        // Virtual time never blocks; tests advance the clock explicitly.
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.fill_bytes(buffer);
    }
}
