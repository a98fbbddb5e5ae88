//! Session code sources.

use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;

use pairline_core::SessionCode;

/// Produces candidate session codes.
///
/// The registry checks candidates against active sessions and retries on
/// collision, so a generator only needs to be random, not unique.
pub trait CodeGenerator: Send + Sync {
    /// Produce the next candidate.
    fn next_code(&self) -> SessionCode;
}

/// Uniformly random codes.
#[derive(Debug)]
pub struct RandomCodes {
    rng: Mutex<StdRng>,
}

impl RandomCodes {
    /// Seed from the operating system.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic sequence for reproducible tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomCodes {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator for RandomCodes {
    fn next_code(&self) -> SessionCode {
        SessionCode::generate(&mut *self.rng.lock())
    }
}
