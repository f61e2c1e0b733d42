//! xorshift64* random number generator
//!
//! This is a fast, high-quality PRNG that is deterministic and suitable
//! for simulation purposes.
//!
//! # Algorithm
//!
//! xorshift64* is a variant of xorshift that passes TestU01's BigCrush
//! statistical tests. It uses 64-bit state and produces 64-bit output.
//!
//! # Determinism
//!
//! Same seed → same sequence of random numbers. This is CRITICAL for:
//! - Debugging (reproduce exact simulation)
//! - Testing (verify behavior)
//! - Research (validate results)

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use location_simulator_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let value = rng.next();
/// let delay = rng.exponential(20.0); // mean 50ms
/// assert!(delay >= 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct RngManager {
    /// Internal state (64-bit)
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed
    pub fn new(seed: u64) -> Self {
        // Ensure seed is never zero (xorshift requirement)
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        // xorshift64* algorithm
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Get current RNG state
    pub fn get_state(&self) -> u64 {
        self.state
    }

    /// Generate random f64 in range [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        // Convert to [0.0, 1.0) by dividing by 2^53
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Sample an exponential duration in milliseconds
    ///
    /// `rate_per_second` is the number of events per second, so the sample
    /// has mean `1000 / rate_per_second` ms.
    ///
    /// # Panics
    /// Panics if the rate is not strictly positive.
    pub fn exponential(&mut self, rate_per_second: f64) -> f64 {
        assert!(rate_per_second > 0.0, "rate must be positive");
        // 1 - u lies in (0, 1], so the logarithm is finite
        let u = 1.0 - self.next_f64();
        -u.ln() * 1000.0 / rate_per_second
    }

    /// Derive an independent child generator
    ///
    /// The child is seeded from this generator's next output, so a single
    /// root seed determines every child stream.
    pub fn fork(&mut self) -> RngManager {
        RngManager::new(self.next())
    }
}
