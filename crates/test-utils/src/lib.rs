//! Shared test data generation for the pontis workspace.

use arbitrary::{Arbitrary, Unstructured};
use rand::RngCore;

/// Default entropy buffer size; large enough for any record in the workspace.
const ENTROPY_LEN: usize = 65_536;

/// Generator producing [`Arbitrary`] values from a reusable entropy buffer.
#[derive(Debug)]
pub struct ArbitraryGenerator {
    buf: Vec<u8>,
}

impl Default for ArbitraryGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ArbitraryGenerator {
    pub fn new() -> Self {
        Self::with_capacity(ENTROPY_LEN)
    }

    /// Creates a generator with a custom entropy buffer size, for records
    /// that need more unstructured input than the default provides.
    pub fn with_capacity(len: usize) -> Self {
        Self { buf: vec![0u8; len] }
    }

    /// Generates a value of type `T`, retrying on the rare draw whose
    /// entropy violates `T`'s construction invariants.
    pub fn generate<T>(&mut self) -> T
    where
        T: for<'a> Arbitrary<'a>,
    {
        const MAX_ATTEMPTS: usize = 16;
        let mut rng = rand::thread_rng();
        let mut last_error = None;

        for _ in 0..MAX_ATTEMPTS {
            rng.fill_bytes(&mut self.buf);
            let mut u = Unstructured::new(&self.buf);
            match T::arbitrary(&mut u) {
                Ok(value) => return value,
                Err(err) => last_error = Some(err),
            }
        }

        panic!(
            "failed to generate arbitrary instance: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        );
    }
}
