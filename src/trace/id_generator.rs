//! Trace and span id generation.

use std::cell::RefCell;
use std::fmt;

use rand::{rngs, Rng, SeedableRng};

/// Interface for generating trace and span ids.
///
/// Trace ids are 32 lowercase hex characters, span ids 16. Both are
/// generated once per trace/span and never mutated.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new trace id.
    fn new_trace_id(&self) -> String;

    /// Generate a new span id.
    fn new_span_id(&self) -> String;
}

/// Default [`IdGenerator`] implementation backed by a per-thread random
/// number generator.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> String {
        CURRENT_RNG.with(|rng| format!("{:032x}", rng.borrow_mut().random::<u128>()))
    }

    fn new_span_id(&self) -> String {
        CURRENT_RNG.with(|rng| format!("{:016x}", rng.borrow_mut().random::<u64>()))
    }
}

thread_local! {
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_os_rng());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_have_fixed_width_hex() {
        let generator = RandomIdGenerator::default();
        let trace_id = generator.new_trace_id();
        let span_id = generator.new_span_id();
        assert_eq!(trace_id.len(), 32);
        assert_eq!(span_id.len(), 16);
        assert!(trace_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(span_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ids_are_unique_enough() {
        let generator = RandomIdGenerator::default();
        assert_ne!(generator.new_trace_id(), generator.new_trace_id());
        assert_ne!(generator.new_span_id(), generator.new_span_id());
    }
}
