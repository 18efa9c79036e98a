pub mod backoff;
pub mod circuit_breaker;

pub use backoff::{retry, Backoff};
pub use circuit_breaker::{Breaker, BreakerConfig, BreakerState};
