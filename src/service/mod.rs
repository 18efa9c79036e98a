// ============================================================================
// Service Layer - thin orchestration over ports
// ============================================================================

pub mod orders;

pub use orders::{CreateOrderRequest, OrderService, PlacedOrder};
