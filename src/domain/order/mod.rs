// ============================================================================
// Order Domain - state machine and event vocabulary
// ============================================================================
//
// Everything order-specific lives here:
// - Value objects (Order, OrderItem, Customer, Address, OrderStatus)
// - Events (OrderEvent tagged union + EventPayload)
// - Errors (OrderError)
// - Aggregate (pure state machine: place / transition)
//
// This layer performs no I/O; persistence and publishing are injected ports
// consumed by the service layer.
//
// ============================================================================

pub mod aggregate;
pub mod errors;
pub mod events;
pub mod value_objects;

pub use aggregate::*;
pub use errors::*;
pub use events::*;
pub use value_objects::*;
