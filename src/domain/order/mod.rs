// ============================================================================
// Order Domain
// ============================================================================
//
// - Errors (OrderError validation, ServiceError taxonomy)
// - OrderService: validation, cache-aside reads, delegation to the store
// - Random order generator for test data
//
// ============================================================================

pub mod errors;
pub mod generator;
pub mod service;

pub use errors::*;
pub use generator::generate_random_order;
pub use service::OrderService;
