// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Order rules live here and nowhere else. Storage, cache and transport are
// reached only through the traits in `store`, `cache` and `messaging`.
//
// ============================================================================

pub mod order;
