use crate::store::StoreError;

// ============================================================================
// Order Validation Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order UID cannot be empty")]
    EmptyUid,

    #[error("order must contain at least one item")]
    NoItems,
}

// ============================================================================
// Order Processor Errors
// ============================================================================
//
// The taxonomy every caller of the processor sees:
// - EmptyUid / InvalidOrder: caller input defect, never retried
// - DuplicateKey: business-rule conflict, never retried automatically
// - NotFound: absence, distinct from internal failure
// - Malformed: inbound message could not be decoded
// - Internal: anything unexpected from the store
//
// Cache failures never show up here; they degrade to a store read.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("order UID cannot be empty")]
    EmptyUid,

    #[error("invalid order data: {0}")]
    InvalidOrder(OrderError),

    #[error("order UID is not unique: {0}")]
    DuplicateKey(String),

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("malformed order message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl ServiceError {
    /// Short, stable label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::EmptyUid => "empty_uid",
            ServiceError::InvalidOrder(_) => "invalid_order",
            ServiceError::DuplicateKey(_) => "duplicate_key",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Malformed(_) => "malformed",
            ServiceError::Internal(_) => "internal",
        }
    }

    /// Whether the failure was caused by the caller's input rather than the system
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServiceError::Internal(_))
    }
}

impl From<OrderError> for ServiceError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::EmptyUid => ServiceError::EmptyUid,
            other => ServiceError::InvalidOrder(other),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey(uid) => ServiceError::DuplicateKey(uid),
            StoreError::NotFound(uid) => ServiceError::NotFound(uid),
            StoreError::Internal(e) => ServiceError::Internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_uid_maps_to_dedicated_variant() {
        let err: ServiceError = OrderError::EmptyUid.into();
        assert!(matches!(err, ServiceError::EmptyUid));

        let err: ServiceError = OrderError::NoItems.into();
        assert!(matches!(err, ServiceError::InvalidOrder(OrderError::NoItems)));
    }

    #[test]
    fn test_store_errors_propagate_unchanged() {
        let err: ServiceError = StoreError::DuplicateKey("A1".to_string()).into();
        assert!(matches!(err, ServiceError::DuplicateKey(ref uid) if uid == "A1"));

        let err: ServiceError = StoreError::NotFound("A2".to_string()).into();
        assert!(matches!(err, ServiceError::NotFound(ref uid) if uid == "A2"));

        let err: ServiceError = StoreError::Internal(anyhow::anyhow!("connection reset")).into();
        assert_eq!(err.kind(), "internal");
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("connection reset"));
    }
}
