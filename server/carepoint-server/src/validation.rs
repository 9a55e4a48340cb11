//! Request validation utilities for consistent validation across handlers
//!
//! Validation runs before any transaction opens; a failing request never
//! reaches the ledger.

use crate::error::ApiError;

/// Trait for validating request payloads
///
/// Implemented by all create/update request types so handlers validate the
/// same way everywhere.
pub trait RequestValidation {
    /// Returns `Ok(())` if validation passes, or a validation `ApiError`.
    fn validate(&self) -> Result<(), ApiError>;
}

/// Macro for validating fields with custom predicates
///
/// ```ignore
/// validate_field!(self.amount, self.amount > Decimal::ZERO, "Amount must be positive");
/// ```
#[macro_export]
macro_rules! validate_field {
    ($field:expr, $predicate:expr, $message:expr) => {
        if !$predicate {
            return Err($crate::error::ApiError::validation($message));
        }
    };
}

/// Macro for validating required fields (non-empty strings)
///
/// ```ignore
/// validate_required!(self.reason, "Reason is required");
/// ```
#[macro_export]
macro_rules! validate_required {
    ($field:expr, $message:expr) => {
        $crate::validate_field!($field, !$field.trim().is_empty(), $message);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CancelRequest {
        reason: String,
    }

    impl RequestValidation for CancelRequest {
        fn validate(&self) -> Result<(), ApiError> {
            validate_required!(self.reason, "Reason is required");
            Ok(())
        }
    }

    #[test]
    fn rejects_blank_required_fields() {
        let request = CancelRequest {
            reason: "   ".to_string(),
        };
        assert!(request.validate().is_err());

        let request = CancelRequest {
            reason: "duplicate".to_string(),
        };
        assert!(request.validate().is_ok());
    }
}
