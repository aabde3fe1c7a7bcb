//! Typed error hierarchy for the ledgerbot engines.
//!
//! Only infrastructure failures are errors. Input rejections and permission
//! denials are ordinary values returned by the engines.
//!
//! - `FlowError`: a turn could not be processed (session store or ledger
//!   unreachable, draft not encodable)
//! - `SequenceError`: folio allocation gave up or hit a non-conflict failure

use ledgerbot_common::StoreError;
use thiserror::Error;

/// Infrastructure failures surfaced from the flow engine.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Session store error: {0}")]
    Session(#[source] StoreError),

    #[error("Ledger error: {0}")]
    Ledger(#[source] StoreError),

    #[error("Failed to encode draft: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Folio allocation failed: {0}")]
    Sequence(#[from] SequenceError),
}

impl From<StoreError> for FlowError {
    fn from(err: StoreError) -> Self {
        FlowError::Ledger(err)
    }
}

/// Errors from folio allocation.
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("Folio allocation for {prefix} still conflicting after {attempts} attempts")]
    Exhausted { prefix: String, attempts: u32 },

    #[error("Existing folio '{folio}' does not end in a counter")]
    MalformedFolio { folio: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_error_from_store_error_is_ledger() {
        let err: FlowError = StoreError::NotFound("movement 3".into()).into();
        match &err {
            FlowError::Ledger(StoreError::NotFound(what)) => assert_eq!(what, "movement 3"),
            _ => panic!("Expected FlowError::Ledger(NotFound)"),
        }
        assert!(err.to_string().contains("movement 3"));
    }

    #[test]
    fn sequence_error_exhausted_carries_attempts() {
        let err = SequenceError::Exhausted {
            prefix: "F-202408".into(),
            attempts: 3,
        };
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("F-202408"));
    }

    #[test]
    fn sequence_error_wraps_conflict() {
        let err: SequenceError = StoreError::Conflict("movements.folio".into()).into();
        match &err {
            SequenceError::Store(inner) => assert!(inner.is_conflict()),
            _ => panic!("Expected SequenceError::Store"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&FlowError::Session(StoreError::Corrupt("x".into())));
        assert_std_error(&SequenceError::MalformedFolio { folio: "F-x".into() });
    }
}
