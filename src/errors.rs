use std::fmt;

/// Error taxonomy for the ledger engine and its supporting services.
///
/// Variants below `InvariantViolation` are fatal and never retried. `TransientRpc`
/// is the only retryable kind; callers above the request scheduler should not retry
/// any other variant.
#[derive(Debug)]
pub enum LedgerError {
    Validation(String),
    NotFound(String),
    TransientRpc(anyhow::Error),
    FinalityBoundaryMissing { chain: String },
    InvariantViolation(String),
    UnsupportedEvent(String),
    Storage(anyhow::Error),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Validation(msg) => write!(f, "validation error: {msg}"),
            LedgerError::NotFound(msg) => write!(f, "not found: {msg}"),
            LedgerError::TransientRpc(err) => write!(f, "transient rpc error: {err}"),
            LedgerError::FinalityBoundaryMissing { chain } => {
                write!(f, "no finality boundary available for chain {chain}")
            },
            LedgerError::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
            LedgerError::UnsupportedEvent(msg) => write!(f, "unsupported event: {msg}"),
            LedgerError::Storage(err) => write!(f, "storage error: {err}"),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::TransientRpc(err) => Some(err.as_ref()),
            LedgerError::Storage(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<tokio_postgres::Error> for LedgerError {
    fn from(err: tokio_postgres::Error) -> Self {
        LedgerError::Storage(err.into())
    }
}

impl From<deadpool_postgres::PoolError> for LedgerError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        LedgerError::Storage(err.into())
    }
}

/// Wraps a per-event failure with the event's ordering triple, per the engine's
/// propagation rule: it emits at most one error per `sync` and that error names
/// the offending event.
pub fn wrap_event_error(
    err: LedgerError,
    block_number: u64,
    transaction_index: i32,
    log_index: i32,
) -> LedgerError {
    let ordering =
        format!("(block={block_number}, tx_index={transaction_index}, log_index={log_index})");
    match err {
        LedgerError::Validation(msg) => LedgerError::Validation(format!("{msg} at {ordering}")),
        LedgerError::InvariantViolation(msg) => {
            LedgerError::InvariantViolation(format!("{msg} at {ordering}"))
        },
        LedgerError::UnsupportedEvent(msg) => {
            LedgerError::UnsupportedEvent(format!("{msg} at {ordering}"))
        },
        other => other,
    }
}
