use std::fmt;

/// Typed errors for table operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MvccError {
    /// Every displacement attempt was used up without finding an empty bucket.
    /// All nodes written by the failed transaction have been rolled back.
    TableFull { key: u64, attempts: usize },
    /// Key 0 is the empty sentinel and cannot hold a value
    ReservedKey,
    /// Table configuration rejected at construction
    InvalidConfig { reason: &'static str },
}

impl fmt::Display for MvccError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MvccError::TableFull { key, attempts } => {
                write!(
                    f,
                    "Key {} couldn't be inserted due to a tight table ({} displacements)",
                    key, attempts
                )
            }
            MvccError::ReservedKey => {
                write!(f, "Key 0 is reserved for the empty sentinel")
            }
            MvccError::InvalidConfig { reason } => {
                write!(f, "Invalid table configuration: {}", reason)
            }
        }
    }
}

impl std::error::Error for MvccError {}
