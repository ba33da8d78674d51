use crate::error::MvccError;

/// Default number of buckets
pub const DEFAULT_SIZE: usize = 512;

/// Default bound on displacements per write
pub const DEFAULT_MAX_REACH: usize = 16;

/// Construction parameters for [`MvccTable`](crate::MvccTable).
///
/// Both values are fixed for the lifetime of the table; there is no resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableConfig {
    /// Number of buckets (version chains).
    pub size: usize,
    /// Maximum number of displacement attempts a single `put` may make.
    pub max_reach: usize,
}

impl TableConfig {
    pub fn new(size: usize, max_reach: usize) -> Self {
        Self { size, max_reach }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_max_reach(mut self, max_reach: usize) -> Self {
        self.max_reach = max_reach;
        self
    }

    pub fn validate(&self) -> Result<(), MvccError> {
        if self.size == 0 {
            return Err(MvccError::InvalidConfig {
                reason: "size must be at least 1",
            });
        }
        if self.max_reach == 0 {
            return Err(MvccError::InvalidConfig {
                reason: "max_reach must be at least 1",
            });
        }
        Ok(())
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE, DEFAULT_MAX_REACH)
    }
}
