use std::fmt;

/// Errors surfaced by the allocator.
///
/// Misuse of the allocator (double free, foreign pointers, writes past a
/// payload) is not reported here. Those are undefined behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The memory source could not grow the heap by `requested` bytes, or the
    /// request could not even be expressed as a block size.
    OutOfMemory { requested: usize },
}

/// Result type used across the allocator.
pub type AllocResult<T> = Result<T, AllocError>;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "out of memory: heap cannot grow by {requested} bytes")
            }
        }
    }
}

impl std::error::Error for AllocError {}
