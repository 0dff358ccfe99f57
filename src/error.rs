//! Error types reported by `SegmentedDeque`.

use std::alloc::Layout;

use thiserror::Error;

/// Failure to obtain storage for new blocks or for the block table.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum TryReserveError {
    /// The slot count or a layout computation overflowed.
    #[error("memory allocation failed due to capacity overflow")]
    CapacityOverflow,
    /// The allocator refused the request.
    #[error("memory allocation of {} bytes failed", .layout.size())]
    AllocError { layout: Layout },
}

impl TryReserveError {
    /// Aborts the way the standard collections do on an infallible path.
    pub(crate) fn into_panic(self) -> ! {
        match self {
            TryReserveError::CapacityOverflow => panic!("capacity overflow"),
            TryReserveError::AllocError { layout } => std::alloc::handle_alloc_error(layout),
        }
    }
}

/// Errors from the checked deque operations.
///
/// The panicking forms (`push_back`, `Index`, ...) report the same conditions
/// by panicking; the `try_` forms return them.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
#[non_exhaustive]
pub enum DequeError {
    /// Indexed access at or past the current length.
    #[error("index {index} out of range for deque of length {len}")]
    OutOfRange { index: usize, len: usize },
    /// `pop_back`/`pop_front` on a deque with no elements.
    #[error("pop on an empty deque")]
    PopOnEmpty,
    /// Growth could not obtain storage. The deque is left unchanged.
    #[error("allocation failure: {0}")]
    AllocationFailure(#[from] TryReserveError),
}

impl DequeError {
    pub(crate) fn into_panic(self) -> ! {
        match self {
            DequeError::AllocationFailure(err) => err.into_panic(),
            other => panic!("{other}"),
        }
    }
}
