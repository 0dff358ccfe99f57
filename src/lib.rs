//! A double-ended queue stored as a ring of fixed-size blocks.
//!
//! `SegmentedDeque` gives amortized O(1) push and pop at both ends and O(1)
//! indexed access. Elements live in blocks of `B` slots (512 by default) that
//! are addressed as one circular range of `B * block_count` slots, so the
//! occupied range may wrap past the last block back to the first.
//!
//! When the ring runs out of room the block table doubles. Occupied blocks are
//! relocated whole to the front of the new table: no element is copied, and
//! the data ends up un-wrapped.
//!
//! # Example
//!
//! ```
//! use segmented_deque::SegmentedDeque;
//!
//! let mut deque: SegmentedDeque<i32> = SegmentedDeque::new();
//! deque.push_back(1);
//! deque.push_back(2);
//! deque.push_front(0);
//! assert_eq!(deque.len(), 3);
//!
//! assert_eq!(deque.pop_front(), Some(0));
//! assert_eq!(deque[0], 1);
//! assert_eq!(deque[1], 2);
//! ```
//!
//! Checked forms report misuse instead of panicking:
//!
//! ```
//! use segmented_deque::{DequeError, SegmentedDeque};
//!
//! let mut deque: SegmentedDeque<u8> = SegmentedDeque::from([7]);
//! assert_eq!(deque.try_get(1), Err(DequeError::OutOfRange { index: 1, len: 1 }));
//! assert_eq!(deque.try_pop_back(), Ok(7));
//! assert_eq!(deque.try_pop_back(), Err(DequeError::PopOnEmpty));
//! ```

mod error;
mod raw_blocks;

pub use allocator_api2::alloc::{Allocator, Global};
pub use error::{DequeError, TryReserveError};

use log::{debug, trace};
use raw_blocks::RawBlocks;
use std::hash::{Hash, Hasher};
use std::ops::{Index, IndexMut};

/// Block capacity used when none is given.
pub const DEFAULT_BLOCK_CAPACITY: usize = 512;

/// Occupied part of the ring, `left` and `right` inclusive.
///
/// When `right < left` the range wraps through the last slot back to slot 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Ring {
    left: usize,
    right: usize,
}

impl Ring {
    #[inline]
    const fn at(slot: usize) -> Self {
        Self {
            left: slot,
            right: slot,
        }
    }

    #[inline]
    const fn len(self, total_slots: usize) -> usize {
        if self.right >= self.left {
            self.right - self.left + 1
        } else {
            total_slots - (self.left - self.right - 1)
        }
    }
}

/// A double-ended queue over a ring of fixed-size blocks.
///
/// # Memory Layout
///
/// Storage is a table of blocks, each an independent allocation of `B` slots.
/// Ring slot `s` lives in block `s / B` at offset `s % B`. The live elements
/// occupy the circular slot range `[left, right]`; every other slot is
/// uninitialized.
///
/// Two rules keep growth cheap:
/// - the back never advances into the block holding the front from below,
/// - the front never retreats into the block holding the back from above.
///
/// So when either rule would be broken, every block lies in the occupied run
/// and the table can be doubled by moving block handles alone.
///
/// Capacity only grows. [`clear`](SegmentedDeque::clear) is the one operation
/// that releases blocks.
///
/// # Type parameters
///
/// | Parameter | Meaning |
/// |-----------|---------|
/// | `T` | Element type |
/// | `B` | Slots per block, must be non-zero |
/// | `A` | Allocator the blocks come from |
pub struct SegmentedDeque<T, const B: usize = DEFAULT_BLOCK_CAPACITY, A: Allocator = Global> {
    /// Block table and allocator
    buf: RawBlocks<T, B, A>,
    /// Occupied range, `None` when empty
    ring: Option<Ring>,
}

impl<T> SegmentedDeque<T> {
    /// Creates an empty deque with the default block capacity.
    ///
    /// Does not allocate until an element is pushed.
    ///
    /// # Example
    ///
    /// ```
    /// use segmented_deque::SegmentedDeque;
    /// let deque: SegmentedDeque<i32> = SegmentedDeque::new();
    /// assert!(deque.is_empty());
    /// assert_eq!(deque.capacity(), 0);
    /// ```
    #[inline]
    pub const fn new() -> Self {
        Self::new_in(Global)
    }

    /// Creates a deque of `len` default-valued elements.
    ///
    /// Allocates exactly enough blocks to hold `len` elements.
    ///
    /// # Example
    ///
    /// ```
    /// use segmented_deque::SegmentedDeque;
    /// let deque: SegmentedDeque<u64> = SegmentedDeque::with_len(1000);
    /// assert_eq!(deque.len(), 1000);
    /// assert_eq!(deque.block_count(), 2);
    /// assert_eq!(deque[999], 0);
    /// ```
    pub fn with_len(len: usize) -> Self
    where
        T: Default,
    {
        Self::with_len_in(len, Global)
    }
}

impl<T, const B: usize, A: Allocator> SegmentedDeque<T, B, A> {
    /// Number of element slots in each block.
    pub const BLOCK_CAPACITY: usize = B;

    const NON_EMPTY_BLOCK: () = assert!(B > 0, "SegmentedDeque block capacity must be non-zero");

    /// Creates an empty deque whose blocks will come from `alloc`.
    #[inline]
    pub const fn new_in(alloc: A) -> Self {
        let () = Self::NON_EMPTY_BLOCK;
        Self {
            buf: RawBlocks::new_in(alloc),
            ring: None,
        }
    }

    /// Creates a deque of `len` default-valued elements in `alloc`.
    ///
    /// # Panics
    ///
    /// Panics if allocation fails.
    pub fn with_len_in(len: usize, alloc: A) -> Self
    where
        T: Default,
    {
        Self::try_with_len_in(len, alloc).unwrap_or_else(|err| err.into_panic())
    }

    /// Fallible form of [`with_len_in`](SegmentedDeque::with_len_in).
    pub fn try_with_len_in(len: usize, alloc: A) -> Result<Self, DequeError>
    where
        T: Default,
    {
        let mut deque = Self::try_sized_in(len, alloc)?;
        for _ in 0..len {
            deque.try_push_back(T::default())?;
        }
        Ok(deque)
    }

    /// Empty deque with enough blocks for `len` elements.
    ///
    /// Pushing up to `len` elements at the back will not grow it.
    fn try_sized_in(len: usize, alloc: A) -> Result<Self, DequeError> {
        let () = Self::NON_EMPTY_BLOCK;
        Ok(Self {
            buf: RawBlocks::with_blocks_in(len.div_ceil(B), alloc)?,
            ring: None,
        })
    }

    /// Returns the number of elements in the deque.
    ///
    /// Computed from the ring bounds; never scans storage.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.map_or(0, |ring| ring.len(self.buf.total_slots()))
    }

    /// Returns `true` if the deque contains no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_none()
    }

    /// Total number of ring slots across all blocks.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.total_slots()
    }

    /// Number of allocated blocks.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.buf.block_count()
    }

    /// Returns a reference to the underlying allocator.
    #[inline]
    pub fn allocator(&self) -> &A {
        self.buf.allocator()
    }

    /// Appends an element to the back of the deque.
    ///
    /// # Panics
    ///
    /// Panics if growth cannot obtain memory.
    ///
    /// # Example
    ///
    /// ```
    /// use segmented_deque::SegmentedDeque;
    /// let mut deque: SegmentedDeque<i32> = SegmentedDeque::new();
    /// deque.push_back(1);
    /// deque.push_back(2);
    /// assert_eq!(deque.back(), Some(&2));
    /// ```
    #[inline]
    pub fn push_back(&mut self, value: T) {
        if let Err(err) = self.try_push_back(value) {
            err.into_panic();
        }
    }

    /// Appends an element to the back, reporting allocation failure.
    ///
    /// On error the deque is unchanged and `value` is dropped.
    pub fn try_push_back(&mut self, value: T) -> Result<(), DequeError> {
        let slot = match self.ring {
            None => self.open_ring()?,
            Some(ring) => {
                let ring = if self.back_is_full(ring) {
                    self.grow(ring)?
                } else {
                    ring
                };
                let slot = self.next_slot(ring.right);
                self.ring = Some(Ring { right: slot, ..ring });
                slot
            }
        };
        unsafe { self.buf.slot_ptr(slot).write(value) };
        Ok(())
    }

    /// Prepends an element to the front of the deque.
    ///
    /// # Panics
    ///
    /// Panics if growth cannot obtain memory.
    ///
    /// # Example
    ///
    /// ```
    /// use segmented_deque::SegmentedDeque;
    /// let mut deque: SegmentedDeque<i32> = SegmentedDeque::new();
    /// deque.push_front(1);
    /// deque.push_front(2);
    /// assert_eq!(deque[0], 2);
    /// ```
    #[inline]
    pub fn push_front(&mut self, value: T) {
        if let Err(err) = self.try_push_front(value) {
            err.into_panic();
        }
    }

    /// Prepends an element to the front, reporting allocation failure.
    ///
    /// On error the deque is unchanged and `value` is dropped.
    pub fn try_push_front(&mut self, value: T) -> Result<(), DequeError> {
        let slot = match self.ring {
            None => self.open_ring()?,
            Some(ring) => {
                let ring = if self.front_is_full(ring) {
                    self.grow(ring)?
                } else {
                    ring
                };
                let slot = self.prev_slot(ring.left);
                self.ring = Some(Ring { left: slot, ..ring });
                slot
            }
        };
        unsafe { self.buf.slot_ptr(slot).write(value) };
        Ok(())
    }

    /// Removes the last element and returns it, or `None` if empty.
    ///
    /// The slot it occupied stays allocated.
    ///
    /// # Example
    ///
    /// ```
    /// use segmented_deque::SegmentedDeque;
    /// let mut deque: SegmentedDeque<i32> = SegmentedDeque::from([1, 2]);
    /// assert_eq!(deque.pop_back(), Some(2));
    /// assert_eq!(deque.pop_back(), Some(1));
    /// assert_eq!(deque.pop_back(), None);
    /// ```
    pub fn pop_back(&mut self) -> Option<T> {
        let ring = self.ring?;
        self.ring = if ring.left == ring.right {
            None
        } else {
            let right = self.prev_slot(ring.right);
            Some(Ring { right, ..ring })
        };
        Some(unsafe { self.buf.slot_ptr(ring.right).read() })
    }

    /// Removes the first element and returns it, or `None` if empty.
    pub fn pop_front(&mut self) -> Option<T> {
        let ring = self.ring?;
        self.ring = if ring.left == ring.right {
            None
        } else {
            let left = self.next_slot(ring.left);
            Some(Ring { left, ..ring })
        };
        Some(unsafe { self.buf.slot_ptr(ring.left).read() })
    }

    /// Removes the last element, or reports [`DequeError::PopOnEmpty`].
    pub fn try_pop_back(&mut self) -> Result<T, DequeError> {
        self.pop_back().ok_or(DequeError::PopOnEmpty)
    }

    /// Removes the first element, or reports [`DequeError::PopOnEmpty`].
    pub fn try_pop_front(&mut self) -> Result<T, DequeError> {
        self.pop_front().ok_or(DequeError::PopOnEmpty)
    }

    /// Returns a reference to the element at `index`, counted from the front.
    ///
    /// Returns `None` if the index is out of bounds.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        let slot = self.slot_for(index)?;
        Some(unsafe { &*self.buf.slot_ptr(slot) })
    }

    /// Returns a mutable reference to the element at `index`.
    ///
    /// Returns `None` if the index is out of bounds.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        let slot = self.slot_for(index)?;
        Some(unsafe { &mut *self.buf.slot_ptr(slot) })
    }

    /// Like [`get`](SegmentedDeque::get), reporting [`DequeError::OutOfRange`].
    pub fn try_get(&self, index: usize) -> Result<&T, DequeError> {
        let len = self.len();
        self.get(index).ok_or(DequeError::OutOfRange { index, len })
    }

    /// Like [`get_mut`](SegmentedDeque::get_mut), reporting [`DequeError::OutOfRange`].
    pub fn try_get_mut(&mut self, index: usize) -> Result<&mut T, DequeError> {
        let len = self.len();
        self.get_mut(index).ok_or(DequeError::OutOfRange { index, len })
    }

    /// Returns a reference to the first element, or `None` if empty.
    #[inline]
    pub fn front(&self) -> Option<&T> {
        let ring = self.ring?;
        Some(unsafe { &*self.buf.slot_ptr(ring.left) })
    }

    /// Returns a mutable reference to the first element, or `None` if empty.
    #[inline]
    pub fn front_mut(&mut self) -> Option<&mut T> {
        let ring = self.ring?;
        Some(unsafe { &mut *self.buf.slot_ptr(ring.left) })
    }

    /// Returns a reference to the last element, or `None` if empty.
    #[inline]
    pub fn back(&self) -> Option<&T> {
        let ring = self.ring?;
        Some(unsafe { &*self.buf.slot_ptr(ring.right) })
    }

    /// Returns a mutable reference to the last element, or `None` if empty.
    #[inline]
    pub fn back_mut(&mut self) -> Option<&mut T> {
        let ring = self.ring?;
        Some(unsafe { &mut *self.buf.slot_ptr(ring.right) })
    }

    /// Drops every element and releases every block.
    ///
    /// Afterwards the deque is in the same state as a new one. Calling it on an
    /// empty deque is a no-op apart from freeing retained blocks.
    pub fn clear(&mut self) {
        self.drop_elements();
        if self.buf.block_count() > 0 {
            trace!("releasing {} blocks", self.buf.block_count());
        }
        self.buf.release_all();
    }

    /// Exchanges the entire contents of two deques in O(1).
    ///
    /// # Example
    ///
    /// ```
    /// use segmented_deque::SegmentedDeque;
    /// let mut a: SegmentedDeque<i32> = SegmentedDeque::from([1, 2]);
    /// let mut b: SegmentedDeque<i32> = SegmentedDeque::from([3]);
    /// a.swap_with(&mut b);
    /// assert_eq!(a, SegmentedDeque::from([3]));
    /// assert_eq!(b, SegmentedDeque::from([1, 2]));
    /// ```
    #[inline]
    pub fn swap_with(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Maps a position counted from the front to its ring slot.
    ///
    /// `index < len <= total_slots`, so a single wrap is enough.
    #[inline]
    fn slot_for(&self, index: usize) -> Option<usize> {
        let ring = self.ring?;
        let total = self.buf.total_slots();
        if index >= ring.len(total) {
            return None;
        }
        let slot = ring.left + index;
        Some(if slot >= total { slot - total } else { slot })
    }

    #[inline]
    fn next_slot(&self, slot: usize) -> usize {
        if slot + 1 == self.buf.total_slots() {
            0
        } else {
            slot + 1
        }
    }

    #[inline]
    fn prev_slot(&self, slot: usize) -> usize {
        if slot == 0 {
            self.buf.total_slots() - 1
        } else {
            slot - 1
        }
    }

    /// Whether the next back slot would enter the front's block from below.
    #[inline]
    fn back_is_full(&self, ring: Ring) -> bool {
        let next = self.next_slot(ring.right);
        next <= ring.left
            && RawBlocks::<T, B, A>::block_of(next) == RawBlocks::<T, B, A>::block_of(ring.left)
    }

    /// Whether the next front slot would enter the back's block from above.
    #[inline]
    fn front_is_full(&self, ring: Ring) -> bool {
        let prev = self.prev_slot(ring.left);
        ring.right <= prev
            && RawBlocks::<T, B, A>::block_of(prev) == RawBlocks::<T, B, A>::block_of(ring.right)
    }

    /// Starts a one-element ring at slot 0, allocating the first block if
    /// there is none yet.
    fn open_ring(&mut self) -> Result<usize, DequeError> {
        if self.buf.block_count() == 0 {
            self.buf.try_regrow(None).map_err(|err| {
                debug!("first block allocation failed: {err}");
                DequeError::from(err)
            })?;
        }
        self.ring = Some(Ring::at(0));
        Ok(0)
    }

    /// Doubles the block table and un-wraps the ring.
    ///
    /// The block holding `left` moves to position 0, so `left` keeps only its
    /// offset and the elements end up contiguous from there. One free slot is
    /// then guaranteed at each end.
    #[cold]
    #[inline(never)]
    fn grow(&mut self, ring: Ring) -> Result<Ring, DequeError> {
        let len = ring.len(self.buf.total_slots());
        let old_blocks = self.buf.block_count();
        let first = RawBlocks::<T, B, A>::block_of(ring.left);
        let last = RawBlocks::<T, B, A>::block_of(ring.right);

        let new_blocks = self.buf.try_regrow(Some((first, last))).map_err(|err| {
            debug!("growth from {old_blocks} blocks failed with {len} elements: {err}");
            DequeError::from(err)
        })?;
        trace!("grew block table from {old_blocks} to {new_blocks} blocks with {len} elements");

        let left = ring.left % B;
        let ring = Ring {
            left,
            right: left + len - 1,
        };
        self.ring = Some(ring);
        Ok(ring)
    }

    /// Drops the live elements and marks the deque empty, keeping the blocks.
    fn drop_elements(&mut self) {
        // Forget the ring BEFORE dropping so a panicking drop can't double-free
        let Some(ring) = self.ring.take() else {
            return;
        };
        if !std::mem::needs_drop::<T>() {
            return;
        }
        let total = self.buf.total_slots();
        let mut slot = ring.left;
        for _ in 0..ring.len(total) {
            unsafe { std::ptr::drop_in_place(self.buf.slot_ptr(slot)) };
            slot = if slot + 1 == total { 0 } else { slot + 1 };
        }
    }
}

impl<T: Clone, const B: usize> SegmentedDeque<T, B> {
    /// Creates a deque holding clones of `values`, in order.
    ///
    /// # Example
    ///
    /// ```
    /// use segmented_deque::SegmentedDeque;
    /// let deque: SegmentedDeque<i32> = SegmentedDeque::from_slice(&[1, 2, 3]);
    /// assert_eq!(deque.len(), 3);
    /// assert_eq!(deque[2], 3);
    /// ```
    pub fn from_slice(values: &[T]) -> Self {
        let mut deque =
            Self::try_sized_in(values.len(), Global).unwrap_or_else(|err| err.into_panic());
        for value in values {
            deque.push_back(value.clone());
        }
        deque
    }
}

// Trait implementations
impl<T, const B: usize, A: Allocator> Drop for SegmentedDeque<T, B, A> {
    fn drop(&mut self) {
        self.drop_elements();
        // RawBlocks will be dropped automatically and free the blocks
    }
}

impl<T: Clone, const B: usize, A: Allocator + Clone> Clone for SegmentedDeque<T, B, A> {
    /// Deep copy into a freshly sized deque, element by element in order.
    ///
    /// No block is shared with `self`. `clone_from` keeps its default
    /// behaviour: build the copy, then replace and drop the old contents.
    fn clone(&self) -> Self {
        let len = self.len();
        let mut copy = Self::try_sized_in(len, self.allocator().clone())
            .unwrap_or_else(|err| err.into_panic());
        for index in 0..len {
            copy.push_back(self[index].clone());
        }
        copy
    }
}

impl<T: PartialEq, const B: usize, A: Allocator> PartialEq for SegmentedDeque<T, B, A> {
    fn eq(&self, other: &Self) -> bool {
        let len = self.len();
        len == other.len() && (0..len).all(|i| self[i] == other[i])
    }
}

impl<T: Eq, const B: usize, A: Allocator> Eq for SegmentedDeque<T, B, A> {}

impl<T: Hash, const B: usize, A: Allocator> Hash for SegmentedDeque<T, B, A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let len = self.len();
        state.write_usize(len);
        for index in 0..len {
            self[index].hash(state);
        }
    }
}

impl<T: std::fmt::Debug, const B: usize, A: Allocator> std::fmt::Debug
    for SegmentedDeque<T, B, A>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries((0..self.len()).map(|i| &self[i]))
            .finish()
    }
}

impl<T, const B: usize> Default for SegmentedDeque<T, B> {
    fn default() -> Self {
        Self::new_in(Global)
    }
}

impl<T, const B: usize, A: Allocator> Index<usize> for SegmentedDeque<T, B, A> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        match self.try_get(index) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<T, const B: usize, A: Allocator> IndexMut<usize> for SegmentedDeque<T, B, A> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        let len = self.len();
        match self.get_mut(index) {
            Some(value) => value,
            None => panic!("{}", DequeError::OutOfRange { index, len }),
        }
    }
}

impl<T, const B: usize, const N: usize> From<[T; N]> for SegmentedDeque<T, B> {
    /// Builds the deque from a literal list, front to back.
    fn from(values: [T; N]) -> Self {
        let mut deque = Self::try_sized_in(N, Global).unwrap_or_else(|err| err.into_panic());
        for value in values {
            deque.push_back(value);
        }
        deque
    }
}

impl<T, const B: usize, A: Allocator> Extend<T> for SegmentedDeque<T, B, A> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push_back(item);
        }
    }
}

impl<'a, T: Clone + 'a, const B: usize, A: Allocator> Extend<&'a T> for SegmentedDeque<T, B, A> {
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        for item in iter {
            self.push_back(item.clone());
        }
    }
}

impl<T, const B: usize> FromIterator<T> for SegmentedDeque<T, B> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        let mut deque = Self::try_sized_in(lower, Global).unwrap_or_else(|err| err.into_panic());
        deque.extend(iter);
        deque
    }
}
