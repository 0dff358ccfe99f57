//! Raw block table management for `SegmentedDeque`.
//!
//! This module owns the fixed-size blocks and the table that orders them,
//! similar to how `RawVec` owns the buffer of a `Vec`. It translates ring
//! slots into (block, offset) pairs and grows the table by relocating whole
//! blocks, but it does not know which slots hold live elements and never
//! reads, writes or drops them.

use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::NonNull;

use allocator_api2::alloc::{Allocator, Global};

use crate::error::TryReserveError;

/// Ordered table of owned blocks, each holding `B` slots of `T`.
///
/// Slot `s` lives in block `s / B` at offset `s % B`. Every block in the table
/// is allocated from `alloc` with the same layout and is owned by this table
/// alone.
pub(crate) struct RawBlocks<T, const B: usize, A: Allocator = Global> {
    /// Block handles in ring order
    blocks: Vec<NonNull<T>>,
    alloc: A,
    _marker: PhantomData<T>,
}

impl<T, const B: usize, A: Allocator> RawBlocks<T, B, A> {
    /// Creates an empty table without allocating.
    #[inline]
    pub(crate) const fn new_in(alloc: A) -> Self {
        Self {
            blocks: Vec::new(),
            alloc,
            _marker: PhantomData,
        }
    }

    /// Creates a table of `count` freshly allocated blocks.
    ///
    /// On error, blocks allocated so far are released when the partially built
    /// table is dropped.
    pub(crate) fn with_blocks_in(count: usize, alloc: A) -> Result<Self, TryReserveError> {
        Self::check_slot_count(count)?;
        let mut raw = Self::new_in(alloc);
        raw.blocks
            .try_reserve_exact(count)
            .map_err(|_| Self::table_error(count))?;
        for _ in 0..count {
            let block = raw.allocate_block()?;
            raw.blocks.push(block);
        }
        Ok(raw)
    }

    #[inline]
    pub(crate) fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of addressable ring slots.
    #[inline]
    pub(crate) fn total_slots(&self) -> usize {
        self.blocks.len() * B
    }

    #[inline]
    pub(crate) fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Splits a ring slot into (block_index, offset).
    #[inline]
    pub(crate) const fn locate(slot: usize) -> (usize, usize) {
        (slot / B, slot % B)
    }

    #[inline]
    pub(crate) const fn block_of(slot: usize) -> usize {
        slot / B
    }

    /// Returns a raw pointer to the given ring slot.
    ///
    /// # Safety
    ///
    /// `slot` must be less than `total_slots()`.
    #[inline]
    pub(crate) unsafe fn slot_ptr(&self, slot: usize) -> *mut T {
        debug_assert!(slot < self.total_slots());
        let (block, offset) = Self::locate(slot);
        self.blocks.get_unchecked(block).as_ptr().add(offset)
    }

    /// Doubles the table, or creates the first block when there is none.
    ///
    /// `carried` names the first and last block of the occupied run. Walking
    /// forward from `first` and wrapping at the end of the table, the blocks up
    /// to and including `last` are moved intact to positions `0..` of the new
    /// table. Blocks outside that run are released and the remaining positions
    /// are filled with fresh blocks.
    ///
    /// Every fresh block is obtained before anything is moved, so on error the
    /// table is exactly as it was. Returns the new block count.
    pub(crate) fn try_regrow(
        &mut self,
        carried: Option<(usize, usize)>,
    ) -> Result<usize, TryReserveError> {
        let old_count = self.blocks.len();
        let new_count = old_count
            .checked_mul(2)
            .ok_or(TryReserveError::CapacityOverflow)?
            .max(1);
        Self::check_slot_count(new_count)?;

        let carried_count = match carried {
            None => 0,
            Some((first, last)) if last >= first => last - first + 1,
            Some((first, last)) => old_count - first + last + 1,
        };
        debug_assert!(carried_count <= old_count);

        let mut table: Vec<NonNull<T>> = Vec::new();
        table
            .try_reserve_exact(new_count)
            .map_err(|_| Self::table_error(new_count))?;

        let fresh_count = new_count - carried_count;
        for _ in 0..fresh_count {
            match self.allocate_block() {
                Ok(block) => table.push(block),
                Err(err) => {
                    for block in table.drain(..) {
                        unsafe { self.free_block(block) };
                    }
                    return Err(err);
                }
            }
        }

        let old = std::mem::take(&mut self.blocks);
        let first = carried.map_or(0, |(first, _)| first);
        for step in 0..old_count {
            let block = old[(first + step) % old_count];
            if step < carried_count {
                table.push(block);
            } else {
                unsafe { self.free_block(block) };
            }
        }

        // Carried blocks were appended after the fresh ones
        table.rotate_left(fresh_count);
        self.blocks = table;
        Ok(new_count)
    }

    /// Releases every block, leaving an empty table.
    ///
    /// Does not drop elements; the caller must have dropped live slots first.
    pub(crate) fn release_all(&mut self) {
        for block in std::mem::take(&mut self.blocks) {
            unsafe { self.free_block(block) };
        }
    }

    fn block_layout() -> Result<Layout, TryReserveError> {
        Layout::array::<T>(B).map_err(|_| TryReserveError::CapacityOverflow)
    }

    fn check_slot_count(block_count: usize) -> Result<(), TryReserveError> {
        block_count
            .checked_mul(B)
            .map(|_| ())
            .ok_or(TryReserveError::CapacityOverflow)
    }

    fn table_error(count: usize) -> TryReserveError {
        match Layout::array::<NonNull<T>>(count) {
            Ok(layout) => TryReserveError::AllocError { layout },
            Err(_) => TryReserveError::CapacityOverflow,
        }
    }

    fn allocate_block(&self) -> Result<NonNull<T>, TryReserveError> {
        let layout = Self::block_layout()?;
        self.alloc
            .allocate(layout)
            .map(|ptr| ptr.cast::<T>())
            .map_err(|_| TryReserveError::AllocError { layout })
    }

    /// # Safety
    ///
    /// `block` must come from `allocate_block` on this table and must not be
    /// referenced afterwards.
    unsafe fn free_block(&self, block: NonNull<T>) {
        // The layout computed fine when the block was allocated
        if let Ok(layout) = Self::block_layout() {
            self.alloc.deallocate(block.cast(), layout);
        }
    }
}

impl<T, const B: usize, A: Allocator> Drop for RawBlocks<T, B, A> {
    fn drop(&mut self) {
        self.release_all();
    }
}

// Safety: RawBlocks owns its blocks exclusively; T and A decide thread safety
unsafe impl<T: Send, const B: usize, A: Allocator + Send> Send for RawBlocks<T, B, A> {}
unsafe impl<T: Sync, const B: usize, A: Allocator + Sync> Sync for RawBlocks<T, B, A> {}

#[cfg(test)]
mod tests {
    use super::*;

    type Raw4 = RawBlocks<u32, 4>;

    fn block_addrs(raw: &Raw4) -> Vec<*mut u32> {
        raw.blocks.iter().map(|b| b.as_ptr()).collect()
    }

    #[test]
    fn test_new() {
        let raw = Raw4::new_in(Global);
        assert_eq!(raw.block_count(), 0);
        assert_eq!(raw.total_slots(), 0);
    }

    #[test]
    fn test_with_blocks() {
        let raw = Raw4::with_blocks_in(3, Global).unwrap();
        assert_eq!(raw.block_count(), 3);
        assert_eq!(raw.total_slots(), 12);
    }

    #[test]
    fn test_locate() {
        assert_eq!(Raw4::locate(0), (0, 0));
        assert_eq!(Raw4::locate(3), (0, 3));
        assert_eq!(Raw4::locate(4), (1, 0));
        assert_eq!(Raw4::locate(11), (2, 3));
        assert_eq!(RawBlocks::<i32, 512>::locate(1023), (1, 511));
        assert_eq!(Raw4::block_of(7), 1);
    }

    #[test]
    fn test_first_growth() {
        let mut raw = Raw4::new_in(Global);
        assert_eq!(raw.try_regrow(None), Ok(1));
        assert_eq!(raw.total_slots(), 4);
    }

    #[test]
    fn test_regrow_moves_blocks_intact() {
        let mut raw = Raw4::with_blocks_in(2, Global).unwrap();
        unsafe {
            raw.slot_ptr(1).write(10);
            raw.slot_ptr(6).write(60);
        }
        let before = block_addrs(&raw);

        // Occupied run starts in block 1 and wraps into block 0
        assert_eq!(raw.try_regrow(Some((1, 0))), Ok(4));
        let after = block_addrs(&raw);
        assert_eq!(after[0], before[1]);
        assert_eq!(after[1], before[0]);
        unsafe {
            assert_eq!(raw.slot_ptr(2).read(), 60);
            assert_eq!(raw.slot_ptr(5).read(), 10);
        }
    }

    #[test]
    fn test_regrow_releases_uncarried_blocks() {
        let mut raw = Raw4::with_blocks_in(4, Global).unwrap();
        let before = block_addrs(&raw);
        assert_eq!(raw.try_regrow(Some((2, 3))), Ok(8));
        let after = block_addrs(&raw);
        assert_eq!(&after[..2], &before[2..]);
        assert_eq!(raw.block_count(), 8);
    }

    #[test]
    fn test_capacity_overflow() {
        let result = RawBlocks::<u8, { usize::MAX / 2 }>::with_blocks_in(3, Global);
        assert!(matches!(result, Err(TryReserveError::CapacityOverflow)));
    }

    #[test]
    fn test_release_all() {
        let mut raw = Raw4::with_blocks_in(2, Global).unwrap();
        raw.release_all();
        assert_eq!(raw.block_count(), 0);
        raw.release_all();
        assert_eq!(raw.total_slots(), 0);
    }

    #[test]
    fn test_zst() {
        let mut raw: RawBlocks<(), 512> = RawBlocks::new_in(Global);
        raw.try_regrow(None).unwrap();
        raw.try_regrow(Some((0, 0))).unwrap();
        assert_eq!(raw.total_slots(), 1024);
    }
}
