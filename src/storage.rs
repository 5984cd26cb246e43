use core::alloc::Layout;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::control::DELETED;
use crate::control::EMPTY;
use crate::control::GROUP_WIDTH;
use crate::control::Group;
use crate::control::PADDING;
use crate::control::is_used;
use crate::error::Error;
use crate::error::infallible;

/// Smallest slot count of any table.
pub(crate) const MIN_CAPACITY: usize = 4;

/// Offsets of the three arrays packed into one allocation:
///
/// ```text
/// | ctrl: u8 * max(capacity, 16) | slots: V * capacity | hashes: u64 * capacity? |
/// ```
///
/// The control array is never shorter than one group so that every group
/// load stays in bounds.
#[derive(Debug)]
struct DataLayout {
    layout: Layout,
    ctrl_len: usize,
    slots_offset: usize,
    hashes_offset: usize,
}

impl DataLayout {
    fn new<V>(capacity: usize, store_hash: bool) -> Result<Self, Error> {
        let ctrl_len = capacity.max(GROUP_WIDTH);
        let ctrl_layout = Layout::array::<u8>(ctrl_len).map_err(|_| Error::CapacityOverflow)?;
        let slots_layout =
            Layout::array::<MaybeUninit<V>>(capacity).map_err(|_| Error::CapacityOverflow)?;
        let hashes_layout =
            Layout::array::<MaybeUninit<u64>>(if store_hash { capacity } else { 0 })
                .map_err(|_| Error::CapacityOverflow)?;

        let (layout, slots_offset) = ctrl_layout
            .extend(slots_layout)
            .map_err(|_| Error::CapacityOverflow)?;
        let (layout, hashes_offset) = layout
            .extend(hashes_layout)
            .map_err(|_| Error::CapacityOverflow)?;

        Ok(DataLayout {
            layout: layout.pad_to_align(),
            ctrl_len,
            slots_offset,
            hashes_offset,
        })
    }
}

/// The backing store of a table: control bytes, payload slots, and optionally
/// the full hash of every slot, all in one allocation addressed by slot index.
///
/// A payload is initialized exactly when its control byte is used. Dropping
/// the storage drops every such payload and releases the allocation.
pub(crate) struct Storage<V> {
    alloc: NonNull<u8>,
    layout: DataLayout,
    capacity: usize,
    store_hash: bool,
    _phantom: PhantomData<V>,
}

// SAFETY: The storage uniquely owns its allocation and the values in it, just
// like a `Vec<V>`.
unsafe impl<V: Send> Send for Storage<V> {}
// SAFETY: Shared access only hands out `&V`.
unsafe impl<V: Sync> Sync for Storage<V> {}

impl<V> Storage<V> {
    /// Allocates storage for `capacity` slots, all empty.
    ///
    /// The previous state of any other storage is never touched, so a failure
    /// here leaves the caller's table intact.
    pub(crate) fn try_new(capacity: usize, store_hash: bool) -> Result<Self, Error> {
        debug_assert!(capacity.is_power_of_two() && capacity >= MIN_CAPACITY);

        let layout = DataLayout::new::<V>(capacity, store_hash)?;
        if layout.layout.size() > isize::MAX as usize {
            return Err(Error::CapacityOverflow);
        }

        // SAFETY: The layout always has a non-zero size since the control
        // array holds at least one group.
        let alloc = unsafe {
            let raw_alloc = alloc::alloc::alloc(layout.layout);
            if raw_alloc.is_null() {
                return Err(Error::AllocError {
                    layout: layout.layout,
                });
            }

            core::ptr::write_bytes(raw_alloc, EMPTY, capacity);
            core::ptr::write_bytes(
                raw_alloc.add(capacity),
                PADDING,
                layout.ctrl_len - capacity,
            );

            NonNull::new_unchecked(raw_alloc)
        };

        Ok(Storage {
            alloc,
            layout,
            capacity,
            store_hash,
            _phantom: PhantomData,
        })
    }

    /// Infallible variant of [`Storage::try_new`]: panics on capacity
    /// overflow and reports allocation failure through `handle_alloc_error`.
    pub(crate) fn new(capacity: usize, store_hash: bool) -> Self {
        infallible(Self::try_new(capacity, store_hash))
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub(crate) fn mask(&self) -> usize {
        self.capacity - 1
    }

    #[inline(always)]
    pub(crate) fn num_groups(&self) -> usize {
        self.layout.ctrl_len / GROUP_WIDTH
    }

    #[inline(always)]
    pub(crate) fn store_hash(&self) -> bool {
        self.store_hash
    }

    #[cfg(any(test, feature = "stats"))]
    pub(crate) fn allocated_bytes(&self) -> usize {
        self.layout.layout.size()
    }

    #[inline(always)]
    fn ctrl_ptr(&self) -> *mut u8 {
        self.alloc.as_ptr()
    }

    #[inline(always)]
    pub(crate) fn slot_ptr(&self, index: usize) -> *mut V {
        debug_assert!(index < self.capacity);
        // SAFETY: `index` is below capacity, so the offset stays inside the
        // slots array of the allocation.
        unsafe {
            self.alloc
                .as_ptr()
                .add(self.layout.slots_offset)
                .cast::<V>()
                .add(index)
        }
    }

    #[inline(always)]
    fn hash_ptr(&self, index: usize) -> *mut u64 {
        debug_assert!(self.store_hash && index < self.capacity);
        // SAFETY: Hashes are stored, so the hashes array has `capacity`
        // entries and `index` is below capacity.
        unsafe {
            self.alloc
                .as_ptr()
                .add(self.layout.hashes_offset)
                .cast::<u64>()
                .add(index)
        }
    }

    /// Reads the control byte of a slot.
    ///
    /// # Safety
    ///
    /// `index` must be below the control array length.
    #[inline(always)]
    pub(crate) unsafe fn ctrl(&self, index: usize) -> u8 {
        debug_assert!(index < self.layout.ctrl_len);
        // SAFETY: Caller ensures `index` is within the control array.
        unsafe { *self.ctrl_ptr().add(index) }
    }

    /// Writes the control byte of a slot without touching its payload.
    ///
    /// # Safety
    ///
    /// `index` must be below capacity, and the caller must construct or
    /// destroy the payload so that it stays initialized exactly when the byte
    /// is used.
    #[inline(always)]
    pub(crate) unsafe fn set_ctrl(&mut self, index: usize, ctrl: u8) {
        debug_assert!(index < self.capacity);
        // SAFETY: Caller ensures `index` is below capacity.
        unsafe { *self.ctrl_ptr().add(index) = ctrl }
    }

    /// Loads group `group` of the control array.
    ///
    /// # Safety
    ///
    /// `group` must be below `num_groups()`.
    #[inline(always)]
    pub(crate) unsafe fn group(&self, group: usize) -> Group {
        debug_assert!(group < self.num_groups());
        // SAFETY: Every group lies within the control array, which is at
        // least one group long and a multiple of the group width.
        unsafe { Group::load(self.ctrl_ptr().add(group * GROUP_WIDTH)) }
    }

    /// # Safety
    ///
    /// The slot at `index` must be used.
    #[inline(always)]
    pub(crate) unsafe fn get(&self, index: usize) -> &V {
        // SAFETY: Caller ensures the payload is initialized.
        unsafe { &*self.slot_ptr(index) }
    }

    /// # Safety
    ///
    /// The slot at `index` must be used.
    #[inline(always)]
    pub(crate) unsafe fn get_mut(&mut self, index: usize) -> &mut V {
        // SAFETY: Caller ensures the payload is initialized.
        unsafe { &mut *self.slot_ptr(index) }
    }

    /// Constructs a payload in place.
    ///
    /// # Safety
    ///
    /// `index` must be below capacity and its payload must not be
    /// initialized.
    #[inline(always)]
    pub(crate) unsafe fn write_value(&mut self, index: usize, value: V) -> &mut V {
        // SAFETY: Caller ensures the slot is in bounds and vacant.
        unsafe {
            let slot = self.slot_ptr(index);
            slot.write(value);
            &mut *slot
        }
    }

    /// Moves a payload out, leaving the slot uninitialized.
    ///
    /// # Safety
    ///
    /// The slot at `index` must be used, and the caller must mark it as not
    /// used before it can be observed again.
    #[inline(always)]
    pub(crate) unsafe fn take(&mut self, index: usize) -> V {
        // SAFETY: Caller ensures the payload is initialized.
        unsafe { self.slot_ptr(index).read() }
    }

    /// Reads the stored hash of a slot, if hashes are stored.
    ///
    /// # Safety
    ///
    /// The slot at `index` must be used.
    #[inline(always)]
    pub(crate) unsafe fn hash(&self, index: usize) -> Option<u64> {
        if !self.store_hash {
            return None;
        }
        // SAFETY: The hash of a used slot is always written on insertion.
        Some(unsafe { self.hash_ptr(index).read() })
    }

    /// Records the hash of a slot when hashes are stored; a no-op otherwise.
    ///
    /// # Safety
    ///
    /// `index` must be below capacity.
    #[inline(always)]
    pub(crate) unsafe fn write_hash(&mut self, index: usize, hash: u64) {
        if self.store_hash {
            // SAFETY: Caller ensures `index` is below capacity.
            unsafe { self.hash_ptr(index).write(hash) }
        }
    }

    /// Moves the payload and hash of `src_index` in `src` into the vacant
    /// slot `index` of `self`, marking it used with `ctrl`. The source slot is
    /// left uninitialized and must not be dropped.
    ///
    /// # Safety
    ///
    /// `src_index` must be used in `src`, `index` must be vacant in `self`,
    /// and `ctrl` must be a used control byte.
    #[inline(always)]
    pub(crate) unsafe fn move_from(
        &mut self,
        index: usize,
        ctrl: u8,
        hash: u64,
        src: &Storage<V>,
        src_index: usize,
    ) {
        debug_assert!(is_used(ctrl));
        // SAFETY: Caller ensures both slots are in bounds, the source is
        // initialized, and the destination is vacant. The two allocations are
        // distinct so the copy cannot overlap.
        unsafe {
            core::ptr::copy_nonoverlapping(src.slot_ptr(src_index), self.slot_ptr(index), 1);
            self.write_hash(index, hash);
            self.set_ctrl(index, ctrl);
        }
    }

    /// Drops every live payload and marks every slot empty, clearing
    /// tombstones.
    pub(crate) fn clear(&mut self) {
        self.drop_payloads();
        self.reset_ctrl();
    }

    /// Marks every slot empty without dropping payloads. Used after the
    /// payloads have been moved elsewhere.
    pub(crate) fn reset_ctrl(&mut self) {
        // SAFETY: The first `capacity` bytes of the allocation are the real
        // control bytes.
        unsafe { core::ptr::write_bytes(self.ctrl_ptr(), EMPTY, self.capacity) }
    }

    fn drop_payloads(&mut self) {
        if !core::mem::needs_drop::<V>() {
            return;
        }

        for group in 0..self.num_groups() {
            // SAFETY: `group` is below `num_groups()`.
            let used = unsafe { self.group(group).match_used() };
            for bit in used {
                // SAFETY: The control byte is used, so the payload is
                // initialized; it is dropped once and the caller resets the
                // control bytes afterwards.
                unsafe { self.slot_ptr(group * GROUP_WIDTH + bit).drop_in_place() }
            }
        }
    }

    /// Counts tombstones by scanning the control bytes.
    #[cfg(any(test, feature = "stats"))]
    pub(crate) fn count_deleted(&self) -> usize {
        (0..self.num_groups())
            // SAFETY: `group` is below `num_groups()`.
            .map(|group| unsafe { self.group(group).match_deleted().count() })
            .sum()
    }
}

impl<V> Drop for Storage<V> {
    fn drop(&mut self) {
        self.drop_payloads();
        // SAFETY: `alloc` was obtained from the global allocator with exactly
        // this layout.
        unsafe { alloc::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout) }
    }
}

impl<V> core::fmt::Debug for Storage<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::string::String;
        use alloc::vec::Vec;

        let groups = (0..self.num_groups())
            .map(|group| {
                let mut line = String::new();
                for offset in 0..GROUP_WIDTH {
                    if offset > 0 {
                        line.push(' ');
                    }
                    // SAFETY: Every index in a group is within the control
                    // array.
                    let ctrl = unsafe { self.ctrl(group * GROUP_WIDTH + offset) };
                    match ctrl {
                        EMPTY => line.push_str(".."),
                        DELETED => line.push_str("xx"),
                        PADDING => line.push_str("  "),
                        _ => line.push_str(&alloc::format!("{ctrl:02x}")),
                    }
                }
                line
            })
            .collect::<Vec<_>>();

        f.debug_struct("Storage")
            .field("capacity", &self.capacity)
            .field("store_hash", &self.store_hash)
            .field("ctrl", &groups)
            .finish()
    }
}
