//! Per-slot control bytes and 16-wide group scans.
//!
//! Every slot owns one control byte. A used slot stores the top seven bits of
//! its hash (the fragment), so the high bit is clear. Every other state sets
//! the high bit, which lets SSE2 `movemask` find used slots in one
//! instruction.
//!
//! | byte          | state                                   |
//! |---------------|-----------------------------------------|
//! | `0b0hhh_hhhh` | used, `hhhhhhh` is the hash fragment    |
//! | `0x80`        | empty                                   |
//! | `0xFE`        | deleted (tombstone)                     |
//! | `0xFF`        | padding past the last slot of the table |

/// Number of slots scanned together. Probing advances one group at a time.
pub(crate) const GROUP_WIDTH: usize = 16;

/// Control byte of a slot that has never held a value since the last rehash.
pub(crate) const EMPTY: u8 = 0x80;

/// Control byte of a slot whose value was erased while its group was full.
pub(crate) const DELETED: u8 = 0xFE;

/// Control byte for the tail of tables smaller than a single group. Never
/// matches a fragment, `EMPTY`, or `DELETED`.
pub(crate) const PADDING: u8 = 0xFF;

/// Extracts the seven-bit fragment stored in a used control byte.
///
/// The low bits of the hash pick the home slot, so the fragment is taken from
/// the top of the hash to keep the two independent.
#[inline(always)]
pub(crate) fn fragment(hash: u64) -> u8 {
    (hash >> 57) as u8
}

#[inline(always)]
pub(crate) fn is_used(ctrl: u8) -> bool {
    ctrl & 0x80 == 0
}

#[inline(always)]
pub(crate) fn is_empty(ctrl: u8) -> bool {
    ctrl == EMPTY
}

#[inline(always)]
pub(crate) fn is_deleted(ctrl: u8) -> bool {
    ctrl == DELETED
}

/// The result of a group query. Bit `i` corresponds to slot `i` of the group,
/// so the lowest set bit is always the lowest matching slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BitMask(pub(crate) u16);

impl BitMask {
    #[inline(always)]
    pub(crate) fn any_bit_set(self) -> bool {
        self.0 != 0
    }

    #[inline(always)]
    pub(crate) fn lowest_set_bit(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    #[inline(always)]
    pub(crate) fn remove_lowest_bit(self) -> Self {
        BitMask(self.0 & self.0.wrapping_sub(1))
    }

    /// Clears every bit below `offset`.
    #[inline(always)]
    pub(crate) fn from_offset(self, offset: usize) -> Self {
        debug_assert!(offset < GROUP_WIDTH);
        BitMask(self.0 & (u16::MAX << offset))
    }

    #[inline(always)]
    pub(crate) fn count(self) -> usize {
        self.0.count_ones() as usize
    }
}

impl core::ops::BitOr for BitMask {
    type Output = BitMask;

    #[inline(always)]
    fn bitor(self, rhs: Self) -> Self::Output {
        BitMask(self.0 | rhs.0)
    }
}

impl Iterator for BitMask {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        let bit = self.lowest_set_bit()?;
        *self = self.remove_lowest_bit();
        Some(bit)
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))] {
        use core::arch::x86_64::*;

        /// Sixteen control bytes loaded into one SSE2 register.
        #[derive(Clone, Copy)]
        pub(crate) struct Group(__m128i);

        impl Group {
            /// Loads the group starting at `ptr`.
            ///
            /// # Safety
            ///
            /// `ptr` must be valid for reads of `GROUP_WIDTH` bytes. No
            /// alignment is required.
            #[inline(always)]
            pub(crate) unsafe fn load(ptr: *const u8) -> Self {
                // SAFETY: Caller guarantees 16 readable bytes at `ptr`.
                unsafe { Group(_mm_loadu_si128(ptr as *const __m128i)) }
            }

            #[inline(always)]
            fn match_byte(self, byte: u8) -> BitMask {
                // SAFETY: SSE2 is statically enabled for this target.
                unsafe {
                    let cmp = _mm_cmpeq_epi8(self.0, _mm_set1_epi8(byte as i8));
                    BitMask(_mm_movemask_epi8(cmp) as u16)
                }
            }

            /// Slots whose high bit is clear.
            #[inline(always)]
            pub(crate) fn match_used(self) -> BitMask {
                // SAFETY: SSE2 is statically enabled for this target.
                unsafe { BitMask(!(_mm_movemask_epi8(self.0) as u16)) }
            }
        }
    } else {
        /// Sixteen control bytes scanned one at a time.
        #[derive(Clone, Copy)]
        pub(crate) struct Group([u8; GROUP_WIDTH]);

        impl Group {
            /// Loads the group starting at `ptr`.
            ///
            /// # Safety
            ///
            /// `ptr` must be valid for reads of `GROUP_WIDTH` bytes. No
            /// alignment is required.
            #[inline(always)]
            pub(crate) unsafe fn load(ptr: *const u8) -> Self {
                // SAFETY: Caller guarantees 16 readable bytes at `ptr`.
                unsafe { Group(core::ptr::read_unaligned(ptr as *const [u8; GROUP_WIDTH])) }
            }

            #[inline(always)]
            fn match_byte(self, byte: u8) -> BitMask {
                let mut bits: u16 = 0;
                for (i, &ctrl) in self.0.iter().enumerate() {
                    if ctrl == byte {
                        bits |= 1 << i;
                    }
                }
                BitMask(bits)
            }

            /// Slots whose high bit is clear.
            #[inline(always)]
            pub(crate) fn match_used(self) -> BitMask {
                let mut bits: u16 = 0;
                for (i, &ctrl) in self.0.iter().enumerate() {
                    if is_used(ctrl) {
                        bits |= 1 << i;
                    }
                }
                BitMask(bits)
            }
        }
    }
}

impl Group {
    /// Used slots carrying `fragment`. A hit only means the full key is worth
    /// comparing.
    #[inline(always)]
    pub(crate) fn match_fragment(self, fragment: u8) -> BitMask {
        debug_assert!(is_used(fragment));
        self.match_byte(fragment)
    }

    #[inline(always)]
    pub(crate) fn match_empty(self) -> BitMask {
        self.match_byte(EMPTY)
    }

    #[inline(always)]
    pub(crate) fn match_deleted(self) -> BitMask {
        self.match_byte(DELETED)
    }

    #[inline(always)]
    pub(crate) fn match_empty_or_deleted(self) -> BitMask {
        self.match_empty() | self.match_deleted()
    }
}
