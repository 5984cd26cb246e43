use core::alloc::Layout;
use core::fmt;

/// Errors reported by fallible table operations.
///
/// Lookups never fail: absence is reported with `None`, `false`, `0`, or an
/// end cursor. Only [`HashMap::at`](crate::HashMap::at) turns a missing key
/// into [`Error::KeyNotFound`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The requested key is not present.
    KeyNotFound,
    /// The required capacity exceeds what can be addressed.
    CapacityOverflow,
    /// The allocator failed to provide memory for the given layout.
    AllocError {
        /// The layout that could not be allocated.
        layout: Layout,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KeyNotFound => f.write_str("key not found"),
            Error::CapacityOverflow => f.write_str("capacity overflow"),
            Error::AllocError { layout } => write!(
                f,
                "memory allocation of {} bytes (align {}) failed",
                layout.size(),
                layout.align()
            ),
        }
    }
}

impl core::error::Error for Error {}

/// Unwraps the result of a fallible allocation the way the standard
/// collections do: overflow panics, allocator failure aborts through
/// `handle_alloc_error`.
#[inline]
pub(crate) fn infallible<T>(result: Result<T, Error>) -> T {
    match result {
        Ok(value) => value,
        Err(Error::AllocError { layout }) => alloc::alloc::handle_alloc_error(layout),
        Err(_) => panic!("capacity overflow"),
    }
}

/// Allocates an empty vector able to hold `len` items without reallocating.
pub(crate) fn try_vec_with_capacity<T>(len: usize) -> Result<alloc::vec::Vec<T>, Error> {
    let mut vec = alloc::vec::Vec::new();
    try_reserve_exact(&mut vec, len)?;
    Ok(vec)
}

/// Grows `vec` to hold `additional` more items, leaving it untouched on
/// failure.
pub(crate) fn try_reserve_exact<T>(
    vec: &mut alloc::vec::Vec<T>,
    additional: usize,
) -> Result<(), Error> {
    if vec.try_reserve_exact(additional).is_err() {
        let total = vec
            .len()
            .checked_add(additional)
            .ok_or(Error::CapacityOverflow)?;
        let layout = Layout::array::<T>(total).map_err(|_| Error::CapacityOverflow)?;
        return Err(Error::AllocError { layout });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn scratch_overflow() {
        assert_eq!(
            try_vec_with_capacity::<u64>(usize::MAX).err(),
            Some(Error::CapacityOverflow)
        );
        assert!(try_vec_with_capacity::<u64>(16).unwrap().capacity() >= 16);
    }

    #[test]
    fn display() {
        assert_eq!(Error::KeyNotFound.to_string(), "key not found");
        assert_eq!(Error::CapacityOverflow.to_string(), "capacity overflow");
        let layout = Layout::from_size_align(64, 8).unwrap();
        assert_eq!(
            Error::AllocError { layout }.to_string(),
            "memory allocation of 64 bytes (align 8) failed"
        );
    }
}
