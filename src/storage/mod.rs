//! # Storage Layer
//!
//! The paged block store underneath the tree engine:
//!
//! - [`file`]: `StoreFile`, the file substrate — owns the descriptor,
//!   grows the file, maps byte ranges
//! - [`cache`]: `BlockCache` and the `BlockRef` pin guard — fixed-size
//!   memory-mapped blocks with LRU eviction
//!
//! On-disk structures are viewed in place through `zerocopy`: a block's
//! memory image is its disk image, and the helpers below turn a byte slice
//! into a typed reference without copying. Every on-disk struct in this
//! crate is `Unaligned`, so the casts can only fail on a short buffer.

mod cache;
mod file;

pub use cache::{BlockCache, BlockRef};
pub use file::StoreFile;

use eyre::Result;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Views the leading bytes of `bytes` as a `T`, in place.
#[inline]
pub(crate) fn view<T>(bytes: &[u8]) -> Result<&T>
where
    T: FromBytes + KnownLayout + Immutable + Unaligned,
{
    let (value, _) = T::ref_from_prefix(bytes).map_err(|e| {
        eyre::eyre!(
            "buffer unusable as {}: {:?}",
            core::any::type_name::<T>(),
            e
        )
    })?;
    Ok(value)
}

/// Views the leading bytes of `bytes` as a mutable `T`, in place.
#[inline]
pub(crate) fn view_mut<T>(bytes: &mut [u8]) -> Result<&mut T>
where
    T: FromBytes + IntoBytes + KnownLayout + Unaligned,
{
    let (value, _) = T::mut_from_prefix(bytes).map_err(|e| {
        eyre::eyre!(
            "buffer unusable as {}: {:?}",
            core::any::type_name::<T>(),
            e
        )
    })?;
    Ok(value)
}
