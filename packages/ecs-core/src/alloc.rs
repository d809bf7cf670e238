//! Native virtual memory allocator: reserve/commit/decommit over a fixed address range.
//!
//! The one module in the crate where raw OS calls are unavoidable; every
//! other module treats memory as already reserved and committed. `reserve`
//! maps address space without touching physical pages; `commit` makes a
//! range readable/writable and zero-filled; `decommit` releases the physical
//! pages while keeping the mapping, so a later `commit` of the same range
//! reads zero again.

use crate::error::{EcsError, EcsResult};

/// 64 KiB — the alignment every reservation and chunk boundary honors.
pub const VM_ALIGN: usize = 65536;

/// A contiguous, page-aligned region of reserved (not necessarily committed)
/// virtual address space.
#[derive(Debug)]
pub struct VirtualRegion {
    ptr: *mut u8,
    len: usize,
}

unsafe impl Send for VirtualRegion {}
unsafe impl Sync for VirtualRegion {}

impl VirtualRegion {
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reserves `len` bytes of address space, rounded up to `VM_ALIGN`,
    /// without committing physical pages.
    pub fn reserve(len: usize) -> EcsResult<Self> {
        if len == 0 {
            return Err(EcsError::InvalidArgument(
                "reserve: length must be non-zero".into(),
            ));
        }
        let aligned_len = align_up(len, VM_ALIGN)?;
        // SAFETY: mmap with PROT_NONE and an anonymous, non-fixed mapping
        // never touches caller memory and cannot fail to honor the length
        // argument; the returned pointer is either valid for `aligned_len`
        // bytes or MAP_FAILED, which we check below.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                aligned_len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(EcsError::PlatformError(format!(
                "mmap reserve failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(Self {
            ptr: ptr as *mut u8,
            len: aligned_len,
        })
    }

    /// Makes `[offset, offset+len)` readable/writable and zero-filled.
    /// Idempotent on already-committed pages.
    pub fn commit(&self, offset: usize, len: usize) -> EcsResult<()> {
        let (ptr, len) = self.sub_range(offset, len)?;
        // SAFETY: `ptr`/`len` were bounds-checked against this region by
        // `sub_range` and the region stays alive for the duration of the
        // call (borrowed via `&self`).
        let rc = unsafe { libc::mprotect(ptr as *mut libc::c_void, len, libc::PROT_READ | libc::PROT_WRITE) };
        if rc != 0 {
            return Err(EcsError::PlatformError(format!(
                "mprotect commit failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    /// Releases physical pages backing `[offset, offset+len)`. The mapping
    /// stays intact; a later `commit` of the same range reads zero.
    pub fn decommit(&self, offset: usize, len: usize) -> EcsResult<()> {
        let (ptr, len) = self.sub_range(offset, len)?;
        // SAFETY: same bounds argument as `commit`. MADV_DONTNEED on Linux
        // guarantees the range reads as zero after the next fault; we also
        // drop the PROT_READ|PROT_WRITE mapping so touching it outside a
        // `commit` segfaults instead of silently reading stale data.
        unsafe {
            libc::madvise(ptr as *mut libc::c_void, len, libc::MADV_DONTNEED);
            let rc = libc::mprotect(ptr as *mut libc::c_void, len, libc::PROT_NONE);
            if rc != 0 {
                return Err(EcsError::PlatformError(format!(
                    "mprotect decommit failed: {}",
                    std::io::Error::last_os_error()
                )));
            }
        }
        Ok(())
    }

    fn sub_range(&self, offset: usize, len: usize) -> EcsResult<(*mut u8, usize)> {
        if len == 0 {
            return Err(EcsError::InvalidArgument(
                "commit/decommit: length must be non-zero".into(),
            ));
        }
        let end = offset
            .checked_add(len)
            .ok_or(EcsError::CapacityOverflow { operation: "sub_range" })?;
        if end > self.len {
            return Err(EcsError::InvalidArgument(format!(
                "range [{offset}, {end}) exceeds reserved length {}",
                self.len
            )));
        }
        // SAFETY: `offset <= self.len` was just checked, so the resulting
        // pointer stays within the allocation `self.ptr` originated from.
        Ok((unsafe { self.ptr.add(offset) }, len))
    }
}

impl Drop for VirtualRegion {
    fn drop(&mut self) {
        free(self.ptr, self.len);
    }
}

/// Releases the mapping backing `[ptr, ptr+len)`. `free(NULL, _)` is a no-op.
///
/// # Safety
/// `ptr`/`len` must be exactly the pointer and length returned by a prior
/// `VirtualRegion::reserve` that has not already been freed.
pub fn free(ptr: *mut u8, len: usize) {
    if ptr.is_null() || len == 0 {
        return;
    }
    // SAFETY: caller contract above; `VirtualRegion::drop` upholds it by
    // construction since it passes back its own `ptr`/`len`.
    unsafe {
        libc::munmap(ptr as *mut libc::c_void, len);
    }
}

/// True if `ptr` is aligned to `align`, which must be a power of two.
pub fn is_aligned(ptr: *const u8, align: usize) -> bool {
    debug_assert!(align.is_power_of_two());
    (ptr as usize) & (align - 1) == 0
}

fn align_up(value: usize, align: usize) -> EcsResult<usize> {
    debug_assert!(align.is_power_of_two());
    value
        .checked_add(align - 1)
        .map(|v| v & !(align - 1))
        .ok_or(EcsError::CapacityOverflow { operation: "align_up" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_rounds_up_to_alignment() {
        let region = VirtualRegion::reserve(1).unwrap();
        assert_eq!(region.len(), VM_ALIGN);
    }

    #[test]
    fn reserve_zero_is_invalid_argument() {
        assert!(matches!(
            VirtualRegion::reserve(0),
            Err(EcsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn commit_write_decommit_commit_reads_zero() {
        let region = VirtualRegion::reserve(VM_ALIGN).unwrap();
        region.commit(0, VM_ALIGN).unwrap();
        // SAFETY: just committed exactly this range.
        unsafe {
            std::ptr::write_bytes(region.as_ptr(), 0xAB, VM_ALIGN);
        }
        // SAFETY: committed range, in-bounds read.
        assert_eq!(unsafe { *region.as_ptr() }, 0xAB);

        region.decommit(0, VM_ALIGN).unwrap();
        region.commit(0, VM_ALIGN).unwrap();
        // SAFETY: freshly recommitted range must read zero.
        let first_byte = unsafe { *region.as_ptr() };
        assert_eq!(first_byte, 0);
    }

    #[test]
    fn commit_out_of_bounds_is_invalid_argument() {
        let region = VirtualRegion::reserve(VM_ALIGN).unwrap();
        assert!(region.commit(0, VM_ALIGN + 1).is_err());
    }

    #[test]
    fn free_on_null_is_a_no_op() {
        free(std::ptr::null_mut(), VM_ALIGN);
    }

    #[test]
    fn is_aligned_checks_power_of_two_boundary() {
        let region = VirtualRegion::reserve(VM_ALIGN).unwrap();
        assert!(is_aligned(region.as_ptr(), VM_ALIGN));
        assert!(!is_aligned(unsafe { region.as_ptr().add(1) }, VM_ALIGN));
    }
}
