/// Zeroed, aligned buffers shared with a bus-mastering device.
///
/// Guarantees:
/// - Zero-initialized memory at the requested alignment
/// - Known physical address of the first byte (for descriptor base registers)
///
/// The backing memory comes from the kernel heap. The kernel heap lives in the
/// HHDM, so a heap allocation is physically contiguous and the physical address
/// of any byte is `phys_addr() + offset`.
use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use core::ptr::NonNull;
use core::slice;

use super::phys::{AllocError, PhysAddr};
use super::MemoryMapper;

/// A zeroed, aligned DMA buffer with a known physical address.
pub struct DmaBuf {
    ptr: NonNull<u8>,
    phys: PhysAddr,
    layout: Layout,
}

impl DmaBuf {
    /// Allocate `size` zeroed bytes aligned to `align` (a power of two) and
    /// record the physical address the device must be given.
    pub fn alloc<M: MemoryMapper>(size: usize, align: usize, mapper: &M) -> Result<Self, AllocError> {
        if size == 0 {
            return Err(AllocError::InvalidSize);
        }
        let layout = Layout::from_size_align(size, align).map_err(|_| AllocError::InvalidAlignment)?;

        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(AllocError::OutOfMemory)?;
        let phys = mapper.physical_address_of(ptr.as_ptr());

        Ok(Self { ptr, phys, layout })
    }

    /// Physical base address of the buffer.
    #[inline]
    pub fn phys_addr(&self) -> PhysAddr {
        self.phys
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.layout.align()
    }

    /// View as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.as_ptr(), self.len()) }
    }

    /// View as a mutable byte slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.as_mut_ptr(), self.len()) }
    }
}

impl Drop for DmaBuf {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// Send but not Sync: one owner accesses it at a time.
unsafe impl Send for DmaBuf {}
