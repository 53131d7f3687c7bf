/// Memory-mapped device register windows.
///
/// Registers are reached through volatile 32-bit loads and stores; every
/// access goes to the device and may have side effects.
use core::ptr::{self, NonNull};

/// 32-bit register access to a mapped device.
///
/// Implemented by `MmioRegisters` for real hardware and by RAM-backed mocks
/// in tests.
pub trait RegisterAccess {
    fn read(&self, offset: u32) -> u32;
    fn write(&mut self, offset: u32, value: u32);
}

/// A mapped register window accessed with volatile loads and stores.
pub struct MmioRegisters {
    base: NonNull<u32>,
    size: usize,
}

// The window is owned by exactly one device handle.
unsafe impl Send for MmioRegisters {}

impl MmioRegisters {
    /// # Safety
    /// `base` must point to `size` bytes of device registers mapped
    /// uncacheable, valid for the lifetime of the returned value, and not
    /// accessed through any other path.
    pub unsafe fn new(base: NonNull<u32>, size: usize) -> Self {
        Self { base, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn reg_ptr(&self, offset: u32) -> *mut u32 {
        debug_assert!(offset % 4 == 0, "unaligned register offset {:#x}", offset);
        debug_assert!((offset as usize) < self.size, "register offset {:#x} outside window", offset);
        unsafe { self.base.as_ptr().add(offset as usize / 4) }
    }
}

impl RegisterAccess for MmioRegisters {
    #[inline]
    fn read(&self, offset: u32) -> u32 {
        unsafe { ptr::read_volatile(self.reg_ptr(offset)) }
    }

    #[inline]
    fn write(&mut self, offset: u32, value: u32) {
        unsafe { ptr::write_volatile(self.reg_ptr(offset), value) }
    }
}
