/// Higher-Half Direct Map (HHDM) translation.
///
/// The bootloader maps all physical memory linearly at
/// `virt = phys + hhdm_offset`, so mapping a BAR is an address computation
/// and translating a heap pointer back is a subtraction. BAR pages must
/// already be marked uncacheable in that mapping.
use core::ptr::NonNull;

use super::mmio::MmioRegisters;
use super::phys::{PhysAddr, PAGE_SIZE};
use super::{MapError, MemoryMapper};

/// `MemoryMapper` backed by the HHDM.
#[derive(Debug, Clone, Copy)]
pub struct HhdmMapper {
    offset: u64,
}

impl HhdmMapper {
    /// `offset` is the HHDM base reported by the bootloader.
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }

    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Convert to a virtual pointer via the HHDM: virt = phys + hhdm_offset.
    pub fn phys_to_virt<T>(&self, phys: PhysAddr) -> *mut T {
        (phys.as_u64() + self.offset) as *mut T
    }
}

impl MemoryMapper for HhdmMapper {
    type Window = MmioRegisters;

    fn map_mmio(&self, phys: PhysAddr, size: usize) -> Result<MmioRegisters, MapError> {
        if !phys.is_aligned(PAGE_SIZE) {
            return Err(MapError::Unaligned);
        }
        phys.as_u64()
            .checked_add(self.offset)
            .and_then(|v| v.checked_add(size as u64))
            .ok_or(MapError::OutOfRange)?;

        let base = NonNull::new(self.phys_to_virt::<u32>(phys)).ok_or(MapError::OutOfRange)?;
        // SAFETY: the HHDM covers every physical page, including BARs, and
        // the caller hands us a BAR range reported by PCI.
        Ok(unsafe { MmioRegisters::new(base, size) })
    }

    fn physical_address_of(&self, virt: *const u8) -> PhysAddr {
        PhysAddr::new((virt as u64).wrapping_sub(self.offset))
    }
}
