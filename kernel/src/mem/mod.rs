/// Memory services the NIC driver consumes: register-window mapping,
/// virtual→physical translation for DMA, and aligned DMA buffers.
pub mod phys;
mod dma;
mod hhdm;
mod mmio;


pub use phys::{PhysAddr, AllocError, PAGE_SIZE};
pub use dma::DmaBuf;
pub use hhdm::HhdmMapper;
pub use mmio::{MmioRegisters, RegisterAccess};

use core::fmt;

/// Errors from mapping a device register window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// The physical range does not fit in the mapped address space.
    OutOfRange,
    /// The physical base is not page aligned.
    Unaligned,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::OutOfRange => write!(f, "MMIO region out of range"),
            MapError::Unaligned => write!(f, "MMIO region not page aligned"),
        }
    }
}

/// The memory-mapping layer as seen by device drivers.
pub trait MemoryMapper {
    /// Register window produced by `map_mmio`.
    type Window: RegisterAccess;

    /// Map `size` bytes of device memory at `phys` into the address space.
    /// The mapping must be uncacheable and is never torn down.
    fn map_mmio(&self, phys: PhysAddr, size: usize) -> Result<Self::Window, MapError>;

    /// Translate a kernel virtual address into the address a DMA-capable
    /// device must use to reach the same byte.
    fn physical_address_of(&self, virt: *const u8) -> PhysAddr;
}
