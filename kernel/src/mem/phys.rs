/// Physical addresses and the errors raised when carving out DMA memory.
///
/// Device-visible memory is always described by a `PhysAddr`; the CPU-side
/// view of the same bytes is a plain pointer handed out by `DmaBuf` or by a
/// `MemoryMapper`.
use core::fmt;

pub const PAGE_SIZE: usize = 4096;

/// An address on the memory bus, as a DMA-capable device sees it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(pub u64);

impl PhysAddr {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Low 32 bits, as programmed into a `*BAL` register.
    pub const fn low_u32(self) -> u32 {
        self.0 as u32
    }

    /// High 32 bits, as programmed into a `*BAH` register.
    pub const fn high_u32(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn offset(self, bytes: usize) -> Self {
        Self(self.0 + bytes as u64)
    }

    pub const fn is_aligned(self, align: usize) -> bool {
        self.0 % align as u64 == 0
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    OutOfMemory,
    InvalidAlignment,
    InvalidSize,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::OutOfMemory => write!(f, "out of DMA memory"),
            AllocError::InvalidAlignment => write!(f, "invalid alignment"),
            AllocError::InvalidSize => write!(f, "invalid size"),
        }
    }
}
