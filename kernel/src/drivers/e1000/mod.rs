/// Intel 82540EM (e1000) driver: polled mode, legacy descriptors.
///
/// The device handle owns the mapped register window and one transmit and one
/// receive ring. Nothing is interrupt driven: callers poll `receive` and
/// retry `transmit` on `RingFull`, yielding in between.
///
/// Bring-up order (`attach`):
///   1. PCI enable (memory space + bus mastering), BAR sizing
///   2. Map BAR0
///   3. Transmit ring: descriptors pre-marked done, TDBAL/TDLEN/TDH/TDT, TCTL, TIPG
///   4. Receive ring: descriptors hardware-owned, RAL/RAH, MTA, interrupts off,
///      RDBAL/RDLEN/RDH/RDT, RCTL
pub mod config;
pub mod desc;
pub mod regs;
pub mod ring;
mod rx;
mod tx;

#[cfg(any(test, feature = "mock-hw"))]
pub mod mock;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use desc::SlotOwner;
pub use rx::{Frame, FrameError};
pub use tx::TxError;

use core::fmt;

use crate::drivers::pci::{self, BarKind, ConfigSpace, PciError, PciFunction};
use crate::mem::{AllocError, MapError, MemoryMapper, PhysAddr};
use regs::RegisterAccess;
use ring::{RxRing, TxRing, RING_LEN_MULTIPLE};

/// PCI vendor ID (Intel).
pub const E1000_VENDOR_ID: u16 = 0x8086;
/// PCI device ID of the 82540EM as emulated by QEMU, Bochs and VirtualBox.
pub const E1000_DEVICE_ID: u16 = 0x100E;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachError {
    /// The PCI layer could not enable the function.
    Pci(PciError),
    /// BAR0 is absent, decodes I/O space, or is smaller than the register set.
    NoMmioRegion,
    Map(MapError),
    /// DMA memory for a ring could not be allocated.
    OutOfMemory,
}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachError::Pci(e) => write!(f, "e1000 attach failed: {}", e),
            AttachError::NoMmioRegion => write!(f, "e1000 attach failed: BAR0 is not a memory region"),
            AttachError::Map(e) => write!(f, "e1000 attach failed: {}", e),
            AttachError::OutOfMemory => write!(f, "e1000 attach failed: out of DMA memory"),
        }
    }
}

impl From<PciError> for AttachError {
    fn from(e: PciError) -> Self {
        AttachError::Pci(e)
    }
}

impl From<MapError> for AttachError {
    fn from(e: MapError) -> Self {
        AttachError::Map(e)
    }
}

impl From<AllocError> for AttachError {
    fn from(_: AllocError) -> Self {
        AttachError::OutOfMemory
    }
}

/// Data-path counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    /// Transmit attempts refused with `RingFull`.
    pub tx_ring_full: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    /// Received frames that carried hardware error bits.
    pub rx_errors: u64,
}

/// A device handle shared between tasks. The lock provides the single
/// transmitter and single receiver the data paths assume.
pub type SharedE1000<R> = spin::Mutex<E1000<R>>;

/// An attached e1000.
pub struct E1000<R: RegisterAccess> {
    regs: R,
    tx: TxRing,
    rx: RxRing,
    mac: [u8; 6],
    stats: Stats,
}

impl<R: RegisterAccess> E1000<R> {
    /// Attach to `func` with the default configuration.
    pub fn attach<C, M>(cs: &C, func: &mut PciFunction, mapper: &M) -> Result<Self, AttachError>
    where
        C: ConfigSpace,
        M: MemoryMapper<Window = R>,
    {
        Self::attach_with_config(cs, func, mapper, Config::default())
    }

    pub fn attach_with_config<C, M>(
        cs: &C,
        func: &mut PciFunction,
        mapper: &M,
        config: Config,
    ) -> Result<Self, AttachError>
    where
        C: ConfigSpace,
        M: MemoryMapper<Window = R>,
    {
        pci::enable(cs, func)?;

        let bar0 = func.bars[0];
        if bar0.kind != BarKind::Memory
            || bar0.base == 0
            || (bar0.size as usize) < regs::REGISTER_WINDOW_SIZE
        {
            log::warn!("e1000: BAR0 unusable: {:?}", bar0);
            return Err(AttachError::NoMmioRegion);
        }

        let regs = mapper.map_mmio(PhysAddr::new(bar0.base), bar0.size as usize)?;
        log::info!(
            "e1000: {:02x}:{:02x}.{} registers at {:#x} ({} KiB)",
            func.bus, func.device, func.func, bar0.base, bar0.size / 1024
        );

        Self::init(regs, mapper, config)
    }

    /// Program an already-mapped register window and build both rings.
    pub fn init<M: MemoryMapper>(mut regs: R, mapper: &M, config: Config) -> Result<Self, AttachError> {
        let tx = TxRing::new(mapper)?;
        Self::init_tx(&mut regs, &tx, &config);

        let rx = RxRing::new(mapper)?;
        Self::init_rx(&mut regs, &rx, &config);

        log::info!(
            "e1000: up, MAC {:02x?}, {} tx / {} rx descriptors",
            config.mac,
            tx.capacity(),
            rx.capacity()
        );

        Ok(Self {
            regs,
            tx,
            rx,
            mac: config.mac,
            stats: Stats::default(),
        })
    }

    fn init_tx(regs: &mut R, tx: &TxRing, config: &Config) {
        regs.write(regs::TDBAL, tx.base().low_u32());
        regs.write(regs::TDBAH, tx.base().high_u32());
        regs.write(regs::TDLEN, tx.len_bytes());
        let tdlen = regs.read(regs::TDLEN);
        assert!(
            tdlen as usize % RING_LEN_MULTIPLE == 0,
            "TDLEN {} is not a multiple of {}",
            tdlen,
            RING_LEN_MULTIPLE
        );

        regs.write(regs::TDH, 0);
        regs.write(regs::TDT, 0);

        regs.write(regs::TCTL, config.tctl());
        regs.write(regs::TIPG, config.tipg());
        log::debug!("e1000: TCTL {:#x} TIPG {:#x}", config.tctl(), config.tipg());
    }

    fn init_rx(regs: &mut R, rx: &RxRing, config: &Config) {
        let (ral, rah) = config.receive_address();
        regs.write(regs::RAL, ral);
        regs.write(regs::RAH, rah);

        for i in 0..regs::MTA_ENTRIES {
            regs.write(regs::MTA + 4 * i, 0);
        }

        // Polled mode: mask every interrupt source and drop anything pending.
        regs.write(regs::IMS, 0);
        regs.write(regs::IMC, u32::MAX);
        let _ = regs.read(regs::ICR);

        regs.write(regs::RDBAL, rx.base().low_u32());
        regs.write(regs::RDBAH, rx.base().high_u32());
        regs.write(regs::RDLEN, rx.len_bytes());
        let rdlen = regs.read(regs::RDLEN);
        assert!(
            rdlen as usize % RING_LEN_MULTIPLE == 0,
            "RDLEN {} is not a multiple of {}",
            rdlen,
            RING_LEN_MULTIPLE
        );

        // Head at 0 and tail one behind it: every slot but the tail's is
        // available to the device.
        regs.write(regs::RDH, 0);
        regs.write(regs::RDT, (rx.capacity() - 1) as u32);

        regs.write(regs::RCTL, config.rctl());
        log::debug!("e1000: RCTL {:#x}", config.rctl());
    }

    /// The station address programmed into RAL/RAH.
    pub fn mac_address(&self) -> [u8; 6] {
        self.mac
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Device Status register (link up, speed, duplex).
    pub fn status(&self) -> u32 {
        self.regs.read(regs::STATUS)
    }
}
