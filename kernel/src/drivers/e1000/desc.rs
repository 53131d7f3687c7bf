/// Legacy transmit/receive descriptors (16 bytes each) and their bit sets.
///
/// Both descriptor kinds carry a Descriptor Done (DD) status bit that decides
/// which side owns the slot's buffer. The meaning is direction-dependent, see
/// `SlotOwner`.
use bitflags::bitflags;

use crate::mem::PhysAddr;

bitflags! {
    /// Transmit descriptor command byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TxCmd: u8 {
        /// End of packet
        const EOP = 1 << 0;
        /// Insert FCS (Ethernet CRC)
        const IFCS = 1 << 1;
        /// Insert checksum
        const IC = 1 << 2;
        /// Report status
        const RS = 1 << 3;
        /// Report packet sent
        const RPS = 1 << 4;
        /// Descriptor extension (0 = legacy)
        const DEXT = 1 << 5;
        /// Add VLAN tag
        const VLE = 1 << 6;
        /// Interrupt delay enable
        const IDE = 1 << 7;
    }
}

bitflags! {
    /// Transmit descriptor status byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TxStatus: u8 {
        /// Descriptor done
        const DD = 1 << 0;
        /// Excess collisions
        const EC = 1 << 1;
        /// Late collision
        const LC = 1 << 2;
        /// Transmit underrun
        const TU = 1 << 3;
    }
}

bitflags! {
    /// Receive descriptor status byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RxStatus: u8 {
        /// Descriptor done
        const DD = 1 << 0;
        /// End of packet
        const EOP = 1 << 1;
        /// Ignore checksum indication
        const IXSM = 1 << 2;
        /// Packet is 802.1Q
        const VP = 1 << 3;
        const UDPCS = 1 << 4;
        const TCPCS = 1 << 5;
        const IPCS = 1 << 6;
        /// Passed in-exact filter
        const PIF = 1 << 7;
    }
}

bitflags! {
    /// Receive descriptor error byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RxErrors: u8 {
        /// CRC error
        const CE = 1 << 0;
        /// Symbol error
        const SE = 1 << 1;
        /// Sequence error
        const SEQ = 1 << 2;
        /// Carrier extension error
        const CXE = 1 << 4;
        /// TCP/UDP checksum error
        const TCPE = 1 << 5;
        /// IP checksum error
        const IPE = 1 << 6;
        /// RX data error
        const RXE = 1 << 7;
    }
}

/// Which side currently owns a ring slot's buffer.
///
/// Transitions:
/// - `Software` → `Hardware`: only when the driver queues a transmit or
///   returns a consumed receive slot, followed by a tail write.
/// - `Hardware` → `Software`: only when the device sets DD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOwner {
    Software,
    Hardware,
}

/// Behaviour shared by transmit and receive descriptors.
pub trait Descriptor: Copy {
    /// Descriptor bound to the buffer at `buf`, in its initial ownership state.
    fn bound_to(buf: PhysAddr) -> Self;

    fn buffer_addr(&self) -> PhysAddr;

    /// Whether the device has set Descriptor Done.
    fn is_done(&self) -> bool;

    fn owner(&self) -> SlotOwner;
}

/// Legacy transmit descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxDesc {
    pub addr: u64,
    pub length: u16,
    pub cso: u8,
    pub cmd: u8,
    pub status: u8,
    pub css: u8,
    pub special: u16,
}

static_assertions::const_assert_eq!(core::mem::size_of::<TxDesc>(), 16);

impl TxDesc {
    pub fn cmd(&self) -> TxCmd {
        TxCmd::from_bits_retain(self.cmd)
    }

    pub fn status(&self) -> TxStatus {
        TxStatus::from_bits_retain(self.status)
    }

    /// Fill in a queued frame of `len` bytes; clears DD, which hands the
    /// slot to hardware once the tail moves past it.
    pub fn queue(&mut self, len: u16, cmd: TxCmd) {
        self.length = len;
        self.cmd = cmd.bits();
        self.status = 0;
    }
}

impl Descriptor for TxDesc {
    /// Transmit slots start out done so the whole ring is free to software.
    fn bound_to(buf: PhysAddr) -> Self {
        Self {
            addr: buf.as_u64(),
            status: TxStatus::DD.bits(),
            ..Self::default()
        }
    }

    fn buffer_addr(&self) -> PhysAddr {
        PhysAddr::new(self.addr)
    }

    fn is_done(&self) -> bool {
        self.status().contains(TxStatus::DD)
    }

    fn owner(&self) -> SlotOwner {
        if self.is_done() {
            SlotOwner::Software
        } else {
            SlotOwner::Hardware
        }
    }
}

/// Legacy receive descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxDesc {
    pub addr: u64,
    pub length: u16,
    pub csum: u16,
    pub status: u8,
    pub errors: u8,
    pub special: u16,
}

static_assertions::const_assert_eq!(core::mem::size_of::<RxDesc>(), 16);

impl RxDesc {
    pub fn status(&self) -> RxStatus {
        RxStatus::from_bits_retain(self.status)
    }

    pub fn errors(&self) -> RxErrors {
        RxErrors::from_bits_retain(self.errors)
    }

    pub fn is_end_of_packet(&self) -> bool {
        self.status().contains(RxStatus::EOP)
    }

    /// Wipe the write-back fields, keeping the buffer binding.
    pub fn recycle(&mut self) {
        *self = Self::bound_to(self.buffer_addr());
    }
}

impl Descriptor for RxDesc {
    /// Receive slots start out not-done: the device may fill them.
    fn bound_to(buf: PhysAddr) -> Self {
        Self {
            addr: buf.as_u64(),
            ..Self::default()
        }
    }

    fn buffer_addr(&self) -> PhysAddr {
        PhysAddr::new(self.addr)
    }

    fn is_done(&self) -> bool {
        self.status().contains(RxStatus::DD)
    }

    fn owner(&self) -> SlotOwner {
        if self.is_done() {
            SlotOwner::Software
        } else {
            SlotOwner::Hardware
        }
    }
}
