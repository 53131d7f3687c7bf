/// e1000 register set (82540EM).
///
/// Registers are 32 bits wide and must be accessed as 32-bit values. They live
/// on the NIC and are mapped into the address space through BAR0; every access
/// reaches the device and may have side effects (e.g. ICR is clear-on-read).
use bitflags::bitflags;

pub use crate::mem::{MmioRegisters, RegisterAccess};

// ---- Register offsets from BAR0 ----

pub const CTRL: u32 = 0x0000; // Device Control - RW
pub const STATUS: u32 = 0x0008; // Device Status - RO
pub const ICR: u32 = 0x00C0; // Interrupt Cause Read - R/clr
pub const IMS: u32 = 0x00D0; // Interrupt Mask Set - RW
pub const IMC: u32 = 0x00D8; // Interrupt Mask Clear - WO
pub const RCTL: u32 = 0x0100; // RX Control - RW
pub const TCTL: u32 = 0x0400; // TX Control - RW
pub const TIPG: u32 = 0x0410; // TX Inter-packet gap - RW
pub const RDBAL: u32 = 0x2800; // RX Descriptor Base Address Low - RW
pub const RDBAH: u32 = 0x2804; // RX Descriptor Base Address High - RW
pub const RDLEN: u32 = 0x2808; // RX Descriptor Length - RW
pub const RDH: u32 = 0x2810; // RX Descriptor Head - RW
pub const RDT: u32 = 0x2818; // RX Descriptor Tail - RW
pub const TDBAL: u32 = 0x3800; // TX Descriptor Base Address Low - RW
pub const TDBAH: u32 = 0x3804; // TX Descriptor Base Address High - RW
pub const TDLEN: u32 = 0x3808; // TX Descriptor Length - RW
pub const TDH: u32 = 0x3810; // TX Descriptor Head - RW
pub const TDT: u32 = 0x3818; // TX Descriptor Tail - RW
pub const MTA: u32 = 0x5200; // Multicast Table Array - RW Array
pub const RAL: u32 = 0x5400; // Receive Address Low - RW
pub const RAH: u32 = 0x5404; // Receive Address High - RW

/// Number of 32-bit entries in the multicast table array.
pub const MTA_ENTRIES: u32 = 128;

/// Size of the 82540EM memory-mapped register space.
pub const REGISTER_WINDOW_SIZE: usize = 0x20000;

/// Receive Address High: address valid.
pub const RAH_AV: u32 = 0x8000_0000;

// ---- Transmit inter-packet gap fields ----

/// IPG transmit time
pub const TIPG_IPGT: u32 = 0x0000_03FF;
/// IPG receive time 1
pub const TIPG_IPGR1: u32 = 0x000F_FC00;
/// IPG receive time 2
pub const TIPG_IPGR2: u32 = 0x3FF0_0000;

bitflags! {
    /// Transmit control register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Tctl: u32 {
        const RST = 1 << 0;
        const EN = 1 << 1;
        /// Busy check enable
        const BCE = 1 << 2;
        /// Pad short packets
        const PSP = 1 << 3;
        /// Collision threshold field
        const CT = 0xFF << 4;
        /// Collision distance field
        const COLD = 0x3FF << 12;
        const SWXOFF = 1 << 22;
        /// Packet burst enable
        const PBE = 1 << 23;
        /// Re-transmit on late collision
        const RTLC = 1 << 24;
        /// No re-transmit on underrun
        const NRTU = 1 << 25;
        /// Multiple request support
        const MULR = 1 << 28;
    }
}

bitflags! {
    /// Receive control register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Rctl: u32 {
        const RST = 1 << 0;
        const EN = 1 << 1;
        /// Store bad packets
        const SBP = 1 << 2;
        /// Unicast promiscuous
        const UPE = 1 << 3;
        /// Multicast promiscuous
        const MPE = 1 << 4;
        /// Long packet enable
        const LPE = 1 << 5;
        const LBM_MAC = 1 << 6;
        const RDMTS_QUARTER = 1 << 8;
        const RDMTS_EIGHTH = 1 << 9;
        /// Broadcast accept mode
        const BAM = 1 << 15;
        const BSIZE_1024 = 1 << 16;
        const BSIZE_512 = 2 << 16;
        const BSIZE_256 = 3 << 16;
        /// VLAN filter enable
        const VFE = 1 << 18;
        const CFIEN = 1 << 19;
        const CFI = 1 << 20;
        /// Discard pause frames
        const DPF = 1 << 22;
        /// Pass MAC control frames
        const PMCF = 1 << 23;
        /// Buffer size extension
        const BSEX = 1 << 25;
        /// Strip Ethernet CRC
        const SECRC = 1 << 26;
    }
}

impl Rctl {
    /// 2048-byte receive buffers: BSIZE = 00b with BSEX clear.
    pub const BSIZE_2048: Rctl = Rctl::empty();
}

/// Shift `value` into the lowest run of set bits in `mask` and clip it to
/// the mask, e.g. `masked_value(0x0FF0, 0x10) == 0x100`.
///
/// A zero mask yields 0.
pub const fn masked_value(mask: u32, value: u32) -> u32 {
    // trailing_zeros(0) == 32, which checked_shl rejects.
    match value.checked_shl(mask.trailing_zeros()) {
        Some(v) => v & mask,
        None => 0,
    }
}
