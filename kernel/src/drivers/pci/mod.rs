/// PCI configuration space access, function enumeration and enablement.
///
/// Drivers never touch 0xCF8/0xCFC directly: they go through `ConfigSpace`,
/// which the kernel implements with port I/O and tests implement in RAM.
use alloc::vec::Vec;
use core::fmt;


/// Configuration-space register offsets.
mod cfg {
    pub const ID: u8 = 0x00;
    pub const COMMAND: u8 = 0x04;
    pub const CLASS: u8 = 0x08;
    pub const HEADER_TYPE: u8 = 0x0C;
    pub const BAR0: u8 = 0x10;
    pub const INTERRUPT: u8 = 0x3C;
}

/// Command register bits.
const CMD_IO_SPACE: u32 = 1 << 0;
const CMD_MEM_SPACE: u32 = 1 << 1;
const CMD_BUS_MASTER: u32 = 1 << 2;

/// Number of base address registers in a type-0 header.
pub const BAR_COUNT: usize = 6;

/// Raw 32-bit access to PCI configuration space.
pub trait ConfigSpace {
    fn read32(&self, bus: u8, device: u8, func: u8, offset: u8) -> u32;
    fn write32(&self, bus: u8, device: u8, func: u8, offset: u8, val: u32);
}

/// Configuration mechanism #1 (ports 0xCF8/0xCFC).
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Default, Clone, Copy)]
pub struct PortIoConfigSpace;

#[cfg(target_arch = "x86_64")]
impl PortIoConfigSpace {
    const ADDRESS_PORT: u16 = 0xCF8;
    const DATA_PORT: u16 = 0xCFC;

    fn select(bus: u8, device: u8, func: u8, offset: u8) {
        let addr: u32 = 0x8000_0000
            | ((bus as u32) << 16)
            | ((device as u32) << 11)
            | ((func as u32) << 8)
            | ((offset as u32) & 0xFC);
        outl(Self::ADDRESS_PORT, addr);
    }
}

#[cfg(target_arch = "x86_64")]
impl ConfigSpace for PortIoConfigSpace {
    fn read32(&self, bus: u8, device: u8, func: u8, offset: u8) -> u32 {
        Self::select(bus, device, func, offset);
        inl(Self::DATA_PORT)
    }

    fn write32(&self, bus: u8, device: u8, func: u8, offset: u8, val: u32) {
        Self::select(bus, device, func, offset);
        outl(Self::DATA_PORT, val);
    }
}

/// Write a 32-bit value to an I/O port.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn outl(port: u16, val: u32) {
    unsafe {
        core::arch::asm!(
            "out dx, eax",
            in("dx") port,
            in("eax") val,
            options(nostack, preserves_flags),
        );
    }
}

/// Read a 32-bit value from an I/O port.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn inl(port: u16) -> u32 {
    let val: u32;
    unsafe {
        core::arch::asm!(
            "in eax, dx",
            in("dx") port,
            out("eax") val,
            options(nostack, preserves_flags),
        );
    }
    val
}

/// What a base address register decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarKind {
    #[default]
    Unused,
    Memory,
    Io,
}

/// One base address register, as sized by `enable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bar {
    pub kind: BarKind,
    pub base: u64,
    pub size: u32,
}

/// A single PCI function.
#[derive(Debug, Clone)]
pub struct PciFunction {
    pub bus: u8,
    pub device: u8,
    pub func: u8,
    pub vendor_id: u16,
    pub device_id: u16,
    pub class_code: u8,
    pub subclass: u8,
    pub irq_line: u8,
    /// Filled in by `enable`.
    pub bars: [Bar; BAR_COUNT],
}

impl PciFunction {
    /// Base address of region `n` (0 when unused or not yet enabled).
    pub fn reg_base(&self, n: usize) -> u64 {
        self.bars[n].base
    }

    /// Size in bytes of region `n` (0 when unused or not yet enabled).
    pub fn reg_size(&self, n: usize) -> u32 {
        self.bars[n].size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PciError {
    DeviceNotFound,
    /// The command register did not accept memory-space/bus-master enable.
    EnableFailed,
    /// A 64-bit memory BAR occupies the last slot and has no upper half.
    InvalidBar(u8),
}

impl fmt::Display for PciError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PciError::DeviceNotFound => write!(f, "PCI device not found"),
            PciError::EnableFailed => write!(f, "PCI function refused memory/bus-master enable"),
            PciError::InvalidBar(n) => write!(f, "PCI BAR{} is malformed", n),
        }
    }
}

/// Check if a PCI device is multi-function (Header Type bit 7).
fn is_multi_function<C: ConfigSpace>(cs: &C, bus: u8, device: u8) -> bool {
    let header_type = cs.read32(bus, device, 0, cfg::HEADER_TYPE);
    ((header_type >> 16) & 0x80) != 0
}

fn probe<C: ConfigSpace>(cs: &C, bus: u8, device: u8, func: u8) -> Option<PciFunction> {
    let id = cs.read32(bus, device, func, cfg::ID);
    let vendor_id = (id & 0xFFFF) as u16;
    if vendor_id == 0xFFFF {
        return None;
    }
    let class_reg = cs.read32(bus, device, func, cfg::CLASS);
    let intr = cs.read32(bus, device, func, cfg::INTERRUPT);

    Some(PciFunction {
        bus,
        device,
        func,
        vendor_id,
        device_id: ((id >> 16) & 0xFFFF) as u16,
        class_code: ((class_reg >> 24) & 0xFF) as u8,
        subclass: ((class_reg >> 16) & 0xFF) as u8,
        irq_line: (intr & 0xFF) as u8,
        bars: [Bar::default(); BAR_COUNT],
    })
}

/// Enumerate every present function on every bus.
/// Checks all functions (0..7) on multi-function devices.
pub fn scan<C: ConfigSpace>(cs: &C) -> Vec<PciFunction> {
    let mut found = Vec::new();
    for bus in 0..=255u8 {
        for device in 0..32u8 {
            let Some(f0) = probe(cs, bus, device, 0) else {
                continue;
            };
            let max_func = if is_multi_function(cs, bus, device) { 8 } else { 1 };
            found.push(f0);
            for func in 1..max_func {
                if let Some(f) = probe(cs, bus, device, func) {
                    found.push(f);
                }
            }
        }
    }
    found
}

/// First function matching `vendor_id:device_id`.
pub fn find_device<C: ConfigSpace>(cs: &C, vendor_id: u16, device_id: u16) -> Option<PciFunction> {
    scan(cs)
        .into_iter()
        .find(|f| f.vendor_id == vendor_id && f.device_id == device_id)
}

/// Size and record every BAR of `f`, then turn on I/O space, memory space and
/// bus mastering.
///
/// BARs are sized by writing all ones and reading back the writable bits,
/// with decoding switched off so the function never claims the probe
/// address; each BAR's previous value is written back afterwards.
pub fn enable<C: ConfigSpace>(cs: &C, f: &mut PciFunction) -> Result<(), PciError> {
    let (bus, dev, func) = (f.bus, f.device, f.func);

    let cmd = cs.read32(bus, dev, func, cfg::COMMAND);
    cs.write32(bus, dev, func, cfg::COMMAND, cmd & !(CMD_IO_SPACE | CMD_MEM_SPACE));
    let bars = match size_bars(cs, bus, dev, func) {
        Ok(bars) => bars,
        Err(e) => {
            cs.write32(bus, dev, func, cfg::COMMAND, cmd);
            return Err(e);
        }
    };

    cs.write32(bus, dev, func, cfg::COMMAND, cmd | CMD_IO_SPACE | CMD_MEM_SPACE | CMD_BUS_MASTER);
    let cmd = cs.read32(bus, dev, func, cfg::COMMAND);
    if cmd & (CMD_MEM_SPACE | CMD_BUS_MASTER) != (CMD_MEM_SPACE | CMD_BUS_MASTER) {
        return Err(PciError::EnableFailed);
    }
    f.bars = bars;

    log::info!(
        "pci: enabled {:04x}:{:04x} at {:02x}:{:02x}.{}",
        f.vendor_id, f.device_id, bus, dev, func
    );
    Ok(())
}

/// Probe all six BARs. The caller must have decoding disabled.
fn size_bars<C: ConfigSpace>(cs: &C, bus: u8, dev: u8, func: u8) -> Result<[Bar; BAR_COUNT], PciError> {
    let mut bars = [Bar::default(); BAR_COUNT];
    let mut n = 0usize;
    while n < BAR_COUNT {
        let offset = cfg::BAR0 + 4 * n as u8;
        let old = cs.read32(bus, dev, func, offset);
        cs.write32(bus, dev, func, offset, 0xFFFF_FFFF);
        let probe = cs.read32(bus, dev, func, offset);
        cs.write32(bus, dev, func, offset, old);

        let mut width = 1;
        if probe == 0 {
            bars[n] = Bar::default();
        } else if probe & 0x1 == 0 {
            // Memory BAR; bits 2:1 == 10b means a 64-bit address
            let mut base = (old & !0xF) as u64;
            if probe & 0x6 == 0x4 {
                if n + 1 >= BAR_COUNT {
                    return Err(PciError::InvalidBar(n as u8));
                }
                let high = cs.read32(bus, dev, func, offset + 4);
                base |= (high as u64) << 32;
                width = 2;
            }
            bars[n] = Bar {
                kind: BarKind::Memory,
                base,
                size: (!(probe & !0xF)).wrapping_add(1),
            };
        } else {
            bars[n] = Bar {
                kind: BarKind::Io,
                base: (old & !0x3) as u64,
                size: (!(probe & !0x3) & 0xFFFF).wrapping_add(1),
            };
        }

        if bars[n].kind != BarKind::Unused {
            log::debug!(
                "pci: {:02x}:{:02x}.{} BAR{} {:?} base {:#x} size {:#x}",
                bus, dev, func, n, bars[n].kind, bars[n].base, bars[n].size
            );
        }
        n += width;
    }
    Ok(bars)
}
