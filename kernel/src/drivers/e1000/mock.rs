/// RAM-backed stand-ins for the hardware the driver talks to.
///
/// - `MockRegisters`: a shared register file that remembers every write
/// - `IdentityMapper`: "maps" BAR0 to a `MockRegisters` and uses host
///   pointers as DMA addresses
/// - `MockConfigSpace`: PCI configuration space with BAR size masks
/// - `SimulatedDevice`: plays the NIC side of the rings through those DMA
///   addresses (completes transmits, delivers received frames)
/// - `MockNic`: all of the above wired to an attached device handle
///
/// Compiled for tests and with the `mock-hw` feature.
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::ptr;

use spin::Mutex;

use super::desc::{RxDesc, RxErrors, RxStatus, TxDesc, TxStatus};
use super::regs::{self, RegisterAccess};
use super::ring::RX_BUFFER_SIZE;
use super::{AttachError, Config, E1000, E1000_DEVICE_ID, E1000_VENDOR_ID};
use crate::drivers::pci::{self, ConfigSpace, PciError};
use crate::mem::{MapError, MemoryMapper, PhysAddr};

#[derive(Default)]
struct RegisterFile {
    values: BTreeMap<u32, u32>,
    writes: Vec<(u32, u32)>,
}

/// Shared register file. Clones observe the same registers.
#[derive(Clone, Default)]
pub struct MockRegisters {
    inner: Arc<Mutex<RegisterFile>>,
}

impl MockRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value without recording an access.
    pub fn get(&self, offset: u32) -> u32 {
        self.inner.lock().values.get(&offset).copied().unwrap_or(0)
    }

    /// Set a register the way the device would, without logging a write.
    pub fn set(&self, offset: u32, value: u32) {
        self.inner.lock().values.insert(offset, value);
    }

    /// Every driver write so far, in order.
    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.inner.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().writes.len()
    }

    /// Writes to one register, in order.
    pub fn writes_to(&self, offset: u32) -> Vec<u32> {
        self.inner
            .lock()
            .writes
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }
}

impl RegisterAccess for MockRegisters {
    fn read(&self, offset: u32) -> u32 {
        self.get(offset)
    }

    fn write(&mut self, offset: u32, value: u32) {
        let mut file = self.inner.lock();
        file.values.insert(offset, value);
        file.writes.push((offset, value));
    }
}

/// Mapper whose windows are `MockRegisters` and whose DMA addresses are host
/// virtual addresses.
pub struct IdentityMapper {
    regs: MockRegisters,
    fail: Option<MapError>,
    mapped: Mutex<Vec<(PhysAddr, usize)>>,
}

impl IdentityMapper {
    pub fn new(regs: MockRegisters) -> Self {
        Self {
            regs,
            fail: None,
            mapped: Mutex::new(Vec::new()),
        }
    }

    /// Make every `map_mmio` call fail with `err`.
    pub fn failing(regs: MockRegisters, err: MapError) -> Self {
        Self {
            fail: Some(err),
            ..Self::new(regs)
        }
    }

    /// Regions handed to `map_mmio`, in order.
    pub fn mapped(&self) -> Vec<(PhysAddr, usize)> {
        self.mapped.lock().clone()
    }
}

impl MemoryMapper for IdentityMapper {
    type Window = MockRegisters;

    fn map_mmio(&self, phys: PhysAddr, size: usize) -> Result<MockRegisters, MapError> {
        if let Some(err) = self.fail {
            return Err(err);
        }
        self.mapped.lock().push((phys, size));
        Ok(self.regs.clone())
    }

    fn physical_address_of(&self, virt: *const u8) -> PhysAddr {
        PhysAddr::new(virt as u64)
    }
}

const CFG_COMMAND: u8 = 0x04;
const CFG_BAR0: u8 = 0x10;
const CFG_BAR_LAST: u8 = 0x24;

struct FunctionConfig {
    regs: [u32; 64],
    /// Writable bits of each BAR; 0 for an unimplemented BAR.
    bar_masks: [u32; 6],
    refuse_enable: bool,
    /// All-ones BAR writes, and how many of them hit with decoding on.
    bar_probes: usize,
    bar_probes_decoding: usize,
}

/// PCI configuration space held in RAM.
#[derive(Default)]
pub struct MockConfigSpace {
    functions: Mutex<BTreeMap<(u8, u8, u8), FunctionConfig>>,
}

/// A BAR as installed in `MockConfigSpace`.
#[derive(Debug, Clone, Copy)]
pub enum MockBar {
    /// 32-bit memory BAR.
    Memory { base: u32, size: u32 },
    Io { base: u32, size: u32 },
}

impl MockConfigSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&self, bdf: (u8, u8, u8), vendor_id: u16, device_id: u16, class: u32, bars: &[MockBar]) {
        let mut regs = [0u32; 64];
        let mut bar_masks = [0u32; 6];
        regs[0] = (device_id as u32) << 16 | vendor_id as u32;
        regs[2] = class;
        regs[15] = 0x0000_010B; // INTA#, line 11
        for (n, bar) in bars.iter().enumerate().take(6) {
            let (value, mask) = match *bar {
                MockBar::Memory { base, size } => (base & !0xF, !(size - 1) & !0xF),
                MockBar::Io { base, size } => ((base & !0x3) | 0x1, (!(size - 1) & !0x3) & 0xFFFF),
            };
            regs[4 + n] = value;
            bar_masks[n] = mask;
        }
        self.functions.lock().insert(
            bdf,
            FunctionConfig {
                regs,
                bar_masks,
                refuse_enable: false,
                bar_probes: 0,
                bar_probes_decoding: 0,
            },
        );
    }

    /// An 82540EM as QEMU presents it: 128 KiB memory BAR0, 64-byte I/O BAR1.
    pub fn add_e1000(&self, bdf: (u8, u8, u8), bar0: u32) {
        self.add_function(
            bdf,
            E1000_VENDOR_ID,
            E1000_DEVICE_ID,
            0x0200_0000,
            &[
                MockBar::Memory { base: bar0, size: 0x20000 },
                MockBar::Io { base: 0xC000, size: 0x40 },
            ],
        );
    }

    /// Ignore writes to the command register of `bdf`.
    pub fn refuse_enable(&self, bdf: (u8, u8, u8)) {
        if let Some(f) = self.functions.lock().get_mut(&bdf) {
            f.refuse_enable = true;
        }
    }

    pub fn command(&self, bdf: (u8, u8, u8)) -> u32 {
        self.functions
            .lock()
            .get(&bdf)
            .map(|f| f.regs[(CFG_COMMAND / 4) as usize])
            .unwrap_or(0)
    }

    /// (BAR sizing writes, those issued while I/O or memory decoding was on).
    pub fn bar_probes(&self, bdf: (u8, u8, u8)) -> (usize, usize) {
        self.functions
            .lock()
            .get(&bdf)
            .map(|f| (f.bar_probes, f.bar_probes_decoding))
            .unwrap_or((0, 0))
    }

    pub fn raw(&self, bdf: (u8, u8, u8), offset: u8) -> u32 {
        self.read32(bdf.0, bdf.1, bdf.2, offset)
    }
}

impl ConfigSpace for MockConfigSpace {
    fn read32(&self, bus: u8, device: u8, func: u8, offset: u8) -> u32 {
        self.functions
            .lock()
            .get(&(bus, device, func))
            .map(|f| f.regs[(offset / 4) as usize])
            .unwrap_or(0xFFFF_FFFF)
    }

    fn write32(&self, bus: u8, device: u8, func: u8, offset: u8, val: u32) {
        let mut functions = self.functions.lock();
        let Some(f) = functions.get_mut(&(bus, device, func)) else {
            return;
        };
        let idx = (offset / 4) as usize;
        match offset {
            CFG_COMMAND if f.refuse_enable => {}
            CFG_BAR0..=CFG_BAR_LAST => {
                let n = ((offset - CFG_BAR0) / 4) as usize;
                if val == 0xFFFF_FFFF {
                    f.bar_probes += 1;
                    if f.regs[(CFG_COMMAND / 4) as usize] & 0x3 != 0 {
                        f.bar_probes_decoding += 1;
                    }
                }
                let mask = f.bar_masks[n];
                let type_bits = if f.regs[idx] & 0x1 != 0 { f.regs[idx] & 0x3 } else { f.regs[idx] & 0xF };
                f.regs[idx] = if mask == 0 { 0 } else { (val & mask) | type_bits };
            }
            _ => f.regs[idx] = val,
        }
    }
}

/// The device side of the rings, driven through DMA addresses found in the
/// mock registers.
pub struct SimulatedDevice {
    regs: MockRegisters,
}

impl SimulatedDevice {
    /// # Safety
    /// The rings programmed into `regs` must belong to a live device handle
    /// that was brought up through `IdentityMapper`, and must stay alive for
    /// as long as this value is used.
    pub unsafe fn new(regs: MockRegisters) -> Self {
        Self { regs }
    }

    fn ring_base(&self, bal: u32, bah: u32) -> u64 {
        (self.regs.get(bah) as u64) << 32 | self.regs.get(bal) as u64
    }

    fn ring_len(&self, len_reg: u32) -> usize {
        self.regs.get(len_reg) as usize / 16
    }

    fn tx_desc(&self, i: usize) -> *mut TxDesc {
        (self.ring_base(regs::TDBAL, regs::TDBAH) as usize as *mut TxDesc).wrapping_add(i)
    }

    fn rx_desc(&self, i: usize) -> *mut RxDesc {
        (self.ring_base(regs::RDBAL, regs::RDBAH) as usize as *mut RxDesc).wrapping_add(i)
    }

    /// Frames queued between TDH and TDT, not yet completed.
    pub fn tx_pending(&self) -> usize {
        let n = self.ring_len(regs::TDLEN);
        let (head, tail) = (self.regs.get(regs::TDH) as usize, self.regs.get(regs::TDT) as usize);
        (tail + n - head) % n
    }

    /// Send up to `max` queued frames: copy each out, set DD, advance TDH.
    pub fn complete_tx(&self, max: usize) -> Vec<Vec<u8>> {
        let n = self.ring_len(regs::TDLEN);
        let mut sent = Vec::new();
        while sent.len() < max && self.tx_pending() > 0 {
            let head = self.regs.get(regs::TDH) as usize;
            unsafe {
                let p = self.tx_desc(head);
                let mut desc = ptr::read_volatile(p);
                let data = core::slice::from_raw_parts(desc.addr as usize as *const u8, desc.length as usize);
                sent.push(data.to_vec());
                desc.status |= TxStatus::DD.bits();
                ptr::write_volatile(p, desc);
            }
            self.regs.set(regs::TDH, ((head + 1) % n) as u32);
        }
        sent
    }

    /// Free receive descriptors: the device may fill from RDH up to, but not
    /// including, RDT.
    pub fn rx_space(&self) -> usize {
        let n = self.ring_len(regs::RDLEN);
        let (head, tail) = (self.regs.get(regs::RDH) as usize, self.regs.get(regs::RDT) as usize);
        (tail + n - head) % n
    }

    /// Write one fragment into the descriptor at RDH and advance RDH.
    /// Returns false when the ring has no free descriptor.
    pub fn deliver_fragment(&self, data: &[u8], eop: bool, errors: RxErrors) -> bool {
        assert!(data.len() <= RX_BUFFER_SIZE);
        if self.rx_space() == 0 {
            return false;
        }
        let n = self.ring_len(regs::RDLEN);
        let head = self.regs.get(regs::RDH) as usize;
        unsafe {
            let p = self.rx_desc(head);
            let mut desc = ptr::read_volatile(p);
            ptr::copy_nonoverlapping(data.as_ptr(), desc.addr as usize as *mut u8, data.len());
            desc.length = data.len() as u16;
            desc.errors = errors.bits();
            desc.status = if eop {
                (RxStatus::DD | RxStatus::EOP).bits()
            } else {
                RxStatus::DD.bits()
            };
            ptr::write_volatile(p, desc);
        }
        self.regs.set(regs::RDH, ((head + 1) % n) as u32);
        true
    }

    /// Deliver a whole frame, split into buffer-sized fragments.
    /// Returns false (delivering nothing) if it does not fit.
    pub fn deliver(&self, frame: &[u8], errors: RxErrors) -> bool {
        let chunks: Vec<&[u8]> = if frame.is_empty() {
            vec![frame]
        } else {
            frame.chunks(RX_BUFFER_SIZE).collect()
        };
        if chunks.len() > self.rx_space() {
            return false;
        }
        let last = chunks.len() - 1;
        for (k, chunk) in chunks.iter().enumerate() {
            let flags = if k == last { errors } else { RxErrors::empty() };
            self.deliver_fragment(chunk, k == last, flags);
        }
        true
    }

    /// Descriptor `i` of the receive ring as the device sees it.
    pub fn rx_descriptor(&self, i: usize) -> RxDesc {
        unsafe { ptr::read_volatile(self.rx_desc(i)) }
    }

    /// Descriptor `i` of the transmit ring as the device sees it.
    pub fn tx_descriptor(&self, i: usize) -> TxDesc {
        unsafe { ptr::read_volatile(self.tx_desc(i)) }
    }
}

/// A device handle attached through the mocks, plus the device side.
pub struct MockNic {
    dev: E1000<MockRegisters>,
    regs: MockRegisters,
    wire: SimulatedDevice,
    mapper: IdentityMapper,
    config_space: MockConfigSpace,
}

impl MockNic {
    /// Where the mock e1000 sits on the bus.
    pub const BDF: (u8, u8, u8) = (0, 3, 0);
    /// Physical base of its register BAR.
    pub const BAR0: u32 = 0xFEBC_0000;

    pub fn attach() -> Result<Self, AttachError> {
        Self::attach_with_config(Config::default())
    }

    pub fn attach_with_config(config: Config) -> Result<Self, AttachError> {
        let regs = MockRegisters::new();
        let config_space = MockConfigSpace::new();
        config_space.add_e1000(Self::BDF, Self::BAR0);
        let mapper = IdentityMapper::new(regs.clone());

        let mut func = pci::find_device(&config_space, E1000_VENDOR_ID, E1000_DEVICE_ID)
            .ok_or(AttachError::Pci(PciError::DeviceNotFound))?;
        let dev = E1000::attach_with_config(&config_space, &mut func, &mapper, config)?;
        // SAFETY: `dev` was attached through an `IdentityMapper` and is owned
        // by this value alongside `wire`.
        let wire = unsafe { SimulatedDevice::new(regs.clone()) };

        Ok(Self {
            dev,
            regs,
            wire,
            mapper,
            config_space,
        })
    }

    pub fn dev(&self) -> &E1000<MockRegisters> {
        &self.dev
    }

    pub fn dev_mut(&mut self) -> &mut E1000<MockRegisters> {
        &mut self.dev
    }

    pub fn regs(&self) -> &MockRegisters {
        &self.regs
    }

    pub fn wire(&self) -> &SimulatedDevice {
        &self.wire
    }

    pub fn mapper(&self) -> &IdentityMapper {
        &self.mapper
    }

    pub fn config_space(&self) -> &MockConfigSpace {
        &self.config_space
    }

    /// The driver and the device side at once.
    pub fn split(&mut self) -> (&mut E1000<MockRegisters>, &SimulatedDevice) {
        (&mut self.dev, &self.wire)
    }
}
