/// Fixed-capacity descriptor rings in DMA memory.
///
/// Layout:
///   [descriptors: 16 * N, 16-byte aligned]     ← TDBAL/RDBAL point here
///   [slot buffers: SLOT * N, separate allocation]
///
/// Descriptor `i` is bound to slot `i` for the lifetime of the ring. The ring
/// keeps no cursor of its own: the position lives in the device's head/tail
/// registers, which the transmit and receive paths read and write.
use core::marker::PhantomData;
use core::mem::size_of;
use core::ptr;
use core::slice;

use super::desc::{Descriptor, RxDesc, SlotOwner, TxDesc};
use crate::mem::{AllocError, DmaBuf, MemoryMapper, PhysAddr};

/// Transmit descriptors (must be a multiple of 8).
pub const TX_RING_SIZE: usize = 64;
/// Receive descriptors (must be a multiple of 8).
pub const RX_RING_SIZE: usize = 128;
/// Maximum Ethernet frame on the wire; one transmit slot.
pub const MAX_PACKET_SIZE: usize = 1518;
/// One receive slot; matches RCTL.BSIZE = 2048.
pub const RX_BUFFER_SIZE: usize = 2048;

/// Required alignment of a descriptor ring base.
pub const DESC_ALIGN: usize = 16;
/// TDLEN/RDLEN must be a multiple of this many bytes.
pub const RING_LEN_MULTIPLE: usize = 128;

pub type TxRing = DescRing<TxDesc, TX_RING_SIZE, MAX_PACKET_SIZE>;
pub type RxRing = DescRing<RxDesc, RX_RING_SIZE, RX_BUFFER_SIZE>;

/// `N` descriptors of type `D`, each bound to a `SLOT`-byte buffer.
pub struct DescRing<D, const N: usize, const SLOT: usize> {
    descs: DmaBuf,
    slots: DmaBuf,
    _desc: PhantomData<D>,
}

impl<D: Descriptor, const N: usize, const SLOT: usize> DescRing<D, N, SLOT> {
    /// Size of the descriptor array in bytes, as programmed into *DLEN.
    pub const LEN_BYTES: usize = N * size_of::<D>();

    // Evaluated per instantiation; a bad size fails the build.
    const LAYOUT_CHECK: () = {
        assert!(N > 0 && N % 8 == 0, "ring size must be a non-zero multiple of 8");
        assert!(Self::LEN_BYTES % RING_LEN_MULTIPLE == 0, "ring length must be a multiple of 128 bytes");
        assert!(size_of::<D>() == 16, "legacy descriptors are 16 bytes");
    };

    /// Allocate zeroed descriptors and slots, and bind every descriptor to
    /// the DMA address of its slot in its initial ownership state.
    ///
    /// Panics if the ring would violate the device's alignment or length
    /// rules; those are layout bugs, not runtime conditions.
    #[allow(clippy::let_unit_value)]
    pub fn new<M: MemoryMapper>(mapper: &M) -> Result<Self, AllocError> {
        let () = Self::LAYOUT_CHECK;

        let descs = DmaBuf::alloc(Self::LEN_BYTES, DESC_ALIGN, mapper)?;
        let slots = DmaBuf::alloc(N * SLOT, DESC_ALIGN, mapper)?;

        assert!(
            descs.phys_addr().is_aligned(DESC_ALIGN),
            "descriptor ring at {:?} is not {}-byte aligned",
            descs.phys_addr(),
            DESC_ALIGN
        );
        assert_eq!(Self::LEN_BYTES % RING_LEN_MULTIPLE, 0);

        let mut ring = Self {
            descs,
            slots,
            _desc: PhantomData,
        };
        for i in 0..N {
            let buf = mapper.physical_address_of(ring.slot_ptr(i));
            ring.write(i, D::bound_to(buf));
        }
        Ok(ring)
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub const fn slot_size(&self) -> usize {
        SLOT
    }

    /// Physical base of the descriptor array.
    pub fn base(&self) -> PhysAddr {
        self.descs.phys_addr()
    }

    /// Value for the *DLEN register.
    pub fn len_bytes(&self) -> u32 {
        Self::LEN_BYTES as u32
    }

    /// Index following `i`, wrapping at the ring size.
    #[inline]
    pub const fn next(i: usize) -> usize {
        (i + 1) % N
    }

    #[inline]
    fn desc_ptr(&self, i: usize) -> *mut D {
        assert!(i < N, "descriptor index {} out of range", i);
        unsafe { (self.descs.as_mut_ptr() as *mut D).add(i) }
    }

    #[inline]
    fn slot_ptr(&self, i: usize) -> *mut u8 {
        assert!(i < N, "slot index {} out of range", i);
        unsafe { self.slots.as_mut_ptr().add(i * SLOT) }
    }

    /// Snapshot of descriptor `i`. The device may write it at any time, so
    /// this is always a fresh volatile load.
    #[inline]
    pub fn read(&self, i: usize) -> D {
        unsafe { ptr::read_volatile(self.desc_ptr(i)) }
    }

    #[inline]
    pub fn write(&mut self, i: usize, desc: D) {
        unsafe { ptr::write_volatile(self.desc_ptr(i), desc) }
    }

    pub fn owner(&self, i: usize) -> SlotOwner {
        self.read(i).owner()
    }

    /// Backing buffer of slot `i`.
    pub fn slot(&self, i: usize) -> &[u8] {
        unsafe { slice::from_raw_parts(self.slot_ptr(i), SLOT) }
    }

    pub fn slot_mut(&mut self, i: usize) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.slot_ptr(i), SLOT) }
    }
}
