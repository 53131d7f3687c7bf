/// Transmit path.
///
/// The slot to fill is the one TDT points at. It is free only if the device
/// has marked it done and moving TDT past it would not land on TDH (the device
/// reads TDH == TDT as an empty ring, so at most N - 1 frames are in flight).
/// Otherwise the ring is full and the caller retries later.
/// Publication order: copy frame → fill descriptor → fence → TDT.
use core::fmt;
use core::sync::atomic::{fence, Ordering};

use super::desc::{Descriptor, TxCmd};
use super::regs::{self, RegisterAccess};
use super::ring::{TxRing, MAX_PACKET_SIZE};
use super::E1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxError {
    /// Frame longer than `MAX_PACKET_SIZE`; the caller must split or drop it.
    PacketTooLarge,
    /// Zero-length frame.
    EmptyFrame,
    /// The device has not yet drained the tail slot, or 63 frames (ring size
    /// minus one) are already in flight; retry after yielding.
    RingFull,
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxError::PacketTooLarge => write!(f, "frame exceeds {} bytes", MAX_PACKET_SIZE),
            TxError::EmptyFrame => write!(f, "empty frame"),
            TxError::RingFull => write!(f, "transmit ring full"),
        }
    }
}

impl<R: RegisterAccess> E1000<R> {
    /// Queue one Ethernet frame (without FCS) for transmission.
    ///
    /// Never blocks. On error nothing is written to the ring or registers.
    pub fn transmit(&mut self, frame: &[u8]) -> Result<(), TxError> {
        if frame.len() > MAX_PACKET_SIZE {
            return Err(TxError::PacketTooLarge);
        }
        if frame.is_empty() {
            return Err(TxError::EmptyFrame);
        }

        let tail = self.regs.read(regs::TDT) as usize;
        if !self.tx_slot_free(tail) {
            self.stats.tx_ring_full += 1;
            log::trace!("e1000: tx ring full at {}", tail);
            return Err(TxError::RingFull);
        }

        self.tx.slot_mut(tail)[..frame.len()].copy_from_slice(frame);
        let mut desc = self.tx.read(tail);
        desc.queue(frame.len() as u16, TxCmd::RS | TxCmd::EOP);
        self.tx.write(tail, desc);

        // The device may fetch the descriptor as soon as TDT moves.
        fence(Ordering::Release);
        self.regs.write(regs::TDT, TxRing::next(tail) as u32);

        self.stats.tx_packets += 1;
        self.stats.tx_bytes += frame.len() as u64;
        Ok(())
    }

    /// Whether a `transmit` issued now would find a free slot.
    pub fn tx_ready(&self) -> bool {
        let tail = self.regs.read(regs::TDT) as usize;
        self.tx_slot_free(tail)
    }

    fn tx_slot_free(&self, tail: usize) -> bool {
        let head = self.regs.read(regs::TDH) as usize;
        self.tx.read(tail).is_done() && TxRing::next(tail) != head
    }
}
