/// Receive path.
///
/// RDT trails the device: the slot after RDT is the next one the device fills.
/// A frame is taken only once every fragment up to and including the one
/// marked EOP is done, so a half-written chain is left for a later poll.
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{fence, Ordering};

use super::desc::{Descriptor, RxErrors};
use super::regs::{self, RegisterAccess};
use super::ring::{RxRing, RX_BUFFER_SIZE, RX_RING_SIZE};
use super::E1000;

/// Upper bound on fragments per frame: every slot except the one RDT holds back.
const MAX_FRAGMENTS: usize = RX_RING_SIZE - 1;

/// Hardware-reported receive errors attached to a delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameError(RxErrors);

impl FrameError {
    pub fn flags(&self) -> RxErrors {
        self.0
    }

    pub fn is_crc_error(&self) -> bool {
        self.0.contains(RxErrors::CE)
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receive error {:?}", self.0)
    }
}

/// One received Ethernet frame (CRC already stripped by the device).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    errors: RxErrors,
    fragments: usize,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Number of descriptors the frame spanned.
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// `Some` if the device flagged the frame; upper layers should discard it.
    pub fn error(&self) -> Option<FrameError> {
        if self.errors.is_empty() {
            None
        } else {
            Some(FrameError(self.errors))
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl<R: RegisterAccess> E1000<R> {
    /// Take the next complete frame, if the device has delivered one.
    ///
    /// Never blocks. Consumed slots are wiped and handed back to the device by
    /// moving RDT onto the last of them.
    pub fn receive(&mut self) -> Option<Frame> {
        let tail = self.regs.read(regs::RDT) as usize;
        let first = RxRing::next(tail);
        if !self.rx.read(first).is_done() {
            return None;
        }
        // Descriptor contents are only valid after DD is observed.
        fence(Ordering::Acquire);

        let mut last = first;
        let mut count = 1;
        let mut truncated = false;
        while !self.rx.read(last).is_end_of_packet() {
            if count == MAX_FRAGMENTS {
                truncated = true;
                break;
            }
            let next = RxRing::next(last);
            if !self.rx.read(next).is_done() {
                log::trace!("e1000: rx chain at {} still in flight", first);
                return None;
            }
            last = next;
            count += 1;
        }
        fence(Ordering::Acquire);

        let total: usize = (0..count)
            .map(|k| (self.rx.read((first + k) % RX_RING_SIZE).length as usize).min(RX_BUFFER_SIZE))
            .sum();
        let mut data = Vec::with_capacity(total);
        let mut errors = RxErrors::empty();
        let mut i = first;
        for _ in 0..count {
            let mut desc = self.rx.read(i);
            let len = (desc.length as usize).min(RX_BUFFER_SIZE);
            data.extend_from_slice(&self.rx.slot(i)[..len]);
            errors |= desc.errors();
            desc.recycle();
            self.rx.write(i, desc);
            i = RxRing::next(i);
        }
        if truncated {
            log::warn!("e1000: rx chain of {} fragments without EOP", count);
            errors |= RxErrors::RXE;
        }

        fence(Ordering::Release);
        self.regs.write(regs::RDT, last as u32);

        self.stats.rx_packets += 1;
        self.stats.rx_bytes += data.len() as u64;
        if !errors.is_empty() {
            self.stats.rx_errors += 1;
            log::debug!("e1000: rx frame of {} bytes flagged {:?}", data.len(), errors);
        }

        Some(Frame {
            data,
            errors,
            fragments: count,
        })
    }
}
