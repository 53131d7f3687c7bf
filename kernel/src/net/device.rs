/// smoltcp PHY device adapter for the e1000.
///
/// Borrows the device handle for the duration of one `Interface::poll`, so the
/// caller keeps ownership (and any lock around it) between polls.
use alloc::vec::Vec;
use smoltcp::phy::{self, Device, DeviceCapabilities, Medium};
use smoltcp::time::Instant;

use crate::drivers::e1000::E1000;
use crate::mem::RegisterAccess;

/// Ethernet MTU as smoltcp counts it: header included, FCS excluded.
const MTU: usize = 1514;

/// Adapter that implements smoltcp's Device trait on top of an `E1000`.
pub struct E1000Device<'d, R: RegisterAccess> {
    dev: &'d mut E1000<R>,
}

impl<'d, R: RegisterAccess> E1000Device<'d, R> {
    pub fn new(dev: &'d mut E1000<R>) -> Self {
        Self { dev }
    }

    pub fn mac(&self) -> [u8; 6] {
        self.dev.mac_address()
    }
}

impl<'d, R: RegisterAccess> Device for E1000Device<'d, R> {
    type RxToken<'a> = RxToken where Self: 'a;
    type TxToken<'a> = TxToken<'a, R> where Self: 'a;

    fn receive(&mut self, _timestamp: Instant) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        loop {
            let frame = self.dev.receive()?;
            if let Some(err) = frame.error() {
                log::warn!("e1000: dropping {}-byte frame: {}", frame.len(), err);
                continue;
            }
            return Some((RxToken { frame: frame.into_vec() }, TxToken { dev: &mut *self.dev }));
        }
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<Self::TxToken<'_>> {
        if !self.dev.tx_ready() {
            return None;
        }
        Some(TxToken { dev: &mut *self.dev })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let mut caps = DeviceCapabilities::default();
        caps.medium = Medium::Ethernet;
        caps.max_transmission_unit = MTU;
        caps.max_burst_size = Some(1);
        caps
    }
}

/// Receive token: holds one error-free received frame.
pub struct RxToken {
    frame: Vec<u8>,
}

impl phy::RxToken for RxToken {
    fn consume<T, F>(mut self, f: F) -> T
    where
        F: FnOnce(&mut [u8]) -> T,
    {
        f(&mut self.frame)
    }
}

/// Transmit token: smoltcp fills a scratch buffer, which is then queued.
pub struct TxToken<'a, R: RegisterAccess> {
    dev: &'a mut E1000<R>,
}

impl<'a, R: RegisterAccess> phy::TxToken for TxToken<'a, R> {
    fn consume<T, F>(self, len: usize, f: F) -> T
    where
        F: FnOnce(&mut [u8]) -> T,
    {
        let mut buf = alloc::vec![0u8; len];
        let result = f(&mut buf);

        if let Err(e) = self.dev.transmit(&buf) {
            log::warn!("e1000: dropped outgoing {}-byte frame: {}", len, e);
        }

        result
    }
}
