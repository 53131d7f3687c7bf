#![no_std]

//! Polled-mode driver for the Intel 82540EM (e1000) Ethernet controller.
//!
//! The driver is hardware-agnostic at its edges: PCI configuration space and
//! memory mapping come in through traits (`drivers::pci::ConfigSpace`,
//! `mem::MemoryMapper`), so the same code runs on the kernel's port I/O and
//! HHDM and on the RAM-backed mocks used by the host-target tests.

extern crate alloc;

pub mod drivers;
pub mod mem;
pub mod net;

pub use drivers::e1000::{AttachError, Config, Frame, FrameError, Stats, TxError, E1000};
