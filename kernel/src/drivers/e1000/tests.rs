/// Unit tests for the e1000 driver: register packing, ring layout, attach,
/// and both data paths against the simulated device in `mock`.
///
/// Run with: cargo test --target x86_64-unknown-linux-gnu --lib
use alloc::vec::Vec;

use super::desc::{Descriptor, RxErrors, TxCmd};
use super::mock::{IdentityMapper, MockBar, MockConfigSpace, MockNic, MockRegisters};
use super::regs::{self, masked_value, Rctl, Tctl, TIPG_IPGR1, TIPG_IPGR2, TIPG_IPGT};
use super::ring::{RxRing, TxRing, MAX_PACKET_SIZE, RX_BUFFER_SIZE, RX_RING_SIZE, TX_RING_SIZE};
use super::*;
use crate::drivers::pci::{self, PciError};
use crate::mem::MapError;

fn frame(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect()
}

fn attached() -> MockNic {
    MockNic::attach().expect("mock e1000 attaches")
}

fn find_mock(cs: &MockConfigSpace) -> PciFunction {
    pci::find_device(cs, E1000_VENDOR_ID, E1000_DEVICE_ID).expect("device present")
}

// ---- Register packing ----

#[test]
fn masked_value_shifts_into_field() {
    assert_eq!(masked_value(0x0FF0, 0x10), 0x100);
    assert_eq!(masked_value(Tctl::CT.bits(), 0x10), 0x100);
    assert_eq!(masked_value(Tctl::COLD.bits(), 0x40), 0x4_0000);
    assert_eq!(masked_value(TIPG_IPGT, 10), 10);
    assert_eq!(masked_value(TIPG_IPGR1, 8), 8 << 10);
    assert_eq!(masked_value(TIPG_IPGR2, 6), 6 << 20);
}

#[test]
fn masked_value_clips_to_mask() {
    assert_eq!(masked_value(0xF0, 0x1F), 0xF0);
    assert_eq!(masked_value(0x8000_0000, 3), 0x8000_0000);
}

#[test]
fn masked_value_zero_mask_is_zero() {
    assert_eq!(masked_value(0, 0xFFFF_FFFF), 0);
    assert_eq!(masked_value(0, 1), 0);
}

#[test]
fn default_config_register_values() {
    let c = Config::default();
    assert_eq!(c.tctl(), 0x0004_010A);
    assert_eq!(c.tipg(), 0x0060_200A);
    assert_eq!(c.rctl(), 0x0400_8002);
    assert_eq!(c.rctl() & (Rctl::BSIZE_1024 | Rctl::BSIZE_512 | Rctl::BSIZE_256).bits(), 0);
    assert_eq!(c.receive_address(), (0x1200_5452, 0x8000_5634));
}

#[test]
fn receive_address_from_custom_mac() {
    let c = Config {
        mac: [0x02, 0x00, 0x00, 0xAA, 0xBB, 0xCC],
        ..Config::default()
    };
    assert_eq!(c.receive_address(), (0xAA00_0002, 0x8000_CCBB));
}

// ---- Ring layout ----

#[test]
fn ring_lengths_are_multiples_of_128() {
    assert_eq!(TxRing::LEN_BYTES, 1024);
    assert_eq!(RxRing::LEN_BYTES, 2048);
    assert_eq!(TxRing::LEN_BYTES % 128, 0);
    assert_eq!(RxRing::LEN_BYTES % 128, 0);
}

#[test]
fn ring_next_wraps() {
    assert_eq!(TxRing::next(0), 1);
    assert_eq!(TxRing::next(TX_RING_SIZE - 1), 0);
    assert_eq!(RxRing::next(RX_RING_SIZE - 1), 0);
}

#[test]
fn new_ring_binds_every_slot() {
    let mapper = IdentityMapper::new(MockRegisters::new());
    let tx = TxRing::new(&mapper).unwrap();
    let rx = RxRing::new(&mapper).unwrap();

    assert!(tx.base().is_aligned(16));
    assert!(rx.base().is_aligned(16));
    for i in 0..TX_RING_SIZE {
        assert_eq!(tx.read(i).addr, tx.slot(i).as_ptr() as u64);
        assert_eq!(tx.owner(i), SlotOwner::Software);
    }
    for i in 0..RX_RING_SIZE {
        let d = rx.read(i);
        assert_eq!(d.addr, rx.slot(i).as_ptr() as u64);
        assert_eq!(d.status, 0);
        assert_eq!(rx.owner(i), SlotOwner::Hardware);
    }
    assert_eq!(tx.slot(1).as_ptr() as usize - tx.slot(0).as_ptr() as usize, MAX_PACKET_SIZE);
    assert_eq!(rx.slot(1).as_ptr() as usize - rx.slot(0).as_ptr() as usize, RX_BUFFER_SIZE);
}

// ---- Attach ----

#[test]
fn attach_programs_transmit_registers() {
    let nic = attached();
    let r = nic.regs();
    let base = (r.get(regs::TDBAH) as u64) << 32 | r.get(regs::TDBAL) as u64;
    assert_eq!(base, nic.dev().tx.base().as_u64());
    assert_eq!(r.get(regs::TDLEN), 1024);
    assert_eq!(r.writes_to(regs::TDH), [0]);
    assert_eq!(r.writes_to(regs::TDT), [0]);
    assert_eq!(r.get(regs::TCTL), (Tctl::EN | Tctl::PSP).bits() | 0x100 | 0x4_0000);
    assert_eq!(r.get(regs::TIPG), 10 | 8 << 10 | 6 << 20);
}

#[test]
fn attach_programs_receive_registers() {
    let nic = attached();
    let r = nic.regs();
    assert_eq!(r.get(regs::RAL), 0x1200_5452);
    assert_eq!(r.get(regs::RAH), 0x5634 | regs::RAH_AV);
    for i in 0..regs::MTA_ENTRIES {
        assert_eq!(r.writes_to(regs::MTA + 4 * i), [0], "MTA[{}]", i);
    }
    assert_eq!(r.writes_to(regs::IMS), [0]);
    assert_eq!(r.writes_to(regs::IMC), [u32::MAX]);

    let base = (r.get(regs::RDBAH) as u64) << 32 | r.get(regs::RDBAL) as u64;
    assert_eq!(base, nic.dev().rx.base().as_u64());
    assert_eq!(r.get(regs::RDLEN), 2048);
    assert_eq!(r.writes_to(regs::RDH), [0]);
    assert_eq!(r.writes_to(regs::RDT), [127]);
    assert_eq!(r.get(regs::RCTL), (Rctl::EN | Rctl::BAM | Rctl::SECRC).bits());
}

#[test]
fn attach_write_order() {
    let nic = attached();
    let writes = nic.regs().writes();
    let pos = |reg: u32| writes.iter().position(|(o, _)| *o == reg).unwrap();

    assert!(pos(regs::TDBAL) < pos(regs::TDLEN));
    assert!(pos(regs::TDLEN) < pos(regs::TDH));
    assert!(pos(regs::TDT) < pos(regs::TCTL));
    assert!(pos(regs::TCTL) < pos(regs::RAL));
    assert!(pos(regs::IMC) < pos(regs::RDBAL));
    assert!(pos(regs::RDT) < pos(regs::RCTL));
    assert_eq!(writes.last(), Some(&(regs::RCTL, Config::default().rctl())));
}

#[test]
fn attach_leaves_tx_free_and_rx_hardware_owned() {
    let nic = attached();
    let dev = nic.dev();
    for i in 0..TX_RING_SIZE {
        assert!(dev.tx.read(i).is_done(), "tx {}", i);
    }
    for i in 0..RX_RING_SIZE {
        assert!(!dev.rx.read(i).is_done(), "rx {}", i);
        assert_ne!(dev.rx.read(i).addr, 0);
    }
    assert!(dev.tx_ready());
    assert_eq!(dev.stats(), Stats::default());
}

#[test]
fn attach_enables_pci_and_maps_bar0() {
    let nic = attached();
    let cmd = nic.config_space().command(MockNic::BDF);
    assert_eq!(cmd & 0x6, 0x6);
    assert_eq!(
        nic.mapper().mapped(),
        [(PhysAddr::new(MockNic::BAR0 as u64), regs::REGISTER_WINDOW_SIZE)]
    );
}

#[test]
fn attach_with_custom_config() {
    let config = Config {
        mac: [0x02, 0x11, 0x22, 0x33, 0x44, 0x55],
        collision_threshold: 0x0F,
        ..Config::default()
    };
    let nic = MockNic::attach_with_config(config).unwrap();
    assert_eq!(nic.dev().mac_address(), config.mac);
    assert_eq!(nic.regs().get(regs::RAL), 0x3322_1102);
    assert_eq!(nic.regs().get(regs::RAH), 0x5544 | regs::RAH_AV);
    assert_eq!(nic.regs().get(regs::TCTL), config.tctl());
    assert_eq!(nic.regs().get(regs::TCTL) & Tctl::CT.bits(), 0xF0);
}

#[test]
fn attach_fails_when_pci_enable_fails() {
    let regs = MockRegisters::new();
    let cs = MockConfigSpace::new();
    cs.add_e1000(MockNic::BDF, MockNic::BAR0);
    cs.refuse_enable(MockNic::BDF);
    let mapper = IdentityMapper::new(regs.clone());
    let mut func = find_mock(&cs);

    let err = E1000::attach(&cs, &mut func, &mapper).err();
    assert_eq!(err, Some(AttachError::Pci(PciError::EnableFailed)));
    assert!(mapper.mapped().is_empty());
    assert_eq!(regs.write_count(), 0);
}

#[test]
fn attach_rejects_io_bar0() {
    let regs = MockRegisters::new();
    let cs = MockConfigSpace::new();
    cs.add_function(
        MockNic::BDF,
        E1000_VENDOR_ID,
        E1000_DEVICE_ID,
        0x0200_0000,
        &[MockBar::Io { base: 0xC000, size: 0x40 }],
    );
    let mapper = IdentityMapper::new(regs.clone());
    let mut func = find_mock(&cs);

    let err = E1000::attach(&cs, &mut func, &mapper).err();
    assert_eq!(err, Some(AttachError::NoMmioRegion));
    assert!(mapper.mapped().is_empty());
}

#[test]
fn attach_rejects_small_bar0() {
    let regs = MockRegisters::new();
    let cs = MockConfigSpace::new();
    cs.add_function(
        MockNic::BDF,
        E1000_VENDOR_ID,
        E1000_DEVICE_ID,
        0x0200_0000,
        &[MockBar::Memory { base: 0xFE00_0000, size: 0x1000 }],
    );
    let mapper = IdentityMapper::new(regs.clone());
    let mut func = find_mock(&cs);

    let err = E1000::attach(&cs, &mut func, &mapper).err();
    assert_eq!(err, Some(AttachError::NoMmioRegion));
    assert!(mapper.mapped().is_empty());
    assert_eq!(regs.write_count(), 0);
}

#[test]
fn attach_rejects_missing_bar0() {
    let cs = MockConfigSpace::new();
    cs.add_function(MockNic::BDF, E1000_VENDOR_ID, E1000_DEVICE_ID, 0x0200_0000, &[]);
    let mapper = IdentityMapper::new(MockRegisters::new());
    let mut func = find_mock(&cs);

    let err = E1000::attach(&cs, &mut func, &mapper).err();
    assert_eq!(err, Some(AttachError::NoMmioRegion));
}

#[test]
fn attach_propagates_map_failure() {
    let regs = MockRegisters::new();
    let cs = MockConfigSpace::new();
    cs.add_e1000(MockNic::BDF, MockNic::BAR0);
    let mapper = IdentityMapper::failing(regs.clone(), MapError::OutOfRange);
    let mut func = find_mock(&cs);

    let err = E1000::attach(&cs, &mut func, &mapper).err();
    assert_eq!(err, Some(AttachError::Map(MapError::OutOfRange)));
    assert_eq!(regs.write_count(), 0);
}

#[test]
fn attach_error_display() {
    let e = AttachError::Pci(PciError::EnableFailed);
    assert!(alloc::format!("{}", e).contains("memory/bus-master"));
    assert!(alloc::format!("{}", AttachError::NoMmioRegion).contains("BAR0"));
}

// ---- Transmit ----

#[test]
fn transmit_queues_frame_and_advances_tail() {
    let mut nic = attached();
    let f = frame(60, 0x5A);
    nic.dev_mut().transmit(&f).unwrap();

    assert_eq!(nic.regs().get(regs::TDT), 1);
    let d = nic.dev().tx.read(0);
    assert_eq!(d.length, 60);
    assert_eq!(d.cmd(), TxCmd::RS | TxCmd::EOP);
    assert!(!d.is_done());
    assert_eq!(nic.dev().tx.owner(0), SlotOwner::Hardware);
    assert_eq!(&nic.dev().tx.slot(0)[..60], &f[..]);

    assert_eq!(nic.wire().complete_tx(8), [f]);
    assert_eq!(nic.dev().tx.owner(0), SlotOwner::Software);
}

#[test]
fn transmit_publishes_tail_last() {
    let mut nic = attached();
    let before = nic.regs().write_count();
    nic.dev_mut().transmit(&frame(64, 1)).unwrap();
    let writes = nic.regs().writes();
    assert_eq!(&writes[before..], &[(regs::TDT, 1)]);
}

#[test]
fn transmit_accepts_max_size_frame() {
    let mut nic = attached();
    let f = frame(MAX_PACKET_SIZE, 7);
    nic.dev_mut().transmit(&f).unwrap();
    assert_eq!(nic.wire().complete_tx(1), [f]);
}

#[test]
fn transmit_rejects_oversized_frame_without_mutation() {
    let mut nic = attached();
    let writes = nic.regs().write_count();
    let desc = nic.dev().tx.read(0);

    let err = nic.dev_mut().transmit(&frame(MAX_PACKET_SIZE + 1, 0));
    assert_eq!(err, Err(TxError::PacketTooLarge));
    assert_eq!(nic.regs().write_count(), writes);
    assert_eq!(nic.regs().get(regs::TDT), 0);
    assert_eq!(nic.dev().tx.read(0), desc);
    assert_eq!(nic.dev().stats().tx_packets, 0);
}

#[test]
fn transmit_rejects_empty_frame() {
    let mut nic = attached();
    let writes = nic.regs().write_count();
    assert_eq!(nic.dev_mut().transmit(&[]), Err(TxError::EmptyFrame));
    assert_eq!(nic.regs().write_count(), writes);
}

#[test]
fn tail_cycles_through_ring() {
    let mut nic = attached();
    for k in 0..(3 * TX_RING_SIZE) {
        let f = frame(60 + k % 40, k as u8);
        nic.dev_mut().transmit(&f).unwrap();
        assert_eq!(nic.regs().get(regs::TDT) as usize, (k + 1) % TX_RING_SIZE);
        assert_eq!(nic.wire().complete_tx(1), [f]);
    }
    assert_eq!(nic.regs().get(regs::TDT), 0);
    assert_eq!(nic.regs().get(regs::TDH), nic.regs().get(regs::TDT));
    for i in 0..TX_RING_SIZE {
        assert!(nic.dev().tx.read(i).is_done(), "tx {}", i);
    }
    assert!(nic.dev().tx_ready());
    assert_eq!(nic.dev().stats().tx_packets, 3 * TX_RING_SIZE as u64);
}

#[test]
fn ring_full_when_device_stalls() {
    let mut nic = attached();
    // The device reads TDH == TDT as empty, so one slot stays unused.
    for k in 0..TX_RING_SIZE - 1 {
        nic.dev_mut().transmit(&frame(60, k as u8)).unwrap();
    }
    assert!(!nic.dev().tx_ready());

    let writes = nic.regs().write_count();
    assert_eq!(nic.dev_mut().transmit(&frame(60, 0xFF)), Err(TxError::RingFull));
    assert_eq!(nic.dev_mut().transmit(&frame(60, 0xFF)), Err(TxError::RingFull));
    assert_eq!(nic.regs().write_count(), writes);
    assert_eq!(nic.regs().get(regs::TDT) as usize, TX_RING_SIZE - 1);
    assert_eq!(nic.dev().stats().tx_ring_full, 2);

    assert_eq!(nic.wire().complete_tx(1).len(), 1);
    assert!(nic.dev().tx_ready());
    nic.dev_mut().transmit(&frame(60, 0xFF)).unwrap();
    assert_eq!(nic.regs().get(regs::TDT), 0);
}

#[test]
fn ring_full_when_tail_descriptor_not_done() {
    let mut nic = attached();
    nic.dev_mut().transmit(&frame(60, 1)).unwrap();
    // Device fetched the descriptor (TDH moved) but has not written DD back.
    nic.regs().set(regs::TDH, 1);
    nic.regs().set(regs::TDT, 0);
    assert_eq!(nic.dev_mut().transmit(&frame(60, 2)), Err(TxError::RingFull));
}

#[test]
fn completed_frames_come_out_in_order() {
    let mut nic = attached();
    let frames: Vec<Vec<u8>> = (0..10).map(|k| frame(100 + k, k as u8)).collect();
    for f in &frames {
        nic.dev_mut().transmit(f).unwrap();
    }
    assert_eq!(nic.wire().tx_pending(), 10);
    assert_eq!(nic.wire().complete_tx(usize::MAX), frames);
}

// ---- Receive ----

#[test]
fn receive_returns_none_when_idle() {
    let mut nic = attached();
    let writes = nic.regs().write_count();
    assert!(nic.dev_mut().receive().is_none());
    assert!(nic.dev_mut().receive().is_none());
    assert_eq!(nic.regs().write_count(), writes);
}

#[test]
fn receive_delivers_frame_and_returns_slot() {
    let mut nic = attached();
    let f = frame(342, 0x33);
    assert!(nic.wire().deliver(&f, RxErrors::empty()));

    let got = nic.dev_mut().receive().expect("frame");
    assert_eq!(got.as_bytes(), &f[..]);
    assert_eq!(got.len(), 342);
    assert_eq!(got.fragments(), 1);
    assert!(got.is_ok());
    assert_eq!(got.error(), None);

    let d = nic.dev().rx.read(0);
    assert_eq!((d.status, d.errors, d.length), (0, 0, 0));
    assert_eq!(d.addr, nic.dev().rx.slot(0).as_ptr() as u64);
    assert_eq!(nic.regs().get(regs::RDT), 0);
    assert!(nic.dev_mut().receive().is_none());
}

#[test]
fn receive_tail_follows_consumed_slots() {
    let mut nic = attached();
    for k in 0..(2 * RX_RING_SIZE + 5) {
        let f = frame(64 + k % 1000, k as u8);
        assert!(nic.wire().deliver(&f, RxErrors::empty()), "deliver {}", k);
        let got = nic.dev_mut().receive().expect("frame");
        assert_eq!(got.into_vec(), f);
        assert_eq!(nic.regs().get(regs::RDT) as usize, k % RX_RING_SIZE);
    }
}

#[test]
fn receive_drains_backlog_in_order() {
    let mut nic = attached();
    let frames: Vec<Vec<u8>> = (0..20).map(|k| frame(60 + k, k as u8)).collect();
    for f in &frames {
        assert!(nic.wire().deliver(f, RxErrors::empty()));
    }
    for f in &frames {
        assert_eq!(nic.dev_mut().receive().unwrap().as_bytes(), &f[..]);
    }
    assert!(nic.dev_mut().receive().is_none());
}

#[test]
fn device_cannot_overrun_receive_ring() {
    let nic = attached();
    for k in 0..RX_RING_SIZE - 1 {
        assert!(nic.wire().deliver(&frame(60, k as u8), RxErrors::empty()));
    }
    assert_eq!(nic.wire().rx_space(), 0);
    assert!(!nic.wire().deliver(&frame(60, 0), RxErrors::empty()));
}

#[test]
fn receive_reassembles_fragments() {
    let mut nic = attached();
    let f = frame(RX_BUFFER_SIZE + 952, 0x11);
    assert!(nic.wire().deliver(&f, RxErrors::empty()));

    let got = nic.dev_mut().receive().expect("frame");
    assert_eq!(got.fragments(), 2);
    assert_eq!(got.as_bytes(), &f[..]);
    assert_eq!(nic.regs().get(regs::RDT), 1);
    assert!(!nic.dev().rx.read(0).is_done());
    assert!(!nic.dev().rx.read(1).is_done());
}

#[test]
fn incomplete_chain_is_not_consumed() {
    let mut nic = attached();
    let head = frame(RX_BUFFER_SIZE, 1);
    let tail = frame(100, 2);
    assert!(nic.wire().deliver_fragment(&head, false, RxErrors::empty()));

    let writes = nic.regs().write_count();
    assert!(nic.dev_mut().receive().is_none());
    assert_eq!(nic.regs().write_count(), writes);
    assert!(nic.dev().rx.read(0).is_done());

    assert!(nic.wire().deliver_fragment(&tail, true, RxErrors::empty()));
    let got = nic.dev_mut().receive().expect("frame");
    let mut expected = head.clone();
    expected.extend_from_slice(&tail);
    assert_eq!(got.into_vec(), expected);
}

#[test]
fn chain_without_eop_is_flagged() {
    let mut nic = attached();
    for k in 0..RX_RING_SIZE - 1 {
        assert!(nic.wire().deliver_fragment(&[k as u8; 4], false, RxErrors::empty()));
    }
    let got = nic.dev_mut().receive().expect("frame");
    assert_eq!(got.fragments(), RX_RING_SIZE - 1);
    assert_eq!(got.len(), 4 * (RX_RING_SIZE - 1));
    assert!(got.error().unwrap().flags().contains(RxErrors::RXE));
    assert_eq!(nic.regs().get(regs::RDT) as usize, RX_RING_SIZE - 2);
}

#[test]
fn receive_flags_errored_frame_and_recycles_slot() {
    let mut nic = attached();
    let f = frame(128, 9);
    assert!(nic.wire().deliver(&f, RxErrors::CE));

    let got = nic.dev_mut().receive().expect("frame still delivered");
    assert_eq!(got.as_bytes(), &f[..]);
    assert!(!got.is_ok());
    let err = got.error().unwrap();
    assert!(err.is_crc_error());
    assert_eq!(err.flags(), RxErrors::CE);
    assert_eq!(nic.dev().rx.read(0).errors, 0);
    assert_eq!(nic.regs().get(regs::RDT), 0);
    assert_eq!(nic.dev().stats().rx_errors, 1);

    assert!(nic.wire().deliver(&f, RxErrors::empty()));
    assert!(nic.dev_mut().receive().unwrap().is_ok());
}

#[test]
fn receive_merges_error_bits_across_fragments() {
    let mut nic = attached();
    assert!(nic.wire().deliver_fragment(&frame(RX_BUFFER_SIZE, 0), false, RxErrors::SE));
    assert!(nic.wire().deliver_fragment(&frame(10, 0), true, RxErrors::IPE));
    let got = nic.dev_mut().receive().unwrap();
    assert_eq!(got.error().map(|e| e.flags()), Some(RxErrors::SE | RxErrors::IPE));
}

// ---- Statistics ----

#[test]
fn stats_count_both_directions() {
    let mut nic = attached();
    nic.dev_mut().transmit(&frame(60, 0)).unwrap();
    nic.dev_mut().transmit(&frame(100, 0)).unwrap();
    assert!(nic.wire().deliver(&frame(70, 0), RxErrors::empty()));
    assert!(nic.wire().deliver(&frame(80, 0), RxErrors::CE));
    while nic.dev_mut().receive().is_some() {}

    let s = nic.dev().stats();
    assert_eq!(s.tx_packets, 2);
    assert_eq!(s.tx_bytes, 160);
    assert_eq!(s.rx_packets, 2);
    assert_eq!(s.rx_bytes, 150);
    assert_eq!(s.rx_errors, 1);
    assert_eq!(s.tx_ring_full, 0);
}

#[test]
fn status_reads_device_register() {
    let nic = attached();
    nic.regs().set(regs::STATUS, 0x8083);
    assert_eq!(nic.dev().status(), 0x8083);
}

#[test]
fn shared_handle_serializes_callers() {
    let file = MockRegisters::new();
    let mapper = IdentityMapper::new(file.clone());
    let dev = E1000::init(file.clone(), &mapper, Config::default()).unwrap();
    let shared: SharedE1000<MockRegisters> = spin::Mutex::new(dev);

    shared.lock().transmit(&frame(60, 3)).unwrap();
    assert!(shared.lock().receive().is_none());
    assert_eq!(shared.lock().stats().tx_packets, 1);
    assert_eq!(file.get(regs::TDT), 1);
}
