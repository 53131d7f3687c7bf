/// Runtime-tunable parameters written during attach.
///
/// Ring sizes and slot sizes are compile-time constants in `ring`; only
/// values that end up in control registers live here.
use super::regs::{masked_value, Rctl, Tctl, RAH_AV, TIPG_IPGR1, TIPG_IPGR2, TIPG_IPGT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Station address accepted by receive address slot 0.
    pub mac: [u8; 6],
    /// TCTL.CT: retransmit attempts before giving up on a collision.
    pub collision_threshold: u32,
    /// TCTL.COLD: collision distance in byte times (full duplex: 0x40).
    pub collision_distance: u32,
    /// TIPG.IPGT
    pub ipg_transmit_time: u32,
    /// TIPG.IPGR1
    pub ipg_receive_time1: u32,
    /// TIPG.IPGR2
    pub ipg_receive_time2: u32,
}

impl Default for Config {
    /// QEMU's default e1000 MAC and the 82540EM manual's recommended
    /// full-duplex timings.
    fn default() -> Self {
        Self {
            mac: [0x52, 0x54, 0x00, 0x12, 0x34, 0x56],
            collision_threshold: 0x10,
            collision_distance: 0x40,
            ipg_transmit_time: 10,
            ipg_receive_time1: 8,
            ipg_receive_time2: 6,
        }
    }
}

impl Config {
    /// TCTL value: enabled, short packets padded, CT/COLD packed in.
    pub fn tctl(&self) -> u32 {
        (Tctl::EN | Tctl::PSP).bits()
            | masked_value(Tctl::CT.bits(), self.collision_threshold)
            | masked_value(Tctl::COLD.bits(), self.collision_distance)
    }

    pub fn tipg(&self) -> u32 {
        masked_value(TIPG_IPGT, self.ipg_transmit_time)
            | masked_value(TIPG_IPGR1, self.ipg_receive_time1)
            | masked_value(TIPG_IPGR2, self.ipg_receive_time2)
    }

    /// RCTL value: enabled, broadcast accepted, CRC stripped, 2 KiB buffers.
    pub fn rctl(&self) -> u32 {
        (Rctl::EN | Rctl::BAM | Rctl::SECRC | Rctl::BSIZE_2048).bits()
    }

    /// (RAL, RAH) for `mac`, with the address-valid bit set.
    pub fn receive_address(&self) -> (u32, u32) {
        let m = self.mac;
        let low = u32::from_le_bytes([m[0], m[1], m[2], m[3]]);
        let high = u16::from_le_bytes([m[4], m[5]]) as u32 | RAH_AV;
        (low, high)
    }
}
