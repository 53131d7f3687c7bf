/// Network glue: exposes an attached e1000 to smoltcp.
///
///   e1000 driver (raw Ethernet frames)
///       ↓ ↑
///   E1000Device (implements smoltcp::phy::Device)
///       ↓ ↑
///   smoltcp Interface (ARP, IP, TCP), owned by the caller
mod device;


pub use device::E1000Device;
