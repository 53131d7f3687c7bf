/// Device drivers.
pub mod e1000;
pub mod pci;
