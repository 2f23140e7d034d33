#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod apic;
pub mod apic_timer_tests;
pub mod e1000;
pub mod e1000_tests;
pub mod ecam_tests;
pub mod fate;
pub mod hpet;
pub mod hpet_tests;
pub mod input_event;
pub mod interrupt_test;
pub mod ioapic;
pub mod ioapic_defs;
pub mod ioapic_tests;
pub mod irq;
pub mod loopback_tests;
pub mod msi;
pub mod msix;
pub mod msix_tests;
pub mod net;
pub mod net_types_tests;
pub mod netdev_tests;
pub mod netstack_tests;
pub mod packetbuf_tests;
pub mod pci;
pub mod pci_cap_tests;
pub mod pci_defs;
pub mod pic;
pub mod pit;
pub mod pit_tests;
pub mod ps2;
pub mod random;
pub mod route_tests;
pub mod serial;
pub mod syscall_services_init;
pub mod tty;
pub mod virtio;
pub mod virtio_blk;
pub mod xe;

pub use ps2::keyboard;
pub use ps2::mouse;
