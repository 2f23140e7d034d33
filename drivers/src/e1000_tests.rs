//! Tests for the e1000 driver's PCI identity matching and descriptor layout.
//!
//! The TX/RX ring algorithms themselves (`Ring`, `PendingQueue`,
//! `ControllerStateCell`) are covered by `net::nic_ring_tests`; these tests
//! only cover what is specific to [`crate::e1000`]: which PCI devices it
//! claims, and that its descriptor structs are bit-exact with the hardware
//! layout the datasheet specifies.

use slopos_lib::testing::TestResult;
use slopos_lib::{assert_eq_test, assert_test, pass};

use crate::e1000::regs::{ICR_LSC, ICR_RXDMT0, ICR_RXO, ICR_RXT0, ICR_TXDW, IMS_ENABLED};
use crate::pci_defs::PciDeviceInfo;

// =============================================================================
// PCI identity matching
// =============================================================================

fn probe_info(vendor_id: u16, device_id: u16) -> PciDeviceInfo {
    PciDeviceInfo {
        vendor_id,
        device_id,
        ..PciDeviceInfo::zeroed()
    }
}

pub fn test_match_accepts_known_intel_device_ids() -> TestResult {
    for device_id in [0x100E, 0x100F, 0x1004, 0x1026] {
        let info = probe_info(0x8086, device_id);
        assert_test!(
            crate::e1000::e1000_probe_matches_for_test(&info),
            "e1000 should claim Intel device 0x{:04x}",
            device_id
        );
    }
    pass!()
}

pub fn test_match_rejects_wrong_vendor() -> TestResult {
    // A Realtek device ID that happens to collide with nothing we claim.
    let info = probe_info(0x10EC, 0x100E);
    assert_test!(
        !crate::e1000::e1000_probe_matches_for_test(&info),
        "e1000 must not claim non-Intel vendor IDs even if the device id matches"
    );
    pass!()
}

pub fn test_match_rejects_unsupported_intel_device() -> TestResult {
    // A real Intel vendor ID paired with an unrelated (e.g. i219) device id.
    let info = probe_info(0x8086, 0x15B8);
    assert_test!(
        !crate::e1000::e1000_probe_matches_for_test(&info),
        "e1000 must not claim Intel device ids it has no register map for"
    );
    pass!()
}

// =============================================================================
// Interrupt cause bits
// =============================================================================

pub fn test_ims_enabled_covers_the_bits_the_driver_dispatches_on() -> TestResult {
    // bottom_half()/e1000_irq_handler only make sense if every bit they
    // switch on is actually unmasked.
    assert_eq_test!(IMS_ENABLED & ICR_TXDW, ICR_TXDW);
    assert_eq_test!(IMS_ENABLED & ICR_LSC, ICR_LSC);
    assert_eq_test!(IMS_ENABLED & ICR_RXDMT0, ICR_RXDMT0);
    assert_eq_test!(IMS_ENABLED & ICR_RXO, ICR_RXO);
    assert_eq_test!(IMS_ENABLED & ICR_RXT0, ICR_RXT0);
    pass!()
}

// =============================================================================
// Descriptor layout
// =============================================================================

pub fn test_descriptor_size_matches_hardware_layout() -> TestResult {
    // The 8254x legacy TX/RX descriptors are both 16 bytes; a single 4 KiB
    // page must hold exactly 256 of them for `program_rx_ring`/
    // `program_tx_ring`'s `RDLEN`/`TDLEN` math to line up with the page the
    // ring actually occupies.
    assert_eq_test!(crate::e1000::descriptor_size_for_test(), 16);
    pass!()
}

// =============================================================================
// Test suite registration
// =============================================================================

slopos_lib::define_test_suite!(
    e1000,
    [
        test_match_accepts_known_intel_device_ids,
        test_match_rejects_wrong_vendor,
        test_match_rejects_unsupported_intel_device,
        test_ims_enabled_covers_the_bits_the_driver_dispatches_on,
        test_descriptor_size_matches_hardware_layout,
    ]
);
