//! Intel 8254x (e1000) gigabit Ethernet driver.
//!
//! Owns a TX/RX descriptor ring pair per [`super::net::nic_ring`] and
//! registers itself with [`super::net::netdev::DEVICE_REGISTRY`], the same
//! way `virtio_net.rs` registers `VirtioNetDev`. Descriptors are backed by
//! [`PacketBuffer`]s drawn from [`super::net::bufpool::BUFFER_POOL`]; frames
//! handed to the protocol stack are copied into pool-owned
//! [`super::net::packetbuf::PacketBuf`]s at the `poll_rx`/`tx` boundary,
//! exactly as [`super::net::netdev::NetDevice`] specifies.
#![allow(static_mut_refs)]

pub mod regs;

use core::ffi::{c_int, c_void};
use core::ptr;
use core::sync::atomic::{Ordering, fence};

use alloc::boxed::Box;
use alloc::vec::Vec;

use slopos_abi::addr::PhysAddr;
use slopos_lib::kernel_services::driver_runtime::{
    DriverIrqHandler, IRQ_LINES, irq_is_masked, irq_register_handler, irq_set_route,
    register_idle_wakeup_callback,
};
use slopos_lib::{InitFlag, InterruptFrame, IrqMutex, klog_debug, klog_error, klog_info, klog_trace};
use slopos_mm::mmio::MmioRegion;

use crate::ioapic::regs::{
    IOAPIC_FLAG_DELIVERY_FIXED, IOAPIC_FLAG_DEST_PHYSICAL, IOAPIC_FLAG_MASK,
    IOAPIC_FLAG_POLARITY_LOW, IOAPIC_FLAG_TRIGGER_LEVEL,
};
use crate::net::bufpool::{BUFFER_POOL, LinkProperties, PacketBuffer, PacketBufferFlags};
use crate::net::napi::NapiContext;
use crate::net::netdev::{DEVICE_REGISTRY, NetDevice, NetDeviceFeatures, NetDeviceStats};
use crate::net::nic_ring::{ControllerState, ControllerStateCell, NicConfig, PendingQueue, Ring};
use crate::net::packetbuf::PacketBuf;
use crate::net::pool::PacketPool;
use crate::net::types::{MacAddr, NetError};
use crate::pci::{PciDeviceInfo, PciDriver, pci_config_read16, pci_config_write16, pci_register_driver};
use crate::pci_defs::{PCI_COMMAND_BUS_MASTER, PCI_COMMAND_MEMORY_SPACE, PCI_COMMAND_OFFSET};
use crate::{apic, ioapic};

use regs::*;

// =============================================================================
// PCI identity
// =============================================================================

const PCI_VENDOR_ID_INTEL: u16 = 0x8086;

/// Device IDs this driver claims. 0x100E is the 82540EM QEMU emulates;
/// the others are common real-hardware 8254x variants sharing this register map.
const SUPPORTED_DEVICE_IDS: [u16; 4] = [0x100E, 0x100F, 0x1004, 0x1026];

// =============================================================================
// Hardware descriptor rings
// =============================================================================

/// Number of descriptors per ring. One page (4096 bytes) holds exactly
/// 256 16-byte descriptors.
const RING_DESCRIPTORS: usize = 256;
const RX_BUFFER_SIZE: usize = 2048;

/// Per-poll work budget handed to the bottom half, mirroring `virtio_net.rs`'s
/// own `NAPI_BUDGET`.
const NAPI_BUDGET: u32 = 64;

/// A single descriptor-ring page, backing either the TX or RX hardware ring.
struct DescriptorPage {
    frame: slopos_mm::page_alloc::OwnedPageFrame,
}

// SAFETY: the page frame is kernel-owned, physically pinned, and accessed
// only while the device's ring lock is held (or from the top-half spinlock
// for status reads) — the same contract `virtio::queue::Virtqueue` documents.
unsafe impl Send for DescriptorPage {}

impl DescriptorPage {
    fn alloc() -> Option<Self> {
        let frame = slopos_mm::page_alloc::OwnedPageFrame::alloc_zeroed()?;
        Some(Self { frame })
    }

    #[inline]
    fn phys(&self) -> PhysAddr {
        self.frame.phys_addr()
    }

    #[inline]
    fn tx_desc_mut(&self, idx: usize) -> *mut TxDesc {
        (self.frame.as_mut_ptr::<TxDesc>()).wrapping_add(idx)
    }

    #[inline]
    fn rx_desc_mut(&self, idx: usize) -> *mut RxDesc {
        (self.frame.as_mut_ptr::<RxDesc>()).wrapping_add(idx)
    }
}

/// TX descriptor, bit-exact with the e1000 legacy transmit descriptor.
#[repr(C)]
#[derive(Clone, Copy)]
struct TxDesc {
    addr: u64,
    len: u16,
    cso: u8,
    cmd: u8,
    status: u8,
    css: u8,
    special: u16,
}

/// RX descriptor, bit-exact with the e1000 legacy receive descriptor.
#[repr(C)]
#[derive(Clone, Copy)]
struct RxDesc {
    addr: u64,
    len: u16,
    checksum: u16,
    status: u8,
    errors: u8,
    special: u16,
}

// =============================================================================
// Locked ring state
// =============================================================================

/// TX-side state protected by one `IrqMutex`, covering the pending queue,
/// the software ring indices, and the hardware doorbell.
struct TxState {
    ring: Ring<PacketBuffer, RING_DESCRIPTORS>,
    pending: PendingQueue<PacketBuffer>,
    desc_page: DescriptorPage,
}

/// RX-side state protected by its own `IrqMutex`, mirroring spec.md's split
/// between the TX lock and the RX lock.
struct RxState {
    ring: Ring<PacketBuffer, RING_DESCRIPTORS>,
    desc_page: DescriptorPage,
    clean: usize,
}

// =============================================================================
// E1000Dev
// =============================================================================

pub struct E1000Dev {
    mmio: MmioRegion,
    mac: MacAddr,
    tx: IrqMutex<TxState>,
    rx: IrqMutex<RxState>,
    /// Top-half/bottom-half handoff word: OR'd with ICR bits under
    /// `irq_bits` and swapped out by the bottom half. Never touched by
    /// anything but the spinlock-guarded top half and the NAPI bottom half.
    irq_bits: IrqMutex<u32>,
    /// Same `Idle`/`Scheduled`/`Polling` handoff `virtio_net.rs` drives with
    /// `NAPI_CONTEXT`. The top half only calls `schedule()`; the bottom half
    /// claims the run with `begin_poll()` and rearms with `complete()`.
    napi: NapiContext,
    state: ControllerStateCell,
    config: NicConfig,
    link: LinkProperties,
    stats: IrqMutex<NetDeviceStats>,
}

// SAFETY: all mutable state lives behind `IrqMutex`/atomics; the raw MMIO
// pointer is valid for the device's lifetime and MMIO reads/writes are
// volatile through `MmioRegion`.
unsafe impl Send for E1000Dev {}
unsafe impl Sync for E1000Dev {}

impl E1000Dev {
    fn read(&self, offset: usize) -> u32 {
        self.mmio.read_u32(offset)
    }

    fn write(&self, offset: usize, value: u32) {
        self.mmio.write_u32(offset, value);
    }

    /// Software reset, register programming, and ring setup. Leaves the
    /// controller in `Configured` — `set_up()` still has to enable TX/RX
    /// and the link.
    fn reset_and_configure(&self) -> bool {
        self.write(REG_CTRL, self.read(REG_CTRL) | CTRL_RST);
        // A handful of spins is enough for the 8254x to clear RST in QEMU;
        // real hardware datasheets call for no more than a few microseconds.
        for _ in 0..10_000 {
            if self.read(REG_CTRL) & CTRL_RST == 0 {
                break;
            }
            core::hint::spin_loop();
        }
        self.state.store(ControllerState::ResetDone);

        self.write(REG_CTRL, CTRL_SLU | CTRL_ASDE);
        self.read_mac_address();
        self.program_rx_ring();
        self.program_tx_ring();
        self.write(REG_IMS, IMS_ENABLED);
        self.state.store(ControllerState::Configured);
        true
    }

    fn read_mac_address(&self) -> MacAddr {
        let ral = self.read(REG_RAL);
        let rah = self.read(REG_RAH);
        if ral != 0 || (rah & 0xFFFF) != 0 {
            let bytes = [
                (ral & 0xFF) as u8,
                ((ral >> 8) & 0xFF) as u8,
                ((ral >> 16) & 0xFF) as u8,
                ((ral >> 24) & 0xFF) as u8,
                (rah & 0xFF) as u8,
                ((rah >> 8) & 0xFF) as u8,
            ];
            return MacAddr(bytes);
        }
        self.read_mac_from_eeprom()
    }

    fn read_mac_from_eeprom(&self) -> MacAddr {
        let mut bytes = [0u8; 6];
        for word in 0..3 {
            self.write(REG_EERD, EERD_START | (word << EERD_ADDR_SHIFT));
            let mut value = 0u32;
            for _ in 0..100_000 {
                value = self.read(REG_EERD);
                if value & EERD_DONE != 0 {
                    break;
                }
                core::hint::spin_loop();
            }
            let data = (value >> EERD_DATA_SHIFT) as u16;
            bytes[(word as usize) * 2] = (data & 0xFF) as u8;
            bytes[(word as usize) * 2 + 1] = (data >> 8) as u8;
        }
        MacAddr(bytes)
    }

    fn program_rx_ring(&self) {
        let rx = self.rx.lock();
        self.write(REG_RDBAL, (rx.desc_page.phys().as_u64() & 0xFFFF_FFFF) as u32);
        self.write(REG_RDBAH, (rx.desc_page.phys().as_u64() >> 32) as u32);
        self.write(REG_RDLEN, (RING_DESCRIPTORS * size_of_desc()) as u32);
        self.write(REG_RDH, 0);
        self.write(REG_RDT, 0);
        self.write(
            REG_RCTL,
            RCTL_EN | RCTL_SBP | RCTL_LBM_NONE | RCTL_BAM | RCTL_SECRC | RCTL_SZ_2048,
        );
    }

    fn program_tx_ring(&self) {
        let tx = self.tx.lock();
        self.write(REG_TDBAL, (tx.desc_page.phys().as_u64() & 0xFFFF_FFFF) as u32);
        self.write(REG_TDBAH, (tx.desc_page.phys().as_u64() >> 32) as u32);
        self.write(REG_TDLEN, (RING_DESCRIPTORS * size_of_desc()) as u32);
        self.write(REG_TDH, 0);
        self.write(REG_TDT, 0);
        self.write(
            REG_TCTL,
            TCTL_EN
                | TCTL_PSP
                | (TCTL_COLLISION_THRESHOLD << TCTL_CT_SHIFT)
                | (TCTL_COLLISION_DISTANCE << TCTL_COLD_SHIFT),
        );
    }

    /// Fill every free RX descriptor with a fresh pool buffer and post the
    /// batch as credit. Called once at `set_up()` to prime the ring.
    fn refill_rx(&self) {
        let mut rx = self.rx.lock();
        let mut posted = 0usize;
        while !rx.ring.is_full() {
            let Ok(buf) = BUFFER_POOL.allocate(0, RX_BUFFER_SIZE, 0, Some(&self.link), PacketBufferFlags::DMA_CAPABLE)
            else {
                break;
            };
            let Some(phys) = buf.phys_addr() else {
                BUFFER_POOL.free(buf);
                break;
            };
            let Ok(idx) = rx.ring.post(buf) else {
                break;
            };
            // SAFETY: idx is a free slot in this device's own page-frame-backed
            // descriptor array; no other context writes this slot concurrently
            // while the RX lock is held.
            unsafe {
                let desc = rx.desc_page.rx_desc_mut(idx);
                ptr::write_volatile(
                    desc,
                    RxDesc {
                        addr: phys.as_u64(),
                        len: 0,
                        checksum: 0,
                        status: 0,
                        errors: 0,
                        special: 0,
                    },
                );
            }
            posted += 1;
        }
        if posted > 0 {
            fence(Ordering::Release);
            let rt = rx.ring.use_idx().wrapping_sub(1) % RING_DESCRIPTORS;
            self.write(REG_RDT, rt as u32);
        }
    }

    /// `flushPending`, TX lock assumed held by the caller.
    fn flush_pending_locked(&self, tx: &mut TxState) {
        let mut posted = 0usize;
        while !tx.ring.is_full() {
            let Some(buf) = tx.pending.pop() else {
                break;
            };
            let idx = match tx.ring.post(buf) {
                Ok(idx) => idx,
                Err(_) => break,
            };
            let buf = tx.ring.owner_at(idx).expect("just posted");
            let Some(phys) = buf.phys_addr() else {
                klog_error!("e1000: TX buffer has no physical address, dropping");
                let dropped = tx.ring.take_at(idx);
                drop(dropped);
                continue;
            };
            let addr = phys.as_u64() + buf.data_offset() as u64;
            let len = (buf.footer_offset() - buf.data_offset()) as u16;
            // SAFETY: idx was just reserved via `post`; no concurrent writer.
            unsafe {
                ptr::write_volatile(
                    tx.desc_page.tx_desc_mut(idx),
                    TxDesc {
                        addr,
                        len,
                        cso: 0,
                        cmd: TXD_CMD_EOP | TXD_CMD_IFCS | TXD_CMD_RS,
                        status: 0,
                        css: 0,
                        special: 0,
                    },
                );
            }
            posted += 1;
        }
        if posted > 0 {
            fence(Ordering::Release);
            self.write(REG_TDT, tx.ring.use_idx() as u32);
        }
    }

    /// `reapTx`: reclaim descriptors the device has written back, returning
    /// their buffers to the pool, then attempt to drain more pending work.
    fn reap_tx(&self) {
        let mut tx = self.tx.lock();
        let mut reclaimed = 0usize;
        while !tx.ring.is_empty() {
            let idx = tx.ring.clean_idx();
            // SAFETY: idx is the oldest in-flight descriptor; the device only
            // advances its own consumer view forward, never rewrites behind it.
            let status = unsafe { ptr::read_volatile(tx.desc_page.tx_desc_mut(idx)) }.status;
            if status & TXD_STAT_DD == 0 {
                break;
            }
            if let Some(buf) = tx.ring.reclaim() {
                if status & (TXD_STAT_EC | TXD_STAT_LC) != 0 {
                    self.stats.lock().tx_errors += 1;
                }
                BUFFER_POOL.free(buf);
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            klog_trace!("e1000: reclaimed {} tx descriptors", reclaimed);
            self.flush_pending_locked(&mut tx);
        }
    }

    /// `reapRx`: walk the status ring, copy completed frames into
    /// `PacketBuf`s for the stack, repost fresh buffers, and credit the
    /// receive-free-list register once per batch.
    fn reap_rx(&self, budget: usize) -> Vec<PacketBuf> {
        let mut rx = self.rx.lock();
        let mut received = Vec::with_capacity(budget.min(32));
        let mut advanced = false;

        for _ in 0..budget {
            let idx = rx.clean;
            // SAFETY: idx is the oldest posted descriptor; read-only peek at
            // the status byte the device writes on completion.
            let desc = unsafe { ptr::read_volatile(rx.desc_page.rx_desc_mut(idx)) };
            if desc.status & RXD_STAT_DD == 0 {
                break;
            }

            let Some(mut buf) = rx.ring.take_at(idx) else {
                rx.clean = (rx.clean + 1) % RING_DESCRIPTORS;
                continue;
            };

            if desc.errors != 0 {
                self.stats.lock().rx_errors += 1;
            } else {
                let len = desc.len as usize;
                let data = &buf.as_slice()[..len.min(buf.capacity())];
                if let Some(pkt) = PacketBuf::from_raw_copy(data) {
                    received.push(pkt);
                } else {
                    self.stats.lock().rx_dropped += 1;
                }
            }

            // Re-post the same buffer for the next frame; the device will
            // overwrite its payload on the next DMA into this slot.
            let phys = buf.phys_addr();
            if let Some(phys) = phys
                && let Ok(new_idx) = rx.ring.post(buf)
            {
                debug_assert_eq!(new_idx, idx, "ring reuse must keep descriptor index stable");
                // SAFETY: idx was just freed by `take_at` above and re-owned
                // by `post`; no other writer touches it between the two calls.
                unsafe {
                    ptr::write_volatile(
                        rx.desc_page.rx_desc_mut(idx),
                        RxDesc {
                            addr: phys.as_u64(),
                            len: 0,
                            checksum: 0,
                            status: 0,
                            errors: 0,
                            special: 0,
                        },
                    );
                }
            }

            rx.clean = (rx.clean + 1) % RING_DESCRIPTORS;
            advanced = true;
        }

        if advanced {
            fence(Ordering::Release);
            let credit = (rx.clean + RING_DESCRIPTORS - 1) % RING_DESCRIPTORS;
            self.write(REG_RDT, credit as u32);
        }

        received
    }

    /// Bottom half: drains `irq_bits`, dispatches to `reap_rx`/`reap_tx`,
    /// handles link-change and fatal-error bits, then rearms the NAPI context.
    fn bottom_half(&self) {
        if !self.napi.begin_poll() {
            return;
        }

        let bits = {
            let mut guard = self.irq_bits.lock();
            core::mem::take(&mut *guard)
        };

        if bits & ICR_RXT0 != 0 || bits & ICR_RXDMT0 != 0 {
            let drained = self.reap_rx(self.napi.budget() as usize);
            if !drained.is_empty() {
                self.napi.add_processed(drained.len() as u32);
                let mut stats = self.stats.lock();
                for pkt in &drained {
                    stats.rx_packets += 1;
                    stats.rx_bytes += pkt.len() as u64;
                }
                drop(stats);
                // Packets are returned to the caller via `poll_rx`; the
                // bottom half itself only primes the ring, it does not
                // reach into the protocol stack directly (no ingress queue
                // exists for e1000 to push into outside of NAPI's own pull).
                for pkt in drained {
                    drop(pkt);
                }
            }
        }

        if bits & ICR_TXDW != 0 {
            self.reap_tx();
        }

        if bits & ICR_RXO != 0 {
            klog_debug!("e1000: RX overrun, refilling ring");
            self.refill_rx();
        }

        if bits & ICR_LSC != 0 {
            let status = self.read(REG_STATUS);
            let up = status & STATUS_LU != 0;
            klog_info!("e1000: link {}", if up { "up" } else { "down" });
        }

        self.napi.complete();
    }

    fn enable_bus_master(info: &PciDeviceInfo) {
        let cmd = pci_config_read16(info.bus, info.device, info.function, PCI_COMMAND_OFFSET as u8);
        let new_cmd = cmd | PCI_COMMAND_BUS_MASTER as u16 | PCI_COMMAND_MEMORY_SPACE as u16;
        if cmd != new_cmd {
            pci_config_write16(info.bus, info.device, info.function, PCI_COMMAND_OFFSET as u8, new_cmd);
        }
    }

    /// Generalized legacy-INTx IOAPIC routing, mirroring `irq.rs`'s
    /// `program_ioapic_route` for an arbitrary PCI-routed line rather than
    /// one of the four fixed legacy ISA lines.
    fn program_ioapic_route(irq_line: u8) {
        if irq_line as usize >= IRQ_LINES {
            klog_error!("e1000: irq line {} out of range", irq_line);
            return;
        }
        if !apic::is_enabled() || ioapic::is_ready() == 0 {
            klog_error!("e1000: APIC/IOAPIC unavailable during route programming");
            return;
        }

        let mut gsi = 0u32;
        let mut legacy_flags = 0u32;
        if ioapic::legacy_irq_info(irq_line, &mut gsi, &mut legacy_flags) != 0 {
            klog_error!("e1000: failed to translate irq line {}", irq_line);
            return;
        }

        let vector = slopos_lib::arch::idt::IRQ_BASE_VECTOR.wrapping_add(irq_line) as u8;
        let lapic_id = apic::get_id() as u8;
        let flags = IOAPIC_FLAG_DELIVERY_FIXED | IOAPIC_FLAG_DEST_PHYSICAL | legacy_flags | IOAPIC_FLAG_MASK;

        if ioapic::config_irq(gsi, vector, lapic_id, flags) != 0 {
            klog_error!("e1000: failed to program IOAPIC route for irq {}", irq_line);
            return;
        }

        irq_set_route(irq_line, gsi);
        let masked = irq_is_masked(irq_line);
        let polarity = if legacy_flags & IOAPIC_FLAG_POLARITY_LOW != 0 { "active-low" } else { "active-high" };
        let trigger = if legacy_flags & IOAPIC_FLAG_TRIGGER_LEVEL != 0 { "level" } else { "edge" };
        klog_info!(
            "e1000: IOAPIC route irq {} -> gsi {}, vector 0x{:x} ({}, {})",
            irq_line,
            gsi,
            vector,
            polarity,
            trigger
        );

        if masked {
            let _ = ioapic::mask_gsi(gsi);
        } else {
            let _ = ioapic::unmask_gsi(gsi);
        }
    }
}

const fn size_of_desc() -> usize {
    core::mem::size_of::<TxDesc>()
}

/// Exposes [`e1000_match`] and the descriptor size to `e1000_tests` without
/// making either part of the driver's public surface.
#[doc(hidden)]
pub fn e1000_probe_matches_for_test(info: &PciDeviceInfo) -> bool {
    e1000_match(info as *const PciDeviceInfo, ptr::null_mut())
}

#[doc(hidden)]
pub fn descriptor_size_for_test() -> usize {
    size_of_desc()
}

impl NetDevice for E1000Dev {
    fn tx(&self, pkt: PacketBuf) -> Result<(), NetError> {
        if !self.state.is_running() {
            return Err(NetError::NetworkUnreachable);
        }

        let Ok(mut buf) = BUFFER_POOL.allocate(0, pkt.len(), 0, Some(&self.link), PacketBufferFlags::DMA_CAPABLE) else {
            return Err(NetError::NoBufferSpace);
        };
        buf.payload_mut()[..pkt.len()].copy_from_slice(pkt.payload());
        drop(pkt);

        let mut tx = self.tx.lock();
        if tx.pending.len() >= self.config.pending_bound && !self.config.drop_override {
            BUFFER_POOL.free(buf);
            return Err(NetError::NoBufferSpace);
        }
        if tx.pending.push(buf).is_err() {
            return Err(NetError::NoBufferSpace);
        }
        self.flush_pending_locked(&mut tx);
        let mut stats = self.stats.lock();
        stats.tx_packets += 1;
        Ok(())
    }

    fn poll_rx(&self, budget: usize, _pool: &'static PacketPool) -> Vec<PacketBuf> {
        self.reap_rx(budget)
    }

    fn set_up(&self) {
        if self.state.load() != ControllerState::Configured
            && self.state.load() != ControllerState::StoppedOnError
        {
            return;
        }
        self.refill_rx();
        self.state.store(ControllerState::Enabled);
        self.state.store(ControllerState::Running);
        klog_info!("e1000: link up, controller running");
    }

    fn set_down(&self) {
        self.write(REG_IMS, 0);
        self.state.store(ControllerState::ResetDone);
    }

    fn mtu(&self) -> u16 {
        1500
    }

    fn mac(&self) -> MacAddr {
        self.mac
    }

    fn stats(&self) -> NetDeviceStats {
        *self.stats.lock()
    }

    fn features(&self) -> NetDeviceFeatures {
        NetDeviceFeatures::empty()
    }
}

// =============================================================================
// PCI probe / registration
// =============================================================================

static DEVICE_CLAIMED: InitFlag = InitFlag::new();

fn e1000_match(info: *const PciDeviceInfo, _context: *mut c_void) -> bool {
    if info.is_null() {
        return false;
    }
    let info = unsafe { &*info };
    info.vendor_id == PCI_VENDOR_ID_INTEL && SUPPORTED_DEVICE_IDS.contains(&info.device_id)
}

extern "C" fn e1000_irq_handler(_irq: u8, _frame: *mut InterruptFrame, ctx: *mut c_void) {
    let dev = ctx as *const E1000Dev;
    if dev.is_null() {
        return;
    }
    // SAFETY: `ctx` is the `&'static E1000Dev` registered at probe time,
    // valid for the life of the driver.
    let dev = unsafe { &*dev };

    let cause = dev.read(REG_ICR);
    if cause & IMS_ENABLED == 0 {
        return;
    }

    {
        let mut bits = dev.irq_bits.lock();
        *bits |= cause;
    }
    dev.write(REG_ICR, cause);

    if dev.napi.schedule() {
        register_idle_wakeup_callback(Some(e1000_idle_wakeup));
    }
}

/// The single e1000 instance this driver supports. Matches the
/// `virtio_blk`/`virtio_net` convention of one static device behind an
/// `InitFlag`-guarded probe — multiple physical e1000 NICs are out of scope.
static mut E1000_INSTANCE: Option<&'static E1000Dev> = None;

fn e1000_idle_wakeup() -> c_int {
    // SAFETY: set exactly once, before any interrupt can fire, by `e1000_probe`.
    if let Some(dev) = unsafe { E1000_INSTANCE } {
        dev.bottom_half();
    }
    0
}

fn e1000_probe(info: *const PciDeviceInfo, _context: *mut c_void) -> c_int {
    if !DEVICE_CLAIMED.claim() {
        klog_debug!("e1000: already claimed");
        return -1;
    }

    let info = unsafe { &*info };
    klog_info!(
        "e1000: probing {:04x}:{:04x} at {:02x}:{:02x}.{}",
        info.vendor_id,
        info.device_id,
        info.bus,
        info.device,
        info.function
    );

    E1000Dev::enable_bus_master(info);

    let bar0 = info.bars[0];
    if bar0.is_io != 0 || bar0.size == 0 {
        klog_info!("e1000: BAR0 is not a usable memory region");
        DEVICE_CLAIMED.reset();
        return -1;
    }

    let Some(mmio) = MmioRegion::map(PhysAddr::new(bar0.base), bar0.size as usize) else {
        klog_info!("e1000: failed to map BAR0");
        DEVICE_CLAIMED.reset();
        return -1;
    };

    let Some(tx_page) = DescriptorPage::alloc() else {
        klog_info!("e1000: failed to allocate TX ring page");
        DEVICE_CLAIMED.reset();
        return -1;
    };
    let Some(rx_page) = DescriptorPage::alloc() else {
        klog_info!("e1000: failed to allocate RX ring page");
        DEVICE_CLAIMED.reset();
        return -1;
    };

    let link = LinkProperties::new(60, 0, 0, 16, PhysAddr::new(0xFFFF_FFFF));

    let mut boxed_dev = Box::new(E1000Dev {
        mmio,
        mac: MacAddr::ZERO,
        tx: IrqMutex::new(TxState {
            ring: Ring::new(),
            pending: PendingQueue::new(NicConfig::default_for(RING_DESCRIPTORS, RING_DESCRIPTORS).pending_bound),
            desc_page: tx_page,
        }),
        rx: IrqMutex::new(RxState {
            ring: Ring::new(),
            desc_page: rx_page,
            clean: 0,
        }),
        irq_bits: IrqMutex::new(0),
        napi: NapiContext::new(NAPI_BUDGET),
        state: ControllerStateCell::new(ControllerState::Off),
        config: NicConfig::default_for(RING_DESCRIPTORS, RING_DESCRIPTORS),
        link,
        stats: IrqMutex::new(NetDeviceStats::new()),
    });

    if !boxed_dev.reset_and_configure() {
        klog_info!("e1000: reset/configure failed");
        DEVICE_CLAIMED.reset();
        return -1;
    }
    boxed_dev.mac = boxed_dev.read_mac_address();

    // Extract the stable heap pointer BEFORE moving the Box into the
    // registry, the same discipline `NetDeviceRegistry::register` itself
    // uses: the Box's heap allocation does not move when the Box does.
    let dev_ptr: *const E1000Dev = &*boxed_dev;

    E1000Dev::program_ioapic_route(info.irq_line);
    let _ = irq_register_handler(
        info.irq_line,
        Some(e1000_irq_handler as DriverIrqHandler),
        dev_ptr as *mut c_void,
        c"e1000".as_ptr(),
    );

    // SAFETY: single-writer, performed once during probe before any
    // interrupt can be routed to `e1000_irq_handler`. The pointee stays
    // alive for the process lifetime — this driver is never unregistered.
    unsafe {
        E1000_INSTANCE = Some(&*dev_ptr);
    }

    let Some(handle) = DEVICE_REGISTRY.register(boxed_dev) else {
        klog_info!("e1000: device registry full");
        DEVICE_CLAIMED.reset();
        return -1;
    };

    // SAFETY: `dev_ptr` is the same stable allocation the registry now owns.
    let dev = unsafe { &*dev_ptr };
    dev.set_up();
    klog_info!("e1000: registered as dev {}, mac {}", handle.index(), dev.mac());

    0
}

static E1000_DRIVER: PciDriver = PciDriver {
    name: b"e1000\0".as_ptr(),
    match_fn: Some(e1000_match),
    probe: Some(e1000_probe),
    context: ptr::null_mut(),
};

pub fn e1000_register_driver() {
    if pci_register_driver(&E1000_DRIVER) != 0 {
        klog_info!("e1000: driver registration failed");
    }
}
