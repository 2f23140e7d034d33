//! Variable-size, alignment- and physical-address-constrained packet buffer pool.
//!
//! Distinct from [`super::pool::PacketPool`], which hands out fixed-size
//! 2048-byte slots from a lock-free Treiber stack for the common fast path.
//! This pool exists for callers that need buffers sized, aligned, and
//! physically bounded to a specific link's DMA requirements — e.g. a ring
//! descriptor that must fit a PHY's max scatter-gather segment size and stay
//! below a 32-bit DMA address ceiling. A single [`IrqMutex`]-protected
//! free-list does a first-fit scan; this is not a hot per-packet allocator,
//! it backs descriptor rings which are replenished in bulk, not per frame.

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;

use slopos_abi::addr::{PhysAddr, VirtAddr};
use slopos_lib::{IrqMutex, align_up_usize, klog_debug, klog_trace, klog_warn};
use slopos_mm::page_alloc::OwnedPageFrame;

use super::types::NetError;

bitflags::bitflags! {
    /// Allocation-time flags for [`PacketBufferPool::allocate`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PacketBufferFlags: u32 {
        /// Caller will hand this buffer to hardware DMA and needs a physically
        /// contiguous, pinned backing allocation.
        const DMA_CAPABLE = 1 << 0;
        /// Zero the full capacity (not just the header/footer padding) before
        /// returning the buffer.
        const ZERO_FULL = 1 << 1;
    }
}

/// Per-link constraints a [`PacketBufferPool::allocate`] call must honor.
///
/// Read once at driver probe time and stored by value — never mutated after
/// construction, so no interior mutability is needed here.
#[derive(Clone, Copy, Debug)]
pub struct LinkProperties {
    /// Floor `allocate()` raises the total buffer length to, zero-padded
    /// past the payload, so the link never sees a frame shorter than this.
    pub min_packet_size: usize,
    /// Bytes to reserve ahead of the payload for headers the driver prepends.
    pub header_size: usize,
    /// Bytes to reserve after the payload for trailers (e.g. hardware CRC pad).
    pub footer_size: usize,
    /// Power-of-two alignment the total buffer length must round up to.
    pub tx_alignment: usize,
    /// Highest physical address the link's DMA engine can address.
    pub max_phys_addr: PhysAddr,
}

impl LinkProperties {
    pub const fn new(
        min_packet_size: usize,
        header_size: usize,
        footer_size: usize,
        tx_alignment: usize,
        max_phys_addr: PhysAddr,
    ) -> Self {
        Self {
            min_packet_size,
            header_size,
            footer_size,
            tx_alignment,
            max_phys_addr,
        }
    }
}

/// Backing storage for a [`PacketBuffer`].
///
/// `Pinned` buffers are built from one or more [`OwnedPageFrame`]s — stable
/// physical addresses the hardware can DMA into. `Paged` buffers are a plain
/// heap `Vec`, used when no `LinkProperties` were supplied (no DMA guarantee
/// requested).
enum Backing {
    Pinned(Box<[OwnedPageFrame]>),
    Paged(Vec<u8>),
}

/// A pool-owned packet buffer honoring a link's size/alignment/physical
/// address constraints.
///
/// Unlike [`super::packetbuf::PacketBuf`] (the fixed-slot, fast-path buffer
/// exchanged with the protocol stack), `PacketBuffer` is sized per-call and
/// is meant to back descriptor-ring DMA targets. It is move-only: dropping
/// one without returning it through [`PacketBufferPool::free`] simply frees
/// the backing allocation, it does not return to the pool's free-list.
pub struct PacketBuffer {
    backing: Backing,
    virt: VirtAddr,
    phys: Option<PhysAddr>,
    capacity: usize,
    data_offset: u16,
    footer_offset: u16,
    flags: PacketBufferFlags,
}

impl PacketBuffer {
    #[inline]
    pub fn virt_addr(&self) -> VirtAddr {
        self.virt
    }

    #[inline]
    pub fn phys_addr(&self) -> Option<PhysAddr> {
        self.phys
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn data_offset(&self) -> u16 {
        self.data_offset
    }

    #[inline]
    pub fn footer_offset(&self) -> u16 {
        self.footer_offset
    }

    #[inline]
    pub fn flags(&self) -> PacketBufferFlags {
        self.flags
    }

    #[inline]
    pub fn payload_len(&self) -> usize {
        (self.footer_offset - self.data_offset) as usize
    }

    /// Mutable view over the payload region (between header and footer).
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let start = self.data_offset as usize;
        let end = self.footer_offset as usize;
        &mut self.as_mut_slice()[start..end]
    }

    /// Mutable view over the entire backing region.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.backing {
            Backing::Paged(v) => v.as_mut_slice(),
            Backing::Pinned(_) => {
                // SAFETY: `virt` points at `capacity` contiguous bytes we own
                // exclusively; no other reference to this buffer can exist
                // while we hold `&mut self`.
                unsafe { core::slice::from_raw_parts_mut(self.virt.as_mut_ptr::<u8>(), self.capacity) }
            }
        }
    }

    /// Shared view over the entire backing region.
    pub fn as_slice(&self) -> &[u8] {
        match &self.backing {
            Backing::Paged(v) => v.as_slice(),
            Backing::Pinned(_) => unsafe {
                core::slice::from_raw_parts(self.virt.as_ptr::<u8>(), self.capacity)
            },
        }
    }
}

/// A free-list entry: a buffer not currently owned by any caller.
struct FreeEntry {
    buf: PacketBuffer,
}

/// Process-wide, mutex-protected free-list of [`PacketBuffer`]s.
///
/// Grounded in the same discipline as [`super::netdev::NetDeviceRegistry`]:
/// a single [`IrqMutex`] around the free-list Vec, with the lock held only
/// across the scan/splice, never across the DMA allocation that happens on
/// a miss.
pub struct PacketBufferPool {
    free_list: IrqMutex<Vec<FreeEntry>>,
}

impl PacketBufferPool {
    pub const fn new() -> Self {
        Self {
            free_list: IrqMutex::new(Vec::new()),
        }
    }

    /// Allocate a buffer with at least `header + size + footer` bytes of
    /// capacity, raised to `link.min_packet_size` and then rounded up to
    /// `link.tx_alignment` if given.
    ///
    /// Scans the free-list for the first entry that fits (capacity, and if
    /// `link` is `Some`, physical alignment and `max_phys_addr`; if `link`
    /// is `None`, a paged entry); on a miss, the lock is dropped before a
    /// fresh allocation is made so the free-list is never held across page
    /// allocation. Padding between the requested payload and the computed
    /// total is zeroed.
    pub fn allocate(
        &self,
        header: usize,
        size: usize,
        footer: usize,
        link: Option<&LinkProperties>,
        flags: PacketBufferFlags,
    ) -> Result<PacketBuffer, NetError> {
        let needed = header + size + footer;
        let alignment = link.map(|l| l.tx_alignment).unwrap_or(1);
        let floor = needed.max(link.map(|l| l.min_packet_size).unwrap_or(0));
        let total = align_up_usize(floor, alignment);

        if let Some(found) = self.take_fitting(total, link) {
            let mut buf = found;
            Self::rebound(&mut buf, header, size, footer);
            Self::zero_padding(&mut buf, header, size, total, flags);
            klog_trace!(
                "bufpool: reused free-list entry cap={} needed={}",
                buf.capacity,
                total
            );
            return Ok(buf);
        }

        let mut buf = Self::allocate_fresh(total, link, flags)?;
        Self::rebound(&mut buf, header, size, footer);
        Self::zero_padding(&mut buf, header, size, total, flags);
        Ok(buf)
    }

    /// Gated on `link`: a link-bound request only considers pinned entries
    /// whose physical base satisfies `link`'s alignment and DMA ceiling; a
    /// link-absent request only considers paged (non-pinned) entries. A
    /// pinned buffer must never be handed out for a paged request either —
    /// it would just sit unused since nothing re-pins it — so the match is
    /// exact in both directions.
    fn take_fitting(&self, total: usize, link: Option<&LinkProperties>) -> Option<PacketBuffer> {
        let mut list = self.free_list.lock();
        let idx = list.iter().position(|e| {
            if e.buf.capacity < total {
                return false;
            }
            match link {
                Some(l) => {
                    let Some(phys) = e.buf.phys else {
                        return false;
                    };
                    if phys.as_u64() % l.tx_alignment as u64 != 0 {
                        return false;
                    }
                    if phys.as_u64() + e.buf.capacity as u64 > l.max_phys_addr.as_u64() {
                        return false;
                    }
                    true
                }
                None => e.buf.phys.is_none(),
            }
        })?;
        Some(list.swap_remove(idx).buf)
    }

    fn allocate_fresh(
        total: usize,
        link: Option<&LinkProperties>,
        flags: PacketBufferFlags,
    ) -> Result<PacketBuffer, NetError> {
        if let Some(link) = link {
            const PAGE_SIZE: usize = 4096;
            let pages_needed = total.div_ceil(PAGE_SIZE).max(1);
            let mut frames = Vec::with_capacity(pages_needed);
            for _ in 0..pages_needed {
                let frame = OwnedPageFrame::alloc_zeroed().ok_or(NetError::NoBufferSpace)?;
                frames.push(frame);
            }
            let virt = frames[0].virt_addr();
            let phys = frames[0].phys_addr();
            let capacity = pages_needed * PAGE_SIZE;
            if phys.as_u64() + capacity as u64 > link.max_phys_addr.as_u64() {
                klog_warn!(
                    "bufpool: fresh allocation phys={:#x} cap={} exceeds link ceiling {:#x}, failing",
                    phys.as_u64(),
                    capacity,
                    link.max_phys_addr.as_u64()
                );
                return Err(NetError::NoBufferSpace);
            }
            klog_debug!(
                "bufpool: fresh pinned allocation pages={} cap={} phys={:#x}",
                pages_needed,
                capacity,
                phys.as_u64()
            );
            Ok(PacketBuffer {
                backing: Backing::Pinned(frames.into_boxed_slice()),
                virt,
                phys: Some(phys),
                capacity,
                data_offset: 0,
                footer_offset: 0,
                flags,
            })
        } else {
            let mut data = alloc::vec![0u8; total];
            let virt = VirtAddr::from(data.as_mut_ptr());
            Ok(PacketBuffer {
                backing: Backing::Paged(data),
                virt,
                phys: None,
                capacity: total,
                data_offset: 0,
                footer_offset: 0,
                flags,
            })
        }
    }

    fn rebound(buf: &mut PacketBuffer, header: usize, size: usize, _footer: usize) {
        buf.data_offset = header as u16;
        buf.footer_offset = (header + size) as u16;
    }

    /// Zero the header region and everything from the end of the payload
    /// through `total` — the footer proper plus any padding added to reach
    /// the link's minimum packet size or alignment.
    fn zero_padding(
        buf: &mut PacketBuffer,
        header: usize,
        size: usize,
        total: usize,
        flags: PacketBufferFlags,
    ) {
        let cap = buf.capacity;
        let slice = buf.as_mut_slice();
        if flags.contains(PacketBufferFlags::ZERO_FULL) {
            slice.fill(0);
            return;
        }
        slice[..header].fill(0);
        let footer_start = header + size;
        let footer_end = total.min(cap);
        slice[footer_start..footer_end].fill(0);
    }

    /// Return a buffer to the free-list for reuse.
    ///
    /// Does not zero the buffer here — zeroing happens lazily on the next
    /// `allocate()` that reclaims this entry, since a caller may free a
    /// buffer whose payload has already been fully overwritten by the next
    /// user via `rebound`.
    pub fn free(&self, buf: PacketBuffer) {
        let mut list = self.free_list.lock();
        list.push(FreeEntry { buf });
    }

    /// Free every buffer in `list`, draining it.
    pub fn destroy_list(&self, list: &mut Vec<PacketBuffer>) {
        let mut free_list = self.free_list.lock();
        for buf in list.drain(..) {
            free_list.push(FreeEntry { buf });
        }
    }

    /// Number of buffers currently sitting on the free-list (diagnostic).
    pub fn free_count(&self) -> usize {
        self.free_list.lock().len()
    }
}

impl Default for PacketBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// The global DMA-aware packet buffer pool, distinct from [`super::pool::PACKET_POOL`].
pub static BUFFER_POOL: PacketBufferPool = PacketBufferPool::new();
