//! Generic descriptor-ring and controller-state machinery shared by NIC drivers.
//!
//! Grounded in [`super::napi::NapiContext`] for the interrupt-scheduling half
//! and in `virtio/queue.rs`'s `Virtqueue` for the descriptor-ring shape, but
//! reworked for a device (e1000-class) that owns a flat array of hardware
//! descriptors rather than a split avail/used VirtIO ring.

extern crate alloc;

use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicU8, Ordering};

use super::types::NetError;

/// A fixed-capacity descriptor ring of `N` hardware descriptors, each of
/// which owns at most one in-flight buffer of type `T`.
///
/// `T` is the pool-owned buffer type the device attaches to each hardware
/// descriptor — for `e1000`-class drivers this is
/// [`super::bufpool::PacketBuffer`], the DMA-capable buffer the ring's
/// descriptor physical address points into, matching spec.md's
/// `descriptor_index -> owning PacketBuffer` `ownerMap`.
///
/// `N - 1` slots are usable at any time — the classic one-slot-open
/// convention that disambiguates full from empty without a separate count.
pub struct Ring<T, const N: usize> {
    /// Next descriptor index the producer will write into.
    use_idx: usize,
    /// Next descriptor index the consumer will reclaim from.
    clean_idx: usize,
    /// Buffer backing each descriptor slot, `None` when the slot is free.
    owner: [Option<T>; N],
}

impl<T, const N: usize> Ring<T, N> {
    pub const fn new() -> Self {
        Self {
            use_idx: 0,
            clean_idx: 0,
            owner: [const { None }; N],
        }
    }

    /// Usable descriptor slots (`N - 1`).
    #[inline]
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Descriptors currently in flight (posted to hardware, not yet reclaimed).
    #[inline]
    pub fn len(&self) -> usize {
        (self.use_idx + N - self.clean_idx) % N
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.use_idx == self.clean_idx
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Current producer index, for writing the hardware descriptor at this slot.
    #[inline]
    pub fn use_idx(&self) -> usize {
        self.use_idx
    }

    /// Current consumer index, for reading the hardware descriptor at this slot.
    #[inline]
    pub fn clean_idx(&self) -> usize {
        self.clean_idx
    }

    /// Post `buf` into the next free slot. Fails with `NoBufferSpace` if the
    /// ring is full. Returns the slot index the caller must program into the
    /// matching hardware descriptor.
    pub fn post(&mut self, buf: T) -> Result<usize, NetError> {
        if self.is_full() {
            return Err(NetError::NoBufferSpace);
        }
        let idx = self.use_idx;
        self.owner[idx] = Some(buf);
        self.use_idx = (self.use_idx + 1) % N;
        Ok(idx)
    }

    /// Reclaim the oldest in-flight descriptor, returning its buffer.
    /// Returns `None` if the ring has nothing in flight.
    pub fn reclaim(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let idx = self.clean_idx;
        self.clean_idx = (self.clean_idx + 1) % N;
        self.owner[idx].take()
    }

    /// Borrow the buffer currently attached to descriptor `idx`, if any.
    #[inline]
    pub fn owner_at(&self, idx: usize) -> Option<&T> {
        self.owner[idx].as_ref()
    }

    /// Take the buffer attached to descriptor `idx` without advancing
    /// `clean_idx` — used by `reap_tx`, which walks an explicit
    /// `[Clean, HwClean)` range rather than relying on one-at-a-time
    /// `reclaim()`.
    #[inline]
    pub fn take_at(&mut self, idx: usize) -> Option<T> {
        self.owner[idx].take()
    }

    /// Advance `clean_idx` to `new_clean` (mod `N`), per a hardware-reported
    /// consumer index. Callers are responsible for having already drained
    /// `owner[Clean..new_clean)` via [`Ring::take_at`].
    #[inline]
    pub fn advance_clean_to(&mut self, new_clean: usize) {
        self.clean_idx = new_clean % N;
    }

    /// Advance `use_idx` to `new_use` (mod `N`), for drivers that post a
    /// batch of descriptors directly rather than one at a time via
    /// [`Ring::post`].
    #[inline]
    pub fn advance_use_to(&mut self, new_use: usize) {
        self.use_idx = new_use % N;
    }
}

/// Bounded software queue of packets waiting for a free TX descriptor.
///
/// Grounded on the `VecDeque<PacketBuf>` pattern already used by
/// `net::loopback`/`net::tcp_socket`, generalized to the pool buffer type
/// `T` a given ring attaches to descriptors (move-only, non-`Copy`, which
/// rules out [`slopos_lib::RingBuffer`] — it requires `T: Copy`).
pub struct PendingQueue<T> {
    queue: VecDeque<T>,
    bound: usize,
}

impl<T> PendingQueue<T> {
    pub fn new(bound: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            bound,
        }
    }

    /// Push a packet onto the back of the queue.
    ///
    /// Fails with `NoBufferSpace` once the queue holds `bound` packets —
    /// callers should drop the packet and count it against `tx_dropped`.
    pub fn push(&mut self, pkt: T) -> Result<(), NetError> {
        if self.queue.len() >= self.bound {
            return Err(NetError::NoBufferSpace);
        }
        self.queue.push_back(pkt);
        Ok(())
    }

    /// Push every element of `list` onto the back of the queue, in order,
    /// stopping (and reporting how many were accepted) if the bound is hit
    /// partway through — matches spec.md's "appends the incoming list to the
    /// pending queue" batch semantics for `send()`.
    pub fn push_all(&mut self, list: alloc::vec::Vec<T>) -> Result<usize, NetError> {
        let mut accepted = 0;
        for item in list {
            self.push(item)?;
            accepted += 1;
        }
        Ok(accepted)
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn bound(&self) -> usize {
        self.bound
    }
}

/// Lifecycle state of a NIC controller, tracked so interrupt handlers and
/// control-plane calls (`set_up`/`set_down`) can refuse to touch hardware
/// that is not yet configured, or that has faulted.
///
/// `Running -> StoppedOnError` is the degraded path: a bottom-half reporting
/// a fatal hardware condition (e.g. a TX/RX descriptor write-back error that
/// persists across a retry) drops the controller here instead of panicking;
/// the driver stays registered but refuses further TX/RX until the link is
/// reset back through `ResetDone`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ControllerState {
    /// Not yet probed/reset.
    Off = 0,
    /// Hardware reset completed; registers not yet programmed.
    ResetDone = 1,
    /// Rings and interrupts programmed; link not yet enabled.
    Configured = 2,
    /// TX/RX enabled in hardware; `set_up()` has not yet been called.
    Enabled = 3,
    /// Fully up — accepting `tx()` calls and delivering RX traffic.
    Running = 4,
    /// A fatal hardware error was observed; TX/RX refused until reset.
    StoppedOnError = 5,
}

impl ControllerState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Off,
            1 => Self::ResetDone,
            2 => Self::Configured,
            3 => Self::Enabled,
            4 => Self::Running,
            _ => Self::StoppedOnError,
        }
    }
}

/// Atomic holder for [`ControllerState`], read from interrupt context and
/// written from the control plane / bottom half without a lock.
pub struct ControllerStateCell(AtomicU8);

impl ControllerStateCell {
    pub const fn new(initial: ControllerState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    #[inline]
    pub fn load(&self) -> ControllerState {
        ControllerState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, state: ControllerState) {
        self.0.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.load() == ControllerState::Running
    }
}

/// Per-device tunables, read once at probe time (or adjusted via a control
/// call) and stored behind the driver's own config lock.
#[derive(Clone, Copy, Debug)]
pub struct NicConfig {
    /// Number of TX descriptors (`Ring<N>` capacity is `tx_ring_size - 1`).
    pub tx_ring_size: usize,
    /// Number of RX descriptors.
    pub rx_ring_size: usize,
    /// Maximum packets allowed to sit in the software pending-TX queue.
    pub pending_bound: usize,
    /// If `true`, a full pending queue drops the newest packet instead of
    /// returning `NoBufferSpace` to the caller (best-effort send semantics).
    pub drop_override: bool,
    /// Milliseconds a blocking send will wait for ring space before giving up.
    pub send_timeout_ms: u32,
}

impl NicConfig {
    /// Defaults matching a typical gigabit NIC: 256-entry rings, a pending
    /// queue twice the TX ring depth, no drop override, 100ms send timeout.
    pub const fn default_for(tx_ring_size: usize, rx_ring_size: usize) -> Self {
        Self {
            tx_ring_size,
            rx_ring_size,
            pending_bound: tx_ring_size * 2,
            drop_override: false,
            send_timeout_ms: 100,
        }
    }
}
