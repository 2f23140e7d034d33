//! Generic-netlink-style command family registry.
//!
//! Grounded in [`super::netdev::NetDeviceRegistry`] for the single-lock,
//! Box-in-a-map ownership discipline, and in [`super::tcp::parse_header`] for
//! the struct-over-byte-slice wire parsing style used by the [`wire`]
//! submodule. A "family" bundles a numeric id, a name, a set of command
//! callbacks, and a block of multicast group ids — the same shape Linux's
//! `genetlink` uses to let unrelated subsystems (routing, wireless, this
//! driver's own control plane) share one message-dispatch surface instead of
//! each growing a bespoke socket protocol.
//!
//! Entries are heap-boxed and held in a [`BTreeMap`] behind one
//! [`IrqRwLock`]: readers (`lookup_by_id`/`lookup_by_name`/`dispatch`) take
//! the read side and bump a per-family refcount before releasing it, so a
//! concurrent `unregister` can remove the map entry without blocking
//! in-flight dispatches. `unregister` then spins outside any lock until the
//! refcount drops back to the single reference it is holding, and only then
//! drops the `Box<Family>` — the same remove-then-drain-then-free shape as
//! an RCU grace period, implemented here with a plain atomic spin since the
//! kernel has no RCU machinery of its own.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use slopos_lib::{InitFlag, IrqMutex, IrqRwLock, klog_debug, klog_trace, klog_warn};

use super::bufpool::{BUFFER_POOL, PacketBuffer, PacketBufferFlags};
use super::types::NetError;

// =============================================================================
// Wire format: netlink header + generic-command header + TLV attributes
// =============================================================================

pub mod wire {
    use super::*;

    /// Length of the netlink message header (`len`, `type`, `flags`, `seq`, `pid`).
    pub const NL_HEADER_LEN: usize = 16;
    /// Length of the generic-command header (`cmd`, `version`, reserved).
    pub const GENL_HEADER_LEN: usize = 4;

    /// An incoming message, borrowed from the caller's buffer: the netlink
    /// `type` field carries the family id this message is addressed to, the
    /// generic header carries the command, and everything after that is a
    /// run of 4-byte-aligned TLV attributes.
    pub struct GenlMessage<'a> {
        family_id: u16,
        seq: u32,
        pid: u32,
        cmd: u8,
        version: u8,
        attrs: &'a [u8],
    }

    impl<'a> GenlMessage<'a> {
        /// Parse `buf` as a netlink + generic-command message. Returns `None`
        /// if `buf` is shorter than both headers or its `len` field claims
        /// more bytes than `buf` actually holds.
        pub fn parse(buf: &'a [u8]) -> Option<Self> {
            if buf.len() < NL_HEADER_LEN + GENL_HEADER_LEN {
                return None;
            }
            let len = u32::from_ne_bytes(buf[0..4].try_into().ok()?) as usize;
            if len > buf.len() {
                return None;
            }
            let family_id = u16::from_ne_bytes(buf[4..6].try_into().ok()?);
            let seq = u32::from_ne_bytes(buf[8..12].try_into().ok()?);
            let pid = u32::from_ne_bytes(buf[12..16].try_into().ok()?);
            let cmd = buf[16];
            let version = buf[17];
            let attrs_end = len.max(NL_HEADER_LEN + GENL_HEADER_LEN);
            let attrs = &buf[NL_HEADER_LEN + GENL_HEADER_LEN..attrs_end];
            Some(Self {
                family_id,
                seq,
                pid,
                cmd,
                version,
                attrs,
            })
        }

        #[inline]
        pub fn family_id(&self) -> u16 {
            self.family_id
        }

        #[inline]
        pub fn cmd(&self) -> u8 {
            self.cmd
        }

        #[inline]
        pub fn version(&self) -> u8 {
            self.version
        }

        #[inline]
        pub fn seq(&self) -> u32 {
            self.seq
        }

        #[inline]
        pub fn pid(&self) -> u32 {
            self.pid
        }

        #[inline]
        pub fn attrs(&self) -> &'a [u8] {
            self.attrs
        }
    }

    /// Walks a TLV attribute blob, yielding `(attr_type, value)` pairs.
    ///
    /// Each attribute is `[len: u16][type: u16][value...]`, padded with zero
    /// bytes up to the next 4-byte boundary; `len` counts the 4-byte header
    /// plus the unpadded value.
    pub struct AttrIter<'a> {
        data: &'a [u8],
        pos: usize,
    }

    impl<'a> AttrIter<'a> {
        pub fn new(data: &'a [u8]) -> Self {
            Self { data, pos: 0 }
        }
    }

    impl<'a> Iterator for AttrIter<'a> {
        type Item = (u16, &'a [u8]);

        fn next(&mut self) -> Option<Self::Item> {
            if self.pos + 4 > self.data.len() {
                return None;
            }
            let len = u16::from_ne_bytes([self.data[self.pos], self.data[self.pos + 1]]) as usize;
            let attr_type = u16::from_ne_bytes([self.data[self.pos + 2], self.data[self.pos + 3]]);
            if len < 4 || self.pos + len > self.data.len() {
                return None;
            }
            let value = &self.data[self.pos + 4..self.pos + len];
            let padded = slopos_lib::align_up_usize(len, 4).min(self.data.len() - self.pos);
            self.pos += padded;
            Some((attr_type, value))
        }
    }

    /// Find the first attribute of type `attr_type` in `attrs`.
    pub fn get_attribute(attrs: &[u8], attr_type: u16) -> Option<&[u8]> {
        AttrIter::new(attrs).find(|(t, _)| *t == attr_type).map(|(_, v)| v)
    }

    /// Append one TLV attribute (header + value + zero padding) to `buf`.
    pub fn put_attribute(buf: &mut Vec<u8>, attr_type: u16, value: &[u8]) {
        let len = (4 + value.len()) as u16;
        buf.extend_from_slice(&len.to_ne_bytes());
        buf.extend_from_slice(&attr_type.to_ne_bytes());
        buf.extend_from_slice(value);
        let pad = (4 - (buf.len() % 4)) % 4;
        buf.extend(core::iter::repeat(0u8).take(pad));
    }
}

// =============================================================================
// Control family constants (Linux genetlink's `nlctrl`, id 0x10)
// =============================================================================

/// Reserved id of the control family — every other family is dynamically
/// numbered above this, mirroring `GENL_ID_CTRL` in Linux's genetlink.
pub const GENL_ID_CTRL: u16 = 0x10;
/// Lowest id ever handed out by [`FamilyRegistry::register`]'s dynamic path.
pub const GENL_MIN_ID: u16 = GENL_ID_CTRL + 1;
pub const MAX_FAMILY_NAME_LEN: usize = 16;

pub const CTRL_CMD_NEWFAMILY: u8 = 1;
pub const CTRL_CMD_DELFAMILY: u8 = 2;
pub const CTRL_CMD_GETFAMILY: u8 = 3;
pub const CTRL_CMD_NEWMCAST_GRP: u8 = 7;
pub const CTRL_CMD_DELMCAST_GRP: u8 = 8;

pub const CTRL_ATTR_FAMILY_ID: u16 = 1;
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;
pub const CTRL_ATTR_MCAST_GROUPS: u16 = 7;
pub const CTRL_ATTR_MCAST_GRP_NAME: u16 = 1;
pub const CTRL_ATTR_MCAST_GRP_ID: u16 = 2;

/// Registry-wide tunables, read once at construction.
#[derive(Clone, Copy, Debug)]
pub struct FamilyRegistryConfig {
    pub max_family_name_len: usize,
    pub protocol_min_id: u16,
}

impl FamilyRegistryConfig {
    pub const DEFAULT: Self = Self {
        max_family_name_len: MAX_FAMILY_NAME_LEN,
        protocol_min_id: GENL_MIN_ID,
    };
}

/// A multicast group carved out of a family's id space.
#[derive(Clone, Debug)]
pub struct McastGroup {
    pub name: String,
    pub group_id: u32,
}

/// Transient lifecycle marker, observable without the registry writer lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FamilyState {
    Registered = 0,
    Unregistering = 1,
}

impl FamilyState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Registered,
            _ => Self::Unregistering,
        }
    }
}

/// Opaque port id identifying a dispatch's originating or target endpoint —
/// this registry has no socket type of its own, so callers supply whatever
/// they use to address one.
pub type GenlSocket = u32;

/// Parameters a dispatched command's callback receives alongside the raw
/// attribute bytes: the header fields the message carried, packaged once so
/// the callback does not have to re-parse them.
#[derive(Clone, Copy, Debug)]
pub struct DispatchParams {
    pub socket: GenlSocket,
    pub src_port: u32,
    pub dst_port: u32,
    pub seq: u32,
    pub family_id: u16,
    pub cmd: u8,
    pub version: u8,
}

/// A command callback: given the dispatch parameters and the message's raw
/// attribute blob, appends reply attributes (if any) to `reply` and returns
/// `Ok(())`, or a [`NetError`] if the request was malformed. Plain `fn`
/// pointers only — callbacks are registered once at family-registration time
/// and never need to close over per-call state.
pub type GenlCommandFn = fn(&DispatchParams, attrs: &[u8], reply: &mut Vec<u8>) -> Result<(), NetError>;

/// The netlink message-send routine `send_command` hands a framed buffer to.
/// This registry owns no socket transport of its own (see `init`'s doc
/// comment on why nothing is wired to `dispatch` at boot either) — whatever
/// layer does own one registers its delivery function here once, the same
/// way `register_idle_wakeup_callback` is a single global slot the claiming
/// driver fills in. Plain `fn` pointer, consistent with `GenlCommandFn`.
pub type GenlSendFn = fn(GenlSocket, PacketBuffer) -> Result<(), NetError>;

static SEND_HOOK: IrqMutex<Option<GenlSendFn>> = IrqMutex::new(None);

/// Register the transport's delivery function. Replaces whatever was set
/// before.
pub fn register_send_hook(f: GenlSendFn) {
    *SEND_HOOK.lock() = Some(f);
}

#[doc(hidden)]
pub fn clear_send_hook_for_test() {
    *SEND_HOOK.lock() = None;
}

/// A registered command family: a name, an id, a set of commands, and a
/// multicast group block.
pub struct Family {
    id: u16,
    name: String,
    commands: BTreeMap<u8, GenlCommandFn>,
    groups: Vec<McastGroup>,
    refcount: AtomicU32,
    state: AtomicU8,
}

impl Family {
    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn groups(&self) -> &[McastGroup] {
        &self.groups
    }

    #[inline]
    pub fn state(&self) -> FamilyState {
        FamilyState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn has_command(&self, cmd: u8) -> bool {
        self.commands.contains_key(&cmd)
    }
}

/// Properties supplied to [`FamilyRegistry::register`].
///
/// `id == 0` requests a dynamically allocated id; any other value must lie
/// at or above [`GENL_MIN_ID`] and not already be taken.
pub struct FamilyProperties<'a> {
    pub id: u16,
    pub name: &'a str,
    pub commands: Vec<(u8, GenlCommandFn)>,
    pub groups: Vec<&'a str>,
}

/// Owning handle returned by [`FamilyRegistry::register`]. Holds the
/// family's baseline reference — pass it to [`FamilyRegistry::unregister`]
/// when the family should be torn down.
#[derive(Clone, Copy, Debug)]
pub struct FamilyHandle {
    id: u16,
}

impl FamilyHandle {
    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }
}

/// A temporary, refcounted reference to a live [`Family`], obtained via
/// [`FamilyRegistry::lookup_by_id`] / [`lookup_by_name`]. Dropping it
/// releases the reference — callers must not hold one across a blocking
/// wait, since an `unregister` racing to completion spins on this count.
pub struct FamilyRef {
    ptr: *const Family,
}

// SAFETY: the pointee is a `Box<Family>` kept alive (not dropped) by
// `FamilyRegistry` for as long as any `FamilyRef`'s refcount contribution is
// outstanding; `Family`'s fields are either immutable after construction or
// themselves atomics, so shared access from any core is sound.
unsafe impl Send for FamilyRef {}
unsafe impl Sync for FamilyRef {}

impl core::ops::Deref for FamilyRef {
    type Target = Family;

    fn deref(&self) -> &Family {
        // SAFETY: see the `unsafe impl Send/Sync` note above.
        unsafe { &*self.ptr }
    }
}

impl Drop for FamilyRef {
    fn drop(&mut self) {
        let fam = unsafe { &*self.ptr };
        fam.refcount.fetch_sub(1, Ordering::Release);
    }
}

struct RegistryTable {
    by_id: BTreeMap<u16, Box<Family>>,
    by_name: BTreeMap<String, u16>,
    next_id: u16,
}

impl RegistryTable {
    const fn new(min_id: u16) -> Self {
        Self {
            by_id: BTreeMap::new(),
            by_name: BTreeMap::new(),
            next_id: min_id,
        }
    }
}

/// Registry of command families, each addressed by a 16-bit id dispatched
/// against incoming [`wire::GenlMessage`]s.
pub struct FamilyRegistry {
    table: IrqRwLock<RegistryTable>,
    config: FamilyRegistryConfig,
}

impl FamilyRegistry {
    pub const fn new() -> Self {
        Self {
            table: IrqRwLock::new(RegistryTable::new(FamilyRegistryConfig::DEFAULT.protocol_min_id)),
            config: FamilyRegistryConfig::DEFAULT,
        }
    }

    /// Register a new family. Fails with [`NetError::InvalidArgument`] if the
    /// name is empty, too long, no commands were supplied, or an explicit id
    /// undercuts the protocol minimum; fails with [`NetError::DuplicateEntry`]
    /// if the name or (explicit) id is already taken; fails with
    /// [`NetError::NoBufferSpace`] if the dynamic id space is exhausted.
    pub fn register(&self, props: FamilyProperties) -> Result<FamilyHandle, NetError> {
        if props.name.is_empty() || props.name.len() > self.config.max_family_name_len {
            return Err(NetError::InvalidArgument);
        }
        if props.commands.is_empty() {
            return Err(NetError::InvalidArgument);
        }
        if props.id != 0 && props.id < self.config.protocol_min_id {
            return Err(NetError::InvalidArgument);
        }

        let mut table = self.table.write();

        if table.by_name.contains_key(props.name) {
            return Err(NetError::DuplicateEntry);
        }

        let id = if props.id == 0 {
            Self::allocate_id_locked(&mut table, self.config.protocol_min_id)?
        } else {
            if table.by_id.contains_key(&props.id) {
                return Err(NetError::DuplicateEntry);
            }
            props.id
        };

        let mut next_group_id = 0u32;
        let groups = props
            .groups
            .iter()
            .map(|name| {
                let group_id = next_group_id;
                next_group_id += 1;
                McastGroup {
                    name: String::from(*name),
                    group_id,
                }
            })
            .collect();

        let mut commands = BTreeMap::new();
        for (cmd_id, callback) in props.commands {
            commands.insert(cmd_id, callback);
        }

        let family = Box::new(Family {
            id,
            name: String::from(props.name),
            commands,
            groups,
            refcount: AtomicU32::new(1),
            state: AtomicU8::new(FamilyState::Registered as u8),
        });

        table.by_name.insert(family.name.clone(), id);
        table.by_id.insert(id, family);

        klog_debug!("family_registry: registered '{}' id={:#x}", props.name, id);
        Ok(FamilyHandle { id })
    }

    fn allocate_id_locked(table: &mut RegistryTable, min_id: u16) -> Result<u16, NetError> {
        let span = (u16::MAX - min_id) as u32 + 1;
        let mut candidate = table.next_id.max(min_id);
        for _ in 0..span {
            if !table.by_id.contains_key(&candidate) {
                table.next_id = if candidate == u16::MAX { min_id } else { candidate + 1 };
                return Ok(candidate);
            }
            candidate = if candidate == u16::MAX { min_id } else { candidate + 1 };
        }
        Err(NetError::NoBufferSpace)
    }

    /// Remove `handle`'s family from both indexes, then block the calling
    /// context until every concurrently held [`FamilyRef`] has been dropped,
    /// and finally free the entry.
    ///
    /// Safe to call even if the family was already removed (a no-op).
    pub fn unregister(&self, handle: FamilyHandle) {
        let removed = {
            let mut table = self.table.write();
            let Some(fam) = table.by_id.remove(&handle.id) else {
                return;
            };
            table.by_name.remove(fam.name.as_str());
            fam.state.store(FamilyState::Unregistering as u8, Ordering::Release);
            fam
        };

        while removed.refcount.load(Ordering::Acquire) > 1 {
            core::hint::spin_loop();
        }

        klog_debug!("family_registry: unregistered '{}' id={:#x}", removed.name, removed.id);
        drop(removed);
    }

    /// Look up a family by id, bumping its refcount. The returned
    /// [`FamilyRef`] must be dropped before an in-flight `unregister` of the
    /// same family can complete.
    pub fn lookup_by_id(&self, id: u16) -> Option<FamilyRef> {
        let table = self.table.read();
        let fam = table.by_id.get(&id)?;
        fam.refcount.fetch_add(1, Ordering::AcqRel);
        Some(FamilyRef {
            ptr: &**fam as *const Family,
        })
    }

    /// Look up a family by name, bumping its refcount.
    pub fn lookup_by_name(&self, name: &str) -> Option<FamilyRef> {
        let table = self.table.read();
        let id = *table.by_name.get(name)?;
        let fam = table.by_id.get(&id)?;
        fam.refcount.fetch_add(1, Ordering::AcqRel);
        Some(FamilyRef {
            ptr: &**fam as *const Family,
        })
    }

    /// Parse `buf` as a [`wire::GenlMessage`], look up the family its netlink
    /// `type` field names, and invoke the matching command callback.
    ///
    /// Returns the reply attribute bytes (headerless — the caller's
    /// transport is responsible for wrapping them in a netlink + generic
    /// header before delivery). An unknown family returns
    /// [`NetError::OperationNotSupported`] so the peer can distinguish "no
    /// such family" from a malformed request.
    pub fn dispatch(
        &self,
        socket: GenlSocket,
        buf: &[u8],
        src_port: u32,
        dst_port: u32,
    ) -> Result<Vec<u8>, NetError> {
        let msg = wire::GenlMessage::parse(buf).ok_or(NetError::InvalidArgument)?;
        let fam = self.lookup_by_id(msg.family_id()).ok_or(NetError::OperationNotSupported)?;
        let Some(callback) = fam.commands.get(&msg.cmd()).copied() else {
            return Err(NetError::InvalidArgument);
        };

        let params = DispatchParams {
            socket,
            src_port,
            dst_port,
            seq: msg.seq(),
            family_id: msg.family_id(),
            cmd: msg.cmd(),
            version: msg.version(),
        };

        let mut reply = Vec::new();
        callback(&params, msg.attrs(), &mut reply)?;
        klog_trace!(
            "family_registry: dispatched family={:#x} cmd={} reply_len={}",
            params.family_id,
            params.cmd,
            reply.len()
        );
        Ok(reply)
    }

    /// Allocate a [`PacketBuffer`] from the shared pool sized to carry
    /// `payload`, copying it in. Used by command callbacks that need to hand
    /// a reply to a DMA-capable transport rather than a plain `Vec`.
    pub fn allocate_reply(payload: &[u8]) -> Result<PacketBuffer, NetError> {
        let mut buf = BUFFER_POOL.allocate(wire::NL_HEADER_LEN + wire::GENL_HEADER_LEN, payload.len(), 0, None, PacketBufferFlags::empty())?;
        buf.payload_mut().copy_from_slice(payload);
        Ok(buf)
    }

    /// Prepend the generic-command header into `buffer`'s reserved headroom
    /// and hand the framed buffer to the registered send hook.
    ///
    /// `buffer` must carry at least `wire::GENL_HEADER_LEN` bytes of
    /// `data_offset` to write the header into, else `InvalidArgument`. If no
    /// transport has called [`register_send_hook`], the buffer is dropped
    /// and `NetworkUnreachable` is returned rather than silently discarding
    /// it without telling the caller.
    pub fn send_command(
        &self,
        socket: GenlSocket,
        mut buffer: PacketBuffer,
        params: &DispatchParams,
    ) -> Result<(), NetError> {
        let offset = buffer.data_offset() as usize;
        if offset < wire::GENL_HEADER_LEN {
            return Err(NetError::InvalidArgument);
        }
        let header_start = offset - wire::GENL_HEADER_LEN;
        let header = [params.cmd, params.version, 0, 0];
        buffer.as_mut_slice()[header_start..header_start + wire::GENL_HEADER_LEN].copy_from_slice(&header);

        let hook = *SEND_HOOK.lock();
        match hook {
            Some(send) => {
                klog_trace!(
                    "family_registry: send_command family={:#x} cmd={} version={}",
                    params.family_id,
                    params.cmd,
                    params.version
                );
                send(socket, buffer)
            }
            None => {
                klog_debug!("family_registry: send_command dropped, no transport hook registered");
                Err(NetError::NetworkUnreachable)
            }
        }
    }
}

impl Default for FamilyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Control family ("nlctrl", id GENL_ID_CTRL)
// =============================================================================

fn ctrl_cmd_getfamily(_params: &DispatchParams, attrs: &[u8], reply: &mut Vec<u8>) -> Result<(), NetError> {
    let target = if let Some(id_bytes) = wire::get_attribute(attrs, CTRL_ATTR_FAMILY_ID) {
        let id = u16::from_ne_bytes(id_bytes.try_into().map_err(|_| NetError::InvalidArgument)?);
        FAMILY_REGISTRY.lookup_by_id(id)
    } else if let Some(name_bytes) = wire::get_attribute(attrs, CTRL_ATTR_FAMILY_NAME) {
        let name = core::str::from_utf8(name_bytes).map_err(|_| NetError::InvalidArgument)?;
        let name = name.trim_end_matches('\0');
        FAMILY_REGISTRY.lookup_by_name(name)
    } else {
        return Err(NetError::InvalidArgument);
    };

    let Some(fam) = target else {
        return Err(NetError::NotFound);
    };

    wire::put_attribute(reply, CTRL_ATTR_FAMILY_ID, &fam.id().to_ne_bytes());
    wire::put_attribute(reply, CTRL_ATTR_FAMILY_NAME, fam.name().as_bytes());

    let mut group_blob = Vec::new();
    for group in fam.groups() {
        wire::put_attribute(&mut group_blob, CTRL_ATTR_MCAST_GRP_ID, &group.group_id.to_ne_bytes());
        wire::put_attribute(&mut group_blob, CTRL_ATTR_MCAST_GRP_NAME, group.name.as_bytes());
    }
    if !group_blob.is_empty() {
        wire::put_attribute(reply, CTRL_ATTR_MCAST_GROUPS, &group_blob);
    }

    Ok(())
}

fn ctrl_cmd_newfamily_notify(_params: &DispatchParams, _attrs: &[u8], _reply: &mut Vec<u8>) -> Result<(), NetError> {
    klog_trace!("family_registry: nlctrl NEWFAMILY notification requested");
    Ok(())
}

fn ctrl_cmd_delfamily_notify(_params: &DispatchParams, _attrs: &[u8], _reply: &mut Vec<u8>) -> Result<(), NetError> {
    klog_trace!("family_registry: nlctrl DELFAMILY notification requested");
    Ok(())
}

fn ctrl_cmd_newmcast_grp(_params: &DispatchParams, _attrs: &[u8], _reply: &mut Vec<u8>) -> Result<(), NetError> {
    klog_trace!("family_registry: nlctrl NEWMCAST_GRP notification requested");
    Ok(())
}

fn ctrl_cmd_delmcast_grp(_params: &DispatchParams, _attrs: &[u8], _reply: &mut Vec<u8>) -> Result<(), NetError> {
    klog_trace!("family_registry: nlctrl DELMCAST_GRP notification requested");
    Ok(())
}

static CTRL_FAMILY_INIT: InitFlag = InitFlag::new();

/// The process-wide family registry, shared by every netlink-style consumer.
pub static FAMILY_REGISTRY: FamilyRegistry = FamilyRegistry::new();

/// Register the control family (`nlctrl`, id [`GENL_ID_CTRL`]) on the shared
/// [`FAMILY_REGISTRY`]. Idempotent — safe to call from multiple init paths.
///
/// Not wired into boot automatically: nothing in this tree yet delivers a
/// `GenlMessage` to `FAMILY_REGISTRY.dispatch` from a real socket (see
/// `net/mod.rs`'s module doc for why the socket ingress path stays
/// unfinished), so eagerly registering `nlctrl` at boot would add a family no
/// code can reach. Callers that do wire up dispatch should call this first.
pub fn init() {
    if !CTRL_FAMILY_INIT.claim() {
        return;
    }
    let props = FamilyProperties {
        id: GENL_ID_CTRL,
        name: "nlctrl",
        commands: alloc::vec![
            (CTRL_CMD_GETFAMILY, ctrl_cmd_getfamily as GenlCommandFn),
            (CTRL_CMD_NEWFAMILY, ctrl_cmd_newfamily_notify as GenlCommandFn),
            (CTRL_CMD_DELFAMILY, ctrl_cmd_delfamily_notify as GenlCommandFn),
            (CTRL_CMD_NEWMCAST_GRP, ctrl_cmd_newmcast_grp as GenlCommandFn),
            (CTRL_CMD_DELMCAST_GRP, ctrl_cmd_delmcast_grp as GenlCommandFn),
        ],
        groups: alloc::vec!["notify"],
    };
    match FAMILY_REGISTRY.register(props) {
        Ok(_) => klog_debug!("family_registry: nlctrl control family online"),
        Err(e) => klog_warn!("family_registry: failed to register nlctrl: {}", e),
    }
}
