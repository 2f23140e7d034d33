//! Tests for [`super::family_registry`].

use alloc::vec::Vec;

use slopos_lib::testing::TestResult;
use slopos_lib::{assert_eq_test, assert_test, fail, pass};

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use super::bufpool::{BUFFER_POOL, PacketBuffer, PacketBufferFlags};
use super::family_registry::{
    DispatchParams, FamilyProperties, FamilyRegistry, FamilyState, GENL_MIN_ID, clear_send_hook_for_test,
    register_send_hook, wire,
};
use super::types::NetError;

const CMD_ECHO: u8 = 1;
const ATTR_MESSAGE: u16 = 1;

fn test_params(cmd: u8, version: u8) -> DispatchParams {
    DispatchParams {
        socket: 1,
        src_port: 0,
        dst_port: 0,
        seq: 0,
        family_id: 0,
        cmd,
        version,
    }
}

fn cmd_echo(_params: &DispatchParams, attrs: &[u8], reply: &mut Vec<u8>) -> Result<(), NetError> {
    if let Some(msg) = wire::get_attribute(attrs, ATTR_MESSAGE) {
        wire::put_attribute(reply, ATTR_MESSAGE, msg);
    }
    Ok(())
}

fn build_message(family_id: u16, cmd: u8, attrs: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    let total = (wire::NL_HEADER_LEN + wire::GENL_HEADER_LEN + attrs.len()) as u32;
    buf.extend_from_slice(&total.to_ne_bytes());
    buf.extend_from_slice(&family_id.to_ne_bytes());
    buf.extend_from_slice(&0u16.to_ne_bytes()); // flags
    buf.extend_from_slice(&7u32.to_ne_bytes()); // seq
    buf.extend_from_slice(&42u32.to_ne_bytes()); // pid
    buf.push(cmd);
    buf.push(1); // version
    buf.extend_from_slice(&0u16.to_ne_bytes()); // reserved
    buf.extend_from_slice(attrs);
    buf
}

pub fn test_register_rejects_duplicate_name() -> TestResult {
    let registry = FamilyRegistry::new();
    let props_a = FamilyProperties {
        id: 0,
        name: "dup",
        commands: alloc::vec![(CMD_ECHO, cmd_echo as _)],
        groups: alloc::vec![],
    };
    let props_b = FamilyProperties {
        id: 0,
        name: "dup",
        commands: alloc::vec![(CMD_ECHO, cmd_echo as _)],
        groups: alloc::vec![],
    };
    assert_test!(registry.register(props_a).is_ok(), "first registration should succeed");
    match registry.register(props_b) {
        Err(NetError::DuplicateEntry) => pass!(),
        Ok(_) => fail!("second registration with the same name should have been rejected"),
        Err(e) => fail!("expected DuplicateEntry, got {}", e),
    }
}

pub fn test_register_assigns_dynamic_ids_above_minimum() -> TestResult {
    let registry = FamilyRegistry::new();
    let props = FamilyProperties {
        id: 0,
        name: "dyn-family",
        commands: alloc::vec![(CMD_ECHO, cmd_echo as _)],
        groups: alloc::vec![],
    };
    let Ok(handle) = registry.register(props) else {
        return fail!("register failed");
    };
    assert_test!(handle.id() >= GENL_MIN_ID, "dynamic id must be at or above the protocol minimum");
    pass!()
}

pub fn test_lookup_by_name_and_id_agree() -> TestResult {
    let registry = FamilyRegistry::new();
    let props = FamilyProperties {
        id: 0,
        name: "lookup-me",
        commands: alloc::vec![(CMD_ECHO, cmd_echo as _)],
        groups: alloc::vec![],
    };
    let Ok(handle) = registry.register(props) else {
        return fail!("register failed");
    };

    let Some(by_id) = registry.lookup_by_id(handle.id()) else {
        return fail!("lookup_by_id should find the registered family");
    };
    let Some(by_name) = registry.lookup_by_name("lookup-me") else {
        return fail!("lookup_by_name should find the registered family");
    };
    assert_eq_test!(by_id.id(), by_name.id());
    pass!()
}

pub fn test_unregister_removes_from_both_indexes() -> TestResult {
    let registry = FamilyRegistry::new();
    let props = FamilyProperties {
        id: 0,
        name: "ephemeral",
        commands: alloc::vec![(CMD_ECHO, cmd_echo as _)],
        groups: alloc::vec![],
    };
    let Ok(handle) = registry.register(props) else {
        return fail!("register failed");
    };
    registry.unregister(handle);
    assert_test!(registry.lookup_by_id(handle.id()).is_none(), "id index should no longer resolve");
    assert_test!(registry.lookup_by_name("ephemeral").is_none(), "name index should no longer resolve");
    pass!()
}

pub fn test_dispatch_routes_to_registered_command() -> TestResult {
    let registry = FamilyRegistry::new();
    let props = FamilyProperties {
        id: 0,
        name: "echo-fam",
        commands: alloc::vec![(CMD_ECHO, cmd_echo as _)],
        groups: alloc::vec![],
    };
    let Ok(handle) = registry.register(props) else {
        return fail!("register failed");
    };

    let mut attrs = Vec::new();
    wire::put_attribute(&mut attrs, ATTR_MESSAGE, b"hi");
    let msg = build_message(handle.id(), CMD_ECHO, &attrs);

    let reply = match registry.dispatch(1, &msg, 100, 200) {
        Ok(r) => r,
        Err(e) => return fail!("dispatch failed: {}", e),
    };
    let echoed = wire::get_attribute(&reply, ATTR_MESSAGE);
    assert_eq_test!(echoed, Some(b"hi".as_slice()));
    pass!()
}

pub fn test_dispatch_unknown_family_is_not_supported() -> TestResult {
    let registry = FamilyRegistry::new();
    let msg = build_message(0xbeef, CMD_ECHO, &[]);
    match registry.dispatch(1, &msg, 0, 0) {
        Err(NetError::OperationNotSupported) => pass!(),
        Ok(_) => fail!("dispatch to an unregistered family should not succeed"),
        Err(e) => fail!("expected OperationNotSupported, got {}", e),
    }
}

pub fn test_dispatch_unknown_command_is_invalid_argument() -> TestResult {
    let registry = FamilyRegistry::new();
    let props = FamilyProperties {
        id: 0,
        name: "picky",
        commands: alloc::vec![(CMD_ECHO, cmd_echo as _)],
        groups: alloc::vec![],
    };
    let Ok(handle) = registry.register(props) else {
        return fail!("register failed");
    };
    let msg = build_message(handle.id(), 0xff, &[]);
    match registry.dispatch(1, &msg, 0, 0) {
        Err(NetError::InvalidArgument) => pass!(),
        Ok(_) => fail!("dispatch of an unregistered command should not succeed"),
        Err(e) => fail!("expected InvalidArgument, got {}", e),
    }
}

pub fn test_attr_iter_round_trips_multiple_attributes() -> TestResult {
    let mut buf = Vec::new();
    wire::put_attribute(&mut buf, 1, b"a");
    wire::put_attribute(&mut buf, 2, b"bbb");
    wire::put_attribute(&mut buf, 3, &[]);

    let collected: Vec<(u16, Vec<u8>)> = wire::AttrIter::new(&buf).map(|(t, v)| (t, v.to_vec())).collect();
    assert_eq_test!(collected.len(), 3);
    assert_eq_test!(collected[0].0, 1);
    assert_eq_test!(collected[0].1.as_slice(), b"a");
    assert_eq_test!(collected[1].1.as_slice(), b"bbb");
    assert_eq_test!(collected[2].1.as_slice(), b"");
    pass!()
}

pub fn test_unregister_is_idempotent_on_unknown_handle() -> TestResult {
    let registry = FamilyRegistry::new();
    let props = FamilyProperties {
        id: 0,
        name: "single-shot",
        commands: alloc::vec![(CMD_ECHO, cmd_echo as _)],
        groups: alloc::vec![],
    };
    let Ok(handle) = registry.register(props) else {
        return fail!("register failed");
    };
    registry.unregister(handle);
    // Second call targets an already-removed id; must not panic or hang.
    registry.unregister(handle);
    pass!()
}

static SEND_CALLED: AtomicBool = AtomicBool::new(false);
static SEND_HEADER: [AtomicU8; 4] = [AtomicU8::new(0), AtomicU8::new(0), AtomicU8::new(0), AtomicU8::new(0)];

fn record_send(_socket: u32, buf: PacketBuffer) -> Result<(), NetError> {
    let header_start = buf.data_offset() as usize - wire::GENL_HEADER_LEN;
    let slice = buf.as_slice();
    for (i, cell) in SEND_HEADER.iter().enumerate() {
        cell.store(slice[header_start + i], Ordering::SeqCst);
    }
    SEND_CALLED.store(true, Ordering::SeqCst);
    Ok(())
}

pub fn test_send_command_rejects_insufficient_headroom() -> TestResult {
    let registry = FamilyRegistry::new();
    let Ok(buf) = BUFFER_POOL.allocate(0, 16, 0, None, PacketBufferFlags::empty()) else {
        return fail!("allocate failed");
    };
    let params = test_params(CMD_ECHO, 1);
    match registry.send_command(1, buf, &params) {
        Err(NetError::InvalidArgument) => pass!(),
        Ok(_) => fail!("send_command should reject a buffer with no reserved header room"),
        Err(e) => fail!("expected InvalidArgument, got {}", e),
    }
}

pub fn test_send_command_fails_when_no_hook_registered() -> TestResult {
    clear_send_hook_for_test();
    let registry = FamilyRegistry::new();
    let Ok(buf) = BUFFER_POOL.allocate(wire::GENL_HEADER_LEN, 16, 0, None, PacketBufferFlags::empty()) else {
        return fail!("allocate failed");
    };
    let params = test_params(CMD_ECHO, 1);
    match registry.send_command(1, buf, &params) {
        Err(NetError::NetworkUnreachable) => pass!(),
        Ok(_) => fail!("send_command should fail when no transport hook is registered"),
        Err(e) => fail!("expected NetworkUnreachable, got {}", e),
    }
}

pub fn test_send_command_writes_header_and_invokes_hook() -> TestResult {
    SEND_CALLED.store(false, Ordering::SeqCst);
    register_send_hook(record_send);
    let registry = FamilyRegistry::new();
    let Ok(buf) = BUFFER_POOL.allocate(wire::GENL_HEADER_LEN, 16, 0, None, PacketBufferFlags::empty()) else {
        return fail!("allocate failed");
    };
    let params = test_params(CMD_ECHO, 3);
    let Ok(()) = registry.send_command(1, buf, &params) else {
        return fail!("send_command failed");
    };
    assert_test!(SEND_CALLED.load(Ordering::SeqCst), "registered hook must be invoked");
    assert_eq_test!(SEND_HEADER[0].load(Ordering::SeqCst), CMD_ECHO);
    assert_eq_test!(SEND_HEADER[1].load(Ordering::SeqCst), 3);
    clear_send_hook_for_test();
    pass!()
}

pub fn test_family_state_transitions_to_unregistering() -> TestResult {
    let registry = FamilyRegistry::new();
    let props = FamilyProperties {
        id: 0,
        name: "stateful",
        commands: alloc::vec![(CMD_ECHO, cmd_echo as _)],
        groups: alloc::vec![],
    };
    let Ok(handle) = registry.register(props) else {
        return fail!("register failed");
    };
    let Some(fam_ref) = registry.lookup_by_id(handle.id()) else {
        return fail!("lookup failed");
    };
    assert_eq_test!(fam_ref.state(), FamilyState::Registered);
    drop(fam_ref);
    pass!()
}

slopos_lib::define_test_suite!(
    family_registry,
    [
        test_register_rejects_duplicate_name,
        test_register_assigns_dynamic_ids_above_minimum,
        test_lookup_by_name_and_id_agree,
        test_unregister_removes_from_both_indexes,
        test_dispatch_routes_to_registered_command,
        test_dispatch_unknown_family_is_not_supported,
        test_dispatch_unknown_command_is_invalid_argument,
        test_attr_iter_round_trips_multiple_attributes,
        test_unregister_is_idempotent_on_unknown_handle,
        test_family_state_transitions_to_unregistering,
        test_send_command_rejects_insufficient_headroom,
        test_send_command_fails_when_no_hook_registered,
        test_send_command_writes_header_and_invokes_hook,
    ]
);
