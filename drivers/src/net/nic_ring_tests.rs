//! Tests for [`super::nic_ring`].

use slopos_lib::testing::TestResult;
use slopos_lib::{assert_eq_test, assert_test, fail, pass};

use super::nic_ring::{ControllerState, ControllerStateCell, NicConfig, PendingQueue, Ring};

pub fn test_ring_capacity_is_n_minus_one() -> TestResult {
    let ring: Ring<u32, 8> = Ring::new();
    assert_eq_test!(ring.capacity(), 7);
    assert_test!(ring.is_empty(), "a fresh ring is empty");
    pass!()
}

pub fn test_ring_post_and_reclaim_preserves_fifo_order() -> TestResult {
    let mut ring: Ring<u32, 4> = Ring::new();
    let Ok(_) = ring.post(10) else { return fail!("post failed") };
    let Ok(_) = ring.post(20) else { return fail!("post failed") };
    let Ok(_) = ring.post(30) else { return fail!("post failed") };

    assert_eq_test!(ring.reclaim(), Some(10));
    assert_eq_test!(ring.reclaim(), Some(20));
    assert_eq_test!(ring.reclaim(), Some(30));
    assert_eq_test!(ring.reclaim(), None);
    pass!()
}

pub fn test_ring_reports_full_at_capacity() -> TestResult {
    let mut ring: Ring<u32, 4> = Ring::new();
    for i in 0..ring.capacity() {
        let Ok(_) = ring.post(i as u32) else { return fail!("post {} should have fit", i) };
    }
    assert_test!(ring.is_full(), "ring should be full after posting `capacity()` entries");
    match ring.post(999) {
        Err(_) => pass!(),
        Ok(_) => fail!("post on a full ring should fail with NoBufferSpace"),
    }
}

pub fn test_ring_reclaim_then_post_wraps_around() -> TestResult {
    let mut ring: Ring<u32, 3> = Ring::new();
    let Ok(_) = ring.post(1) else { return fail!("post failed") };
    let Ok(_) = ring.post(2) else { return fail!("post failed") };
    assert_eq_test!(ring.reclaim(), Some(1));
    let Ok(idx) = ring.post(3) else { return fail!("post after reclaim should fit") };
    assert_eq_test!(idx, 0, "the freed slot should be reused");
    pass!()
}

pub fn test_pending_queue_respects_bound() -> TestResult {
    let mut queue: PendingQueue<u32> = PendingQueue::new(2);
    assert_test!(queue.push(1).is_ok());
    assert_test!(queue.push(2).is_ok());
    match queue.push(3) {
        Err(_) => pass!(),
        Ok(_) => fail!("push past the bound should fail"),
    }
}

pub fn test_pending_queue_push_all_stops_at_bound() -> TestResult {
    let mut queue: PendingQueue<u32> = PendingQueue::new(3);
    let items = alloc::vec![1, 2, 3, 4, 5];
    match queue.push_all(items) {
        Err(_) => {
            assert_eq_test!(queue.len(), 3, "accepted items should stop exactly at the bound");
            pass!()
        }
        Ok(_) => fail!("push_all exceeding the bound should report an error"),
    }
}

pub fn test_controller_state_cell_round_trips() -> TestResult {
    let cell = ControllerStateCell::new(ControllerState::Off);
    assert_eq_test!(cell.load(), ControllerState::Off);
    assert_test!(!cell.is_running());

    cell.store(ControllerState::Running);
    assert_eq_test!(cell.load(), ControllerState::Running);
    assert_test!(cell.is_running());
    pass!()
}

pub fn test_nic_config_default_for_scales_pending_bound() -> TestResult {
    let cfg = NicConfig::default_for(256, 256);
    assert_eq_test!(cfg.tx_ring_size, 256);
    assert_eq_test!(cfg.pending_bound, 512);
    assert_test!(!cfg.drop_override);
    pass!()
}

slopos_lib::define_test_suite!(
    nic_ring,
    [
        test_ring_capacity_is_n_minus_one,
        test_ring_post_and_reclaim_preserves_fifo_order,
        test_ring_reports_full_at_capacity,
        test_ring_reclaim_then_post_wraps_around,
        test_pending_queue_respects_bound,
        test_pending_queue_push_all_stops_at_bound,
        test_controller_state_cell_round_trips,
        test_nic_config_default_for_scales_pending_bound,
    ]
);
