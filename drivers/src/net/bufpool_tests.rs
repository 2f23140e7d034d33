//! Tests for [`super::bufpool`].

use slopos_abi::addr::PhysAddr;
use slopos_lib::testing::TestResult;
use slopos_lib::{assert_eq_test, assert_test, fail, pass};

use super::bufpool::{LinkProperties, PacketBufferFlags, PacketBufferPool};

fn test_link() -> LinkProperties {
    LinkProperties::new(64, 16, 4, 16, PhysAddr::new(0xffff_ffff))
}

pub fn test_allocate_sizes_header_payload_footer() -> TestResult {
    let pool = PacketBufferPool::new();
    let link = test_link();
    let Ok(buf) = pool.allocate(16, 100, 4, Some(&link), PacketBufferFlags::empty()) else {
        return fail!("allocate failed");
    };
    assert_eq_test!(buf.data_offset(), 16);
    assert_eq_test!(buf.payload_len(), 100);
    assert_test!(buf.capacity() >= 16 + 100 + 4, "capacity must cover header+payload+footer");
    pass!()
}

pub fn test_free_then_allocate_reuses_free_list_entry() -> TestResult {
    let pool = PacketBufferPool::new();
    let link = test_link();
    let Ok(buf) = pool.allocate(16, 100, 4, Some(&link), PacketBufferFlags::empty()) else {
        return fail!("allocate failed");
    };
    let cap = buf.capacity();
    pool.free(buf);
    assert_eq_test!(pool.free_count(), 1, "freed buffer should sit on the free-list");

    let Ok(reused) = pool.allocate(16, 90, 4, Some(&link), PacketBufferFlags::empty()) else {
        return fail!("second allocate failed");
    };
    assert_eq_test!(reused.capacity(), cap, "a fitting free-list entry should be reused rather than freshly allocated");
    assert_eq_test!(pool.free_count(), 0, "free-list entry should have been taken");
    pass!()
}

pub fn test_allocate_without_link_uses_paged_backing() -> TestResult {
    let pool = PacketBufferPool::new();
    let Ok(buf) = pool.allocate(0, 32, 0, None, PacketBufferFlags::empty()) else {
        return fail!("allocate failed");
    };
    assert_test!(buf.phys_addr().is_none(), "a buffer allocated with no link has no DMA-stable physical address");
    pass!()
}

pub fn test_allocate_with_link_is_dma_capable() -> TestResult {
    let pool = PacketBufferPool::new();
    let link = test_link();
    let Ok(buf) = pool.allocate(16, 64, 4, Some(&link), PacketBufferFlags::DMA_CAPABLE) else {
        return fail!("allocate failed");
    };
    assert_test!(buf.phys_addr().is_some(), "a buffer allocated against link properties must carry a physical address");
    pass!()
}

pub fn test_zero_full_flag_clears_entire_capacity() -> TestResult {
    let pool = PacketBufferPool::new();
    let link = test_link();
    let Ok(mut buf) = pool.allocate(16, 32, 4, Some(&link), PacketBufferFlags::ZERO_FULL) else {
        return fail!("allocate failed");
    };
    assert_test!(buf.as_mut_slice().iter().all(|&b| b == 0), "ZERO_FULL must zero the whole backing region");
    pass!()
}

pub fn test_allocate_pads_to_link_min_packet_size() -> TestResult {
    let pool = PacketBufferPool::new();
    let link = test_link();
    // header(16) + size(10) + footer(4) = 30, below the link's min_packet_size of 64.
    let Ok(mut buf) = pool.allocate(16, 10, 4, Some(&link), PacketBufferFlags::empty()) else {
        return fail!("allocate failed");
    };
    assert_test!(buf.capacity() >= 64, "total must be raised to link.min_packet_size");
    let padding = &buf.as_mut_slice()[30..64];
    assert_test!(padding.iter().all(|&b| b == 0), "bytes past the payload up to min_packet_size must be zeroed");
    pass!()
}

pub fn test_allocate_fresh_rejects_link_whose_phys_ceiling_is_unreachable() -> TestResult {
    let pool = PacketBufferPool::new();
    // No real page frame can satisfy a ceiling this low; the pinned path must fail
    // rather than hand back a frame above the link's DMA ceiling.
    let link = LinkProperties::new(0, 16, 4, 16, PhysAddr::new(1));
    let result = pool.allocate(16, 32, 4, Some(&link), PacketBufferFlags::empty());
    assert_test!(result.is_err(), "allocate must fail when no frame can fit under max_phys_addr");
    pass!()
}

pub fn test_free_list_does_not_hand_a_paged_buffer_to_a_link_request() -> TestResult {
    let pool = PacketBufferPool::new();
    let Ok(paged) = pool.allocate(0, 64, 0, None, PacketBufferFlags::empty()) else {
        return fail!("paged allocate failed");
    };
    pool.free(paged);
    assert_eq_test!(pool.free_count(), 1);

    let link = test_link();
    let Ok(pinned) = pool.allocate(16, 32, 4, Some(&link), PacketBufferFlags::empty()) else {
        return fail!("link allocate failed");
    };
    assert_test!(pinned.phys_addr().is_some(), "a link-bound request must never be given the paged free-list entry");
    assert_eq_test!(pool.free_count(), 1, "the paged entry must still be sitting on the free-list, untaken");
    pass!()
}

pub fn test_destroy_list_drains_into_free_list() -> TestResult {
    let pool = PacketBufferPool::new();
    let link = test_link();
    let mut bufs = alloc::vec::Vec::new();
    for _ in 0..3 {
        let Ok(buf) = pool.allocate(16, 32, 4, Some(&link), PacketBufferFlags::empty()) else {
            return fail!("allocate failed");
        };
        bufs.push(buf);
    }
    pool.destroy_list(&mut bufs);
    assert_test!(bufs.is_empty(), "destroy_list must drain the input Vec");
    assert_eq_test!(pool.free_count(), 3);
    pass!()
}

slopos_lib::define_test_suite!(
    bufpool,
    [
        test_allocate_sizes_header_payload_footer,
        test_free_then_allocate_reuses_free_list_entry,
        test_allocate_without_link_uses_paged_backing,
        test_allocate_with_link_is_dma_capable,
        test_zero_full_flag_clears_entire_capacity,
        test_allocate_pads_to_link_min_packet_size,
        test_allocate_fresh_rejects_link_whose_phys_ceiling_is_unreachable,
        test_free_list_does_not_hand_a_paged_buffer_to_a_link_request,
        test_destroy_list_drains_into_free_list,
    ]
);
