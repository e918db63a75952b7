//! Device-backed scenarios that need a real Vulkan-capable GPU and window
//! surface to run. These are `#[ignore]`d: the assertions document the
//! expected behavior (scenarios S3-S5), but exercising them requires a
//! live `raw_window_handle`/`raw_display_handle` pair this test binary has
//! no way to manufacture headlessly.

use apex_graphics::vulkan::{Device, QueueOwnershipTransfer};

/// S3 (swapchain resize): resizing the window mid-frame should make the
/// next `frame_begin` observe a failed/suboptimal acquire, recreate the
/// swapchain exactly once, and succeed on the retried acquire with the new
/// extent reflected in `swapchain_extent()`.
#[test]
#[ignore = "requires a live window surface"]
fn s3_swapchain_resize_recreates_once_and_retries_acquire() {
    unimplemented!("exercise against a real Device + window resize event");
}

/// S4 (compute/graphics ownership handoff): an image written by the
/// compute queue and read by the graphics queue must cross a
/// release/acquire barrier pair built from the same
/// `QueueOwnershipTransfer`, or the graphics queue risks reading stale
/// cache state the source queue never flushed.
#[test]
#[ignore = "requires a live device with distinct compute and graphics queue families"]
fn s4_compute_to_graphics_ownership_transfer_is_paired() {
    let transfer = QueueOwnershipTransfer {
        src_queue_family: 1,
        dst_queue_family: 0,
    };
    assert_ne!(transfer.src_queue_family, transfer.dst_queue_family);
    unimplemented!("record release on compute cmd buffer, acquire on graphics cmd buffer, submit both");
}

/// S5 (timeline fence sequencing): frame N+FRAMES_IN_FLIGHT must not begin
/// recording into a command pool until the timeline semaphore reaches the
/// value signaled by frame N's submission.
#[test]
#[ignore = "requires a live device to drive multiple frames_begin/present cycles"]
fn s5_timeline_semaphore_orders_frame_reuse() {
    unimplemented!("drive Device::frame_begin/swapchain_present across > FRAMES_IN_FLIGHT frames");
}
