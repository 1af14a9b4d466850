//! Unit tests for the composed Swapchain against the mock backend.
//!
//! Covers the acquire/present contract: headless rotation, pairing
//! enforcement, rebuild on extent change, first-render-pass tracking,
//! fatal surface loss, and the readiness-signal lifecycle.

use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::present::mock::{MockCommandStream, MockDevice, MockSurface, SurfaceState};
use crate::present::{
    AcquireStatus, CommandStream, Extent, GpuSignal, ImageLayout, PresentStatus, Swapchain,
    SwapchainFlags,
};

fn headless_swapchain(extent: Extent) -> (Swapchain, Arc<MockCommandStream>) {
    let device = MockDevice::new();
    let commands = MockCommandStream::new();
    let swapchain = Swapchain::new(
        device,
        commands.clone() as Arc<dyn CommandStream>,
        None,
        SwapchainFlags::empty(),
        extent,
    )
    .unwrap();
    (swapchain, commands)
}

fn surface_swapchain(
    width: u32,
    height: u32,
) -> (Swapchain, Arc<Mutex<SurfaceState>>, Arc<MockCommandStream>) {
    let device = MockDevice::new();
    let commands = MockCommandStream::new();
    let (surface, state) = MockSurface::new(Extent::new(width, height), 3);
    let swapchain = Swapchain::new(
        device,
        commands.clone() as Arc<dyn CommandStream>,
        Some(Box::new(surface)),
        SwapchainFlags::empty(),
        Extent::ZERO,
    )
    .unwrap();
    (swapchain, state, commands)
}

// ============================================================================
// HEADLESS ROTATION
// ============================================================================

#[test]
fn test_headless_rotation_cycles_with_ring_period() {
    let (mut swapchain, _commands) = headless_swapchain(Extent::new(320, 240));
    let ring = swapchain.image_count();
    assert_eq!(ring, 3);

    let mut slots = Vec::new();
    for _ in 0..(ring * 3) {
        let frame = swapchain.acquire().unwrap();
        slots.push(frame.color.slot());
        swapchain.present().unwrap();
    }

    for (i, slot) in slots.iter().enumerate() {
        assert_eq!(*slot as usize, i % ring);
    }
}

#[test]
fn test_headless_acquire_waits_for_in_flight_slot() {
    let (mut swapchain, commands) = headless_swapchain(Extent::new(320, 240));

    // Fill the whole ring without retiring anything.
    for _ in 0..swapchain.image_count() {
        swapchain.acquire().unwrap();
        swapchain.present().unwrap();
        commands.submit();
    }
    assert!(commands.epoch_waits.lock().unwrap().is_empty());

    // Slot 0 comes around again with its present epoch still outstanding.
    swapchain.acquire().unwrap();
    let waits = commands.epoch_waits.lock().unwrap();
    assert_eq!(waits.as_slice(), &[1]);
}

#[test]
fn test_headless_acquire_with_idle_slot_does_not_wait() {
    let (mut swapchain, commands) = headless_swapchain(Extent::new(320, 240));

    // One frame through slot 0; slots 1 and 2 have never been presented.
    swapchain.acquire().unwrap();
    swapchain.present().unwrap();

    // Next slot is idle: acquire must return without any GPU wait, even
    // though slot 0's work has not retired.
    swapchain.acquire().unwrap();
    assert!(commands.epoch_waits.lock().unwrap().is_empty());
}

#[test]
fn test_headless_never_reports_resized() {
    let (mut swapchain, _commands) = headless_swapchain(Extent::new(320, 240));
    for _ in 0..6 {
        let frame = swapchain.acquire().unwrap();
        assert!(!frame.resized);
        swapchain.present().unwrap();
    }
}

#[test]
fn test_headless_defaults_extent_when_zero() {
    let (swapchain, _commands) = headless_swapchain(Extent::ZERO);
    assert!(swapchain.is_headless());
    assert_eq!(swapchain.extent(), Extent::new(640, 480));
}

#[test]
fn test_headless_ready_signal_has_no_backend_payload() {
    let (mut swapchain, _commands) = headless_swapchain(Extent::new(64, 64));
    swapchain.acquire().unwrap();
    let signal = swapchain.take_ready_signal().unwrap();
    assert_eq!(signal.raw(), 0);
}

// ============================================================================
// ACQUIRE/PRESENT PAIRING
// ============================================================================

#[test]
fn test_present_without_acquire_rejected() {
    let (mut swapchain, _commands) = headless_swapchain(Extent::new(64, 64));
    let err = swapchain.present().unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[test]
fn test_double_present_rejected() {
    let (mut swapchain, _commands) = headless_swapchain(Extent::new(64, 64));
    swapchain.acquire().unwrap();
    swapchain.present().unwrap();
    let err = swapchain.present().unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[test]
fn test_double_acquire_rejected() {
    let (mut swapchain, _commands) = headless_swapchain(Extent::new(64, 64));
    swapchain.acquire().unwrap();
    let err = swapchain.acquire().unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

// ============================================================================
// REBUILD ON EXTENT CHANGE
// ============================================================================

#[test]
fn test_rebuild_on_extent_change() {
    let (mut swapchain, state, commands) = surface_swapchain(800, 600);
    assert_eq!(swapchain.extent(), Extent::new(800, 600));

    let first = swapchain.acquire().unwrap();
    assert!(!first.resized);
    swapchain.present().unwrap();

    // Window resized between frames.
    state.lock().unwrap().extent = Extent::new(1024, 768);

    let frame = swapchain.acquire().unwrap();
    assert!(frame.resized);
    assert_eq!(swapchain.extent(), Extent::new(1024, 768));
    assert_eq!(state.lock().unwrap().configure_calls, 2);

    // The rebuild waited for outstanding GPU work before releasing images.
    assert!(commands.idle_waits.load(std::sync::atomic::Ordering::Relaxed) >= 1);

    // Handles issued for the old extent are invalid for further use.
    let err = swapchain.resolve(first.color).unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    // The new handle resolves to an image of the new extent.
    let image = swapchain.resolve(frame.color).unwrap();
    assert_eq!(image.info().extent, Extent::new(1024, 768));
}

#[test]
fn test_out_of_date_acquire_rebuilds_within_same_call() {
    let (mut swapchain, state, _commands) = surface_swapchain(800, 600);

    state
        .lock()
        .unwrap()
        .acquire_results
        .push_back(AcquireStatus::OutOfDate);

    let frame = swapchain.acquire().unwrap();
    assert!(frame.resized);
    assert_eq!(state.lock().unwrap().configure_calls, 2);
    swapchain.present().unwrap();
}

#[test]
fn test_suboptimal_acquire_defers_rebuild_to_next_frame() {
    let (mut swapchain, state, _commands) = surface_swapchain(800, 600);

    state
        .lock()
        .unwrap()
        .acquire_results
        .push_back(AcquireStatus::Suboptimal(0));

    // Suboptimal keeps the frame; no rebuild yet.
    let frame = swapchain.acquire().unwrap();
    assert!(!frame.resized);
    assert_eq!(state.lock().unwrap().configure_calls, 1);
    swapchain.present().unwrap();

    // The deferred rebuild runs on the next acquire.
    let frame = swapchain.acquire().unwrap();
    assert!(frame.resized);
    assert_eq!(state.lock().unwrap().configure_calls, 2);
}

#[test]
fn test_repeated_out_of_date_gives_up() {
    let (mut swapchain, state, _commands) = surface_swapchain(800, 600);

    {
        let mut state = state.lock().unwrap();
        for _ in 0..4 {
            state.acquire_results.push_back(AcquireStatus::OutOfDate);
        }
    }

    let err = swapchain.acquire().unwrap_err();
    assert!(matches!(err, Error::BackendError(_)));

    // The swapchain is inert afterwards.
    let err = swapchain.acquire().unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[test]
fn test_minimized_window_does_not_rebuild() {
    let (mut swapchain, state, _commands) = surface_swapchain(800, 600);

    swapchain.acquire().unwrap();
    swapchain.present().unwrap();

    // Minimized windows report a zero extent; swap resources stay put.
    state.lock().unwrap().extent = Extent::ZERO;

    let frame = swapchain.acquire().unwrap();
    assert!(!frame.resized);
    assert_eq!(swapchain.extent(), Extent::new(800, 600));
    assert_eq!(state.lock().unwrap().configure_calls, 1);
}

#[test]
fn test_rebuild_keeps_depth_when_extent_unchanged() {
    let (mut swapchain, state, _commands) = surface_swapchain(800, 600);

    swapchain.acquire().unwrap();
    let depth_before = swapchain.depth().unwrap().resource().native_handle();
    swapchain.present().unwrap();

    // Rebuild at the same extent (scripted suboptimal, no size change).
    state
        .lock()
        .unwrap()
        .acquire_results
        .push_back(AcquireStatus::Suboptimal(0));
    swapchain.acquire().unwrap();
    swapchain.present().unwrap();
    let frame = swapchain.acquire().unwrap();
    assert!(frame.resized);
    assert_eq!(
        swapchain.depth().unwrap().resource().native_handle(),
        depth_before
    );
    swapchain.present().unwrap();

    // A size change replaces the depth image.
    state.lock().unwrap().extent = Extent::new(1024, 768);
    swapchain.acquire().unwrap();
    assert_ne!(
        swapchain.depth().unwrap().resource().native_handle(),
        depth_before
    );
}

// ============================================================================
// FIRST-RENDER-PASS FLAG
// ============================================================================

#[test]
fn test_first_render_pass_resets_on_rebuild() {
    let (mut swapchain, state, _commands) = surface_swapchain(800, 600);

    swapchain.acquire().unwrap();
    assert!(swapchain.is_first_render_pass());
    swapchain.mark_first_render_pass();
    assert!(!swapchain.is_first_render_pass());
    swapchain.present().unwrap();

    state.lock().unwrap().extent = Extent::new(1024, 768);
    let frame = swapchain.acquire().unwrap();
    assert!(frame.resized);
    assert!(swapchain.is_first_render_pass());
}

// ============================================================================
// FATAL SURFACE LOSS
// ============================================================================

#[test]
fn test_surface_lost_during_acquire_is_fatal() {
    let (mut swapchain, state, _commands) = surface_swapchain(800, 600);

    state
        .lock()
        .unwrap()
        .acquire_results
        .push_back(AcquireStatus::Lost);

    let err = swapchain.acquire().unwrap_err();
    assert!(matches!(err, Error::SurfaceLost(_)));
    assert!(err.is_fatal());

    // No rebuild was attempted on loss.
    assert_eq!(state.lock().unwrap().configure_calls, 1);

    // Every further call is rejected.
    let err = swapchain.acquire().unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    let err = swapchain.present().unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[test]
fn test_surface_lost_during_present_is_fatal() {
    let (mut swapchain, state, _commands) = surface_swapchain(800, 600);

    swapchain.acquire().unwrap();
    state
        .lock()
        .unwrap()
        .present_results
        .push_back(PresentStatus::Lost);

    let err = swapchain.present().unwrap_err();
    assert!(matches!(err, Error::SurfaceLost(_)));
    assert!(swapchain.acquire().is_err());
}

#[test]
fn test_construction_fails_with_no_presentable_images() {
    let device = MockDevice::new();
    let commands = MockCommandStream::new();
    let (surface, state) = MockSurface::new(Extent::new(800, 600), 3);
    state.lock().unwrap().produce_no_images = true;

    let err = Swapchain::new(
        device,
        commands as Arc<dyn CommandStream>,
        Some(Box::new(surface)),
        SwapchainFlags::empty(),
        Extent::ZERO,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InitializationFailed(_)));
}

// ============================================================================
// PRESENT FAILURE FLAG
// ============================================================================

#[test]
fn test_out_of_date_present_sets_failure_flag_and_schedules_rebuild() {
    let (mut swapchain, state, _commands) = surface_swapchain(800, 600);

    swapchain.acquire().unwrap();
    state
        .lock()
        .unwrap()
        .present_results
        .push_back(PresentStatus::OutOfDate);

    // Transient: present itself succeeds, the flag records the dropped frame.
    swapchain.present().unwrap();
    assert!(swapchain.present_failed());

    let frame = swapchain.acquire().unwrap();
    assert!(frame.resized);
    assert!(!swapchain.present_failed());
}

// ============================================================================
// READINESS SIGNAL
// ============================================================================

#[test]
fn test_ready_signal_consumed_once_per_acquire() {
    let (mut swapchain, _state, _commands) = surface_swapchain(800, 600);

    swapchain.acquire().unwrap();
    swapchain.take_ready_signal().unwrap();
    let err = swapchain.take_ready_signal().unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    swapchain.present().unwrap();
    swapchain.acquire().unwrap();
    swapchain.take_ready_signal().unwrap();
}

#[test]
fn test_ready_signal_requires_acquired_image() {
    let (mut swapchain, _state, _commands) = surface_swapchain(800, 600);
    let err = swapchain.take_ready_signal().unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[test]
fn test_platform_acquire_arms_the_handed_out_signal() {
    let (mut swapchain, state, _commands) = surface_swapchain(800, 600);

    swapchain.acquire().unwrap();
    let signal = swapchain.take_ready_signal().unwrap();
    let armed = state.lock().unwrap().armed_signals.clone();
    assert_eq!(armed.last().copied(), Some(signal.raw()));
    assert_ne!(signal.raw(), 0);
}

#[test]
fn test_present_flushes_and_hands_platform_a_wait_handle() {
    let (mut swapchain, state, commands) = surface_swapchain(800, 600);

    swapchain.acquire().unwrap();
    swapchain.present().unwrap();

    assert_eq!(commands.flushes.load(std::sync::atomic::Ordering::Relaxed), 1);
    let waits = state.lock().unwrap().present_waits.clone();
    assert_eq!(waits.len(), 1);
    assert_ne!(waits[0], 0);
}

// ============================================================================
// ACCESSORS
// ============================================================================

#[test]
fn test_accessors_fail_fast_before_acquire() {
    let (swapchain, _state, _commands) = surface_swapchain(800, 600);
    assert!(matches!(
        swapchain.current_color().unwrap_err(),
        Error::InvalidState(_)
    ));
    assert!(matches!(
        swapchain.depth().unwrap_err(),
        Error::InvalidState(_)
    ));
}

#[test]
fn test_accessors_return_current_frame_images() {
    let (mut swapchain, _state, _commands) = surface_swapchain(800, 600);
    let frame = swapchain.acquire().unwrap();

    let color = swapchain.current_color().unwrap();
    assert_eq!(color.info().extent, Extent::new(800, 600));
    assert_eq!(
        color.resource().native_handle(),
        swapchain.resolve(frame.color).unwrap().resource().native_handle()
    );

    let depth = swapchain.depth().unwrap();
    assert!(depth.info().format.is_depth());
}

// ============================================================================
// LAYOUT TRANSITIONS
// ============================================================================

#[test]
fn test_acquire_reasserts_layouts_and_present_hands_off() {
    let (mut swapchain, _state, commands) = surface_swapchain(800, 600);

    swapchain.acquire().unwrap();
    let color_handle = swapchain.current_color().unwrap().resource().native_handle();
    swapchain.present().unwrap();

    let transitions = commands.transitions.lock().unwrap().clone();
    assert!(transitions.contains(&(
        color_handle,
        ImageLayout::Undefined,
        ImageLayout::ColorAttachment
    )));
    assert!(transitions.contains(&(
        color_handle,
        ImageLayout::ColorAttachment,
        ImageLayout::PresentSrc
    )));

    // Depth was asserted once; it stays in its attachment layout.
    assert!(transitions
        .iter()
        .any(|(_, from, to)| *from == ImageLayout::Undefined
            && *to == ImageLayout::DepthAttachment));
}

// ============================================================================
// TEARDOWN
// ============================================================================

#[test]
fn test_drop_drains_outstanding_gpu_work() {
    let device = MockDevice::new();
    let commands = MockCommandStream::new();
    {
        let mut swapchain = Swapchain::new(
            device,
            commands.clone() as Arc<dyn CommandStream>,
            None,
            SwapchainFlags::empty(),
            Extent::new(64, 64),
        )
        .unwrap();
        swapchain.acquire().unwrap();
        swapchain.present().unwrap();
    }
    assert!(commands.idle_waits.load(std::sync::atomic::Ordering::Relaxed) >= 1);
}

// ============================================================================
// CONSTRUCTION VARIANTS
// ============================================================================

#[test]
fn test_headless_flag_forces_headless_despite_surface() {
    let device = MockDevice::new();
    let commands = MockCommandStream::new();
    let (surface, state) = MockSurface::new(Extent::new(800, 600), 3);

    let swapchain = Swapchain::new(
        device,
        commands as Arc<dyn CommandStream>,
        Some(Box::new(surface)),
        SwapchainFlags::HEADLESS,
        Extent::new(128, 128),
    )
    .unwrap();
    assert!(swapchain.is_headless());
    assert_eq!(state.lock().unwrap().configure_calls, 0);
}

#[test]
fn test_device_exhaustion_fails_construction() {
    let device = MockDevice::new();
    *device.fail_image_creation.lock().unwrap() = true;
    let commands = MockCommandStream::new();

    let err = Swapchain::new(
        device,
        commands as Arc<dyn CommandStream>,
        None,
        SwapchainFlags::empty(),
        Extent::new(64, 64),
    )
    .unwrap_err();
    assert!(matches!(err, Error::OutOfMemory));
    assert!(err.is_fatal());
}
