//! Completion counter and frame pacing against the simulated GPU.
//!
//! # Test Categories
//!
//! - **Gate**: signaled values increase, waits observe completion
//! - **Slot reuse**: a slot is never reset before its last frame retires
//! - **Device loss**: loss surfaces as an error instead of a hang

#![cfg(feature = "dummy")]

mod common;

use std::thread;
use std::time::Duration;

use rstest::rstest;

use common::{TestContext, record_clear};
use mapview_graphics::backend::dummy::CompletionMode;
use mapview_graphics::{ArenaState, FrameState, GraphicsError, SyncGate};

// ============================================================================
// Gate
// ============================================================================

#[rstest]
#[case::immediate(CompletionMode::Immediate)]
#[case::manual(CompletionMode::Manual)]
fn test_completed_counter_never_decreases(#[case] mode: CompletionMode) {
    let ctx = TestContext::with_mode(mode);
    let mut gate = SyncGate::new(ctx.device.clone());

    let mut last = 0;
    for round in 1..=20u64 {
        let value = gate.signal_after_submit().unwrap();
        assert_eq!(value, round);
        if round % 3 == 0 {
            ctx.backend.release_until(round - 1);
        }
        let completed = gate.completed().unwrap();
        assert!(completed >= last, "{completed} < {last}");
        last = completed;
    }

    ctx.backend.release_until(20);
    gate.wait_until(20).unwrap();
    assert!(gate.completed().unwrap() >= 20);
}

#[rstest]
#[case(1)]
#[case(5)]
#[case(12)]
fn test_wait_until_reaches_target(#[case] target: u64) {
    let ctx = TestContext::with_mode(CompletionMode::Manual);
    let mut gate = SyncGate::new(ctx.device.clone());
    for _ in 0..12 {
        gate.signal_after_submit().unwrap();
    }
    assert!(!gate.is_reached(target).unwrap());

    let backend = ctx.backend.clone();
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        backend.release_until(target);
    });
    gate.wait_until(target).unwrap();
    releaser.join().unwrap();

    assert!(gate.completed().unwrap() >= target);
    assert!(gate.is_reached(target).unwrap());
}

#[test]
fn test_wait_past_hang_threshold_keeps_waiting() {
    let ctx = TestContext::with_mode(CompletionMode::Manual);
    let mut gate = SyncGate::new(ctx.device.clone()).with_hang_threshold(Duration::from_millis(2));
    let value = gate.signal_after_submit().unwrap();

    let backend = ctx.backend.clone();
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        backend.release_until(value);
    });
    gate.wait_until(value).unwrap();
    releaser.join().unwrap();
}

#[test]
fn test_wait_for_unsignaled_value_rejected() {
    let ctx = TestContext::new();
    let mut gate = SyncGate::new(ctx.device.clone());
    assert!(matches!(
        gate.wait_until(1),
        Err(GraphicsError::InvalidParameter(_))
    ));
    gate.wait_until(0).unwrap();
}

// ============================================================================
// Slot reuse
// ============================================================================

/// Interleave GPU progress with attempts to start frames; a slot's arena
/// must only be reset once its stamp has completed.
#[rstest]
#[case::double_buffered(2)]
#[case::triple_buffered(3)]
fn test_slot_not_reset_before_retired(#[case] frames_in_flight: usize) {
    let ctx = TestContext::with_mode(CompletionMode::Manual);
    let mut fl = ctx.frame_loop(frames_in_flight);

    // Fill every slot without letting the GPU finish anything.
    let mut stamps = Vec::new();
    for _ in 0..frames_in_flight {
        let slot = fl.try_begin_frame().unwrap().unwrap();
        record_clear(fl.slot_mut().unwrap()).unwrap();
        stamps.push((slot, fl.submit().unwrap()));
        fl.present().unwrap();
        fl.advance().unwrap();
    }

    for (slot, stamp) in stamps {
        for _ in 0..3 {
            assert_eq!(fl.try_begin_frame().unwrap(), None);
            assert_eq!(fl.state(), FrameState::Idle);
            let arena = fl.frames().slot(slot).unwrap().arena();
            assert_eq!(arena.state(), ArenaState::Submitted);
        }
        assert!(fl.frames().slot(slot).unwrap().required_completion() == stamp);

        ctx.backend.release_until(stamp);
        assert_eq!(fl.try_begin_frame().unwrap(), Some(slot));
        record_clear(fl.slot_mut().unwrap()).unwrap();
        fl.submit().unwrap();
        fl.present().unwrap();
        fl.advance().unwrap();
    }

    ctx.backend.release_all();
    fl.shutdown().unwrap();
    assert!(ctx.backend.lost_reason().is_none());
}

#[test]
fn test_blocking_begin_waits_for_slot() {
    let ctx = TestContext::with_mode(CompletionMode::Manual);
    let mut fl = ctx.frame_loop(2);
    let mut stamps = Vec::new();
    for _ in 0..2 {
        fl.begin_frame().unwrap();
        record_clear(fl.slot_mut().unwrap()).unwrap();
        stamps.push(fl.submit().unwrap());
        fl.present().unwrap();
        fl.advance().unwrap();
    }

    let backend = ctx.backend.clone();
    let first = stamps[0];
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        backend.release_until(first);
    });
    assert_eq!(fl.begin_frame().unwrap(), 0);
    releaser.join().unwrap();
    assert!(fl.gate_mut().is_reached(first).unwrap());
    assert!(!fl.gate_mut().is_reached(stamps[1]).unwrap());

    ctx.backend.release_all();
    record_clear(fl.slot_mut().unwrap()).unwrap();
    fl.submit().unwrap();
    fl.present().unwrap();
    fl.advance().unwrap();
    fl.shutdown().unwrap();
}

// ============================================================================
// Device loss
// ============================================================================

#[test]
fn test_device_lost_ends_frame_loop() {
    let ctx = TestContext::new();
    let mut fl = ctx.frame_loop(2);
    fl.render(record_clear).unwrap();

    ctx.backend.lose_device("driver reset");
    let err = fl.render(record_clear).unwrap_err();
    assert!(matches!(err, GraphicsError::DeviceLost(_)), "{err:?}");
}

#[test]
fn test_device_lost_wakes_waiter() {
    let ctx = TestContext::with_mode(CompletionMode::Manual);
    let mut gate = SyncGate::new(ctx.device.clone());
    let value = gate.signal_after_submit().unwrap();

    let backend = ctx.backend.clone();
    let loser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        backend.lose_device("removed");
    });
    assert!(matches!(
        gate.wait_until(value),
        Err(GraphicsError::DeviceLost(_))
    ));
    loser.join().unwrap();
}

#[test]
fn test_invalid_barrier_loses_device() {
    use mapview_graphics::command::Command;
    use mapview_graphics::{ResourceState, Transition};

    let ctx = TestContext::new();
    let mut fl = ctx.frame_loop(2);
    // Execution is asynchronous, so the loss may already show at present.
    let _ = fl.render(|slot| {
        let present = slot.present_target().cloned().unwrap();
        let mut recorder = slot.arena_mut().begin()?;
        // The image is in Present, not ShaderRead.
        recorder.push(Command::Barrier(vec![Transition::new(
            present.id(),
            ResourceState::ShaderRead,
            ResourceState::RenderTarget,
        )]));
        Ok(())
    });
    let err = fl.gate_mut().drain().unwrap_err();
    assert!(matches!(err, GraphicsError::DeviceLost(_)), "{err:?}");
    assert!(ctx.backend.lost_reason().unwrap().contains("barrier"));
}
