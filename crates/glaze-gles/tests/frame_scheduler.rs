//! Frame slot sequencing: acquire → record → submit → present → wait.

mod common;

use glaze_gles::{GlesBackend, SlotState};

#[test]
fn slots_cycle_through_the_state_machine() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };

    for expected_slot in [0u32, 1, 2, 0, 1] {
        let slot = runtime.acquire_image();
        assert_eq!(slot, expected_slot, "round-robin acquisition");

        runtime.begin_frame(slot);
        assert_eq!(runtime.frame_slot_state(slot), SlotState::Recording);

        runtime.clear(
            glaze_gles::ClearMask::COLOR,
            [0.0, 0.0, 0.0, 1.0],
            1.0,
            0,
        );

        runtime.end_frame(slot);
        assert_eq!(runtime.frame_slot_state(slot), SlotState::Submitted);

        runtime.present(slot);
        assert_eq!(runtime.last_presented(), Some(slot));

        runtime.wait_fence(slot);
        assert_eq!(runtime.frame_slot_state(slot), SlotState::Idle);
    }
}

#[test]
fn wait_fence_without_pending_submission_is_a_noop() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };

    // Nothing has been submitted for slot 1; this must neither block nor
    // disturb the state machine.
    runtime.wait_fence(1);
    assert_eq!(runtime.frame_slot_state(1), SlotState::Idle);

    let slot = runtime.acquire_image();
    runtime.begin_frame(slot);
    runtime.end_frame(slot);
    runtime.wait_fence(slot);
    runtime.wait_fence(slot);
    assert_eq!(runtime.frame_slot_state(slot), SlotState::Idle);
}

#[test]
fn acquire_drains_the_previous_use_of_a_slot() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };

    // Submit every slot without ever waiting; the second lap must wait each
    // slot's prior fence before handing it out again.
    for _ in 0..7 {
        let slot = runtime.acquire_image();
        runtime.begin_frame(slot);
        runtime.clear(
            glaze_gles::ClearMask::COLOR,
            [1.0, 0.0, 0.0, 1.0],
            1.0,
            0,
        );
        runtime.end_frame(slot);
        runtime.present(slot);
    }
}

#[test]
fn faulted_queue_skips_submission_but_keeps_bookkeeping() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };

    let slot = runtime.acquire_image();
    runtime.begin_frame(slot);
    runtime.mark_device_faulted();

    // Submission is skipped, the slot is still marked submitted so the next
    // flush cannot double-submit, and the scheduler resets cleanly.
    runtime.end_frame(slot);
    assert_eq!(runtime.frame_slot_state(slot), SlotState::Submitted);

    runtime.wait_fence(slot);
    assert_eq!(runtime.frame_slot_state(slot), SlotState::Idle);

    let next = runtime.acquire_image();
    runtime.begin_frame(next);
    runtime.end_frame(next);
    assert_eq!(runtime.frame_slot_state(next), SlotState::Submitted);
}
