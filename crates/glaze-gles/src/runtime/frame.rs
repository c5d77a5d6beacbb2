//! Frame slots, fences, and the recording context.
//!
//! One slot is "current" at a time; every other component records into the
//! current slot's command encoder. The CPU records frame N+1 while the GPU
//! executes frame N; per-slot fences (native submission indices) keep the
//! per-slot sub-ranges from being overwritten early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

/// Sticky native-queue fault flag.
///
/// Set from the native uncaptured-error callback (or the diagnostic hook);
/// checked before and after submissions. A fault is sticky for the remainder
/// of the frame; the scheduler still resets cleanly at the next boundary.
#[derive(Clone)]
pub struct FaultFlag(Arc<AtomicBool>);

impl FaultFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle of one frame slot:
/// `Idle → Recording → Submitted → (fence observed) → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Recording,
    Submitted,
}

struct FrameSlot {
    encoder: Option<wgpu::CommandEncoder>,
    fence: Option<wgpu::SubmissionIndex>,
    state: SlotState,
}

pub struct FrameScheduler {
    slots: Vec<FrameSlot>,
    current: usize,
    fault: FaultFlag,
}

impl FrameScheduler {
    pub fn new(device: &wgpu::Device, frames_in_flight: usize, fault: FaultFlag) -> Self {
        let mut slots = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            slots.push(FrameSlot {
                encoder: None,
                fence: None,
                state: SlotState::Idle,
            });
        }
        // Start on the last slot so the first `acquire_image` hands out
        // slot 0; pre-frame uploads record into the primed current slot.
        let current = frames_in_flight - 1;
        let mut scheduler = Self {
            slots,
            current,
            fault,
        };
        scheduler.prime(device, current);
        scheduler
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn fault(&self) -> &FaultFlag {
        &self.fault
    }

    fn prime(&mut self, device: &wgpu::Device, slot: usize) {
        self.slots[slot].encoder = Some(device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor {
                label: Some("glaze.frame.encoder"),
            },
        ));
    }

    /// The current slot's encoder. Primes a fresh one if the previous was
    /// consumed by a submit.
    pub fn encoder(&mut self, device: &wgpu::Device) -> &mut wgpu::CommandEncoder {
        if self.slots[self.current].encoder.is_none() {
            self.prime(device, self.current);
        }
        self.slots[self.current].encoder.as_mut().unwrap()
    }

    /// Next slot in round-robin order (the one `acquire_image` hands out).
    pub fn next_slot(&self) -> usize {
        (self.current + 1) % self.slots.len()
    }

    /// Select `slot`'s command buffer as current.
    pub fn begin_frame(&mut self, device: &wgpu::Device, slot: usize) {
        if slot >= self.slots.len() {
            warn!(slot, "begin_frame: slot out of range; ignoring");
            return;
        }
        self.current = slot;
        if self.slots[slot].encoder.is_none() {
            self.prime(device, slot);
        }
        self.slots[slot].state = SlotState::Recording;
    }

    /// Finalize and submit `slot`'s command buffer, arming its fence.
    ///
    /// When the native queue has already faulted, submission is skipped but
    /// the slot is still marked submitted so the next flush does not submit
    /// the same list twice.
    pub fn end_frame(&mut self, queue: &wgpu::Queue, slot: usize) {
        if slot >= self.slots.len() {
            warn!(slot, "end_frame: slot out of range; ignoring");
            return;
        }
        let encoder = self.slots[slot].encoder.take();
        if self.fault.is_set() {
            warn!(slot, "device fault: skipping submission");
            self.slots[slot].state = SlotState::Submitted;
            return;
        }
        if let Some(encoder) = encoder {
            let fence = queue.submit([encoder.finish()]);
            self.slots[slot].fence = Some(fence);
        }
        self.slots[slot].state = SlotState::Submitted;
    }

    /// Block until `slot`'s fence signals; no-op when nothing is pending.
    /// Afterwards the slot's command buffer is cleared and re-primed.
    ///
    /// Returns `true` if a wait actually happened (the caller then resets the
    /// allocators that are safe to reset).
    pub fn wait_fence(&mut self, device: &wgpu::Device, slot: usize) -> bool {
        if slot >= self.slots.len() {
            warn!(slot, "wait_fence: slot out of range; ignoring");
            return false;
        }
        let Some(fence) = self.slots[slot].fence.take() else {
            self.slots[slot].state = SlotState::Idle;
            return false;
        };
        if !self.fault.is_set() {
            device.poll(wgpu::Maintain::WaitForSubmissionIndex(fence));
        }
        self.slots[slot].state = SlotState::Idle;
        self.prime(device, slot);
        debug!(slot, "fence observed; slot idle");
        true
    }

    pub fn pending_fence(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(|s| s.fence.is_some())
    }

    pub fn slot_state(&self, slot: usize) -> SlotState {
        self.slots
            .get(slot)
            .map(|s| s.state)
            .unwrap_or(SlotState::Idle)
    }

    /// Submit the current command buffer and wait for it to complete.
    ///
    /// This is the mid-frame submit used by uploads, `flush`/`finish`, and
    /// readback. On a faulted queue the submission is skipped; the command
    /// buffer is dropped either way so the recording context stays
    /// consistent. The caller must follow up with its re-prime step.
    pub fn submit_and_wait_current(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let slot = self.current;
        let Some(encoder) = self.slots[slot].encoder.take() else {
            return;
        };
        if self.fault.is_set() {
            warn!(slot, "device fault: dropping recorded work");
            return;
        }
        let fence = queue.submit([encoder.finish()]);
        device.poll(wgpu::Maintain::WaitForSubmissionIndex(fence));
    }

    /// Re-prime the current slot's recording context with a fresh command
    /// buffer. Idempotent; callers invoke it wherever a mid-frame
    /// submit-and-wait happened. Descriptor-binding state is invalidated by
    /// the runtime alongside this call, and the render-target binding is
    /// re-established from retained state at the next pass.
    pub fn reprime_recording(&mut self, device: &wgpu::Device) {
        if self.slots[self.current].encoder.is_none() {
            self.prime(device, self.current);
        }
    }

    /// Drop all recording state. Used at shutdown.
    pub fn release_all(&mut self) {
        for slot in &mut self.slots {
            slot.encoder = None;
            slot.fence = None;
            slot.state = SlotState::Idle;
        }
    }
}
