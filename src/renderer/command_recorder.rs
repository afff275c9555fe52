use anyhow::{bail, Context, Result};

use super::device::GpuDevice;

/// Bookkeeping for one frame slot: the fence value that must complete before the
/// slot's previous commands are known to be consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSlot {
    pub retire_value: u64,
}

/// Double-buffered recording scope.
///
/// Each `begin` opens a fresh encoder for a frame slot; `end` closes it into a command
/// buffer. A slot can only be reopened once the fence value it was retired with has
/// completed. The recorder knows nothing about passes.
pub struct CommandRecorder {
    slots: Vec<FrameSlot>,
    encoder: Option<wgpu::CommandEncoder>,
    active_slot: Option<usize>,
    recorded_frames: u64,
}

impl CommandRecorder {
    pub fn new(frame_slots: usize) -> Self {
        Self {
            slots: vec![FrameSlot::default(); frame_slots.max(1)],
            encoder: None,
            active_slot: None,
            recorded_frames: 0,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<FrameSlot> {
        self.slots.get(index).copied()
    }

    pub fn is_recording(&self) -> bool {
        self.active_slot.is_some()
    }

    pub fn active_slot(&self) -> Option<usize> {
        self.active_slot
    }

    pub fn recorded_frames(&self) -> u64 {
        self.recorded_frames
    }

    /// Validates and claims `slot` for recording without touching the GPU.
    pub fn claim(&mut self, slot: usize, completed_fence: u64) -> Result<()> {
        if let Some(active) = self.active_slot {
            bail!("cannot begin slot {slot}: slot {active} is still recording");
        }
        let state = self.slots.get(slot).with_context(|| format!("frame slot {slot} out of range"))?;
        if state.retire_value > completed_fence {
            bail!(
                "frame slot {slot} still in flight (needs fence {}, completed {completed_fence})",
                state.retire_value
            );
        }
        self.active_slot = Some(slot);
        Ok(())
    }

    pub fn begin(&mut self, gpu: &GpuDevice, slot: usize) -> Result<()> {
        self.claim(slot, gpu.fence().completed_value())?;
        let label = format!("Frame Slot {slot}");
        self.encoder =
            Some(gpu.device().create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(&label) }));
        Ok(())
    }

    pub fn encoder_mut(&mut self) -> Result<&mut wgpu::CommandEncoder> {
        self.encoder.as_mut().context("command recorder is not recording")
    }

    /// Closes the open scope. The returned slot index must later be passed to `retire`.
    pub fn end(&mut self) -> Result<(usize, wgpu::CommandBuffer)> {
        let slot = self.release()?;
        let encoder = self.encoder.take().context("command recorder has no open encoder")?;
        Ok((slot, encoder.finish()))
    }

    /// Drops the open encoder without producing a command buffer. The slot keeps its
    /// previous retire value. A no-op when nothing is recording.
    pub fn abort(&mut self) {
        self.encoder = None;
        self.active_slot = None;
    }

    fn release(&mut self) -> Result<usize> {
        let slot = self.active_slot.take().context("command recorder is not recording")?;
        self.recorded_frames += 1;
        Ok(slot)
    }

    /// Marks `slot` as busy until `fence_value` completes.
    pub fn retire(&mut self, slot: usize, fence_value: u64) -> Result<()> {
        let state = self.slots.get_mut(slot).with_context(|| format!("frame slot {slot} out of range"))?;
        state.retire_value = fence_value;
        Ok(())
    }
}
