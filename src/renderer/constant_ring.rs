use anyhow::{bail, Context, Result};
use std::num::NonZeroU64;

use super::device::GpuDevice;
use super::pipeline::BindingLayouts;

/// Location of one slice inside the ring: its index and the dynamic offset to bind it at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceAddress {
    pub index: u32,
    pub offset: u32,
}

/// Rounds `payload` up to a multiple of `alignment`.
pub fn aligned_slice_size(payload: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    payload.div_ceil(alignment) * alignment
}

/// Slice arithmetic, split out so it can be checked without a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingLayout {
    pub payload_size: u64,
    pub slice_size: u64,
    pub slice_count: u32,
}

impl RingLayout {
    pub fn new(payload_size: u64, alignment: u64, slice_count: u32) -> Self {
        Self { payload_size, slice_size: aligned_slice_size(payload_size, alignment), slice_count }
    }

    pub fn total_size(&self) -> u64 {
        self.slice_size * u64::from(self.slice_count)
    }

    pub fn address(&self, index: u32) -> Result<SliceAddress> {
        if index >= self.slice_count {
            bail!("constant slice {index} out of range (ring holds {})", self.slice_count);
        }
        let offset = u64::from(index) * self.slice_size;
        let offset = u32::try_from(offset).context("constant slice offset exceeds u32")?;
        Ok(SliceAddress { index, offset })
    }
}

/// Index of `object_slot` within the band reserved for `frame_slot`.
pub fn slice_index(frame_slot: usize, slices_per_frame: u32, object_slot: u32) -> u32 {
    frame_slot as u32 * slices_per_frame + object_slot
}

/// One uniform buffer carved into alignment-padded slices, one per draw per frame slot.
///
/// wgpu has no persistent mapping for uniform buffers, so the CPU side is a shadow copy
/// that mirrors the buffer's contents and each upload is staged through the queue. Staged
/// writes land before the next submission, which is the frame that reads them.
pub struct ConstantRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    shadow: Vec<u8>,
    layout: RingLayout,
    slices_per_frame: u32,
}

impl ConstantRing {
    /// Ring with `slices_per_frame` slices for each of `frame_slots` bands.
    pub fn new(
        gpu: &GpuDevice,
        layouts: &BindingLayouts,
        payload_size: u64,
        frame_slots: usize,
        slices_per_frame: u32,
    ) -> Result<Self> {
        let slice_count = slices_per_frame
            .checked_mul(frame_slots as u32)
            .context("constant ring slice count overflows")?;
        let layout = RingLayout::new(payload_size, gpu.uniform_alignment(), slice_count.max(1));
        let buffer = gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Constant Ring"),
            size: layout.total_size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let binding_size = NonZeroU64::new(payload_size).context("constant payload must not be empty")?;
        let bind_group = gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Constant BG"),
            layout: &layouts.scene,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: Some(binding_size),
                }),
            }],
        });
        log::debug!(
            "constant ring: {} slices of {} bytes ({} per frame)",
            layout.slice_count,
            layout.slice_size,
            slices_per_frame
        );
        Ok(Self { buffer, bind_group, shadow: vec![0; layout.total_size() as usize], layout, slices_per_frame })
    }

    pub fn layout(&self) -> RingLayout {
        self.layout
    }

    pub fn slice_size(&self) -> u64 {
        self.layout.slice_size
    }

    pub fn slice_count(&self) -> u32 {
        self.layout.slice_count
    }

    pub fn slices_per_frame(&self) -> u32 {
        self.slices_per_frame
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Copies `data` into slice `index` and stages it for the GPU.
    pub fn upload_slice<T: bytemuck::Pod>(&mut self, queue: &wgpu::Queue, index: u32, data: &T) -> Result<SliceAddress> {
        let bytes = bytemuck::bytes_of(data);
        let address = write_shadow(&mut self.shadow, &self.layout, index, bytes)?;
        queue.write_buffer(&self.buffer, u64::from(address.offset), bytes);
        Ok(address)
    }

    /// CPU-side bytes of slice `index`, padding included.
    pub fn slice_bytes(&self, index: u32) -> Result<&[u8]> {
        let address = self.layout.address(index)?;
        let start = address.offset as usize;
        Ok(&self.shadow[start..start + self.layout.slice_size as usize])
    }
}

fn write_shadow(shadow: &mut [u8], layout: &RingLayout, index: u32, bytes: &[u8]) -> Result<SliceAddress> {
    if bytes.len() as u64 > layout.payload_size {
        bail!("{} byte upload exceeds the {} byte slice payload", bytes.len(), layout.payload_size);
    }
    let address = layout.address(index)?;
    let start = address.offset as usize;
    shadow[start..start + bytes.len()].copy_from_slice(bytes);
    Ok(address)
}
