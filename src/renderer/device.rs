use anyhow::{Context, Result};
use std::collections::VecDeque;

/// Monotonic completion counter layered on queue submissions.
///
/// `signal` enqueues an empty submission and associates the next counter value with
/// it. Because the queue executes in order, a value is complete once its submission
/// has retired, and so is every smaller value.
#[derive(Debug, Default)]
pub struct GpuFence {
    last_signaled: u64,
    completed: u64,
    pending: VecDeque<(u64, wgpu::SubmissionIndex)>,
}

impl GpuFence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&mut self, queue: &wgpu::Queue) -> u64 {
        let submission = queue.submit(std::iter::empty());
        self.last_signaled += 1;
        self.pending.push_back((self.last_signaled, submission));
        self.last_signaled
    }

    pub fn last_signaled(&self) -> u64 {
        self.last_signaled
    }

    pub fn completed_value(&self) -> u64 {
        self.completed
    }

    pub fn is_complete(&self, value: u64) -> bool {
        value <= self.completed
    }

    /// Blocks until `value` has been reached. Waiting on an already-complete value
    /// returns immediately; waiting on a value never signaled is an error.
    pub fn wait(&mut self, device: &wgpu::Device, value: u64) -> Result<()> {
        if self.is_complete(value) {
            return Ok(());
        }
        anyhow::ensure!(
            value <= self.last_signaled,
            "fence value {value} was never signaled (last signaled {})",
            self.last_signaled
        );
        let mut target = None;
        while let Some((pending_value, _)) = self.pending.front() {
            if *pending_value > value {
                break;
            }
            target = self.pending.pop_front();
        }
        if let Some((reached, submission)) = target {
            device
                .poll(wgpu::PollType::Wait { submission_index: Some(submission), timeout: None })
                .context("GPU wait failed")?;
            self.completed = self.completed.max(reached);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub power_preference: wgpu::PowerPreference,
    /// Retry with a software adapter when no hardware adapter qualifies.
    pub allow_software_fallback: bool,
    pub label: &'static str,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            allow_software_fallback: true,
            label: "Harrier Device",
        }
    }
}

/// Adapter, logical device, the single queue and the frame fence.
///
/// Constructed once and passed by reference to everything that creates GPU objects.
pub struct GpuDevice {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    fence: GpuFence,
}

impl GpuDevice {
    /// Picks an adapter compatible with `surface` (if any) and creates the device.
    pub async fn initialize(
        instance: wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
        config: &DeviceConfig,
    ) -> Result<Self> {
        let adapter = Self::select_adapter(&instance, surface, config).await?;
        let info = adapter.get_info();
        log::info!("using adapter '{}' ({:?}, {:?})", info.name, info.device_type, info.backend);

        let device_desc = wgpu::DeviceDescriptor {
            label: Some(config.label),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        };
        let (device, queue) =
            adapter.request_device(&device_desc).await.context("Failed to request GPU device")?;
        Ok(Self { instance, adapter, device, queue, fence: GpuFence::new() })
    }

    /// Device without a presentation surface, for tests and offscreen rendering.
    pub async fn initialize_headless() -> Result<Self> {
        Self::initialize(wgpu::Instance::default(), None, &DeviceConfig::default()).await
    }

    async fn select_adapter(
        instance: &wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
        config: &DeviceConfig,
    ) -> Result<wgpu::Adapter> {
        let hardware = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await;
        match hardware {
            Ok(adapter) => Ok(adapter),
            Err(err) if config.allow_software_fallback => {
                log::warn!("no hardware adapter available ({err}); trying software fallback");
                instance
                    .request_adapter(&wgpu::RequestAdapterOptions {
                        power_preference: wgpu::PowerPreference::LowPower,
                        compatible_surface: surface,
                        force_fallback_adapter: true,
                    })
                    .await
                    .context("Failed to find any GPU adapter, including software fallback")
            }
            Err(err) => Err(err).context("Failed to find a GPU adapter"),
        }
    }

    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn fence(&self) -> &GpuFence {
        &self.fence
    }

    /// Alignment of dynamic uniform offsets on this device.
    pub fn uniform_alignment(&self) -> u64 {
        u64::from(self.device.limits().min_uniform_buffer_offset_alignment)
    }

    /// Signals the next fence value behind all submitted work.
    pub fn signal(&mut self) -> u64 {
        self.fence.signal(&self.queue)
    }

    /// Signals the fence and blocks until the GPU has drained everything before it.
    pub fn wait_gpu(&mut self) -> Result<u64> {
        let value = self.fence.signal(&self.queue);
        self.fence.wait(&self.device, value)?;
        Ok(value)
    }

    /// Submits recorded work and returns the fence value that marks its retirement.
    pub fn submit(&mut self, commands: wgpu::CommandBuffer) -> u64 {
        self.queue.submit(std::iter::once(commands));
        self.fence.signal(&self.queue)
    }
}
