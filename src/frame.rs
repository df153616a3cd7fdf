// =============================================================================
// FRAME LOOP
// =============================================================================
//
// One frame in flight. Each frame walks the same states in order:
//
//   WaitFence -> AcquireImage -> RecordCommands -> Submit -> Present
//
// The fence wait is the only CPU/GPU sync point: it guarantees the previous
// frame's commands have finished before the single command buffer is reset.
// When the window closes the device is drained (Drain) before anything is
// destroyed.

use ash::vk;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    WaitFence,
    AcquireImage,
    RecordCommands,
    Submit,
    Present,
    Drain,
}

/// A non-success result from one of the frame stages. None are recovered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Suboptimal or out of date. Recoverable by recreating the swapchain,
    /// which this renderer does not do.
    #[error("swapchain no longer matches the surface during {stage:?}: {result}")]
    SwapchainStale { stage: FrameStage, result: vk::Result },

    #[error("device lost during {stage:?}")]
    DeviceLost { stage: FrameStage },

    #[error("{stage:?} failed: {result}")]
    Failed { stage: FrameStage, result: vk::Result },
}

impl FrameError {
    pub fn new(stage: FrameStage, result: vk::Result) -> Self {
        match result {
            vk::Result::SUBOPTIMAL_KHR | vk::Result::ERROR_OUT_OF_DATE_KHR => {
                FrameError::SwapchainStale { stage, result }
            }
            vk::Result::ERROR_DEVICE_LOST => FrameError::DeviceLost { stage },
            _ => FrameError::Failed { stage, result },
        }
    }

    pub fn stage(&self) -> FrameStage {
        match *self {
            FrameError::SwapchainStale { stage, .. }
            | FrameError::DeviceLost { stage }
            | FrameError::Failed { stage, .. } => stage,
        }
    }

    /// Whether a renderer that supported swapchain recreation could continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::SwapchainStale { .. })
    }
}

/// The GPU operations a frame is made of, one method per stage.
pub trait FrameTarget {
    /// Block until the previous frame's fence signals, then reset it.
    fn wait_for_fence(&mut self) -> Result<(), FrameError>;

    /// Next presentable image; signals the image-available semaphore.
    fn acquire_image(&mut self) -> Result<u32, FrameError>;

    /// Reset and re-record the command buffer for `image_index`.
    fn record_commands(&mut self, image_index: u32) -> Result<(), FrameError>;

    /// Submit after image-available, signal render-finished and the fence.
    fn submit(&mut self) -> Result<(), FrameError>;

    /// Present `image_index` after render-finished.
    fn present(&mut self, image_index: u32) -> Result<(), FrameError>;

    /// Wait until the device has no work left.
    fn drain(&mut self) -> Result<(), FrameError>;
}

/// Render one frame.
pub fn draw_frame<T: FrameTarget + ?Sized>(target: &mut T) -> Result<(), FrameError> {
    target.wait_for_fence()?;
    let image_index = target.acquire_image()?;
    target.record_commands(image_index)?;
    target.submit()?;
    target.present(image_index)?;
    log::trace!("Presented image {}", image_index);
    Ok(())
}

/// Draw frames until `keep_running` returns false, then drain the device.
///
/// `keep_running` is checked between frames only. The device is drained even
/// when a frame fails, and the frame error takes precedence. Returns the
/// number of frames presented.
pub fn run<T, F>(target: &mut T, mut keep_running: F) -> Result<u64, FrameError>
where
    T: FrameTarget + ?Sized,
    F: FnMut() -> bool,
{
    let mut frames = 0u64;

    let outcome = loop {
        if !keep_running() {
            break Ok(frames);
        }
        if let Err(e) = draw_frame(&mut *target) {
            break Err(e);
        }
        frames += 1;
    };

    let drained = target.drain();

    match outcome {
        Ok(frames) => drained.map(|_| frames),
        Err(e) => {
            if let Err(drain_error) = drained {
                log::error!("Failed to drain device after frame error: {}", drain_error);
            }
            Err(e)
        }
    }
}
