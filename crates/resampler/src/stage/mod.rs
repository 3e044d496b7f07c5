// Elementary resampling stages

mod overlap_save;
mod polyphase;

pub use overlap_save::{fft_size, OverlapSave};
pub use polyphase::Polyphase;

use polysrc_buffer::{BufferLayout, SampleBuffer};
use polysrc_core::{Ratio, Real, Result};
use polysrc_design::StageModel;
use realfft::FftNum;

/// Sample precision a stage can run in
pub trait Precision: Real + FftNum {}

impl<T: Real + FftNum> Precision for T {}

/// Outcome of one stage poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Samples were moved; poll again
    Progress,
    /// Not enough input for a single output
    InputEmpty,
    /// No room downstream
    OutputFull,
}

/// One rational resampling step between two buffers. `process` never
/// blocks: it does as much work as both buffers allow and reports why it
/// stopped otherwise. Errors come only from the transform primitives.
pub trait Stage<T>: Send {
    fn process(&mut self, src: &mut SampleBuffer<T>, dst: &mut SampleBuffer<T>) -> Result<StageStatus>;

    /// Forget carried state, as if no input had been seen
    fn reset(&mut self);

    fn ratio(&self) -> Ratio;

    fn kernel_len(&self) -> usize;
}

/// Stage algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Time-domain polyphase filter bank
    Polyphase,
    /// Frequency-domain block convolution
    OverlapSave,
}

/// Build a stage for `model` reading from a buffer shaped like `src`
pub fn build_stage<T: Precision>(
    kind: StageKind,
    model: &StageModel,
    src: BufferLayout,
) -> Result<Box<dyn Stage<T>>> {
    Ok(match kind {
        StageKind::Polyphase => Box::new(Polyphase::new(model, src)?),
        StageKind::OverlapSave => Box::new(OverlapSave::new(model, src)?),
    })
}
