// Streaming rational sample-rate conversion

pub mod converter;
pub mod stage;

pub use converter::{Converter, IoSize, ProcessStatus};
pub use polysrc_core::{
    ConverterSpec, ConverterState, Quality, Ratio, ResampleError, Result, SampleFormat, Samples,
    SamplesMut, SpecFlags,
};
pub use polysrc_design::{cache_design, DesignOptions, StagePolicy};
pub use stage::{build_stage, fft_size, OverlapSave, Polyphase, Precision, Stage, StageKind, StageStatus};
