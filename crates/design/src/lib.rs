// Multi-stage converter design: ratio decomposition, filter synthesis and
// plan construction

pub mod decompose;
pub mod factorize;
pub mod lowpass;
pub mod minphase;
pub mod partition;
pub mod permute;
pub mod plan;
pub mod rational;

pub use decompose::{decompose, Decomposition, StagePlan, StagePolicy, MAX_STAGES};
pub use factorize::Factorizations;
pub use lowpass::{KaiserDesigner, LowpassDesign};
pub use partition::MultisetPartitions;
pub use permute::Orderings;
pub use plan::{buffer_layouts, cache_design, design_plan, DesignOptions, Plan, StageModel};
pub use polysrc_core::{ResampleError, Result};
pub use rational::Rational;
