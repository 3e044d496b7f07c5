// Core types shared by the polysrc crates

pub mod error;
pub mod filter;
pub mod format;
pub mod ratio;
pub mod spec;
pub mod state;

// Re-export commonly used types
pub use error::{ResampleError, Result};
pub use filter::{FilterCoefs, FilterSpec, FILTER_MINIMUM_PHASE};
pub use format::{Real, SampleFormat, Samples, SamplesMut};
pub use ratio::Ratio;
pub use spec::{gain_db, ripple_db, ConverterSpec, Quality, SpecFlags};
pub use state::{ConverterState, StateMachine};
