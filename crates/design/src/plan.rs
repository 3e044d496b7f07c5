// Full converter plans: stage ratios, filters and buffer geometry

use crate::decompose::{decompose, StagePolicy};
use crate::lowpass::{KaiserDesigner, LowpassDesign};
use polysrc_buffer::BufferLayout;
use polysrc_cache::FilterCache;
use polysrc_core::{
    ConverterSpec, FilterCoefs, FilterSpec, Ratio, ResampleError, Result, FILTER_MINIMUM_PHASE,
};
use std::fmt;
use std::sync::Arc;

/// One stage ready to be built: its ratio and its prototype lowpass
#[derive(Debug, Clone, PartialEq)]
pub struct StageModel {
    pub ratio: Ratio,
    pub taps: Vec<f64>,
}

impl StageModel {
    pub fn kernel_len(&self) -> usize {
        self.taps.len()
    }
}

/// Stage models plus the geometry of the `stages.len() + 1` buffers that
/// connect them. Stage `i` reads buffer `i` and writes buffer `i + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Reduced overall ratio
    pub ratio: Ratio,
    pub stages: Vec<StageModel>,
    pub buffers: Vec<BufferLayout>,
    /// Effective per-call input capacity
    pub max_input: usize,
    /// Effective per-call output capacity
    pub max_output: usize,
}

/// Knobs for plan construction
#[derive(Clone)]
pub struct DesignOptions {
    pub policy: StagePolicy,
    pub max_stages: usize,
    pub designer: Arc<dyn LowpassDesign>,
}

impl Default for DesignOptions {
    fn default() -> Self {
        Self {
            policy: StagePolicy::default(),
            max_stages: 3,
            designer: Arc::new(KaiserDesigner::default()),
        }
    }
}

impl fmt::Debug for DesignOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesignOptions")
            .field("policy", &self.policy)
            .field("max_stages", &self.max_stages)
            .finish_non_exhaustive()
    }
}

/// Buffer geometry for `stages` fed with `input` samples per block
pub fn buffer_layouts(stages: &[StageModel], input: usize) -> Vec<BufferLayout> {
    let mut layouts = Vec::with_capacity(stages.len() + 1);
    let mut count = input;
    for stage in stages {
        let l = stage.ratio.up as usize;
        let m = stage.ratio.down as usize;
        let past = stage.kernel_len().max(m).div_ceil(l) - 1;
        layouts.push(BufferLayout {
            past,
            size: count + past,
        });
        count = count / m * l;
    }
    layouts.push(BufferLayout {
        past: 0,
        size: count,
    });
    layouts
}

/// Fetch cached filters, design the missing ones and store them back
fn filters_for(
    cache: Option<&mut FilterCache>,
    specs: &[FilterSpec],
    designer: &dyn LowpassDesign,
) -> Result<Vec<FilterCoefs>> {
    let mut cache = cache;
    let cached = match cache.as_deref_mut() {
        Some(c) => c.lookup(specs).unwrap_or_else(|e| {
            log::warn!("Filter cache lookup failed: {}", e);
            vec![None; specs.len()]
        }),
        None => vec![None; specs.len()],
    };

    let mut designed_specs = Vec::new();
    let mut designed = Vec::new();
    let mut filters = Vec::with_capacity(specs.len());
    for (spec, hit) in specs.iter().zip(cached) {
        match hit {
            Some(coefs) => filters.push(coefs),
            None => {
                log::debug!("Designing lowpass {:?}", spec);
                let coefs = designer.design(spec)?;
                designed_specs.push(*spec);
                designed.push(coefs.clone());
                filters.push(coefs);
            }
        }
    }

    if let Some(c) = cache {
        if !designed.is_empty() && c.mode().is_writable() {
            if let Err(e) = c.store(&designed_specs, &designed) {
                log::warn!("Could not store designed filters in cache: {}", e);
            }
        }
    }

    Ok(filters)
}

/// Build the complete plan for `spec`
pub fn design_plan(
    cache: Option<&mut FilterCache>,
    spec: &ConverterSpec,
    options: &DesignOptions,
) -> Result<Plan> {
    spec.validate()?;

    let ratio = spec.ratio.reduced();
    if ratio.is_identity() {
        return Err(ResampleError::invalid("1/1 needs no conversion"));
    }

    let up = ratio.up as usize;
    let down = ratio.down as usize;
    let block = spec.max_input.div_ceil(down).min(spec.max_output.div_ceil(up));
    if block == 0 {
        return Err(ResampleError::invalid("block size collapses to zero"));
    }

    let decomposition = decompose(ratio, spec.passband_width, options.max_stages, options.policy)?;
    let n = decomposition.stages.len();

    let flags = if spec.flags.minimum_phase {
        FILTER_MINIMUM_PHASE
    } else {
        0
    };
    let specs: Vec<FilterSpec> = decomposition
        .stages
        .iter()
        .map(|s| FilterSpec {
            passband_edge: s.passband_edge,
            stopband_edge: s.stopband_edge,
            passband_ripple: spec.passband_ripple / n as f64,
            stopband_ripple: spec.stopband_ripple,
            flags,
        })
        .collect();

    let filters = filters_for(cache, &specs, options.designer.as_ref())?;

    let stages: Vec<StageModel> = decomposition
        .stages
        .iter()
        .zip(filters)
        .map(|(s, f)| StageModel {
            ratio: s.ratio,
            taps: f.into_taps(),
        })
        .collect();

    let max_input = block * down;
    let max_output = block * up;
    let buffers = buffer_layouts(&stages, max_input);

    for (i, (stage, layout)) in stages.iter().zip(&buffers).enumerate() {
        log::debug!(
            "Stage {}: {} with {} taps, input buffer past {} size {}",
            i,
            stage.ratio,
            stage.kernel_len(),
            layout.past,
            layout.size
        );
    }

    Ok(Plan {
        ratio,
        stages,
        buffers,
        max_input,
        max_output,
    })
}

/// Design every filter `spec` needs so later converters find them cached
pub fn cache_design(cache: &mut FilterCache, spec: &ConverterSpec) -> Result<()> {
    design_plan(Some(cache), spec, &DesignOptions::default()).map(|_| ())
}
