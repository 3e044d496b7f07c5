// Cost-driven split of a resampling ratio into pipeline stages

use crate::factorize::Factorizations;
use crate::rational::Rational;
use polysrc_core::{Ratio, ResampleError, Result};

/// Upper limit on pipeline length
pub const MAX_STAGES: usize = 6;

/// How many stages the decomposition may choose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StagePolicy {
    /// The cheaper of the single-stage and the best three-stage design
    #[default]
    OneOrThree,
    /// The cheapest design of any length
    Cheapest,
    /// The cheapest design with at most this many stages
    AtMost(usize),
}

/// One stage of a decomposition, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagePlan {
    pub ratio: Ratio,
    /// Normalised to the Nyquist frequency of the interpolated rate
    pub passband_edge: f64,
    pub stopband_edge: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    /// Reduced overall ratio
    pub ratio: Ratio,
    pub stages: Vec<StagePlan>,
    pub cost: f64,
}

/// Approximate multiply-adds per unit time of a decimation chain over
/// `num/den`, with the passband ending at `den * bandwidth / 2`.
pub fn cost(factors: &[Rational], num: u32, den: u32, bandwidth: f64) -> f64 {
    let fp = den as f64 * (1.0 + bandwidth);
    let mut fi = num as u64;
    let mut c = 0.0;
    for q in factors {
        let fo = fi / q.num as u64 * q.den as u64;
        c += (fi * fo) as f64 / (2.0 * fi.min(fo) as f64 - fp);
        fi = fo;
    }
    debug_assert_eq!(fi, den as u64);
    c
}

/// Split `ratio` into stages according to `policy`.
pub fn decompose(
    ratio: Ratio,
    bandwidth: f64,
    max_stages: usize,
    policy: StagePolicy,
) -> Result<Decomposition> {
    if ratio.up == 0 || ratio.down == 0 {
        return Err(ResampleError::invalid(format!("invalid ratio {}", ratio)));
    }
    if !(bandwidth > 0.0 && bandwidth < 1.0) {
        return Err(ResampleError::invalid(format!(
            "bandwidth {} outside (0, 1)",
            bandwidth
        )));
    }
    if max_stages == 0 || max_stages > MAX_STAGES {
        return Err(ResampleError::invalid(format!(
            "stage limit {} outside 1..={}",
            max_stages, MAX_STAGES
        )));
    }

    let ratio = ratio.reduced();
    if ratio.is_identity() {
        return Err(ResampleError::invalid("1/1 needs no conversion"));
    }

    // Work in decimation terms: num > den
    let (num, den) = (ratio.up.max(ratio.down), ratio.up.min(ratio.down));

    let single = vec![Rational::new(num, den)];
    let mut levels: Vec<Option<(f64, Vec<Rational>)>> = vec![None; max_stages];
    levels[0] = Some((cost(&single, num, den, bandwidth), single));

    let limit = match policy {
        StagePolicy::OneOrThree => max_stages.min(3),
        StagePolicy::Cheapest => max_stages,
        StagePolicy::AtMost(n) => max_stages.min(n.max(1)),
    };

    if limit > 1 {
        for factors in Factorizations::new(num, den, limit) {
            let c = cost(&factors, num, den, bandwidth);
            let level = &mut levels[factors.len() - 1];
            if level.as_ref().map_or(true, |(best, _)| c < *best) {
                *level = Some((c, factors));
            }
        }
    }

    let candidates: Vec<usize> = match policy {
        StagePolicy::OneOrThree => vec![0, 2],
        _ => (0..limit).collect(),
    };
    let (best_cost, factors) = candidates
        .into_iter()
        .filter_map(|i| levels.get(i).cloned().flatten())
        .fold(None::<(f64, Vec<Rational>)>, |best, cand| match best {
            Some(b) if b.0 <= cand.0 => Some(b),
            _ => Some(cand),
        })
        .ok_or_else(|| ResampleError::internal("no decomposition found"))?;

    // Filter edges in decimation order
    let fs = den as f64;
    let fp = fs * bandwidth;
    let mut fi = num as u64;
    let mut stages = Vec::with_capacity(factors.len());
    for q in &factors {
        let fo = fi / q.num as u64 * q.den as u64;
        let fhi = (fi * q.den as u64) as f64;
        stages.push(StagePlan {
            ratio: Ratio {
                up: q.den,
                down: q.num,
            },
            passband_edge: fp / fhi,
            stopband_edge: (2.0 * fi.min(fo) as f64 - fs) / fhi,
        });
        fi = fo;
    }

    // Upsampling runs the decimation chain backwards
    if ratio.up > ratio.down {
        stages.reverse();
        for stage in &mut stages {
            stage.ratio = stage.ratio.inverse();
        }
    }

    log::debug!(
        "Decomposed {} into {} stage(s), cost {:.3}: {:?}",
        ratio,
        stages.len(),
        best_cost,
        stages.iter().map(|s| s.ratio.to_string()).collect::<Vec<_>>()
    );

    Ok(Decomposition {
        ratio,
        stages,
        cost: best_cost,
    })
}
