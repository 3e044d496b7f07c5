// Lowpass FIR synthesis

use crate::minphase::minimum_phase;
use polysrc_core::{FilterCoefs, FilterSpec, ResampleError, Result};
use realfft::RealFftPlanner;
use std::f64::consts::PI;

/// Turns a filter specification into taps
pub trait LowpassDesign: Send + Sync {
    fn design(&self, spec: &FilterSpec) -> Result<FilterCoefs>;
}

/// Kaiser-window design. The length starts at Kaiser's estimate and grows
/// until the response, checked on a dense grid, meets both ripple bounds.
#[derive(Debug, Clone)]
pub struct KaiserDesigner {
    pub max_iterations: usize,
    /// Frequency grid points per tap used for verification
    pub grid_density: usize,
    pub max_taps: usize,
}

impl Default for KaiserDesigner {
    fn default() -> Self {
        Self {
            max_iterations: 40,
            grid_density: 16,
            max_taps: 1 << 22,
        }
    }
}

/// Worst deviations of a response from its ideal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseError {
    pub passband: f64,
    pub stopband: f64,
}

/// Length estimate for an optimal equiripple lowpass (Herrmann et al.)
pub fn estimate_len(transition: f64, passband_ripple: f64, stopband_ripple: f64) -> usize {
    let l1 = passband_ripple.log10();
    let l2 = stopband_ripple.log10();
    let l11 = l1 * l1;
    let d = (5.309e-3 * l11 + 7.114e-2 * l1 - 4.761e-1) * l2 - 2.66e-3 * l11 - 5.941e-1 * l1 - 4.278e-1;
    (2.0 * d / transition + 1.0).ceil() as usize
}

fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut sum = 1.0;
    let mut term = 1.0;
    for k in 1..500 {
        let r = half / k as f64;
        term *= r * r;
        sum += term;
        if term < sum * 1e-21 {
            break;
        }
    }
    sum
}

fn kaiser_beta(attenuation: f64) -> f64 {
    if attenuation > 50.0 {
        0.1102 * (attenuation - 8.7)
    } else if attenuation >= 21.0 {
        0.5842 * (attenuation - 21.0).powf(0.4) + 0.07886 * (attenuation - 21.0)
    } else {
        0.0
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Windowed-sinc lowpass of length `n` with cutoff `fc` (1 = Nyquist)
fn kaiser_lowpass(n: usize, fc: f64, beta: f64) -> Vec<f64> {
    let centre = (n - 1) as f64 / 2.0;
    let norm = bessel_i0(beta);
    (0..n)
        .map(|i| {
            let t = i as f64 - centre;
            let r = if centre > 0.0 { t / centre } else { 0.0 };
            let w = bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / norm;
            fc * sinc(fc * t) * w
        })
        .collect()
}

/// Largest passband and stopband deviation of `taps`, sampled on a grid of
/// at least `density` points per tap.
pub fn response_error(taps: &[f64], spec: &FilterSpec, density: usize) -> Result<ResponseError> {
    let len = (taps.len() * density.max(2)).max(8192).next_power_of_two();
    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(len);
    let mut input = fft.make_input_vec();
    input[..taps.len()].copy_from_slice(taps);
    let mut spectrum = fft.make_output_vec();
    fft.process(&mut input, &mut spectrum)
        .map_err(|e| ResampleError::External(e.to_string()))?;

    let mut err = ResponseError {
        passband: 0.0,
        stopband: 0.0,
    };
    for (k, bin) in spectrum.iter().enumerate() {
        let f = 2.0 * k as f64 / len as f64;
        let mag = bin.norm();
        if f <= spec.passband_edge {
            err.passband = err.passband.max((mag - 1.0).abs());
        } else if f >= spec.stopband_edge {
            err.stopband = err.stopband.max(mag);
        }
    }
    Ok(err)
}

pub(crate) fn check_spec(spec: &FilterSpec) -> Result<()> {
    let edges_ok = spec.passband_edge > 0.0
        && spec.passband_edge < spec.stopband_edge
        && spec.stopband_edge.is_finite();
    let ripples_ok = spec.passband_ripple > 0.0
        && spec.passband_ripple < 1.0
        && spec.stopband_ripple > 0.0
        && spec.stopband_ripple < 1.0;
    if edges_ok && ripples_ok {
        Ok(())
    } else {
        Err(ResampleError::invalid(format!("unrealisable filter {:?}", spec)))
    }
}

fn kaiser_len(attenuation: f64, transition: f64) -> usize {
    ((attenuation - 7.95) / (2.285 * PI * transition)).ceil() as usize + 1
}

impl LowpassDesign for KaiserDesigner {
    fn design(&self, spec: &FilterSpec) -> Result<FilterCoefs> {
        check_spec(spec)?;

        let delta = spec.passband_ripple.min(spec.stopband_ripple);
        let transition = spec.stopband_edge - spec.passband_edge;
        let fc = (spec.passband_edge + spec.stopband_edge) / 2.0;

        let mut attenuation = -20.0 * delta.log10();
        let mut n = kaiser_len(attenuation, transition)
            .max(estimate_len(transition, spec.passband_ripple, spec.stopband_ripple))
            .max(3);

        for iteration in 0..self.max_iterations {
            if n > self.max_taps {
                return Err(ResampleError::invalid(format!(
                    "filter needs more than {} taps",
                    self.max_taps
                )));
            }

            let taps = kaiser_lowpass(n, fc, kaiser_beta(attenuation));
            let err = response_error(&taps, spec, self.grid_density)?;
            let excess = (err.passband / spec.passband_ripple).max(err.stopband / spec.stopband_ripple);
            if excess <= 1.0 {
                log::debug!(
                    "Designed {} taps after {} iteration(s): passband {:.3e}, stopband {:.3e}",
                    n,
                    iteration + 1,
                    err.passband,
                    err.stopband
                );
                let taps = if spec.is_minimum_phase() {
                    minimum_phase(&taps)?
                } else {
                    taps
                };
                return Ok(FilterCoefs::new(taps));
            }

            log::trace!(
                "{} taps miss the bounds: passband {:.3e}, stopband {:.3e}",
                n,
                err.passband,
                err.stopband
            );
            // the window shape sets the ripple, the length sets the transition
            attenuation += (20.0 * excess.log10()).max(0.5);
            n = kaiser_len(attenuation, transition).max(n + (n / 25).max(2));
        }

        Err(ResampleError::NotConverged {
            iterations: self.max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polysrc_core::FILTER_MINIMUM_PHASE;
    use rstest::rstest;

    fn spec(fp: f64, fs: f64, dp: f64, ds: f64) -> FilterSpec {
        FilterSpec {
            passband_edge: fp,
            stopband_edge: fs,
            passband_ripple: dp,
            stopband_ripple: ds,
            flags: 0,
        }
    }

    // direct evaluation, independent of the designer's grid
    fn magnitude(taps: &[f64], f: f64) -> f64 {
        let w = PI * f;
        let (re, im) = taps.iter().enumerate().fold((0.0, 0.0), |(re, im), (n, &h)| {
            (re + h * (w * n as f64).cos(), im - h * (w * n as f64).sin())
        });
        (re * re + im * im).sqrt()
    }

    #[test]
    fn bessel_matches_known_values() {
        assert!((bessel_i0(0.0) - 1.0).abs() < 1e-15);
        assert!((bessel_i0(1.0) - 1.266_065_877_752_008_4).abs() < 1e-12);
    }

    #[rstest]
    #[case(spec(0.2, 0.3, 1e-3, 1e-4))]
    #[case(spec(0.45, 0.5, 1e-4, 1e-5))]
    #[case(spec(0.05, 0.1, 5e-5, 1e-6))]
    fn meets_bounds(#[case] spec: FilterSpec) {
        let taps = KaiserDesigner::default().design(&spec).unwrap().taps;
        for i in 0..=2000 {
            let f = i as f64 / 2000.0;
            let mag = magnitude(&taps, f);
            if f <= spec.passband_edge {
                assert!((mag - 1.0).abs() <= spec.passband_ripple * 1.05, "f={} mag={}", f, mag);
            } else if f >= spec.stopband_edge {
                assert!(mag <= spec.stopband_ripple * 1.05, "f={} mag={}", f, mag);
            }
        }
        // linear phase
        let n = taps.len();
        for i in 0..n / 2 {
            assert!((taps[i] - taps[n - 1 - i]).abs() < 1e-15);
        }
    }

    #[test]
    fn tighter_specs_need_more_taps() {
        let d = KaiserDesigner::default();
        let loose = d.design(&spec(0.2, 0.3, 1e-2, 1e-3)).unwrap();
        let tight = d.design(&spec(0.2, 0.3, 1e-4, 1e-7)).unwrap();
        let narrow = d.design(&spec(0.2, 0.22, 1e-2, 1e-3)).unwrap();
        assert!(tight.len() > loose.len());
        assert!(narrow.len() > loose.len());
    }

    #[test]
    fn minimum_phase_front_loads_energy() {
        let mut s = spec(0.2, 0.3, 1e-3, 1e-4);
        let linear = KaiserDesigner::default().design(&s).unwrap().taps;
        s.flags = FILTER_MINIMUM_PHASE;
        let minphase = KaiserDesigner::default().design(&s).unwrap().taps;
        assert_eq!(linear.len(), minphase.len());

        let energy = |t: &[f64]| t.iter().map(|v| v * v).sum::<f64>();
        let quarter = linear.len() / 4;
        let front_min = energy(&minphase[..quarter]) / energy(&minphase);
        let front_lin = energy(&linear[..quarter]) / energy(&linear);
        assert!(front_min > 0.8, "{}", front_min);
        assert!(front_min > front_lin);

        // same magnitude response
        for f in [0.0, 0.1, 0.19] {
            assert!((magnitude(&minphase, f) - 1.0).abs() < 1e-2);
        }
    }

    #[test]
    fn unrealisable_spec_rejected() {
        let d = KaiserDesigner::default();
        assert!(matches!(
            d.design(&spec(0.3, 0.2, 1e-3, 1e-3)),
            Err(ResampleError::InvalidArgument(_))
        ));
        assert!(d.design(&spec(0.1, 0.2, 0.0, 1e-3)).is_err());
    }

    #[test]
    fn too_long_filter_rejected() {
        let d = KaiserDesigner {
            max_taps: 64,
            ..KaiserDesigner::default()
        };
        assert!(matches!(
            d.design(&spec(0.2, 0.201, 1e-3, 1e-4)),
            Err(ResampleError::InvalidArgument(_))
        ));
    }

    #[test]
    fn gives_up_after_max_iterations() {
        let d = KaiserDesigner {
            max_iterations: 0,
            ..KaiserDesigner::default()
        };
        assert!(matches!(
            d.design(&spec(0.2, 0.3, 1e-3, 1e-4)),
            Err(ResampleError::NotConverged { iterations: 0 })
        ));
    }
}
