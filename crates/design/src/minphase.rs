// Minimum-phase reconstruction through the real cepstrum

use polysrc_core::{ResampleError, Result};
use realfft::num_complex::Complex;
use realfft::RealFftPlanner;

/// Transform size per tap; the cepstrum aliases less with more
const OVERSAMPLE: usize = 32;

fn fft_error(e: realfft::FftError) -> ResampleError {
    ResampleError::External(e.to_string())
}

/// Minimum-phase filter with the magnitude response of `taps`, truncated to
/// the same length.
pub fn minimum_phase(taps: &[f64]) -> Result<Vec<f64>> {
    let n = taps.len();
    if n < 2 {
        return Ok(taps.to_vec());
    }

    let len = (n * OVERSAMPLE).next_power_of_two();
    let scale = 1.0 / len as f64;
    let mut planner = RealFftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(len);
    let inverse = planner.plan_fft_inverse(len);

    let mut x = forward.make_input_vec();
    let mut spectrum = forward.make_output_vec();
    x[..n].copy_from_slice(taps);
    forward.process(&mut x, &mut spectrum).map_err(fft_error)?;

    // log magnitude; stopband zeros are floored so the log stays finite
    for bin in spectrum.iter_mut() {
        let power = bin.norm_sqr().max(f64::MIN_POSITIVE);
        *bin = Complex::new(0.5 * power.ln() * scale, 0.0);
    }
    inverse.process(&mut spectrum, &mut x).map_err(fft_error)?;

    // fold the real cepstrum onto positive quefrencies
    let half = len / 2;
    for c in &mut x[1..half] {
        *c *= 2.0;
    }
    for c in &mut x[half + 1..] {
        *c = 0.0;
    }

    forward.process(&mut x, &mut spectrum).map_err(fft_error)?;
    for bin in spectrum.iter_mut() {
        let magnitude = bin.re.exp() * scale;
        *bin = Complex::from_polar(magnitude, bin.im);
    }
    // realfft rejects non-zero imaginary parts at DC and Nyquist
    spectrum[0].im = 0.0;
    spectrum[half].im = 0.0;
    inverse.process(&mut spectrum, &mut x).map_err(fft_error)?;

    Ok(x[..n].to_vec())
}
