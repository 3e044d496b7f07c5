// Frequency-domain overlap-save resampling

use super::{Precision, Stage, StageStatus};
use polysrc_buffer::{BufferLayout, SampleBuffer};
use polysrc_core::{Ratio, Real, ResampleError, Result};
use polysrc_design::StageModel;
use realfft::num_complex::Complex;
use realfft::num_traits::Zero;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::FftPlanner;
use std::sync::Arc;

fn is_smooth(mut n: usize) -> bool {
    for p in [2, 3, 5, 7] {
        while n % p == 0 {
            n /= p;
        }
    }
    n == 1
}

/// Smallest transform size `>= n` with no prime factor above 7
pub fn fft_size(n: usize) -> usize {
    let mut size = n.max(1);
    while !is_smooth(size) {
        size += 1;
    }
    size
}

fn fft_error(e: realfft::FftError) -> ResampleError {
    ResampleError::External(e.to_string())
}

/// Block convolution for `up/down` resampling with one FFT pair per block.
///
/// A block of `N = K * down` samples (history included) is transformed
/// once. Upsampling is the periodic extension of that spectrum to length
/// `L = N * up`, filtering is a product with the kernel spectrum and
/// decimation folds the `down` copies of length `M = K * up` into one.
/// The kernel is rotated left by `past * up` so the first output lines up
/// with the first unread input, as in the polyphase stage.
pub struct OverlapSave<T> {
    ratio: Ratio,
    kernel_len: usize,
    /// Whole input buffer, history included
    block: usize,
    /// Input samples consumed per block
    step: usize,
    /// Output samples produced per block
    out_len: usize,
    n: usize,
    m: usize,
    /// Kernel spectrum over the full upsampled length
    filter: Vec<Complex<T>>,
    forward: Arc<dyn RealToComplex<T>>,
    inverse: Arc<dyn ComplexToReal<T>>,
    x: Vec<T>,
    x_half: Vec<Complex<T>>,
    x_full: Vec<Complex<T>>,
    y_half: Vec<Complex<T>>,
    y: Vec<T>,
    scratch: Vec<Complex<T>>,
}

impl<T: Precision> OverlapSave<T> {
    pub fn new(model: &StageModel, src: BufferLayout) -> Result<Self> {
        let ratio = model.ratio;
        let up = ratio.up as usize;
        let down = ratio.down as usize;
        let kernel_len = model.kernel_len();
        if up == 0 || down == 0 || kernel_len == 0 {
            return Err(ResampleError::invalid(format!(
                "overlap-save stage needs a ratio and taps, got {} with {} taps",
                ratio, kernel_len
            )));
        }
        let history = kernel_len.div_ceil(up) - 1;
        if src.past < history {
            return Err(ResampleError::invalid(format!(
                "input history {} is shorter than the {} samples the kernel needs",
                src.past, history
            )));
        }
        let step = src.size - src.past;
        if step % down != 0 {
            return Err(ResampleError::invalid(format!(
                "block of {} samples is not a multiple of the decimation {}",
                step, down
            )));
        }

        let k = fft_size(src.size.div_ceil(down));
        let n = k * down;
        let m = k * up;
        let l = n * up;

        // rotate by the history, scale for the unnormalised transforms
        let shift = src.past * up;
        let scale = up as f64 / l as f64;
        let mut kernel = vec![Complex::<f64>::zero(); l];
        for (i, &h) in model.taps.iter().enumerate() {
            kernel[(i + l - shift) % l] = Complex::new(h * scale, 0.0);
        }
        FftPlanner::<f64>::new().plan_fft_forward(l).process(&mut kernel);
        let filter = kernel
            .iter()
            .map(|c| Complex::new(<T as Real>::from_f64(c.re), <T as Real>::from_f64(c.im)))
            .collect();

        let mut planner = RealFftPlanner::<T>::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(m);
        let scratch_len = forward.get_scratch_len().max(inverse.get_scratch_len());

        log::debug!(
            "Overlap-save {}: {} taps, K {}, transforms {} -> {}, {} in / {} out per block",
            ratio,
            kernel_len,
            k,
            n,
            m,
            step,
            step / down * up
        );

        Ok(Self {
            ratio,
            kernel_len,
            block: src.size,
            step,
            out_len: step / down * up,
            n,
            m,
            filter,
            x: forward.make_input_vec(),
            x_half: forward.make_output_vec(),
            x_full: vec![Complex::zero(); n],
            y_half: inverse.make_input_vec(),
            y: inverse.make_output_vec(),
            scratch: vec![Complex::zero(); scratch_len],
            forward,
            inverse,
        })
    }

    /// Samples consumed and produced by one block
    pub fn block_io(&self) -> (usize, usize) {
        (self.step, self.out_len)
    }

    fn convolve(&mut self, input: &[T]) -> Result<()> {
        let (n, m) = (self.n, self.m);
        let down = self.ratio.down as usize;

        self.x[..self.block].copy_from_slice(input);
        self.x[self.block..].fill(T::zero());
        self.forward
            .process_with_scratch(&mut self.x, &mut self.x_half, &mut self.scratch)
            .map_err(fft_error)?;

        // conjugate-symmetric completion of the real spectrum
        let half = n / 2;
        self.x_full[..=half].copy_from_slice(&self.x_half);
        for i in half + 1..n {
            self.x_full[i] = self.x_half[n - i].conj();
        }

        for (bin, y) in self.y_half.iter_mut().enumerate() {
            let mut acc = Complex::zero();
            let mut i = bin;
            for _ in 0..down {
                acc = acc + self.filter[i] * self.x_full[i % n];
                i += m;
            }
            *y = acc;
        }
        // the inverse real transform requires real DC and Nyquist bins
        self.y_half[0].im = T::zero();
        if m % 2 == 0 {
            self.y_half[m / 2].im = T::zero();
        }

        self.inverse
            .process_with_scratch(&mut self.y_half, &mut self.y, &mut self.scratch)
            .map_err(fft_error)
    }
}

impl<T: Precision> Stage<T> for OverlapSave<T> {
    fn process(&mut self, src: &mut SampleBuffer<T>, dst: &mut SampleBuffer<T>) -> Result<StageStatus> {
        if !src.is_full() {
            return Ok(StageStatus::InputEmpty);
        }
        if dst.available_write() < self.out_len {
            return Ok(StageStatus::OutputFull);
        }

        for ch in 0..src.channels() {
            self.convolve(src.channel(ch))?;
            dst.spare_mut(ch)[..self.out_len].copy_from_slice(&self.y[..self.out_len]);
        }

        src.consume(self.step);
        dst.commit(self.out_len);
        Ok(StageStatus::Progress)
    }

    fn reset(&mut self) {
        self.x.fill(T::zero());
        self.y.fill(T::zero());
    }

    fn ratio(&self) -> Ratio {
        self.ratio
    }

    fn kernel_len(&self) -> usize {
        self.kernel_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 1)]
    #[case(11, 12)]
    #[case(13, 14)]
    #[case(97, 98)]
    #[case(121, 125)]
    #[case(210, 210)]
    fn sizes_are_7_smooth(#[case] n: usize, #[case] expected: usize) {
        assert_eq!(fft_size(n), expected);
    }

    #[test]
    fn impulse_returns_the_kernel() {
        // x2 with a 4-tap kernel; the impulse sits at the first unread input
        let taps = [0.1, 0.2, 0.3, 0.4];
        let model = StageModel {
            ratio: Ratio { up: 2, down: 1 },
            taps: taps.to_vec(),
        };
        let layout = BufferLayout { past: 1, size: 9 };
        let mut stage = OverlapSave::<f64>::new(&model, layout).unwrap();
        assert_eq!(stage.block_io(), (8, 16));

        let mut src = SampleBuffer::new(1, layout).unwrap();
        let mut dst = SampleBuffer::new(1, BufferLayout { past: 0, size: 16 }).unwrap();
        src.spare_mut(0)[0] = 1.0;
        src.commit(8);

        assert_eq!(stage.process(&mut src, &mut dst).unwrap(), StageStatus::Progress);
        let out = dst.channel(0);
        for (i, &v) in out.iter().enumerate() {
            let expected = taps.get(i).map_or(0.0, |h| h * 2.0);
            assert!((v - expected).abs() < 1e-12, "{}: {} vs {}", i, v, expected);
        }
        assert_eq!(stage.process(&mut src, &mut dst).unwrap(), StageStatus::InputEmpty);
    }

    #[test]
    fn waits_for_a_whole_block_and_room() {
        let model = StageModel {
            ratio: Ratio { up: 1, down: 2 },
            taps: vec![0.5, 0.5],
        };
        let layout = BufferLayout { past: 1, size: 5 };
        let mut stage = OverlapSave::<f32>::new(&model, layout).unwrap();
        let mut src = SampleBuffer::new(1, layout).unwrap();
        let mut dst = SampleBuffer::new(1, BufferLayout { past: 0, size: 3 }).unwrap();

        src.commit(3);
        assert_eq!(stage.process(&mut src, &mut dst).unwrap(), StageStatus::InputEmpty);
        src.commit(1);
        dst.commit(2);
        assert_eq!(stage.process(&mut src, &mut dst).unwrap(), StageStatus::OutputFull);
        dst.consume(2);
        assert_eq!(stage.process(&mut src, &mut dst).unwrap(), StageStatus::Progress);
        assert_eq!(dst.available_read(), 2);
    }

    #[test]
    fn odd_block_rejected() {
        let model = StageModel {
            ratio: Ratio { up: 2, down: 3 },
            taps: vec![1.0; 5],
        };
        assert!(OverlapSave::<f64>::new(&model, BufferLayout { past: 2, size: 10 }).is_err());
        assert!(OverlapSave::<f64>::new(&model, BufferLayout { past: 2, size: 11 }).is_ok());
    }
}
