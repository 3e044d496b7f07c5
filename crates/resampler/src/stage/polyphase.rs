// Time-domain polyphase resampling

use super::{Precision, Stage, StageStatus};
use polysrc_buffer::{BufferLayout, SampleBuffer};
use polysrc_core::{Ratio, Real, ResampleError, Result};
use polysrc_design::StageModel;

/// One subfilter of the bank plus its transition
struct Phase<T> {
    /// Time-reversed taps, pre-scaled by the interpolation factor
    taps: Vec<T>,
    /// Input samples to advance after this phase
    advance: usize,
    /// Phase of the following output
    next: usize,
}

/// Polyphase filter bank for `up/down` resampling.
///
/// Output `j` sits at interpolated position `phase + j * down` relative to
/// the first unread input; the transition table walks that position without
/// dividing in the inner loop.
pub struct Polyphase<T> {
    ratio: Ratio,
    kernel_len: usize,
    phases: Vec<Phase<T>>,
    phase: usize,
}

impl<T: Precision> Polyphase<T> {
    pub fn new(model: &StageModel, src: BufferLayout) -> Result<Self> {
        let ratio = model.ratio;
        let l = ratio.up as usize;
        let m = ratio.down as usize;
        let n = model.kernel_len();
        if l == 0 || m == 0 || n == 0 {
            return Err(ResampleError::invalid(format!(
                "polyphase stage needs a ratio and taps, got {} with {} taps",
                ratio, n
            )));
        }
        let history = n.div_ceil(l) - 1;
        if src.past < history {
            return Err(ResampleError::invalid(format!(
                "input history {} is shorter than the {} samples the kernel needs",
                src.past, history
            )));
        }

        let h = &model.taps;
        let gain = l as f64;
        let phases = (0..l)
            .map(|phase| {
                let count = n.saturating_sub(phase).div_ceil(l);
                let taps = (0..count)
                    .map(|k| <T as Real>::from_f64(h[(count - k - 1) * l + phase] * gain))
                    .collect();
                Phase {
                    taps,
                    advance: (phase + m) / l,
                    next: (phase + m) % l,
                }
            })
            .collect();

        Ok(Self {
            ratio,
            kernel_len: n,
            phases,
            phase: 0,
        })
    }

    /// Outputs computable from `avail` inputs without moving the read
    /// cursor past them
    fn output_count(&self, avail: usize) -> usize {
        let l = self.ratio.up as usize;
        let m = self.ratio.down as usize;
        let reachable = (avail * l - self.phase).div_ceil(m);
        let bounded = ((avail + 1) * l - self.phase - 1) / m;
        reachable.min(bounded)
    }
}

impl<T: Precision> Stage<T> for Polyphase<T> {
    fn process(&mut self, src: &mut SampleBuffer<T>, dst: &mut SampleBuffer<T>) -> Result<StageStatus> {
        let avail = src.available_read();
        if avail == 0 {
            return Ok(StageStatus::InputEmpty);
        }
        let free = dst.available_write();
        if free == 0 {
            return Ok(StageStatus::OutputFull);
        }

        let dn = self.output_count(avail).min(free);
        if dn == 0 {
            return Ok(StageStatus::InputEmpty);
        }

        let l = self.ratio.up as usize;
        let m = self.ratio.down as usize;
        let total = dn * m + self.phase;
        let sn = total / l;
        let lr = total % l;
        debug_assert!(sn <= avail);

        for ch in 0..src.channels() {
            let x = src.channel(ch);
            let y = &mut dst.spare_mut(ch)[..dn];

            let mut k = src.past();
            let mut phase = self.phase;
            for out in y.iter_mut() {
                let p = &self.phases[phase];
                let start = k + 1 - p.taps.len();
                *out = p
                    .taps
                    .iter()
                    .zip(&x[start..=k])
                    .fold(T::zero(), |acc, (&c, &v)| acc + c * v);
                k += p.advance;
                phase = p.next;
            }
        }

        dst.commit(dn);
        src.consume(sn);
        self.phase = lr;
        Ok(StageStatus::Progress)
    }

    fn reset(&mut self) {
        self.phase = 0;
    }

    fn ratio(&self) -> Ratio {
        self.ratio
    }

    fn kernel_len(&self) -> usize {
        self.kernel_len
    }
}
