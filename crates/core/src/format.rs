// Sample formats and conversion to and from the processing precision

use num_traits::Float;
use std::fmt::Debug;

/// Processing precision of the converter pipeline
pub trait Real: Float + Default + Debug + Send + Sync + 'static {
    fn from_f64(v: f64) -> Self;
    fn into_f64(self) -> f64;
}

impl Real for f32 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn into_f64(self) -> f64 {
        self as f64
    }
}

impl Real for f64 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn into_f64(self) -> f64 {
        self
    }
}

/// External sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    I16,
    I32,
    F32,
    F64,
}

impl SampleFormat {
    pub fn bits(&self) -> u32 {
        match self {
            SampleFormat::U8 => 8,
            SampleFormat::I16 => 16,
            SampleFormat::I32 | SampleFormat::F32 => 32,
            SampleFormat::F64 => 64,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SampleFormat::F32 | SampleFormat::F64)
    }
}

/// Borrowed input samples, interleaved or one channel of a planar set
#[derive(Debug, Clone, Copy)]
pub enum Samples<'a> {
    U8(&'a [u8]),
    I16(&'a [i16]),
    I32(&'a [i32]),
    F32(&'a [f32]),
    F64(&'a [f64]),
}

/// Borrowed output samples
#[derive(Debug)]
pub enum SamplesMut<'a> {
    U8(&'a mut [u8]),
    I16(&'a mut [i16]),
    I32(&'a mut [i32]),
    F32(&'a mut [f32]),
    F64(&'a mut [f64]),
}

#[inline]
fn to_int(v: f64, bits: u32) -> f64 {
    let scale = (1u64 << (bits - 1)) as f64;
    (v * scale).clamp(-scale, scale - 1.0).trunc()
}

impl<'a> Samples<'a> {
    pub fn format(&self) -> SampleFormat {
        match self {
            Samples::U8(_) => SampleFormat::U8,
            Samples::I16(_) => SampleFormat::I16,
            Samples::I32(_) => SampleFormat::I32,
            Samples::F32(_) => SampleFormat::F32,
            Samples::F64(_) => SampleFormat::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Samples::U8(s) => s.len(),
            Samples::I16(s) => s.len(),
            Samples::I32(s) => s.len(),
            Samples::F32(s) => s.len(),
            Samples::F64(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert `out.len()` samples starting at `start`, stepping by `stride`
    pub fn read_into<T: Real>(&self, start: usize, stride: usize, out: &mut [T]) {
        macro_rules! gather {
            ($src:expr, $conv:expr) => {
                for (i, o) in out.iter_mut().enumerate() {
                    *o = T::from_f64($conv($src[start + i * stride]));
                }
            };
        }

        match self {
            Samples::U8(s) => gather!(s, |x: u8| (x as f64 - 128.0) / 128.0),
            Samples::I16(s) => gather!(s, |x: i16| x as f64 / 32768.0),
            Samples::I32(s) => gather!(s, |x: i32| x as f64 / 2147483648.0),
            Samples::F32(s) => gather!(s, |x: f32| x as f64),
            Samples::F64(s) => gather!(s, |x: f64| x),
        }
    }
}

impl<'a> SamplesMut<'a> {
    pub fn format(&self) -> SampleFormat {
        match self {
            SamplesMut::U8(_) => SampleFormat::U8,
            SamplesMut::I16(_) => SampleFormat::I16,
            SamplesMut::I32(_) => SampleFormat::I32,
            SamplesMut::F32(_) => SampleFormat::F32,
            SamplesMut::F64(_) => SampleFormat::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SamplesMut::U8(s) => s.len(),
            SamplesMut::I16(s) => s.len(),
            SamplesMut::I32(s) => s.len(),
            SamplesMut::F32(s) => s.len(),
            SamplesMut::F64(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reborrow for a shorter lifetime
    pub fn reborrow(&mut self) -> SamplesMut<'_> {
        match self {
            SamplesMut::U8(s) => SamplesMut::U8(s),
            SamplesMut::I16(s) => SamplesMut::I16(s),
            SamplesMut::I32(s) => SamplesMut::I32(s),
            SamplesMut::F32(s) => SamplesMut::F32(s),
            SamplesMut::F64(s) => SamplesMut::F64(s),
        }
    }

    /// Store `src` starting at `start`, stepping by `stride`. Integer
    /// formats clamp at full scale.
    pub fn write_from<T: Real>(&mut self, start: usize, stride: usize, src: &[T]) {
        macro_rules! scatter {
            ($dst:expr, $conv:expr) => {
                for (i, v) in src.iter().enumerate() {
                    $dst[start + i * stride] = $conv(v.into_f64());
                }
            };
        }

        match self {
            SamplesMut::U8(d) => scatter!(d, |v: f64| (to_int(v, 8) + 128.0) as u8),
            SamplesMut::I16(d) => scatter!(d, |v: f64| to_int(v, 16) as i16),
            SamplesMut::I32(d) => scatter!(d, |v: f64| to_int(v, 32) as i32),
            SamplesMut::F32(d) => scatter!(d, |v: f64| v as f32),
            SamplesMut::F64(d) => scatter!(d, |v: f64| v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Samples::U8(&[0, 128, 255]), [-1.0, 0.0, 127.0 / 128.0])]
    #[case(Samples::I16(&[i16::MIN, 0, 16384]), [-1.0, 0.0, 0.5])]
    #[case(Samples::I32(&[i32::MIN, 0, 1 << 30]), [-1.0, 0.0, 0.5])]
    #[case(Samples::F32(&[-2.0, 0.0, 0.25]), [-2.0, 0.0, 0.25])]
    fn input_scaling(#[case] input: Samples, #[case] expected: [f64; 3]) {
        let mut out = [0.0f64; 3];
        input.read_into(0, 1, &mut out);
        assert_eq!(out, expected);
    }

    #[test]
    fn output_clamps_at_full_scale() {
        let src = [1.5f64, -1.5, 1.0, -1.0, 0.0];

        let mut i16s = [0i16; 5];
        SamplesMut::I16(&mut i16s).write_from(0, 1, &src);
        assert_eq!(i16s, [32767, -32768, 32767, -32768, 0]);

        let mut u8s = [0u8; 5];
        SamplesMut::U8(&mut u8s).write_from(0, 1, &src);
        assert_eq!(u8s, [255, 0, 255, 0, 128]);

        let mut i32s = [0i32; 5];
        SamplesMut::I32(&mut i32s).write_from(0, 1, &src);
        assert_eq!(i32s, [i32::MAX, i32::MIN, i32::MAX, i32::MIN, 0]);
    }

    #[test]
    fn output_truncates_toward_zero() {
        let mut out = [0i16; 2];
        SamplesMut::I16(&mut out).write_from(0, 1, &[0.9 / 32768.0, -0.9 / 32768.0f64]);
        assert_eq!(out, [0, 0]);
    }

    #[test]
    fn floats_pass_through() {
        let mut out = [0.0f32; 2];
        SamplesMut::F32(&mut out).write_from(0, 1, &[2.5f64, -3.0]);
        assert_eq!(out, [2.5, -3.0]);
    }

    #[test]
    fn strided_access() {
        let interleaved = [1i16, 2, 3, 4, 5, 6];
        let mut right = [0.0f32; 3];
        Samples::I16(&interleaved).read_into(1, 2, &mut right);
        assert_eq!(right, [2.0 / 32768.0, 4.0 / 32768.0, 6.0 / 32768.0]);

        let mut out = [0.0f64; 4];
        SamplesMut::F64(&mut out).write_from(1, 2, &[7.0f32, 8.0]);
        assert_eq!(out, [0.0, 7.0, 0.0, 8.0]);
    }
}
