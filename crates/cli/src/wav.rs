// WAV file access in the converter's sample formats

use hound::{SampleFormat as WavFormat, WavReader, WavSpec, WavWriter};
use polysrc_core::{Samples, SamplesMut};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// How samples of a WAV file are held in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmFormat {
    U8,
    I16,
    /// 24 or 32 bit, left-aligned to full i32 scale
    I32 { shift: u32 },
    F32,
}

impl PcmFormat {
    pub fn from_spec(spec: &WavSpec) -> Result<Self, hound::Error> {
        match (spec.sample_format, spec.bits_per_sample) {
            (WavFormat::Int, 8) => Ok(PcmFormat::U8),
            (WavFormat::Int, 16) => Ok(PcmFormat::I16),
            (WavFormat::Int, bits @ 17..=32) => Ok(PcmFormat::I32 {
                shift: 32 - bits as u32,
            }),
            (WavFormat::Float, 32) => Ok(PcmFormat::F32),
            _ => Err(hound::Error::Unsupported),
        }
    }
}

/// Interleaved sample storage
pub enum PcmBuffer {
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
}

impl PcmBuffer {
    pub fn new(format: PcmFormat, len: usize) -> Self {
        match format {
            PcmFormat::U8 => PcmBuffer::U8(vec![128; len]),
            PcmFormat::I16 => PcmBuffer::I16(vec![0; len]),
            PcmFormat::I32 { .. } => PcmBuffer::I32(vec![0; len]),
            PcmFormat::F32 => PcmBuffer::F32(vec![0.0; len]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PcmBuffer::U8(v) => v.len(),
            PcmBuffer::I16(v) => v.len(),
            PcmBuffer::I32(v) => v.len(),
            PcmBuffer::F32(v) => v.len(),
        }
    }

    pub fn samples(&self, len: usize) -> Samples<'_> {
        match self {
            PcmBuffer::U8(v) => Samples::U8(&v[..len]),
            PcmBuffer::I16(v) => Samples::I16(&v[..len]),
            PcmBuffer::I32(v) => Samples::I32(&v[..len]),
            PcmBuffer::F32(v) => Samples::F32(&v[..len]),
        }
    }

    pub fn samples_mut(&mut self) -> SamplesMut<'_> {
        match self {
            PcmBuffer::U8(v) => SamplesMut::U8(v),
            PcmBuffer::I16(v) => SamplesMut::I16(v),
            PcmBuffer::I32(v) => SamplesMut::I32(v),
            PcmBuffer::F32(v) => SamplesMut::F32(v),
        }
    }

    /// Drop the first `n` samples of the first `len`, moving the rest down
    pub fn shift(&mut self, n: usize, len: usize) {
        match self {
            PcmBuffer::U8(v) => v.copy_within(n..len, 0),
            PcmBuffer::I16(v) => v.copy_within(n..len, 0),
            PcmBuffer::I32(v) => v.copy_within(n..len, 0),
            PcmBuffer::F32(v) => v.copy_within(n..len, 0),
        }
    }
}

fn fill<S, T>(
    reader: &mut WavReader<BufReader<File>>,
    dst: &mut [T],
    convert: impl Fn(S) -> T,
) -> Result<usize, hound::Error>
where
    S: hound::Sample,
{
    let mut count = 0;
    for (slot, sample) in dst.iter_mut().zip(reader.samples::<S>()) {
        *slot = convert(sample?);
        count += 1;
    }
    Ok(count)
}

pub struct WavInput {
    reader: WavReader<BufReader<File>>,
    format: PcmFormat,
}

impl WavInput {
    pub fn open(path: &Path) -> Result<Self, hound::Error> {
        let reader = WavReader::open(path)?;
        let format = PcmFormat::from_spec(&reader.spec())?;
        Ok(Self { reader, format })
    }

    pub fn spec(&self) -> WavSpec {
        self.reader.spec()
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Read into `buf[start..]`; returns the number of samples read
    pub fn read(&mut self, buf: &mut PcmBuffer, start: usize) -> Result<usize, hound::Error> {
        let reader = &mut self.reader;
        match (buf, self.format) {
            (PcmBuffer::U8(v), _) => fill(reader, &mut v[start..], |s: i8| (s as i16 + 128) as u8),
            (PcmBuffer::I16(v), _) => fill(reader, &mut v[start..], |s: i16| s),
            (PcmBuffer::I32(v), PcmFormat::I32 { shift }) => {
                fill(reader, &mut v[start..], |s: i32| s << shift)
            }
            (PcmBuffer::F32(v), _) => fill(reader, &mut v[start..], |s: f32| s),
            _ => Err(hound::Error::Unsupported),
        }
    }
}

pub struct WavOutput {
    writer: WavWriter<BufWriter<File>>,
    format: PcmFormat,
}

impl WavOutput {
    pub fn create(path: &Path, spec: WavSpec) -> Result<Self, hound::Error> {
        let format = PcmFormat::from_spec(&spec)?;
        let writer = WavWriter::create(path, spec)?;
        Ok(Self { writer, format })
    }

    /// Write the first `len` samples of `buf`
    pub fn write(&mut self, buf: &PcmBuffer, len: usize) -> Result<(), hound::Error> {
        match (buf, self.format) {
            (PcmBuffer::U8(v), _) => {
                for &s in &v[..len] {
                    self.writer.write_sample((s as i16 - 128) as i8)?;
                }
            }
            (PcmBuffer::I16(v), _) => {
                for &s in &v[..len] {
                    self.writer.write_sample(s)?;
                }
            }
            (PcmBuffer::I32(v), PcmFormat::I32 { shift }) => {
                for &s in &v[..len] {
                    self.writer.write_sample(s >> shift)?;
                }
            }
            (PcmBuffer::F32(v), _) => {
                for &s in &v[..len] {
                    self.writer.write_sample(s)?;
                }
            }
            _ => return Err(hound::Error::Unsupported),
        }
        Ok(())
    }

    pub fn finalize(self) -> Result<(), hound::Error> {
        self.writer.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn spec(bits: u16, sample_format: WavFormat) -> WavSpec {
        WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: bits,
            sample_format,
        }
    }

    #[rstest]
    #[case(spec(8, WavFormat::Int), Some(PcmFormat::U8))]
    #[case(spec(16, WavFormat::Int), Some(PcmFormat::I16))]
    #[case(spec(24, WavFormat::Int), Some(PcmFormat::I32 { shift: 8 }))]
    #[case(spec(32, WavFormat::Int), Some(PcmFormat::I32 { shift: 0 }))]
    #[case(spec(32, WavFormat::Float), Some(PcmFormat::F32))]
    #[case(spec(64, WavFormat::Float), None)]
    fn formats(#[case] spec: WavSpec, #[case] expected: Option<PcmFormat>) {
        assert_eq!(PcmFormat::from_spec(&spec).ok(), expected);
    }

    #[test]
    fn samples_survive_a_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("x.wav");
        let spec = spec(24, WavFormat::Int);

        let mut buf = PcmBuffer::new(PcmFormat::I32 { shift: 8 }, 4);
        if let PcmBuffer::I32(v) = &mut buf {
            v.copy_from_slice(&[1 << 8, i32::MIN, 0x7fff_ff00, 0]);
        }
        let mut out = WavOutput::create(&path, spec).unwrap();
        out.write(&buf, 4).unwrap();
        out.finalize().unwrap();

        let mut input = WavInput::open(&path).unwrap();
        assert_eq!(input.spec(), spec);
        let mut back = PcmBuffer::new(input.format(), 6);
        assert_eq!(input.read(&mut back, 1).unwrap(), 4);
        match back {
            PcmBuffer::I32(v) => assert_eq!(v, [0, 1 << 8, i32::MIN, 0x7fff_ff00, 0, 0]),
            _ => panic!("wrong buffer kind"),
        }
    }
}
