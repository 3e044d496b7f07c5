use polysrc_cache::{FilterCache, MemoryStore, OpenMode};
use polysrc_core::{FilterCoefs, FilterSpec};
use polysrc_design::LowpassDesign;
use polysrc_resampler::{
    ConverterSpec, ConverterState, Converter, DesignOptions, ProcessStatus, Quality, Ratio,
    ResampleError, Samples, SamplesMut,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::*;
use std::f64::consts::PI;
use std::sync::Arc;

/// 80 dB, 0.8 bandwidth: keeps filter design quick
fn spec(up: u32, down: u32, frequency_domain: bool, double_precision: bool) -> ConverterSpec {
    let mut spec = ConverterSpec::from_preset(Ratio { up, down }, Quality::Mq16);
    spec.passband_ripple = 1e-3;
    spec.stopband_ripple = 1e-4;
    spec.passband_width = 0.8;
    spec.max_input = 1024;
    spec.max_output = 1024;
    spec.flags.frequency_domain = frequency_domain;
    spec.flags.double_precision = double_precision;
    spec
}

/// Feed `input` in chunks of `chunk` frames, end the stream and collect
/// everything the converter emits
fn run(conv: &mut Converter, input: &[f64], chunk: usize) -> Vec<f64> {
    let channels = conv.channels();
    let mut buf = vec![0.0f64; conv.max_io().output * channels];
    let mut out = Vec::new();
    let mut fed = 0;
    let mut ended = false;

    for _ in 0..1_000_000 {
        if fed < input.len() {
            let end = (fed + chunk * channels).min(input.len());
            fed += conv.read(Samples::F64(&input[fed..end])) * channels;
        } else if !ended {
            conv.end().unwrap();
            ended = true;
        }

        let status = conv.process().unwrap();
        let n = conv.write(SamplesMut::F64(&mut buf));
        out.extend_from_slice(&buf[..n * channels]);
        if status == ProcessStatus::End {
            return out;
        }
    }
    panic!("converter never reached the end");
}

fn sine(freq: f64, rate: f64, amplitude: f64, frames: usize) -> Vec<f64> {
    (0..frames)
        .map(|i| amplitude * (2.0 * PI * freq * i as f64 / rate).sin())
        .collect()
}

fn noise(frames: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..frames).map(|_| rng.gen_range(-0.5..0.5)).collect()
}

#[rstest]
#[case(3, 2)]
#[case(2, 3)]
#[case(160, 147)]
#[case(147, 160)]
#[case(1, 4)]
fn polyphase_and_overlap_save_agree(#[case] up: u32, #[case] down: u32) {
    let input = noise(6000, 0x5eed);
    let mut time = Converter::new(None, &spec(up, down, false, true), 1).unwrap();
    let mut freq = Converter::new(None, &spec(up, down, true, true), 1).unwrap();
    assert_eq!(time.stage_ratios(), freq.stage_ratios());

    let a = run(&mut time, &input, 700);
    let b = run(&mut freq, &input, 333);
    let common = a.len().min(b.len());
    assert!(common >= input.len() * up as usize / down as usize);
    for i in 0..common {
        assert!((a[i] - b[i]).abs() < 1e-9, "sample {}: {} vs {}", i, a[i], b[i]);
    }
}

#[rstest]
#[case(true)]
#[case(false)]
fn sine_keeps_its_amplitude(#[case] frequency_domain: bool) {
    let input = sine(1000.0, 44100.0, 0.5, 22050);
    let mut conv = Converter::new(None, &spec(160, 147, frequency_domain, true), 1).unwrap();
    assert_eq!(conv.ratio(), Ratio { up: 160, down: 147 });
    let out = run(&mut conv, &input, 512);
    assert!(out.len() >= 24000);

    // 48 output samples per period; fit away from both edges
    let window = &out[4800..4800 + 48 * 200];
    let (mut s, mut c) = (0.0, 0.0);
    for (i, y) in window.iter().enumerate() {
        let w = 2.0 * PI * (4800 + i) as f64 / 48.0;
        s += y * w.sin();
        c += y * w.cos();
    }
    let (s, c) = (2.0 * s / window.len() as f64, 2.0 * c / window.len() as f64);
    let amplitude = (s * s + c * c).sqrt();
    assert!((amplitude - 0.5).abs() < 5e-3, "amplitude {}", amplitude);

    let residual = window
        .iter()
        .enumerate()
        .map(|(i, y)| {
            let w = 2.0 * PI * (4800 + i) as f64 / 48.0;
            let e = y - s * w.sin() - c * w.cos();
            e * e
        })
        .sum::<f64>()
        / window.len() as f64;
    assert!(residual.sqrt() < 1e-3, "residual {}", residual.sqrt());
}

#[rstest]
#[case(true)]
#[case(false)]
fn tone_above_new_nyquist_is_suppressed(#[case] frequency_domain: bool) {
    // 23 kHz lies in the stopband when going from 48 kHz to 44.1 kHz
    let s = spec(147, 160, frequency_domain, true);
    let input = sine(23000.0, 48000.0, 0.5, 48000);
    let mut conv = Converter::new(None, &s, 1).unwrap();
    let out = run(&mut conv, &input, 1000);
    assert!(out.len() >= 44100);

    let steady = &out[2000..out.len() - 2000];
    let peak = steady.iter().fold(0.0f64, |m, y| m.max(y.abs()));
    assert!(peak < 0.5 * s.stopband_ripple, "peak {}", peak);
}

#[rstest]
fn end_flushes_a_bounded_tail_then_stops() {
    let mut conv = Converter::new(None, &spec(3, 2, true, true), 2).unwrap();
    let input = noise(2 * 300, 7);
    assert_eq!(conv.read(Samples::F64(&input)), 300);

    let bound = conv.end().unwrap();
    assert_eq!(conv.state(), ConverterState::Draining);
    assert!(bound >= 450);
    assert_eq!(conv.end().unwrap(), bound);
    assert_eq!(conv.read(Samples::F64(&input)), 0);

    let mut buf = vec![0.0f64; conv.max_io().output * 2];
    let mut written = 0;
    loop {
        let status = conv.process().unwrap();
        let n = conv.write(SamplesMut::F64(&mut buf));
        written += n;
        assert!(written <= bound);
        if status == ProcessStatus::End {
            break;
        }
    }
    assert_eq!(written, bound);
    assert_eq!(conv.state(), ConverterState::Ended);
    assert_eq!(conv.process().unwrap(), ProcessStatus::End);
    assert_eq!(conv.write(SamplesMut::F64(&mut buf)), 0);
    assert_eq!(conv.end().unwrap(), 0);
}

#[rstest]
fn reset_starts_over() {
    let input = noise(3000, 11);
    let mut conv = Converter::new(None, &spec(2, 3, false, true), 1).unwrap();
    let first = run(&mut conv, &input, 256);

    conv.reset();
    assert_eq!(conv.state(), ConverterState::Active);
    let second = run(&mut conv, &input, 256);
    assert_eq!(first, second);
}

#[rstest]
#[case(true)]
#[case(false)]
fn single_precision_tracks_double(#[case] frequency_domain: bool) {
    let input = noise(4000, 3);
    let mut single = Converter::new(None, &spec(147, 160, frequency_domain, false), 1).unwrap();
    let mut double = Converter::new(None, &spec(147, 160, frequency_domain, true), 1).unwrap();
    let a = run(&mut single, &input, 500);
    let b = run(&mut double, &input, 500);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert!((x - y).abs() < 1e-4);
    }
}

#[rstest]
fn channels_stay_separate() {
    // left: sine, right: silence, as interleaved 16-bit
    let left = sine(440.0, 48000.0, 0.8, 4800);
    let interleaved: Vec<i16> = left
        .iter()
        .flat_map(|&v| [(v * 32767.0) as i16, 0])
        .collect();

    let mut conv = Converter::new(None, &spec(1, 2, true, true), 2).unwrap();
    let mut out = vec![0i16; conv.max_io().output * 2];
    let mut fed = 0;
    let mut collected = Vec::new();
    loop {
        if fed < interleaved.len() {
            fed += conv.read(Samples::I16(&interleaved[fed..])) * 2;
        } else {
            conv.end().unwrap();
        }
        let status = conv.process().unwrap();
        let n = conv.write(SamplesMut::I16(&mut out));
        collected.extend_from_slice(&out[..n * 2]);
        if status == ProcessStatus::End {
            break;
        }
    }

    assert!(collected.len() >= 4800);
    assert!(collected.iter().skip(1).step_by(2).all(|&v| v == 0));
    let peak = collected.iter().step_by(2).map(|v| v.abs()).max().unwrap();
    assert!(peak > 24000, "peak {}", peak);
}

#[rstest]
fn planar_io_matches_interleaved() {
    let left = noise(1500, 21);
    let right = noise(1500, 22);
    let interleaved: Vec<f64> = left.iter().zip(&right).flat_map(|(&l, &r)| [l, r]).collect();

    let mut reference = Converter::new(None, &spec(3, 2, false, true), 2).unwrap();
    let expected = run(&mut reference, &interleaved, 400);

    let mut conv = Converter::new(None, &spec(3, 2, false, true), 2).unwrap();
    let (mut fed, mut ended) = (0, false);
    let (mut out_l, mut out_r) = (vec![0.0f32; 4096], vec![0.0f32; 4096]);
    let mut got = Vec::new();
    loop {
        if fed < left.len() {
            let end = (fed + 400).min(left.len());
            fed += conv
                .read_planar(&[Samples::F64(&left[fed..end]), Samples::F64(&right[fed..end])])
                .unwrap();
        } else if !ended {
            conv.end().unwrap();
            ended = true;
        }
        let status = conv.process().unwrap();
        let n = conv
            .write_planar(&mut [SamplesMut::F32(&mut out_l), SamplesMut::F32(&mut out_r)])
            .unwrap();
        for i in 0..n {
            got.push(out_l[i] as f64);
            got.push(out_r[i] as f64);
        }
        if status == ProcessStatus::End {
            break;
        }
    }

    assert_eq!(got.len(), expected.len());
    for (a, b) in got.iter().zip(&expected) {
        assert!((a - b).abs() < 1e-6);
    }
}

/// Fails every design request, so only cached filters can be used
struct NoDesign;

impl LowpassDesign for NoDesign {
    fn design(&self, _spec: &FilterSpec) -> polysrc_core::Result<FilterCoefs> {
        Err(ResampleError::Internal("designer must not be called".into()))
    }
}

#[rstest]
fn directory_cache_reproduces_designed_filters() {
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let s = spec(2, 3, false, true);
    let input = noise(2000, 5);

    let mut designed = Converter::new(None, &s, 1).unwrap();
    let expected = run(&mut designed, &input, 500);
    {
        let mut cache = FilterCache::open_dir(dir.path(), OpenMode::ReadWrite).unwrap();
        Converter::new(Some(&mut cache), &s, 1).unwrap();
    }

    let options = DesignOptions {
        designer: Arc::new(NoDesign),
        ..DesignOptions::default()
    };
    let mut cache = FilterCache::open_dir(dir.path(), OpenMode::Read).unwrap();
    let mut cached = Converter::with_options(Some(&mut cache), &s, 1, &options).unwrap();
    assert_eq!(run(&mut cached, &input, 500), expected);
}

#[rstest]
fn converters_share_cached_filters() {
    let store = MemoryStore::new();
    let s = spec(160, 147, true, false);
    {
        let mut cache = FilterCache::open(&store, OpenMode::ReadWrite).unwrap();
        Converter::new(Some(&mut cache), &s, 1).unwrap();
        assert!(!cache.entries().unwrap().is_empty());
    }

    let options = DesignOptions {
        designer: Arc::new(NoDesign),
        ..DesignOptions::default()
    };
    let mut cache = FilterCache::open(&store, OpenMode::Read).unwrap();
    let conv = Converter::with_options(Some(&mut cache), &s, 1, &options).unwrap();
    assert_eq!(conv.max_io().input % 147, 0);

    assert!(Converter::with_options(None, &s, 1, &options).is_err());
}
