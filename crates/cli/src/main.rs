// polysrc: convert the sample rate of a WAV file

mod wav;

use clap::{Parser, ValueEnum};
use env_logger::Env;
use polysrc_cache::{FilterCache, OpenMode};
use polysrc_core::{gain_db, ripple_db};
use polysrc_resampler::{
    Converter, ConverterSpec, ProcessStatus, Quality, Ratio, ResampleError,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use wav::{PcmBuffer, WavInput, WavOutput};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    #[error("conversion failed: {0}")]
    Convert(#[from] ResampleError),
}

/// Quality presets, named as on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    Mq16,
    Hq16,
    Mq20,
    Hq20,
    Mq24,
    Hq24,
    Push,
}

impl From<Preset> for Quality {
    fn from(p: Preset) -> Self {
        match p {
            Preset::Mq16 => Quality::Mq16,
            Preset::Hq16 => Quality::Hq16,
            Preset::Mq20 => Quality::Mq20,
            Preset::Hq20 => Quality::Hq20,
            Preset::Mq24 => Quality::Mq24,
            Preset::Hq24 => Quality::Hq24,
            Preset::Push => Quality::PushingIt,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "polysrc", version)]
struct Cli {
    /// Input WAV file
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output WAV file, same sample format as the input
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Output sample rate in Hz
    #[arg(short = 'r', long = "rate")]
    rate: u32,

    /// Quality preset
    #[arg(
        short = 'q',
        long = "quality",
        value_enum,
        conflicts_with_all = ["passband_ripple", "stopband_atten", "bandwidth"]
    )]
    quality: Option<Preset>,

    /// Peak-to-peak passband ripple in dB, in (0, 10]
    #[arg(short = 'p', long = "passband-ripple", requires_all = ["stopband_atten", "bandwidth"])]
    passband_ripple: Option<f64>,

    /// Stopband attenuation in dB, in (0, 180]
    #[arg(short = 's', long = "stopband-atten", requires_all = ["passband_ripple", "bandwidth"])]
    stopband_atten: Option<f64>,

    /// Passband width in (0, 1), where 1 is the Nyquist frequency
    #[arg(short = 'b', long = "bandwidth", requires_all = ["passband_ripple", "stopband_atten"])]
    bandwidth: Option<f64>,

    /// Filter cache directory [default: ~/.polysrc]
    #[arg(long = "cache-dir")]
    cache_dir: Option<PathBuf>,

    /// Do not use a filter cache
    #[arg(long = "no-cache", conflicts_with = "cache_dir")]
    no_cache: bool,

    /// Use polyphase stages instead of overlap-save
    #[arg(long = "time-domain")]
    time_domain: bool,

    /// Design minimum-phase filters
    #[arg(long = "min-phase")]
    min_phase: bool,

    /// Process in single precision
    #[arg(long = "single")]
    single: bool,

    /// Print diagnostic messages
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

/// Converter configuration for `input_rate -> cli.rate`
fn converter_spec(cli: &Cli, input_rate: u32) -> Result<ConverterSpec, CliError> {
    if input_rate == cli.rate {
        return Err(CliError::Usage(
            "source rate equal to target rate: nothing to do".into(),
        ));
    }
    let ratio = Ratio::from_rates(input_rate as u64, cli.rate as u64)
        .map_err(|e| CliError::Usage(format!("invalid conversion ratio: {}", e)))?;

    let mut spec = match (cli.quality, cli.passband_ripple, cli.stopband_atten, cli.bandwidth) {
        (Some(preset), None, None, None) => ConverterSpec::from_preset(ratio, preset.into()),
        (None, Some(dp), Some(ds), Some(bw)) => {
            if !(dp > 0.0 && dp <= 10.0) {
                return Err(CliError::Usage("invalid passband ripple".into()));
            }
            if !(ds > 0.0 && ds <= 180.0) {
                return Err(CliError::Usage("invalid stopband attenuation".into()));
            }
            if !(bw > 0.0 && bw < 1.0) {
                return Err(CliError::Usage("invalid bandwidth".into()));
            }
            let mut spec = ConverterSpec::from_preset(ratio, Quality::Mq16);
            spec.passband_ripple = ripple_db(dp);
            spec.stopband_ripple = gain_db(-ds);
            spec.passband_width = bw;
            spec
        }
        _ => {
            return Err(CliError::Usage(
                "specify either a quality preset or passband ripple, stopband attenuation and bandwidth"
                    .into(),
            ))
        }
    };

    // one second of audio per call
    spec.max_input = input_rate as usize;
    spec.max_output = cli.rate as usize;
    spec.flags.frequency_domain = !cli.time_domain;
    spec.flags.minimum_phase = cli.min_phase;
    spec.flags.double_precision = !cli.single;
    Ok(spec)
}

fn default_cache_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| Path::new(&home).join(".polysrc"))
}

/// Open the filter cache; conversion works without one
fn open_cache(cli: &Cli) -> Option<FilterCache> {
    if cli.no_cache {
        return None;
    }
    let Some(dir) = cli.cache_dir.clone().or_else(default_cache_dir) else {
        log::warn!("cannot determine home directory, running without filter cache");
        return None;
    };
    match FilterCache::open_dir(&dir, OpenMode::ReadWrite) {
        Ok(cache) => Some(cache),
        Err(e) => {
            log::warn!("filter cache in {} unavailable: {}", dir.display(), e);
            None
        }
    }
}

/// Interleaved samples feeding the converter
trait SampleSource {
    /// Read into `buf[start..]`; fewer samples than requested means the end
    fn read_samples(&mut self, buf: &mut PcmBuffer, start: usize) -> Result<usize, hound::Error>;
}

impl SampleSource for WavInput {
    fn read_samples(&mut self, buf: &mut PcmBuffer, start: usize) -> Result<usize, hound::Error> {
        self.read(buf, start)
    }
}

/// Run everything `source` holds through `conv`, handing converted samples
/// to `emit`. Returns the frames emitted.
fn pump(
    conv: &mut Converter,
    source: &mut dyn SampleSource,
    input: &mut PcmBuffer,
    output: &mut PcmBuffer,
    mut emit: impl FnMut(&PcmBuffer, usize) -> Result<(), CliError>,
) -> Result<u64, CliError> {
    let channels = conv.channels();
    let mut pending = 0;
    let mut eof = false;
    let mut written = 0u64;

    loop {
        if !eof {
            let wanted = input.len() - pending;
            let got = source.read_samples(input, pending)?;
            pending += got;
            eof = got < wanted;
        }

        if pending >= channels {
            let taken = conv.read(input.samples(pending)) * channels;
            input.shift(taken, pending);
            pending -= taken;
        }
        if eof && pending < channels {
            if pending > 0 {
                log::warn!("Dropping {} samples of an incomplete final frame", pending);
                pending = 0;
            }
            conv.end()?;
        }

        if conv.process()? == ProcessStatus::End {
            break;
        }
        let frames = conv.write(output.samples_mut());
        emit(output, frames * channels)?;
        written += frames as u64;
    }
    Ok(written)
}

/// Convert `cli.input` into `cli.output`; returns the frames written
fn run(cli: &Cli) -> Result<u64, CliError> {
    let mut source = WavInput::open(&cli.input)?;
    let in_spec = source.spec();
    let spec = converter_spec(cli, in_spec.sample_rate)?;
    let channels = in_spec.channels as usize;

    let mut cache = open_cache(cli);
    let mut conv = Converter::new(cache.as_mut(), &spec, channels)?;
    drop(cache);

    let out_spec = hound::WavSpec {
        sample_rate: cli.rate,
        ..in_spec
    };
    let mut sink = WavOutput::create(&cli.output, out_spec)?;

    let mut input = PcmBuffer::new(source.format(), spec.max_input * channels);
    let mut output = PcmBuffer::new(source.format(), conv.max_io().output * channels);
    let written = pump(&mut conv, &mut source, &mut input, &mut output, |buf, len| {
        sink.write(buf, len).map_err(CliError::from)
    })?;

    sink.finalize()?;
    log::info!(
        "Converted {} from {} Hz to {} Hz: {} frames written",
        cli.input.display(),
        in_spec.sample_rate,
        cli.rate,
        written
    );
    Ok(written)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("polysrc: {}", e);
            ExitCode::FAILURE
        }
    }
}
