// Streaming multi-stage converter

use crate::stage::{build_stage, Precision, Stage, StageKind, StageStatus};
use polysrc_buffer::SampleBuffer;
use polysrc_cache::FilterCache;
use polysrc_core::{
    ConverterSpec, ConverterState, Ratio, ResampleError, Result, Samples, SamplesMut, StateMachine,
};
use polysrc_design::{design_plan, DesignOptions, Plan};

/// Result of one `process` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Every stage moved samples
    Progress,
    /// A stage ran dry; `read` more input
    NeedInput,
    /// A stage has no room; `write` pending output
    OutputFull,
    /// All output up to the end bound has been written
    End,
}

impl From<StageStatus> for ProcessStatus {
    fn from(status: StageStatus) -> Self {
        match status {
            StageStatus::Progress => ProcessStatus::Progress,
            StageStatus::InputEmpty => ProcessStatus::NeedInput,
            StageStatus::OutputFull => ProcessStatus::OutputFull,
        }
    }
}

/// Per-call capacities, in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoSize {
    pub input: usize,
    pub output: usize,
}

/// Stages and the buffers between them, in one precision
struct Pipeline<T> {
    stages: Vec<Box<dyn Stage<T>>>,
    buffers: Vec<SampleBuffer<T>>,
}

impl<T: Precision> Pipeline<T> {
    fn new(plan: &Plan, channels: usize, kind: StageKind) -> Result<Self> {
        let buffers = plan
            .buffers
            .iter()
            .map(|&layout| SampleBuffer::new(channels, layout))
            .collect::<Result<Vec<_>>>()?;
        let stages = plan
            .stages
            .iter()
            .zip(&plan.buffers)
            .map(|(model, &layout)| build_stage(kind, model, layout))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { stages, buffers })
    }

    fn first(&mut self) -> &mut SampleBuffer<T> {
        &mut self.buffers[0]
    }

    fn last(&mut self) -> &mut SampleBuffer<T> {
        let i = self.buffers.len() - 1;
        &mut self.buffers[i]
    }

    /// Offer up to `frames` free input slots per channel to `fill`
    fn read_with(&mut self, frames: usize, mut fill: impl FnMut(usize, &mut [T])) -> usize {
        let buf = self.first();
        let n = frames.min(buf.available_write());
        if n == 0 {
            return 0;
        }
        for ch in 0..buf.channels() {
            fill(ch, &mut buf.spare_mut(ch)[..n]);
        }
        buf.commit(n);
        n
    }

    /// Hand up to `frames` finished samples per channel to `drain`
    fn write_with(&mut self, frames: usize, mut drain: impl FnMut(usize, &[T])) -> usize {
        let buf = self.last();
        let n = frames.min(buf.available_read());
        if n == 0 {
            return 0;
        }
        let past = buf.past();
        for ch in 0..buf.channels() {
            drain(ch, &buf.channel(ch)[past..past + n]);
        }
        buf.consume(n);
        n
    }

    /// Poll each stage once, in order. Later stages run even after an
    /// earlier one stalls so samples parked between stages keep moving.
    fn poll(&mut self) -> Result<StageStatus> {
        let mut result = StageStatus::Progress;
        for (i, stage) in self.stages.iter_mut().enumerate() {
            let (head, tail) = self.buffers.split_at_mut(i + 1);
            let status = stage.process(&mut head[i], &mut tail[0])?;
            log::trace!(
                "Stage {} ({}): {:?}, {} in / {} out buffered",
                i,
                stage.ratio(),
                status,
                head[i].available_read(),
                tail[0].available_read()
            );
            if result == StageStatus::Progress {
                result = status;
            }
        }
        Ok(result)
    }

    /// Upper bound on the output still owed for everything buffered so far,
    /// filter tails included
    fn drain_bound(&self) -> usize {
        let mut pending = 0;
        for (stage, buf) in self.stages.iter().zip(&self.buffers) {
            let l = stage.ratio().up as usize;
            let m = stage.ratio().down as usize;
            pending += buf.available_read();
            pending = (pending * l + stage.kernel_len() + m - 2) / m;
        }
        pending + self.buffers.last().map_or(0, |b| b.available_read())
    }

    fn fill_silence(&mut self) -> usize {
        self.first().fill_silence()
    }

    fn reset(&mut self) {
        for buf in &mut self.buffers {
            buf.reset();
        }
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    fn stage_ratios(&self) -> Vec<Ratio> {
        self.stages.iter().map(|s| s.ratio()).collect()
    }
}

enum Engine {
    Single(Pipeline<f32>),
    Double(Pipeline<f64>),
}

macro_rules! with_pipeline {
    ($engine:expr, $p:ident => $body:expr) => {
        match $engine {
            Engine::Single($p) => $body,
            Engine::Double($p) => $body,
        }
    };
}

/// Streaming sample-rate converter.
///
/// The caller alternates `read`, `process` and `write` until `process`
/// reports `End`. None of them block; `process` says which side needs
/// attention next.
pub struct Converter {
    engine: Engine,
    machine: StateMachine,
    /// Output still owed once the input has ended
    remaining: usize,
    ratio: Ratio,
    channels: usize,
    io: IoSize,
}

impl Converter {
    /// Build a converter with the default design options
    pub fn new(cache: Option<&mut FilterCache>, spec: &ConverterSpec, channels: usize) -> Result<Self> {
        Self::with_options(cache, spec, channels, &DesignOptions::default())
    }

    pub fn with_options(
        cache: Option<&mut FilterCache>,
        spec: &ConverterSpec,
        channels: usize,
        options: &DesignOptions,
    ) -> Result<Self> {
        if channels == 0 {
            return Err(ResampleError::invalid("converter needs at least one channel"));
        }

        let plan = design_plan(cache, spec, options)?;
        let kind = if spec.flags.frequency_domain {
            StageKind::OverlapSave
        } else {
            StageKind::Polyphase
        };
        let engine = if spec.flags.double_precision {
            Engine::Double(Pipeline::new(&plan, channels, kind)?)
        } else {
            Engine::Single(Pipeline::new(&plan, channels, kind)?)
        };

        log::info!(
            "Converter {} created: {} stage(s) {:?}, {} channel(s), {:?} {} precision, blocks {} in / {} out",
            plan.ratio,
            plan.stages.len(),
            plan.stages.iter().map(|s| s.ratio.to_string()).collect::<Vec<_>>(),
            channels,
            kind,
            if spec.flags.double_precision { "double" } else { "single" },
            plan.max_input,
            plan.max_output
        );

        Ok(Self {
            engine,
            machine: StateMachine::new(),
            remaining: 0,
            ratio: plan.ratio,
            channels,
            io: IoSize {
                input: plan.max_input,
                output: plan.max_output,
            },
        })
    }

    /// Accept interleaved input; returns the frames taken
    pub fn read(&mut self, input: Samples<'_>) -> usize {
        if !self.machine.is_active() {
            return 0;
        }
        let channels = self.channels;
        let frames = input.len() / channels;
        with_pipeline!(&mut self.engine, p => p.read_with(frames, |ch, out| {
            input.read_into(ch, channels, out)
        }))
    }

    /// Accept one slice per channel; returns the frames taken
    pub fn read_planar(&mut self, input: &[Samples<'_>]) -> Result<usize> {
        if input.len() != self.channels {
            return Err(ResampleError::invalid(format!(
                "expected {} channel slices, got {}",
                self.channels,
                input.len()
            )));
        }
        if !self.machine.is_active() {
            return Ok(0);
        }
        let frames = input.iter().map(|s| s.len()).min().unwrap_or(0);
        Ok(with_pipeline!(&mut self.engine, p => p.read_with(frames, |ch, out| {
            input[ch].read_into(0, 1, out)
        })))
    }

    fn output_limit(&self, frames: usize) -> usize {
        match self.machine.state() {
            ConverterState::Active => frames,
            ConverterState::Draining => frames.min(self.remaining),
            ConverterState::Ended => 0,
        }
    }

    fn produced(&mut self, n: usize) {
        if self.machine.state() == ConverterState::Draining {
            self.remaining -= n;
        }
    }

    /// Fill interleaved output; returns the frames written
    pub fn write(&mut self, mut output: SamplesMut<'_>) -> usize {
        let channels = self.channels;
        let frames = self.output_limit(output.len() / channels);
        let n = with_pipeline!(&mut self.engine, p => p.write_with(frames, |ch, src| {
            output.write_from(ch, channels, src)
        }));
        self.produced(n);
        n
    }

    /// Fill one slice per channel; returns the frames written
    pub fn write_planar(&mut self, output: &mut [SamplesMut<'_>]) -> Result<usize> {
        if output.len() != self.channels {
            return Err(ResampleError::invalid(format!(
                "expected {} channel slices, got {}",
                self.channels,
                output.len()
            )));
        }
        let frames = self.output_limit(output.iter().map(|s| s.len()).min().unwrap_or(0));
        let n = with_pipeline!(&mut self.engine, p => p.write_with(frames, |ch, src| {
            output[ch].write_from(0, 1, src)
        }));
        self.produced(n);
        Ok(n)
    }

    /// Run every stage once
    pub fn process(&mut self) -> Result<ProcessStatus> {
        match self.machine.state() {
            ConverterState::Ended => return Ok(ProcessStatus::End),
            ConverterState::Draining => {
                if self.remaining == 0 {
                    self.machine.transition(ConverterState::Ended)?;
                    log::debug!("Converter {} drained", self.ratio);
                    return Ok(ProcessStatus::End);
                }
                with_pipeline!(&mut self.engine, p => p.fill_silence());
            }
            ConverterState::Active => {}
        }

        let status = with_pipeline!(&mut self.engine, p => p.poll())?;
        Ok(status.into())
    }

    /// Signal the end of input. Returns how many more output frames will be
    /// written at most; later calls return what is still owed.
    pub fn end(&mut self) -> Result<usize> {
        if self.machine.is_active() {
            self.remaining = with_pipeline!(&self.engine, p => p.drain_bound());
            self.machine.transition(ConverterState::Draining)?;
            log::debug!("Converter {} ending, {} frames to flush", self.ratio, self.remaining);
        }
        Ok(self.remaining)
    }

    /// Drop all buffered samples and filter state and start over
    pub fn reset(&mut self) {
        with_pipeline!(&mut self.engine, p => p.reset());
        self.machine.reset();
        self.remaining = 0;
    }

    pub fn max_io(&self) -> IoSize {
        self.io
    }

    pub fn ratio(&self) -> Ratio {
        self.ratio
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn state(&self) -> ConverterState {
        self.machine.state()
    }

    /// Ratio of each stage, in processing order
    pub fn stage_ratios(&self) -> Vec<Ratio> {
        with_pipeline!(&self.engine, p => p.stage_ratios())
    }
}
