// Planar sample buffer with retained history between pipeline stages

use polysrc_core::{Real, ResampleError, Result};

/// Geometry of one inter-stage buffer, per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    /// Samples of history kept in front of the readable region
    pub past: usize,
    /// Total capacity, history included
    pub size: usize,
}

/// Position-tracked planar buffer.
///
/// Channel `c` occupies `data[c * size..(c + 1) * size]`. The first `pos`
/// samples of every channel are filled; the first `past` of those are
/// history that a filter still needs but that counts as already consumed.
pub struct SampleBuffer<T> {
    data: Vec<T>,
    channels: usize,
    past: usize,
    size: usize,
    pos: usize,
}

impl<T: Real> SampleBuffer<T> {
    pub fn new(channels: usize, layout: BufferLayout) -> Result<Self> {
        if channels == 0 || layout.size == 0 || layout.past >= layout.size {
            return Err(ResampleError::invalid(format!(
                "invalid buffer geometry: {} channels, past {}, size {}",
                channels, layout.past, layout.size
            )));
        }

        let len = channels
            .checked_mul(layout.size)
            .ok_or(ResampleError::OutOfMemory)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        data.resize(len, T::zero());
        log::trace!(
            "Allocated {} channel(s) x {} samples, {} of history",
            channels,
            layout.size,
            layout.past
        );

        Ok(Self {
            data,
            channels,
            past: layout.past,
            size: layout.size,
            pos: layout.past,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn past(&self) -> usize {
        self.past
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn layout(&self) -> BufferLayout {
        BufferLayout {
            past: self.past,
            size: self.size,
        }
    }

    /// Samples per channel not yet consumed
    pub fn available_read(&self) -> usize {
        self.pos - self.past
    }

    /// Free samples per channel
    pub fn available_write(&self) -> usize {
        self.size - self.pos
    }

    pub fn is_full(&self) -> bool {
        self.pos == self.size
    }

    /// Filled samples of channel `ch`, history included
    pub fn channel(&self, ch: usize) -> &[T] {
        let start = ch * self.size;
        &self.data[start..start + self.pos]
    }

    /// Unfilled tail of channel `ch`
    pub fn spare_mut(&mut self, ch: usize) -> &mut [T] {
        let start = ch * self.size;
        &mut self.data[start + self.pos..start + self.size]
    }

    /// Mark `n` samples per channel as filled
    pub fn commit(&mut self, n: usize) {
        debug_assert!(n <= self.available_write());
        self.pos = (self.pos + n).min(self.size);
    }

    /// Drop `n` samples per channel from the front. The `past` samples
    /// before the new read position become the history.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.available_read());
        let n = n.min(self.available_read());
        if n == 0 {
            return;
        }
        for ch in 0..self.channels {
            let start = ch * self.size;
            self.data.copy_within(start + n..start + self.pos, start);
        }
        self.pos -= n;
    }

    /// Fill every free slot with zeros; returns the count per channel
    pub fn fill_silence(&mut self) -> usize {
        let n = self.available_write();
        for ch in 0..self.channels {
            self.spare_mut(ch).fill(T::zero());
        }
        self.pos = self.size;
        n
    }

    /// Zero the contents and rewind to `past` samples of silent history
    pub fn reset(&mut self) {
        self.data.fill(T::zero());
        self.pos = self.past;
    }
}
