//! Test utilities for integration tests.
//!
//! This module provides synthetic pyramids and an instrumented decoder that
//! can inject failures, panics, clone failures and slow reads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use wsi_region_reader::{
    DecodeError, Decoder, MemoryDecoder, MemoryLevel, MemorySeries, PixelType, ReaderSettings,
    Rect,
};

// =============================================================================
// Synthetic Data
// =============================================================================

/// Deterministic 8-bit pattern with no zero samples.
pub fn pattern(width: u32, height: u32, seed: u32) -> Vec<u8> {
    (0..height)
        .flat_map(|y| (0..width).map(move |x| ((x * 7 + y * 13 + seed * 31) % 250 + 1) as u8))
        .collect()
}

/// Rows `rect` of a row-major plane `width` wide.
pub fn crop(plane: &[u8], width: u32, rect: Rect) -> Vec<u8> {
    let mut out = Vec::with_capacity((rect.width * rect.height) as usize);
    for y in rect.y..rect.y + rect.height {
        let start = (y * width + rect.x) as usize;
        out.extend_from_slice(&plane[start..start + rect.width as usize]);
    }
    out
}

/// Independent 2x2 box downscale, dropping an odd trailing row/column.
pub fn box_downscale(plane: &[u8], width: u32, height: u32) -> (Vec<u8>, u32, u32) {
    let (w, h) = (width / 2, height / 2);
    let mut out = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            let at = |dx: u32, dy: u32| plane[((2 * y + dy) * width + 2 * x + dx) as usize] as f64;
            let mean = (at(0, 0) + at(1, 0) + at(0, 1) + at(1, 1)) / 4.0;
            out.push(mean.round() as u8);
        }
    }
    (out, w, h)
}

/// Single-channel 8-bit series with one level per entry of `sizes`.
pub fn gray_series(sizes: &[(u32, u32)]) -> MemorySeries {
    sizes
        .iter()
        .enumerate()
        .fold(MemorySeries::new(PixelType::U8, 1), |series, (i, &(w, h))| {
            series.with_level(MemoryLevel::new(w, h, vec![pattern(w, h, i as u32)]))
        })
}

/// Single-channel, single-level 8-bit decoder.
pub fn gray_decoder(width: u32, height: u32) -> MemoryDecoder {
    MemoryDecoder::new(vec![gray_series(&[(width, height)])]).unwrap()
}

/// Interleaved RGB decoder whose channel `c` equals `pattern(w, h, c)`.
pub fn rgb_decoder(width: u32, height: u32, interleaved: bool) -> MemoryDecoder {
    let channels: Vec<Vec<u8>> = (0..3).map(|c| pattern(width, height, c)).collect();
    let data = if interleaved {
        (0..(width * height) as usize)
            .flat_map(|i| channels.iter().map(move |plane| plane[i]))
            .collect()
    } else {
        channels.concat()
    };
    let series = MemorySeries::new(PixelType::U8, 3)
        .with_rgb(3, interleaved)
        .with_level(MemoryLevel::new(width, height, vec![data]));
    MemoryDecoder::new(vec![series]).unwrap()
}

/// Settings with a fixed worker count and a short acquire timeout.
pub fn settings(workers: usize) -> ReaderSettings {
    ReaderSettings::default()
        .with_workers(workers)
        .with_acquire_timeout(Duration::from_secs(5))
        .with_poll_interval(Duration::from_millis(2))
}

// =============================================================================
// Instrumented Decoder
// =============================================================================

/// Counters and fault injection shared by every clone of a [`ProbeDecoder`].
#[derive(Default)]
pub struct Probe {
    pub reads: AtomicUsize,
    pub clones: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,

    fail_on: Option<Rect>,
    fail_budget: AtomicUsize,
    panic_on: Option<Rect>,
    clone_limit: Option<usize>,
    delay: Duration,
}

impl Probe {
    pub fn new() -> Self {
        Self {
            fail_budget: AtomicUsize::new(usize::MAX),
            ..Self::default()
        }
    }

    /// Fail every read intersecting `rect`.
    pub fn fail_on(mut self, rect: Rect) -> Self {
        self.fail_on = Some(rect);
        self
    }

    /// Fail only the first `times` reads intersecting the `fail_on` rect.
    pub fn fail_times(self, times: usize) -> Self {
        self.fail_budget.store(times, Ordering::SeqCst);
        self
    }

    /// Panic inside every read intersecting `rect`.
    pub fn panic_on(mut self, rect: Rect) -> Self {
        self.panic_on = Some(rect);
        self
    }

    /// Let `limit` clones succeed, then fail every further clone.
    pub fn clone_limit(mut self, limit: usize) -> Self {
        self.clone_limit = Some(limit);
        self
    }

    /// Sleep this long in every read.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn clones(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(&self, rect: Rect) -> bool {
        match self.fail_on {
            Some(fail) if rect.intersection(&fail).is_some() => self
                .fail_budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok(),
            _ => false,
        }
    }
}

/// A [`MemoryDecoder`] wrapped with a shared [`Probe`].
pub struct ProbeDecoder {
    inner: MemoryDecoder,
    probe: Arc<Probe>,
}

impl ProbeDecoder {
    pub fn new(inner: MemoryDecoder, probe: Probe) -> (Self, Arc<Probe>) {
        let probe = Arc::new(probe);
        (
            Self {
                inner,
                probe: Arc::clone(&probe),
            },
            probe,
        )
    }
}

impl Decoder for ProbeDecoder {
    fn series_count(&self) -> usize {
        self.inner.series_count()
    }

    fn bind(&mut self, series: usize, resolution: usize) -> Result<(), DecodeError> {
        self.inner.bind(series, resolution)
    }

    fn series(&self) -> usize {
        self.inner.series()
    }

    fn resolution(&self) -> usize {
        self.inner.resolution()
    }

    fn resolution_count(&self) -> usize {
        self.inner.resolution_count()
    }

    fn size_x(&self) -> u32 {
        self.inner.size_x()
    }

    fn size_y(&self) -> u32 {
        self.inner.size_y()
    }

    fn size_z(&self) -> u32 {
        self.inner.size_z()
    }

    fn size_c(&self) -> u32 {
        self.inner.size_c()
    }

    fn size_t(&self) -> u32 {
        self.inner.size_t()
    }

    fn rgb_channel_count(&self) -> u32 {
        self.inner.rgb_channel_count()
    }

    fn is_interleaved(&self) -> bool {
        self.inner.is_interleaved()
    }

    fn is_little_endian(&self) -> bool {
        self.inner.is_little_endian()
    }

    fn pixel_type(&self) -> PixelType {
        self.inner.pixel_type()
    }

    fn read_region_bytes(
        &mut self,
        plane: usize,
        rect: Rect,
        out: &mut Vec<u8>,
    ) -> Result<(), DecodeError> {
        let probe = &self.probe;
        probe.reads.fetch_add(1, Ordering::SeqCst);
        let now = probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        probe.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !probe.delay.is_zero() {
            thread::sleep(probe.delay);
        }

        let result = if probe.panic_on.is_some_and(|r| rect.intersection(&r).is_some()) {
            probe.in_flight.fetch_sub(1, Ordering::SeqCst);
            panic!("injected decoder panic at {rect:?}");
        } else if probe.should_fail(rect) {
            Err(DecodeError::Io(format!("injected failure at {rect:?}")))
        } else {
            self.inner.read_region_bytes(plane, rect, out)
        };

        probe.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn optimal_tile_width(&self) -> Option<u32> {
        self.inner.optimal_tile_width()
    }

    fn optimal_tile_height(&self) -> Option<u32> {
        self.inner.optimal_tile_height()
    }

    fn try_clone(&self) -> Result<Self, DecodeError> {
        let made = self.probe.clones.fetch_add(1, Ordering::SeqCst);
        if self.probe.clone_limit.is_some_and(|limit| made >= limit) {
            return Err(DecodeError::Clone("injected clone failure".to_string()));
        }
        Ok(Self {
            inner: self.inner.try_clone()?,
            probe: Arc::clone(&self.probe),
        })
    }
}
