//! Tile worker.
//!
//! Decodes one planned tile on a pool thread:
//!
//! 1. Borrow a decoder handle and a work buffer
//! 2. Read raw bytes for the tile rectangle, once per plane
//! 3. Split out each requested channel and convert it to typed samples
//! 4. Copy the samples into the tile's canvas target
//! 5. Return handle and buffer to their pools (guard drop, on every path)
//!
//! Decode errors stay inside the tile: the tile is reported failed and its
//! canvas rectangle is left untouched. Only pool failures (clone failure,
//! acquire timeout) escape as fatal outcomes.

use std::panic::{self, AssertUnwindSafe};

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{DecodeError, RegionError};
use crate::pool::{BufferPool, ReaderPool, WorkBuffer};
use crate::region::canvas::TileTarget;
use crate::region::sample::{convert_samples, Sample};
use crate::slide::Decoder;

use super::planner::{ChannelSelection, PlanePosition, Rect, Tile};

// =============================================================================
// Channel Layout
// =============================================================================

/// Where one output channel comes from in the decoder's planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChannelSource {
    /// Channel index as requested
    pub channel: u32,

    /// Plane holding the channel
    pub plane: usize,

    /// Sample index within an RGB plane
    pub sub: u32,
}

/// Output channels of a read and how to pull them out of raw plane bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChannelLayout {
    pub sources: Vec<ChannelSource>,
    pub samples_per_plane: u32,
    pub interleaved: bool,
    pub little_endian: bool,
}

impl ChannelLayout {
    /// Resolve `position` against a decoder bound to the read's series.
    pub(crate) fn from_decoder<D: Decoder>(
        decoder: &D,
        position: PlanePosition,
    ) -> Result<Self, RegionError> {
        let size_c = decoder.size_c();
        let rgb = decoder.rgb_channel_count().max(1);

        let channels: Vec<u32> = match position.channels {
            ChannelSelection::Single(channel) if channel >= size_c => {
                return Err(RegionError::InvalidChannel {
                    channel,
                    count: size_c,
                })
            }
            ChannelSelection::Single(channel) => vec![channel],
            ChannelSelection::All => (0..size_c).collect(),
        };

        let sources = channels
            .into_iter()
            .map(|channel| {
                Ok(ChannelSource {
                    channel,
                    plane: decoder.plane_index(position.z, channel / rgb, position.t)?,
                    sub: channel % rgb,
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        Ok(Self {
            sources,
            samples_per_plane: rgb,
            interleaved: decoder.is_interleaved(),
            little_endian: decoder.is_little_endian(),
        })
    }

    pub(crate) fn channel_count(&self) -> usize {
        self.sources.len()
    }
}

// =============================================================================
// Jobs and Outcomes
// =============================================================================

/// A tile paired with exclusive access to its canvas rectangle.
pub(crate) struct TileJob<'c, T> {
    pub tile: Tile,
    pub target: TileTarget<'c, T>,
}

/// What happened to one submitted tile.
#[derive(Debug)]
pub(crate) enum TileOutcome {
    /// Pixels are in the canvas
    Completed { index: usize },

    /// Decoding failed; the tile's canvas rectangle is untouched
    Failed {
        index: usize,
        rect: Rect,
        error: DecodeError,
    },

    /// Cancelled before the canvas write
    Skipped { index: usize },

    /// A pool could not serve the tile; the whole read must stop
    Fatal { index: usize, error: RegionError },
}

enum Decoded {
    Complete,
    Cancelled,
}

// =============================================================================
// Worker
// =============================================================================

/// Shared context of every worker thread in one read.
pub(crate) struct TileWorker<'w, 'a, D: Decoder, T: Sample> {
    pub readers: &'w ReaderPool<'a, D>,
    pub buffers: &'w BufferPool<T>,
    pub layout: &'w ChannelLayout,
    pub cancel: &'w CancellationToken,

    /// Extra attempts per tile, each with a freshly cloned handle
    pub retries: u32,
}

impl<D: Decoder, T: Sample> TileWorker<'_, '_, D, T> {
    /// Decode one tile into its canvas target.
    pub(crate) fn run(&self, job: TileJob<'_, T>) -> TileOutcome {
        let TileJob { tile, mut target } = job;
        let index = tile.index;
        debug_assert_eq!(index, target.tile_index());

        if self.cancel.is_cancelled() {
            return TileOutcome::Skipped { index };
        }

        let mut reader = match self.readers.borrow() {
            Ok(reader) => reader,
            Err(error) => return TileOutcome::Fatal { index, error },
        };
        let mut buffer = match self.buffers.borrow() {
            Ok(buffer) => buffer,
            Err(error) => return TileOutcome::Fatal { index, error },
        };

        let mut attempt = 0;
        loop {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                decode_tile(&mut *reader, &mut *buffer, tile.rect, self.layout, self.cancel)
            }))
            .unwrap_or_else(|_| Err(DecodeError::Other("decoder panicked".to_string())));

            match result {
                Ok(Decoded::Complete) => break,
                Ok(Decoded::Cancelled) => return TileOutcome::Skipped { index },
                Err(error) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        tile = index,
                        attempt,
                        error = %error,
                        "Tile decode failed, retrying with a fresh reader"
                    );
                    if let Err(error) = reader.refresh() {
                        return TileOutcome::Fatal { index, error };
                    }
                }
                Err(error) => {
                    warn!(
                        tile = index,
                        x = tile.rect.x,
                        y = tile.rect.y,
                        width = tile.rect.width,
                        height = tile.rect.height,
                        error = %error,
                        "Tile decode failed"
                    );
                    return TileOutcome::Failed {
                        index,
                        rect: tile.rect,
                        error,
                    };
                }
            }
        }

        if self.cancel.is_cancelled() {
            return TileOutcome::Skipped { index };
        }

        let pixel_count = target.width() as usize * target.height() as usize;
        for (slot, plane) in buffer
            .pixels
            .chunks_exact(pixel_count)
            .take(self.layout.channel_count())
            .enumerate()
        {
            target.write_channel(slot, plane, tile.rect.width as usize);
        }

        TileOutcome::Completed { index }
    }
}

/// Decode every output channel of `rect` into `buffer.pixels`.
///
/// Nothing is written to the canvas here, so a failure part way through a
/// multi-channel tile leaves no partial output behind.
fn decode_tile<D: Decoder, T: Sample>(
    reader: &mut D,
    buffer: &mut WorkBuffer<T>,
    rect: Rect,
    layout: &ChannelLayout,
    cancel: &CancellationToken,
) -> Result<Decoded, DecodeError> {
    let pixel_count = rect.width as usize * rect.height as usize;
    let bps = T::PIXEL_TYPE.bytes_per_sample();
    buffer.prepare(pixel_count, layout.channel_count());

    let WorkBuffer {
        raw,
        channel,
        pixels,
    } = buffer;

    let mut loaded_plane = None;
    for (slot, source) in layout.sources.iter().enumerate() {
        if cancel.is_cancelled() {
            return Ok(Decoded::Cancelled);
        }

        if loaded_plane != Some(source.plane) {
            reader.read_region_bytes(source.plane, rect, raw)?;
            loaded_plane = Some(source.plane);
        }

        let bytes = channel_bytes(
            raw,
            pixel_count,
            bps,
            layout.samples_per_plane,
            layout.interleaved,
            source.sub,
            channel,
        )?;
        convert_samples(
            bytes,
            layout.little_endian,
            &mut pixels[slot * pixel_count..(slot + 1) * pixel_count],
        );
    }

    Ok(Decoded::Complete)
}

/// Bytes of sample `sub` from a raw plane read.
///
/// Single-sample and planar RGB data are sliced straight out of `raw`; only
/// interleaved RGB is copied into `scratch`.
pub(crate) fn channel_bytes<'b>(
    raw: &'b [u8],
    pixel_count: usize,
    bytes_per_sample: usize,
    samples_per_plane: u32,
    interleaved: bool,
    sub: u32,
    scratch: &'b mut Vec<u8>,
) -> Result<&'b [u8], DecodeError> {
    let rgb = samples_per_plane.max(1) as usize;
    let sub = sub as usize;
    let plane_len = pixel_count * bytes_per_sample;
    let expected = plane_len * rgb;

    if raw.len() < expected {
        return Err(DecodeError::UnexpectedPlaneData {
            expected,
            actual: raw.len(),
        });
    }

    if rgb == 1 {
        return Ok(&raw[..plane_len]);
    }
    if !interleaved {
        return Ok(&raw[sub * plane_len..(sub + 1) * plane_len]);
    }

    scratch.clear();
    let offset = sub * bytes_per_sample;
    for pixel in raw[..expected].chunks_exact(rgb * bytes_per_sample) {
        scratch.extend_from_slice(&pixel[offset..offset + bytes_per_sample]);
    }
    Ok(scratch.as_slice())
}

// =============================================================================
// Tests
// =============================================================================
