//! Region read coordinator.
//!
//! [`RegionReader`] owns the primary decoder handle and runs each region read
//! as a short-lived job:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      read_region() (caller thread)               │
//! │  Planning:   resolve level ─► plan tiles ─► allocate canvas      │
//! │  Submitting: tile jobs ─► bounded queue (blocks when full)       │
//! │  Draining:   collect outcomes, report progress each tick         │
//! │  Done:       residual 2x downscale passes                        │
//! └──────────────────────────────────────────────────────────────────┘
//!          │ bounded queue                      ▲ outcomes
//!          ▼                                    │
//!   ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//!   │ worker 0     │  │ worker 1     │  │ worker N-1   │
//!   │ ReaderPool ◄─┼──┼──────────────┼──┼─► BufferPool │
//!   └──────────────┘  └──────────────┘  └──────────────┘
//! ```
//!
//! Workers are scoped threads, so they borrow the canvas, pools and channel
//! layout directly and are always joined before the call returns. Each tile
//! job carries the only mutable view of its own canvas rectangle.
//!
//! Cancellation is cooperative. A progress callback returning `false`, an
//! external [`CancellationToken`], or a fatal pool error cancels the job's
//! token; workers check it before borrowing, before each plane read and
//! before writing to the canvas. Queued tiles drain as skipped.

use std::thread;
use std::time::Instant;

use crossbeam_channel::{RecvTimeoutError, SendTimeoutError};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReaderSettings;
use crate::error::RegionError;
use crate::pool::{BoundTarget, BufferPool, BufferShape, ReaderPool};
use crate::slide::{Decoder, ResolutionTable, ResolvedLevel};
use crate::tile::worker::{ChannelLayout, TileJob, TileOutcome, TileWorker};
use crate::tile::{default_tile_size, plan, TilePlan};

use super::canvas::ResultCanvas;
use super::job::{FailedTile, JobState, ReadOutcome, ReadReport, ReadRequest, RegionImage};
use super::sample::Sample;

// =============================================================================
// Region Reader
// =============================================================================

/// Concurrent region reader over one opened decoder.
///
/// # Example
///
/// ```
/// use wsi_region_reader::{MemoryDecoder, MemoryLevel, MemorySeries, PixelType};
/// use wsi_region_reader::{ReadRequest, Rect, RegionReader};
///
/// let series = MemorySeries::new(PixelType::U8, 1)
///     .with_level(MemoryLevel::new(64, 64, vec![vec![7u8; 64 * 64]]));
/// let reader = RegionReader::new(MemoryDecoder::new(vec![series]).unwrap());
///
/// let request = ReadRequest::new(Rect::new(8, 8, 32, 16)).with_tile_size(16, 16);
/// let image = reader
///     .read_region::<u8, _>(&request, |_, _| true)
///     .unwrap()
///     .into_image()
///     .unwrap();
///
/// assert_eq!((image.width(), image.height()), (32, 16));
/// assert_eq!(image.sample(0, 0, 0), Some(7));
/// ```
pub struct RegionReader<D: Decoder> {
    primary: Mutex<D>,
    settings: ReaderSettings,

    /// Resolution table of the most recently read series
    resolutions: Mutex<Option<ResolutionTable>>,
}

/// Everything fixed during planning.
struct PreparedRead {
    resolved: ResolvedLevel,
    plan: TilePlan,
    layout: ChannelLayout,
    final_size: (u32, u32),
}

/// Outcome counts collected while draining.
#[derive(Default)]
struct Tally {
    completed: usize,
    skipped: usize,
    failed: Vec<FailedTile>,
    fatal: Option<RegionError>,
}

impl Tally {
    fn record(&mut self, outcome: TileOutcome, cancel: &CancellationToken) {
        match outcome {
            TileOutcome::Completed { .. } => self.completed += 1,
            TileOutcome::Skipped { .. } => self.skipped += 1,
            TileOutcome::Failed { index, rect, error } => self.failed.push(FailedTile {
                index,
                rect,
                error: error.to_string(),
            }),
            TileOutcome::Fatal { index, error } => {
                warn!(tile = index, error = %error, "Fatal tile error, cancelling read");
                self.skipped += 1;
                if self.fatal.is_none() {
                    self.fatal = Some(error);
                }
                cancel.cancel();
            }
        }
    }

    /// Tiles that were decoded, successfully or not.
    fn processed(&self) -> usize {
        self.completed + self.failed.len()
    }

    /// Tiles a worker has reported on.
    fn finished(&self) -> usize {
        self.processed() + self.skipped
    }
}

impl<D: Decoder> RegionReader<D> {
    /// Wrap an opened decoder with default settings.
    pub fn new(decoder: D) -> Self {
        Self {
            primary: Mutex::new(decoder),
            settings: ReaderSettings::default(),
            resolutions: Mutex::new(None),
        }
    }

    /// Wrap an opened decoder with custom settings.
    pub fn with_settings(decoder: D, settings: ReaderSettings) -> Result<Self, RegionError> {
        settings.validate().map_err(RegionError::InvalidSettings)?;
        Ok(Self {
            primary: Mutex::new(decoder),
            settings,
            resolutions: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    /// Give back the primary decoder handle.
    pub fn into_inner(self) -> D {
        self.primary.into_inner()
    }

    /// Usable resolution levels of `series`.
    ///
    /// The table is built on first use and kept until a different series is
    /// requested.
    pub fn resolution_table(&self, series: usize) -> Result<ResolutionTable, RegionError> {
        let mut cached = self.resolutions.lock();
        if let Some(table) = cached.as_ref().filter(|t| t.series() == series) {
            return Ok(table.clone());
        }

        let table = ResolutionTable::build(&mut *self.primary.lock(), series)?;
        *cached = Some(table.clone());
        Ok(table)
    }

    /// Read a region, reporting progress as `(processed, total)` tiles.
    ///
    /// Returning `false` from `progress` cancels the read.
    pub fn read_region<T, F>(
        &self,
        request: &ReadRequest,
        progress: F,
    ) -> Result<ReadOutcome<T>, RegionError>
    where
        T: Sample,
        F: FnMut(usize, usize) -> bool,
    {
        self.read_region_with_token(request, &CancellationToken::new(), progress)
    }

    /// Read a region that can also be cancelled from outside through `token`.
    ///
    /// # Errors
    ///
    /// Setup failures, reader clone failures, pool exhaustion and an exceeded
    /// failure policy abort the read. Individual tile decode failures do not;
    /// they are listed in the [`ReadReport`].
    pub fn read_region_with_token<T, F>(
        &self,
        request: &ReadRequest,
        token: &CancellationToken,
        mut progress: F,
    ) -> Result<ReadOutcome<T>, RegionError>
    where
        T: Sample,
        F: FnMut(usize, usize) -> bool,
    {
        let started = Instant::now();
        let mut state = JobState::Idle;

        state.transition(JobState::Planning);
        let prepared = match self.prepare::<T>(request) {
            Ok(prepared) => prepared,
            Err(err) => {
                state.transition(JobState::Failed);
                return Err(err);
            }
        };
        let PreparedRead {
            resolved,
            plan,
            layout,
            final_size,
        } = prepared;

        let workers = self.settings.workers;
        let timeout = self.settings.acquire_timeout;
        let readers = ReaderPool::new(
            &self.primary,
            BoundTarget {
                series: request.series,
                resolution: resolved.reader_index,
            },
            workers,
            timeout,
        );
        let buffers: BufferPool<T> = BufferPool::new(
            BufferShape {
                tile_width: plan.tile_width,
                tile_height: plan.tile_height,
                channels: layout.channel_count(),
                samples_per_plane: layout.samples_per_plane,
            },
            workers,
            timeout,
        );
        let mut canvas: ResultCanvas<T> =
            ResultCanvas::new(plan.region.width, plan.region.height, layout.channel_count());

        let cancel = token.child_token();
        let worker = TileWorker {
            readers: &readers,
            buffers: &buffers,
            layout: &layout,
            cancel: &cancel,
            retries: self.settings.tile_retries,
        };

        let run = self.execute(&plan, &mut canvas, &worker, &mut state, &mut progress);

        let readers_created = readers.created();
        let released = readers.clear() + buffers.clear();
        debug!(released, "Cleared reader and buffer pools");

        let mut tally = match run {
            Ok(tally) => tally,
            Err(err) => {
                state.transition(JobState::Failed);
                return Err(err);
            }
        };

        if let Some(err) = tally.fatal.take() {
            state.transition(JobState::Failed);
            return Err(err);
        }

        let total = plan.len();
        if let Some(limit) = self.settings.max_failed_tiles {
            if tally.failed.len() > limit {
                state.transition(JobState::Failed);
                return Err(RegionError::TooManyFailedTiles {
                    failed: tally.failed.len(),
                    total,
                    limit,
                });
            }
        }

        // Without a fatal error, unprocessed tiles can only come from cancellation
        let cancelled = tally.processed() < total;
        state.transition(if cancelled {
            JobState::Cancelled
        } else {
            JobState::Done
        });

        if !cancelled || self.settings.keep_partial_on_cancel {
            canvas.downscale(resolved.residual);
            debug_assert_eq!((canvas.width(), canvas.height()), final_size);
        }

        let report = ReadReport {
            state,
            requested_region: request.region,
            reader_region: plan.region,
            requested_resolution: request.resolution,
            reader_level: resolved.reader_index,
            reader_shift: resolved.reader_shift,
            residual_downscale: resolved.residual,
            tile_width: plan.tile_width,
            tile_height: plan.tile_height,
            workers,
            tiles_total: total,
            tiles_completed: tally.completed,
            tiles_failed: tally.failed.len(),
            tiles_skipped: total - tally.processed(),
            failed_tiles: tally.failed,
            readers_created,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            state = %report.state,
            width = final_size.0,
            height = final_size.1,
            tiles = total,
            completed = report.tiles_completed,
            failed = report.tiles_failed,
            skipped = report.tiles_skipped,
            elapsed_ms = report.elapsed_ms,
            "Region read finished"
        );

        Ok(if cancelled {
            let partial = self
                .settings
                .keep_partial_on_cancel
                .then(|| RegionImage::from_canvas(canvas, report.clone()));
            ReadOutcome::Cancelled { report, partial }
        } else {
            ReadOutcome::Complete(RegionImage::from_canvas(canvas, report))
        })
    }

    /// Resolve the level, check the pixel layout and plan the tiles.
    fn prepare<T: Sample>(&self, request: &ReadRequest) -> Result<PreparedRead, RegionError> {
        let table = self.resolution_table(request.series)?;
        let resolved = table.resolve(request.resolution);

        let mut primary = self.primary.lock();
        primary.bind(request.series, resolved.reader_index)?;

        let actual = primary.pixel_type();
        if actual != T::PIXEL_TYPE {
            return Err(RegionError::PixelTypeMismatch {
                requested: T::PIXEL_TYPE,
                actual,
            });
        }

        let position = request.position();
        let layout = ChannelLayout::from_decoder(&*primary, position)?;
        let bounds = (primary.size_x(), primary.size_y());
        let tile_width = request
            .tile_width
            .unwrap_or_else(|| default_tile_size(primary.optimal_tile_width()));
        let tile_height = request
            .tile_height
            .unwrap_or_else(|| default_tile_size(primary.optimal_tile_height()));
        drop(primary);

        let reader_region = request.region.shifted_down(resolved.reader_shift);
        let plan = plan(reader_region, bounds, tile_width, tile_height, position)?;

        let final_size = (
            plan.region.width.checked_shr(resolved.residual).unwrap_or(0),
            plan.region.height.checked_shr(resolved.residual).unwrap_or(0),
        );
        if final_size.0 == 0 || final_size.1 == 0 {
            return Err(RegionError::EmptyRegion {
                reason: format!(
                    "{}x{} reader region vanishes after {} downscale passes",
                    plan.region.width, plan.region.height, resolved.residual
                ),
            });
        }

        debug!(
            series = request.series,
            requested = request.resolution,
            reader_level = resolved.reader_index,
            residual = resolved.residual,
            region = ?plan.region,
            tiles = plan.len(),
            columns = plan.columns,
            rows = plan.rows,
            channels = ?layout.sources.iter().map(|s| s.channel).collect::<Vec<_>>(),
            "Planned region read"
        );

        Ok(PreparedRead {
            resolved,
            plan,
            layout,
            final_size,
        })
    }

    /// Run every tile of `plan` through the worker pool.
    fn execute<T, F>(
        &self,
        plan: &TilePlan,
        canvas: &mut ResultCanvas<T>,
        worker: &TileWorker<'_, '_, D, T>,
        state: &mut JobState,
        progress: &mut F,
    ) -> Result<Tally, RegionError>
    where
        T: Sample,
        F: FnMut(usize, usize) -> bool,
    {
        let total = plan.len();
        let poll = self.settings.poll_interval;
        let cancel = worker.cancel;
        let mut tally = Tally::default();

        let targets = canvas.tile_targets(plan);
        let jobs = plan
            .tiles
            .iter()
            .copied()
            .zip(targets)
            .map(|(tile, target)| TileJob { tile, target });

        thread::scope(|scope| -> Result<(), RegionError> {
            let (job_tx, job_rx) = crossbeam_channel::bounded(self.settings.queue_capacity);
            let (done_tx, done_rx) = crossbeam_channel::unbounded();

            for id in 0..self.settings.workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                thread::Builder::new()
                    .name(format!("region-worker-{id}"))
                    .spawn_scoped(scope, move || {
                        while let Ok(job) = job_rx.recv() {
                            if done_tx.send(worker.run(job)).is_err() {
                                break;
                            }
                        }
                    })
                    .map_err(|err| RegionError::WorkerSpawn(err.to_string()))?;
            }
            drop(job_rx);
            drop(done_tx);

            let mut report_progress = |tally: &Tally| {
                if !cancel.is_cancelled() && !progress(tally.processed(), total) {
                    debug!(processed = tally.processed(), total, "Progress callback cancelled read");
                    cancel.cancel();
                }
            };

            state.transition(JobState::Submitting);
            let mut submitted = 0;
            'submit: for job in jobs {
                let mut pending = job;
                loop {
                    if cancel.is_cancelled() {
                        break 'submit;
                    }
                    match job_tx.send_timeout(pending, poll) {
                        Ok(()) => break,
                        Err(SendTimeoutError::Timeout(job)) => pending = job,
                        Err(SendTimeoutError::Disconnected(_)) => break 'submit,
                    }
                    for outcome in done_rx.try_iter() {
                        tally.record(outcome, cancel);
                    }
                    report_progress(&tally);
                }
                submitted += 1;
                for outcome in done_rx.try_iter() {
                    tally.record(outcome, cancel);
                }
                report_progress(&tally);
            }
            drop(job_tx);

            if submitted < total {
                debug!(submitted, total, "Stopped submitting tiles");
            }

            state.transition(JobState::Draining);
            while tally.finished() < submitted {
                match done_rx.recv_timeout(poll) {
                    Ok(outcome) => tally.record(outcome, cancel),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                report_progress(&tally);
            }

            Ok(())
        })?;

        Ok(tally)
    }
}

// =============================================================================
// Tests
// =============================================================================
