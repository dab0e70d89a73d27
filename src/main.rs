//! WSI Region Reader - read regions of pyramidal images from the command line.
//!
//! This binary opens an image, runs a region read on a blocking thread and
//! writes the result. Ctrl-C cancels the read cooperatively.

use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_region_reader::{
    config::{Cli, Command, LevelsConfig, ReadConfig},
    open_pyramid, Decoder, EncodableSample, JobState, MemoryDecoder, OutputFormat, PixelType,
    ReadOutcome, ReadReport, ReadRequest, RegionEncoder, RegionError, RegionReader,
    ResolutionTable,
};

/// Exit status for a read interrupted before completion.
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Read(config) => run_read(config).await,
        Command::Levels(config) => run_levels(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_region_reader=debug"
    } else {
        "wsi_region_reader=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Read Command
// =============================================================================

async fn run_read(config: ReadConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let token = CancellationToken::new();
    let interrupt = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling read");
                token.cancel();
            }
        })
    };

    let json = config.json;
    let result = tokio::task::spawn_blocking(move || read_and_write(&config, &token)).await;
    interrupt.abort();

    let report = match result {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            error!("Region read failed: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Region read task failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_report(&report);
    }

    if report.state == JobState::Cancelled {
        ExitCode::from(EXIT_CANCELLED)
    } else {
        ExitCode::SUCCESS
    }
}

/// Open the input, read the requested region and write it out.
fn read_and_write(config: &ReadConfig, token: &CancellationToken) -> Result<ReadReport, RegionError> {
    // Fail on a bad output name before decoding anything
    OutputFormat::from_path(&config.output)?;

    let mut decoder = open_pyramid(&config.input, config.pyramid_levels)?;
    decoder.bind(config.series, 0)?;
    let region = config.region(decoder.size_x(), decoder.size_y());
    let pixel_type = decoder.pixel_type();

    let reader = RegionReader::with_settings(decoder, config.reader_settings())?;

    let mut request = ReadRequest::new(region)
        .with_series(config.series)
        .at_resolution(config.resolution)
        .with_plane(config.z, config.t);
    request.channels = config.channels();
    request.tile_width = config.tile_width;
    request.tile_height = config.tile_height;

    info!(
        input = %config.input.display(),
        x = region.x,
        y = region.y,
        width = region.width,
        height = region.height,
        resolution = config.resolution,
        workers = reader.settings().workers,
        "Reading region"
    );

    match pixel_type {
        PixelType::U8 => read_typed::<u8>(&reader, &request, config, token),
        PixelType::U16 => read_typed::<u16>(&reader, &request, config, token),
        other => Err(RegionError::Encode {
            message: format!("no output encoding for {other:?} samples"),
        }),
    }
}

fn read_typed<T: EncodableSample>(
    reader: &RegionReader<MemoryDecoder>,
    request: &ReadRequest,
    config: &ReadConfig,
    token: &CancellationToken,
) -> Result<ReadReport, RegionError> {
    let mut last_decile = 0;
    let outcome = reader.read_region_with_token::<T, _>(request, token, |done, total| {
        let decile = if total == 0 { 10 } else { done * 10 / total };
        if decile > last_decile {
            last_decile = decile;
            info!(done, total, "Progress {}%", decile * 10);
        }
        true
    })?;

    let encoder = RegionEncoder::new().with_quality(config.jpeg_quality);
    match outcome {
        ReadOutcome::Complete(image) => {
            encoder.write(&image, &config.output)?;
            info!(output = %config.output.display(), "Wrote region");
            Ok(image.report().clone())
        }
        ReadOutcome::Cancelled { report, partial } => {
            match partial {
                Some(image) => {
                    encoder.write(&image, &config.output)?;
                    warn!(output = %config.output.display(), "Wrote partial region");
                }
                None => warn!("Read cancelled, nothing written"),
            }
            Ok(report)
        }
    }
}

/// Print a human-readable summary of a read.
fn print_report(report: &ReadReport) {
    println!("State:        {}", report.state);
    println!(
        "Region:       {}x{} at ({}, {}) -> level {} (shift {}), {} downscale pass(es)",
        report.requested_region.width,
        report.requested_region.height,
        report.requested_region.x,
        report.requested_region.y,
        report.reader_level,
        report.reader_shift,
        report.residual_downscale
    );
    println!(
        "Tiles:        {} total, {} completed, {} failed, {} skipped ({}x{})",
        report.tiles_total,
        report.tiles_completed,
        report.tiles_failed,
        report.tiles_skipped,
        report.tile_width,
        report.tile_height
    );
    println!(
        "Workers:      {} ({} readers cloned)",
        report.workers, report.readers_created
    );
    println!("Elapsed:      {} ms", report.elapsed_ms);

    for failed in &report.failed_tiles {
        println!(
            "  failed tile {} at ({}, {}) {}x{}: {}",
            failed.index,
            failed.rect.x,
            failed.rect.y,
            failed.rect.width,
            failed.rect.height,
            failed.error
        );
    }
}

// =============================================================================
// Levels Command
// =============================================================================

async fn run_levels(config: LevelsConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let input = config.input.clone();
    let (levels, series) = (config.pyramid_levels, config.series);
    let result = tokio::task::spawn_blocking(move || build_table(&input, levels, series)).await;

    let table = match result {
        Ok(Ok(table)) => table,
        Ok(Err(e)) => {
            error!("Failed to read levels: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Levels task failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mapping: Vec<_> = (0..=config.max_resolution)
        .map(|requested| (requested, table.resolve(requested)))
        .collect();

    if config.json {
        let json = serde_json::json!({
            "series": table.series(),
            "levels": table.levels(),
            "resolve": mapping
                .iter()
                .map(|(requested, resolved)| serde_json::json!({
                    "requested": requested,
                    "reader_level": resolved.reader_index,
                    "reader_shift": resolved.reader_shift,
                    "residual": resolved.residual,
                }))
                .collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&json) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("Failed to serialize levels: {}", e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("Series {}", table.series());
    println!("─────────────────────────────────");
    for level in table.levels() {
        println!(
            "  shift {:>2}  level {:>2}  {} x {}",
            level.shift, level.reader_index, level.width, level.height
        );
    }
    println!();
    println!("Requested -> reader level + residual");
    for (requested, resolved) in &mapping {
        println!(
            "  {:>2} -> level {:>2} + {}",
            requested, resolved.reader_index, resolved.residual
        );
    }

    ExitCode::SUCCESS
}

fn build_table(input: &Path, levels: usize, series: usize) -> Result<ResolutionTable, RegionError> {
    let mut decoder = open_pyramid(input, levels)?;
    Ok(ResolutionTable::build(&mut decoder, series)?)
}
