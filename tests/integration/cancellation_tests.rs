//! Cancellation integration tests.
//!
//! Tests verify:
//! - A progress callback returning false stops submission
//! - External tokens cancel a read from another thread or task
//! - Partial results are returned only when configured
//! - Cancelled reads return promptly

use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use wsi_region_reader::{JobState, ReadOutcome, ReadRequest, Rect, RegionReader};

use super::test_utils::{gray_decoder, pattern, settings, Probe, ProbeDecoder};

fn slow_reader(delay_ms: u64, keep_partial: bool) -> (RegionReader<ProbeDecoder>, std::sync::Arc<Probe>) {
    let probe = Probe::new().delay(Duration::from_millis(delay_ms));
    let (decoder, probe) = ProbeDecoder::new(gray_decoder(128, 128), probe);
    let reader = RegionReader::with_settings(
        decoder,
        settings(2)
            .with_queue_capacity(2)
            .with_keep_partial_on_cancel(keep_partial),
    )
    .unwrap();
    (reader, probe)
}

fn request() -> ReadRequest {
    // 64 tiles
    ReadRequest::new(Rect::new(0, 0, 128, 128)).with_tile_size(16, 16)
}

#[test]
fn test_progress_callback_cancels() {
    let (reader, probe) = slow_reader(5, false);
    let started = Instant::now();

    let outcome = reader
        .read_region::<u8, _>(&request(), |done, _| done < 4)
        .unwrap();

    assert!(outcome.is_cancelled());
    let report = outcome.report();
    assert_eq!(report.state, JobState::Cancelled);
    assert_eq!(report.tiles_total, 64);
    assert!(report.tiles_completed >= 4);
    assert!(report.tiles_completed < 64);
    assert_eq!(
        report.tiles_skipped,
        report.tiles_total - report.tiles_completed - report.tiles_failed
    );
    // only in-flight and already queued work may still have been decoded
    assert!(probe.reads() < 32);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(outcome.into_image().is_none());
}

#[test]
fn test_no_progress_calls_after_cancel() {
    let (reader, _probe) = slow_reader(2, false);
    let mut calls_after_cancel = 0;
    let mut cancelled = false;

    let outcome = reader
        .read_region::<u8, _>(&request(), |done, _| {
            if cancelled {
                calls_after_cancel += 1;
            }
            cancelled = done >= 2;
            !cancelled
        })
        .unwrap();

    assert!(outcome.is_cancelled());
    assert_eq!(calls_after_cancel, 0);
}

#[test]
fn test_partial_result_kept_when_configured() {
    let (reader, _probe) = slow_reader(5, true);

    let outcome = reader
        .read_region::<u8, _>(&request(), |done, _| done < 8)
        .unwrap();

    let ReadOutcome::Cancelled { report, partial } = outcome else {
        panic!("expected a cancelled read");
    };
    let partial = partial.expect("partial image is kept");
    assert_eq!((partial.width(), partial.height()), (128, 128));
    assert_eq!(partial.report().state, JobState::Cancelled);

    // completed tiles carry source data, the rest stays zero
    let source = pattern(128, 128, 0);
    let plane = partial.channel(0).unwrap();
    let written = plane.iter().filter(|&&v| v != 0).count();
    assert_eq!(written, report.tiles_completed * 16 * 16);
    assert!(plane
        .iter()
        .zip(&source)
        .all(|(&got, &want)| got == 0 || got == want));
}

#[test]
fn test_external_token_from_thread() {
    let (reader, probe) = slow_reader(5, false);
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            token.cancel();
        })
    };

    let outcome = reader
        .read_region_with_token::<u8, _>(&request(), &token, |_, _| true)
        .unwrap();
    canceller.join().unwrap();

    assert!(outcome.is_cancelled());
    assert!(probe.reads.load(Ordering::SeqCst) < 64);
}

#[test]
fn test_cancelled_token_is_not_reused_across_reads() {
    let (reader, _probe) = slow_reader(0, false);

    let cancelled = reader
        .read_region::<u8, _>(&request(), |_, _| false)
        .unwrap();
    assert!(cancelled.is_cancelled());

    // a fresh read is not affected by the previous cancellation
    let complete = reader.read_region::<u8, _>(&request(), |_, _| true).unwrap();
    assert!(!complete.is_cancelled());
    assert_eq!(complete.report().tiles_completed, 64);
}

#[tokio::test]
async fn test_interrupt_task_cancels_blocking_read() {
    let (reader, _probe) = slow_reader(5, false);
    let token = CancellationToken::new();

    let interrupt = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            token.cancel();
        })
    };

    let read_token = token.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        reader.read_region_with_token::<u8, _>(&request(), &read_token, |_, _| true)
    })
    .await
    .unwrap()
    .unwrap();
    interrupt.await.unwrap();

    assert!(outcome.is_cancelled());
    assert_eq!(outcome.report().state, JobState::Cancelled);
    assert!(token.is_cancelled());
}
