// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Chaos tests: inject copy failures and verify graceful degradation.
//!
//! These tests verify that failing disks, corrupted copies, racing writers and
//! shutdown mid-retry never leave a partial file under a final name and never
//! hang the controller.
//!
//! Run with: cargo test --test chaos_tests -- --nocapture

mod common;

use common::*;
use file_replicator::batch::{replicate_all, BatchKind, BatchPlan};
use file_replicator::config::CopyConfig;
use file_replicator::{
    AttemptOutcome, ChangeBatch, CopyOutcome, CopyVerifier, ExtensionFilter, FileTransfer,
    MemoryWatermarkStore, ReplicationController,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn fast_copy_config() -> CopyConfig {
    CopyConfig {
        retry_delay: "10ms".to_string(),
        ..Default::default()
    }
}

fn verifier(config: &CopyConfig, transfer: Arc<dyn FileTransfer>) -> (CopyVerifier, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let verifier = CopyVerifier::new(config, Arc::new(ExtensionFilter::new(".fits")), shutdown_rx)
        .with_transfer(transfer);
    (verifier, shutdown_tx)
}

// =============================================================================
// Failing Copies
// =============================================================================

/// Test: A file that never copies is attempted exactly max_attempts times
#[tokio::test]
async fn copy_failures_bounded_by_max_attempts() {
    let env = TestEnv::new();
    let file = env.write_source("a.fits", b"payload", 1);
    let transfer = Arc::new(FlakyTransfer::always_failing());
    let (verifier, _shutdown) = verifier(&fast_copy_config(), transfer.clone());

    let outcome = verifier.replicate(&file.path, &env.dst).await;

    match outcome {
        CopyOutcome::Exhausted { attempts } => {
            assert_eq!(attempts.len(), 5);
            let numbers: Vec<u32> = attempts.iter().map(|a| a.attempt).collect();
            assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
            assert!(attempts
                .iter()
                .all(|a| matches!(a.outcome, AttemptOutcome::IoError { kind: io::ErrorKind::Other, .. })));
        }
        other => panic!("expected Exhausted, got {:?}", other),
    }
    assert_eq!(transfer.copies(), 5);
    // Neither the final name nor the partial staging file survives.
    assert!(env.dest_names().is_empty());
}

/// Test: Success on any attempt up to the last is a success
#[tokio::test]
async fn copy_recovers_on_any_attempt() {
    for failures in 0..5u32 {
        let env = TestEnv::new();
        let file = env.write_source("a.fits", b"payload", 1);
        let transfer = Arc::new(FlakyTransfer::new(failures));
        let (verifier, _shutdown) = verifier(&fast_copy_config(), transfer.clone());

        let outcome = verifier.replicate(&file.path, &env.dst).await;

        let CopyOutcome::Replicated(replicated) = outcome else {
            panic!("expected success after {} failures, got {:?}", failures, outcome);
        };
        assert_eq!(replicated.attempts.len(), failures as usize + 1);
        assert_eq!(replicated.attempts.last().unwrap().outcome, AttemptOutcome::Success);
        assert_eq!(transfer.copies(), failures + 1);
        assert_eq!(env.dest_names(), vec!["a.fits"]);
        assert_eq!(env.dest_contents("a.fits").unwrap(), b"payload");
    }
}

/// Test: An interrupted copy is transient and retried
#[tokio::test]
async fn interrupted_copy_is_retried() {
    let env = TestEnv::new();
    let file = env.write_source("a.fits", b"payload", 1);
    let transfer = Arc::new(FlakyTransfer::with_kind(2, io::ErrorKind::Interrupted));
    let (verifier, _shutdown) = verifier(&fast_copy_config(), transfer);

    let outcome = verifier.replicate(&file.path, &env.dst).await;

    let CopyOutcome::Replicated(replicated) = outcome else {
        panic!("expected success, got {:?}", outcome);
    };
    let outcomes: Vec<&AttemptOutcome> = replicated.attempts.iter().map(|a| &a.outcome).collect();
    assert_eq!(
        outcomes,
        vec![&AttemptOutcome::Interrupted, &AttemptOutcome::Interrupted, &AttemptOutcome::Success]
    );
}

// =============================================================================
// Corrupted Copies
// =============================================================================

/// Test: A corrupted copy is detected by digest and retried
#[tokio::test]
async fn corrupted_copy_is_retried() {
    let env = TestEnv::new();
    let file = env.write_source("a.fits", b"SIMPLE  =                    T", 1);
    let transfer = Arc::new(CorruptingTransfer::new(2));
    let (verifier, _shutdown) = verifier(&fast_copy_config(), transfer.clone());

    let outcome = verifier.replicate(&file.path, &env.dst).await;

    let CopyOutcome::Replicated(replicated) = outcome else {
        panic!("expected success, got {:?}", outcome);
    };
    assert_eq!(replicated.attempts.len(), 3);
    for attempt in &replicated.attempts[..2] {
        match &attempt.outcome {
            AttemptOutcome::ChecksumMismatch { expected, actual } => assert_ne!(expected, actual),
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }
    assert_eq!(transfer.copies(), 3);
    assert_eq!(env.dest_contents("a.fits").unwrap(), b"SIMPLE  =                    T");
}

/// Test: A copy that is always corrupted never becomes visible
#[tokio::test]
async fn always_corrupted_copy_never_committed() {
    let env = TestEnv::new();
    let file = env.write_source("a.fits", b"payload", 1);
    let (verifier, _shutdown) = verifier(&fast_copy_config(), Arc::new(CorruptingTransfer::new(u32::MAX)));

    let outcome = verifier.replicate(&file.path, &env.dst).await;

    assert!(matches!(outcome, CopyOutcome::Exhausted { ref attempts } if attempts.len() == 5));
    assert!(env.dest_names().is_empty());
}

/// Test: Empty files replicate (digest of nothing still verifies)
#[tokio::test]
async fn empty_file_replicates() {
    let env = TestEnv::new();
    let file = env.write_source("empty.fits", b"", 1);
    let (verifier, _shutdown) = verifier(&fast_copy_config(), Arc::new(file_replicator::LocalTransfer));

    let outcome = verifier.replicate(&file.path, &env.dst).await;

    assert!(matches!(outcome, CopyOutcome::Replicated(ref f) if f.bytes == 0));
    assert_eq!(env.dest_contents("empty.fits").unwrap(), b"");
}

// =============================================================================
// Races
// =============================================================================

/// Test: A writer that creates the final name mid-copy wins
#[tokio::test]
async fn racing_writer_is_not_clobbered() {
    let env = TestEnv::new();
    let file = env.write_source("a.fits", b"replicated", 1);
    let transfer = Arc::new(RacingWriterTransfer { contents: b"written downstream" });
    let (verifier, _shutdown) = verifier(&fast_copy_config(), transfer);

    let outcome = verifier.replicate(&file.path, &env.dst).await;

    assert_eq!(outcome, CopyOutcome::Conflict { path: env.dst.join("a.fits") });
    assert_eq!(env.dest_contents("a.fits").unwrap(), b"written downstream");
    assert_eq!(env.dest_names(), vec!["a.fits"]);
}

/// Test: Concurrent copies never exceed the configured limit
#[tokio::test]
async fn concurrent_copies_respect_limit() {
    let env = TestEnv::new();
    let files: Vec<_> = (0..8)
        .map(|i| env.write_source(&format!("f{}.fits", i), b"data", i))
        .collect();
    let config = CopyConfig {
        max_concurrent_copies: 2,
        ..fast_copy_config()
    };
    let transfer = Arc::new(SlowTransfer::new(Duration::from_millis(50)));
    let (verifier, _shutdown) = verifier(&config, transfer.clone());

    let result = replicate_all(&verifier, BatchPlan::catch_up(files), &env.dst, BatchKind::CatchUp).await;

    assert_eq!(result.replicated.len(), 8);
    assert!(result.is_full_success());
    assert!(transfer.peak() <= 2, "peak concurrency {} exceeded limit", transfer.peak());
    assert!(transfer.peak() >= 1);
}

// =============================================================================
// Shutdown
// =============================================================================

/// Test: Detach interrupts a batch stuck in a long retry sleep
#[tokio::test]
async fn detach_interrupts_retry_sleep() {
    let env = TestEnv::new();
    let dir = Arc::new(FakeMonitoredDir::new());
    dir.set_high_water(ts(100));
    let store = Arc::new(MemoryWatermarkStore::with_value(ts(100)));
    let mut config = env.config();
    config.settings.copy.retry_delay = "1h".to_string();

    let controller = Arc::new(
        ReplicationController::new(config, dir, store)
            .unwrap()
            .with_transfer(Arc::new(FlakyTransfer::always_failing())),
    );
    controller.attach().await.unwrap();

    let batch = ChangeBatch::new(ts(200)).with_added(env.write_source("a.fits", b"a", 150));
    let in_flight = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.on_change_batch(batch).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    tokio::time::timeout(Duration::from_secs(5), controller.detach())
        .await
        .expect("detach should not wait out the retry delay")
        .unwrap();

    let result = in_flight.await.unwrap().unwrap();
    assert_eq!(result.interrupted, vec![env.src.join("a.fits")]);
    assert!(result.failed.is_empty());
    assert!(env.dest_names().is_empty());
}

/// Test: Shutdown before the first attempt copies nothing
#[tokio::test]
async fn shutdown_before_copy_is_interrupted() {
    let env = TestEnv::new();
    let file = env.write_source("a.fits", b"payload", 1);
    let transfer = Arc::new(FlakyTransfer::new(0));
    let (verifier, shutdown) = verifier(&fast_copy_config(), transfer.clone());
    shutdown.send_replace(true);

    let outcome = verifier.replicate(&file.path, &env.dst).await;

    assert!(matches!(outcome, CopyOutcome::Interrupted { ref attempts } if attempts.is_empty()));
    assert_eq!(transfer.copies(), 0);
    assert!(env.dest_names().is_empty());
}

/// Test: Detach while the run loop is busy neither deadlocks nor leaves staging files behind
#[tokio::test]
async fn detach_under_load_leaves_no_staging_files() {
    let env = TestEnv::new();
    let dir = Arc::new(FakeMonitoredDir::new());
    dir.set_high_water(ts(0));
    let store = Arc::new(MemoryWatermarkStore::with_value(ts(0)));
    let controller = Arc::new(
        ReplicationController::new(env.config(), Arc::clone(&dir), Arc::clone(&store))
            .unwrap()
            .with_transfer(Arc::new(SlowTransfer::new(Duration::from_millis(20)))),
    );
    controller.attach().await.unwrap();

    let (tx, rx) = tokio::sync::mpsc::channel(16);
    let runner = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run(rx).await })
    };
    for i in 1..=10 {
        let files = (0..4)
            .map(|j| env.write_source(&format!("b{:02}f{}.fits", i, j), b"data", i * 10))
            .collect();
        tx.send(dir.batch(i * 10, files)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(30)).await;

    controller.detach().await.unwrap();
    let stopped = tokio::time::timeout(Duration::from_secs(5), runner).await;
    assert!(stopped.is_ok(), "run loop should stop after detach");

    assert!(env.dest_names().iter().all(|n| n.ends_with(".fits")));
}
