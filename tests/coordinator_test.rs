//! Run coordinator integration tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use batchforge::conversion::{RunConfig, RunCoordinator, RunOutcome};
use batchforge_common::Error;
use common::{clip_names, create_inputs, ScriptedTranscoder};
use tempfile::tempdir;

#[tokio::test]
async fn converts_matching_files_only() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("input");
    create_inputs(&input, &["a.mxf", "B.MXF", "c.mov", "readme.txt"]);
    let output = temp.path().join("output");

    let engine = Arc::new(ScriptedTranscoder::new());
    let coordinator = RunCoordinator::new(engine.clone());
    let report = coordinator
        .invoke(&RunConfig::new(&input, &output))
        .await
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.summary.total_files, 2);
    assert_eq!(report.summary.completed, 2);
    assert_eq!(engine.started().len(), 2);
    assert!(output.join("a.mp4").exists());
    assert!(output.join("B.mp4").exists());
    assert!(!output.join("c.mp4").exists());
}

#[tokio::test]
async fn empty_input_completes_without_batches() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("input");
    create_inputs::<&str>(&input, &[]);

    let coordinator = RunCoordinator::new(Arc::new(ScriptedTranscoder::new()));
    let report = coordinator
        .invoke(&RunConfig::new(&input, temp.path().join("output")))
        .await
        .unwrap();

    assert_eq!(report.run.outcome, RunOutcome::Completed);
    assert!(report.run.batches.is_empty());
    assert!(temp.path().join("output").is_dir());
}

#[tokio::test]
async fn unreadable_input_directory() {
    let temp = tempdir().unwrap();
    let engine = Arc::new(ScriptedTranscoder::new());
    let coordinator = RunCoordinator::new(engine.clone());

    let err = coordinator
        .invoke(&RunConfig::new(
            temp.path().join("missing"),
            temp.path().join("output"),
        ))
        .await
        .unwrap_err();

    assert_matches!(err, Error::DirectoryUnreadable { .. });
    assert!(engine.started().is_empty());
}

#[tokio::test]
async fn halted_run_is_reported_not_raised() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("input");
    create_inputs(&input, &clip_names(7));

    let coordinator =
        RunCoordinator::new(Arc::new(ScriptedTranscoder::new().failing("clip06.mxf")));
    let report = coordinator
        .invoke(&RunConfig::new(&input, temp.path().join("output")))
        .await
        .unwrap();

    assert_eq!(report.run.outcome, RunOutcome::Halted);
    assert_eq!(report.summary.completed, 5);
    assert_matches!(report.halt_error(), Some(Error::RunHalted { batch: 2, .. }));
    assert!(report.message().contains("clip06.mxf"));
}

#[tokio::test]
async fn overlapping_run_on_same_directories_is_rejected() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("input");
    create_inputs(&input, &clip_names(2));
    let config = RunConfig::new(&input, temp.path().join("output"));

    let engine = Arc::new(ScriptedTranscoder::new().with_duration(Duration::from_millis(500)));
    let coordinator = Arc::new(RunCoordinator::new(engine.clone()));

    let first = {
        let coordinator = Arc::clone(&coordinator);
        let config = config.clone();
        tokio::spawn(async move { coordinator.invoke(&config).await })
    };

    // Wait until the first run is converting.
    for _ in 0..100 {
        if !engine.started().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(coordinator.is_running(&config));

    let err = coordinator.invoke(&config).await.unwrap_err();
    assert_matches!(err, Error::RunInProgress { .. });

    let report = first.await.unwrap().unwrap();
    assert!(report.is_completed());
    assert!(!coordinator.is_running(&config));

    // The lock is released once the first run finishes.
    assert!(coordinator.invoke(&config).await.unwrap().is_completed());
}

#[tokio::test]
async fn runs_on_different_directories_proceed_together() {
    let temp = tempdir().unwrap();
    let engine = Arc::new(ScriptedTranscoder::new().with_duration(Duration::from_millis(100)));
    let coordinator = Arc::new(RunCoordinator::new(engine));

    let mut configs = Vec::new();
    for name in ["a", "b"] {
        let input = temp.path().join(name).join("input");
        create_inputs(&input, &clip_names(2));
        configs.push(RunConfig::new(&input, temp.path().join(name).join("output")));
    }

    let (left, right) = tokio::join!(
        coordinator.invoke(&configs[0]),
        coordinator.invoke(&configs[1])
    );
    assert!(left.unwrap().is_completed());
    assert!(right.unwrap().is_completed());
}

#[tokio::test]
async fn differently_spelled_directories_share_the_lock() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("input");
    create_inputs(&input, &clip_names(2));
    let config = RunConfig::new(&input, temp.path().join("output"));
    let respelled = RunConfig::new(input.join("."), temp.path().join("output/"));

    let engine = Arc::new(ScriptedTranscoder::new().with_duration(Duration::from_millis(500)));
    let coordinator = Arc::new(RunCoordinator::new(engine.clone()));

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.invoke(&config).await })
    };
    for _ in 0..100 {
        if !engine.started().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(coordinator.is_running(&respelled));
    let err = coordinator.invoke(&respelled).await.unwrap_err();
    assert_matches!(err, Error::RunInProgress { .. });

    assert!(first.await.unwrap().unwrap().is_completed());
}

// Needs a case-sensitive filesystem to hold both files.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn case_variants_mapping_to_one_output_are_rejected() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("input");
    create_inputs(&input, &["a.MXF", "a.mxf", "b.mxf"]);

    let engine = Arc::new(ScriptedTranscoder::new());
    let coordinator = RunCoordinator::new(engine.clone());
    let err = coordinator
        .invoke(&RunConfig::new(&input, temp.path().join("output")))
        .await
        .unwrap_err();

    assert_matches!(
        err,
        Error::Validation(ref message) if message.contains("a.MXF") && message.contains("a.mxf")
    );
    assert!(engine.started().is_empty());
}
