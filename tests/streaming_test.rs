//! Stream monitor against real shell scripts.
//!
//! Covers marker classification end to end, exit-code mapping, cancellation
//! through the watch channel (per stream when started from the panel) and
//! result extraction from the captured log.
#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use biglinux_settings::{
    Completion, EngineSettings, PanelController, PanelEvent, ProcessRunner, StreamEvent,
    StreamMonitor, StreamRequest, ToggleRegistry,
};
use common::write_script;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

async fn run(monitor: &StreamMonitor, request: StreamRequest) -> (biglinux_settings::StreamOutcome, Vec<StreamEvent>) {
    let (tx, mut rx) = mpsc::channel(64);
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let outcome = monitor.run_streaming(&request, tx, cancel_rx).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (outcome, events)
}

#[tokio::test]
async fn test_markers_are_classified_in_order() {
    let dir = TempDir::new().unwrap();
    let path = write_script(
        dir.path(),
        "install.sh",
        "echo 'PROGRESS:50'\necho 'STATUS: Doing thing'\necho 'plain log'\necho 'PROGRESS:abc'",
    );

    let (outcome, events) = run(&StreamMonitor::default(), StreamRequest::new(&path, &[])).await;
    eprintln!("[Test] events: {:?}", events);

    assert_eq!(outcome.completion, Completion::Succeeded);
    assert_eq!(outcome.exit_code, Some(0));
    assert_eq!(
        events,
        vec![
            StreamEvent::Progress(0.5),
            StreamEvent::Status("Doing thing".to_string()),
            StreamEvent::LogLine("plain log".to_string()),
        ]
    );
    assert_eq!(outcome.log, vec!["plain log".to_string()]);
}

#[tokio::test]
async fn test_stderr_lines_are_log_lines() {
    let dir = TempDir::new().unwrap();
    let path = write_script(dir.path(), "mixed.sh", "echo out\necho err >&2");

    let (outcome, events) = run(&StreamMonitor::default(), StreamRequest::new(&path, &[])).await;
    assert!(outcome.succeeded());
    assert_eq!(events.len(), 2);
    assert!(events.contains(&StreamEvent::LogLine("out".to_string())));
    assert!(events.contains(&StreamEvent::LogLine("err".to_string())));
}

#[tokio::test]
async fn test_exit_codes_map_to_completion() {
    let dir = TempDir::new().unwrap();
    let cases = [
        ("ok.sh", "exit 0", Completion::Succeeded),
        ("denied.sh", "exit 126", Completion::Cancelled),
        ("dismissed.sh", "exit 127", Completion::Cancelled),
        ("broken.sh", "exit 3", Completion::Failed),
    ];
    let scripts: Vec<_> = cases
        .iter()
        .map(|(name, body, _)| write_script(dir.path(), name, body))
        .collect();

    let monitor = StreamMonitor::default();
    for (path, (name, _, expected)) in scripts.iter().zip(cases.iter()) {
        let (outcome, _) = run(&monitor, StreamRequest::new(path, &[])).await;
        assert_eq!(outcome.completion, *expected, "{}", name);
    }
}

#[tokio::test]
async fn test_missing_script_fails_with_error() {
    let dir = TempDir::new().unwrap();
    let (outcome, events) = run(
        &StreamMonitor::default(),
        StreamRequest::new(dir.path().join("absent.sh"), &[]),
    )
    .await;

    assert_eq!(outcome.completion, Completion::Failed);
    assert!(outcome.exit_code.is_none());
    assert!(outcome.error.is_some());
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_cancel_terminates_running_script() {
    let dir = TempDir::new().unwrap();
    let path = write_script(dir.path(), "slow.sh", "echo started\nsleep 30\necho finished");
    let monitor = StreamMonitor::default();
    let request = StreamRequest::new(&path, &[]);

    let (tx, mut rx) = mpsc::channel(64);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { monitor.run_streaming(&request, tx, cancel_rx).await });

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("script never started");
    assert_eq!(first, Some(StreamEvent::LogLine("started".to_string())));

    cancel_tx.send(true).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("cancel did not stop the script")
        .unwrap();

    assert_eq!(outcome.completion, Completion::Cancelled);
    assert!(!outcome.log.contains(&"finished".to_string()));
}

#[tokio::test]
async fn test_cancel_reaches_script_that_closed_its_output() {
    let dir = TempDir::new().unwrap();
    let path = write_script(dir.path(), "quiet.sh", "exec >/dev/null 2>&1\nsleep 30");
    let monitor = StreamMonitor::default();
    let request = StreamRequest::new(&path, &[]);

    let (tx, _rx) = mpsc::channel(64);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { monitor.run_streaming(&request, tx, cancel_rx).await });

    // Give the script time to drop both pipes and park in `sleep`.
    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel_tx.send(true).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("cancel did not stop the script")
        .unwrap();

    assert_eq!(outcome.completion, Completion::Cancelled);
    assert!(outcome.exit_code.is_none());
}

#[tokio::test]
async fn test_arguments_and_results_are_reported() {
    let dir = TempDir::new().unwrap();
    let path = write_script(
        dir.path(),
        "report.sh",
        r#"echo "mode $1"
echo "RESULT: installed = $2"
echo "RESULT: reboot=no"
echo "=== Summary ==="
echo "====="
echo "Kernel: linux612"
echo "Driver: nvidia: open""#,
    );

    let request = StreamRequest::new(&path, &["install", "yes"]);
    let (outcome, _) = run(&StreamMonitor::default(), request).await;

    assert!(outcome.succeeded());
    assert_eq!(outcome.log[0], "mode install");
    assert_eq!(
        outcome.results(),
        vec![
            ("installed".to_string(), "yes".to_string()),
            ("reboot".to_string(), "no".to_string()),
        ]
    );
    assert_eq!(
        outcome.report("=== Summary ==="),
        vec![
            ("Kernel".to_string(), "linux612".to_string()),
            ("Driver".to_string(), "nvidia: open".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_elevated_request_goes_through_wrapper() {
    let dir = TempDir::new().unwrap();
    let wrapper = write_script(dir.path(), "fake-pkexec", "echo 'STATUS: elevated'\nexec \"$@\"");
    let path = write_script(dir.path(), "root-only.sh", "echo \"as root: $1\"");

    let monitor = StreamMonitor::new(wrapper.to_string_lossy());
    let (outcome, events) = run(&monitor, StreamRequest::new(&path, &["apply"]).elevated()).await;

    assert!(outcome.succeeded());
    assert_eq!(
        events,
        vec![
            StreamEvent::Status("elevated".to_string()),
            StreamEvent::LogLine("as root: apply".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_cancelling_one_stream_leaves_others_running() {
    let dir = TempDir::new().unwrap();
    let path = write_script(dir.path(), "install.sh", "echo \"started $1\"\nsleep 30");
    let (controller, mut rx) = PanelController::new(
        ToggleRegistry::new(),
        Arc::new(ProcessRunner::new()),
        &EngineSettings::default(),
    );

    let first = controller.spawn_stream(StreamRequest::new(&path, &["first"]));
    let second = controller.spawn_stream(StreamRequest::new(&path, &["second"]));
    assert_ne!(first.id, second.id);

    let mut started = 0;
    while started < 2 {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("streams never started");
        if matches!(event, Some(PanelEvent::Stream(StreamEvent::LogLine(_)))) {
            started += 1;
        }
    }

    assert!(controller.cancel_stream(first.id));
    tokio::time::timeout(Duration::from_secs(5), first.task)
        .await
        .expect("cancel did not stop the first stream")
        .unwrap();
    let finished = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert!(matches!(
        finished,
        Some(PanelEvent::StreamFinished(outcome)) if outcome.completion == Completion::Cancelled
    ));
    assert!(!controller.cancel_stream(first.id));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!second.task.is_finished());

    assert_eq!(controller.cancel_all_streams(), 1);
    tokio::time::timeout(Duration::from_secs(5), second.task)
        .await
        .expect("cancel did not stop the second stream")
        .unwrap();
}
