//! Runner, prober and mutator against real shell scripts.
#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use biglinux_settings::script::LOCKED_ON_MESSAGE;
use biglinux_settings::{
    Availability, DisplayState, ProcessOutcome, ProcessRunner, ScriptError, ScriptRunner,
    StateMutator, StateProber,
};
use common::{read_state, write_script, write_state_script};
use tempfile::TempDir;

fn prober() -> StateProber {
    StateProber::new(Arc::new(ProcessRunner::new()))
}

#[tokio::test]
async fn test_probe_classification_with_real_scripts() {
    let dir = TempDir::new().unwrap();
    let cases = [
        ("on.sh", "echo true", Availability::Available, DisplayState::On),
        ("upper.sh", "echo TRUE", Availability::Available, DisplayState::On),
        ("off.sh", "echo '  false  '", Availability::Available, DisplayState::Off),
        ("locked.sh", "echo true_disabled", Availability::LockedOn, DisplayState::On),
        ("empty.sh", "exit 0", Availability::Unavailable, DisplayState::Unknown),
        ("garbage.sh", "echo garbage", Availability::Unavailable, DisplayState::Unknown),
        ("error.sh", "echo true; exit 1", Availability::Unavailable, DisplayState::Unknown),
    ];
    let scripts: Vec<_> = cases
        .iter()
        .map(|(name, body, _, _)| write_script(dir.path(), name, body))
        .collect();

    let prober = prober();
    for (path, (name, _, availability, state)) in scripts.iter().zip(cases.iter()) {
        let outcome = prober.probe(path).await;
        eprintln!("[Test] {} -> {:?} / {:?}", name, outcome.availability, outcome.display_state);
        assert_eq!(outcome.availability, *availability, "{}", name);
        assert_eq!(outcome.display_state, *state, "{}", name);
    }

    let locked = prober.probe(&dir.path().join("locked.sh")).await;
    assert_eq!(locked.message, LOCKED_ON_MESSAGE);
}

#[tokio::test]
async fn test_missing_script_is_unavailable_without_launch() {
    let dir = TempDir::new().unwrap();
    let outcome = prober().probe(&dir.path().join("nope.sh")).await;
    assert_eq!(outcome.availability, Availability::Unavailable);
    assert_eq!(outcome.message, "Unavailable: script not found.");
    assert!(matches!(outcome.error, Some(ScriptError::NotFound(_))));
}

#[tokio::test]
async fn test_runner_captures_output_and_exit_code() {
    let dir = TempDir::new().unwrap();
    let path = write_script(dir.path(), "noisy.sh", "echo \"args: $*\"; echo 'oops' >&2; exit 3");

    let result = ProcessRunner::new()
        .run(&path, vec!["toggle".into(), "true".into()], Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result.outcome, ProcessOutcome::Exited(3));
    assert_eq!(result.stdout.trim(), "args: toggle true");
    assert_eq!(result.stderr.trim(), "oops");
}

#[tokio::test]
async fn test_runner_uses_working_dir() {
    let dir = TempDir::new().unwrap();
    let path = write_script(dir.path(), "pwd.sh", "pwd");
    let result = ProcessRunner::with_working_dir(dir.path())
        .run(&path, vec![], Duration::from_secs(5))
        .await
        .unwrap();
    let reported = std::fs::canonicalize(result.stdout.trim()).unwrap();
    assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
}

#[tokio::test]
async fn test_mutation_changes_state() {
    let dir = TempDir::new().unwrap();
    let path = write_state_script(dir.path(), "ssh", false);
    let mutator = StateMutator::new(Arc::new(ProcessRunner::new()));

    let outcome = mutator.mutate(&path, true, None, None).await.unwrap();
    assert!(outcome.success);
    assert_eq!(read_state(dir.path(), "ssh"), "true");

    let probe = prober().probe(&path).await;
    assert_eq!(probe.display_state, DisplayState::On);
}

#[tokio::test]
async fn test_non_zero_exit_is_failure_with_diagnostics() {
    let dir = TempDir::new().unwrap();
    let path = write_script(dir.path(), "denied.sh", "echo 'polkit: not authorized' >&2; exit 1");
    let mutator = StateMutator::new(Arc::new(ProcessRunner::new()));

    let outcome = mutator.mutate(&path, true, None, None).await.unwrap();
    assert!(!outcome.success);
    assert!(matches!(outcome.error, Some(ScriptError::NonZeroExit { code: 1, .. })));
    assert!(outcome.diagnostic().contains("polkit: not authorized"));
}

#[tokio::test]
async fn test_timeout_kills_script_and_leaves_no_zombie() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("pid");
    let path = write_script(
        dir.path(),
        "hang.sh",
        &format!("echo $$ > '{}'\nsleep 30\necho done", pid_file.display()),
    );
    let mutator = StateMutator::new(Arc::new(ProcessRunner::new()));
    let timeout = Duration::from_secs(1);

    let started = Instant::now();
    let outcome = mutator.mutate(&path, true, Some(Duration::from_secs(90)), Some(timeout)).await.unwrap();
    let elapsed = started.elapsed();
    eprintln!("[Test] timed out after {:?}", elapsed);

    assert!(!outcome.success);
    assert_eq!(outcome.timeout, timeout);
    assert!(matches!(outcome.error, Some(ScriptError::Timeout { .. })));
    assert!(elapsed < timeout + Duration::from_secs(3), "took {:?}", elapsed);
    assert!(!outcome.result.stdout.contains("done"));

    let pid: i32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
    let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None);
    assert!(alive.is_err(), "script process {} still exists", pid);
}

#[tokio::test]
async fn test_background_daemon_keeps_answer() {
    let dir = TempDir::new().unwrap();
    // The daemon inherits stdout and keeps it open after the script exits.
    let path = write_script(dir.path(), "daemon.sh", "sleep 20 &\necho true");

    let started = Instant::now();
    let outcome = prober().probe(&path).await;
    assert!(started.elapsed() < Duration::from_secs(8));
    // What the script printed before exiting still counts.
    assert_eq!(outcome.availability, Availability::Available);
    assert_eq!(outcome.display_state, DisplayState::On);
}
