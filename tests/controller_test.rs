//! Recording controller tests.
//!
//! Capture and classification are scripted; recordings are short real
//! processes so the reaper, the kill-guard and exit statuses are exercised.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tempfile::TempDir;
use tokio::process::{Child, Command};

use motion_recorder::classifier::Classifier;
use motion_recorder::controller::{Controller, ControllerSettings, RecordingState, StepOutcome};
use motion_recorder::error::{RecorderError, Result};
use motion_recorder::recording::{RecordingLauncher, RecordingLimits};
use motion_recorder::sampler::{Frame, FrameSource};

const URL: &str = "rtsp://127.0.0.1:8554/cam";

// ──────────────── fakes ───────────────────────────────────────────────────

struct Frames {
    fail: bool,
}

#[async_trait]
impl FrameSource for Frames {
    async fn capture(&self, _source: &str) -> Result<Frame> {
        if self.fail {
            Err(RecorderError::Capture("stream down".into()))
        } else {
            Ok(Frame::new(vec![0x89, b'P', b'N', b'G']))
        }
    }
}

#[derive(Clone, Copy)]
enum Verdict {
    Motion,
    Nothing,
    Unreachable,
}

/// Replays `script`, then repeats `fallback` forever.
struct Scripted {
    script: Mutex<VecDeque<Verdict>>,
    fallback: Verdict,
}

impl Scripted {
    fn always(v: Verdict) -> Self {
        Self { script: Mutex::new(VecDeque::new()), fallback: v }
    }
}

#[async_trait]
impl Classifier for Scripted {
    async fn classify(&self, _frame: Frame) -> Result<bool> {
        let next = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);
        match next {
            Verdict::Motion => Ok(true),
            Verdict::Nothing => Ok(false),
            Verdict::Unreachable => Err(RecorderError::Classification("connection refused".into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Launch {
    source: String,
    output: PathBuf,
    duration: Duration,
}

/// Spawns `program args..` in place of ffmpeg and records every launch.
#[derive(Clone)]
struct ProcessLauncher {
    program: &'static str,
    args: Vec<&'static str>,
    fail: bool,
    launches: Arc<Mutex<Vec<Launch>>>,
}

impl ProcessLauncher {
    fn new(program: &'static str, args: &[&'static str]) -> Self {
        Self {
            program,
            args: args.to_vec(),
            fail: false,
            launches: Arc::default(),
        }
    }

    fn failing() -> Self {
        Self { fail: true, ..Self::new("true", &[]) }
    }

    fn count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }
}

#[async_trait]
impl RecordingLauncher for ProcessLauncher {
    async fn launch(&self, source: &str, output: &Path, duration: Duration) -> Result<Child> {
        if self.fail {
            return Err(RecorderError::Launch("encoder missing".into()));
        }
        self.launches.lock().unwrap().push(Launch {
            source: source.to_string(),
            output: output.to_path_buf(),
            duration,
        });
        Command::new(self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecorderError::Launch(e.to_string()))
    }
}

type TestController = Controller<Frames, Scripted, ProcessLauncher>;

fn settings(base: &Path, limits: RecordingLimits) -> ControllerSettings {
    ControllerSettings {
        source: URL.into(),
        base_path: base.to_path_buf(),
        extension: "mp4".into(),
        interval: Duration::from_millis(20),
        limits,
    }
}

fn controller(
    base: &Path,
    classifier: Scripted,
    launcher: ProcessLauncher,
    limits: RecordingLimits,
) -> TestController {
    Controller::new(settings(base, limits), Frames { fail: false }, classifier, launcher)
}

fn short_limits() -> RecordingLimits {
    RecordingLimits { duration: Duration::from_secs(1), kill_guard: Duration::from_secs(10) }
}

fn tmp_dir() -> TempDir {
    tempfile::tempdir().expect("create tempdir")
}

async fn reap_within(ctl: &TestController, limit: Duration) {
    tokio::time::timeout(limit, ctl.wait_for_reapers())
        .await
        .expect("reaper finished in time");
}

// ──────────────── tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_motion_while_idle_starts_recording() {
    let dir = tmp_dir();
    let launcher = ProcessLauncher::new("sleep", &["0.3"]);
    let ctl = controller(dir.path(), Scripted::always(Verdict::Motion), launcher.clone(), short_limits());

    let path = match ctl.step().await {
        StepOutcome::RecordingStarted(path) => path,
        other => panic!("expected a recording, got {other:?}"),
    };
    assert_eq!(ctl.state(), RecordingState::Recording);
    assert!(path.starts_with(dir.path()));
    assert!(path.parent().expect("day dir").is_dir());
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp4"));

    let launches = launcher.launches.lock().unwrap().clone();
    assert_eq!(
        launches,
        vec![Launch { source: URL.into(), output: path, duration: Duration::from_secs(1) }]
    );

    reap_within(&ctl, Duration::from_secs(5)).await;
    assert_eq!(ctl.state(), RecordingState::Idle);
}

#[tokio::test]
async fn test_trigger_uses_trigger_time_for_path() {
    let dir = tmp_dir();
    let ctl = controller(
        dir.path(),
        Scripted::always(Verdict::Motion),
        ProcessLauncher::new("true", &[]),
        short_limits(),
    );
    let at = NaiveDate::from_ymd_opt(2024, 3, 5)
        .and_then(|d| d.and_hms_opt(7, 8, 9))
        .expect("valid timestamp");

    assert_eq!(
        ctl.trigger(at).await,
        StepOutcome::RecordingStarted(dir.path().join("20240305").join("motion_070809.mp4"))
    );
    reap_within(&ctl, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_motion_while_recording_is_ignored() {
    let dir = tmp_dir();
    let launcher = ProcessLauncher::new("sleep", &["30"]);
    let ctl = controller(dir.path(), Scripted::always(Verdict::Motion), launcher.clone(), RecordingLimits::default());

    assert!(matches!(ctl.step().await, StepOutcome::RecordingStarted(_)));
    let first = launcher.launches.lock().unwrap()[0].clone();

    for _ in 0..5 {
        assert_eq!(ctl.step().await, StepOutcome::AlreadyRecording);
        assert_eq!(ctl.state(), RecordingState::Recording);
    }
    assert_eq!(launcher.count(), 1);
    assert_eq!(launcher.launches.lock().unwrap()[0], first);

    tokio::time::timeout(Duration::from_secs(5), ctl.shutdown())
        .await
        .expect("shutdown");
    assert_eq!(ctl.state(), RecordingState::Idle);
}

#[tokio::test]
async fn test_abnormal_exit_still_returns_to_idle() {
    let dir = tmp_dir();
    let launcher = ProcessLauncher::new("sh", &["-c", "exit 3"]);
    let ctl = controller(dir.path(), Scripted::always(Verdict::Motion), launcher.clone(), short_limits());

    assert!(matches!(ctl.step().await, StepOutcome::RecordingStarted(_)));
    reap_within(&ctl, Duration::from_secs(5)).await;
    assert_eq!(ctl.state(), RecordingState::Idle);

    // The failed attempt is terminal for itself only.
    assert!(matches!(ctl.step().await, StepOutcome::RecordingStarted(_)));
    assert_eq!(launcher.count(), 2);
    reap_within(&ctl, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_kill_guard_bounds_recording() {
    let dir = tmp_dir();
    let limits = RecordingLimits {
        duration: Duration::from_millis(100),
        kill_guard: Duration::from_millis(300),
    };
    let ctl = controller(
        dir.path(),
        Scripted::always(Verdict::Motion),
        ProcessLauncher::new("sleep", &["30"]),
        limits,
    );

    assert!(matches!(ctl.step().await, StepOutcome::RecordingStarted(_)));
    assert_eq!(ctl.state(), RecordingState::Recording);

    reap_within(&ctl, Duration::from_secs(5)).await;
    assert_eq!(ctl.state(), RecordingState::Idle);
}

#[tokio::test]
async fn test_classifier_down_never_records() {
    let dir = tmp_dir();
    let launcher = ProcessLauncher::new("true", &[]);
    let ctl = controller(dir.path(), Scripted::always(Verdict::Unreachable), launcher.clone(), short_limits());

    for _ in 0..10 {
        assert_eq!(ctl.step().await, StepOutcome::ClassificationFailed);
        assert_eq!(ctl.state(), RecordingState::Idle);
    }
    assert_eq!(launcher.count(), 0);
}

#[tokio::test]
async fn test_capture_failure_skips_classification() {
    let dir = tmp_dir();
    let launcher = ProcessLauncher::new("true", &[]);
    let ctl = Controller::new(
        settings(dir.path(), short_limits()),
        Frames { fail: true },
        Scripted::always(Verdict::Motion),
        launcher.clone(),
    );

    assert_eq!(ctl.step().await, StepOutcome::CaptureFailed);
    assert_eq!(ctl.state(), RecordingState::Idle);
    assert_eq!(launcher.count(), 0);
}

#[tokio::test]
async fn test_negative_verdict_does_nothing() {
    let dir = tmp_dir();
    let launcher = ProcessLauncher::new("true", &[]);
    let ctl = controller(dir.path(), Scripted::always(Verdict::Nothing), launcher.clone(), short_limits());

    assert_eq!(ctl.step().await, StepOutcome::NoMotion);
    assert_eq!(ctl.state(), RecordingState::Idle);
    assert_eq!(launcher.count(), 0);
}

#[tokio::test]
async fn test_launch_failure_stays_idle() {
    let dir = tmp_dir();
    let ctl = controller(
        dir.path(),
        Scripted::always(Verdict::Motion),
        ProcessLauncher::failing(),
        short_limits(),
    );

    assert_eq!(ctl.step().await, StepOutcome::LaunchFailed);
    assert_eq!(ctl.state(), RecordingState::Idle);
    assert_eq!(ctl.step().await, StepOutcome::LaunchFailed);
}

#[tokio::test]
async fn test_prepare_failure_stays_idle() {
    let dir = tmp_dir();
    let base = dir.path().join("occupied");
    std::fs::write(&base, b"not a directory").expect("write file");

    let launcher = ProcessLauncher::new("true", &[]);
    let ctl = controller(&base, Scripted::always(Verdict::Motion), launcher.clone(), short_limits());

    assert_eq!(ctl.step().await, StepOutcome::PrepareFailed);
    assert_eq!(ctl.state(), RecordingState::Idle);
    assert_eq!(launcher.count(), 0);
}

#[tokio::test]
async fn test_mixed_verdicts() {
    let dir = tmp_dir();
    let script = Scripted {
        script: Mutex::new(VecDeque::from([
            Verdict::Unreachable,
            Verdict::Nothing,
            Verdict::Motion,
            Verdict::Motion,
            Verdict::Unreachable,
            Verdict::Nothing,
        ])),
        fallback: Verdict::Nothing,
    };
    let launcher = ProcessLauncher::new("sleep", &["30"]);
    let ctl = controller(dir.path(), script, launcher.clone(), RecordingLimits::default());

    let mut outcomes = Vec::new();
    for _ in 0..6 {
        outcomes.push(ctl.step().await);
    }
    assert_eq!(outcomes[0], StepOutcome::ClassificationFailed);
    assert_eq!(outcomes[1], StepOutcome::NoMotion);
    assert!(matches!(outcomes[2], StepOutcome::RecordingStarted(_)));
    assert_eq!(outcomes[3], StepOutcome::AlreadyRecording);
    assert_eq!(outcomes[4], StepOutcome::ClassificationFailed);
    assert_eq!(outcomes[5], StepOutcome::NoMotion);
    assert_eq!(ctl.state(), RecordingState::Recording);
    assert_eq!(launcher.count(), 1);

    tokio::time::timeout(Duration::from_secs(5), ctl.shutdown())
        .await
        .expect("shutdown");
    assert_eq!(ctl.state(), RecordingState::Idle);
}

#[tokio::test]
async fn test_run_loop_records_once_and_shuts_down() {
    let dir = tmp_dir();
    let launcher = ProcessLauncher::new("sleep", &["30"]);
    let ctl = Arc::new(controller(
        dir.path(),
        Scripted::always(Verdict::Motion),
        launcher.clone(),
        RecordingLimits::default(),
    ));

    let looped = ctl.clone();
    let handle = tokio::spawn(async move { looped.run().await });

    let started = tokio::time::timeout(Duration::from_secs(5), async {
        while ctl.state() != RecordingState::Recording {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(started.is_ok(), "loop never started a recording");

    // Many more iterations run while the recording is active.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(launcher.count(), 1);

    tokio::time::timeout(Duration::from_secs(5), ctl.shutdown())
        .await
        .expect("shutdown");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stopped")
        .expect("loop task");
    assert_eq!(ctl.state(), RecordingState::Idle);
}

#[tokio::test]
async fn test_run_loop_survives_classifier_outage() {
    let dir = tmp_dir();
    let launcher = ProcessLauncher::new("true", &[]);
    let ctl = Arc::new(controller(
        dir.path(),
        Scripted::always(Verdict::Unreachable),
        launcher.clone(),
        short_limits(),
    ));

    let looped = ctl.clone();
    let handle = tokio::spawn(async move { looped.run().await });

    // At a 20ms interval this spans well over 10 iterations.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!handle.is_finished());
    assert_eq!(launcher.count(), 0);
    assert_eq!(ctl.state(), RecordingState::Idle);

    ctl.shutdown().await;
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stopped")
        .expect("loop task");
}
