// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! End-to-end checkpoint/restore lifecycle tests.
//!
//! The snapshot engine and layer store are replaced by in-memory fakes; the
//! local network, mounts and state store are the real implementations over
//! a temporary directory.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::oneshot;

use stasis_core::container::{Link, FAILED_EXIT_CODE, STOPPED_EXIT_CODE};
use stasis_core::error::{CommitError, SetupStep};
use stasis_core::events::EventAction;
use stasis_core::layer::LayerStore;
use stasis_core::mounts::LocalMounts;
use stasis_core::network::LocalNetwork;
use stasis_core::options::DEFAULT_IMAGES_DIR;
use stasis_core::prepare::SHM_DIR;
use stasis_core::store::StateStore;
use stasis_core::{
    CommitConfig, Config, Container, ContainerHandle, ContainerId, ContainerName, ContainerSlot, Daemon,
    ImageId, PreconditionError, RestoreNotifier, Runtime, RuntimeSettings, SnapshotEngine,
    SnapshotError, SnapshotOptions, StasisError,
};

// =============================================================================
// Fakes
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Replay {
    /// Report `pid` running, then exit when the test says so.
    Run { pid: u32 },
    /// Exit with this code without ever reporting a pid.
    Exit(i32),
    /// Fail before producing a process.
    Fail,
    /// Never resolve.
    Hang,
}

#[derive(Debug)]
struct FakeEngine {
    replay: Mutex<Replay>,
    fail_capture: AtomicBool,
    captures: AtomicUsize,
    replays: AtomicUsize,
    exits: Mutex<Vec<Option<oneshot::Sender<i32>>>>,
    terminated: Mutex<Vec<u32>>,
    last_replay: Mutex<Option<SnapshotOptions>>,
}

impl FakeEngine {
    fn new() -> Self {
        Self {
            replay: Mutex::new(Replay::Run { pid: 4242 }),
            fail_capture: AtomicBool::new(false),
            captures: AtomicUsize::new(0),
            replays: AtomicUsize::new(0),
            exits: Mutex::new(Vec::new()),
            terminated: Mutex::new(Vec::new()),
            last_replay: Mutex::new(None),
        }
    }

    fn script(&self, replay: Replay) {
        *self.replay.lock().unwrap() = replay;
    }

    /// Let the process of the `index`th running replay exit.
    fn exit(&self, index: usize, code: i32) {
        let tx = self.exits.lock().unwrap()[index].take().unwrap();
        tx.send(code).unwrap();
    }

    fn last_replay(&self) -> SnapshotOptions {
        self.last_replay.lock().unwrap().clone().unwrap()
    }

    fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotEngine for FakeEngine {
    async fn capture(
        &self,
        _container: &ContainerHandle,
        _opts: &SnapshotOptions,
    ) -> Result<(), SnapshotError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if self.fail_capture.load(Ordering::SeqCst) {
            return Err(SnapshotError::CaptureFailed {
                reason: "dump failed".to_string(),
            });
        }
        Ok(())
    }

    async fn replay(
        &self,
        _container: &ContainerHandle,
        opts: &SnapshotOptions,
        notifier: RestoreNotifier,
    ) -> Result<i32, SnapshotError> {
        self.replays.fetch_add(1, Ordering::SeqCst);
        *self.last_replay.lock().unwrap() = Some(opts.clone());

        let script = *self.replay.lock().unwrap();
        match script {
            Replay::Run { pid } => {
                let (tx, rx) = oneshot::channel();
                self.exits.lock().unwrap().push(Some(tx));
                notifier.restored(pid);
                Ok(rx.await.unwrap_or(FAILED_EXIT_CODE))
            }
            Replay::Exit(code) => Ok(code),
            Replay::Fail => Err(SnapshotError::ReplayFailed {
                reason: "restore failed".to_string(),
            }),
            Replay::Hang => std::future::pending().await,
        }
    }

    async fn terminate(&self, pid: u32) -> Result<(), SnapshotError> {
        self.terminated.lock().unwrap().push(pid);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FakeLayers {
    fail: AtomicBool,
    commits: AtomicUsize,
    last: Mutex<Option<ImageId>>,
}

impl FakeLayers {
    fn last(&self) -> ImageId {
        self.last.lock().unwrap().clone().unwrap()
    }
}

#[async_trait]
impl LayerStore for FakeLayers {
    async fn commit(
        &self,
        _container: &ContainerHandle,
        config: CommitConfig,
    ) -> Result<ImageId, CommitError> {
        assert!(config.pause);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CommitError::Write {
                image_id: "pending".to_string(),
                source: std::io::Error::other("disk full"),
            });
        }
        let n = self.commits.fetch_add(1, Ordering::SeqCst) as u8 + 1;
        let id = ImageId::from_digest(&[n; 32]);
        *self.last.lock().unwrap() = Some(id.clone());
        Ok(id)
    }
}

struct Harness {
    tmp: TempDir,
    daemon: Daemon,
    engine: Arc<FakeEngine>,
    layers: Arc<FakeLayers>,
    network: Arc<LocalNetwork>,
}

impl Harness {
    fn new() -> Self {
        Self::with_settings(RuntimeSettings::default())
    }

    fn with_settings(settings: RuntimeSettings) -> Self {
        let tmp = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::new());
        let layers = Arc::new(FakeLayers::default());
        let network = Arc::new(LocalNetwork::new());

        let runtime = Runtime::new(
            engine.clone(),
            layers.clone(),
            network.clone(),
            Arc::new(LocalMounts),
            StateStore::new(tmp.path()),
        )
        .with_settings(settings);

        Self {
            tmp,
            daemon: Daemon::with_runtime(runtime),
            engine,
            layers,
            network,
        }
    }

    fn store(&self) -> StateStore {
        StateStore::new(self.tmp.path())
    }

    fn add(&self, name: &str, running: bool) -> ContainerSlot {
        let id = ContainerId::generate();
        let root = self.store().container_root(&id);
        let mut container = Container::new(id, ContainerName::new(name).unwrap(), root);
        std::fs::create_dir_all(container.rootfs()).unwrap();
        if running {
            container.state.running = true;
            container.state.pid = Some(100);
        }
        self.daemon.register(container).unwrap()
    }
}

async fn snapshot(slot: &ContainerSlot) -> String {
    serde_json::to_string(&*slot.lock().await).unwrap()
}

async fn next_die(rx: &mut tokio::sync::broadcast::Receiver<stasis_core::events::ContainerEvent>) -> Option<i32> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if event.action == EventAction::Die {
                return event.exit_code;
            }
        }
    })
    .await
    .unwrap()
}

fn explicit_images(dir: PathBuf) -> SnapshotOptions {
    SnapshotOptions {
        images_directory: Some(dir),
        ..Default::default()
    }
}

// =============================================================================
// Checkpoint
// =============================================================================

#[tokio::test]
async fn test_checkpoint_not_running_changes_nothing() {
    let h = Harness::new();
    let slot = h.add("web", false);
    let before = snapshot(&slot).await;

    let err = h
        .daemon
        .checkpoint("web", &SnapshotOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StasisError::Precondition(PreconditionError::NotRunning(_))
    ));
    assert_eq!(snapshot(&slot).await, before);
    assert_eq!(h.engine.captures.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_checkpoint_records_committed_image() {
    let h = Harness::new();
    let slot = h.add("web", true);

    h.daemon
        .checkpoint("web", &SnapshotOptions::default())
        .await
        .unwrap();

    let c = slot.lock().await;
    let images_dir = c.root.join(DEFAULT_IMAGES_DIR);
    assert!(c.is_checkpointed());
    assert!(!c.is_running());
    assert_eq!(c.checkpoint_images.len(), 1);
    assert_eq!(c.checkpoint_images.lookup(&images_dir), Some(&h.layers.last()));
    assert_eq!(c.image_id.as_ref(), Some(&h.layers.last()));
    assert!(images_dir.is_dir());

    let persisted = h.store().load(&c.id).unwrap();
    assert!(persisted.is_checkpointed());
    assert_eq!(persisted.checkpoint_images, c.checkpoint_images);
}

#[tokio::test]
async fn test_checkpoint_leave_running() {
    let h = Harness::new();
    let slot = h.add("web", true);
    let opts = SnapshotOptions {
        leave_running: true,
        ..Default::default()
    };

    h.daemon.checkpoint("web", &opts).await.unwrap();
    // The default directories already exist the second time.
    h.daemon.checkpoint("web", &opts).await.unwrap();

    let c = slot.lock().await;
    assert!(c.is_running());
    assert!(c.is_checkpointed());
    assert_eq!(c.state.pid, Some(100));
    // Same path, overwritten by the second commit.
    assert_eq!(c.checkpoint_images.len(), 1);
    assert_eq!(h.layers.commits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_checkpoint_capture_failure_leaves_container_running() {
    let h = Harness::new();
    let slot = h.add("web", true);
    h.engine.fail_capture.store(true, Ordering::SeqCst);

    let err = h
        .daemon
        .checkpoint("web", &SnapshotOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StasisError::Snapshot {
            action: "checkpoint",
            ..
        }
    ));
    let c = slot.lock().await;
    assert!(c.is_running());
    assert!(!c.is_checkpointed());
    assert!(c.checkpoint_images.is_empty());
    assert_eq!(h.layers.commits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_checkpoint_commit_failure_is_reported_distinctly() {
    let h = Harness::new();
    let slot = h.add("web", true);
    h.layers.fail.store(true, Ordering::SeqCst);

    let err = h
        .daemon
        .checkpoint("web", &SnapshotOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StasisError::Bookkeeping {
            step: "filesystem commit",
            ..
        }
    ));
    let c = slot.lock().await;
    // Captured and stopped, but nothing recorded for the path.
    assert!(c.is_checkpointed());
    assert!(!c.is_running());
    assert!(c.checkpoint_images.is_empty());
}

// =============================================================================
// Restore preconditions
// =============================================================================

#[tokio::test]
async fn test_restore_preconditions_short_circuit() {
    let h = Harness::new();
    h.add("running", true);
    h.add("fresh", false);
    let opts = SnapshotOptions {
        tcp_established: true,
        ..explicit_images(h.tmp.path().join("images"))
    };

    let err = h.daemon.restore("running", &opts, false).await.unwrap_err();
    assert!(matches!(
        err,
        StasisError::Precondition(PreconditionError::AlreadyRunning(_))
    ));

    let err = h.daemon.restore("fresh", &opts, false).await.unwrap_err();
    assert!(matches!(
        err,
        StasisError::Precondition(PreconditionError::NotCheckpointed(_))
    ));

    assert_eq!(h.engine.replays.load(Ordering::SeqCst), 0);
    assert_eq!(h.network.endpoint_count(), 0);
    assert!(!h.tmp.path().join("images").exists());
}

#[tokio::test]
async fn test_force_restore_never_checkpointed_without_images() {
    let h = Harness::new();
    let slot = h.add("b", false);
    let before = snapshot(&slot).await;

    let opts = SnapshotOptions {
        images_directory: Some(PathBuf::new()),
        ..Default::default()
    };
    let err = h.daemon.restore("b", &opts, true).await.unwrap_err();

    assert!(matches!(
        err,
        StasisError::Precondition(PreconditionError::MissingImageDirectory(_))
    ));
    assert_eq!(snapshot(&slot).await, before);
}

#[tokio::test]
async fn test_force_restore_with_explicit_images() {
    let h = Harness::new();
    let slot = h.add("b", false);
    std::fs::create_dir(h.tmp.path().join("images")).unwrap();
    let opts = SnapshotOptions {
        force_restore: true,
        ..explicit_images(h.tmp.path().join("images"))
    };

    h.daemon.restore("b", &opts, false).await.unwrap();

    assert!(slot.lock().await.is_running());
    assert_eq!(
        h.engine.last_replay().images_directory,
        Some(h.tmp.path().join("images"))
    );
}

#[tokio::test]
async fn test_force_restore_over_running_container() {
    let h = Harness::new();
    h.add("web", true);
    let opts = explicit_images(h.tmp.path().join("images"));

    let err = h.daemon.restore("web", &opts, true).await.unwrap_err();
    assert!(matches!(
        err,
        StasisError::Precondition(PreconditionError::ForceRestoreWhileRunning(_))
    ));
    assert_eq!(h.engine.replays.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_restore_from_missing_images_directory() {
    let h = Harness::new();
    let slot = h.add("b", false);
    let missing = h.tmp.path().join("no-such-checkpoint");

    let err = h
        .daemon
        .restore("b", &explicit_images(missing.clone()), true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StasisError::Setup {
            step: SetupStep::Directories,
            ..
        }
    ));
    assert!(!missing.exists());
    assert_eq!(h.engine.replays.load(Ordering::SeqCst), 0);
    assert!(!slot.lock().await.is_running());
}

// =============================================================================
// Restore race
// =============================================================================

async fn checkpointed(h: &Harness, name: &str) -> ContainerSlot {
    let slot = h.add(name, true);
    h.daemon
        .checkpoint(name, &SnapshotOptions::default())
        .await
        .unwrap();
    slot
}

#[tokio::test]
async fn test_replay_error_is_returned_and_cleaned_up() {
    let h = Harness::new();
    let slot = checkpointed(&h, "web").await;
    h.engine.script(Replay::Fail);
    let mut events = h.daemon.events();

    let err = h
        .daemon
        .restore("web", &SnapshotOptions::default(), false)
        .await
        .unwrap_err();

    match err {
        StasisError::Snapshot { action, source, .. } => {
            assert_eq!(action, "restore");
            assert!(matches!(source, SnapshotError::ReplayFailed { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(next_die(&mut events).await, Some(FAILED_EXIT_CODE));

    let c = slot.lock().await;
    assert!(!c.is_running());
    assert!(c.is_checkpointed());
    assert!(c.monitor.is_none());
    assert_eq!(c.state.exit_code, FAILED_EXIT_CODE);
    assert!(c.state.error.as_deref().unwrap().contains("restore failed"));
    assert_eq!(h.network.endpoint_count(), 0);
    assert!(!c.root.join(SHM_DIR).exists());

    let persisted = h.store().load(&c.id).unwrap();
    assert_eq!(persisted.state.exit_code, FAILED_EXIT_CODE);
}

#[tokio::test]
async fn test_nonzero_completion_is_restore_failure() {
    let h = Harness::new();
    let slot = checkpointed(&h, "web").await;
    h.engine.script(Replay::Exit(3));

    let err = h
        .daemon
        .restore("web", &SnapshotOptions::default(), false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StasisError::RestoreProcessFailed { exit_code: 3, .. }
    ));
    let c = slot.lock().await;
    assert!(!c.is_running());
    // The process's own code is kept, not replaced by the failure default.
    assert_eq!(c.state.exit_code, 3);
    assert!(c.state.error.is_some());
    assert_eq!(h.store().load(&c.id).unwrap().state.exit_code, 3);
}

#[tokio::test]
async fn test_zero_completion_is_success() {
    let h = Harness::new();
    let slot = checkpointed(&h, "web").await;
    h.engine.script(Replay::Exit(0));
    let mut events = h.daemon.events();

    h.daemon
        .restore("web", &SnapshotOptions::default(), false)
        .await
        .unwrap();

    // The process was already gone; the supervisor records the stop.
    assert_eq!(next_die(&mut events).await, Some(0));
    let c = slot.lock().await;
    assert!(!c.is_running());
    assert!(!c.is_checkpointed());
    assert_eq!(c.state.exit_code, 0);
}

#[tokio::test]
async fn test_restore_timeout() {
    let h = Harness::with_settings(RuntimeSettings {
        restore_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    });
    let slot = checkpointed(&h, "web").await;
    h.engine.script(Replay::Hang);

    let err = h
        .daemon
        .restore("web", &SnapshotOptions::default(), false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StasisError::RestoreTimeout { timeout_ms: 50, .. }
    ));
    let c = slot.lock().await;
    assert!(!c.is_running());
    assert!(c.is_checkpointed());
    assert_eq!(c.state.exit_code, FAILED_EXIT_CODE);
}

// =============================================================================
// End to end
// =============================================================================

#[tokio::test]
async fn test_checkpoint_then_restore() {
    let h = Harness::new();
    let slot = h.add("a", true);

    h.daemon
        .checkpoint("a", &SnapshotOptions::default())
        .await
        .unwrap();
    {
        let c = slot.lock().await;
        assert!(!c.is_running());
        assert!(c.is_checkpointed());
        assert_eq!(c.checkpoint_images.len(), 1);
    }

    h.daemon
        .restore("a", &SnapshotOptions::default(), false)
        .await
        .unwrap();

    let c = slot.lock().await;
    assert!(c.is_running());
    assert!(!c.is_checkpointed());
    assert_eq!(c.state.pid, Some(4242));
    assert!(c.monitor.is_some());
    assert_eq!(c.image_id.as_ref(), Some(&h.layers.last()));

    let command = c.command.as_ref().unwrap();
    assert!(command.env.iter().any(|e| e.starts_with("PATH=")));
    assert!(command
        .mounts
        .iter()
        .any(|m| m.destination == PathBuf::from("/dev/shm")));

    let pairs = h.engine.last_replay().veth_pairs;
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].inside, "eth0");
    assert!(pairs[0].outside.starts_with("veth"));
    assert_eq!(pairs[0].outside.len(), 11);
}

#[tokio::test]
async fn test_restored_process_exit_is_recorded() {
    let h = Harness::new();
    let slot = checkpointed(&h, "web").await;
    let mut events = h.daemon.events();

    h.daemon
        .restore("web", &SnapshotOptions::default(), false)
        .await
        .unwrap();
    h.engine.exit(0, 7);

    assert_eq!(h.daemon.wait("web").await.unwrap(), 7);
    assert_eq!(next_die(&mut events).await, Some(7));

    let c = slot.lock().await;
    assert!(!c.is_running());
    assert!(c.monitor.is_none());
    assert_eq!(c.state.exit_code, 7);
    assert_eq!(h.network.endpoint_count(), 0);
}

#[tokio::test]
async fn test_superseded_monitor_exit_is_ignored() {
    let h = Harness::new();
    let slot = checkpointed(&h, "web").await;
    let mut events = h.daemon.events();

    h.daemon
        .restore("web", &SnapshotOptions::default(), false)
        .await
        .unwrap();
    h.daemon
        .checkpoint("web", &SnapshotOptions::default())
        .await
        .unwrap();
    h.engine.script(Replay::Run { pid: 5151 });
    h.daemon
        .restore("web", &SnapshotOptions::default(), false)
        .await
        .unwrap();

    // The first generation's process finally exits.
    h.engine.exit(0, 9);
    tokio::time::sleep(Duration::from_millis(50)).await;
    {
        let c = slot.lock().await;
        assert!(c.is_running());
        assert_eq!(c.state.pid, Some(5151));
        assert_eq!(c.state.exit_code, 0);
    }

    h.engine.exit(1, 0);
    assert_eq!(next_die(&mut events).await, Some(0));
    assert!(!slot.lock().await.is_running());
}

#[tokio::test]
async fn test_stop_kills_supervised_process() {
    let h = Harness::new();
    let slot = checkpointed(&h, "web").await;
    let mut events = h.daemon.events();

    h.daemon
        .restore("web", &SnapshotOptions::default(), false)
        .await
        .unwrap();
    assert!(slot.lock().await.is_running());

    assert_eq!(h.daemon.stop("web").await.unwrap(), STOPPED_EXIT_CODE);
    assert_eq!(h.engine.terminated(), vec![4242]);
    assert_eq!(next_die(&mut events).await, Some(STOPPED_EXIT_CODE));

    let id = {
        let c = slot.lock().await;
        assert!(!c.is_running());
        assert!(c.monitor.is_none());
        assert_eq!(c.state.exit_code, STOPPED_EXIT_CODE);
        assert_eq!(h.network.endpoint_count(), 0);
        c.id.clone()
    };
    assert!(!h.store().load(&id).unwrap().is_running());

    // Not left running: a forced restore from the same images goes ahead.
    let images = slot.lock().await.root.join(DEFAULT_IMAGES_DIR);
    h.daemon
        .restore("web", &explicit_images(images), true)
        .await
        .unwrap();
    assert!(slot.lock().await.is_running());
}

#[tokio::test]
async fn test_stop_unsupervised_running_container() {
    let h = Harness::new();
    let slot = h.add("web", true);

    assert_eq!(h.daemon.stop("web").await.unwrap(), STOPPED_EXIT_CODE);
    assert_eq!(h.engine.terminated(), vec![100]);

    let c = slot.lock().await;
    assert!(!c.is_running());
    assert_eq!(h.store().load(&c.id).unwrap().state.exit_code, STOPPED_EXIT_CODE);
}

#[tokio::test]
async fn test_stop_stopped_container_is_noop() {
    let h = Harness::new();
    let slot = h.add("web", false);
    let before = snapshot(&slot).await;

    assert_eq!(h.daemon.stop("web").await.unwrap(), 0);
    assert!(h.engine.terminated().is_empty());
    assert_eq!(snapshot(&slot).await, before);
}

#[tokio::test]
async fn test_missing_link_target_rolls_back() {
    let h = Harness::new();
    let slot = checkpointed(&h, "web").await;
    slot.lock().await.config.links.push(Link {
        name: "db".to_string(),
        alias: "db".to_string(),
    });

    let err = h
        .daemon
        .restore("web", &SnapshotOptions::default(), false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StasisError::Setup {
            step: SetupStep::Links,
            ..
        }
    ));
    assert_eq!(h.engine.replays.load(Ordering::SeqCst), 0);
    assert_eq!(h.network.endpoint_count(), 0);
    assert!(!slot.lock().await.is_running());
}

#[tokio::test]
async fn test_link_env_from_running_target() {
    let h = Harness::new();
    {
        let db = h.add("db", true);
        let mut db = db.lock().await;
        db.config.env = vec!["POSTGRES_DB=app".to_string()];
        h.daemon.runtime().links.publish(&db);
    }
    let slot = checkpointed(&h, "web").await;
    slot.lock().await.config.links.push(Link {
        name: "db".to_string(),
        alias: "pg".to_string(),
    });

    h.daemon
        .restore("web", &SnapshotOptions::default(), false)
        .await
        .unwrap();

    let c = slot.lock().await;
    let env = &c.command.as_ref().unwrap().env;
    assert!(env.contains(&"PG_NAME=/web/pg".to_string()));
    assert!(env.contains(&"PG_ENV_POSTGRES_DB=app".to_string()));
}

#[tokio::test]
async fn test_inspect_reports_checkpoint() {
    let h = Harness::new();
    checkpointed(&h, "web").await;

    let info = h.daemon.inspect("/web").await.unwrap();
    assert!(info.checkpointed);
    assert!(!info.running);
    assert_eq!(info.status, "checkpointed");
    assert!(info.checkpointed_at.is_some());
    assert_eq!(info.checkpoint_images.len(), 1);

    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["Checkpointed"], true);

    assert!(matches!(
        h.daemon.inspect("nope").await,
        Err(StasisError::ContainerNotFound(_))
    ));
}

#[tokio::test]
async fn test_daemon_reload_from_state_store() {
    let h = Harness::new();
    checkpointed(&h, "web").await;
    h.add("other", false);

    let reopened = Daemon::with_runtime(h.daemon.runtime().as_ref().clone());
    // Only persisted containers come back.
    assert_eq!(reopened.load().unwrap(), 1);
    let names: Vec<_> = reopened.list().await.into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["web"]);
    assert_eq!(reopened.inspect("web").await.unwrap().status, "checkpointed");
}

#[tokio::test]
async fn test_open_without_criu_binary() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.daemon.state_root = tmp.path().join("state");
    config.daemon.layers_dir = tmp.path().join("layers");
    config.daemon.criu_path = Some(tmp.path().join("missing-criu"));

    // Read-only commands work without the engine.
    let daemon = Daemon::open(&config).unwrap();
    assert!(daemon.list().await.is_empty());

    let store = StateStore::new(&config.daemon.state_root);
    let id = ContainerId::generate();
    let mut container = Container::new(
        id.clone(),
        ContainerName::new("web").unwrap(),
        store.container_root(&id),
    );
    container.state.running = true;
    container.state.pid = Some(100);
    daemon.register(container).unwrap();

    let err = daemon
        .checkpoint("web", &SnapshotOptions::default())
        .await
        .unwrap_err();
    match err {
        StasisError::Snapshot { source, .. } => {
            assert!(matches!(source, SnapshotError::BinaryNotFound));
        }
        other => panic!("unexpected error: {other}"),
    }
}
