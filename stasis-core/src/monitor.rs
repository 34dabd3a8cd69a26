// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Restore monitor.
//!
//! Supervises one restored process. The monitor carries two signals:
//!
//! * a one-shot completion signal, fired the first time the supervision path
//!   learns the outcome of the restore (the process tree is running, or it
//!   already exited), and
//! * an exit signal, fired when the restored process finally exits.
//!
//! A stop can be requested on the monitor; the supervisor owning the replay
//! honours it and fires the settled signal once the exit has been recorded.
//!
//! The snapshot engine reports into the monitor through a [`RestoreNotifier`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::container::{ContainerHandle, RestartPolicy, FAILED_EXIT_CODE};
use crate::engine::SnapshotEngine;
use crate::error::SnapshotError;
use crate::options::SnapshotOptions;
use crate::types::ContainerId;

/// First observed outcome of a restore attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The process tree is running again.
    Restored { pid: u32 },
    /// The process exited before (or instead of) reporting itself running.
    Exited { exit_code: i32 },
}

impl Completion {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Restored { .. } => 0,
            Self::Exited { exit_code } => *exit_code,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Restored { pid } => Some(*pid),
            Self::Exited { .. } => None,
        }
    }
}

/// Supervisor state for a single restore attempt.
#[derive(Debug)]
pub struct RestoreMonitor {
    container: ContainerId,
    restart_policy: RestartPolicy,
    completion: watch::Sender<Option<Completion>>,
    exit: watch::Sender<Option<i32>>,
    stop: Notify,
    stop_requested: AtomicBool,
    settled: watch::Sender<bool>,
    restart_requested: AtomicBool,
}

impl RestoreMonitor {
    pub fn new(container: ContainerId, restart_policy: RestartPolicy) -> Arc<Self> {
        Arc::new(Self {
            container,
            restart_policy,
            completion: watch::Sender::new(None),
            exit: watch::Sender::new(None),
            stop: Notify::new(),
            stop_requested: AtomicBool::new(false),
            settled: watch::Sender::new(false),
            restart_requested: AtomicBool::new(false),
        })
    }

    pub fn container(&self) -> &ContainerId {
        &self.container
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        self.restart_policy
    }

    /// Handle given to the snapshot engine.
    pub fn notifier(self: &Arc<Self>) -> RestoreNotifier {
        RestoreNotifier {
            monitor: Arc::clone(self),
        }
    }

    /// Fire the completion signal. Only the first call has any effect.
    fn complete(&self, outcome: Completion) -> bool {
        self.completion.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(outcome);
            true
        })
    }

    /// The process tree is running under `pid`.
    pub fn mark_restored(&self, pid: u32) -> bool {
        let fired = self.complete(Completion::Restored { pid });
        if fired {
            tracing::debug!(container = %self.container, pid = pid, "Restore signalled");
        }
        fired
    }

    /// The restored process exited with `exit_code`.
    pub fn mark_exited(&self, exit_code: i32) {
        self.complete(Completion::Exited { exit_code });
        self.exit.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(exit_code);
            true
        });
    }

    /// Completion outcome, if the signal has fired.
    pub fn completion(&self) -> Option<Completion> {
        *self.completion.borrow()
    }

    /// Exit code recorded by the completion signal, once fired.
    pub fn exit_code(&self) -> Option<i32> {
        self.completion().map(|c| c.exit_code())
    }

    /// Wait for the completion signal.
    pub async fn completed(&self) -> Completion {
        let mut rx = self.completion.subscribe();
        let completion = match rx.wait_for(Option::is_some).await {
            Ok(value) => *value,
            Err(_) => None,
        };
        completion.unwrap_or(Completion::Exited {
            exit_code: FAILED_EXIT_CODE,
        })
    }

    /// Wait for the restored process to exit.
    pub async fn exited(&self) -> i32 {
        let mut rx = self.exit.subscribe();
        let exit_code = match rx.wait_for(Option::is_some).await {
            Ok(value) => *value,
            Err(_) => None,
        };
        exit_code.unwrap_or(FAILED_EXIT_CODE)
    }

    /// Ask the supervisor to stop the restored process.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.stop.notify_one();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Resolves once a stop has been requested.
    pub async fn stop_requested(&self) {
        if self.is_stop_requested() {
            return;
        }
        self.stop.notified().await;
    }

    /// The supervisor has recorded the exit and released the container.
    pub fn mark_settled(&self) {
        self.settled.send_replace(true);
    }

    /// Wait until the supervisor is done with the container.
    pub async fn settled(&self) {
        let mut rx = self.settled.subscribe();
        let _ = rx.wait_for(|settled| *settled).await;
    }

    /// Consult the restart policy for an exit and remember the decision.
    ///
    /// A requested stop counts as a manual stop.
    pub fn evaluate_restart(&self, exit_code: i32, restart_count: u32) -> bool {
        let restart = self.restart_policy.should_restart(
            exit_code,
            restart_count,
            self.is_stop_requested(),
        );
        self.restart_requested.store(restart, Ordering::SeqCst);
        restart
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested.load(Ordering::SeqCst)
    }
}

/// Callback surface through which the snapshot engine reports progress.
#[derive(Debug, Clone)]
pub struct RestoreNotifier {
    monitor: Arc<RestoreMonitor>,
}

impl RestoreNotifier {
    /// Report that the process tree is running under `pid`.
    pub fn restored(&self, pid: u32) {
        self.monitor.mark_restored(pid);
    }
}

/// Launch the engine replay as a cancellable background task.
///
/// The task resolves with the process exit code once the restored tree
/// exits, or with the engine error if replay never produced a process.
/// A normal exit is also recorded on the monitor before the task resolves.
pub fn spawn_replay(
    engine: Arc<dyn SnapshotEngine>,
    handle: ContainerHandle,
    opts: SnapshotOptions,
    monitor: Arc<RestoreMonitor>,
) -> JoinHandle<Result<i32, SnapshotError>> {
    tokio::spawn(async move {
        let result = engine.replay(&handle, &opts, monitor.notifier()).await;
        if let Ok(exit_code) = result {
            monitor.mark_exited(exit_code);
        }
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn monitor() -> Arc<RestoreMonitor> {
        RestoreMonitor::new(ContainerId::new("abc").unwrap(), RestartPolicy::No)
    }

    #[tokio::test]
    async fn test_completion_is_one_shot() {
        let m = monitor();
        assert!(m.completion().is_none());
        assert!(m.mark_restored(10));
        assert!(!m.mark_restored(11));
        m.mark_exited(3);
        assert_eq!(m.completed().await, Completion::Restored { pid: 10 });
        assert_eq!(m.exit_code(), Some(0));
        assert_eq!(m.exited().await, 3);
    }

    #[tokio::test]
    async fn test_exit_before_restore_fires_completion() {
        let m = monitor();
        m.mark_exited(137);
        assert_eq!(m.completed().await, Completion::Exited { exit_code: 137 });
        assert_eq!(m.exit_code(), Some(137));
        assert!(!m.mark_restored(5));
    }

    #[tokio::test]
    async fn test_completed_waits_for_notifier() {
        let m = monitor();
        let notifier = m.notifier();
        let waiter = {
            let m = Arc::clone(&m);
            tokio::spawn(async move { m.completed().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        notifier.restored(99);
        let completion = waiter.await.unwrap();
        assert_eq!(completion.pid(), Some(99));
    }

    #[tokio::test]
    async fn test_stop_request_is_not_lost() {
        let m = monitor();
        m.request_stop();
        // Requested before anyone waited; must still resolve.
        tokio::time::timeout(Duration::from_secs(1), m.stop_requested())
            .await
            .unwrap();
        assert!(m.is_stop_requested());
    }

    #[tokio::test]
    async fn test_settled_wakes_waiter() {
        let m = monitor();
        let waiter = {
            let m = Arc::clone(&m);
            tokio::spawn(async move { m.settled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        m.mark_settled();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_stop_request_suppresses_restart() {
        let m = RestoreMonitor::new(
            ContainerId::new("abc").unwrap(),
            RestartPolicy::UnlessStopped,
        );
        assert!(m.evaluate_restart(137, 0));
        m.request_stop();
        assert!(!m.evaluate_restart(137, 0));
    }

    #[test]
    fn test_restart_decision_recorded() {
        let m = RestoreMonitor::new(
            ContainerId::new("abc").unwrap(),
            RestartPolicy::OnFailure { max_retries: 1 },
        );
        assert!(m.evaluate_restart(1, 0));
        assert!(m.restart_requested());
        assert!(!m.evaluate_restart(1, 1));
        assert!(!m.restart_requested());
    }
}
