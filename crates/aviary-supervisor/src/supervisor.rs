//! Bot process lifecycle: start, stop, restart, retire.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use aviary_core::now_utc;

/// How bot processes are launched and torn down.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Entry-point file that must exist inside the bot's instance directory.
    pub entry_point: String,
    /// Interpreter to launch the entry point with; when `None` the entry
    /// point is executed directly.
    pub launcher: Option<String>,
    /// How long to wait after spawn before probing liveness.
    pub start_grace: Duration,
    /// Bounded wait for graceful exit before escalating to SIGKILL.
    pub stop_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            entry_point: "main.py".to_string(),
            launcher: Some("python3".to_string()),
            start_grace: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(3),
        }
    }
}

/// Structured result of a supervisor operation.
///
/// Supervisor operations never raise past the orchestration boundary; the
/// caller persists a consistent terminal bot state from `ok` and `pid`.
#[derive(Debug, Clone, Serialize)]
pub struct ControlOutcome {
    pub ok: bool,
    pub message: String,
    pub pid: Option<u32>,
}

impl ControlOutcome {
    fn stopped(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            pid: None,
        }
    }

    fn running(pid: u32, message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            pid: Some(pid),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            pid: None,
        }
    }
}

struct TrackedChild {
    child: Child,
    pid: u32,
    spawned_at: chrono::DateTime<chrono::Utc>,
}

/// Supervises detached bot processes, one per bot id.
///
/// Control operations on the same bot are serialized through a per-bot
/// mutex; different bots proceed independently. Spawned children are kept
/// in an in-memory registry so same-incarnation stops can use the owned
/// handle instead of a bare pid.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    children: Mutex<HashMap<u64, TrackedChild>>,
    bot_locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            children: Mutex::new(HashMap::new()),
            bot_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Launches the bot's entry point as a session-detached child and
    /// records the new pid on success.
    pub async fn start(&self, bot_id: u64, instance_dir: &Path) -> ControlOutcome {
        let lock = self.bot_lock(bot_id).await;
        let _guard = lock.lock().await;
        self.start_locked(bot_id, instance_dir).await
    }

    /// Terminates the bot's process tree. A missing or already-dead process
    /// is success: the goal state (not running) is satisfied.
    pub async fn stop(&self, bot_id: u64, recorded_pid: Option<u32>) -> ControlOutcome {
        let lock = self.bot_lock(bot_id).await;
        let _guard = lock.lock().await;
        self.stop_locked(bot_id, recorded_pid).await
    }

    /// Best-effort stop followed by start. Never reports the previous
    /// incarnation's pid: either the new pid or none.
    pub async fn restart(
        &self,
        bot_id: u64,
        instance_dir: &Path,
        recorded_pid: Option<u32>,
    ) -> ControlOutcome {
        let lock = self.bot_lock(bot_id).await;
        let _guard = lock.lock().await;
        let stop_outcome = self.stop_locked(bot_id, recorded_pid).await;
        debug!(bot_id, message = %stop_outcome.message, "restart: stop phase finished");
        self.start_locked(bot_id, instance_dir).await
    }

    /// Best-effort stop followed by removal of the bot's instance storage.
    pub async fn retire(
        &self,
        bot_id: u64,
        instance_dir: &Path,
        recorded_pid: Option<u32>,
    ) -> ControlOutcome {
        let lock = self.bot_lock(bot_id).await;
        let _guard = lock.lock().await;
        let stop_outcome = self.stop_locked(bot_id, recorded_pid).await;
        debug!(bot_id, message = %stop_outcome.message, "retire: stop phase finished");
        if instance_dir.exists() {
            if let Err(error) = std::fs::remove_dir_all(instance_dir) {
                return ControlOutcome::failed(format!(
                    "failed to remove instance directory {}: {error}",
                    instance_dir.display()
                ));
            }
        }
        ControlOutcome::stopped("bot retired")
    }

    async fn bot_lock(&self, bot_id: u64) -> Arc<Mutex<()>> {
        let mut locks = self.bot_locks.lock().await;
        Arc::clone(locks.entry(bot_id).or_default())
    }

    async fn start_locked(&self, bot_id: u64, instance_dir: &Path) -> ControlOutcome {
        {
            let mut children = self.children.lock().await;
            if let Some(tracked) = children.get_mut(&bot_id) {
                if matches!(tracked.child.try_wait(), Ok(None)) {
                    // A second spawn would orphan this child and lose its pid.
                    return ControlOutcome::running(tracked.pid, "bot already running");
                }
                children.remove(&bot_id);
            }
        }

        let entry_path = instance_dir.join(&self.config.entry_point);
        if !entry_path.is_file() {
            return ControlOutcome::failed(format!(
                "entry point {} not found",
                entry_path.display()
            ));
        }

        let mut command = match &self.config.launcher {
            Some(launcher) => {
                let mut command = Command::new(launcher);
                command.arg(&self.config.entry_point);
                command
            }
            None => Command::new(&entry_path),
        };
        command
            .current_dir(instance_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                return ControlOutcome::failed(format!("failed to spawn bot process: {error}"));
            }
        };
        let Some(pid) = child.id() else {
            return ControlOutcome::failed("bot process exited before a pid was observed");
        };

        tokio::time::sleep(self.config.start_grace).await;
        match child.try_wait() {
            Ok(Some(status)) => {
                ControlOutcome::failed(format!("bot process exited during startup ({status})"))
            }
            Err(error) => {
                ControlOutcome::failed(format!("failed to probe bot process liveness: {error}"))
            }
            Ok(None) => {
                info!(bot_id, pid, "bot process started");
                self.children.lock().await.insert(
                    bot_id,
                    TrackedChild {
                        child,
                        pid,
                        spawned_at: now_utc(),
                    },
                );
                ControlOutcome::running(pid, "bot started")
            }
        }
    }

    async fn stop_locked(&self, bot_id: u64, recorded_pid: Option<u32>) -> ControlOutcome {
        let tracked = self.children.lock().await.remove(&bot_id);
        if let Some(tracked) = tracked {
            return self.stop_tracked(bot_id, tracked).await;
        }
        let Some(pid) = recorded_pid else {
            return ControlOutcome::stopped("bot already stopped");
        };
        self.stop_by_pid(bot_id, pid).await
    }

    /// Stops a child we still hold an owned handle for: SIGTERM to the
    /// group, bounded wait, SIGKILL survivors, reap.
    async fn stop_tracked(&self, bot_id: u64, mut tracked: TrackedChild) -> ControlOutcome {
        if let Ok(Some(status)) = tracked.child.try_wait() {
            debug!(bot_id, pid = tracked.pid, %status, "bot had already exited");
            return ControlOutcome::stopped("bot already stopped");
        }

        signal_group(tracked.pid, TreeSignal::Term);
        match tokio::time::timeout(self.config.stop_timeout, tracked.child.wait()).await {
            Ok(_) => ControlOutcome::stopped("bot stopped"),
            Err(_) => {
                warn!(
                    bot_id,
                    pid = tracked.pid,
                    spawned_at = %tracked.spawned_at,
                    "bot ignored graceful termination; escalating"
                );
                #[cfg(unix)]
                {
                    signal_group(tracked.pid, TreeSignal::Kill);
                    let _ = tracked.child.wait().await;
                }
                #[cfg(not(unix))]
                let _ = tracked.child.kill().await;
                ControlOutcome::stopped("bot force-stopped")
            }
        }
    }

    /// Stops by recorded pid alone (previous server incarnation). Guards
    /// against pid reuse before signalling: the bot was spawned as its own
    /// group leader, so a pid whose group id differs no longer names it.
    #[cfg(unix)]
    async fn stop_by_pid(&self, bot_id: u64, pid: u32) -> ControlOutcome {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::{getpgid, Pid};

        let target = Pid::from_raw(pid as i32);
        match getpgid(Some(target)) {
            Err(Errno::ESRCH) => return ControlOutcome::stopped("bot already stopped"),
            Err(error) => {
                warn!(bot_id, pid, %error, "cannot inspect recorded pid; falling back to direct SIGTERM");
                let _ = kill(target, Signal::SIGTERM);
                return ControlOutcome::stopped("bot stop signalled (degraded path)");
            }
            Ok(pgid) if pgid != target => {
                debug!(bot_id, pid, pgid = pgid.as_raw(), "recorded pid was recycled");
                return ControlOutcome::stopped(
                    "recorded pid no longer names the spawned process; bot treated as stopped",
                );
            }
            Ok(_) => {}
        }

        signal_group(pid, TreeSignal::Term);
        let deadline = tokio::time::Instant::now() + self.config.stop_timeout;
        loop {
            if matches!(kill(target, None), Err(Errno::ESRCH)) {
                return ControlOutcome::stopped("bot stopped");
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        signal_group(pid, TreeSignal::Kill);
        ControlOutcome::stopped("bot force-stopped")
    }

    #[cfg(not(unix))]
    async fn stop_by_pid(&self, bot_id: u64, pid: u32) -> ControlOutcome {
        debug!(bot_id, pid, "pid-only termination is unsupported on this platform");
        ControlOutcome::stopped("bot treated as stopped (pid-only termination unsupported here)")
    }
}

enum TreeSignal {
    Term,
    Kill,
}

/// Signals the bot's whole process group, falling back to the single pid
/// when group signalling is refused.
#[cfg(unix)]
fn signal_group(pid: u32, tree_signal: TreeSignal) {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    let signal = match tree_signal {
        TreeSignal::Term => Signal::SIGTERM,
        TreeSignal::Kill => Signal::SIGKILL,
    };
    let target = Pid::from_raw(pid as i32);
    match killpg(target, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(error) => {
            warn!(pid, %error, "process-group signal refused; signalling leader only");
            let _ = kill(target, signal);
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _tree_signal: TreeSignal) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn test_config() -> SupervisorConfig {
        SupervisorConfig {
            entry_point: "run.sh".to_string(),
            launcher: Some("sh".to_string()),
            start_grace: Duration::from_millis(200),
            stop_timeout: Duration::from_secs(1),
        }
    }

    fn write_entry_point(dir: &Path, body: &str) {
        std::fs::create_dir_all(dir).expect("create instance dir");
        std::fs::write(dir.join("run.sh"), body).expect("write entry point");
    }

    #[tokio::test]
    async fn unit_stop_without_recorded_pid_is_noop_success() {
        let supervisor = ProcessSupervisor::new(test_config());
        let outcome = supervisor.stop(7, None).await;
        assert!(outcome.ok);
        assert!(outcome.pid.is_none());
        assert!(outcome.message.contains("already stopped"));
    }

    #[tokio::test]
    async fn regression_start_with_missing_entry_point_fails_without_pid() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let instance_dir = tempdir.path().join("bot");
        std::fs::create_dir_all(&instance_dir).expect("create instance dir");

        let supervisor = ProcessSupervisor::new(test_config());
        let outcome = supervisor.start(1, &instance_dir).await;
        assert!(!outcome.ok);
        assert!(outcome.pid.is_none());
        assert!(outcome.message.contains("not found"));
    }

    #[tokio::test]
    async fn regression_start_reports_failure_when_process_dies_in_grace_window() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let instance_dir = tempdir.path().join("bot");
        write_entry_point(&instance_dir, "exit 3\n");

        let supervisor = ProcessSupervisor::new(test_config());
        let outcome = supervisor.start(1, &instance_dir).await;
        assert!(!outcome.ok);
        assert!(outcome.pid.is_none());
        assert!(outcome.message.contains("exited during startup"));
    }

    #[tokio::test]
    async fn functional_start_then_stop_terminates_live_process() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let instance_dir = tempdir.path().join("bot");
        write_entry_point(&instance_dir, "sleep 30\n");

        let supervisor = ProcessSupervisor::new(test_config());
        let started = supervisor.start(1, &instance_dir).await;
        assert!(started.ok, "start failed: {}", started.message);
        let pid = started.pid.expect("pid recorded");

        let stopped = supervisor.stop(1, Some(pid)).await;
        assert!(stopped.ok);
        assert!(stopped.pid.is_none());
    }

    #[tokio::test]
    async fn regression_second_start_reuses_live_process_instead_of_respawning() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let instance_dir = tempdir.path().join("bot");
        write_entry_point(&instance_dir, "sleep 30\n");

        let supervisor = ProcessSupervisor::new(test_config());
        let first = supervisor.start(1, &instance_dir).await;
        assert!(first.ok, "start failed: {}", first.message);

        let second = supervisor.start(1, &instance_dir).await;
        assert!(second.ok);
        assert_eq!(second.pid, first.pid);
        assert!(second.message.contains("already running"));

        supervisor.stop(1, first.pid).await;
    }

    #[tokio::test]
    async fn functional_restart_reports_fresh_pid_or_stopped_state() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let instance_dir = tempdir.path().join("bot");
        write_entry_point(&instance_dir, "sleep 30\n");

        let supervisor = ProcessSupervisor::new(test_config());
        let started = supervisor.start(1, &instance_dir).await;
        assert!(started.ok, "start failed: {}", started.message);
        let first_pid = started.pid.expect("pid recorded");

        let restarted = supervisor.restart(1, &instance_dir, Some(first_pid)).await;
        assert!(restarted.ok, "restart failed: {}", restarted.message);
        let second_pid = restarted.pid.expect("pid after restart");
        assert_ne!(first_pid, second_pid);

        supervisor.stop(1, Some(second_pid)).await;
    }

    #[tokio::test]
    async fn regression_restart_into_broken_instance_ends_stopped_without_stale_pid() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let instance_dir = tempdir.path().join("bot");
        write_entry_point(&instance_dir, "sleep 30\n");

        let supervisor = ProcessSupervisor::new(test_config());
        let started = supervisor.start(1, &instance_dir).await;
        assert!(started.ok, "start failed: {}", started.message);

        std::fs::remove_file(instance_dir.join("run.sh")).expect("break instance");
        let restarted = supervisor.restart(1, &instance_dir, started.pid).await;
        assert!(!restarted.ok);
        assert!(restarted.pid.is_none());
    }

    #[tokio::test]
    async fn regression_stop_after_out_of_band_exit_reports_success() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let tempdir = tempfile::tempdir().expect("tempdir");
        let instance_dir = tempdir.path().join("bot");
        write_entry_point(&instance_dir, "sleep 30\n");

        let supervisor = ProcessSupervisor::new(test_config());
        let started = supervisor.start(1, &instance_dir).await;
        assert!(started.ok, "start failed: {}", started.message);
        let pid = started.pid.expect("pid recorded");

        kill(Pid::from_raw(pid as i32), Signal::SIGKILL).expect("out-of-band kill");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stopped = supervisor.stop(1, Some(pid)).await;
        assert!(stopped.ok);
        assert!(stopped.pid.is_none());
    }

    #[tokio::test]
    async fn regression_stop_by_stale_pid_from_previous_incarnation_succeeds() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let instance_dir = tempdir.path().join("bot");
        write_entry_point(&instance_dir, "exit 0\n");

        // Spawn and reap a short-lived process outside the supervisor so its
        // pid is certainly dead, then hand that pid in as a recorded one.
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("exit 0")
            .spawn()
            .expect("spawn probe process");
        let dead_pid = child.id().expect("probe pid");
        child.wait().await.expect("reap probe process");

        let supervisor = ProcessSupervisor::new(test_config());
        let outcome = supervisor.stop(99, Some(dead_pid)).await;
        assert!(outcome.ok);
        assert!(outcome.message.contains("stopped"));
    }
}
