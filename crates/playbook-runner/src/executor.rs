use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use playbook_core::config::ExecutorConfig;
use playbook_core::document::{render_inventory, render_playbook};
use playbook_core::{Inventory, Playbook, Workspace, WorkspaceError};
use tokio_util::sync::CancellationToken;

use crate::adapter::{AnsiblePlaybookAdapter, RunnerAdapter};
use crate::error::ExecutionError;
use crate::observer::{ExecutionObserver, Stage, TracingObserver};
use crate::output::{OutputHub, OutputSubscription};
use crate::process::ProcessRunner;

// ─── PlaybookExecutor ─────────────────────────────────────────────────────

/// Serializes, writes, runs, and cleans up one playbook execution per call.
///
/// The executor holds no per-run state. Concurrent calls are independent as
/// long as their playbook and inventory IDs do not overlap; an overlapping
/// call fails in the writing stage with [`WorkspaceError::InUse`].
pub struct PlaybookExecutor {
    workspace: Workspace,
    runner: ProcessRunner,
    adapter: Arc<dyn RunnerAdapter>,
    observer: Arc<dyn ExecutionObserver>,
}

impl PlaybookExecutor {
    pub fn new(workspace: Workspace, adapter: impl RunnerAdapter + 'static, hub: OutputHub) -> Self {
        Self {
            workspace,
            runner: ProcessRunner::new(hub),
            adapter: Arc::new(adapter),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn from_config(cfg: &ExecutorConfig) -> Self {
        Self::new(
            cfg.workspace.build(),
            AnsiblePlaybookAdapter::from(&cfg.runner),
            OutputHub::new(cfg.output.capacity),
        )
        .with_drain_timeout(Duration::from_millis(cfg.output.drain_timeout_ms))
    }

    /// See [`ProcessRunner::with_drain_timeout`].
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.runner = self.runner.with_drain_timeout(timeout);
        self
    }

    pub fn with_observer(mut self, observer: impl ExecutionObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn hub(&self) -> &OutputHub {
        self.runner.hub()
    }

    pub fn subscribe(&self) -> OutputSubscription {
        self.hub().subscribe()
    }

    pub fn subscribe_run(&self, run_id: impl Into<String>) -> OutputSubscription {
        self.hub().subscribe_run(run_id)
    }

    /// Execute `playbook` against `inventory`. The playbook's ID is the run ID.
    ///
    /// Returns exactly one terminal error. Artifacts written by this call are
    /// always deleted before it returns; a failed delete is reported to the
    /// observer and never replaces the run's own outcome.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        playbook: &Playbook,
        inventory: &Inventory,
    ) -> Result<(), ExecutionError> {
        let run_id = playbook.id.as_str();
        let result = self.execute_inner(cancel, playbook, inventory).await;
        self.observer.finished(run_id, result.as_ref().map(|_| ()));
        result
    }

    async fn execute_inner(
        &self,
        cancel: &CancellationToken,
        playbook: &Playbook,
        inventory: &Inventory,
    ) -> Result<(), ExecutionError> {
        let run_id = playbook.id.as_str();
        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled {
                run_id: run_id.to_string(),
            });
        }

        self.observer.stage(run_id, Stage::Serializing);
        let serialization = |source| ExecutionError::Serialization {
            run_id: run_id.to_string(),
            source,
        };
        let book_text = render_playbook(playbook).map_err(serialization)?;
        let inventory_text = render_inventory(inventory).map_err(serialization)?;

        self.observer.stage(run_id, Stage::Writing);
        let workspace_err = |source| ExecutionError::Workspace {
            run_id: run_id.to_string(),
            source,
        };
        let _reservation = self
            .workspace
            .reserve(&[playbook.id.as_str(), inventory.id.as_str()])
            .map_err(workspace_err)?;

        let mut written: Vec<&str> = Vec::with_capacity(2);
        let outcome = match self.write_artifacts(
            &mut written,
            (playbook.id.as_str(), book_text.as_str()),
            (inventory.id.as_str(), inventory_text.as_str()),
        ) {
            Err(e) => Err(workspace_err(e)),
            Ok((book_path, inventory_path)) => {
                self.observer.stage(run_id, Stage::Running);
                let spec = self.adapter.command(&book_path, &inventory_path);
                self.observer.command(run_id, &spec);
                self.runner
                    .run(cancel, run_id, &spec)
                    .await
                    .map_err(|e| ExecutionError::from_run(run_id, e))
            }
        };

        self.observer.stage(run_id, Stage::CleaningUp);
        for id in written {
            if let Err(e) = self.workspace.remove(id) {
                self.observer.cleanup_failed(run_id, &e);
            }
        }

        self.observer.stage(run_id, Stage::Done);
        outcome
    }

    /// Write both artifacts, recording each successfully written ID in
    /// `written` so cleanup knows what exists.
    fn write_artifacts<'a>(
        &self,
        written: &mut Vec<&'a str>,
        book: (&'a str, &str),
        inventory: (&'a str, &str),
    ) -> Result<(PathBuf, PathBuf), WorkspaceError> {
        let book_path = self.workspace.write(book.0, book.1)?;
        written.push(book.0);
        let inventory_path = self.workspace.write(inventory.0, inventory.1)?;
        written.push(inventory.0);
        Ok((book_path, inventory_path))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CommandSpec;
    use crate::output::OutputSource;
    use playbook_core::action::CommandAction;
    use playbook_core::{Play, Task};
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Runs `script` under `/bin/sh` with `$1` = playbook, `$2` = inventory.
    #[derive(Debug)]
    struct ShAdapter {
        script: String,
    }

    impl ShAdapter {
        fn new(script: &str) -> Self {
            Self {
                script: script.to_string(),
            }
        }
    }

    impl RunnerAdapter for ShAdapter {
        fn command(&self, playbook: &Path, inventory: &Path) -> CommandSpec {
            CommandSpec::new("/bin/sh")
                .arg("-c")
                .arg(&self.script)
                .arg("runner")
                .arg(playbook.display().to_string())
                .arg(inventory.display().to_string())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Stage(Stage),
        Command(Vec<String>),
        CleanupFailed,
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Seen>>>);

    impl Recorder {
        fn seen(&self) -> Vec<Seen> {
            self.0.lock().unwrap().clone()
        }

        fn commands(&self) -> Vec<Vec<String>> {
            self.seen()
                .into_iter()
                .filter_map(|s| match s {
                    Seen::Command(argv) => Some(argv),
                    _ => None,
                })
                .collect()
        }
    }

    impl ExecutionObserver for Recorder {
        fn stage(&self, _run_id: &str, stage: Stage) {
            self.0.lock().unwrap().push(Seen::Stage(stage));
        }

        fn command(&self, _run_id: &str, spec: &CommandSpec) {
            let argv = spec.argv().into_iter().map(str::to_string).collect();
            self.0.lock().unwrap().push(Seen::Command(argv));
        }

        fn cleanup_failed(&self, _run_id: &str, _error: &WorkspaceError) {
            self.0.lock().unwrap().push(Seen::CleanupFailed);
        }
    }

    fn fixture(book_id: &str) -> (Playbook, Inventory) {
        let book = Playbook::new(book_id).with_play(
            Play::new("test").with_task(Task::new(CommandAction::new("echo hi")).named("t1")),
        );
        let inventory = Inventory::new("i1").with_group("test", ["localhost"]);
        (book, inventory)
    }

    fn executor(dir: &TempDir, script: &str) -> (PlaybookExecutor, Recorder) {
        let recorder = Recorder::default();
        let exec = PlaybookExecutor::new(
            Workspace::new(dir.path(), "yml"),
            ShAdapter::new(script),
            OutputHub::new(256),
        )
        .with_observer(recorder.clone());
        (exec, recorder)
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    const ECHO_ARGV: &str = r#"for a in "$0" "$@"; do echo "$a"; done"#;

    #[tokio::test]
    async fn end_to_end_success() {
        let dir = TempDir::new().unwrap();
        let (exec, recorder) = executor(
            &dir,
            &format!(r#"{ECHO_ARGV}; ls "$(dirname "$1")" | wc -l >&2; cat "$1" >&2"#),
        );
        let sub = exec.subscribe_run("p1");
        let (book, inventory) = fixture("p1");

        exec.execute(&CancellationToken::new(), &book, &inventory)
            .await
            .unwrap();

        let book_path = dir.path().join("p1.yml").display().to_string();
        let inventory_path = dir.path().join("i1.yml").display().to_string();

        let commands = recorder.commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].contains(&book_path));
        assert!(commands[0].contains(&inventory_path));

        let lines = sub.collect_lines().await;
        let stdout: Vec<&str> = lines
            .iter()
            .filter(|l| l.source == OutputSource::Stdout)
            .map(|l| l.line.as_str())
            .collect();
        assert!(!stdout.is_empty());
        assert!(lines.iter().all(|l| l.run_id == "p1"));
        assert!(stdout.contains(&book_path.as_str()));

        let stderr: Vec<&str> = lines
            .iter()
            .filter(|l| l.source == OutputSource::Stderr)
            .map(|l| l.line.trim())
            .collect();
        assert_eq!(stderr[0], "2", "exactly two artifacts during the run");
        assert!(stderr.iter().any(|l| l.contains("ansible.builtin.command")));

        assert_eq!(files_in(dir.path()), 0);
        assert_eq!(
            recorder
                .seen()
                .into_iter()
                .filter_map(|s| match s {
                    Seen::Stage(st) => Some(st),
                    _ => None,
                })
                .collect::<Vec<_>>(),
            [
                Stage::Serializing,
                Stage::Writing,
                Stage::Running,
                Stage::CleaningUp,
                Stage::Done
            ]
        );
    }

    #[tokio::test]
    async fn nonzero_exit_still_cleans_up() {
        let dir = TempDir::new().unwrap();
        let (exec, _) = executor(&dir, "echo failing >&2; exit 2");
        let (book, inventory) = fixture("p1");

        let err = exec
            .execute(&CancellationToken::new(), &book, &inventory)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Runtime { .. }), "{err:?}");
        assert_eq!(err.run_id(), "p1");
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn pre_cancelled_run_does_nothing() {
        let dir = TempDir::new().unwrap();
        let (exec, recorder) = executor(&dir, ECHO_ARGV);
        let mut sub = exec.subscribe();
        let (book, inventory) = fixture("p1");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = exec.execute(&cancel, &book, &inventory).await.unwrap_err();
        assert!(err.is_cancellation());
        assert!(recorder.commands().is_empty());
        assert_eq!(files_in(dir.path()), 0);

        drop(exec);
        assert_eq!(sub.recv().await, None, "no lines may be published");
    }

    #[tokio::test]
    async fn cancel_during_run_kills_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let (exec, _) = executor(&dir, "echo started; sleep 30");
        let (book, inventory) = fixture("p1");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(10),
            exec.execute(&cancel, &book, &inventory),
        )
        .await
        .expect("cancellation must stop the run")
        .unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn lingering_descendant_does_not_delay_cleanup() {
        let dir = TempDir::new().unwrap();
        let (exec, _) = executor(&dir, "sleep 5 & echo launched");
        let exec = exec.with_drain_timeout(Duration::from_millis(200));
        let sub = exec.subscribe_run("p1");
        let (book, inventory) = fixture("p1");

        tokio::time::timeout(
            Duration::from_secs(3),
            exec.execute(&CancellationToken::new(), &book, &inventory),
        )
        .await
        .expect("execute must return once the runner exits")
        .unwrap();
        assert_eq!(files_in(dir.path()), 0);

        let lines = tokio::time::timeout(Duration::from_secs(2), sub.collect_lines())
            .await
            .expect("subscription must end with the run");
        assert!(lines.iter().any(|l| l.line == "launched"));
    }

    #[tokio::test]
    async fn missing_runner_is_a_launch_error() {
        let dir = TempDir::new().unwrap();
        let exec = PlaybookExecutor::new(
            Workspace::new(dir.path(), "yml"),
            AnsiblePlaybookAdapter {
                executable: "__nonexistent_runner_xyz__".into(),
                ..Default::default()
            },
            OutputHub::new(8),
        );
        let (book, inventory) = fixture("p1");
        let err = exec
            .execute(&CancellationToken::new(), &book, &inventory)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Launch { .. }), "{err:?}");
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn serialization_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (exec, recorder) = executor(&dir, ECHO_ARGV);
        let (mut book, inventory) = fixture("p1");
        book.plays[0].set_var("bad", f64::NAN);

        let err = exec
            .execute(&CancellationToken::new(), &book, &inventory)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Serialization { .. }), "{err:?}");
        assert_eq!(recorder.seen(), [Seen::Stage(Stage::Serializing)]);
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn write_failure_starts_no_process() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let recorder = Recorder::default();
        let exec = PlaybookExecutor::new(
            Workspace::new(&blocker, "yml"),
            ShAdapter::new(ECHO_ARGV),
            OutputHub::new(8),
        )
        .with_observer(recorder.clone());
        let (book, inventory) = fixture("p1");

        let err = exec
            .execute(&CancellationToken::new(), &book, &inventory)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ExecutionError::Workspace { source: WorkspaceError::Write { .. }, .. }),
            "{err:?}"
        );
        assert!(recorder.commands().is_empty());
        assert_eq!(files_in(dir.path()), 1);
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_mask_outcome() {
        let dir = TempDir::new().unwrap();
        let (exec, recorder) = executor(&dir, r#"rm "$1""#);
        let (book, inventory) = fixture("p1");
        exec.execute(&CancellationToken::new(), &book, &inventory)
            .await
            .unwrap();
        assert!(recorder.seen().contains(&Seen::CleanupFailed));
        assert_eq!(files_in(dir.path()), 0);

        let (exec, recorder) = executor(&dir, r#"rm "$1"; exit 1"#);
        let err = exec
            .execute(&CancellationToken::new(), &book, &inventory)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Runtime { .. }));
        assert!(recorder.seen().contains(&Seen::CleanupFailed));
    }

    #[tokio::test]
    async fn same_playbook_id_cannot_run_concurrently() {
        let dir = TempDir::new().unwrap();
        let (exec, _) = executor(&dir, "sleep 1");
        let (book, inventory) = fixture("p1");
        let (other, other_inventory) = fixture("p1");
        let other_inventory = Inventory {
            id: "i2".into(),
            ..other_inventory
        };
        let cancel = CancellationToken::new();

        let (first, second) = tokio::join!(exec.execute(&cancel, &book, &inventory), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            exec.execute(&cancel, &other, &other_inventory).await
        });
        first.unwrap();
        let err = second.unwrap_err();
        assert!(
            matches!(err, ExecutionError::Workspace { source: WorkspaceError::InUse(_), .. }),
            "{err:?}"
        );
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn distinct_runs_share_the_hub() {
        let dir = TempDir::new().unwrap();
        let (exec, _) = executor(&dir, r#"echo "run $(basename "$1" .yml)""#);
        let (a, inv_a) = fixture("a");
        let (b, _) = fixture("b");
        let inv_b = Inventory::new("i2").with_group("test", ["localhost"]);
        let sub_a = exec.subscribe_run("a");
        let sub_b = exec.subscribe_run("b");
        let cancel = CancellationToken::new();

        let (ra, rb) = tokio::join!(
            exec.execute(&cancel, &a, &inv_a),
            exec.execute(&cancel, &b, &inv_b)
        );
        ra.unwrap();
        rb.unwrap();

        let lines_a = sub_a.collect_lines().await;
        let lines_b = sub_b.collect_lines().await;
        assert_eq!(lines_a.len(), 1);
        assert_eq!(lines_a[0].line, "run a");
        assert_eq!(lines_b[0].line, "run b");
    }
}
