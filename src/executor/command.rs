//! External-command executor: one working directory and one process per task.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ExecError, Executor, TaskContext};
use crate::config::JobConfig;
use crate::webhook::PushEvent;

/// Runs the configured job command for each push.
///
/// For every task it creates `<work_dir>/<key>/<commit>_<task>/`, writes the
/// push payload to `push.json`, and runs the command there with stdout and
/// stderr captured to `job.log`.
pub struct CommandExecutor {
    job: JobConfig,
    github_token: Option<SecretString>,
}

impl CommandExecutor {
    pub fn new(job: JobConfig, github_token: Option<SecretString>) -> Self {
        Self { job, github_token }
    }

    pub fn job(&self) -> &JobConfig {
        &self.job
    }

    /// Directory a task's run happens in.
    pub fn task_dir(&self, task: &TaskContext, push: &PushEvent) -> PathBuf {
        self.job.work_dir.join(path_segment(&task.key)).join(format!(
            "{}_{}",
            path_segment(push.short_commit()),
            task.id
        ))
    }

    async fn prepare(&self, task: &TaskContext, push: &PushEvent) -> Result<PathBuf, ExecError> {
        let dir = self.task_dir(task, push);
        tokio::fs::create_dir_all(&dir).await?;

        let push_json = serde_json::to_vec_pretty(push)
            .map_err(|e| ExecError::Failed(format!("serialize push payload: {e}")))?;
        tokio::fs::write(dir.join("push.json"), push_json).await?;

        debug!(
            task_id = %task.id,
            key = %task.key,
            dir = %dir.display(),
            "task directory prepared"
        );
        Ok(dir)
    }

    fn command(&self, dir: &Path, task: &TaskContext, push: &PushEvent) -> std::io::Result<Command> {
        // Resolve relative command paths against the process CWD, not the
        // task dir: Command::new + current_dir resolves after chdir.
        let program = if self.job.command.is_relative() {
            std::env::current_dir()?.join(&self.job.command)
        } else {
            self.job.command.clone()
        };

        let log = std::fs::File::create(dir.join("job.log"))?;
        let mut cmd = Command::new(program);
        cmd.current_dir(dir)
            .envs(&self.job.env)
            .env("HOOKQ_TASK_DIR", dir)
            .env("HOOKQ_TASK_ID", task.id.0.to_string())
            .env("HOOKQ_KEY", &task.key)
            .env("HOOKQ_MANUAL", if task.manual { "1" } else { "0" })
            .env("HOOKQ_JOB", &self.job.name)
            .env("HOOKQ_REF", &push.git_ref)
            .env("HOOKQ_COMMIT", push.commit_id())
            .env("HOOKQ_REPO", &push.repository.full_name)
            .env("HOOKQ_CLONE_URL", &push.repository.clone_url)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .kill_on_drop(true);
        if let Some(token) = &self.github_token {
            cmd.env("HOOKQ_GITHUB_TOKEN", token.expose_secret());
        }
        Ok(cmd)
    }
}

#[async_trait]
impl Executor<PushEvent> for CommandExecutor {
    async fn run(
        &self,
        task: TaskContext,
        push: PushEvent,
        cancel: CancellationToken,
    ) -> Result<(), ExecError> {
        let start = Instant::now();
        let dir = self.prepare(&task, &push).await?;
        let mut child = self.command(&dir, &task, &push)?.spawn()?;

        info!(
            task_id = %task.id,
            key = %task.key,
            job = %self.job.name,
            commit = push.short_commit(),
            "job started"
        );

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                warn!(task_id = %task.id, key = %task.key, "job cancelled, killing");
                child.kill().await?;
                return Err(ExecError::Cancelled);
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        if status.success() {
            info!(task_id = %task.id, key = %task.key, duration_ms, "job finished");
            Ok(())
        } else {
            Err(ExecError::Exit {
                code: status.code().unwrap_or(-1),
            })
        }
    }
}

/// Make `raw` safe to use as a single path component.
fn path_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_are_sanitized() {
        assert_eq!(path_segment("alice"), "alice");
        assert_eq!(path_segment("a/b"), "a_b");
        assert_eq!(path_segment(".."), "_");
        assert_eq!(path_segment(""), "_");
        assert_eq!(path_segment("bob smith"), "bob_smith");
    }
}
