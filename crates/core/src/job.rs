//! Background command execution with streamed logs and URL extraction (§4.6).

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::LazyLock;

use dashmap::DashMap;
use indexmap::IndexSet;
use jiff::Timestamp;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::executor::{self, KILL_GRACE};
use crate::model::CommandSpec;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s]+").expect("valid URL regex"));

/// Status a job is in; terminal once it leaves `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
}

/// A snapshot of a job's state, safe to hand to a caller (logs and urls are
/// owned copies, not references into the live record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub tag: String,
    pub command: String,
    pub args: Vec<String>,
    pub status: JobStatus,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub exit_code: Option<i32>,
    pub urls: Vec<String>,
    pub logs: Vec<String>,
}

struct JobRecord {
    id: Uuid,
    tag: String,
    command: String,
    args: Vec<String>,
    status: JobStatus,
    started_at: Timestamp,
    finished_at: Option<Timestamp>,
    exit_code: Option<i32>,
    urls: IndexSet<String>,
    logs: VecDeque<String>,
    max_log_lines: usize,
}

impl JobRecord {
    fn push_log(&mut self, line: String) {
        for url in URL_PATTERN.find_iter(&line) {
            self.urls.insert(url.as_str().to_string());
        }

        if self.logs.len() >= self.max_log_lines {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            tag: self.tag.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            status: self.status,
            started_at: self.started_at,
            finished_at: self.finished_at,
            exit_code: self.exit_code,
            urls: self.urls.iter().cloned().collect(),
            logs: self.logs.iter().cloned().collect(),
        }
    }
}

/// Whether a command must pass the executable allow-list before it's spawned.
/// The generic-CLI admin surface enforces this; provider login/status/rate-limit
/// commands come from trusted config and don't.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutableGate {
    Trusted,
    AllowListed,
}

/// Runs background commands and keeps a bounded, queryable history of them.
pub struct JobManager {
    jobs: DashMap<Uuid, Arc<Mutex<JobRecord>>>,
    max_log_lines: usize,
    allowed_executables: Vec<String>,
}

impl JobManager {
    pub fn new(config: &config::JobManagerConfig) -> Self {
        Self {
            jobs: DashMap::new(),
            max_log_lines: config.max_log_lines,
            allowed_executables: config.allowed_executables.clone(),
        }
    }

    /// Spawn `spec` under `tag`, returning immediately with a `running` summary.
    /// The command continues executing in a detached supervising task.
    pub async fn start_command(&self, tag: &str, spec: CommandSpec, gate: ExecutableGate) -> Result<JobSummary> {
        if gate == ExecutableGate::AllowListed {
            self.check_allow_list(&spec.executable)?;
        }

        let id = Uuid::new_v4();
        let record = Arc::new(Mutex::new(JobRecord {
            id,
            tag: tag.to_string(),
            command: spec.executable.clone(),
            args: spec.args.clone(),
            status: JobStatus::Running,
            started_at: Timestamp::now(),
            finished_at: None,
            exit_code: None,
            urls: IndexSet::new(),
            logs: VecDeque::new(),
            max_log_lines: self.max_log_lines,
        }));

        self.jobs.insert(id, record.clone());

        tokio::spawn(supervise(record.clone(), spec));

        Ok(record.lock().await.summary())
    }

    fn check_allow_list(&self, executable: &str) -> Result<()> {
        let basename = std::path::Path::new(executable)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(executable);

        if self.allowed_executables.iter().any(|allowed| allowed == basename) {
            Ok(())
        } else {
            Err(Error::ConfigError(format!("executable '{basename}' is not on the job allow-list")))
        }
    }

    pub async fn get_job(&self, id: Uuid) -> Option<JobSummary> {
        let record = self.jobs.get(&id)?.clone();
        Some(record.lock().await.summary())
    }

    /// Most recently started jobs first, truncated to `limit`.
    pub async fn list_jobs(&self, limit: usize) -> Vec<JobSummary> {
        let mut summaries = Vec::with_capacity(self.jobs.len());
        for entry in self.jobs.iter() {
            summaries.push(entry.value().lock().await.summary());
        }
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        summaries.truncate(limit);
        summaries
    }
}

async fn supervise(record: Arc<Mutex<JobRecord>>, spec: CommandSpec) {
    let mut command = Command::new(&spec.executable);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            let mut record = record.lock().await;
            record.push_log(format!("[system] failed to start: {err}"));
            record.status = JobStatus::Failed;
            record.finished_at = Some(Timestamp::now());
            return;
        }
    };

    let stdout = BufReader::new(child.stdout.take().expect("stdout piped at spawn")).lines();
    let stderr = BufReader::new(child.stderr.take().expect("stderr piped at spawn")).lines();

    let stdout_record = record.clone();
    let stdout_task = tokio::spawn(stream_lines(stdout, "stdout", stdout_record));
    let stderr_record = record.clone();
    let stderr_task = tokio::spawn(stream_lines(stderr, "stderr", stderr_record));

    let timeout_dur = std::time::Duration::from_millis(spec.timeout_ms);
    let status = match timeout(timeout_dur, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            record.lock().await.push_log("[system] command timed out".to_string());
            executor::send_signal(&child, libc::SIGTERM);

            let status = match timeout(KILL_GRACE, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    executor::send_signal(&child, libc::SIGKILL);
                    child.wait().await
                }
            };

            let _ = stdout_task.await;
            let _ = stderr_task.await;

            let mut record = record.lock().await;
            record.status = JobStatus::TimedOut;
            record.exit_code = status.ok().and_then(|status| status.code());
            record.finished_at = Some(Timestamp::now());
            return;
        }
    };

    let _ = stdout_task.await;
    let _ = stderr_task.await;

    let mut record = record.lock().await;
    record.status = match &status {
        Ok(status) if status.success() => JobStatus::Completed,
        _ => JobStatus::Failed,
    };
    record.exit_code = status.ok().and_then(|status| status.code());
    record.finished_at = Some(Timestamp::now());
}

async fn stream_lines<R: tokio::io::AsyncBufRead + Unpin>(
    mut lines: tokio::io::Lines<R>,
    stream_name: &'static str,
    record: Arc<Mutex<JobRecord>>,
) {
    while let Ok(Some(line)) = lines.next_line().await {
        record.lock().await.push_log(format!("[{stream_name}] {line}"));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn manager(allowed: &[&str]) -> JobManager {
        JobManager::new(&config::JobManagerConfig {
            max_log_lines: 10,
            allowed_executables: allowed.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn spec(executable: &str, args: &[&str], timeout_ms: u64) -> CommandSpec {
        CommandSpec {
            executable: executable.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: HashMap::new(),
            cwd: None,
            timeout_ms,
        }
    }

    #[tokio::test]
    async fn completes_and_records_stdout_lines() {
        let manager = manager(&[]);
        let summary = manager
            .start_command("test", spec("/bin/echo", &["hello world"], 5_000), ExecutableGate::Trusted)
            .await
            .unwrap();

        let job = wait_for_terminal(&manager, summary.id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.exit_code, Some(0));
        assert!(job.logs.iter().any(|line| line.contains("hello world")));
    }

    #[tokio::test]
    async fn extracts_urls_from_streamed_output() {
        let manager = manager(&[]);
        let summary = manager
            .start_command(
                "test",
                spec("/bin/echo", &["visit https://example.com/docs now"], 5_000),
                ExecutableGate::Trusted,
            )
            .await
            .unwrap();

        let job = wait_for_terminal(&manager, summary.id).await;
        assert_eq!(job.urls, vec!["https://example.com/docs".to_string()]);
    }

    #[tokio::test]
    async fn allow_list_rejects_unlisted_executable() {
        let manager = manager(&["allowed-cli"]);
        let result = manager.start_command("test", spec("/bin/echo", &[], 5_000), ExecutableGate::AllowListed).await;
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn allow_list_matches_by_basename() {
        let manager = manager(&["echo"]);
        let result = manager.start_command("test", spec("/bin/echo", &["hi"], 5_000), ExecutableGate::AllowListed).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn list_jobs_sorts_most_recent_first() {
        let manager = manager(&[]);
        let first = manager.start_command("t", spec("/bin/echo", &["one"], 5_000), ExecutableGate::Trusted).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = manager.start_command("t", spec("/bin/echo", &["two"], 5_000), ExecutableGate::Trusted).await.unwrap();

        wait_for_terminal(&manager, first.id).await;
        wait_for_terminal(&manager, second.id).await;

        let jobs = manager.list_jobs(10).await;
        assert_eq!(jobs[0].id, second.id);
        assert_eq!(jobs[1].id, first.id);
    }

    async fn wait_for_terminal(manager: &JobManager, id: Uuid) -> JobSummary {
        for _ in 0..100 {
            let job = manager.get_job(id).await.unwrap();
            if job.status != JobStatus::Running {
                return job;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("job never reached a terminal state");
    }
}
