use crate::core::{CommandOutput, CommandRunner, CommandSpec, RunningProcess};
use crate::utils::error::{DoctorError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// 沒有指定 timeout 時的上限
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// 以 tokio::process 執行外部指令
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }

    fn build(spec: &CommandSpec) -> Command {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args).kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        command
    }

    fn map_spawn_error(spec: &CommandSpec, err: std::io::Error) -> DoctorError {
        if err.kind() == std::io::ErrorKind::NotFound {
            DoctorError::CommandNotFound {
                program: spec.program.display().to_string(),
            }
        } else {
            DoctorError::IoError(err)
        }
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let command = spec.display();
        tracing::debug!("▶️ Running: {}", command);

        let child = Self::build(spec)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Self::map_spawn_error(spec, e))?;

        let limit = spec.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let start = Instant::now();

        // 逾時時 future 被丟棄，kill_on_drop 會終止子行程
        match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => {
                let output = result?;
                let duration = start.elapsed();
                tracing::debug!(
                    "⏱️ {} finished with {:?} in {:?}",
                    command,
                    output.status.code(),
                    duration
                );
                Ok(CommandOutput {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    timed_out: false,
                    duration,
                })
            }
            Err(_) => {
                tracing::warn!("⏰ {} timed out after {:?}", command, limit);
                Ok(CommandOutput {
                    code: None,
                    stdout: String::new(),
                    stderr: format!("timed out after {}s", limit.as_secs()),
                    timed_out: true,
                    duration: start.elapsed(),
                })
            }
        }
    }

    async fn spawn(&self, spec: &CommandSpec) -> Result<Box<dyn RunningProcess>> {
        tracing::debug!("🚀 Spawning in background: {}", spec.display());

        // stdout 丟棄；stderr 由背景工作持續讀取，只保留最後幾行
        let mut child = Self::build(spec)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Self::map_spawn_error(spec, e))?;

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let drain = child.stderr.take().map(|stderr| {
            let tail = stderr_tail.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
            })
        });

        Ok(Box::new(BackgroundProcess {
            child: Some(child),
            drain,
            stderr_tail,
            started: Instant::now(),
        }))
    }
}

/// 背景行程保留的 stderr 行數
const STDERR_TAIL_LINES: usize = 200;

struct BackgroundProcess {
    child: Option<Child>,
    drain: Option<JoinHandle<()>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    started: Instant,
}

#[async_trait]
impl RunningProcess for BackgroundProcess {
    async fn is_alive(&mut self) -> Result<bool> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?.is_none()),
            None => Ok(false),
        }
    }

    async fn terminate(&mut self) -> Result<CommandOutput> {
        let Some(mut child) = self.child.take() else {
            return Ok(CommandOutput::default());
        };

        if child.try_wait()?.is_none() {
            // 已結束的行程 kill 會回傳錯誤，可忽略
            if let Err(e) = child.start_kill() {
                tracing::debug!("kill failed: {}", e);
            }
        }

        let status = child.wait().await?;
        if let Some(drain) = self.drain.take() {
            // 行程結束後管線關閉，讀取工作隨即結束
            if tokio::time::timeout(Duration::from_secs(2), drain).await.is_err() {
                tracing::debug!("stderr reader did not finish in time");
            }
        }
        let stderr = self
            .stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();

        Ok(CommandOutput {
            code: status.code(),
            stdout: String::new(),
            stderr,
            timed_out: false,
            duration: self.started.elapsed(),
        })
    }
}
