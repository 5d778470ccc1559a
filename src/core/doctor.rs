use crate::config::profile::Profile;
use crate::core::dotenv::DotEnv;
use crate::core::report::Report;
use crate::core::{
    python, CheckOutcome, CommandRunner, CommandSpec, ConfigProvider, Finding, Mode, Storage,
    Summary, Toolchain,
};
use crate::utils::error::{DoctorError, ErrorSeverity, Result};
use crate::utils::monitor::SystemMonitor;
use async_trait::async_trait;
use chrono::Local;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 所有 check 共用的執行狀態
pub struct DoctorContext {
    pub execution_id: String,
    pub mode: Mode,
    pub dry_run: bool,
    pub project_root: PathBuf,
    pub profile: Profile,
    pub runner: Arc<dyn CommandRunner>,
    pub storage: Arc<dyn Storage>,
    pub python_override: Option<PathBuf>,
    pub toolchain: Option<Toolchain>,
    /// 工具鏈偵測失敗的原因（例如 --python 指向不存在的檔案）
    pub toolchain_error: Option<String>,
    pub dotenv: Option<DotEnv>,
    pub previous_outcomes: Vec<CheckOutcome>,
    pub shared_data: HashMap<String, serde_json::Value>,
}

impl DoctorContext {
    pub fn new(
        execution_id: String,
        config: &dyn ConfigProvider,
        runner: Arc<dyn CommandRunner>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            execution_id,
            mode: config.mode(),
            dry_run: config.dry_run(),
            project_root: config.project_root().to_path_buf(),
            profile: config.profile().clone(),
            runner,
            storage,
            python_override: config.python_override().map(Path::to_path_buf),
            toolchain: None,
            toolchain_error: None,
            dotenv: None,
            previous_outcomes: Vec::new(),
            shared_data: HashMap::new(),
        }
    }

    /// 重新偵測工具鏈並重新讀取 `.env`；修復後呼叫
    pub async fn refresh(&mut self) {
        match python::detect_toolchain(
            self.runner.as_ref(),
            &self.project_root,
            self.python_override.as_deref(),
            &self.profile.project.venv_candidates,
        )
        .await
        {
            Ok(toolchain) => {
                self.toolchain = toolchain;
                self.toolchain_error = None;
            }
            Err(e) => {
                tracing::warn!("⚠️ Toolchain detection failed: {}", e);
                self.toolchain = None;
                self.toolchain_error = Some(e.to_string());
            }
        }

        self.dotenv = self.load_dotenv().await;
    }

    async fn load_dotenv(&self) -> Option<DotEnv> {
        let file = &self.profile.env.file;
        if !self.storage.exists(file).await {
            return None;
        }
        match self.storage.read_to_string(file).await {
            Ok(content) => Some(DotEnv::parse(&content)),
            Err(e) => {
                tracing::warn!("⚠️ Cannot read {}: {}", file, e);
                None
            }
        }
    }

    pub fn get_outcome(&self, check: &str) -> Option<&CheckOutcome> {
        self.previous_outcomes.iter().find(|o| o.check == check)
    }

    pub fn add_shared_data(&mut self, key: String, value: serde_json::Value) {
        self.shared_data.insert(key, value);
    }

    pub fn get_shared_data(&self, key: &str) -> Option<&serde_json::Value> {
        self.shared_data.get(key)
    }

    /// 行程環境變數優先於設定檔
    pub fn settings_module(&self) -> String {
        std::env::var("DJANGO_SETTINGS_MODULE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.profile.project.settings_module.clone())
    }

    /// DATABASE_URL：行程環境、`.env`、設定檔預設值，依序取用
    pub fn database_url(&self) -> Option<String> {
        let var = &self.profile.env.database_url_var;
        std::env::var(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                self.dotenv
                    .as_ref()
                    .and_then(|env| env.get(var))
                    .map(String::from)
            })
            .or_else(|| self.profile.env.defaults.get(var).cloned())
    }

    pub fn django_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("DJANGO_SETTINGS_MODULE".to_string(), self.settings_module()),
            ("DJANGO_READ_DOT_ENV_FILE".to_string(), "True".to_string()),
        ];
        if let Some(url) = self.database_url() {
            env.push((self.profile.env.database_url_var.clone(), url));
        }
        env
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.profile.framework.command_timeout_seconds)
    }

    /// `python manage.py <args>`；沒有直譯器時回傳 None
    pub fn manage(&self, args: &[&str]) -> Option<CommandSpec> {
        let toolchain = self.toolchain.as_ref()?;
        let mut spec = CommandSpec::new(&toolchain.python)
            .arg(self.profile.framework.manage_py.as_str())
            .args(args.iter().copied())
            .current_dir(&self.project_root)
            .timeout(self.command_timeout());
        for (key, value) in self.django_env() {
            spec = spec.env(key, value);
        }
        Some(spec)
    }
}

/// 單一診斷項目
#[async_trait]
pub trait Check: Send + Sync {
    fn name(&self) -> &str;

    fn should_run(&self, _ctx: &DoctorContext) -> bool {
        true
    }

    async fn diagnose(&self, ctx: &DoctorContext) -> Result<Vec<Finding>>;

    /// 只會收到 `needs_repair()` 的 finding
    async fn repair(&self, ctx: &DoctorContext, fixable: &[Finding]) -> Result<Vec<Finding>>;

    /// 即使沒有可修復項目也要執行 repair（hard-repair 的強制重裝等）
    fn forces_repair(&self, _ctx: &DoctorContext) -> bool {
        false
    }

    fn describe_repair(&self, finding: &Finding) -> String {
        format!("would fix: {}", finding.message)
    }

    /// dry-run 時描述 forces_repair 會做的事
    fn describe_forced_repair(&self, _ctx: &DoctorContext) -> String {
        "would run a forced repair".to_string()
    }
}

/// 依序執行 check 並收集結果
pub struct CheckSequence {
    checks: Vec<Box<dyn Check>>,
    monitor: Option<SystemMonitor>,
}

impl CheckSequence {
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            monitor: None,
        }
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled.then(|| SystemMonitor::new(true));
        self
    }

    pub fn add_check(&mut self, check: Box<dyn Check>) {
        self.checks.push(check);
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn samples(&self) -> Vec<crate::utils::monitor::ResourceSample> {
        self.monitor
            .as_ref()
            .map(|m| m.samples())
            .unwrap_or_default()
    }

    pub async fn execute_all(&self, ctx: &mut DoctorContext) -> Result<Vec<CheckOutcome>> {
        let mut outcomes = Vec::new();

        for check in &self.checks {
            if !check.should_run(ctx) {
                tracing::info!("⏭️ Skipping check: {} (not applicable in {} mode)", check.name(), ctx.mode);
                continue;
            }

            tracing::info!("🔍 Running check: {}", check.name());
            let outcome = Self::execute_check(check.as_ref(), ctx).await?;

            tracing::info!(
                "✅ Check finished: {} (worst: {}, duration: {:?})",
                outcome.check,
                outcome.worst_severity(),
                outcome.duration
            );

            if let Some(monitor) = &self.monitor {
                monitor.log_check(check.name());
            }

            ctx.previous_outcomes.push(outcome.clone());
            outcomes.push(outcome);
        }

        if let Some(monitor) = &self.monitor {
            monitor.log_final_stats();
        }

        Ok(outcomes)
    }

    async fn execute_check(check: &dyn Check, ctx: &mut DoctorContext) -> Result<CheckOutcome> {
        let start = Instant::now();
        let name = check.name().to_string();

        let before = Self::guarded(&name, "check.failed", check.diagnose(ctx).await)?;
        let fixable: Vec<Finding> = before.iter().filter(|f| f.needs_repair()).cloned().collect();

        let mut repairs = Vec::new();
        let mut after = None;

        if ctx.mode.repairs() && (!fixable.is_empty() || check.forces_repair(ctx)) {
            if ctx.dry_run {
                repairs = fixable
                    .iter()
                    .map(|f| Finding::info(&name, &f.code, check.describe_repair(f)))
                    .collect();
                if check.forces_repair(ctx) {
                    repairs.push(Finding::info(&name, "repair.forced", check.describe_forced_repair(ctx)));
                }
            } else {
                tracing::info!("🔧 Repairing {} finding(s) in {}", fixable.len(), name);
                repairs = Self::guarded(&name, "repair.failed", check.repair(ctx, &fixable).await)?;

                ctx.refresh().await;
                after = Some(Self::guarded(&name, "check.failed", check.diagnose(ctx).await)?);
            }
        }

        Ok(CheckOutcome {
            check: name,
            before,
            repairs,
            after,
            duration: start.elapsed(),
        })
    }

    /// 一般錯誤轉成 error finding，讓序列繼續；Critical 錯誤中止
    fn guarded(name: &str, code: &str, result: Result<Vec<Finding>>) -> Result<Vec<Finding>> {
        match result {
            Ok(findings) => Ok(findings),
            Err(e) if e.severity() == ErrorSeverity::Critical => {
                tracing::error!("❌ {} aborted the run: {}", name, e);
                Err(e)
            }
            Err(e) => {
                tracing::error!("❌ {} failed: {}", name, e);
                Ok(vec![Finding::error(name, code, e.to_string())])
            }
        }
    }
}

impl Default for CheckSequence {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DoctorEngine<C: ConfigProvider> {
    config: C,
    runner: Arc<dyn CommandRunner>,
    storage: Arc<dyn Storage>,
    sequence: CheckSequence,
}

impl<C: ConfigProvider> DoctorEngine<C> {
    pub fn new(config: C, runner: Arc<dyn CommandRunner>, storage: Arc<dyn Storage>) -> Self {
        Self::new_with_monitoring(config, runner, storage, false)
    }

    pub fn new_with_monitoring(
        config: C,
        runner: Arc<dyn CommandRunner>,
        storage: Arc<dyn Storage>,
        monitor_enabled: bool,
    ) -> Self {
        let mut sequence = CheckSequence::new().with_monitoring(monitor_enabled);
        for check in crate::app::checks::default_checks() {
            sequence.add_check(check);
        }
        Self {
            config,
            runner,
            storage,
            sequence,
        }
    }

    /// 以自訂的 check 取代預設序列
    pub fn with_checks(mut self, checks: Vec<Box<dyn Check>>) -> Self {
        let mut sequence = CheckSequence::new().with_monitoring(self.sequence.monitor.is_some());
        for check in checks {
            sequence.add_check(check);
        }
        self.sequence = sequence;
        self
    }

    pub async fn run(&self) -> Result<Report> {
        let started_at = Local::now();
        let execution_id = format!("doctor_{}", started_at.format("%Y%m%d_%H%M%S"));
        let project = self.config.project_root().display().to_string();

        if !self.config.project_root().is_dir() {
            return Err(DoctorError::ProjectNotFound { path: project });
        }

        tracing::info!(
            "🩺 Starting {} ({}{}) for {}",
            execution_id,
            self.config.mode(),
            if self.config.dry_run() { ", dry run" } else { "" },
            project
        );

        let mut ctx = DoctorContext::new(
            execution_id.clone(),
            &self.config,
            self.runner.clone(),
            self.storage.clone(),
        );
        ctx.refresh().await;

        let outcomes = self.sequence.execute_all(&mut ctx).await?;
        let summary = Summary::from_outcomes(&outcomes);

        let report = Report {
            execution_id,
            project,
            mode: self.config.mode(),
            dry_run: self.config.dry_run(),
            started_at,
            finished_at: Local::now(),
            outcomes,
            summary,
            resources: self.sequence.samples(),
        };

        report
            .write(self.storage.as_ref(), &self.config.profile().report)
            .await?;

        tracing::info!(
            "🏁 Finished: {} errors, {} warnings, {} fixed",
            report.summary.errors,
            report.summary.warnings,
            report.summary.fixed
        );
        Ok(report)
    }
}
