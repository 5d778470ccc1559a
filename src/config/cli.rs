use crate::config::profile::{Profile, REPORT_FORMATS};
use crate::config::DoctorSettings;
use crate::domain::model::Mode;
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "stack-doctor", version)]
#[command(about = "Diagnose and repair a Django + Wagtail + Oscar project environment")]
#[command(group(
    ArgGroup::new("mode_flag")
        .args(["diagnose", "repair", "hard_repair", "verify"])
        .multiple(false)
        .conflicts_with("mode")
))]
pub struct CliConfig {
    /// Project root (the directory holding manage.py)
    #[arg(long, default_value = ".")]
    pub project: PathBuf,

    /// Python interpreter to use instead of auto-detection
    #[arg(long)]
    pub python: Option<PathBuf>,

    /// TOML profile (defaults to <project>/stack-doctor.toml, then the built-in profile)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Shorthand for --mode diagnose
    #[arg(long)]
    pub diagnose: bool,

    /// Shorthand for --mode repair
    #[arg(long, visible_alias = "fix")]
    pub repair: bool,

    /// Shorthand for --mode hard-repair
    #[arg(long)]
    pub hard_repair: bool,

    /// Shorthand for --mode verify
    #[arg(long)]
    pub verify: bool,

    /// Show the repairs that would run without touching the project
    #[arg(long)]
    pub dry_run: bool,

    /// Override report.output_dir from the profile
    #[arg(long)]
    pub report_dir: Option<String>,

    /// Report formats (markdown,json,csv)
    #[arg(long, value_delimiter = ',')]
    pub format: Vec<String>,

    /// Skip the dev-server liveness probe
    #[arg(long)]
    pub no_server: bool,

    /// Dev-server port for the liveness probe
    #[arg(long)]
    pub port: Option<u16>,

    /// Seconds the dev server must stay up
    #[arg(long)]
    pub hold_seconds: Option<u64>,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long)]
    pub json_logs: bool,

    /// Log process CPU and memory after each check
    #[arg(long)]
    pub monitor: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl CliConfig {
    pub fn effective_mode(&self) -> Mode {
        if let Some(mode) = self.mode {
            return mode;
        }
        if self.repair {
            Mode::Repair
        } else if self.hard_repair {
            Mode::HardRepair
        } else if self.verify {
            Mode::Verify
        } else {
            Mode::Diagnose
        }
    }

    /// 載入設定檔並套用命令列覆蓋設定
    pub fn load_profile(&self) -> Result<Profile> {
        let mut profile = match &self.config {
            Some(path) => {
                tracing::info!("📁 Loading profile from: {}", path.display());
                Profile::from_file(path)?
            }
            None => Profile::discover(&self.project)?,
        };

        if let Some(dir) = &self.report_dir {
            profile.report.output_dir = dir.clone();
        }
        if !self.format.is_empty() {
            profile.report.formats = self.format.clone();
        }
        if self.no_server {
            profile.server.enabled = false;
        }
        if let Some(port) = self.port {
            profile.server.port = port;
        }
        if let Some(hold) = self.hold_seconds {
            profile.server.hold_seconds = hold;
        }

        Ok(profile)
    }

    pub fn into_settings(self, profile: Profile) -> DoctorSettings {
        let mode = self.effective_mode();
        DoctorSettings::new(self.project, profile)
            .with_python(self.python)
            .with_mode(mode)
            .with_dry_run(self.dry_run)
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("project", &self.project.to_string_lossy())?;
        if !self.format.is_empty() {
            validation::validate_choices("format", &self.format, REPORT_FORMATS)?;
        }
        if let Some(hold) = self.hold_seconds {
            validation::validate_range("hold-seconds", hold, 1, 120)?;
        }
        if let Some(port) = self.port {
            validation::validate_range("port", port, 1, u16::MAX)?;
        }
        Ok(())
    }
}
