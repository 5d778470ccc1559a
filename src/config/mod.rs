#[cfg(feature = "cli")]
pub mod cli;
pub mod profile;

use crate::core::ConfigProvider;
use crate::domain::model::Mode;
use crate::utils::error::{DoctorError, Result};
use crate::utils::validation::Validate;
use profile::Profile;
use std::path::{Path, PathBuf};

/// 轉成絕對路徑；子行程會以專案目錄為工作目錄執行，相對路徑會失效
fn absolute(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or_else(|_| {
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&path))
                .unwrap_or(path)
        }
    })
}

/// 合併 CLI 參數與設定檔後的最終執行設定
#[derive(Debug, Clone)]
pub struct DoctorSettings {
    pub project_root: PathBuf,
    pub python: Option<PathBuf>,
    pub mode: Mode,
    pub dry_run: bool,
    pub profile: Profile,
}

impl DoctorSettings {
    pub fn new(project_root: impl Into<PathBuf>, profile: Profile) -> Self {
        Self {
            project_root: absolute(project_root.into()),
            python: None,
            mode: Mode::Diagnose,
            dry_run: false,
            profile,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// 含目錄的路徑轉成絕對路徑；單純的指令名稱（`python3`）留給 PATH 查找
    pub fn with_python(mut self, python: Option<PathBuf>) -> Self {
        self.python = python.map(|p| {
            if p.components().count() > 1 {
                absolute(p)
            } else {
                p
            }
        });
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 專案根目錄必須存在，否則整個流程無法進行
    pub fn ensure_project_root(&self) -> Result<()> {
        if !self.project_root.is_dir() {
            return Err(DoctorError::ProjectNotFound {
                path: self.project_root.display().to_string(),
            });
        }
        Ok(())
    }
}

impl ConfigProvider for DoctorSettings {
    fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn python_override(&self) -> Option<&Path> {
        self.python.as_deref()
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn dry_run(&self) -> bool {
        self.dry_run
    }

    fn profile(&self) -> &Profile {
        &self.profile
    }
}

impl Validate for DoctorSettings {
    fn validate(&self) -> Result<()> {
        if let Some(python) = &self.python {
            crate::utils::validation::validate_path("python", &python.to_string_lossy())?;
        }
        self.profile.validate()
    }
}
