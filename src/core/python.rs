use crate::core::{CommandRunner, CommandSpec};
use crate::domain::model::{PythonVersion, Toolchain};
use crate::utils::error::{DoctorError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

const VERSION_TIMEOUT: Duration = Duration::from_secs(20);

/// venv 目錄內的直譯器路徑
pub fn venv_python(venv: &Path) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

/// 依序在專案目錄與上層目錄中尋找 venv
pub fn find_virtualenv(project_root: &Path, candidates: &[String]) -> Option<PathBuf> {
    let mut roots = vec![project_root.to_path_buf()];
    if let Some(parent) = project_root.parent().filter(|p| !p.as_os_str().is_empty()) {
        roots.push(parent.to_path_buf());
    }

    for root in roots {
        for candidate in candidates {
            let dir = root.join(candidate);
            if venv_python(&dir).is_file() {
                return Some(dir);
            }
        }
    }
    None
}

/// PATH 上的系統直譯器
pub fn system_python() -> Option<PathBuf> {
    ["python3", "python"]
        .iter()
        .find_map(|name| which::which(name).ok())
}

pub fn find_uv() -> Option<PathBuf> {
    which::which("uv").ok()
}

/// 由直譯器路徑推回所屬的 venv（`<venv>/bin/python`）
fn venv_of(python: &Path) -> Option<PathBuf> {
    let venv = python.parent()?.parent()?;
    if venv.join("pyvenv.cfg").is_file() {
        Some(venv.to_path_buf())
    } else {
        None
    }
}

pub async fn python_version(runner: &dyn CommandRunner, python: &Path) -> Result<Option<PythonVersion>> {
    let spec = CommandSpec::new(python)
        .arg("--version")
        .timeout(VERSION_TIMEOUT);
    let output = runner.run(&spec).await?;

    // Python 2 與部分舊版 3.x 會印到 stderr
    Ok(PythonVersion::parse(&output.stdout).or_else(|| PythonVersion::parse(&output.stderr)))
}

/// 偵測順序：--python、venv 候選目錄、PATH 上的 python3/python
pub async fn detect_toolchain(
    runner: &dyn CommandRunner,
    project_root: &Path,
    python_override: Option<&Path>,
    venv_candidates: &[String],
) -> Result<Option<Toolchain>> {
    let (python, venv) = if let Some(explicit) = python_override {
        if !explicit.exists() && which::which(explicit).is_err() {
            return Err(DoctorError::CommandNotFound {
                program: explicit.display().to_string(),
            });
        }
        (explicit.to_path_buf(), venv_of(explicit))
    } else if let Some(venv) = find_virtualenv(project_root, venv_candidates) {
        (venv_python(&venv), Some(venv))
    } else if let Some(python) = system_python() {
        (python, None)
    } else {
        tracing::warn!("⚠️ No Python interpreter found");
        return Ok(None);
    };

    let version = python_version(runner, &python).await?;
    let toolchain = Toolchain {
        python,
        version,
        venv,
        uv: find_uv(),
    };

    tracing::debug!(
        "🐍 Interpreter: {} ({}), venv: {:?}, uv: {}",
        toolchain.python.display(),
        toolchain
            .version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        toolchain.venv,
        toolchain.uv.is_some()
    );
    Ok(Some(toolchain))
}

/// 建立 venv：先試 uv，失敗再用 `python -m venv`
pub async fn create_virtualenv(
    runner: &dyn CommandRunner,
    project_root: &Path,
    dir_name: &str,
    base_python: &Path,
    uv: Option<&Path>,
) -> Result<PathBuf> {
    let target = project_root.join(dir_name);

    if let Some(uv) = uv {
        let spec = CommandSpec::new(uv)
            .args(["venv", dir_name, "--python"])
            .arg(base_python.to_string_lossy())
            .current_dir(project_root)
            .timeout(Duration::from_secs(300));
        let output = runner.run(&spec).await?;
        if output.success() {
            tracing::info!("✅ Created virtualenv with uv: {}", target.display());
            return Ok(target);
        }
        tracing::warn!("⚠️ uv venv failed, falling back to python -m venv: {}", output.tail(3));
    }

    let spec = CommandSpec::new(base_python)
        .args(["-m", "venv", dir_name])
        .current_dir(project_root)
        .timeout(Duration::from_secs(300));
    let output = runner.run(&spec).await?;
    if !output.success() {
        return Err(DoctorError::CommandFailed {
            command: spec.display(),
            code: output.code,
            stderr: output.tail(5),
        });
    }

    tracing::info!("✅ Created virtualenv: {}", target.display());
    Ok(target)
}
