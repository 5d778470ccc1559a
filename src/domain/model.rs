use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// 執行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Read-only diagnosis
    #[default]
    Diagnose,
    /// Fix what can be fixed, then re-check
    Repair,
    /// Repair plus forced reinstall, makemigrations and a clean collectstatic
    HardRepair,
    /// Interpreter, `manage.py check` and dev-server liveness only
    Verify,
}

impl Mode {
    pub fn repairs(&self) -> bool {
        matches!(self, Mode::Repair | Mode::HardRepair)
    }

    pub fn is_hard(&self) -> bool {
        matches!(self, Mode::HardRepair)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Diagnose => "diagnose",
            Mode::Repair => "repair",
            Mode::HardRepair => "hard-repair",
            Mode::Verify => "verify",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Info,
    Fixed,
    Warning,
    Error,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Info => "INFO",
            Severity::Fixed => "FIXED",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 單一檢查結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub check: String,
    pub code: String,
    pub severity: Severity,
    pub message: String,
    pub fixable: bool,
}

impl Finding {
    pub fn new(
        check: impl Into<String>,
        code: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            check: check.into(),
            code: code.into(),
            severity,
            message: message.into(),
            fixable: false,
        }
    }

    pub fn ok(check: &str, code: &str, message: impl Into<String>) -> Self {
        Self::new(check, code, Severity::Ok, message)
    }

    pub fn info(check: &str, code: &str, message: impl Into<String>) -> Self {
        Self::new(check, code, Severity::Info, message)
    }

    pub fn fixed(check: &str, code: &str, message: impl Into<String>) -> Self {
        Self::new(check, code, Severity::Fixed, message)
    }

    pub fn warning(check: &str, code: &str, message: impl Into<String>) -> Self {
        Self::new(check, code, Severity::Warning, message)
    }

    pub fn error(check: &str, code: &str, message: impl Into<String>) -> Self {
        Self::new(check, code, Severity::Error, message)
    }

    pub fn fixable(mut self) -> Self {
        self.fixable = true;
        self
    }

    /// 是否需要在修復模式下處理
    pub fn needs_repair(&self) -> bool {
        self.fixable && matches!(self.severity, Severity::Warning | Severity::Error)
    }
}

/// 一個 check 的完整執行紀錄
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub check: String,
    pub before: Vec<Finding>,
    pub repairs: Vec<Finding>,
    pub after: Option<Vec<Finding>>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_duration_ms")]
    pub duration: Duration,
}

impl CheckOutcome {
    /// 修復後以複查結果為準，否則使用初次診斷結果
    pub fn final_findings(&self) -> &[Finding] {
        self.after.as_deref().unwrap_or(&self.before)
    }

    pub fn worst_severity(&self) -> Severity {
        self.final_findings()
            .iter()
            .chain(self.repairs.iter().filter(|f| f.severity == Severity::Error))
            .map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Ok)
    }
}

fn serialize_duration_ms<S: serde::Serializer>(
    value: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub analyzed: usize,
    pub ok: usize,
    pub info: usize,
    pub fixed: usize,
    pub warnings: usize,
    pub errors: usize,
}

impl Summary {
    pub fn from_outcomes(outcomes: &[CheckOutcome]) -> Self {
        let mut summary = Summary::default();

        for outcome in outcomes {
            summary.analyzed += outcome.before.len();
            // 修復失敗也算在錯誤裡，即使複查結果看起來正常
            for repair in &outcome.repairs {
                match repair.severity {
                    Severity::Fixed => summary.fixed += 1,
                    Severity::Error => summary.errors += 1,
                    _ => {}
                }
            }

            for finding in outcome.final_findings() {
                match finding.severity {
                    Severity::Ok => summary.ok += 1,
                    Severity::Info => summary.info += 1,
                    Severity::Fixed => summary.fixed += 1,
                    Severity::Warning => summary.warnings += 1,
                    Severity::Error => summary.errors += 1,
                }
            }
        }

        summary
    }

    pub fn is_healthy(&self) -> bool {
        self.errors == 0
    }
}

/// 偵測到的 Python 工具鏈
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toolchain {
    pub python: PathBuf,
    pub version: Option<PythonVersion>,
    pub venv: Option<PathBuf>,
    pub uv: Option<PathBuf>,
}

impl Toolchain {
    pub fn in_virtualenv(&self) -> bool {
        self.venv.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PythonVersion {
    /// 解析 `Python 3.11.4` 或 `3.11`
    pub fn parse(text: &str) -> Option<Self> {
        let raw = text.trim().trim_start_matches("Python").trim();
        let raw = raw.split_whitespace().next()?;
        let mut parts = raw.split('.').map(|p| {
            let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().ok()
        });

        let major = parts.next()??;
        let minor = parts.next().flatten().unwrap_or(0);
        let patch = parts.next().flatten().unwrap_or(0);
        Some(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(before: Vec<Finding>, repairs: Vec<Finding>, after: Option<Vec<Finding>>) -> CheckOutcome {
        CheckOutcome {
            check: "settings".to_string(),
            before,
            repairs,
            after,
            duration: Duration::from_millis(3),
        }
    }

    #[test]
    fn test_python_version_parse() {
        assert_eq!(
            PythonVersion::parse("Python 3.11.4"),
            Some(PythonVersion { major: 3, minor: 11, patch: 4 })
        );
        assert_eq!(
            PythonVersion::parse("Python 3.13.0rc2\n"),
            Some(PythonVersion { major: 3, minor: 13, patch: 0 })
        );
        assert_eq!(
            PythonVersion::parse("3.10"),
            Some(PythonVersion { major: 3, minor: 10, patch: 0 })
        );
        assert_eq!(PythonVersion::parse("command not found"), None);
    }

    #[test]
    fn test_summary_prefers_after_findings() {
        let before = vec![
            Finding::error("settings", "settings.duplicate_app", "django_tables2 listed twice").fixable(),
            Finding::ok("settings", "settings.file", "base.py present"),
        ];
        let repairs = vec![Finding::fixed("settings", "settings.duplicate_app", "removed duplicate")];
        let after = vec![
            Finding::ok("settings", "settings.file", "base.py present"),
            Finding::ok("settings", "settings.apps", "no duplicate apps"),
        ];

        let summary = Summary::from_outcomes(&[outcome(before, repairs, Some(after))]);
        assert_eq!(summary.analyzed, 2);
        assert_eq!(summary.fixed, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.ok, 2);
        assert!(summary.is_healthy());
    }

    #[test]
    fn test_failed_repair_counts_as_error() {
        let before = vec![Finding::warning("framework", "django.unapplied", "2 unapplied migration(s)").fixable()];
        let repairs = vec![
            Finding::error("framework", "django.migrate", "manage.py migrate --noinput failed"),
            Finding::error("framework", "django.collectstatic", "manage.py collectstatic --noinput failed"),
        ];
        let after = vec![Finding::ok("framework", "django.check", "System check identified no issues")];

        let o = outcome(before, repairs, Some(after));
        assert_eq!(o.worst_severity(), Severity::Error);

        let summary = Summary::from_outcomes(&[o]);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.fixed, 0);
        assert!(!summary.is_healthy());
    }

    #[test]
    fn test_worst_severity() {
        let o = outcome(
            vec![
                Finding::warning("structure", "structure.dir", "logs missing"),
                Finding::ok("structure", "structure.file", "manage.py present"),
            ],
            vec![],
            None,
        );
        assert_eq!(o.worst_severity(), Severity::Warning);
    }

    #[test]
    fn test_needs_repair() {
        assert!(Finding::error("env", "x", "m").fixable().needs_repair());
        assert!(!Finding::error("env", "x", "m").needs_repair());
        assert!(!Finding::info("env", "x", "m").fixable().needs_repair());
    }
}
