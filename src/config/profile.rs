use crate::utils::error::{DoctorError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// 內建的 Wagtail + Oscar 專案設定檔
pub const BUILTIN_PROFILE: &str = include_str!("../../profiles/wagtail-oscar.toml");

/// 專案預設會讀取的設定檔名稱
pub const PROFILE_FILE_NAME: &str = "stack-doctor.toml";

pub const REPORT_FORMATS: &[&str] = &["markdown", "json", "csv"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub project: ProjectSection,
    pub env: EnvSection,
    pub installer: InstallerSection,
    pub packages: Vec<PackageEntry>,
    pub settings: SettingsSection,
    pub structure: StructureSection,
    pub framework: FrameworkSection,
    pub server: ServerSection,
    pub report: ReportSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    pub name: Option<String>,
    pub settings_module: String,
    pub venv_candidates: Vec<String>,
    pub min_python: String,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: None,
            settings_module: "config.settings.local".to_string(),
            venv_candidates: vec![".venv".to_string(), "venv".to_string(), "env".to_string()],
            min_python: "3.10".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvSection {
    pub file: String,
    pub required: Vec<String>,
    pub secret_key_var: Option<String>,
    pub database_url_var: String,
    pub defaults: BTreeMap<String, String>,
}

impl Default for EnvSection {
    fn default() -> Self {
        Self {
            file: ".env".to_string(),
            required: Vec::new(),
            secret_key_var: None,
            database_url_var: "DATABASE_URL".to_string(),
            defaults: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerSection {
    pub prefer_uv: bool,
    pub index_url: Option<String>,
    pub timeout_seconds: u64,
    pub pip_check: bool,
}

impl Default for InstallerSection {
    fn default() -> Self {
        Self {
            prefer_uv: true,
            index_url: None,
            timeout_seconds: 900,
            pip_check: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    pub spec: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSection {
    pub file: String,
    pub app_lists: Vec<String>,
    pub required_entries: Vec<RequiredEntry>,
    pub middleware_order: Vec<OrderRule>,
    pub required_lines: Vec<RequiredLine>,
    pub replacements: Vec<Replacement>,
    pub backup: bool,
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            file: "config/settings/base.py".to_string(),
            app_lists: vec!["INSTALLED_APPS".to_string()],
            required_entries: Vec::new(),
            middleware_order: Vec::new(),
            required_lines: Vec::new(),
            replacements: Vec::new(),
            backup: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredEntry {
    pub list: String,
    pub entry: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRule {
    pub entry: String,
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredLine {
    pub line: String,
    pub pattern: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub description: String,
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureSection {
    pub required_dirs: Vec<String>,
    pub required_files: Vec<String>,
    pub urls_file: Option<String>,
    pub url_includes: Vec<UrlInclude>,
}

impl Default for StructureSection {
    fn default() -> Self {
        Self {
            required_dirs: Vec::new(),
            required_files: vec!["manage.py".to_string()],
            urls_file: None,
            url_includes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlInclude {
    pub needle: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkSection {
    pub manage_py: String,
    pub command_timeout_seconds: u64,
    pub check_migrations: bool,
    pub collectstatic: bool,
}

impl Default for FrameworkSection {
    fn default() -> Self {
        Self {
            manage_py: "manage.py".to_string(),
            command_timeout_seconds: 300,
            check_migrations: true,
            collectstatic: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub hold_seconds: u64,
    pub http_check: bool,
    pub path: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8000,
            hold_seconds: 5,
            http_check: true,
            path: "/".to_string(),
        }
    }
}

impl ServerSection {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn probe_url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("http://{}{}", self.address(), path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub output_dir: String,
    pub formats: Vec<String>,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            output_dir: "doctor_reports".to_string(),
            formats: vec!["markdown".to_string()],
        }
    }
}

impl Profile {
    /// 從 TOML 檔案載入設定
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(DoctorError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析設定
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| DoctorError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_PROFILE)
    }

    /// 專案內有 stack-doctor.toml 就用它，否則用內建設定
    pub fn discover(project_root: &Path) -> Result<Self> {
        let candidate = project_root.join(PROFILE_FILE_NAME);
        if candidate.is_file() {
            tracing::info!("📁 Loading profile from: {}", candidate.display());
            Self::from_file(candidate)
        } else {
            tracing::debug!("No {} in project, using built-in profile", PROFILE_FILE_NAME);
            Self::builtin()
        }
    }

    /// 替換環境變數 (例如 ${PIP_INDEX_URL})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| DoctorError::config(format!("invalid substitution pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn min_python(&self) -> Option<crate::domain::model::PythonVersion> {
        crate::domain::model::PythonVersion::parse(&self.project.min_python)
    }

    /// 驗證設定的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_module_path("project.settings_module", &self.project.settings_module)?;

        if self.min_python().is_none() {
            return Err(DoctorError::InvalidConfigValueError {
                field: "project.min_python".to_string(),
                value: self.project.min_python.clone(),
                reason: "Expected a version such as 3.10".to_string(),
            });
        }

        for candidate in &self.project.venv_candidates {
            validation::validate_path("project.venv_candidates", candidate)?;
        }

        validation::validate_relative_path("env.file", &self.env.file)?;
        validation::validate_relative_path("settings.file", &self.settings.file)?;
        validation::validate_relative_path("framework.manage_py", &self.framework.manage_py)?;
        validation::validate_path("report.output_dir", &self.report.output_dir)?;

        for dir in &self.structure.required_dirs {
            validation::validate_relative_path("structure.required_dirs", dir)?;
        }
        for file in &self.structure.required_files {
            validation::validate_relative_path("structure.required_files", file)?;
        }

        for package in &self.packages {
            validation::validate_non_empty_string("packages.name", &package.name)?;
            if let Some(spec) = &package.spec {
                crate::core::packages::SpecifierSet::parse(spec).map_err(|reason| {
                    DoctorError::InvalidConfigValueError {
                        field: format!("packages.{}.spec", package.name),
                        value: spec.clone(),
                        reason,
                    }
                })?;
            }
        }

        for line in &self.settings.required_lines {
            if let Some(pattern) = &line.pattern {
                Regex::new(pattern).map_err(|e| DoctorError::InvalidConfigValueError {
                    field: "settings.required_lines.pattern".to_string(),
                    value: pattern.clone(),
                    reason: e.to_string(),
                })?;
            }
        }

        if let Some(index_url) = &self.installer.index_url {
            // 未替換的 ${VAR} 視為未設定
            if !index_url.starts_with("${") {
                validation::validate_url("installer.index_url", index_url)?;
            }
        }

        validation::validate_range("server.port", self.server.port, 1, u16::MAX)?;
        validation::validate_range("server.hold_seconds", self.server.hold_seconds, 1, 120)?;
        validation::validate_range(
            "framework.command_timeout_seconds",
            self.framework.command_timeout_seconds,
            1,
            3600,
        )?;
        validation::validate_choices("report.formats", &self.report.formats, REPORT_FORMATS)?;

        Ok(())
    }

    /// 有效的 pip index URL：環境變數優先
    pub fn index_url(&self) -> Option<String> {
        std::env::var("PIP_INDEX_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                self.installer
                    .index_url
                    .clone()
                    .filter(|v| !v.starts_with("${") && !v.trim().is_empty())
            })
    }
}

impl Validate for Profile {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_profile_parses_and_validates() {
        let profile = Profile::builtin().unwrap();

        assert_eq!(profile.project.settings_module, "config.settings.local");
        assert_eq!(profile.settings.file, "config/settings/base.py");
        assert!(profile.packages.iter().any(|p| p.name == "django-oscar"));
        assert!(profile
            .settings
            .required_entries
            .iter()
            .any(|e| e.entry == "oscar.config.Shop"));
        assert_eq!(profile.server.port, 8000);
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_partial_profile_uses_defaults() {
        let toml_content = r#"
[project]
settings_module = "shop.settings"

[[packages]]
name = "Django"
spec = ">=4.2"
"#;

        let profile = Profile::from_toml_str(toml_content).unwrap();
        assert_eq!(profile.project.settings_module, "shop.settings");
        assert_eq!(profile.project.venv_candidates, vec![".venv", "venv", "env"]);
        assert_eq!(profile.env.file, ".env");
        assert_eq!(profile.server.hold_seconds, 5);
        assert_eq!(profile.report.formats, vec!["markdown"]);
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("STACK_DOCTOR_TEST_INDEX", "https://mirror.example.com/simple");

        let toml_content = r#"
[installer]
index_url = "${STACK_DOCTOR_TEST_INDEX}"
"#;

        let profile = Profile::from_toml_str(toml_content).unwrap();
        assert_eq!(
            profile.installer.index_url.as_deref(),
            Some("https://mirror.example.com/simple")
        );

        std::env::remove_var("STACK_DOCTOR_TEST_INDEX");
    }

    #[test]
    fn test_unset_variable_is_kept_and_ignored() {
        let toml_content = r#"
[installer]
index_url = "${STACK_DOCTOR_SURELY_UNSET_VAR}"
"#;
        let profile = Profile::from_toml_str(toml_content).unwrap();
        assert_eq!(
            profile.installer.index_url.as_deref(),
            Some("${STACK_DOCTOR_SURELY_UNSET_VAR}")
        );
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let bad_module = r#"
[project]
settings_module = "config/settings/local.py"
"#;
        assert!(Profile::from_toml_str(bad_module).unwrap().validate().is_err());

        let bad_spec = r#"
[[packages]]
name = "Django"
spec = "about four"
"#;
        assert!(Profile::from_toml_str(bad_spec).unwrap().validate().is_err());

        let bad_format = r#"
[report]
formats = ["pdf"]
"#;
        assert!(Profile::from_toml_str(bad_format).unwrap().validate().is_err());

        let escaping = r#"
[settings]
file = "../other/settings.py"
"#;
        assert!(Profile::from_toml_str(escaping).unwrap().validate().is_err());
    }

    #[test]
    fn test_profile_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();

        let toml_content = r#"
[project]
name = "file-test"

[server]
port = 8042
"#;

        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let profile = Profile::from_file(temp_file.path()).unwrap();
        assert_eq!(profile.project.name.as_deref(), Some("file-test"));
        assert_eq!(profile.server.probe_url(), "http://127.0.0.1:8042/");
    }
}
