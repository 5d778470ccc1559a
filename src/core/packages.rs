use crate::core::{CommandOutput, CommandRunner, CommandSpec};
use crate::domain::model::Toolchain;
use crate::utils::error::{DoctorError, Result};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// PEP 503 名稱正規化：小寫並把連續的 `-_.` 換成 `-`
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !last_was_sep {
                normalized.push('-');
            }
            last_was_sep = true;
        } else {
            normalized.push(c.to_ascii_lowercase());
            last_was_sep = false;
        }
    }
    normalized
}

/// 只比較數字版本段，忽略 pre/post/local 後綴；`5.0` 與 `5.0.0` 相等
#[derive(Debug, Clone)]
pub struct Version {
    release: Vec<u64>,
}

impl Version {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().trim_start_matches(['v', 'V']);
        let text = text.split('+').next()?;

        let mut release = Vec::new();
        for part in text.split('.') {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                break;
            }
            release.push(digits.parse().ok()?);
            if digits.len() != part.len() {
                // 例如 `0rc1`：後面不再是版本段
                break;
            }
        }

        if release.is_empty() {
            None
        } else {
            Some(Self { release })
        }
    }

    fn segment(&self, index: usize) -> u64 {
        self.release.get(index).copied().unwrap_or(0)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());
        (0..len)
            .map(|i| self.segment(i).cmp(&other.segment(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.release.iter().map(|p| p.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Ge,
    Le,
    Gt,
    Lt,
    Eq,
    Ne,
    Compatible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Specifier {
    op: Operator,
    version: Version,
    raw: String,
    /// `==4.2.*`
    wildcard: bool,
}

impl Specifier {
    fn parse(text: &str) -> std::result::Result<Self, String> {
        let text = text.trim();
        let (op, rest) = [
            ("~=", Operator::Compatible),
            (">=", Operator::Ge),
            ("<=", Operator::Le),
            ("==", Operator::Eq),
            ("!=", Operator::Ne),
            (">", Operator::Gt),
            ("<", Operator::Lt),
        ]
        .iter()
        .find_map(|(prefix, op)| text.strip_prefix(prefix).map(|rest| (*op, rest.trim())))
        .ok_or_else(|| format!("unsupported specifier '{}'", text))?;

        let wildcard = rest.ends_with(".*");
        if wildcard && !matches!(op, Operator::Eq | Operator::Ne) {
            return Err(format!("wildcard only allowed with == or != in '{}'", text));
        }
        let version = Version::parse(rest.trim_end_matches(".*"))
            .ok_or_else(|| format!("invalid version in '{}'", text))?;
        if op == Operator::Compatible && version.release.len() < 2 {
            return Err(format!("~= needs at least two version segments in '{}'", text));
        }

        Ok(Self {
            op,
            version,
            raw: text.to_string(),
            wildcard,
        })
    }

    fn prefix_matches(&self, candidate: &Version) -> bool {
        (0..self.version.release.len()).all(|i| candidate.segment(i) == self.version.segment(i))
    }

    fn matches(&self, candidate: &Version) -> bool {
        match self.op {
            Operator::Ge => candidate >= &self.version,
            Operator::Le => candidate <= &self.version,
            Operator::Gt => candidate > &self.version,
            Operator::Lt => candidate < &self.version,
            Operator::Eq if self.wildcard => self.prefix_matches(candidate),
            Operator::Eq => candidate == &self.version,
            Operator::Ne if self.wildcard => !self.prefix_matches(candidate),
            Operator::Ne => candidate != &self.version,
            Operator::Compatible => {
                // ~=X.Y.Z 等同 >=X.Y.Z, ==X.Y.*
                let prefix_len = self.version.release.len() - 1;
                candidate >= &self.version
                    && (0..prefix_len).all(|i| candidate.segment(i) == self.version.segment(i))
            }
        }
    }
}

/// 逗號分隔的版本條件，例如 `>=4.2,<5.1`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecifierSet {
    specifiers: Vec<Specifier>,
}

impl SpecifierSet {
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let specifiers = text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Specifier::parse)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { specifiers })
    }

    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.specifiers.iter().all(|s| s.matches(version))
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self.specifiers.iter().map(|s| s.raw.as_str()).collect();
        f.write_str(&parts.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub specifiers: SpecifierSet,
}

impl Requirement {
    pub fn new(name: &str, spec: Option<&str>) -> std::result::Result<Self, String> {
        let specifiers = match spec {
            Some(spec) => SpecifierSet::parse(spec)?,
            None => SpecifierSet::default(),
        };
        Ok(Self {
            name: name.trim().to_string(),
            specifiers,
        })
    }

    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }

    /// pip / uv 可接受的安裝字串
    pub fn install_arg(&self) -> String {
        if self.specifiers.is_empty() {
            self.name.clone()
        } else {
            format!("{}{}", self.name, self.specifiers)
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.install_arg())
    }
}

/// 單一套件的比對結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageStatus {
    Satisfied { installed: String },
    Missing,
    OutOfRange { installed: String },
}

pub fn evaluate(requirement: &Requirement, installed: &HashMap<String, String>) -> PackageStatus {
    match installed.get(&requirement.key()) {
        None => PackageStatus::Missing,
        Some(version_text) => {
            let in_range = Version::parse(version_text)
                .map(|v| requirement.specifiers.contains(&v))
                .unwrap_or(requirement.specifiers.is_empty());
            if in_range {
                PackageStatus::Satisfied {
                    installed: version_text.clone(),
                }
            } else {
                PackageStatus::OutOfRange {
                    installed: version_text.clone(),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListedPackage {
    name: String,
    version: String,
}

/// 解析 `pip list --format=json` 的輸出，key 為正規化後的名稱
pub fn parse_pip_list(json: &str) -> Result<HashMap<String, String>> {
    // JSON 只佔一行；其餘行可能是 pip 的升級提示
    let line = json
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("[{") || *l == "[]")
        .unwrap_or(json.trim());
    let listed: Vec<ListedPackage> = serde_json::from_str(line)?;
    Ok(listed
        .into_iter()
        .map(|p| (normalize_name(&p.name), p.version))
        .collect())
}

/// 套件清單查詢與安裝；uv 優先，失敗時退回 pip
pub struct PackageManager<'a> {
    runner: &'a dyn CommandRunner,
    toolchain: &'a Toolchain,
    prefer_uv: bool,
    index_url: Option<String>,
    timeout: Duration,
}

impl<'a> PackageManager<'a> {
    pub fn new(runner: &'a dyn CommandRunner, toolchain: &'a Toolchain) -> Self {
        Self {
            runner,
            toolchain,
            prefer_uv: true,
            index_url: None,
            timeout: Duration::from_secs(900),
        }
    }

    pub fn prefer_uv(mut self, prefer: bool) -> Self {
        self.prefer_uv = prefer;
        self
    }

    pub fn index_url(mut self, index_url: Option<String>) -> Self {
        self.index_url = index_url;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn uv(&self) -> Option<&std::path::Path> {
        if self.prefer_uv {
            self.toolchain.uv.as_deref()
        } else {
            None
        }
    }

    fn pip(&self) -> CommandSpec {
        CommandSpec::new(&self.toolchain.python)
            .args(["-m", "pip"])
            .env("PIP_DISABLE_PIP_VERSION_CHECK", "1")
            .timeout(self.timeout)
    }

    pub async fn installed(&self) -> Result<HashMap<String, String>> {
        let pip_spec = self.pip().args(["list", "--format=json"]);
        let output = self.runner.run(&pip_spec).await?;
        if output.success() {
            return parse_pip_list(&output.stdout);
        }
        tracing::debug!("pip list failed: {}", output.tail(3));

        if let Some(uv) = self.uv() {
            let uv_spec = CommandSpec::new(uv)
                .args(["pip", "list", "--format", "json", "--python"])
                .arg(self.toolchain.python.to_string_lossy())
                .timeout(self.timeout);
            let output = self.runner.run(&uv_spec).await?;
            if output.success() {
                return parse_pip_list(&output.stdout);
            }
            return Err(failed(&uv_spec, &output));
        }

        Err(failed(&pip_spec, &output))
    }

    /// `pip check` 回報的相依衝突，每行一筆
    pub async fn broken_requirements(&self) -> Result<Vec<String>> {
        let spec = self.pip().arg("check");
        let output = self.runner.run(&spec).await?;
        if output.success() {
            return Ok(Vec::new());
        }
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("No broken requirements"))
            .map(String::from)
            .collect())
    }

    pub async fn install(&self, requirements: &[Requirement], force: bool) -> Result<CommandOutput> {
        let args: Vec<String> = requirements.iter().map(|r| r.install_arg()).collect();

        if let Some(uv) = self.uv() {
            let mut spec = CommandSpec::new(uv)
                .args(["pip", "install", "--python"])
                .arg(self.toolchain.python.to_string_lossy())
                .timeout(self.timeout);
            if force {
                spec = spec.arg("--reinstall");
            }
            if let Some(index) = &self.index_url {
                spec = spec.args(["--index-url", index.as_str()]);
            }
            let output = self.runner.run(&spec.args(args.clone())).await?;
            if output.success() {
                tracing::info!("📦 Installed with uv: {}", args.join(" "));
                return Ok(output);
            }
            tracing::warn!("⚠️ uv install failed, retrying with pip: {}", output.tail(3));
        }

        let mut spec = self.pip().arg("install");
        if force {
            spec = spec.arg("--force-reinstall");
        }
        if let Some(index) = &self.index_url {
            spec = spec.args(["--index-url", index.as_str()]);
        }
        let spec = spec.args(args.clone());
        let output = self.runner.run(&spec).await?;
        if output.success() {
            tracing::info!("📦 Installed with pip: {}", args.join(" "));
            Ok(output)
        } else {
            Err(failed(&spec, &output))
        }
    }
}

fn failed(spec: &CommandSpec, output: &CommandOutput) -> DoctorError {
    if output.timed_out {
        DoctorError::CommandTimeout {
            command: spec.display(),
            seconds: spec.timeout.map(|t| t.as_secs()).unwrap_or_default(),
        }
    } else {
        DoctorError::CommandFailed {
            command: spec.display(),
            code: output.code,
            stderr: output.tail(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Django"), "django");
        assert_eq!(normalize_name("django_oscar"), "django-oscar");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("Foo__Bar-.baz"), "foo-bar-baz");
    }

    #[test]
    fn test_version_parse_and_order() {
        assert!(v("4.2.11") < v("5.0"));
        assert_eq!(v("5.0"), v("5.0.0"));
        assert_eq!(v("3.2rc1"), v("3.2"));
        assert_eq!(v("6.1.2+local"), v("6.1.2"));
        assert!(Version::parse("dev").is_none());
    }

    #[test]
    fn test_exact_pins_ignore_trailing_zeros() {
        let pinned = SpecifierSet::parse("==5.0").unwrap();
        assert!(pinned.contains(&v("5.0.0")));
        assert!(pinned.contains(&v("5")));
        assert!(!pinned.contains(&v("5.0.1")));

        let excluded = SpecifierSet::parse("!=5.0").unwrap();
        assert!(!excluded.contains(&v("5.0.0")));
        assert!(excluded.contains(&v("5.0.1")));
    }

    #[test]
    fn test_specifier_ranges() {
        let set = SpecifierSet::parse(">=4.2,<5.0").unwrap();
        assert!(set.contains(&v("4.2.11")));
        assert!(!set.contains(&v("5.0")));
        assert!(!set.contains(&v("4.1.9")));

        let compatible = SpecifierSet::parse("~=3.2").unwrap();
        assert!(compatible.contains(&v("3.9")));
        assert!(!compatible.contains(&v("4.0")));

        let patch_compatible = SpecifierSet::parse("~=3.2.6").unwrap();
        assert!(patch_compatible.contains(&v("3.2.9")));
        assert!(!patch_compatible.contains(&v("3.3.0")));

        let wildcard = SpecifierSet::parse("==4.2.*").unwrap();
        assert!(wildcard.contains(&v("4.2.16")));
        assert!(!wildcard.contains(&v("4.3")));

        let pinned = SpecifierSet::parse("==3.2.6, !=3.2.5").unwrap();
        assert!(pinned.contains(&v("3.2.6")));
    }

    #[test]
    fn test_specifier_errors() {
        assert!(SpecifierSet::parse("about four").is_err());
        assert!(SpecifierSet::parse("~=3").is_err());
        assert!(SpecifierSet::parse(">=4.*").is_err());
        assert!(SpecifierSet::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_evaluate_requirement() {
        let mut installed = HashMap::new();
        installed.insert("django".to_string(), "5.1.2".to_string());
        installed.insert("django-oscar".to_string(), "3.2.4".to_string());

        let django = Requirement::new("Django", Some(">=4.2,<5.1")).unwrap();
        assert_eq!(
            evaluate(&django, &installed),
            PackageStatus::OutOfRange { installed: "5.1.2".to_string() }
        );

        let oscar = Requirement::new("django_oscar", Some(">=3.2")).unwrap();
        assert!(matches!(evaluate(&oscar, &installed), PackageStatus::Satisfied { .. }));

        let wagtail = Requirement::new("wagtail", None).unwrap();
        assert_eq!(evaluate(&wagtail, &installed), PackageStatus::Missing);
    }

    #[test]
    fn test_install_arg() {
        assert_eq!(
            Requirement::new("Django", Some(">=4.2, <5.1")).unwrap().install_arg(),
            "Django>=4.2,<5.1"
        );
        assert_eq!(Requirement::new("whitenoise", None).unwrap().install_arg(), "whitenoise");
    }

    #[test]
    fn test_parse_pip_list_with_noise() {
        let output = r#"[{"name": "Django", "version": "4.2.16"}, {"name": "django_tables2", "version": "2.7.0"}]

[notice] A new release of pip is available: 24.0 -> 24.2"#;
        let parsed = parse_pip_list(output).unwrap();
        assert_eq!(parsed.get("django").map(String::as_str), Some("4.2.16"));
        assert_eq!(parsed.get("django-tables2").map(String::as_str), Some("2.7.0"));

        assert!(parse_pip_list("[]").unwrap().is_empty());
        assert!(parse_pip_list("ERROR: pip is broken").is_err());
    }
}
