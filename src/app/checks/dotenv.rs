use crate::core::dotenv::generate_secret_key;
use crate::core::{Check, DoctorContext, Finding, Mode, Result};
use crate::utils::error::DoctorError;
use crate::utils::validation;
use async_trait::async_trait;

const NAME: &str = "dotenv";

/// `.env` 是否存在、必要變數、範本值與 DATABASE_URL
pub struct DotEnvCheck;

impl DotEnvCheck {
    fn can_default(ctx: &DoctorContext, key: &str) -> bool {
        ctx.profile.env.secret_key_var.as_deref() == Some(key)
            || ctx.profile.env.defaults.contains_key(key)
    }

    fn default_value(ctx: &DoctorContext, key: &str) -> Option<String> {
        if ctx.profile.env.secret_key_var.as_deref() == Some(key) {
            return Some(generate_secret_key());
        }
        ctx.profile.env.defaults.get(key).cloned()
    }

    fn check_database_url(ctx: &DoctorContext, findings: &mut Vec<Finding>) {
        let var = &ctx.profile.env.database_url_var;
        let Some(raw) = ctx.database_url() else {
            return;
        };

        match validation::validate_database_url(var, &raw) {
            Ok(url) if url.scheme() == "sqlite" => {
                // sqlite:///db.sqlite3 為相對路徑，sqlite:////abs 為絕對路徑
                let path = url.path().strip_prefix('/').unwrap_or(url.path()).to_string();
                let resolved = ctx.project_root.join(&path);
                if path.is_empty() || resolved.is_file() {
                    findings.push(Finding::ok(NAME, "env.database_url", format!("{} uses SQLite", var)));
                } else {
                    findings.push(Finding::info(
                        NAME,
                        "env.sqlite_missing",
                        format!("SQLite database {} not created yet (migrate creates it)", path),
                    ));
                }
            }
            Ok(url) => findings.push(Finding::ok(
                NAME,
                "env.database_url",
                format!("{} uses {}", var, url.scheme()),
            )),
            Err(DoctorError::InvalidConfigValueError { reason, .. }) => {
                // 錯誤訊息不帶原始值，避免密碼進入報告
                findings.push(Finding::error(NAME, "env.database_url", format!("{}: {}", var, reason)))
            }
            Err(e) => findings.push(Finding::error(NAME, "env.database_url", e.to_string())),
        }
    }
}

#[async_trait]
impl Check for DotEnvCheck {
    fn name(&self) -> &str {
        NAME
    }

    fn should_run(&self, ctx: &DoctorContext) -> bool {
        ctx.mode != Mode::Verify
    }

    async fn diagnose(&self, ctx: &DoctorContext) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();
        let file = &ctx.profile.env.file;

        let Some(env) = &ctx.dotenv else {
            findings.push(Finding::error(NAME, "env.file_missing", format!("{} not found", file)).fixable());
            return Ok(findings);
        };
        findings.push(Finding::ok(NAME, "env.file", format!("{} found", file)));

        for key in &ctx.profile.env.required {
            if env.contains(key) {
                findings.push(Finding::ok(NAME, "env.key", format!("{} set", key)));
            } else {
                let message = if env.get(key).is_some() {
                    format!("{} is empty in {}", key, file)
                } else {
                    format!("{} missing from {}", key, file)
                };
                let finding = Finding::error(NAME, "env.key_missing", message);
                findings.push(if Self::can_default(ctx, key) {
                    finding.fixable()
                } else {
                    finding
                });
            }
        }

        for (key, _) in env.placeholders() {
            findings.push(Finding::warning(
                NAME,
                "env.placeholder",
                format!("{} still holds a template placeholder", key),
            ));
        }

        Self::check_database_url(ctx, &mut findings);
        Ok(findings)
    }

    async fn repair(&self, ctx: &DoctorContext, fixable: &[Finding]) -> Result<Vec<Finding>> {
        let file = &ctx.profile.env.file;
        let creating = ctx.dotenv.is_none();
        let mut env = ctx.dotenv.clone().unwrap_or_default();
        let mut repairs = Vec::new();

        if creating && !fixable.iter().any(|f| f.code == "env.file_missing") {
            return Ok(repairs);
        }

        let mut keys: Vec<String> = ctx.profile.env.required.clone();
        if creating {
            keys.extend(ctx.profile.env.defaults.keys().cloned());
        }

        for key in keys {
            if env.contains(&key) {
                continue;
            }
            let Some(value) = Self::default_value(ctx, &key) else {
                continue;
            };
            let generated = ctx.profile.env.secret_key_var.as_deref() == Some(key.as_str());
            env.set_if_absent(&key, &value);
            repairs.push(Finding::fixed(
                NAME,
                "env.key_added",
                if generated {
                    format!("Added {} (generated)", key)
                } else {
                    format!("Added {} with the profile default", key)
                },
            ));
        }

        ctx.storage.write_file(file, env.render().as_bytes()).await?;
        if creating {
            repairs.insert(0, Finding::fixed(NAME, "env.file_created", format!("Created {}", file)));
        }
        tracing::info!("📝 Updated {}", file);

        Ok(repairs)
    }

    fn describe_repair(&self, finding: &Finding) -> String {
        match finding.code.as_str() {
            "env.file_missing" => format!("would create {}", finding.message.trim_end_matches(" not found")),
            _ => format!("would add: {}", finding.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dotenv::DotEnv;
    use crate::app::checks::test_support::{context, write, ScriptedRunner};
    use crate::core::Severity;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_file_is_fixable_and_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = context(dir.path(), Mode::Repair, Arc::new(ScriptedRunner::new()));

        let findings = DotEnvCheck.diagnose(&ctx).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].needs_repair());

        let repairs = DotEnvCheck.repair(&ctx, &findings).await.unwrap();
        assert_eq!(repairs[0].code, "env.file_created");

        let content = std::fs::read_to_string(dir.path().join(".env")).unwrap();
        let env = DotEnv::parse(&content);
        assert_eq!(env.get("DJANGO_SECRET_KEY").map(str::len), Some(50));
        assert_eq!(env.get("DATABASE_URL"), Some("sqlite:///db.sqlite3"));
        assert_eq!(env.get("DJANGO_READ_DOT_ENV_FILE"), Some("True"));
        // 秘密金鑰不應出現在報告中
        assert!(repairs.iter().all(|f| !f.message.contains(env.get("DJANGO_SECRET_KEY").unwrap())));
    }

    #[tokio::test]
    async fn test_existing_lines_are_preserved() {
        let dir = tempfile::TempDir::new().unwrap();
        let original = "# local settings\nDATABASE_URL=postgres://maida@localhost/maida_vale\n";
        write(dir.path(), ".env", original);

        let mut ctx = context(dir.path(), Mode::Repair, Arc::new(ScriptedRunner::new()));
        ctx.dotenv = Some(DotEnv::parse(original));

        let findings = DotEnvCheck.diagnose(&ctx).await.unwrap();
        let missing: Vec<_> = findings.iter().filter(|f| f.needs_repair()).cloned().collect();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].message.contains("DJANGO_SECRET_KEY"));

        DotEnvCheck.repair(&ctx, &missing).await.unwrap();
        let content = std::fs::read_to_string(dir.path().join(".env")).unwrap();
        assert!(content.starts_with(original));
        assert_eq!(content.matches("DATABASE_URL").count(), 1);
        assert!(!content.contains("DJANGO_READ_DOT_ENV_FILE"));
    }

    #[tokio::test]
    async fn test_empty_secret_key_is_filled_in_place() {
        let dir = tempfile::TempDir::new().unwrap();
        let original = "DJANGO_SECRET_KEY=\nDATABASE_URL=sqlite:///db.sqlite3\n";
        write(dir.path(), ".env", original);

        let mut ctx = context(dir.path(), Mode::Repair, Arc::new(ScriptedRunner::new()));
        ctx.dotenv = Some(DotEnv::parse(original));

        let findings = DotEnvCheck.diagnose(&ctx).await.unwrap();
        let empty: Vec<_> = findings.iter().filter(|f| f.code == "env.key_missing").cloned().collect();
        assert_eq!(empty.len(), 1);
        assert!(empty[0].needs_repair());
        assert!(empty[0].message.contains("is empty"));

        let repairs = DotEnvCheck.repair(&ctx, &empty).await.unwrap();
        let content = std::fs::read_to_string(dir.path().join(".env")).unwrap();
        assert_eq!(content.matches("DJANGO_SECRET_KEY").count(), 1);
        assert!(content.ends_with("DATABASE_URL=sqlite:///db.sqlite3\n"));

        let env = DotEnv::parse(&content);
        let secret = env.get("DJANGO_SECRET_KEY").unwrap();
        assert_eq!(secret.len(), 50);
        assert!(repairs.iter().all(|f| !f.message.contains(secret)));

        ctx.dotenv = Some(env);
        let after = DotEnvCheck.diagnose(&ctx).await.unwrap();
        assert!(after.iter().all(|f| f.code != "env.key_missing"));
    }

    #[tokio::test]
    async fn test_placeholders_and_bad_database_url() {
        let dir = tempfile::TempDir::new().unwrap();
        let content = "DJANGO_SECRET_KEY=change-me\nDATABASE_URL=mongodb://user:hunter2@db/maida\n";
        let mut ctx = context(dir.path(), Mode::Diagnose, Arc::new(ScriptedRunner::new()));
        ctx.dotenv = Some(DotEnv::parse(content));
        std::env::remove_var("DATABASE_URL");

        let findings = DotEnvCheck.diagnose(&ctx).await.unwrap();
        let placeholder = findings.iter().find(|f| f.code == "env.placeholder").unwrap();
        assert_eq!(placeholder.severity, Severity::Warning);

        let db = findings.iter().find(|f| f.code == "env.database_url").unwrap();
        assert_eq!(db.severity, Severity::Error);
        assert!(!db.message.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_sqlite_file_not_created_yet_is_info() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut ctx = context(dir.path(), Mode::Diagnose, Arc::new(ScriptedRunner::new()));
        ctx.dotenv = Some(DotEnv::parse("DJANGO_SECRET_KEY=abc\nDATABASE_URL=sqlite:///db.sqlite3\n"));
        std::env::remove_var("DATABASE_URL");

        let findings = DotEnvCheck.diagnose(&ctx).await.unwrap();
        assert!(findings.iter().any(|f| f.code == "env.sqlite_missing" && f.severity == Severity::Info));
        assert!(findings.iter().all(|f| f.severity != Severity::Error));
    }
}
