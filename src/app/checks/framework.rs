use crate::core::{Check, CommandOutput, DoctorContext, Finding, Mode, Result};
use async_trait::async_trait;

const NAME: &str = "framework";
const NO_ISSUES: &str = "System check identified no issues";
const PENDING_MARKER: &str = "Migrations for";

/// `manage.py check`、未套用的 migration 與缺少的 migration
pub struct FrameworkCheck;

/// 將 `manage.py check` 的結果分類
pub fn classify_system_check(output: &CommandOutput) -> Finding {
    if output.timed_out {
        return Finding::error(NAME, "django.check", "manage.py check timed out");
    }
    if output.success() && output.combined().contains(NO_ISSUES) {
        Finding::ok(NAME, "django.check", NO_ISSUES)
    } else if output.success() {
        Finding::warning(
            NAME,
            "django.check",
            format!("manage.py check reported issues:\n{}", output.tail(10)),
        )
    } else {
        Finding::error(
            NAME,
            "django.check",
            format!("manage.py check failed (exit {:?}):\n{}", output.code, output.tail(10)),
        )
    }
}

/// `showmigrations --plan` 中尚未套用的 `[ ]` 數量
pub fn count_unapplied(plan: &str) -> usize {
    plan.lines().filter(|l| l.trim_start().starts_with("[ ]")).count()
}

/// `makemigrations --check --dry-run`：只有列出 `Migrations for` 才算缺少 migration
pub fn classify_pending_models(output: &CommandOutput) -> Finding {
    if output.success() {
        Finding::ok(NAME, "django.models", "No model changes without migrations")
    } else if output.timed_out {
        Finding::warning(NAME, "django.models", "makemigrations --check timed out")
    } else if output.combined().contains(PENDING_MARKER) {
        Finding::warning(NAME, "django.pending_models", "Model changes without migrations").fixable()
    } else {
        Finding::warning(
            NAME,
            "django.models",
            format!("makemigrations --check failed (exit {:?}):\n{}", output.code, output.tail(5)),
        )
    }
}

impl FrameworkCheck {
    async fn manage(ctx: &DoctorContext, args: &[&str]) -> Result<Option<CommandOutput>> {
        match ctx.manage(args) {
            Some(spec) => Ok(Some(ctx.runner.run(&spec).await?)),
            None => Ok(None),
        }
    }

    /// 執行修復指令並轉成 finding
    async fn step(ctx: &DoctorContext, args: &[&str], code: &str, done: &str) -> Result<Option<Finding>> {
        let Some(output) = Self::manage(ctx, args).await? else {
            return Ok(None);
        };
        let command = format!("manage.py {}", args.join(" "));
        Ok(Some(if output.success() {
            tracing::info!("✅ {}", command);
            Finding::fixed(NAME, code, done)
        } else {
            Finding::error(NAME, code, format!("{} failed:\n{}", command, output.tail(5)))
        }))
    }
}

#[async_trait]
impl Check for FrameworkCheck {
    fn name(&self) -> &str {
        NAME
    }

    async fn diagnose(&self, ctx: &DoctorContext) -> Result<Vec<Finding>> {
        if ctx.toolchain.is_none() {
            return Ok(vec![Finding::warning(
                NAME,
                "django.skipped",
                "No Python interpreter, Django commands skipped",
            )]);
        }
        let manage_py = &ctx.profile.framework.manage_py;
        if !ctx.storage.exists(manage_py).await {
            return Ok(vec![Finding::error(
                NAME,
                "django.manage_py",
                format!("{} not found in project root", manage_py),
            )]);
        }

        let mut findings = Vec::new();
        if let Some(output) = Self::manage(ctx, &["check"]).await? {
            findings.push(classify_system_check(&output));
        }

        if ctx.mode == Mode::Verify || !ctx.profile.framework.check_migrations {
            return Ok(findings);
        }

        if let Some(output) = Self::manage(ctx, &["showmigrations", "--plan"]).await? {
            if output.success() {
                let unapplied = count_unapplied(&output.stdout);
                findings.push(if unapplied == 0 {
                    Finding::ok(NAME, "django.migrations", "All migrations applied")
                } else {
                    Finding::warning(
                        NAME,
                        "django.unapplied",
                        format!("{} unapplied migration(s)", unapplied),
                    )
                    .fixable()
                });
            } else {
                findings.push(Finding::warning(
                    NAME,
                    "django.showmigrations",
                    format!("showmigrations failed:\n{}", output.tail(5)),
                ));
            }
        }

        if let Some(output) = Self::manage(ctx, &["makemigrations", "--check", "--dry-run"]).await? {
            findings.push(classify_pending_models(&output));
        }

        Ok(findings)
    }

    fn forces_repair(&self, ctx: &DoctorContext) -> bool {
        ctx.mode.is_hard() && ctx.toolchain.is_some()
    }

    async fn repair(&self, ctx: &DoctorContext, fixable: &[Finding]) -> Result<Vec<Finding>> {
        let hard = ctx.mode.is_hard();
        let mut repairs = Vec::new();

        if hard || fixable.iter().any(|f| f.code == "django.pending_models") {
            repairs.extend(
                Self::step(ctx, &["makemigrations"], "django.makemigrations", "Created missing migrations").await?,
            );
        }

        repairs.extend(Self::step(ctx, &["migrate", "--noinput"], "django.migrate", "Applied migrations").await?);

        if ctx.profile.framework.collectstatic {
            let args: &[&str] = if hard {
                &["collectstatic", "--noinput", "--clear"]
            } else {
                &["collectstatic", "--noinput"]
            };
            repairs.extend(Self::step(ctx, args, "django.collectstatic", "Collected static files").await?);
        }

        Ok(repairs)
    }

    fn describe_repair(&self, finding: &Finding) -> String {
        match finding.code.as_str() {
            "django.pending_models" => "would run makemigrations and migrate".to_string(),
            "django.unapplied" => "would run migrate --noinput".to_string(),
            _ => format!("would fix: {}", finding.message),
        }
    }

    fn describe_forced_repair(&self, ctx: &DoctorContext) -> String {
        if ctx.profile.framework.collectstatic {
            "would run makemigrations, migrate --noinput and collectstatic --noinput --clear".to_string()
        } else {
            "would run makemigrations and migrate --noinput".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::checks::test_support::{context, write, ScriptedRunner};
    use crate::core::Severity;
    use std::sync::Arc;

    fn output(code: i32, stdout: &str) -> CommandOutput {
        CommandOutput {
            code: Some(code),
            stdout: stdout.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_system_check() {
        let ok = classify_system_check(&output(0, "System check identified no issues (0 silenced).\n"));
        assert_eq!(ok.severity, Severity::Ok);

        let warned = classify_system_check(&output(
            0,
            "System check identified some issues:\n\nWARNINGS:\n?: (wagtailadmin.W003) ...\n",
        ));
        assert_eq!(warned.severity, Severity::Warning);

        let failed = classify_system_check(&output(1, "django.core.exceptions.ImproperlyConfigured"));
        assert_eq!(failed.severity, Severity::Error);

        let timed_out = classify_system_check(&CommandOutput {
            timed_out: true,
            ..Default::default()
        });
        assert_eq!(timed_out.severity, Severity::Error);
    }

    #[test]
    fn test_broken_settings_are_not_pending_migrations() {
        let pending = classify_pending_models(&output(1, "Migrations for 'shop':\n  shop/migrations/0002_product_slug.py\n"));
        assert_eq!(pending.code, "django.pending_models");
        assert!(pending.needs_repair());

        let broken = classify_pending_models(&CommandOutput {
            code: Some(1),
            stderr: "Traceback (most recent call last):\ndjango.core.exceptions.ImproperlyConfigured: Set the DATABASE_URL environment variable\n".to_string(),
            ..Default::default()
        });
        assert_eq!(broken.code, "django.models");
        assert_eq!(broken.severity, Severity::Warning);
        assert!(!broken.fixable);
        assert!(broken.message.contains("ImproperlyConfigured"));
    }

    #[tokio::test]
    async fn test_repair_skips_makemigrations_when_settings_are_broken() {
        let dir = tempfile::TempDir::new().unwrap();
        write(dir.path(), "manage.py", "");
        let traceback = "django.core.exceptions.ImproperlyConfigured: Set the DATABASE_URL environment variable";
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("manage.py check", 1, traceback)
                .on("showmigrations", 1, traceback)
                .on("makemigrations --check", 1, traceback),
        );
        let ctx = context(dir.path(), Mode::Repair, runner);

        let findings = FrameworkCheck.diagnose(&ctx).await.unwrap();
        assert!(findings.iter().all(|f| !f.needs_repair()), "{:?}", findings);
    }

    #[test]
    fn test_count_unapplied() {
        let plan = "[X]  contenttypes.0001_initial\n[ ]  oscar.0001_initial\n[ ]  wagtailcore.0001_initial\n";
        assert_eq!(count_unapplied(plan), 2);
        assert_eq!(count_unapplied(""), 0);
    }

    #[tokio::test]
    async fn test_verify_mode_only_runs_system_check() {
        let dir = tempfile::TempDir::new().unwrap();
        write(dir.path(), "manage.py", "");
        let runner = Arc::new(ScriptedRunner::new().on("manage.py check", 0, NO_ISSUES));
        let ctx = context(dir.path(), Mode::Verify, runner.clone());

        let findings = FrameworkCheck.diagnose(&ctx).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(runner.calls(), vec!["python manage.py check"]);
    }

    #[tokio::test]
    async fn test_migration_findings_and_repair() {
        let dir = tempfile::TempDir::new().unwrap();
        write(dir.path(), "manage.py", "");
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("manage.py check", 0, NO_ISSUES)
                .on("showmigrations", 0, "[X]  auth.0001_initial\n[ ]  catalogue.0027_attribute\n")
                .on("makemigrations --check", 1, "Migrations for 'shop':")
                .on("makemigrations", 0, "")
                .on("migrate --noinput", 0, "")
                .on("collectstatic", 0, "164 static files copied"),
        );
        let ctx = context(dir.path(), Mode::HardRepair, runner.clone());

        let findings = FrameworkCheck.diagnose(&ctx).await.unwrap();
        let fixable: Vec<_> = findings.iter().filter(|f| f.needs_repair()).cloned().collect();
        assert_eq!(fixable.len(), 2);

        let repairs = FrameworkCheck.repair(&ctx, &fixable).await.unwrap();
        assert_eq!(repairs.len(), 3);
        assert!(repairs.iter().all(|f| f.severity == Severity::Fixed));
        assert!(runner.called("collectstatic --noinput --clear"));
    }

    #[tokio::test]
    async fn test_missing_manage_py() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = context(dir.path(), Mode::Diagnose, Arc::new(ScriptedRunner::new()));
        let findings = FrameworkCheck.diagnose(&ctx).await.unwrap();
        assert_eq!(findings[0].code, "django.manage_py");
        assert_eq!(findings[0].severity, Severity::Error);
    }
}
