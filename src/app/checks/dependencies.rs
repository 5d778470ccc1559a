use crate::core::packages::{evaluate, PackageManager, PackageStatus, Requirement};
use crate::core::{Check, DoctorContext, Finding, Mode, Result};
use async_trait::async_trait;
use std::time::Duration;

const NAME: &str = "dependencies";

/// 設定檔列出的套件是否安裝且版本相符
pub struct DependenciesCheck;

impl DependenciesCheck {
    fn manager<'a>(ctx: &'a DoctorContext, toolchain: &'a crate::core::Toolchain) -> PackageManager<'a> {
        let installer = &ctx.profile.installer;
        PackageManager::new(ctx.runner.as_ref(), toolchain)
            .prefer_uv(installer.prefer_uv)
            .index_url(ctx.profile.index_url())
            .timeout(Duration::from_secs(installer.timeout_seconds))
    }

    /// 設定錯誤的套件條件在 profile 驗證時就會被擋下，這裡略過即可
    fn requirements(ctx: &DoctorContext) -> Vec<Requirement> {
        ctx.profile
            .packages
            .iter()
            .filter_map(|p| match Requirement::new(&p.name, p.spec.as_deref()) {
                Ok(requirement) => Some(requirement),
                Err(reason) => {
                    tracing::warn!("⚠️ Skipping package {}: {}", p.name, reason);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl Check for DependenciesCheck {
    fn name(&self) -> &str {
        NAME
    }

    fn should_run(&self, ctx: &DoctorContext) -> bool {
        ctx.mode != Mode::Verify
    }

    async fn diagnose(&self, ctx: &DoctorContext) -> Result<Vec<Finding>> {
        let Some(toolchain) = &ctx.toolchain else {
            return Ok(vec![Finding::warning(
                NAME,
                "deps.skipped",
                "No Python interpreter, dependency check skipped",
            )]);
        };

        let manager = Self::manager(ctx, toolchain);
        let installed = manager.installed().await?;
        tracing::debug!("📦 {} packages installed", installed.len());

        let mut findings = Vec::new();
        for requirement in Self::requirements(ctx) {
            let finding = match evaluate(&requirement, &installed) {
                PackageStatus::Satisfied { installed } => Finding::ok(
                    NAME,
                    "deps.package",
                    format!("{} {}", requirement.name, installed),
                ),
                PackageStatus::Missing => Finding::error(
                    NAME,
                    "deps.missing",
                    format!("{} is not installed", requirement),
                )
                .fixable(),
                PackageStatus::OutOfRange { installed } => Finding::warning(
                    NAME,
                    "deps.version",
                    format!(
                        "{} {} does not satisfy {}",
                        requirement.name, installed, requirement.specifiers
                    ),
                )
                .fixable(),
            };
            findings.push(finding);
        }

        if ctx.profile.installer.pip_check {
            for conflict in manager.broken_requirements().await? {
                findings.push(Finding::warning(NAME, "deps.conflict", conflict));
            }
        }

        Ok(findings)
    }

    fn forces_repair(&self, ctx: &DoctorContext) -> bool {
        ctx.mode.is_hard() && ctx.toolchain.is_some()
    }

    async fn repair(&self, ctx: &DoctorContext, _fixable: &[Finding]) -> Result<Vec<Finding>> {
        let Some(toolchain) = &ctx.toolchain else {
            return Ok(Vec::new());
        };
        let manager = Self::manager(ctx, toolchain);
        let force = ctx.mode.is_hard();

        let targets: Vec<Requirement> = if force {
            Self::requirements(ctx)
        } else {
            let installed = manager.installed().await?;
            Self::requirements(ctx)
                .into_iter()
                .filter(|r| !matches!(evaluate(r, &installed), PackageStatus::Satisfied { .. }))
                .collect()
        };

        if targets.is_empty() {
            return Ok(Vec::new());
        }

        manager.install(&targets, force).await?;
        let names: Vec<String> = targets.iter().map(|r| r.install_arg()).collect();
        Ok(vec![Finding::fixed(
            NAME,
            "deps.installed",
            format!(
                "{} {}",
                if force { "Reinstalled" } else { "Installed" },
                names.join(" ")
            ),
        )])
    }

    fn describe_repair(&self, finding: &Finding) -> String {
        format!("would install: {}", finding.message)
    }

    fn describe_forced_repair(&self, ctx: &DoctorContext) -> String {
        format!("would force-reinstall all {} required packages", ctx.profile.packages.len())
    }
}
