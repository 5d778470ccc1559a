use crate::core::{Check, DoctorContext, Finding, Mode, Result};
use async_trait::async_trait;

const NAME: &str = "structure";

/// cookiecutter 專案的目錄、檔案與 URL 設定
pub struct StructureCheck;

#[async_trait]
impl Check for StructureCheck {
    fn name(&self) -> &str {
        NAME
    }

    fn should_run(&self, ctx: &DoctorContext) -> bool {
        ctx.mode != Mode::Verify
    }

    async fn diagnose(&self, ctx: &DoctorContext) -> Result<Vec<Finding>> {
        let structure = &ctx.profile.structure;
        let mut findings = Vec::new();

        for dir in &structure.required_dirs {
            if ctx.project_root.join(dir).is_dir() {
                findings.push(Finding::ok(NAME, "structure.dir", format!("{}/ present", dir)));
            } else {
                findings.push(
                    Finding::warning(NAME, "structure.dir_missing", format!("{}/ missing", dir))
                        .fixable(),
                );
            }
        }

        for file in &structure.required_files {
            if ctx.storage.exists(file).await {
                findings.push(Finding::ok(NAME, "structure.file", format!("{} present", file)));
            } else {
                findings.push(Finding::error(
                    NAME,
                    "structure.file_missing",
                    format!("{} missing", file),
                ));
            }
        }

        if let Some(urls) = &structure.urls_file {
            if ctx.storage.exists(urls).await {
                let content = ctx.storage.read_to_string(urls).await?;
                for include in &structure.url_includes {
                    if content.contains(include.needle.as_str()) {
                        findings.push(Finding::ok(
                            NAME,
                            "structure.url_include",
                            format!("{} wired in {}", include.description, urls),
                        ));
                    } else {
                        findings.push(Finding::warning(
                            NAME,
                            "structure.url_include",
                            format!("{} does not include {} ({})", urls, include.description, include.needle),
                        ));
                    }
                }
            }
        }

        Ok(findings)
    }

    async fn repair(&self, ctx: &DoctorContext, fixable: &[Finding]) -> Result<Vec<Finding>> {
        let mut repairs = Vec::new();
        if !fixable.iter().any(|f| f.code == "structure.dir_missing") {
            return Ok(repairs);
        }

        for dir in &ctx.profile.structure.required_dirs {
            if ctx.project_root.join(dir).is_dir() {
                continue;
            }
            ctx.storage.create_dir_all(dir).await?;
            tracing::info!("📁 Created {}/", dir);
            repairs.push(Finding::fixed(NAME, "structure.dir_created", format!("Created {}/", dir)));
        }
        Ok(repairs)
    }

    fn describe_repair(&self, finding: &Finding) -> String {
        format!("would create {}", finding.message.trim_end_matches(" missing"))
    }
}
