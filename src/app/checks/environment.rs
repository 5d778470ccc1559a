use crate::core::{python, Check, DoctorContext, Finding, Result};
use async_trait::async_trait;

const NAME: &str = "environment";

/// 直譯器、venv、Python 版本與 uv
pub struct EnvironmentCheck;

impl EnvironmentCheck {
    fn venv_dir(ctx: &DoctorContext) -> String {
        ctx.profile
            .project
            .venv_candidates
            .first()
            .cloned()
            .unwrap_or_else(|| ".venv".to_string())
    }
}

#[async_trait]
impl Check for EnvironmentCheck {
    fn name(&self) -> &str {
        NAME
    }

    async fn diagnose(&self, ctx: &DoctorContext) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();

        let Some(toolchain) = &ctx.toolchain else {
            let message = match &ctx.toolchain_error {
                Some(reason) => format!("Python interpreter unusable: {}", reason),
                None => "No Python interpreter found (checked virtualenvs and PATH)".to_string(),
            };
            findings.push(Finding::error(NAME, "env.python", message));
            return Ok(findings);
        };

        match toolchain.version {
            Some(version) => {
                findings.push(Finding::ok(
                    NAME,
                    "env.python",
                    format!("Python {} at {}", version, toolchain.python.display()),
                ));
                if let Some(min) = ctx.profile.min_python() {
                    if version < min {
                        findings.push(Finding::error(
                            NAME,
                            "env.python_version",
                            format!("Python {} is older than the required {}", version, min),
                        ));
                    }
                }
            }
            None => findings.push(Finding::warning(
                NAME,
                "env.python_version",
                format!("Cannot determine the version of {}", toolchain.python.display()),
            )),
        }

        match &toolchain.venv {
            Some(venv) => findings.push(Finding::ok(
                NAME,
                "env.venv",
                format!("Virtualenv: {}", venv.display()),
            )),
            None => {
                let finding = Finding::warning(
                    NAME,
                    "env.venv",
                    format!(
                        "No virtualenv found (looked for {})",
                        ctx.profile.project.venv_candidates.join(", ")
                    ),
                );
                // --python 指定的直譯器不會被新建的 venv 取代
                findings.push(if ctx.python_override.is_none() {
                    finding.fixable()
                } else {
                    finding
                });
            }
        }

        findings.push(match &toolchain.uv {
            Some(uv) => Finding::info(NAME, "env.uv", format!("uv available at {}", uv.display())),
            None => Finding::info(NAME, "env.uv", "uv not found, pip will be used"),
        });

        if let Ok(module) = std::env::var("DJANGO_SETTINGS_MODULE") {
            if module != ctx.profile.project.settings_module {
                findings.push(Finding::info(
                    NAME,
                    "env.settings_module",
                    format!("DJANGO_SETTINGS_MODULE overridden by environment: {}", module),
                ));
            }
        }

        Ok(findings)
    }

    async fn repair(&self, ctx: &DoctorContext, fixable: &[Finding]) -> Result<Vec<Finding>> {
        let mut repairs = Vec::new();
        let Some(toolchain) = &ctx.toolchain else {
            return Ok(repairs);
        };

        if fixable.iter().any(|f| f.code == "env.venv") {
            let dir = Self::venv_dir(ctx);
            let created = python::create_virtualenv(
                ctx.runner.as_ref(),
                &ctx.project_root,
                &dir,
                &toolchain.python,
                toolchain.uv.as_deref(),
            )
            .await?;
            repairs.push(Finding::fixed(
                NAME,
                "env.venv_created",
                format!("Created virtualenv {}", created.display()),
            ));
        }

        Ok(repairs)
    }

    fn describe_repair(&self, finding: &Finding) -> String {
        match finding.code.as_str() {
            "env.venv" => "would create a virtualenv in the project root".to_string(),
            _ => format!("would fix: {}", finding.message),
        }
    }
}
