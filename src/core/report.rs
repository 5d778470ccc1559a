use crate::config::profile::ReportSection;
use crate::core::{CheckOutcome, Finding, Mode, Severity, Storage, Summary};
use crate::utils::error::{DoctorError, Result};
use crate::utils::monitor::ResourceSample;
use chrono::{DateTime, Local};
use colored::*;
use serde::Serialize;
use std::fmt::Write as _;

/// 一次 doctor 執行的完整結果
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub execution_id: String,
    pub project: String,
    pub mode: Mode,
    pub dry_run: bool,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub outcomes: Vec<CheckOutcome>,
    pub summary: Summary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceSample>,
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    check: &'a str,
    phase: &'a str,
    code: &'a str,
    severity: Severity,
    fixable: bool,
    message: &'a str,
}

fn badge(severity: Severity) -> ColoredString {
    let label = format!("[{}]", severity.label());
    match severity {
        Severity::Ok => label.green(),
        Severity::Info => label.cyan(),
        Severity::Fixed => label.blue().bold(),
        Severity::Warning => label.yellow().bold(),
        Severity::Error => label.red().bold(),
    }
}

impl Report {
    pub fn is_healthy(&self) -> bool {
        self.summary.is_healthy()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// 終端機輸出：每個 check 一段，最後一行摘要
    pub fn render_terminal(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {} ({}{})",
            "stack-doctor".bold(),
            self.project,
            self.mode,
            if self.dry_run { ", dry run" } else { "" }
        );

        for outcome in &self.outcomes {
            let _ = writeln!(out, "\n{}", format!("== {} ==", outcome.check).bold());
            for finding in &outcome.repairs {
                let _ = writeln!(out, "  {} {}", badge(finding.severity), finding.message);
            }
            for finding in outcome.final_findings() {
                let _ = writeln!(out, "  {} {}", badge(finding.severity), finding.message);
            }
        }

        let s = &self.summary;
        let summary = format!(
            "{} analyzed, {} ok, {} fixed, {} warnings, {} errors",
            s.analyzed, s.ok, s.fixed, s.warnings, s.errors
        );
        let summary = if s.errors > 0 {
            summary.red().bold()
        } else if s.warnings > 0 {
            summary.yellow()
        } else {
            summary.green()
        };
        let _ = writeln!(out, "\n{}", summary);
        out
    }

    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Stack Doctor Report\n");
        let _ = writeln!(out, "- **Project:** `{}`", self.project);
        let _ = writeln!(out, "- **Mode:** {}{}", self.mode, if self.dry_run { " (dry run)" } else { "" });
        let _ = writeln!(out, "- **Started:** {}", self.started_at.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "- **Duration:** {}ms", self.duration().num_milliseconds());
        let _ = writeln!(out, "- **Execution:** {}\n", self.execution_id);

        let s = &self.summary;
        let _ = writeln!(out, "## Summary\n");
        let _ = writeln!(out, "| Analyzed | OK | Info | Fixed | Warnings | Errors |");
        let _ = writeln!(out, "|---|---|---|---|---|---|");
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} |\n",
            s.analyzed, s.ok, s.info, s.fixed, s.warnings, s.errors
        );

        for outcome in &self.outcomes {
            let _ = writeln!(
                out,
                "## {} ({}ms)\n",
                outcome.check,
                outcome.duration.as_millis()
            );
            write_findings(&mut out, "Findings", &outcome.before);
            if !outcome.repairs.is_empty() {
                write_findings(&mut out, "Repairs", &outcome.repairs);
            }
            if let Some(after) = &outcome.after {
                write_findings(&mut out, "After repair", after);
            }
        }

        if !self.resources.is_empty() {
            let _ = writeln!(out, "## Resources\n");
            for sample in &self.resources {
                let _ = writeln!(
                    out,
                    "- {}: CPU {:.1}%, memory {}MB (peak {}MB)",
                    sample.label, sample.cpu_usage, sample.memory_usage_mb, sample.peak_memory_mb
                );
            }
        }

        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        for outcome in &self.outcomes {
            let phases: [(&str, &[Finding]); 3] = [
                ("before", outcome.before.as_slice()),
                ("repair", outcome.repairs.as_slice()),
                ("after", outcome.after.as_deref().unwrap_or(&[])),
            ];
            for (phase, findings) in phases {
                for finding in findings {
                    writer.serialize(CsvRow {
                        check: &outcome.check,
                        phase,
                        code: &finding.code,
                        severity: finding.severity,
                        fixable: finding.fixable,
                        message: &finding.message,
                    })?;
                }
            }
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| DoctorError::config(format!("CSV flush failed: {}", e)))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// 依設定的格式寫出報告檔，回傳相對於專案根目錄的路徑
    pub async fn write(&self, storage: &dyn Storage, section: &ReportSection) -> Result<Vec<String>> {
        let stamp = self.started_at.format("%Y%m%d_%H%M%S");
        let mut written = Vec::new();

        for format in &section.formats {
            let (extension, body) = match format.as_str() {
                "markdown" => ("md", self.render_markdown()),
                "json" => ("json", self.to_json()?),
                "csv" => ("csv", self.to_csv()?),
                other => {
                    tracing::warn!("⚠️ Unknown report format skipped: {}", other);
                    continue;
                }
            };

            let path = format!(
                "{}/doctor_report_{}.{}",
                section.output_dir.trim_end_matches('/'),
                stamp,
                extension
            );
            storage.write_file(&path, body.as_bytes()).await?;
            tracing::info!("📝 Report written: {}", path);
            written.push(path);
        }

        Ok(written)
    }
}

fn write_findings(out: &mut String, title: &str, findings: &[Finding]) {
    let _ = writeln!(out, "### {}\n", title);
    if findings.is_empty() {
        let _ = writeln!(out, "_none_\n");
        return;
    }
    for finding in findings {
        let _ = writeln!(
            out,
            "- **{}** `{}` {}{}",
            finding.severity.label(),
            finding.code,
            finding.message.replace('\n', " "),
            if finding.fixable { " _(fixable)_" } else { "" }
        );
    }
    let _ = writeln!(out);
}
