use crate::config::profile::SettingsSection;
use crate::core::patcher::{self, PatchOp};
use crate::core::{Check, DoctorContext, Finding, Mode, Result};
use async_trait::async_trait;
use chrono::Local;

const NAME: &str = "settings";

/// Django 設定檔的文字層級檢查：重複的 app、必要項目、middleware 順序、必要行與過時設定
pub struct SettingsCheck;

/// 項目已在目標清單，或已在任一 app 清單中（避免跨清單重複加入）
fn entry_present(section: &SettingsSection, content: &str, list: &str, entry: &str) -> bool {
    let in_list = |name: &str| {
        patcher::list_entries(content, name)
            .map(|entries| entries.iter().any(|e| e == entry))
            .unwrap_or(false)
    };
    in_list(list) || (section.app_lists.iter().any(|l| l == list) && section.app_lists.iter().any(|l| in_list(l)))
}

/// 依目前內容計算需要的修改；已符合的項目不會產生操作
pub fn planned_ops(section: &SettingsSection, content: &str) -> Vec<PatchOp> {
    let mut ops: Vec<PatchOp> = patcher::duplicate_entries(content, &section.app_lists)
        .into_iter()
        .map(|entry| PatchOp::RemoveDuplicateEntries {
            lists: section.app_lists.clone(),
            entry,
        })
        .collect();

    for required in &section.required_entries {
        if patcher::list_entries(content, &required.list).is_some()
            && !entry_present(section, content, &required.list, &required.entry)
        {
            ops.push(PatchOp::EnsureListEntry {
                list: required.list.clone(),
                entry: required.entry.clone(),
            });
        }
    }

    ops.extend(section.middleware_order.iter().map(|rule| PatchOp::EnsureOrder {
        entry: rule.entry.clone(),
        after: rule.after.clone(),
    }));
    ops.extend(section.required_lines.iter().map(|line| PatchOp::EnsureLine {
        line: line.line.clone(),
        pattern: line.pattern.clone(),
        before: line.before.clone(),
    }));
    ops.extend(section.replacements.iter().map(|r| PatchOp::ReplaceText {
        description: r.description.clone(),
        old: r.old.clone(),
        new: r.new.clone(),
    }));
    ops
}

#[async_trait]
impl Check for SettingsCheck {
    fn name(&self) -> &str {
        NAME
    }

    fn should_run(&self, ctx: &DoctorContext) -> bool {
        ctx.mode != Mode::Verify
    }

    async fn diagnose(&self, ctx: &DoctorContext) -> Result<Vec<Finding>> {
        let section = &ctx.profile.settings;
        let file = &section.file;

        if !ctx.storage.exists(file).await {
            return Ok(vec![Finding::error(
                NAME,
                "settings.missing",
                format!("{} not found", file),
            )]);
        }
        let content = ctx.storage.read_to_string(file).await?;
        let mut findings = vec![Finding::ok(NAME, "settings.file", format!("{} found", file))];

        let duplicates = patcher::duplicate_entries(&content, &section.app_lists);
        if duplicates.is_empty() {
            findings.push(Finding::ok(NAME, "settings.apps", "No duplicate app entries"));
        }
        for entry in duplicates {
            findings.push(
                Finding::error(
                    NAME,
                    "settings.duplicate_app",
                    format!("'{}' is listed more than once", entry),
                )
                .fixable(),
            );
        }

        for required in &section.required_entries {
            if patcher::list_entries(&content, &required.list).is_none() {
                findings.push(Finding::error(
                    NAME,
                    "settings.list_missing",
                    format!("{} = [...] not found in {}", required.list, file),
                ));
            } else if !entry_present(section, &content, &required.list, &required.entry) {
                findings.push(
                    Finding::error(
                        NAME,
                        "settings.entry_missing",
                        format!("'{}' missing from {}", required.entry, required.list),
                    )
                    .fixable(),
                );
            }
        }

        for rule in &section.middleware_order {
            let op = PatchOp::EnsureOrder {
                entry: rule.entry.clone(),
                after: rule.after.clone(),
            };
            if matches!(op.apply(&content), Ok(Some(_))) {
                findings.push(
                    Finding::warning(
                        NAME,
                        "settings.order",
                        format!("'{}' must come after '{}'", rule.entry, rule.after),
                    )
                    .fixable(),
                );
            }
        }

        for line in &section.required_lines {
            let op = PatchOp::EnsureLine {
                line: line.line.clone(),
                pattern: line.pattern.clone(),
                before: line.before.clone(),
            };
            match op.apply(&content) {
                Ok(Some(_)) => findings.push(
                    Finding::warning(
                        NAME,
                        "settings.line_missing",
                        format!("`{}` missing from {}", line.line, file),
                    )
                    .fixable(),
                ),
                Ok(None) => {}
                Err(reason) => findings.push(Finding::error(NAME, "settings.bad_pattern", reason)),
            }
        }

        for replacement in &section.replacements {
            if !replacement.old.is_empty() && content.contains(replacement.old.as_str()) {
                findings.push(
                    Finding::warning(
                        NAME,
                        "settings.deprecated",
                        format!("{} found in {}", replacement.description, file),
                    )
                    .fixable(),
                );
            }
        }

        Ok(findings)
    }

    async fn repair(&self, ctx: &DoctorContext, _fixable: &[Finding]) -> Result<Vec<Finding>> {
        let section = &ctx.profile.settings;
        let file = &section.file;
        let content = ctx.storage.read_to_string(file).await?;

        let result = patcher::apply_all(file, &content, &planned_ops(section, &content))?;
        if !result.changed() {
            return Ok(Vec::new());
        }

        let mut repairs = Vec::new();
        if section.backup {
            let backup = patcher::backup_path(file, Local::now());
            ctx.storage.copy(file, &backup).await?;
            repairs.push(Finding::info(NAME, "settings.backup", format!("Backup written to {}", backup)));
        }

        ctx.storage.write_file(file, result.content.as_bytes()).await?;
        tracing::info!("✏️ Patched {} ({} change(s))", file, result.changes.len());

        repairs.extend(
            result
                .changes
                .into_iter()
                .map(|change| Finding::fixed(NAME, "settings.patched", change)),
        );
        Ok(repairs)
    }
}
