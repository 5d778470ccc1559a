use crate::utils::error::{DoctorError, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

/// 設定檔的宣告式文字修改；每個操作都是冪等的
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    EnsureListEntry { list: String, entry: String },
    RemoveDuplicateEntries { lists: Vec<String>, entry: String },
    EnsureOrder { entry: String, after: String },
    EnsureLine {
        line: String,
        pattern: Option<String>,
        before: Option<String>,
    },
    ReplaceText { description: String, old: String, new: String },
}

impl PatchOp {
    pub fn describe(&self) -> String {
        match self {
            PatchOp::EnsureListEntry { list, entry } => format!("add '{}' to {}", entry, list),
            PatchOp::RemoveDuplicateEntries { entry, .. } => {
                format!("remove duplicate '{}' entries", entry)
            }
            PatchOp::EnsureOrder { entry, after } => {
                format!("move '{}' after '{}'", entry, after)
            }
            PatchOp::EnsureLine { line, .. } => format!("add line `{}`", line),
            PatchOp::ReplaceText { description, .. } => format!("rewrite {}", description),
        }
    }

    /// 內容需要修改時回傳新內容，已符合時回傳 None
    pub fn apply(&self, content: &str) -> std::result::Result<Option<String>, String> {
        match self {
            PatchOp::EnsureListEntry { list, entry } => ensure_list_entry(content, list, entry),
            PatchOp::RemoveDuplicateEntries { lists, entry } => remove_duplicates(content, lists, entry),
            PatchOp::EnsureOrder { entry, after } => Ok(ensure_order(content, entry, after)),
            PatchOp::EnsureLine {
                line,
                pattern,
                before,
            } => ensure_line(content, line, pattern.as_deref(), before.as_deref()),
            PatchOp::ReplaceText { old, new, .. } => {
                if !old.is_empty() && content.contains(old.as_str()) {
                    Ok(Some(content.replace(old.as_str(), new)))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchResult {
    pub content: String,
    pub changes: Vec<String>,
}

impl PatchResult {
    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// 依序套用所有操作；找不到清單標記時回傳 PatchError
pub fn apply_all(file: &str, content: &str, ops: &[PatchOp]) -> Result<PatchResult> {
    let mut current = content.to_string();
    let mut changes = Vec::new();

    for op in ops {
        let patched = op.apply(&current).map_err(|reason| DoctorError::PatchError {
            file: file.to_string(),
            reason,
        })?;
        if let Some(patched) = patched {
            tracing::debug!("✏️ {}: {}", file, op.describe());
            changes.push(op.describe());
            current = patched;
        }
    }

    Ok(PatchResult {
        content: current,
        changes,
    })
}

/// `settings/base.py` → `settings/base.py.bak.20240611_142233`
pub fn backup_path(file: &str, now: DateTime<Local>) -> String {
    format!("{}.bak.{}", file, now.format("%Y%m%d_%H%M%S"))
}

fn list_block_regex(list: &str) -> std::result::Result<Regex, String> {
    Regex::new(&format!(r"(?ms)^[ \t]*{}\s*=\s*\[(.*?)\]", regex::escape(list)))
        .map_err(|e| e.to_string())
}

fn quoted_entries(body: &str) -> Vec<String> {
    let quoted = Regex::new(r#"["']([^"']+)["']"#);
    let Ok(quoted) = quoted else {
        return Vec::new();
    };

    body.lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .flat_map(|line| {
            quoted
                .captures_iter(line)
                .map(|c| c[1].to_string())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// `LIST = [...]` 內的字串項目；清單不存在時回傳 None
pub fn list_entries(content: &str, list: &str) -> Option<Vec<String>> {
    let re = list_block_regex(list).ok()?;
    let caps = re.captures(content)?;
    Some(quoted_entries(caps.get(1).map(|m| m.as_str()).unwrap_or("")))
}

/// 在多個清單中出現超過一次的項目，依首次出現順序
pub fn duplicate_entries(content: &str, lists: &[String]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order = Vec::new();

    for list in lists {
        for entry in list_entries(content, list).unwrap_or_default() {
            let count = counts.entry(entry.clone()).or_insert(0);
            if *count == 0 {
                order.push(entry);
            }
            *count += 1;
        }
    }

    order
        .into_iter()
        .filter(|e| counts.get(e).copied().unwrap_or(0) > 1)
        .collect()
}

fn is_entry_line(line: &str, entry: &str) -> bool {
    let trimmed = line.split('#').next().unwrap_or("").trim();
    let trimmed = trimmed.strip_suffix(',').unwrap_or(trimmed).trim_end();
    trimmed == format!("\"{}\"", entry) || trimmed == format!("'{}'", entry)
}

fn ensure_list_entry(
    content: &str,
    list: &str,
    entry: &str,
) -> std::result::Result<Option<String>, String> {
    let re = list_block_regex(list)?;
    let caps = re
        .captures(content)
        .ok_or_else(|| format!("list {} not found", list))?;
    let body = caps.get(1).ok_or_else(|| format!("list {} has no body", list))?;

    if quoted_entries(body.as_str()).iter().any(|e| e == entry) {
        return Ok(None);
    }

    let body_text = body.as_str();
    let close = body.end();
    let mut patched = String::with_capacity(content.len() + entry.len() + 8);

    if let Some(last_newline) = body_text.rfind('\n') {
        // 多行清單：在 `]` 所在行之前插入新的一行
        let indent = body_text
            .lines()
            .find(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
            .map(|l| l[..l.len() - l.trim_start().len()].to_string())
            .unwrap_or_else(|| "    ".to_string());
        let insert_at = body.start() + last_newline + 1;

        let before = &content[..insert_at];
        let needs_comma = before
            .trim_end()
            .chars()
            .last()
            .map(|c| c != ',' && c != '[')
            .unwrap_or(false);

        if needs_comma {
            let trimmed_len = before.trim_end().len();
            patched.push_str(&content[..trimmed_len]);
            patched.push(',');
            patched.push_str(&content[trimmed_len..insert_at]);
        } else {
            patched.push_str(before);
        }
        patched.push_str(&format!("{}\"{}\",\n", indent, entry));
        patched.push_str(&content[insert_at..]);
    } else {
        // 單行清單
        let inner = body_text.trim_end();
        let separator = if inner.trim().is_empty() || inner.ends_with(',') {
            ""
        } else {
            ", "
        };
        let insert_at = body.start() + inner.len();
        patched.push_str(&content[..insert_at]);
        patched.push_str(&format!("{}\"{}\"", separator, entry));
        patched.push_str(&content[insert_at..close]);
        patched.push_str(&content[close..]);
    }

    Ok(Some(patched))
}

fn split_lines(content: &str) -> Vec<&str> {
    content.split_inclusive('\n').collect()
}

/// 從一行程式碼中移除第一次之後出現的 entry 與其逗號
fn strip_entry(code: &str, entry: &str, seen: &mut bool) -> std::result::Result<Option<String>, String> {
    let quoted = Regex::new(r#"["']([^"']+)["']"#).map_err(|e| e.to_string())?;
    let mut code = code.to_string();
    let mut changed = false;
    let mut from = 0;

    loop {
        let found = quoted
            .captures_iter(&code[from..])
            .find(|c| &c[1] == entry)
            .and_then(|c| c.get(0))
            .map(|m| (from + m.start(), from + m.end()));
        let Some((start, end)) = found else {
            break;
        };
        if !*seen {
            *seen = true;
            from = end;
            continue;
        }

        let rest = &code[end..];
        let range = match rest.trim_start_matches([' ', '\t']).strip_prefix(',') {
            Some(tail) => start..code.len() - tail.trim_start_matches([' ', '\t']).len(),
            // 清單最後一項：改吃掉前面的逗號
            None => match code[..start].trim_end_matches([' ', '\t']).strip_suffix(',') {
                Some(head) => head.len()..end,
                None => start..end,
            },
        };
        from = range.start;
        code.replace_range(range, "");
        changed = true;
    }

    Ok(changed.then_some(code))
}

fn dedupe_body(body: &str, entry: &str, seen: &mut bool) -> std::result::Result<Option<String>, String> {
    let mut out = String::with_capacity(body.len());
    let mut changed = false;

    for (i, segment) in split_lines(body).into_iter().enumerate() {
        let (line, newline) = match segment.strip_suffix('\n') {
            Some(line) => (line, "\n"),
            None => (segment, ""),
        };
        let (code, comment) = line.split_at(line.find('#').unwrap_or(line.len()));
        let Some(stripped) = strip_entry(code, entry, seen)? else {
            out.push_str(segment);
            continue;
        };
        changed = true;

        let kept = stripped.trim_end();
        // 整行只剩空白就整行刪除；第一段與 `NAME = [` 同一行，不能刪
        if kept.trim().is_empty() && i > 0 && !newline.is_empty() {
            continue;
        }
        out.push_str(kept);
        if !comment.is_empty() {
            if !kept.trim().is_empty() {
                out.push_str("  ");
            }
            out.push_str(comment);
        }
        out.push_str(newline);
    }

    Ok(changed.then_some(out))
}

/// 只在指定的清單區塊內去重，保留跨清單的第一次出現
fn remove_duplicates(content: &str, lists: &[String], entry: &str) -> std::result::Result<Option<String>, String> {
    let mut current = content.to_string();
    let mut seen = false;
    let mut changed = false;

    for list in lists {
        let re = list_block_regex(list)?;
        let Some(body) = re.captures(&current).and_then(|c| c.get(1)) else {
            continue;
        };
        let range = body.range();
        if let Some(deduped) = dedupe_body(body.as_str(), entry, &mut seen)? {
            current.replace_range(range, &deduped);
            changed = true;
        }
    }

    Ok(changed.then_some(current))
}

fn ensure_order(content: &str, entry: &str, after: &str) -> Option<String> {
    let mut lines = split_lines(content);
    let entry_idx = lines.iter().position(|l| is_entry_line(l, entry))?;
    let after_idx = lines.iter().position(|l| is_entry_line(l, after))?;

    if entry_idx > after_idx {
        return None;
    }

    let moved = lines.remove(entry_idx);
    // 移除後 after 的位置往前移一格
    lines.insert(after_idx, moved);
    Some(lines.concat())
}

fn ensure_line(
    content: &str,
    line: &str,
    pattern: Option<&str>,
    before: Option<&str>,
) -> std::result::Result<Option<String>, String> {
    if let Some(pattern) = pattern {
        let re = Regex::new(&format!("(?m){}", pattern)).map_err(|e| e.to_string())?;
        if re.is_match(content) {
            return Ok(None);
        }
    }
    if content.lines().any(|l| l.trim() == line.trim()) {
        return Ok(None);
    }

    let anchor = before.and_then(|marker| {
        let mut offset = 0;
        for l in split_lines(content) {
            if l.contains(marker) {
                return Some(offset);
            }
            offset += l.len();
        }
        None
    });

    let patched = match anchor {
        Some(offset) => format!("{}{}\n{}", &content[..offset], line, &content[offset..]),
        None if content.is_empty() || content.ends_with('\n') => format!("{}{}\n", content, line),
        None => format!("{}\n{}\n", content, line),
    };
    Ok(Some(patched))
}
