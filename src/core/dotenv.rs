use rand::Rng;
use std::fmt;

/// Django 的 SECRET_KEY 字元集，去掉 `$` 與 `#`（django-environ 會把它們當成插值與註解）
pub const SECRET_KEY_CHARS: &str = "abcdefghijklmnopqrstuvwxyz0123456789!@%^&*(-_=+)";
pub const SECRET_KEY_LENGTH: usize = 50;

const PLACEHOLDER_MARKERS: &[&str] = &["your-", "your_", "change-me", "changeme", "change_me"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry { key: String, value: String, raw: String },
    Other(String),
}

/// 保留原始行序、註解與空行的 `.env` 內容
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DotEnv {
    lines: Vec<Line>,
}

impl DotEnv {
    pub fn parse(content: &str) -> Self {
        let lines = content
            .lines()
            .map(|raw| match parse_entry(raw) {
                Some((key, value)) => Line::Entry {
                    key,
                    value,
                    raw: raw.to_string(),
                },
                None => Line::Other(raw.to_string()),
            })
            .collect();
        Self { lines }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        // 與 shell 相同，後面的定義覆蓋前面的
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// key 存在且值不為空；`KEY=` 視同未設定
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some_and(|value| !value.trim().is_empty())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Entry { key, .. } => Some(key.as_str()),
                Line::Other(_) => None,
            })
            .collect()
    }

    /// 只在 key 沒有值時寫入：空值的那一行就地改寫，不存在則附加到檔尾；回傳是否有修改
    pub fn set_if_absent(&mut self, key: &str, value: &str) -> bool {
        if self.contains(key) {
            return false;
        }

        let existing = self.lines.iter_mut().rev().find_map(|line| match line {
            Line::Entry { key: k, value, raw } if k == key => Some((value, raw)),
            _ => None,
        });
        match existing {
            Some((old, raw)) => {
                let export = if raw.trim_start().starts_with("export ") { "export " } else { "" };
                *old = value.to_string();
                *raw = format!("{}{}={}", export, key, value);
            }
            None => self.lines.push(Line::Entry {
                key: key.to_string(),
                value: value.to_string(),
                raw: format!("{}={}", key, value),
            }),
        }
        true
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Entry { raw, .. } | Line::Other(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }

    /// 值看起來仍是範本預設值的 key
    pub fn placeholders(&self) -> Vec<(&str, &str)> {
        let mut found: Vec<(&str, &str)> = Vec::new();
        for key in self.keys() {
            if found.iter().any(|(k, _)| *k == key) {
                continue;
            }
            if let Some(value) = self.get(key) {
                if is_placeholder(value) {
                    found.push((key, value));
                }
            }
        }
        found
    }
}

impl fmt::Display for DotEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn parse_entry(raw: &str) -> Option<(String, String)> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key.to_string(), unquote(value.trim())))
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    // 未加引號的值允許行尾註解
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end().to_string(),
        None => value.to_string(),
    }
}

pub fn is_placeholder(value: &str) -> bool {
    let lowered = value.trim().to_ascii_lowercase();
    PLACEHOLDER_MARKERS.iter().any(|m| lowered.contains(m))
}

pub fn generate_secret_key() -> String {
    let alphabet: Vec<char> = SECRET_KEY_CHARS.chars().collect();
    let mut rng = rand::thread_rng();
    (0..SECRET_KEY_LENGTH)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
        .collect()
}
