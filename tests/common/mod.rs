#![allow(dead_code)]

use async_trait::async_trait;
use stack_doctor::core::{CommandOutput, CommandRunner, CommandSpec, RunningProcess, Storage};
use stack_doctor::utils::error::{DoctorError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

pub const NO_ISSUES: &str = "System check identified no issues (0 silenced).";

pub const PIP_LIST: &str = r#"[{"name": "Django", "version": "5.0.9"}, {"name": "wagtail", "version": "6.2.2"}, {"name": "django-oscar", "version": "3.2.5"}, {"name": "django-environ", "version": "0.11.2"}, {"name": "django-allauth", "version": "65.0.2"}, {"name": "celery", "version": "5.4.0"}, {"name": "django-celery-beat", "version": "2.7.0"}, {"name": "django-cors-headers", "version": "4.4.0"}, {"name": "djangorestframework", "version": "3.15.2"}, {"name": "drf-spectacular", "version": "0.27.2"}, {"name": "argon2-cffi", "version": "23.1.0"}, {"name": "whitenoise", "version": "6.7.0"}, {"name": "fido2", "version": "1.1.3"}, {"name": "django-tables2", "version": "2.7.0"}, {"name": "django-debug-toolbar", "version": "4.4.6"}]"#;

/// 依指令字串比對回傳預先設定的輸出，並記錄每次呼叫
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, CommandOutput)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, pattern: &str, code: i32, stdout: &str) -> Self {
        self.rules.push((
            pattern.to_string(),
            CommandOutput {
                code: Some(code),
                stdout: stdout.to_string(),
                ..Default::default()
            },
        ));
        self
    }

    /// 一個健康專案會回答的指令
    pub fn healthy_project() -> Self {
        Self::new()
            .on("--version", 0, "Python 3.11.9\n")
            .on("pip list", 0, PIP_LIST)
            .on("pip check", 0, "No broken requirements found.\n")
            .on("manage.py check", 0, NO_ISSUES)
            .on("showmigrations", 0, "[X]  contenttypes.0001_initial\n[X]  auth.0001_initial\n")
            .on("makemigrations --check", 0, "No changes detected\n")
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, pattern: &str) -> bool {
        self.calls().iter().any(|c| c.contains(pattern))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let display = spec.display();
        self.calls.lock().unwrap().push(display.clone());
        self.rules
            .iter()
            .find(|(pattern, _)| display.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .ok_or(DoctorError::CommandNotFound { program: display })
    }

    async fn spawn(&self, spec: &CommandSpec) -> Result<Box<dyn RunningProcess>> {
        Err(DoctorError::CommandNotFound {
            program: spec.display(),
        })
    }
}

/// 記憶體中的 Storage
#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned().ok_or_else(|| {
            DoctorError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
        })
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.files.lock().unwrap().insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    async fn create_dir_all(&self, _path: &str) -> Result<()> {
        Ok(())
    }
}

pub fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(full, content).unwrap();
}

/// cookiecutter 風格的暫存專案：manage.py、設定檔、urls.py 與假的 .venv
pub fn scaffold_project(root: &Path) {
    write(root, "manage.py", "#!/usr/bin/env python\n");
    write(
        root,
        "config/settings/base.py",
        include_str!("../fixtures/base_settings.py"),
    );
    write(
        root,
        "config/urls.py",
        "urlpatterns = [\n    path('', include(apps.get_app_config('oscar').urls[0])),\n    path('accounts/', include('allauth.urls')),\n    path('cms/', include(wagtailadmin_urls)),\n    path('', include(wagtail_urls)),\n]\n",
    );
    write(root, "config/wsgi.py", "application = get_wsgi_application()\n");
    write(root, ".venv/pyvenv.cfg", "home = /usr/bin\n");
    write(root, ".venv/bin/python", "");
}

/// 專案內所有檔案（排除報告目錄）與其內容
pub fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap().filter_map(|e| e.ok()) {
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            if relative.starts_with("doctor_reports") {
                continue;
            }
            if path.is_dir() {
                out.insert(format!("{}/", relative), Vec::new());
                walk(root, &path, out);
            } else {
                out.insert(relative, std::fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}
