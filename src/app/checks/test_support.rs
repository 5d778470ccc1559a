use crate::adapters::storage::LocalStorage;
use crate::config::profile::Profile;
use crate::config::DoctorSettings;
use crate::core::{
    CommandOutput, CommandRunner, CommandSpec, DoctorContext, Mode, PythonVersion, Result,
    RunningProcess, Toolchain,
};
use crate::utils::error::DoctorError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// 依指令字串比對回傳預先設定的輸出
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, CommandOutput)>,
    server: Option<(bool, CommandOutput)>,
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

    pub fn server(mut self, stays_alive: bool, stderr: &str) -> Self {
        self.server = Some((
            stays_alive,
            CommandOutput {
                code: if stays_alive { None } else { Some(1) },
                stderr: stderr.to_string(),
                ..Default::default()
            },
        ));
        self
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
        self.calls.lock().unwrap().push(spec.display());
        let (alive, output) = self.server.clone().unwrap_or((true, CommandOutput::default()));
        Ok(Box::new(FakeProcess {
            alive,
            output: Some(output),
        }))
    }
}

struct FakeProcess {
    alive: bool,
    output: Option<CommandOutput>,
}

#[async_trait]
impl RunningProcess for FakeProcess {
    async fn is_alive(&mut self) -> Result<bool> {
        Ok(self.alive && self.output.is_some())
    }

    async fn terminate(&mut self) -> Result<CommandOutput> {
        Ok(self.output.take().unwrap_or_default())
    }
}

pub fn toolchain() -> Toolchain {
    Toolchain {
        python: PathBuf::from("/srv/maida_vale/.venv/bin/python"),
        version: Some(PythonVersion { major: 3, minor: 11, patch: 9 }),
        venv: Some(PathBuf::from("/srv/maida_vale/.venv")),
        uv: None,
    }
}

/// 以內建設定檔與暫存專案目錄建立 context，工具鏈固定為假的 venv
pub fn context(root: &Path, mode: Mode, runner: Arc<ScriptedRunner>) -> DoctorContext {
    let profile = Profile::builtin().unwrap();
    let settings = DoctorSettings::new(root, profile).with_mode(mode);
    let mut ctx = DoctorContext::new(
        "test".to_string(),
        &settings,
        runner,
        Arc::new(LocalStorage::new(root)),
    );
    ctx.toolchain = Some(toolchain());
    ctx
}

pub fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(full, content).unwrap();
}
