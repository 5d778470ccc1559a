use clap::Parser;
use stack_doctor::utils::error::{DoctorError, ErrorCategory};
use stack_doctor::utils::{logger, validation::Validate};
use stack_doctor::{CliConfig, DoctorEngine, LocalStorage, TokioCommandRunner};
use std::sync::Arc;

fn fail(e: &DoctorError, exit_code: i32) -> ! {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(exit_code);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else if let Err(e) = logger::init_cli_logger(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("❌ Cannot open log file: {}", e);
        std::process::exit(2);
    }

    tracing::info!("🩺 Starting stack doctor");

    // 驗證命令列參數
    if let Err(e) = cli.validate() {
        fail(&e, 1);
    }

    // 設定檔讀不到是致命錯誤，內容錯誤則視為設定錯誤
    let profile = match cli.load_profile() {
        Ok(profile) => profile,
        Err(e) if e.category() == ErrorCategory::Configuration => fail(&e, 1),
        Err(e) => fail(&e, 3),
    };

    let monitor_enabled = cli.monitor;
    let settings = cli.into_settings(profile);
    if let Err(e) = settings.validate() {
        fail(&e, 1);
    }
    if let Err(e) = settings.ensure_project_root() {
        fail(&e, e.severity().exit_code());
    }

    tracing::info!(
        "📁 Project: {} (mode: {}{})",
        settings.project_root.display(),
        settings.mode,
        if settings.dry_run { ", dry run" } else { "" }
    );
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = Arc::new(LocalStorage::new(settings.project_root.clone()));
    let runner = Arc::new(TokioCommandRunner::new());
    let engine = DoctorEngine::new_with_monitoring(settings, runner, storage, monitor_enabled);

    match engine.run().await {
        Ok(report) => {
            println!("{}", report.render_terminal());
            if report.is_healthy() {
                tracing::info!("✅ Environment is healthy");
                Ok(())
            } else {
                tracing::warn!("⚠️ Errors remain, see the report above");
                std::process::exit(1);
            }
        }
        Err(e) => fail(&e, e.severity().exit_code()),
    }
}
