use clap::Parser;
use stack_doctor::core::Mode;
use stack_doctor::utils::error::{DoctorError, ErrorCategory};
use stack_doctor::utils::{logger, validation::Validate};
use stack_doctor::{DoctorEngine, DoctorSettings, LocalStorage, Profile, TokioCommandRunner};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "quick-verify")]
#[command(about = "Smoke test: manage.py check plus a short dev-server liveness probe")]
struct Args {
    /// Project root (the directory holding manage.py)
    #[arg(long, default_value = ".")]
    project: PathBuf,

    /// Python interpreter to use instead of auto-detection
    #[arg(long)]
    python: Option<PathBuf>,

    #[arg(long)]
    port: Option<u16>,

    /// Seconds the dev server must stay up
    #[arg(long)]
    hold_seconds: Option<u64>,

    #[arg(short, long)]
    verbose: bool,
}

fn fail(e: &DoctorError, exit_code: i32) -> ! {
    tracing::error!("❌ Quick verify failed: {} (Severity: {:?})", e, e.severity());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(exit_code);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Err(e) = logger::init_cli_logger(args.verbose, None) {
        eprintln!("❌ Cannot initialise logging: {}", e);
        std::process::exit(2);
    }

    tracing::info!("⚡ Quick verify of {}", args.project.display());

    let mut profile = match Profile::discover(&args.project) {
        Ok(profile) => profile,
        Err(e) if e.category() == ErrorCategory::Configuration => fail(&e, 1),
        Err(e) => fail(&e, 3),
    };
    if let Some(port) = args.port {
        profile.server.port = port;
    }
    if let Some(hold) = args.hold_seconds {
        profile.server.hold_seconds = hold;
    }
    // 只輸出到終端
    profile.report.formats.clear();

    let settings = DoctorSettings::new(args.project, profile)
        .with_python(args.python)
        .with_mode(Mode::Verify);
    if let Err(e) = settings.validate() {
        fail(&e, 1);
    }
    if let Err(e) = settings.ensure_project_root() {
        fail(&e, e.severity().exit_code());
    }

    let storage = Arc::new(LocalStorage::new(settings.project_root.clone()));
    let runner = Arc::new(TokioCommandRunner::new());
    let engine = DoctorEngine::new(settings, runner, storage);

    match engine.run().await {
        Ok(report) => {
            println!("{}", report.render_terminal());
            if !report.is_healthy() {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => fail(&e, e.severity().exit_code()),
    }
}
