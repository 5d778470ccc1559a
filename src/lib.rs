pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliConfig;

pub use adapters::{process::TokioCommandRunner, storage::LocalStorage};
pub use config::{profile::Profile, DoctorSettings};
pub use core::{doctor::DoctorEngine, report::Report};
pub use utils::error::{DoctorError, Result};
