pub mod dependencies;
pub mod dotenv;
pub mod environment;
pub mod framework;
pub mod server;
pub mod settings;
pub mod structure;
#[cfg(test)]
pub(crate) mod test_support;

use crate::core::Check;

pub use dependencies::DependenciesCheck;
pub use dotenv::DotEnvCheck;
pub use environment::EnvironmentCheck;
pub use framework::FrameworkCheck;
pub use server::ServerCheck;
pub use settings::SettingsCheck;
pub use structure::StructureCheck;

/// 預設的檢查順序
pub fn default_checks() -> Vec<Box<dyn Check>> {
    vec![
        Box::new(EnvironmentCheck),
        Box::new(DotEnvCheck),
        Box::new(DependenciesCheck),
        Box::new(SettingsCheck),
        Box::new(StructureCheck),
        Box::new(FrameworkCheck),
        Box::new(ServerCheck),
    ]
}
