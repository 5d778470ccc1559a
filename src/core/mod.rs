pub mod doctor;
pub mod dotenv;
pub mod packages;
pub mod patcher;
pub mod python;
pub mod report;

pub use crate::domain::model::{
    CheckOutcome, Finding, Mode, PythonVersion, Severity, Summary, Toolchain,
};
pub use crate::domain::ports::{
    CommandOutput, CommandRunner, CommandSpec, ConfigProvider, RunningProcess, Storage,
};
pub use crate::utils::error::Result;
pub use doctor::{Check, CheckSequence, DoctorContext, DoctorEngine};
