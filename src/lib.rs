// clamav-ffi/src/lib.rs
//
// 模块声明，导出所有子模块

pub mod clamav;
pub mod env;
pub mod models;

// 重新导出常用类型和常量
pub use env::ClamEnv;
pub use models::config::{EngineConfig, EngineLimits};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
