// ClamAV FFI 模块
//
// 此模块提供 libclamav 的 Rust 绑定，包括：
// - 上下文注册表（把 Rust 对象安全地交给 C 回调）
// - 引擎创建、病毒库加载和字段配置
// - 文件、描述符和内存扫描
// - 引擎生命周期管理
//
// engine 和 manager 需要链接 libclamav，由 build.rs 探测后启用。

pub mod callback;
pub mod error;
pub mod ffi;
pub mod registry;
pub mod types;

#[cfg(libclamav)]
pub mod engine;
#[cfg(libclamav)]
pub mod manager;

#[cfg(test)]
#[path = "tests/ffi_test.rs"]
mod ffi_test;

pub use callback::{scan_contexts, CallbackAction, ScanContext, SharedContext};
pub use error::{ClamAVError, Result};
pub use registry::{ContextGuard, ContextRegistry, ContextToken};
pub use types::*;

#[cfg(libclamav)]
pub use engine::{default_db_dir, functionality_level, strerror, version, Clamav, Fmap};
#[cfg(libclamav)]
pub use manager::{build_engine, EngineManager};
