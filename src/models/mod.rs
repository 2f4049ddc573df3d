// 数据模型模块
pub mod config;

pub use config::*;
