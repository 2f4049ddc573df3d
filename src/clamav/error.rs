// ClamAV 绑定错误类型

use std::path::PathBuf;

use thiserror::Error;

use super::types::{EngineState, ErrorCode};

/// 绑定层统一返回类型
pub type Result<T> = std::result::Result<T, ClamAVError>;

/// ClamAV 错误类型
///
/// `Native` 原样转发 libclamav 的返回码；其余变体是绑定层自己的检查，
/// 在调用原生函数之前产生。
#[derive(Debug, Error)]
pub enum ClamAVError {
    /// libclamav 返回了非成功的错误码
    #[error("{op} failed: {code}")]
    Native {
        /// 出错的原生函数
        op: &'static str,
        code: ErrorCode,
    },

    /// 数据库路径不存在（不会调用原生加载函数）
    #[error("db {} is not exists!", .0.display())]
    PathNotFound(PathBuf),

    /// 包含 NUL 字节，无法转换为 C 字符串
    #[error("string contains an interior NUL byte: {0:?}")]
    InvalidCString(String),

    /// 该令牌没有对应的上下文（从未注册或已释放）
    #[error("no context to delete")]
    ContextNotFound,

    /// 字段类型与调用的访问函数不匹配
    #[error("engine field {field} is not a {expected} field")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("cl_engine_new returned null")]
    EngineCreationFailed,

    #[error("cl_fmap_open_memory failed for {0}-byte buffer")]
    MemoryMapFailed(usize),

    /// 引擎管理器不在 Ready 状态
    #[error("engine not operational: {0}")]
    NotOperational(EngineState),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClamAVError {
    pub(crate) fn native(op: &'static str, code: ErrorCode) -> Self {
        ClamAVError::Native { op, code }
    }

    /// 原生错误码（绑定层错误返回 None）
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClamAVError::Native { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClamAVError {
    fn from(err: serde_json::Error) -> Self {
        ClamAVError::Config(err.to_string())
    }
}
