use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clamav::error::{ClamAVError, Result};
use crate::clamav::types::{DbOptions, EngineField, ParseFlags, ScanOptions};

const MIB: u64 = 1024 * 1024;

/// ClamAV 引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 病毒库目录（或单个数据库文件）
    pub database_dir: String,
    /// cl_load 选项
    pub db_options: DbOptions,
    /// 每次扫描使用的选项
    pub scan_options: ScanOptions,
    /// 编译后写入引擎的限制
    pub limits: EngineLimits,
    /// 引擎临时目录
    pub tmp_dir: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_dir: "/var/lib/clamav".to_string(),
            db_options: DbOptions::STDOPT,
            scan_options: ScanOptions::with_parse(ParseFlags::ARCHIVE | ParseFlags::ELF),
            limits: EngineLimits::default(),
            tmp_dir: None,
        }
    }
}

impl EngineConfig {
    /// 从 JSON 配置文件读取；缺少的字段使用默认值
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        if config.database_dir.is_empty() {
            return Err(ClamAVError::Config("database_dir must not be empty".to_string()));
        }
        Ok(config)
    }
}

/// 引擎扫描限制；None 表示保留 libclamav 默认值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLimits {
    pub max_scan_size: Option<u64>,
    pub max_file_size: Option<u64>,
    pub max_recursion: Option<u64>,
    pub max_files: Option<u64>,
    /// 毫秒
    pub max_scan_time: Option<u64>,
    pub pcre_match_limit: Option<u64>,
    pub pcre_rec_match_limit: Option<u64>,
    pub pcre_max_file_size: Option<u64>,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self::recommended()
    }
}

impl EngineLimits {
    /// 全部使用 libclamav 默认值
    pub fn none() -> Self {
        Self {
            max_scan_size: None,
            max_file_size: None,
            max_recursion: None,
            max_files: None,
            max_scan_time: None,
            pcre_match_limit: None,
            pcre_rec_match_limit: None,
            pcre_max_file_size: None,
        }
    }

    /// 常用限制：40 MiB 扫描量，20 MiB PCRE 文件，9 秒扫描时间
    pub fn recommended() -> Self {
        Self {
            max_scan_size: Some(40 * MIB),
            max_scan_time: Some(9000),
            pcre_match_limit: Some(1000),
            pcre_rec_match_limit: Some(500),
            pcre_max_file_size: Some(20 * MIB),
            ..Self::none()
        }
    }

    /// 需要写入引擎的 (字段, 值) 列表
    pub fn fields(&self) -> Vec<(EngineField, u64)> {
        [
            (EngineField::MaxScanSize, self.max_scan_size),
            (EngineField::MaxFileSize, self.max_file_size),
            (EngineField::MaxRecursion, self.max_recursion),
            (EngineField::MaxFiles, self.max_files),
            (EngineField::MaxScanTime, self.max_scan_time),
            (EngineField::PcreMatchLimit, self.pcre_match_limit),
            (EngineField::PcreRecMatchLimit, self.pcre_rec_match_limit),
            (EngineField::PcreMaxFileSize, self.pcre_max_file_size),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
        .collect()
    }
}
