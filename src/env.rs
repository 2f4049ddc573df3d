// 环境变量配置
use std::env;
use std::path::Path;

use crate::clamav::error::Result;
use crate::models::config::EngineConfig;

/// ClamAV 相关环境变量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClamEnv {
    /// 病毒库目录 (CLAMAV_DB_DIR)
    pub db_dir: Option<String>,
    /// JSON 配置文件 (CLAMAV_SETTINGS)
    pub settings_file: Option<String>,
    /// 引擎临时目录 (CLAMAV_TMPDIR)
    pub tmp_dir: Option<String>,
}

impl ClamEnv {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// 从任意变量来源读取，空值视为未设置
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            db_dir: get("CLAMAV_DB_DIR"),
            settings_file: get("CLAMAV_SETTINGS"),
            tmp_dir: get("CLAMAV_TMPDIR"),
        }
    }

    /// 合并配置：默认值 < 配置文件 < 环境变量
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.settings_file {
            Some(path) if Path::new(path).exists() => {
                tracing::info!("Loading engine settings from {}", path);
                EngineConfig::from_file(path)?
            }
            Some(path) => {
                tracing::warn!("Settings file {} not found, using defaults", path);
                EngineConfig::default()
            }
            None => EngineConfig::default(),
        };

        if let Some(db_dir) = &self.db_dir {
            config.database_dir = db_dir.clone();
        }
        if let Some(tmp_dir) = &self.tmp_dir {
            config.tmp_dir = Some(tmp_dir.clone());
        }
        Ok(config)
    }
}
