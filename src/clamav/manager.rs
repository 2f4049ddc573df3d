// ClamAV 引擎生命周期管理
//
// 设计要点:
// - 进程内持有一个编译好的引擎，扫描方拿到 Arc<Clamav> 并发使用
// - 病毒库更新后通过 reload 重新加载
// - 初始化失败时进入 Error 状态，get_engine 返回 NotOperational
//
// 引擎状态:
// - Uninitialized: 未初始化
// - Initializing: 正在初始化
// - Ready: 已就绪，可以执行扫描
// - Error: 初始化失败

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::engine::Clamav;
use super::error::{ClamAVError, Result};
use super::types::{EngineField, EngineState};
use crate::models::config::EngineConfig;

/// 按配置构建编译好的引擎
pub fn build_engine(config: &EngineConfig) -> Result<Clamav> {
    let mut engine = Clamav::init(config.scan_options)?;

    if let Some(tmp_dir) = &config.tmp_dir {
        engine.set_str(EngineField::TmpDir, tmp_dir)?;
    }

    engine.load_db(&config.database_dir, config.db_options)?;
    engine.compile()?;

    for (field, value) in config.limits.fields() {
        engine.set_num(field, value)?;
    }

    Ok(engine)
}

/// ClamAV 引擎管理器
pub struct EngineManager {
    engine: Arc<Mutex<Option<Arc<Clamav>>>>,
    state: Arc<Mutex<EngineState>>,
    config: EngineConfig,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EngineManager {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(EngineState::Uninitialized)),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 初始化引擎；已就绪时直接返回
    pub fn initialize(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            match *state {
                EngineState::Ready => {
                    tracing::info!("Engine already initialized");
                    return Ok(());
                }
                EngineState::Initializing => {
                    return Err(ClamAVError::NotOperational(EngineState::Initializing));
                }
                _ => *state = EngineState::Initializing,
            }
        }

        tracing::info!(
            "Initializing ClamAV engine with db_dir={}, tmp_dir={:?}",
            self.config.database_dir,
            self.config.tmp_dir
        );

        let engine = match build_engine(&self.config) {
            Ok(e) => e,
            Err(e) => {
                tracing::error!("Failed to initialize ClamAV engine: {}", e);
                *lock(&self.state) = EngineState::Error(e.to_string());
                return Err(e);
            }
        };

        tracing::info!(
            "ClamAV engine initialized successfully ({} signatures)",
            engine.signatures()
        );
        *lock(&self.engine) = Some(Arc::new(engine));
        *lock(&self.state) = EngineState::Ready;

        tracing::info!("Engine state: Ready");
        Ok(())
    }

    /// 获取引擎实例（用于执行扫描）
    pub fn get_engine(&self) -> Result<Arc<Clamav>> {
        let state = lock(&self.state);
        if !state.is_ready() {
            return Err(ClamAVError::NotOperational(state.clone()));
        }

        lock(&self.engine)
            .clone()
            .ok_or(ClamAVError::NotOperational(EngineState::Uninitialized))
    }

    /// 释放管理器持有的引擎
    ///
    /// 仍在扫描的调用方持有自己的 Arc，最后一个引用释放时引擎才会被销毁。
    pub fn shutdown(&self) {
        tracing::info!("Shutting down ClamAV engine");

        if let Some(engine) = lock(&self.engine).take() {
            let holders = Arc::strong_count(&engine) - 1;
            if holders > 0 {
                tracing::debug!("Engine still referenced by {} scanner(s)", holders);
            }
        }
        *lock(&self.state) = EngineState::Uninitialized;

        tracing::info!("Engine shutdown complete");
    }

    pub fn get_state(&self) -> EngineState {
        lock(&self.state).clone()
    }

    pub fn health_check(&self) -> bool {
        self.get_state().is_ready()
    }

    /// 病毒库热重载，用于病毒库更新后调用
    pub fn reload(&self) -> Result<()> {
        tracing::info!("Reloading ClamAV engine with new database");

        self.shutdown();
        self.initialize()?;

        tracing::info!("Engine reloaded successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_db_config() -> EngineConfig {
        EngineConfig {
            database_dir: "/test/db/does-not-exist".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_engine_manager_uninitialized() {
        let manager = EngineManager::new(missing_db_config());

        let err = manager.get_engine().unwrap_err();
        assert!(matches!(
            err,
            ClamAVError::NotOperational(EngineState::Uninitialized)
        ));
        assert_eq!(manager.get_state(), EngineState::Uninitialized);
        assert!(!manager.health_check());
    }

    #[test]
    fn test_engine_manager_missing_database() {
        let manager = EngineManager::new(missing_db_config());

        let err = manager.initialize().unwrap_err();
        assert!(matches!(err, ClamAVError::PathNotFound(_)));
        assert!(matches!(manager.get_state(), EngineState::Error(_)));
        assert!(manager.get_engine().is_err());

        manager.shutdown();
        assert_eq!(manager.get_state(), EngineState::Uninitialized);
        assert!(lock(&manager.engine).is_none());
    }
}
