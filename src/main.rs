// clamav-ffi 命令行扫描工具
//
// 用法: clamav-ffi <path>...
//
// 病毒库目录和配置文件由 CLAMAV_DB_DIR / CLAMAV_SETTINGS / CLAMAV_TMPDIR 指定。

#[cfg(libclamav)]
use std::path::PathBuf;
#[cfg(libclamav)]
use std::sync::Arc;

#[cfg(libclamav)]
use clamav_ffi::clamav::{
    CallbackAction, EngineManager, ErrorCode, ScanContext, ScanOutcome, SharedContext,
};
#[cfg(libclamav)]
use clamav_ffi::ClamEnv;
#[cfg(libclamav)]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 把引擎回调转成日志
#[cfg(libclamav)]
struct LogContext {
    path: PathBuf,
}

#[cfg(libclamav)]
impl ScanContext for LogContext {
    fn pre_scan(&self, fd: i32, file_type: Option<&str>) -> CallbackAction {
        tracing::debug!(
            "{}: pre-scan fd={} type={}",
            self.path.display(),
            fd,
            file_type.unwrap_or("unknown")
        );
        CallbackAction::Continue
    }

    fn post_scan(&self, _fd: i32, result: ErrorCode, virus_name: Option<&str>) -> CallbackAction {
        if let Some(name) = virus_name {
            tracing::debug!("{}: post-scan {} ({})", self.path.display(), result, name);
        }
        CallbackAction::Continue
    }

    fn virus_found(&self, _fd: i32, virus_name: &str) {
        tracing::warn!("{}: virus found: {}", self.path.display(), virus_name);
    }
}

#[cfg(libclamav)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clamav_ffi=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        anyhow::bail!("usage: {} <path>...", clamav_ffi::APP_NAME);
    }

    tracing::info!(
        "Starting {} {} (libclamav {}, flevel {})",
        clamav_ffi::APP_NAME,
        clamav_ffi::VERSION,
        clamav_ffi::clamav::version(),
        clamav_ffi::clamav::functionality_level()
    );

    let env = ClamEnv::from_env();
    let config = env.engine_config()?;
    tracing::info!("Environment loaded: db_dir={}", config.database_dir);

    let manager = EngineManager::new(config);
    manager
        .initialize()
        .map_err(|e| anyhow::anyhow!("ClamAV engine initialization failed: {}", e))?;
    let engine = manager.get_engine()?;

    let mut tasks = Vec::with_capacity(paths.len());
    for path in paths {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::task::spawn_blocking(move || {
            let context: SharedContext = Arc::new(LogContext { path: path.clone() });
            let result = engine.scan_file_with_context(&path, context);
            (path, result)
        }));
    }

    let mut infected = 0usize;
    let mut failed = 0usize;
    for task in tasks {
        let (path, result) = task.await?;
        match result {
            Ok(report) => match &report.outcome {
                ScanOutcome::Clean => {
                    println!("{}: OK (~{} bytes scanned)", path.display(), report.approx_bytes());
                }
                ScanOutcome::Detected(name) => {
                    infected += 1;
                    println!(
                        "{}: {} FOUND (~{} bytes scanned)",
                        path.display(),
                        name,
                        report.approx_bytes()
                    );
                }
            },
            Err(e) => {
                failed += 1;
                println!("{}: ERROR {}", path.display(), e);
            }
        }
    }

    drop(engine);
    manager.shutdown();

    tracing::info!("Scan finished: {} infected, {} errors", infected, failed);
    if failed > 0 {
        anyhow::bail!("{} path(s) could not be scanned", failed);
    }
    Ok(())
}

#[cfg(not(libclamav))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!(
        "{} was built without libclamav; set CLAMAV_LIB_DIR and rebuild",
        clamav_ffi::APP_NAME
    )
}
