// 链接真实 libclamav 的扫描测试
//
// 使用临时目录里的自定义 .ndb 签名，不依赖系统病毒库。

#![cfg(libclamav)]

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use clamav_ffi::clamav::{
    scan_contexts, CallbackAction, ClamAVError, Clamav, DbOptions, EngineField, EngineManager,
    ErrorCode, ParseFlags, ScanContext, ScanOptions, ScanOutcome, SharedContext,
};
use clamav_ffi::EngineConfig;
use tempfile::TempDir;

const MARKER: &str = "clamav-ffi-integration-marker-0001";
const SIG_NAME: &str = "ClamFfi.Test.Marker";

// 计数单位是 4096 字节，样本要跨过多个单位
const PRECISION: usize = 4096;
const PADDED_LEN: usize = PRECISION * 8;

// 全局注册表在测试间共享，串行执行以便检查 len()
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("db")).unwrap();
        fs::write(
            dir.path().join("db").join("test.ndb"),
            format!("{}:0:*:{}\n", SIG_NAME, hex(MARKER.as_bytes())),
        )
        .unwrap();
        Self { dir }
    }

    fn db_dir(&self) -> PathBuf {
        self.dir.path().join("db")
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn engine(&self) -> Clamav {
        let mut engine = Clamav::init(ScanOptions::with_parse(ParseFlags::ARCHIVE)).unwrap();
        let signatures = engine.load_db(self.db_dir(), DbOptions::STDOPT).unwrap();
        assert_eq!(signatures, 1);
        engine.compile().unwrap();
        engine
    }
}

#[derive(Default)]
struct Counter {
    pre: Mutex<u32>,
    found: Mutex<Vec<String>>,
}

impl ScanContext for Counter {
    fn pre_scan(&self, _fd: i32, _file_type: Option<&str>) -> CallbackAction {
        *self.pre.lock().unwrap() += 1;
        CallbackAction::Continue
    }

    fn virus_found(&self, _fd: i32, virus_name: &str) {
        self.found.lock().unwrap().push(virus_name.to_string());
    }
}

/// 填充在前、标记在末尾：必须读完整个样本才能命中
fn padded_sample() -> String {
    let mut sample = "A".repeat(PADDED_LEN - MARKER.len());
    sample.push_str(MARKER);
    sample
}

fn assert_scanned(scanned: u64, len: usize) {
    assert!(scanned >= 1, "scanned count not reported");
    assert!(scanned <= len as u64, "scanned {} exceeds sample size {}", scanned, len);
}

fn assert_detected(outcome: &ScanOutcome) {
    let name = outcome.virus_name().expect("expected a detection");
    assert!(name.starts_with(SIG_NAME), "unexpected virus name {}", name);
}

#[test]
fn test_scan_clean_file() {
    let _lock = serial();
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let clean = fixture.write("clean.txt", "nothing to see here\n");

    let report = engine.scan_file(&clean).unwrap();
    assert!(report.is_clean());
}

#[test]
fn test_scan_detects_marker() {
    let _lock = serial();
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let infected = fixture.write("infected.txt", &padded_sample());

    let report = engine.scan_file(&infected).unwrap();
    assert_detected(&report.outcome);
    assert_scanned(report.scanned, PADDED_LEN);
    assert!(report.approx_bytes() >= PRECISION as u64);
}

#[test]
fn test_load_missing_database() {
    let _lock = serial();
    let mut engine = Clamav::init(ScanOptions::default()).unwrap();

    let err = engine
        .load_db("/nonexistent/clamav/db", DbOptions::STDOPT)
        .unwrap_err();
    assert!(matches!(err, ClamAVError::PathNotFound(_)));
    assert_eq!(engine.signatures(), 0);
}

#[test]
fn test_context_scan_invokes_hooks_and_releases_token() {
    let _lock = serial();
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let infected = fixture.write("infected.bin", &padded_sample());
    let counter = Arc::new(Counter::default());

    let report = engine
        .scan_file_with_context(&infected, counter.clone() as SharedContext)
        .unwrap();

    assert_detected(&report.outcome);
    assert_scanned(report.scanned, PADDED_LEN);
    assert!(*counter.pre.lock().unwrap() >= 1);
    let found = counter.found.lock().unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].starts_with(SIG_NAME));
    assert!(scan_contexts().is_empty());
}

#[test]
fn test_failed_context_scan_releases_token() {
    let _lock = serial();
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let counter = Arc::new(Counter::default());

    let err = engine
        .scan_file_with_context(
            fixture.dir.path().join("missing.txt"),
            counter.clone() as SharedContext,
        )
        .unwrap_err();

    assert!(err.code().is_some());
    assert_ne!(err.code(), Some(ErrorCode::Virus));
    assert!(scan_contexts().is_empty());
    assert_eq!(Arc::strong_count(&counter), 1);
}

#[test]
fn test_scan_memory_and_desc() {
    let _lock = serial();
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let counter = Arc::new(Counter::default());

    let payload = padded_sample();
    let report = engine
        .scan_memory(payload.as_bytes(), "payload.bin", Some(counter.clone() as SharedContext))
        .unwrap();
    assert_detected(&report.outcome);
    assert_scanned(report.scanned, payload.len());
    assert_eq!(counter.found.lock().unwrap().len(), 1);

    let report = engine.scan_memory(b"harmless bytes", "harmless.bin", None).unwrap();
    assert!(report.is_clean());
    assert!(scan_contexts().is_empty());

    let path = fixture.write("desc.txt", MARKER);
    let file = fs::File::open(&path).unwrap();
    let report = engine.scan_desc(&file, "desc.txt").unwrap();
    assert_detected(&report.outcome);
}

#[test]
fn test_engine_fields() {
    let _lock = serial();
    let fixture = Fixture::new();
    let mut engine = Clamav::init(ScanOptions::default()).unwrap();

    engine.set_num(EngineField::MaxFiles, 1234).unwrap();
    assert_eq!(engine.get_num(EngineField::MaxFiles).unwrap(), 1234);

    engine.set_num(EngineField::MaxScanSize, 40 * 1024 * 1024).unwrap();
    assert_eq!(engine.get_num(EngineField::MaxScanSize).unwrap(), 40 * 1024 * 1024);

    let tmp = fixture.dir.path().to_string_lossy().into_owned();
    engine.set_str(EngineField::TmpDir, &tmp).unwrap();
    assert_eq!(engine.get_str(EngineField::TmpDir).unwrap().as_deref(), Some(tmp.as_str()));

    assert!(matches!(
        engine.set_num(EngineField::TmpDir, 1),
        Err(ClamAVError::InvalidField { .. })
    ));
    assert!(matches!(
        engine.get_str(EngineField::MaxFiles),
        Err(ClamAVError::InvalidField { .. })
    ));

    engine.free().unwrap();
}

#[test]
fn test_manager_lifecycle() {
    let _lock = serial();
    let fixture = Fixture::new();
    let manager = EngineManager::new(EngineConfig {
        database_dir: fixture.db_dir().to_string_lossy().into_owned(),
        ..Default::default()
    });

    manager.initialize().unwrap();
    assert!(manager.health_check());

    let engine = manager.get_engine().unwrap();
    assert_eq!(engine.signatures(), 1);
    assert_eq!(engine.get_num(EngineField::MaxScanTime).unwrap(), 9000);

    let infected = fixture.write("infected.txt", MARKER);
    assert_detected(&engine.scan_file(&infected).unwrap().outcome);

    manager.reload().unwrap();
    assert!(manager.health_check());
    // 旧引擎仍可使用，直到最后一个引用释放
    assert_detected(&engine.scan_file(&infected).unwrap().outcome);
    drop(engine);

    manager.shutdown();
    assert!(!manager.health_check());
    assert!(manager.get_engine().is_err());
}

#[test]
fn test_library_info() {
    assert!(!clamav_ffi::clamav::version().is_empty());
    assert!(clamav_ffi::clamav::functionality_level() > 0);
    assert_eq!(
        clamav_ffi::clamav::strerror(ErrorCode::Clean),
        "No viruses detected"
    );
}
