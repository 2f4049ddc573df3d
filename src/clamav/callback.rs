// 扫描回调
//
// 引擎级回调（pre_scan / post_scan / virus_found）由 libclamav 在扫描线程上
// 调用，只带回扫描调用时传入的 void* 上下文。这里的跳板函数用全局注册表把
// 上下文指针换回调用方的 ScanContext 对象。

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use lazy_static::lazy_static;

use super::ffi::{self, cl_error_t};
use super::registry::ContextRegistry;
use super::types::ErrorCode;

/// 回调对扫描流程的决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackAction {
    /// 继续正常扫描 (CL_CLEAN)
    #[default]
    Continue,
    /// 视为可信，跳过后续扫描 (CL_BREAK)
    Skip,
    /// 标记为病毒 (CL_VIRUS)
    Flag,
}

impl CallbackAction {
    pub fn as_raw(self) -> cl_error_t {
        match self {
            CallbackAction::Continue => ffi::CL_CLEAN,
            CallbackAction::Skip => ffi::CL_BREAK,
            CallbackAction::Flag => ffi::CL_VIRUS,
        }
    }
}

/// 扫描调用的上下文对象
///
/// 随 `*_with_context` 扫描函数传入，扫描期间 libclamav 触发的回调会路由到
/// 这里。回调可能在 libclamav 选择的任意线程上执行。
pub trait ScanContext: Send + Sync {
    /// 文件类型识别完成、开始扫描之前
    fn pre_scan(&self, _fd: i32, _file_type: Option<&str>) -> CallbackAction {
        CallbackAction::Continue
    }

    /// 单个对象扫描完成之后
    fn post_scan(&self, _fd: i32, _result: ErrorCode, _virus_name: Option<&str>) -> CallbackAction {
        CallbackAction::Continue
    }

    /// 发现病毒
    fn virus_found(&self, _fd: i32, _virus_name: &str) {}
}

/// 注册表中保存的上下文类型
pub type SharedContext = Arc<dyn ScanContext>;

lazy_static! {
    static ref SCAN_CONTEXTS: ContextRegistry<SharedContext> = ContextRegistry::new();
}

/// 引擎回调使用的进程级注册表
pub fn scan_contexts() -> &'static ContextRegistry<SharedContext> {
    &SCAN_CONTEXTS
}

unsafe fn opt_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

// 调用方代码里的 panic 不能穿过 C 栈帧
fn guarded<R>(hook: &'static str, default: R, f: impl FnOnce() -> R) -> R {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            tracing::error!("ScanContext::{} panicked; continuing scan", hook);
            default
        }
    }
}

/// clcb_pre_scan 跳板
///
/// # Safety
///
/// `file_type` 为 NULL 或指向以 NUL 结尾的字符串。
#[cfg_attr(not(libclamav), allow(dead_code))]
pub(crate) unsafe extern "C" fn pre_scan_trampoline(
    fd: c_int,
    file_type: *const c_char,
    context: *mut c_void,
) -> cl_error_t {
    let Some(ctx) = scan_contexts().lookup_raw(context) else {
        return ffi::CL_CLEAN;
    };
    let file_type = opt_str(file_type);
    tracing::trace!("pre_scan: fd={}, type={:?}", fd, file_type);

    guarded("pre_scan", ffi::CL_CLEAN, || {
        ctx.pre_scan(fd, file_type.as_deref()).as_raw()
    })
}

/// clcb_post_scan 跳板
///
/// # Safety
///
/// `virname` 为 NULL 或指向以 NUL 结尾的字符串。
#[cfg_attr(not(libclamav), allow(dead_code))]
pub(crate) unsafe extern "C" fn post_scan_trampoline(
    fd: c_int,
    result: c_int,
    virname: *const c_char,
    context: *mut c_void,
) -> cl_error_t {
    let Some(ctx) = scan_contexts().lookup_raw(context) else {
        return ffi::CL_CLEAN;
    };
    let virname = opt_str(virname);
    let result = ErrorCode::from_raw(result);
    tracing::trace!("post_scan: fd={}, result={:?}, virname={:?}", fd, result, virname);

    guarded("post_scan", ffi::CL_CLEAN, || {
        ctx.post_scan(fd, result, virname.as_deref()).as_raw()
    })
}

/// clcb_virus_found 跳板
///
/// # Safety
///
/// `virname` 为 NULL 或指向以 NUL 结尾的字符串。
#[cfg_attr(not(libclamav), allow(dead_code))]
pub(crate) unsafe extern "C" fn virus_found_trampoline(
    fd: c_int,
    virname: *const c_char,
    context: *mut c_void,
) {
    let Some(ctx) = scan_contexts().lookup_raw(context) else {
        return;
    };
    let virname = opt_str(virname).unwrap_or_else(|| "Unknown".to_string());
    tracing::debug!("virus_found: fd={}, virname={}", fd, virname);

    guarded("virus_found", (), || ctx.virus_found(fd, &virname));
}
