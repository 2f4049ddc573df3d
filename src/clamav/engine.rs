// ClamAV 扫描引擎
//
// 对 libclamav 引擎句柄的安全封装：
// - 引擎创建、病毒库加载、编译和释放
// - 数值 / 字符串引擎字段读写
// - 按路径、文件描述符、内存映射扫描
// - 扫描上下文通过注册表令牌传递给引擎回调

use std::ffi::CStr;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::os::raw::{c_char, c_int, c_uint, c_ulong, c_void};
use std::path::Path;
use std::ptr::{self, NonNull};

use lazy_static::lazy_static;

use super::callback::{
    post_scan_trampoline, pre_scan_trampoline, scan_contexts, virus_found_trampoline,
    SharedContext,
};
use super::error::{ClamAVError, Result};
use super::ffi::{self, cl_engine, cl_error_t, cl_fmap_t};
use super::types::{
    c_path, c_string, DatabasePath, DbOptions, EngineField, ErrorCode, FieldKind, ScanOptions,
    ScanReport,
};

lazy_static! {
    // cl_init 每个进程只执行一次
    static ref INIT_RESULT: cl_error_t = unsafe { ffi::cl_init(ffi::CL_INIT_DEFAULT) };
}

fn check(op: &'static str, ret: cl_error_t) -> Result<()> {
    match ErrorCode::from_raw(ret) {
        ErrorCode::Clean => Ok(()),
        code => Err(ClamAVError::native(op, code)),
    }
}

unsafe fn owned_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

/// 上下文存在时在注册表中登记，原生调用返回后（无论结果如何）释放
fn with_context<R>(context: Option<SharedContext>, f: impl FnOnce(*mut c_void) -> R) -> R {
    match context {
        Some(ctx) => {
            let guard = scan_contexts().guard(ctx);
            f(guard.as_ptr())
        }
        None => f(ptr::null_mut()),
    }
}

// ============ 库信息 ============

/// libclamav 版本号
pub fn version() -> String {
    unsafe { owned_str(ffi::cl_retver()) }.unwrap_or_default()
}

/// libclamav 功能级别
pub fn functionality_level() -> u32 {
    unsafe { ffi::cl_retflevel() }
}

/// 编译时配置的默认病毒库目录
pub fn default_db_dir() -> Option<String> {
    unsafe { owned_str(ffi::cl_retdbdir()) }
}

/// 由 libclamav 渲染的错误码文本
pub fn strerror(code: ErrorCode) -> String {
    unsafe { owned_str(ffi::cl_strerror(code.as_raw())) }
        .unwrap_or_else(|| code.message().to_string())
}

// ============ 内存映射 ============

/// 调用方内存上的 libclamav 映射对象，析构时关闭
pub struct Fmap<'a> {
    map: NonNull<cl_fmap_t>,
    len: usize,
    _data: PhantomData<&'a [u8]>,
}

impl<'a> Fmap<'a> {
    /// 映射一段内存；映射对象不能比数据活得更久
    pub fn open_memory(data: &'a [u8]) -> Result<Self> {
        let map = unsafe { ffi::cl_fmap_open_memory(data.as_ptr() as *const c_void, data.len()) };
        let map = NonNull::new(map).ok_or(ClamAVError::MemoryMapFailed(data.len()))?;
        Ok(Self {
            map,
            len: data.len(),
            _data: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for Fmap<'_> {
    fn drop(&mut self) {
        unsafe { ffi::cl_fmap_close(self.map.as_ptr()) };
    }
}

// ============ 引擎 ============

/// ClamAV 引擎实例
///
/// 加载和配置需要 `&mut self`；编译完成后可以放进 `Arc` 在多个线程上并发扫描。
#[derive(Debug)]
pub struct Clamav {
    engine: NonNull<cl_engine>,
    options: ScanOptions,
    signatures: u32,
    compiled: bool,
}

// 编译后的 cl_engine 可以被多个线程同时用于扫描；修改引擎的方法都需要 &mut self
unsafe impl Send for Clamav {}
unsafe impl Sync for Clamav {}

impl Clamav {
    /// 初始化 libclamav 并创建新引擎
    pub fn init(options: ScanOptions) -> Result<Self> {
        check("cl_init", *INIT_RESULT)?;

        let engine = NonNull::new(unsafe { ffi::cl_engine_new() })
            .ok_or(ClamAVError::EngineCreationFailed)?;

        unsafe {
            ffi::cl_engine_set_clcb_pre_scan(engine.as_ptr(), Some(pre_scan_trampoline));
            ffi::cl_engine_set_clcb_post_scan(engine.as_ptr(), Some(post_scan_trampoline));
            ffi::cl_engine_set_clcb_virus_found(engine.as_ptr(), Some(virus_found_trampoline));
        }

        tracing::info!("ClamAV engine created (libclamav {})", version());
        Ok(Self {
            engine,
            options,
            signatures: 0,
            compiled: false,
        })
    }

    /// 校验数据库文件（会完整加载一次，大库会占用较多内存）
    pub fn cvd_verify<P: AsRef<Path>>(path: P) -> Result<()> {
        let db = DatabasePath::new(path)?;
        let c_db = db.to_cstring()?;

        tracing::info!("Verifying database: {}", db.as_path().display());
        check("cl_cvdverify", unsafe { ffi::cl_cvdverify(c_db.as_ptr()) })
    }

    /// 加载病毒库（文件或目录），返回本次加载的签名数
    pub fn load_db<P: AsRef<Path>>(&mut self, path: P, options: DbOptions) -> Result<u32> {
        let db = DatabasePath::new(path)?;
        let c_db = db.to_cstring()?;
        let mut signo: c_uint = 0;

        tracing::info!("Loading virus database from: {}", db.as_path().display());
        let ret = unsafe {
            ffi::cl_load(c_db.as_ptr(), self.engine.as_ptr(), &mut signo, options.bits())
        };
        check("cl_load", ret)?;

        self.signatures = self.signatures.saturating_add(signo);
        tracing::info!("Loaded {} signatures from database", signo);
        Ok(signo)
    }

    /// 编译引擎；所有病毒库加载完成后调用
    pub fn compile(&mut self) -> Result<()> {
        tracing::info!("Compiling ClamAV engine...");
        check("cl_engine_compile", unsafe {
            ffi::cl_engine_compile(self.engine.as_ptr())
        })?;
        self.compiled = true;
        tracing::info!("ClamAV engine compiled successfully");
        Ok(())
    }

    /// 设置数值字段
    ///
    /// 32 位字段传入更大的值时，libclamav 会截断高位。
    pub fn set_num(&mut self, field: EngineField, value: u64) -> Result<()> {
        if !field.is_numeric() {
            return Err(ClamAVError::InvalidField {
                field: field.name(),
                expected: "numeric",
            });
        }
        if field.kind() == FieldKind::U32 && value > u64::from(u32::MAX) {
            tracing::warn!("{} is a 32-bit field, value {} will be truncated", field, value);
        }

        let num = i64::try_from(value).unwrap_or(i64::MAX);
        tracing::debug!("cl_engine_set_num({}, {})", field, num);
        check("cl_engine_set_num", unsafe {
            ffi::cl_engine_set_num(self.engine.as_ptr(), field.as_raw(), num)
        })
    }

    /// 读取数值字段
    pub fn get_num(&self, field: EngineField) -> Result<u64> {
        if !field.is_numeric() {
            return Err(ClamAVError::InvalidField {
                field: field.name(),
                expected: "numeric",
            });
        }

        let mut err: c_int = ffi::CL_SUCCESS;
        let num = unsafe { ffi::cl_engine_get_num(self.engine.as_ptr(), field.as_raw(), &mut err) };
        check("cl_engine_get_num", err)?;
        Ok(num as u64)
    }

    /// 设置字符串字段（CL_ENGINE_TMPDIR、CL_ENGINE_PUA_CATEGORIES）
    pub fn set_str(&mut self, field: EngineField, value: &str) -> Result<()> {
        if field.kind() != FieldKind::Str {
            return Err(ClamAVError::InvalidField {
                field: field.name(),
                expected: "string",
            });
        }

        let c_value = c_string(value)?;
        tracing::debug!("cl_engine_set_str({}, {})", field, value);
        check("cl_engine_set_str", unsafe {
            ffi::cl_engine_set_str(self.engine.as_ptr(), field.as_raw(), c_value.as_ptr())
        })
    }

    /// 读取字符串字段；未设置时返回 None
    pub fn get_str(&self, field: EngineField) -> Result<Option<String>> {
        if field.kind() != FieldKind::Str {
            return Err(ClamAVError::InvalidField {
                field: field.name(),
                expected: "string",
            });
        }

        let mut err: c_int = ffi::CL_SUCCESS;
        let value = unsafe { ffi::cl_engine_get_str(self.engine.as_ptr(), field.as_raw(), &mut err) };
        check("cl_engine_get_str", err)?;
        Ok(unsafe { owned_str(value) })
    }

    pub fn options(&self) -> ScanOptions {
        self.options
    }

    pub fn set_options(&mut self, options: ScanOptions) {
        self.options = options;
    }

    /// 已加载的签名总数
    pub fn signatures(&self) -> u32 {
        self.signatures
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// 扫描单个文件
    pub fn scan_file<P: AsRef<Path>>(&self, path: P) -> Result<ScanReport> {
        let path = path.as_ref();
        let c_file = c_path(path)?;
        let mut opts = self.options.to_raw();
        let mut virname: *const c_char = ptr::null();
        let mut scanned: c_ulong = 0;

        tracing::debug!("Calling cl_scanfile for: {}", path.display());
        let ret = unsafe {
            ffi::cl_scanfile(
                c_file.as_ptr(),
                &mut virname,
                &mut scanned,
                self.engine.as_ptr(),
                &mut opts,
            )
        };
        self.report("cl_scanfile", &path.display().to_string(), ret, virname, scanned)
    }

    /// 扫描单个文件，扫描期间的引擎回调会路由到 `context`
    pub fn scan_file_with_context<P: AsRef<Path>>(
        &self,
        path: P,
        context: SharedContext,
    ) -> Result<ScanReport> {
        let path = path.as_ref();
        let c_file = c_path(path)?;
        let mut opts = self.options.to_raw();
        let mut virname: *const c_char = ptr::null();
        let mut scanned: c_ulong = 0;

        tracing::debug!("Calling cl_scanfile_callback for: {}", path.display());
        let ret = with_context(Some(context), |ctx| unsafe {
            ffi::cl_scanfile_callback(
                c_file.as_ptr(),
                &mut virname,
                &mut scanned,
                self.engine.as_ptr(),
                &mut opts,
                ctx,
            )
        });
        self.report("cl_scanfile_callback", &path.display().to_string(), ret, virname, scanned)
    }

    /// 扫描已打开的文件描述符；`name` 只用于日志和元数据
    #[cfg(unix)]
    pub fn scan_desc<F: std::os::fd::AsRawFd>(&self, file: &F, name: &str) -> Result<ScanReport> {
        let fd = file.as_raw_fd();
        let c_name = c_string(name)?;
        let mut opts = self.options.to_raw();
        let mut virname: *const c_char = ptr::null();
        let mut scanned: c_ulong = 0;

        tracing::debug!("Calling cl_scandesc for: fd={}, name={}", fd, name);
        let ret = unsafe {
            ffi::cl_scandesc(
                fd,
                c_name.as_ptr(),
                &mut virname,
                &mut scanned,
                self.engine.as_ptr(),
                &mut opts,
            )
        };
        self.report("cl_scandesc", name, ret, virname, scanned)
    }

    /// 扫描文件描述符，扫描期间的引擎回调会路由到 `context`
    #[cfg(unix)]
    pub fn scan_desc_with_context<F: std::os::fd::AsRawFd>(
        &self,
        file: &F,
        name: &str,
        context: SharedContext,
    ) -> Result<ScanReport> {
        let fd = file.as_raw_fd();
        let c_name = c_string(name)?;
        let mut opts = self.options.to_raw();
        let mut virname: *const c_char = ptr::null();
        let mut scanned: c_ulong = 0;

        tracing::debug!("Calling cl_scandesc_callback for: fd={}, name={}", fd, name);
        let ret = with_context(Some(context), |ctx| unsafe {
            ffi::cl_scandesc_callback(
                fd,
                c_name.as_ptr(),
                &mut virname,
                &mut scanned,
                self.engine.as_ptr(),
                &mut opts,
                ctx,
            )
        });
        self.report("cl_scandesc_callback", name, ret, virname, scanned)
    }

    /// 扫描内存映射对象
    pub fn scan_map(
        &self,
        map: &Fmap<'_>,
        name: &str,
        context: Option<SharedContext>,
    ) -> Result<ScanReport> {
        let c_name = c_string(name)?;
        let mut opts = self.options.to_raw();
        let mut virname: *const c_char = ptr::null();
        let mut scanned: c_ulong = 0;

        tracing::debug!("Calling cl_scanmap_callback for: {} ({} bytes)", name, map.len());
        let ret = with_context(context, |ctx| unsafe {
            ffi::cl_scanmap_callback(
                map.map.as_ptr(),
                c_name.as_ptr(),
                &mut virname,
                &mut scanned,
                self.engine.as_ptr(),
                &mut opts,
                ctx,
            )
        });
        self.report("cl_scanmap_callback", name, ret, virname, scanned)
    }

    /// 扫描一段内存
    pub fn scan_memory(
        &self,
        data: &[u8],
        name: &str,
        context: Option<SharedContext>,
    ) -> Result<ScanReport> {
        let map = Fmap::open_memory(data)?;
        self.scan_map(&map, name, context)
    }

    fn report(
        &self,
        op: &'static str,
        target: &str,
        ret: cl_error_t,
        virname: *const c_char,
        scanned: c_ulong,
    ) -> Result<ScanReport> {
        // virname 指向引擎内部内存，立即复制
        let virname = if ret == ffi::CL_VIRUS {
            unsafe { owned_str(virname) }
        } else {
            None
        };

        let result = ScanReport::from_native(op, ret, virname, u64::from(scanned));
        match &result {
            Ok(report) => match report.outcome.virus_name() {
                Some(name) => tracing::warn!("VIRUS FOUND in {}: {}", target, name),
                None => tracing::debug!("File clean: {}", target),
            },
            Err(e) => tracing::error!("Scan failed for {}: {}", target, e),
        }
        result
    }

    /// 显式释放引擎并返回 cl_engine_free 的结果
    pub fn free(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        tracing::info!("Freeing ClamAV engine");
        check("cl_engine_free", unsafe {
            ffi::cl_engine_free(this.engine.as_ptr())
        })
    }
}

// 实现 Drop trait 确保引擎资源被正确释放
impl Drop for Clamav {
    fn drop(&mut self) {
        let ret = unsafe { ffi::cl_engine_free(self.engine.as_ptr()) };
        if let Err(e) = check("cl_engine_free", ret) {
            tracing::warn!("Failed to free ClamAV engine: {}", e);
        }
    }
}
