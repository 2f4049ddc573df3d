// ClamAV FFI 绑定层
// 与 clamav.h (1.x) 的类型、常量和函数声明对齐
//
// 常量和 #[repr(C)] 类型总是参与编译；extern 函数只在构建脚本找到
// libclamav 时（cfg(libclamav)）才声明。

#![allow(non_camel_case_types)]

use std::os::raw::{c_char, c_int, c_uint, c_ulong, c_void};

// ============ ClamAV C API 类型绑定 ============

/// ClamAV 错误码类型
pub type cl_error_t = c_int;

/// ClamAV 引擎结构体 (opaque pointer)
#[repr(C)]
pub struct cl_engine {
    _private: [u8; 0],
}

/// 内存映射对象 (opaque pointer)
#[repr(C)]
pub struct cl_fmap_t {
    _private: [u8; 0],
}

/// 扫描选项结构体（5 个字段，与 C API 对齐）
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct cl_scan_options {
    pub general: u32,
    pub parse: u32,
    pub heuristic: u32,
    pub mail: u32,
    pub dev: u32,
}

/// ClamAV 引擎字段枚举
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum cl_engine_field {
    CL_ENGINE_MAX_SCANSIZE = 0,
    CL_ENGINE_MAX_FILESIZE,
    CL_ENGINE_MAX_RECURSION,
    CL_ENGINE_MAX_FILES,
    CL_ENGINE_MIN_CC_COUNT,
    CL_ENGINE_MIN_SSN_COUNT,
    CL_ENGINE_PUA_CATEGORIES,
    CL_ENGINE_DB_OPTIONS,
    CL_ENGINE_DB_VERSION,
    CL_ENGINE_DB_TIME,
    CL_ENGINE_AC_ONLY,
    CL_ENGINE_AC_MINDEPTH,
    CL_ENGINE_AC_MAXDEPTH,
    CL_ENGINE_TMPDIR,
    CL_ENGINE_KEEPTMP,
    CL_ENGINE_BYTECODE_SECURITY,
    CL_ENGINE_BYTECODE_TIMEOUT,
    CL_ENGINE_BYTECODE_MODE,
    CL_ENGINE_MAX_EMBEDDEDPE,
    CL_ENGINE_MAX_HTMLNORMALIZE,
    CL_ENGINE_MAX_HTMLNOTAGS,
    CL_ENGINE_MAX_SCRIPTNORMALIZE,
    CL_ENGINE_MAX_ZIPTYPERCG,
    CL_ENGINE_FORCETODISK,
    CL_ENGINE_CACHE_SIZE,
    CL_ENGINE_DISABLE_CACHE,
    CL_ENGINE_DISABLE_PE_STATS,
    CL_ENGINE_STATS_TIMEOUT,
    CL_ENGINE_MAX_PARTITIONS,
    CL_ENGINE_MAX_ICONSPE,
    CL_ENGINE_MAX_RECHWP3,
    CL_ENGINE_MAX_SCANTIME,
    CL_ENGINE_PCRE_MATCH_LIMIT,
    CL_ENGINE_PCRE_RECMATCH_LIMIT,
    CL_ENGINE_PCRE_MAX_FILESIZE,
    CL_ENGINE_DISABLE_PE_CERTS,
    CL_ENGINE_PE_DUMPCERTS,
}

// cl_init 参数
pub const CL_INIT_DEFAULT: c_uint = 0x0;

// 扫描量的计数单位（字节）
pub const CL_COUNT_PRECISION: u64 = 4096;

// 错误码常量
pub const CL_CLEAN: cl_error_t = 0;
pub const CL_SUCCESS: cl_error_t = 0;
pub const CL_VIRUS: cl_error_t = 1;
pub const CL_ENULLARG: cl_error_t = 2;
pub const CL_EARG: cl_error_t = 3;
pub const CL_EMALFDB: cl_error_t = 4;
pub const CL_ECVD: cl_error_t = 5;
pub const CL_EVERIFY: cl_error_t = 6;
pub const CL_EUNPACK: cl_error_t = 7;
pub const CL_EOPEN: cl_error_t = 8;
pub const CL_ECREAT: cl_error_t = 9;
pub const CL_EUNLINK: cl_error_t = 10;
pub const CL_ESTAT: cl_error_t = 11;
pub const CL_EREAD: cl_error_t = 12;
pub const CL_ESEEK: cl_error_t = 13;
pub const CL_EWRITE: cl_error_t = 14;
pub const CL_EDUP: cl_error_t = 15;
pub const CL_EACCES: cl_error_t = 16;
pub const CL_ETMPFILE: cl_error_t = 17;
pub const CL_ETMPDIR: cl_error_t = 18;
pub const CL_EMAP: cl_error_t = 19;
pub const CL_EMEM: cl_error_t = 20;
pub const CL_ETIMEOUT: cl_error_t = 21;
// 仅 libclamav 内部使用
pub const CL_BREAK: cl_error_t = 22;
pub const CL_EMAXREC: cl_error_t = 23;
pub const CL_EMAXSIZE: cl_error_t = 24;
pub const CL_EMAXFILES: cl_error_t = 25;
pub const CL_EFORMAT: cl_error_t = 26;
pub const CL_EPARSE: cl_error_t = 27;
pub const CL_EBYTECODE: cl_error_t = 28;
pub const CL_EBYTECODE_TESTFAIL: cl_error_t = 29;
// c4w 错误码
pub const CL_ELOCK: cl_error_t = 30;
pub const CL_EBUSY: cl_error_t = 31;
pub const CL_ESTATE: cl_error_t = 32;
pub const CL_VERIFIED: cl_error_t = 33;
pub const CL_ERROR: cl_error_t = 34;
pub const CL_ELAST_ERROR: cl_error_t = 35;

// 扫描选项常量 - general 字段
pub const CL_SCAN_GENERAL_ALLMATCHES: u32 = 0x1;
pub const CL_SCAN_GENERAL_COLLECT_METADATA: u32 = 0x2;
pub const CL_SCAN_GENERAL_HEURISTICS: u32 = 0x4;
pub const CL_SCAN_GENERAL_HEURISTIC_PRECEDENCE: u32 = 0x8;
pub const CL_SCAN_GENERAL_UNPRIVILEGED: u32 = 0x10;

// 扫描选项常量 - parse 字段
pub const CL_SCAN_PARSE_ARCHIVE: u32 = 0x1;
pub const CL_SCAN_PARSE_ELF: u32 = 0x2;
pub const CL_SCAN_PARSE_PDF: u32 = 0x4;
pub const CL_SCAN_PARSE_SWF: u32 = 0x8;
pub const CL_SCAN_PARSE_HWP3: u32 = 0x10;
pub const CL_SCAN_PARSE_XMLDOCS: u32 = 0x20;
pub const CL_SCAN_PARSE_MAIL: u32 = 0x40;
pub const CL_SCAN_PARSE_OLE2: u32 = 0x80;
pub const CL_SCAN_PARSE_HTML: u32 = 0x100;
pub const CL_SCAN_PARSE_PE: u32 = 0x200;

// 扫描选项常量 - heuristic 字段
pub const CL_SCAN_HEURISTIC_BROKEN: u32 = 0x2;
pub const CL_SCAN_HEURISTIC_EXCEEDS_MAX: u32 = 0x4;
pub const CL_SCAN_HEURISTIC_PHISHING_SSL_MISMATCH: u32 = 0x8;
pub const CL_SCAN_HEURISTIC_PHISHING_CLOAK: u32 = 0x10;
pub const CL_SCAN_HEURISTIC_MACROS: u32 = 0x20;
pub const CL_SCAN_HEURISTIC_ENCRYPTED_ARCHIVE: u32 = 0x40;
pub const CL_SCAN_HEURISTIC_ENCRYPTED_DOC: u32 = 0x80;
pub const CL_SCAN_HEURISTIC_PARTITION_INTXN: u32 = 0x100;
pub const CL_SCAN_HEURISTIC_STRUCTURED: u32 = 0x200;
pub const CL_SCAN_HEURISTIC_STRUCTURED_SSN_NORMAL: u32 = 0x400;
pub const CL_SCAN_HEURISTIC_STRUCTURED_SSN_STRIPPED: u32 = 0x800;
pub const CL_SCAN_HEURISTIC_STRUCTURED_CC: u32 = 0x1000;
pub const CL_SCAN_HEURISTIC_BROKEN_MEDIA: u32 = 0x2000;

// 扫描选项常量 - mail / dev 字段
pub const CL_SCAN_MAIL_PARTIAL_MESSAGE: u32 = 0x1;
pub const CL_SCAN_DEV_COLLECT_SHA: u32 = 0x1;
pub const CL_SCAN_DEV_COLLECT_PERFORMANCE_INFO: u32 = 0x2;

// 数据库选项常量
pub const CL_DB_PHISHING: u32 = 0x2;
pub const CL_DB_PHISHING_URLS: u32 = 0x8;
pub const CL_DB_PUA: u32 = 0x10;
pub const CL_DB_CVDNOTMP: u32 = 0x20;
pub const CL_DB_OFFICIAL: u32 = 0x40;
pub const CL_DB_PUA_MODE: u32 = 0x80;
pub const CL_DB_PUA_INCLUDE: u32 = 0x100;
pub const CL_DB_PUA_EXCLUDE: u32 = 0x200;
pub const CL_DB_COMPILED: u32 = 0x400;
pub const CL_DB_DIRECTORY: u32 = 0x800;
pub const CL_DB_OFFICIAL_ONLY: u32 = 0x1000;
pub const CL_DB_BYTECODE: u32 = 0x2000;
pub const CL_DB_SIGNED: u32 = 0x4000;
pub const CL_DB_BYTECODE_UNSIGNED: u32 = 0x8000;
pub const CL_DB_UNSIGNED: u32 = 0x10000;
pub const CL_DB_BYTECODE_STATS: u32 = 0x20000;
pub const CL_DB_ENHANCED: u32 = 0x40000;
pub const CL_DB_PCRE_STATS: u32 = 0x80000;
pub const CL_DB_YARA_EXCLUDE: u32 = 0x100000;
pub const CL_DB_YARA_ONLY: u32 = 0x200000;
pub const CL_DB_STDOPT: u32 = CL_DB_PHISHING | CL_DB_PHISHING_URLS | CL_DB_BYTECODE;

// ============ 回调函数类型 ============

/// 文件类型识别后、扫描前调用
pub type clcb_pre_scan =
    Option<unsafe extern "C" fn(fd: c_int, file_type: *const c_char, context: *mut c_void) -> cl_error_t>;

/// 单个文件扫描完成后调用
pub type clcb_post_scan = Option<
    unsafe extern "C" fn(
        fd: c_int,
        result: c_int,
        virname: *const c_char,
        context: *mut c_void,
    ) -> cl_error_t,
>;

/// 发现病毒时调用
pub type clcb_virus_found =
    Option<unsafe extern "C" fn(fd: c_int, virname: *const c_char, context: *mut c_void)>;

// ============ FFI 函数声明 ============

#[cfg(libclamav)]
extern "C" {
    /// 初始化 ClamAV 库
    pub fn cl_init(initoptions: c_uint) -> cl_error_t;

    /// 创建新的扫描引擎
    pub fn cl_engine_new() -> *mut cl_engine;

    /// 释放扫描引擎
    pub fn cl_engine_free(engine: *mut cl_engine) -> cl_error_t;

    /// 编译扫描引擎
    pub fn cl_engine_compile(engine: *mut cl_engine) -> cl_error_t;

    /// 设置引擎数值选项
    pub fn cl_engine_set_num(engine: *mut cl_engine, field: cl_engine_field, num: i64) -> cl_error_t;

    /// 读取引擎数值选项
    pub fn cl_engine_get_num(engine: *const cl_engine, field: cl_engine_field, err: *mut c_int) -> i64;

    /// 设置引擎字符串选项
    pub fn cl_engine_set_str(
        engine: *mut cl_engine,
        field: cl_engine_field,
        str: *const c_char,
    ) -> cl_error_t;

    /// 读取引擎字符串选项
    pub fn cl_engine_get_str(
        engine: *const cl_engine,
        field: cl_engine_field,
        err: *mut c_int,
    ) -> *const c_char;

    /// 加载病毒数据库
    pub fn cl_load(
        path: *const c_char,
        engine: *mut cl_engine,
        signo: *mut c_uint,
        dboptions: c_uint,
    ) -> cl_error_t;

    /// 校验 CVD 数据库
    pub fn cl_cvdverify(file: *const c_char) -> cl_error_t;

    /// 扫描文件
    pub fn cl_scanfile(
        filename: *const c_char,
        virname: *mut *const c_char,
        scanned: *mut c_ulong,
        engine: *const cl_engine,
        scanoptions: *mut cl_scan_options,
    ) -> cl_error_t;

    /// 扫描文件（带回调上下文）
    pub fn cl_scanfile_callback(
        filename: *const c_char,
        virname: *mut *const c_char,
        scanned: *mut c_ulong,
        engine: *const cl_engine,
        scanoptions: *mut cl_scan_options,
        context: *mut c_void,
    ) -> cl_error_t;

    /// 扫描文件描述符
    pub fn cl_scandesc(
        desc: c_int,
        filename: *const c_char,
        virname: *mut *const c_char,
        scanned: *mut c_ulong,
        engine: *const cl_engine,
        scanoptions: *mut cl_scan_options,
    ) -> cl_error_t;

    /// 扫描文件描述符（带回调上下文）
    pub fn cl_scandesc_callback(
        desc: c_int,
        filename: *const c_char,
        virname: *mut *const c_char,
        scanned: *mut c_ulong,
        engine: *const cl_engine,
        scanoptions: *mut cl_scan_options,
        context: *mut c_void,
    ) -> cl_error_t;

    /// 扫描内存映射对象（带回调上下文）
    pub fn cl_scanmap_callback(
        map: *mut cl_fmap_t,
        filename: *const c_char,
        virname: *mut *const c_char,
        scanned: *mut c_ulong,
        engine: *const cl_engine,
        scanoptions: *mut cl_scan_options,
        context: *mut c_void,
    ) -> cl_error_t;

    /// 从内存创建映射对象
    pub fn cl_fmap_open_memory(start: *const c_void, len: libc::size_t) -> *mut cl_fmap_t;

    /// 释放映射对象
    pub fn cl_fmap_close(map: *mut cl_fmap_t);

    /// 错误码转文本
    pub fn cl_strerror(clerror: cl_error_t) -> *const c_char;

    /// 库版本
    pub fn cl_retver() -> *const c_char;

    /// 功能级别
    pub fn cl_retflevel() -> c_uint;

    /// 默认数据库目录
    pub fn cl_retdbdir() -> *const c_char;

    pub fn cl_engine_set_clcb_pre_scan(engine: *mut cl_engine, callback: clcb_pre_scan);
    pub fn cl_engine_set_clcb_post_scan(engine: *mut cl_engine, callback: clcb_post_scan);
    pub fn cl_engine_set_clcb_virus_found(engine: *mut cl_engine, callback: clcb_virus_found);
}
