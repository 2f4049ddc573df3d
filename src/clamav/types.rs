// ClamAV 相关类型定义
//
// 此文件定义了 FFI 层之上的类型化镜像：错误码、引擎字段、数据库选项、
// 扫描选项和扫描结果。

use std::ffi::CString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::error::{ClamAVError, Result};
use super::ffi::{self, cl_engine_field, cl_error_t, cl_scan_options};

/// 病毒名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirusName(pub String);

impl fmt::Display for VirusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============ 错误码 ============

/// libclamav 返回码的一一镜像
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// CL_CLEAN / CL_SUCCESS
    Clean,
    Virus,
    NullArg,
    Arg,
    MalformedDb,
    Cvd,
    Verify,
    Unpack,
    Open,
    Create,
    Unlink,
    Stat,
    Read,
    Seek,
    Write,
    Dup,
    Access,
    TmpFile,
    TmpDir,
    Map,
    Mem,
    Timeout,
    Break,
    MaxRecursion,
    MaxSize,
    MaxFiles,
    Format,
    Parse,
    Bytecode,
    BytecodeTestFail,
    Lock,
    Busy,
    State,
    Verified,
    Error,
    /// 表中没有的返回码
    Unknown(i32),
}

/// 错误码分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Clean,
    Virus,
    /// 参数和数据库格式错误
    Argument,
    Io,
    /// 内存、超时、锁和状态错误
    Resource,
    /// 正常情况下不会传到 libclamav 外部
    Internal,
    Verified,
    Generic,
}

impl ErrorCode {
    pub fn from_raw(code: cl_error_t) -> Self {
        match code {
            ffi::CL_CLEAN => ErrorCode::Clean,
            ffi::CL_VIRUS => ErrorCode::Virus,
            ffi::CL_ENULLARG => ErrorCode::NullArg,
            ffi::CL_EARG => ErrorCode::Arg,
            ffi::CL_EMALFDB => ErrorCode::MalformedDb,
            ffi::CL_ECVD => ErrorCode::Cvd,
            ffi::CL_EVERIFY => ErrorCode::Verify,
            ffi::CL_EUNPACK => ErrorCode::Unpack,
            ffi::CL_EOPEN => ErrorCode::Open,
            ffi::CL_ECREAT => ErrorCode::Create,
            ffi::CL_EUNLINK => ErrorCode::Unlink,
            ffi::CL_ESTAT => ErrorCode::Stat,
            ffi::CL_EREAD => ErrorCode::Read,
            ffi::CL_ESEEK => ErrorCode::Seek,
            ffi::CL_EWRITE => ErrorCode::Write,
            ffi::CL_EDUP => ErrorCode::Dup,
            ffi::CL_EACCES => ErrorCode::Access,
            ffi::CL_ETMPFILE => ErrorCode::TmpFile,
            ffi::CL_ETMPDIR => ErrorCode::TmpDir,
            ffi::CL_EMAP => ErrorCode::Map,
            ffi::CL_EMEM => ErrorCode::Mem,
            ffi::CL_ETIMEOUT => ErrorCode::Timeout,
            ffi::CL_BREAK => ErrorCode::Break,
            ffi::CL_EMAXREC => ErrorCode::MaxRecursion,
            ffi::CL_EMAXSIZE => ErrorCode::MaxSize,
            ffi::CL_EMAXFILES => ErrorCode::MaxFiles,
            ffi::CL_EFORMAT => ErrorCode::Format,
            ffi::CL_EPARSE => ErrorCode::Parse,
            ffi::CL_EBYTECODE => ErrorCode::Bytecode,
            ffi::CL_EBYTECODE_TESTFAIL => ErrorCode::BytecodeTestFail,
            ffi::CL_ELOCK => ErrorCode::Lock,
            ffi::CL_EBUSY => ErrorCode::Busy,
            ffi::CL_ESTATE => ErrorCode::State,
            ffi::CL_VERIFIED => ErrorCode::Verified,
            ffi::CL_ERROR => ErrorCode::Error,
            other => ErrorCode::Unknown(other),
        }
    }

    pub fn as_raw(self) -> cl_error_t {
        match self {
            ErrorCode::Clean => ffi::CL_CLEAN,
            ErrorCode::Virus => ffi::CL_VIRUS,
            ErrorCode::NullArg => ffi::CL_ENULLARG,
            ErrorCode::Arg => ffi::CL_EARG,
            ErrorCode::MalformedDb => ffi::CL_EMALFDB,
            ErrorCode::Cvd => ffi::CL_ECVD,
            ErrorCode::Verify => ffi::CL_EVERIFY,
            ErrorCode::Unpack => ffi::CL_EUNPACK,
            ErrorCode::Open => ffi::CL_EOPEN,
            ErrorCode::Create => ffi::CL_ECREAT,
            ErrorCode::Unlink => ffi::CL_EUNLINK,
            ErrorCode::Stat => ffi::CL_ESTAT,
            ErrorCode::Read => ffi::CL_EREAD,
            ErrorCode::Seek => ffi::CL_ESEEK,
            ErrorCode::Write => ffi::CL_EWRITE,
            ErrorCode::Dup => ffi::CL_EDUP,
            ErrorCode::Access => ffi::CL_EACCES,
            ErrorCode::TmpFile => ffi::CL_ETMPFILE,
            ErrorCode::TmpDir => ffi::CL_ETMPDIR,
            ErrorCode::Map => ffi::CL_EMAP,
            ErrorCode::Mem => ffi::CL_EMEM,
            ErrorCode::Timeout => ffi::CL_ETIMEOUT,
            ErrorCode::Break => ffi::CL_BREAK,
            ErrorCode::MaxRecursion => ffi::CL_EMAXREC,
            ErrorCode::MaxSize => ffi::CL_EMAXSIZE,
            ErrorCode::MaxFiles => ffi::CL_EMAXFILES,
            ErrorCode::Format => ffi::CL_EFORMAT,
            ErrorCode::Parse => ffi::CL_EPARSE,
            ErrorCode::Bytecode => ffi::CL_EBYTECODE,
            ErrorCode::BytecodeTestFail => ffi::CL_EBYTECODE_TESTFAIL,
            ErrorCode::Lock => ffi::CL_ELOCK,
            ErrorCode::Busy => ffi::CL_EBUSY,
            ErrorCode::State => ffi::CL_ESTATE,
            ErrorCode::Verified => ffi::CL_VERIFIED,
            ErrorCode::Error => ffi::CL_ERROR,
            ErrorCode::Unknown(code) => code,
        }
    }

    pub fn category(self) -> ErrorCategory {
        use ErrorCode::*;
        match self {
            Clean => ErrorCategory::Clean,
            Virus => ErrorCategory::Virus,
            NullArg | Arg | MalformedDb | Cvd | Verify | Unpack => ErrorCategory::Argument,
            Open | Create | Unlink | Stat | Read | Seek | Write | Dup | Access | TmpFile
            | TmpDir | Map => ErrorCategory::Io,
            Mem | Timeout | Lock | Busy | State => ErrorCategory::Resource,
            Break | MaxRecursion | MaxSize | MaxFiles | Format | Parse | Bytecode
            | BytecodeTestFail => ErrorCategory::Internal,
            Verified => ErrorCategory::Verified,
            Error | Unknown(_) => ErrorCategory::Generic,
        }
    }

    pub fn is_success(self) -> bool {
        self == ErrorCode::Clean
    }

    /// 与 cl_strerror 相同的描述文本
    pub fn message(self) -> &'static str {
        use ErrorCode::*;
        match self {
            Clean => "No viruses detected",
            Virus => "Virus(es) detected",
            NullArg => "Null argument passed to function",
            Arg => "Invalid argument passed to function",
            MalformedDb => "Malformed database",
            Cvd => "Broken or not a CVD file",
            Verify => "Can't verify database integrity",
            Unpack => "Can't unpack some data",
            Open => "Can't open file or directory",
            Create => "Can't create new file",
            Unlink => "Can't unlink file",
            Stat => "Can't get file status",
            Read => "Can't read file",
            Seek => "Can't set file offset",
            Write => "Can't write to file",
            Dup => "Can't duplicate file descriptor",
            Access => "Can't access file",
            TmpFile => "Can't create temporary file",
            TmpDir => "Can't create temporary directory",
            Map => "Can't map file into memory",
            Mem => "Can't allocate memory",
            Timeout => "Exceeded time limit",
            Break => "Process aborted",
            MaxRecursion => "CL_EMAXREC",
            MaxSize => "CL_EMAXSIZE",
            MaxFiles => "CL_EMAXFILES",
            Format => "CL_EFORMAT: Bad format or broken data",
            Parse => "CL_EPARSE",
            Bytecode => "Error during bytecode execution",
            BytecodeTestFail => "Failure in bytecode testmode",
            Lock => "Mutex lock failed",
            Busy => "Scanner still active",
            State => "Bad state (engine not initialized, or already initialized)",
            Verified => "The scanned object was verified and deemed trusted",
            Error => "Unspecified error",
            Unknown(_) => "Unknown error code",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Unknown(code) => write!(f, "{} ({})", self.message(), code),
            _ => f.write_str(self.message()),
        }
    }
}

// ============ 引擎字段 ============

/// 引擎字段的取值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U32,
    U64,
    /// time_t
    Time,
    Str,
}

/// 引擎配置字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineField {
    MaxScanSize,
    MaxFileSize,
    MaxRecursion,
    MaxFiles,
    MinCcCount,
    MinSsnCount,
    PuaCategories,
    DbOptions,
    DbVersion,
    DbTime,
    AcOnly,
    AcMinDepth,
    AcMaxDepth,
    TmpDir,
    KeepTmp,
    BytecodeSecurity,
    BytecodeTimeout,
    BytecodeMode,
    MaxEmbeddedPe,
    MaxHtmlNormalize,
    MaxHtmlNoTags,
    MaxScriptNormalize,
    MaxZipTypeRcg,
    ForceToDisk,
    CacheSize,
    DisableCache,
    DisablePeStats,
    StatsTimeout,
    MaxPartitions,
    MaxIconsPe,
    MaxRecHwp3,
    MaxScanTime,
    PcreMatchLimit,
    PcreRecMatchLimit,
    PcreMaxFileSize,
    DisablePeCerts,
    PeDumpCerts,
}

impl EngineField {
    pub fn as_raw(self) -> cl_engine_field {
        use cl_engine_field::*;
        match self {
            EngineField::MaxScanSize => CL_ENGINE_MAX_SCANSIZE,
            EngineField::MaxFileSize => CL_ENGINE_MAX_FILESIZE,
            EngineField::MaxRecursion => CL_ENGINE_MAX_RECURSION,
            EngineField::MaxFiles => CL_ENGINE_MAX_FILES,
            EngineField::MinCcCount => CL_ENGINE_MIN_CC_COUNT,
            EngineField::MinSsnCount => CL_ENGINE_MIN_SSN_COUNT,
            EngineField::PuaCategories => CL_ENGINE_PUA_CATEGORIES,
            EngineField::DbOptions => CL_ENGINE_DB_OPTIONS,
            EngineField::DbVersion => CL_ENGINE_DB_VERSION,
            EngineField::DbTime => CL_ENGINE_DB_TIME,
            EngineField::AcOnly => CL_ENGINE_AC_ONLY,
            EngineField::AcMinDepth => CL_ENGINE_AC_MINDEPTH,
            EngineField::AcMaxDepth => CL_ENGINE_AC_MAXDEPTH,
            EngineField::TmpDir => CL_ENGINE_TMPDIR,
            EngineField::KeepTmp => CL_ENGINE_KEEPTMP,
            EngineField::BytecodeSecurity => CL_ENGINE_BYTECODE_SECURITY,
            EngineField::BytecodeTimeout => CL_ENGINE_BYTECODE_TIMEOUT,
            EngineField::BytecodeMode => CL_ENGINE_BYTECODE_MODE,
            EngineField::MaxEmbeddedPe => CL_ENGINE_MAX_EMBEDDEDPE,
            EngineField::MaxHtmlNormalize => CL_ENGINE_MAX_HTMLNORMALIZE,
            EngineField::MaxHtmlNoTags => CL_ENGINE_MAX_HTMLNOTAGS,
            EngineField::MaxScriptNormalize => CL_ENGINE_MAX_SCRIPTNORMALIZE,
            EngineField::MaxZipTypeRcg => CL_ENGINE_MAX_ZIPTYPERCG,
            EngineField::ForceToDisk => CL_ENGINE_FORCETODISK,
            EngineField::CacheSize => CL_ENGINE_CACHE_SIZE,
            EngineField::DisableCache => CL_ENGINE_DISABLE_CACHE,
            EngineField::DisablePeStats => CL_ENGINE_DISABLE_PE_STATS,
            EngineField::StatsTimeout => CL_ENGINE_STATS_TIMEOUT,
            EngineField::MaxPartitions => CL_ENGINE_MAX_PARTITIONS,
            EngineField::MaxIconsPe => CL_ENGINE_MAX_ICONSPE,
            EngineField::MaxRecHwp3 => CL_ENGINE_MAX_RECHWP3,
            EngineField::MaxScanTime => CL_ENGINE_MAX_SCANTIME,
            EngineField::PcreMatchLimit => CL_ENGINE_PCRE_MATCH_LIMIT,
            EngineField::PcreRecMatchLimit => CL_ENGINE_PCRE_RECMATCH_LIMIT,
            EngineField::PcreMaxFileSize => CL_ENGINE_PCRE_MAX_FILESIZE,
            EngineField::DisablePeCerts => CL_ENGINE_DISABLE_PE_CERTS,
            EngineField::PeDumpCerts => CL_ENGINE_PE_DUMPCERTS,
        }
    }

    pub fn kind(self) -> FieldKind {
        use EngineField::*;
        match self {
            PuaCategories | TmpDir => FieldKind::Str,
            DbTime => FieldKind::Time,
            MaxScanSize | MaxFileSize | MaxEmbeddedPe | MaxHtmlNormalize | MaxHtmlNoTags
            | MaxScriptNormalize | MaxZipTypeRcg | PcreMatchLimit | PcreRecMatchLimit
            | PcreMaxFileSize => FieldKind::U64,
            _ => FieldKind::U32,
        }
    }

    pub fn is_numeric(self) -> bool {
        self.kind() != FieldKind::Str
    }

    /// C 枚举名，用于日志和错误信息
    pub fn name(self) -> &'static str {
        use cl_engine_field::*;
        match self.as_raw() {
            CL_ENGINE_MAX_SCANSIZE => "CL_ENGINE_MAX_SCANSIZE",
            CL_ENGINE_MAX_FILESIZE => "CL_ENGINE_MAX_FILESIZE",
            CL_ENGINE_MAX_RECURSION => "CL_ENGINE_MAX_RECURSION",
            CL_ENGINE_MAX_FILES => "CL_ENGINE_MAX_FILES",
            CL_ENGINE_MIN_CC_COUNT => "CL_ENGINE_MIN_CC_COUNT",
            CL_ENGINE_MIN_SSN_COUNT => "CL_ENGINE_MIN_SSN_COUNT",
            CL_ENGINE_PUA_CATEGORIES => "CL_ENGINE_PUA_CATEGORIES",
            CL_ENGINE_DB_OPTIONS => "CL_ENGINE_DB_OPTIONS",
            CL_ENGINE_DB_VERSION => "CL_ENGINE_DB_VERSION",
            CL_ENGINE_DB_TIME => "CL_ENGINE_DB_TIME",
            CL_ENGINE_AC_ONLY => "CL_ENGINE_AC_ONLY",
            CL_ENGINE_AC_MINDEPTH => "CL_ENGINE_AC_MINDEPTH",
            CL_ENGINE_AC_MAXDEPTH => "CL_ENGINE_AC_MAXDEPTH",
            CL_ENGINE_TMPDIR => "CL_ENGINE_TMPDIR",
            CL_ENGINE_KEEPTMP => "CL_ENGINE_KEEPTMP",
            CL_ENGINE_BYTECODE_SECURITY => "CL_ENGINE_BYTECODE_SECURITY",
            CL_ENGINE_BYTECODE_TIMEOUT => "CL_ENGINE_BYTECODE_TIMEOUT",
            CL_ENGINE_BYTECODE_MODE => "CL_ENGINE_BYTECODE_MODE",
            CL_ENGINE_MAX_EMBEDDEDPE => "CL_ENGINE_MAX_EMBEDDEDPE",
            CL_ENGINE_MAX_HTMLNORMALIZE => "CL_ENGINE_MAX_HTMLNORMALIZE",
            CL_ENGINE_MAX_HTMLNOTAGS => "CL_ENGINE_MAX_HTMLNOTAGS",
            CL_ENGINE_MAX_SCRIPTNORMALIZE => "CL_ENGINE_MAX_SCRIPTNORMALIZE",
            CL_ENGINE_MAX_ZIPTYPERCG => "CL_ENGINE_MAX_ZIPTYPERCG",
            CL_ENGINE_FORCETODISK => "CL_ENGINE_FORCETODISK",
            CL_ENGINE_CACHE_SIZE => "CL_ENGINE_CACHE_SIZE",
            CL_ENGINE_DISABLE_CACHE => "CL_ENGINE_DISABLE_CACHE",
            CL_ENGINE_DISABLE_PE_STATS => "CL_ENGINE_DISABLE_PE_STATS",
            CL_ENGINE_STATS_TIMEOUT => "CL_ENGINE_STATS_TIMEOUT",
            CL_ENGINE_MAX_PARTITIONS => "CL_ENGINE_MAX_PARTITIONS",
            CL_ENGINE_MAX_ICONSPE => "CL_ENGINE_MAX_ICONSPE",
            CL_ENGINE_MAX_RECHWP3 => "CL_ENGINE_MAX_RECHWP3",
            CL_ENGINE_MAX_SCANTIME => "CL_ENGINE_MAX_SCANTIME",
            CL_ENGINE_PCRE_MATCH_LIMIT => "CL_ENGINE_PCRE_MATCH_LIMIT",
            CL_ENGINE_PCRE_RECMATCH_LIMIT => "CL_ENGINE_PCRE_RECMATCH_LIMIT",
            CL_ENGINE_PCRE_MAX_FILESIZE => "CL_ENGINE_PCRE_MAX_FILESIZE",
            CL_ENGINE_DISABLE_PE_CERTS => "CL_ENGINE_DISABLE_PE_CERTS",
            CL_ENGINE_PE_DUMPCERTS => "CL_ENGINE_PE_DUMPCERTS",
        }
    }
}

impl fmt::Display for EngineField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============ 数据库和扫描选项 ============

bitflags! {
    /// cl_load 的数据库选项
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DbOptions: u32 {
        const PHISHING = ffi::CL_DB_PHISHING;
        const PHISHING_URLS = ffi::CL_DB_PHISHING_URLS;
        const PUA = ffi::CL_DB_PUA;
        const CVDNOTMP = ffi::CL_DB_CVDNOTMP;
        const OFFICIAL = ffi::CL_DB_OFFICIAL;
        const PUA_MODE = ffi::CL_DB_PUA_MODE;
        const PUA_INCLUDE = ffi::CL_DB_PUA_INCLUDE;
        const PUA_EXCLUDE = ffi::CL_DB_PUA_EXCLUDE;
        const COMPILED = ffi::CL_DB_COMPILED;
        const DIRECTORY = ffi::CL_DB_DIRECTORY;
        const OFFICIAL_ONLY = ffi::CL_DB_OFFICIAL_ONLY;
        const BYTECODE = ffi::CL_DB_BYTECODE;
        const SIGNED = ffi::CL_DB_SIGNED;
        /// 不要加载来源不可信的 bytecode 签名
        const BYTECODE_UNSIGNED = ffi::CL_DB_BYTECODE_UNSIGNED;
        const UNSIGNED = ffi::CL_DB_UNSIGNED;
        const BYTECODE_STATS = ffi::CL_DB_BYTECODE_STATS;
        const ENHANCED = ffi::CL_DB_ENHANCED;
        const PCRE_STATS = ffi::CL_DB_PCRE_STATS;
        const YARA_EXCLUDE = ffi::CL_DB_YARA_EXCLUDE;
        const YARA_ONLY = ffi::CL_DB_YARA_ONLY;

        const STDOPT = ffi::CL_DB_STDOPT;
    }
}

impl Default for DbOptions {
    fn default() -> Self {
        DbOptions::STDOPT
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct GeneralFlags: u32 {
        const ALLMATCHES = ffi::CL_SCAN_GENERAL_ALLMATCHES;
        const COLLECT_METADATA = ffi::CL_SCAN_GENERAL_COLLECT_METADATA;
        const HEURISTICS = ffi::CL_SCAN_GENERAL_HEURISTICS;
        const HEURISTIC_PRECEDENCE = ffi::CL_SCAN_GENERAL_HEURISTIC_PRECEDENCE;
        const UNPRIVILEGED = ffi::CL_SCAN_GENERAL_UNPRIVILEGED;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ParseFlags: u32 {
        const ARCHIVE = ffi::CL_SCAN_PARSE_ARCHIVE;
        const ELF = ffi::CL_SCAN_PARSE_ELF;
        const PDF = ffi::CL_SCAN_PARSE_PDF;
        const SWF = ffi::CL_SCAN_PARSE_SWF;
        const HWP3 = ffi::CL_SCAN_PARSE_HWP3;
        const XMLDOCS = ffi::CL_SCAN_PARSE_XMLDOCS;
        const MAIL = ffi::CL_SCAN_PARSE_MAIL;
        const OLE2 = ffi::CL_SCAN_PARSE_OLE2;
        const HTML = ffi::CL_SCAN_PARSE_HTML;
        const PE = ffi::CL_SCAN_PARSE_PE;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct HeuristicFlags: u32 {
        const BROKEN = ffi::CL_SCAN_HEURISTIC_BROKEN;
        const EXCEEDS_MAX = ffi::CL_SCAN_HEURISTIC_EXCEEDS_MAX;
        const PHISHING_SSL_MISMATCH = ffi::CL_SCAN_HEURISTIC_PHISHING_SSL_MISMATCH;
        const PHISHING_CLOAK = ffi::CL_SCAN_HEURISTIC_PHISHING_CLOAK;
        const MACROS = ffi::CL_SCAN_HEURISTIC_MACROS;
        const ENCRYPTED_ARCHIVE = ffi::CL_SCAN_HEURISTIC_ENCRYPTED_ARCHIVE;
        const ENCRYPTED_DOC = ffi::CL_SCAN_HEURISTIC_ENCRYPTED_DOC;
        const PARTITION_INTXN = ffi::CL_SCAN_HEURISTIC_PARTITION_INTXN;
        const STRUCTURED = ffi::CL_SCAN_HEURISTIC_STRUCTURED;
        const STRUCTURED_SSN_NORMAL = ffi::CL_SCAN_HEURISTIC_STRUCTURED_SSN_NORMAL;
        const STRUCTURED_SSN_STRIPPED = ffi::CL_SCAN_HEURISTIC_STRUCTURED_SSN_STRIPPED;
        const STRUCTURED_CC = ffi::CL_SCAN_HEURISTIC_STRUCTURED_CC;
        const BROKEN_MEDIA = ffi::CL_SCAN_HEURISTIC_BROKEN_MEDIA;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct MailFlags: u32 {
        const PARTIAL_MESSAGE = ffi::CL_SCAN_MAIL_PARTIAL_MESSAGE;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DevFlags: u32 {
        const COLLECT_SHA = ffi::CL_SCAN_DEV_COLLECT_SHA;
        const COLLECT_PERFORMANCE_INFO = ffi::CL_SCAN_DEV_COLLECT_PERFORMANCE_INFO;
    }
}

/// ClamAV 扫描选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    pub general: GeneralFlags,
    pub parse: ParseFlags,
    pub heuristic: HeuristicFlags,
    pub mail: MailFlags,
    pub dev: DevFlags,
}

impl ScanOptions {
    /// 只设置解析器，其他字段为空
    pub fn with_parse(parse: ParseFlags) -> Self {
        Self {
            parse,
            ..Default::default()
        }
    }

    /// 启用全部解析器和启发式检测
    pub fn all_parsers() -> Self {
        Self {
            general: GeneralFlags::HEURISTICS,
            parse: ParseFlags::all(),
            ..Default::default()
        }
    }

    pub fn to_raw(&self) -> cl_scan_options {
        cl_scan_options {
            general: self.general.bits(),
            parse: self.parse.bits(),
            heuristic: self.heuristic.bits(),
            mail: self.mail.bits(),
            dev: self.dev.bits(),
        }
    }
}

// ============ 扫描结果 ============

/// 单次扫描的结论；检测到病毒不算错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Clean,
    Detected(VirusName),
}

impl ScanOutcome {
    pub fn is_detected(&self) -> bool {
        matches!(self, ScanOutcome::Detected(_))
    }

    pub fn virus_name(&self) -> Option<&str> {
        match self {
            ScanOutcome::Detected(name) => Some(&name.0),
            ScanOutcome::Clean => None,
        }
    }
}

/// 扫描报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// libclamav 报告的扫描量，原样转发
    ///
    /// 单位是 `CL_COUNT_PRECISION`（4096 字节）的块，不是字节；
    /// 换算见 [`ScanReport::approx_bytes`]。
    pub scanned: u64,
    pub outcome: ScanOutcome,
}

impl ScanReport {
    /// 把原生返回码转换为扫描报告
    ///
    /// CL_CLEAN 和 CL_VERIFIED 视为干净，CL_VIRUS 视为检测到病毒，
    /// 其余返回码作为错误返回。
    pub fn from_native(
        op: &'static str,
        ret: cl_error_t,
        virname: Option<String>,
        scanned: u64,
    ) -> Result<Self> {
        match ErrorCode::from_raw(ret) {
            ErrorCode::Clean | ErrorCode::Verified => Ok(Self {
                scanned,
                outcome: ScanOutcome::Clean,
            }),
            ErrorCode::Virus => {
                let name = virname
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| "Unknown".to_string());
                Ok(Self {
                    scanned,
                    outcome: ScanOutcome::Detected(VirusName(name)),
                })
            }
            code => Err(ClamAVError::native(op, code)),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.outcome == ScanOutcome::Clean
    }

    /// 按计数单位换算的大致字节数
    pub fn approx_bytes(&self) -> u64 {
        self.scanned.saturating_mul(ffi::CL_COUNT_PRECISION)
    }
}

// ============ 路径 ============

/// 已确认存在的数据库路径（文件或目录）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabasePath(PathBuf);

impl DatabasePath {
    /// 路径不存在时返回 PathNotFound，不会触达原生加载函数；
    /// 其他 stat 失败（如权限不足）作为 Io 错误返回
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::metadata(path) {
            Ok(_) => Ok(Self(path.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ClamAVError::PathNotFound(path.to_path_buf()))
            }
            Err(e) => Err(ClamAVError::Io(e)),
        }
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn to_cstring(&self) -> Result<CString> {
        c_path(&self.0)
    }
}

pub(crate) fn c_path(path: &Path) -> Result<CString> {
    c_string(&path.to_string_lossy())
}

pub(crate) fn c_string(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| ClamAVError::InvalidCString(s.to_string()))
}

// ============ 引擎状态 ============

/// 引擎状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Error(String),
}

impl EngineState {
    pub fn is_ready(&self) -> bool {
        matches!(self, EngineState::Ready)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Uninitialized => write!(f, "uninitialized"),
            EngineState::Initializing => write!(f, "initializing"),
            EngineState::Ready => write!(f, "ready"),
            EngineState::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_round_trip() {
        for raw in 0..ffi::CL_ELAST_ERROR {
            let code = ErrorCode::from_raw(raw);
            assert_ne!(code, ErrorCode::Unknown(raw), "code {} not mapped", raw);
            assert_eq!(code.as_raw(), raw);
        }
        assert_eq!(ErrorCode::from_raw(ffi::CL_ELAST_ERROR), ErrorCode::Unknown(35));
        assert_eq!(ErrorCode::from_raw(-1).as_raw(), -1);
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(ErrorCode::Clean.category(), ErrorCategory::Clean);
        assert_eq!(ErrorCode::Virus.category(), ErrorCategory::Virus);
        assert_eq!(ErrorCode::MalformedDb.category(), ErrorCategory::Argument);
        assert_eq!(ErrorCode::Seek.category(), ErrorCategory::Io);
        assert_eq!(ErrorCode::TmpFile.category(), ErrorCategory::Io);
        assert_eq!(ErrorCode::Timeout.category(), ErrorCategory::Resource);
        assert_eq!(ErrorCode::Busy.category(), ErrorCategory::Resource);
        assert_eq!(ErrorCode::MaxRecursion.category(), ErrorCategory::Internal);
        assert_eq!(ErrorCode::BytecodeTestFail.category(), ErrorCategory::Internal);
        assert_eq!(ErrorCode::Verified.category(), ErrorCategory::Verified);
        assert_eq!(ErrorCode::Unknown(99).category(), ErrorCategory::Generic);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::Virus.to_string(), "Virus(es) detected");
        assert_eq!(ErrorCode::Open.to_string(), "Can't open file or directory");
        assert_eq!(ErrorCode::Unknown(99).to_string(), "Unknown error code (99)");
    }

    #[test]
    fn test_report_clean() {
        let report = ScanReport::from_native("cl_scanfile", ffi::CL_CLEAN, None, 12).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.scanned, 12);
        assert_eq!(report.approx_bytes(), 12 * 4096);
        assert_eq!(report.outcome.virus_name(), None);
    }

    #[test]
    fn test_report_detected_keeps_count_and_name() {
        let report = ScanReport::from_native(
            "cl_scanfile",
            ffi::CL_VIRUS,
            Some("Eicar-Test-Signature".to_string()),
            42,
        )
        .unwrap();
        assert!(report.outcome.is_detected());
        assert_eq!(report.outcome.virus_name(), Some("Eicar-Test-Signature"));
        assert_eq!(report.scanned, 42);
    }

    #[test]
    fn test_report_detected_without_name() {
        let report = ScanReport::from_native("cl_scandesc", ffi::CL_VIRUS, None, 0).unwrap();
        assert_eq!(report.outcome.virus_name(), Some("Unknown"));
    }

    #[test]
    fn test_report_error() {
        let err = ScanReport::from_native("cl_scanfile", ffi::CL_EOPEN, None, 7).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Open));
        assert_eq!(err.to_string(), "cl_scanfile failed: Can't open file or directory");
    }

    #[test]
    fn test_database_path_missing() {
        let err = DatabasePath::new("/definitely/not/here.cvd").unwrap_err();
        assert!(matches!(err, ClamAVError::PathNotFound(_)));
        assert_eq!(err.to_string(), "db /definitely/not/here.cvd is not exists!");
    }

    // 父路径是普通文件：stat 返回 ENOTDIR，不是“不存在”
    #[cfg(unix)]
    #[test]
    fn test_database_path_stat_error_is_not_missing() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = DatabasePath::new(file.path().join("main.cvd")).unwrap_err();
        assert!(matches!(err, ClamAVError::Io(_)), "unexpected error: {}", err);
    }

    #[test]
    fn test_database_path_existing() {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabasePath::new(dir.path()).unwrap();
        assert_eq!(db.as_path(), dir.path());
        assert!(db.to_cstring().is_ok());
    }

    #[test]
    fn test_field_kinds() {
        assert_eq!(EngineField::TmpDir.kind(), FieldKind::Str);
        assert_eq!(EngineField::PuaCategories.kind(), FieldKind::Str);
        assert_eq!(EngineField::MaxScanSize.kind(), FieldKind::U64);
        assert_eq!(EngineField::MaxScanTime.kind(), FieldKind::U32);
        assert_eq!(EngineField::DbTime.kind(), FieldKind::Time);
        assert_eq!(EngineField::PeDumpCerts.as_raw() as i32, 36);
        assert_eq!(EngineField::MaxScanTime.to_string(), "CL_ENGINE_MAX_SCANTIME");
    }

    #[test]
    fn test_scan_options_to_raw() {
        let opts = ScanOptions::with_parse(ParseFlags::ARCHIVE | ParseFlags::ELF);
        let raw = opts.to_raw();
        assert_eq!(raw.parse, 0x3);
        assert_eq!(raw.general, 0);
        assert_eq!(ScanOptions::all_parsers().to_raw().parse, 0x3ff);
    }

    #[test]
    fn test_db_options_default() {
        let opts = DbOptions::default();
        assert!(opts.contains(DbOptions::PHISHING | DbOptions::BYTECODE));
        assert_eq!(opts.bits(), 0x200a);
    }

    #[test]
    fn test_engine_state_display() {
        assert_eq!(EngineState::Ready.to_string(), "ready");
        assert_eq!(EngineState::Error("boom".into()).to_string(), "error: boom");
        assert!(!EngineState::Uninitialized.is_ready());
    }
}
