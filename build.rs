// libclamav 链接脚本
//
// 按以下顺序查找 libclamav：
// 1. CLAMAV_LIB_DIR 环境变量指定的目录
// 2. 常见的系统库目录
//
// 找到后输出链接参数并启用 `cfg(libclamav)`；找不到时只编译纯 Rust 部分
// （错误码表、上下文注册表、配置），引擎相关模块不参与编译。

use std::path::{Path, PathBuf};

const SYSTEM_LIB_DIRS: &[&str] = &[
    "/usr/lib/x86_64-linux-gnu",
    "/usr/lib/aarch64-linux-gnu",
    "/usr/lib64",
    "/usr/lib",
    "/usr/local/lib",
    "/opt/homebrew/lib",
];

fn has_libclamav(dir: &Path) -> bool {
    // -lclamav 需要未带版本号的库文件
    ["libclamav.so", "libclamav.dylib"]
        .iter()
        .any(|name| dir.join(name).exists())
}

fn main() {
    println!("cargo:rerun-if-env-changed=CLAMAV_LIB_DIR");
    println!("cargo:rustc-check-cfg=cfg(libclamav)");

    let explicit = std::env::var_os("CLAMAV_LIB_DIR").map(PathBuf::from);
    let lib_dir = explicit
        .into_iter()
        .chain(SYSTEM_LIB_DIRS.iter().map(PathBuf::from))
        .find(|dir| has_libclamav(dir));

    match lib_dir {
        Some(dir) => {
            let dir = dir.canonicalize().unwrap_or(dir);
            println!("cargo:rustc-link-search={}", dir.display());
            println!("cargo:rustc-link-lib=clamav");
            if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("linux") {
                println!("cargo:rustc-link-arg=-Wl,-rpath,{}", dir.display());
            }
            println!("cargo:rustc-cfg=libclamav");
        }
        None => {
            println!("cargo:warning=libclamav not found; building without the native engine (set CLAMAV_LIB_DIR)");
        }
    }
}
