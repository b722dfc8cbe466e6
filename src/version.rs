//! Version and build information for memsee
//!
//! The commit and compiler version are injected by `build.rs`; either falls
//! back to "unknown" when it could not be determined at build time.

/// Full version string: "memsee {version} ({commit}) rustc {rustc_version}"
pub fn version() -> String {
    format!(
        "memsee {} ({}) rustc {}",
        package_version(),
        build_commit(),
        rustc_version()
    )
}

pub fn package_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn build_commit() -> &'static str {
    option_env!("MEMSEE_COMMIT_SHA").unwrap_or("unknown")
}

pub fn rustc_version() -> &'static str {
    option_env!("MEMSEE_RUSTC_VERSION").unwrap_or("unknown")
}
