//! Embeds the git commit and compiler version shown by `memsee --version`.

use std::env;
use std::process::Command;

/// First line of a command's stdout, if it ran and succeeded.
fn first_line(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    text.lines().next().map(|line| line.trim().to_string())
}

fn main() {
    let commit = env::var("MEMSEE_COMMIT_SHA")
        .ok()
        .or_else(|| first_line("git", &["rev-parse", "--short", "HEAD"]))
        .unwrap_or_else(|| "unknown".to_string());

    // "rustc 1.80.0 (051478957 2024-07-21)" -> "1.80.0"
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let rustc_version = first_line(&rustc, &["--version"])
        .and_then(|line| line.split_whitespace().nth(1).map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=MEMSEE_COMMIT_SHA={}", commit);
    println!("cargo:rustc-env=MEMSEE_RUSTC_VERSION={}", rustc_version);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-env-changed=MEMSEE_COMMIT_SHA");
}
