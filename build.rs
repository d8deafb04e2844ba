use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    for path in [".git/HEAD", ".git/index", ".git/refs/tags"] {
        println!("cargo:rerun-if-changed={}", path);
    }

    let version = match git_describe() {
        Some(tag) if !tag.ends_with("-dirty") => tag,
        Some(tag) => format!("{}-{}", tag, build_time()),
        None => format!("0.0.0-unknown-{}", build_time()),
    };

    println!("cargo:rustc-env=HOSTPOOL_VERSION={}", version);
}

/// `git describe` output with a leading `v` dropped, e.g. `v1.2.0` -> `1.2.0`.
fn git_describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|o| o.status.success())?;

    let described = String::from_utf8(output.stdout).ok()?;
    let described = described.trim();
    let version = described.strip_prefix('v').unwrap_or(described);
    (!version.is_empty()).then(|| version.to_string())
}

fn build_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
