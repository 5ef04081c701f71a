//! Embeds a human-readable version string as `BUILD_INFO_HUMAN`.
//!
//! Format: `<crate version> (<git version>) <rustc version>`. The git part is
//! `git describe --tags --dirty` when a tag exists, otherwise
//! `v<crate version>-<commit date>-<short sha>[+dirty]`. Missing tools just
//! drop their component.

use std::process::Command;

use chrono::{DateTime, Utc};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

fn main() {
    for path in ["src", "build.rs", "Cargo.toml", "Cargo.lock"] {
        println!("cargo:rerun-if-changed={path}");
    }

    let components: Vec<String> = [
        Some(env!("CARGO_PKG_VERSION").to_string()),
        git_version().map(|v| format!("({v})")),
        command_output("rustc", &["--version"]),
    ]
    .into_iter()
    .flatten()
    .collect();

    println!("cargo:rustc-env=BUILD_INFO_HUMAN={}", components.join(" "));
}

fn command_output(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn git(args: &[&str]) -> Option<String> {
    command_output("git", args)
}

/// `cargo install --git` drops a `.cargo-ok` marker into the checkout; it
/// does not make the tree dirty.
fn is_dirty() -> Option<bool> {
    git(&["status", "--porcelain"])
        .map(|status| status.lines().any(|line| line.get(3..) != Some(".cargo-ok")))
        .or_else(|| git(&["rev-parse", "--git-dir"]).map(|_| false))
}

fn git_version() -> Option<String> {
    let sha = git(&["rev-parse", "--short=12", "HEAD"])?;

    if let Some(described) = git(&["describe", "--tags", "--dirty"]) {
        return Some(described);
    }

    let dirty = is_dirty().unwrap_or(false);
    let stamp = if dirty {
        Utc::now()
    } else {
        git(&["log", "-1", "--format=%ct"])
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now)
    };
    let suffix = if dirty { "+dirty" } else { "" };

    Some(format!(
        "v{}-{}-{sha}{suffix}",
        env!("CARGO_PKG_VERSION"),
        stamp.format(TIMESTAMP_FORMAT)
    ))
}
