//! Host platform and C/C++ compiler detection.
//!
//! `bpt-build::toolchain` turns a *name* (`gcc`, `gcc-10`, `clang`, `msvc`,
//! optionally `ccache:`-prefixed) into an argv template; this crate answers
//! the question of which of those names actually has a working compiler
//! behind it on the current machine, the way `bpt build` picks a default
//! toolchain when the user hasn't named one explicitly.

use std::path::PathBuf;
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("no C/C++ compiler found on PATH (looked for: {searched})")]
    NoCompilerFound { searched: String },
    #[error("failed to execute {binary}: {source}")]
    Execution { binary: String, #[source] source: std::io::Error },
}

/// Operating system and CPU architecture of the machine running `bpt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
    pub triple: String,
}

impl PlatformInfo {
    pub fn detect() -> Self {
        let os = std::env::consts::OS.to_string();
        let arch = std::env::consts::ARCH.to_string();

        let triple = match (os.as_str(), arch.as_str()) {
            ("macos", "aarch64") => "aarch64-apple-darwin",
            ("macos", "x86_64") => "x86_64-apple-darwin",
            ("linux", "aarch64") => "aarch64-unknown-linux-gnu",
            ("linux", "x86_64") => "x86_64-unknown-linux-gnu",
            ("windows", "x86_64") => "x86_64-pc-windows-msvc",
            ("windows", "aarch64") => "aarch64-pc-windows-msvc",
            _ => "unknown",
        };

        PlatformInfo { os, arch, triple: triple.to_string() }
    }

    pub fn cache_key(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }
}

/// Which compiler family a detected binary belongs to — matches the
/// builtin toolchain keys `bpt-build::toolchain::get_builtin` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompilerFamily {
    Gcc,
    Clang,
    Msvc,
}

impl CompilerFamily {
    fn probe_names(self) -> &'static [&'static str] {
        match self {
            CompilerFamily::Gcc => {
                &["gcc", "gcc-12", "gcc-11", "gcc-10", "gcc-9", "gcc-8", "gcc-7"]
            }
            CompilerFamily::Clang => &[
                "clang", "clang-18", "clang-17", "clang-16", "clang-15", "clang-14", "clang-13",
                "clang-12",
            ],
            CompilerFamily::Msvc => &["cl.exe", "cl"],
        }
    }
}

/// A compiler binary found on `PATH`, along with the builtin toolchain key
/// that names it (e.g. `"gcc-10"`, `"clang"`, `"msvc"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedCompiler {
    pub family: CompilerFamily,
    pub toolchain_key: String,
    pub binary: PathBuf,
    pub version: Option<String>,
}

/// Probes `PATH` for every builtin toolchain key bpt knows how to turn into
/// an argv template, in priority order. Does not run the compiler beyond a
/// `--version` invocation to read off a human-readable version string.
pub fn detect_compilers() -> Vec<DetectedCompiler> {
    let families =
        [CompilerFamily::Gcc, CompilerFamily::Clang, CompilerFamily::Msvc];
    let mut found = Vec::new();
    for family in families {
        for name in family.probe_names() {
            if let Ok(binary) = which::which(name) {
                let toolchain_key = builtin_key_for(family, name);
                let version = probe_version(family, &binary);
                tracing::debug!(?family, binary = %binary.display(), version = version.as_deref().unwrap_or("unknown"), "found compiler");
                found.push(DetectedCompiler { family, toolchain_key, binary, version });
                // Only the first match per family (PATH order already
                // encodes the user's preferred version within a family).
                break;
            }
        }
    }
    found
}

fn builtin_key_for(family: CompilerFamily, probed_name: &str) -> String {
    match family {
        CompilerFamily::Msvc => "msvc".to_string(),
        CompilerFamily::Gcc | CompilerFamily::Clang => probed_name.to_string(),
    }
}

fn probe_version(family: CompilerFamily, binary: &PathBuf) -> Option<String> {
    match family {
        CompilerFamily::Msvc => {
            // cl.exe has no `--version`; it prints a banner to stderr when
            // invoked with no arguments at all, and exits non-zero.
            let output = Command::new(binary).output().ok()?;
            first_nonempty_line(&output.stderr)
        }
        CompilerFamily::Gcc | CompilerFamily::Clang => {
            let output = Command::new(binary).arg("--version").output().ok()?;
            first_nonempty_line(&output.stdout)
        }
    }
}

fn first_nonempty_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes).lines().find(|l| !l.trim().is_empty()).map(|l| l.trim().to_string())
}

/// Picks a default toolchain key for `detect_compilers`'s results: MSVC on
/// Windows when present, otherwise the first GCC or Clang found.
pub fn default_toolchain_key(platform: &PlatformInfo) -> Result<String, PlatformError> {
    let found = detect_compilers();
    let searched = || {
        [CompilerFamily::Gcc, CompilerFamily::Clang, CompilerFamily::Msvc]
            .iter()
            .flat_map(|f| f.probe_names())
            .copied()
            .collect::<Vec<_>>()
            .join(", ")
    };

    if platform.is_windows() {
        if let Some(msvc) = found.iter().find(|c| c.family == CompilerFamily::Msvc) {
            return Ok(msvc.toolchain_key.clone());
        }
    }
    found
        .into_iter()
        .find(|c| c.family != CompilerFamily::Msvc || !platform.is_windows())
        .map(|c| c.toolchain_key)
        .ok_or_else(|| {
            let searched = searched();
            tracing::warn!(%searched, "no compiler found on PATH");
            PlatformError::NoCompilerFound { searched }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_detection_fills_every_field() {
        let platform = PlatformInfo::detect();
        assert!(!platform.os.is_empty());
        assert!(!platform.arch.is_empty());
    }

    #[test]
    fn cache_key_combines_os_and_arch() {
        let platform = PlatformInfo { os: "linux".into(), arch: "x86_64".into(), triple: "x".into() };
        assert_eq!(platform.cache_key(), "linux-x86_64");
    }

    #[test]
    fn builtin_key_for_msvc_is_always_plain_msvc() {
        assert_eq!(builtin_key_for(CompilerFamily::Msvc, "cl.exe"), "msvc");
    }

    #[test]
    fn builtin_key_for_gcc_keeps_the_probed_suffix() {
        assert_eq!(builtin_key_for(CompilerFamily::Gcc, "gcc-10"), "gcc-10");
    }
}
