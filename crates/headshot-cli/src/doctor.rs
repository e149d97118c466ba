//! Environment readiness check.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use headshot::document::find_chromium;
use headshot::Settings;

use crate::{output, Status};

/// Minimum free memory for a headless Chromium tab.
const MIN_MEMORY_MB: u64 = 256;

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub os: String,
    pub arch: String,
    pub chromium: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub output_dir_writable: bool,
    pub available_memory_mb: Option<u64>,
    pub allowed_domains: Vec<String>,
    pub headless: bool,
    pub ready: bool,
}

/// Gather readiness facts for `output_dir`.
pub fn check(output_dir: &Path, settings: &Settings) -> DoctorReport {
    let chromium = find_chromium();
    let output_dir_writable = dir_writable(output_dir);
    DoctorReport {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        ready: chromium.is_some() && output_dir_writable,
        chromium,
        output_dir: output_dir.to_path_buf(),
        output_dir_writable,
        available_memory_mb: get_available_memory_mb(),
        allowed_domains: settings.allowed_domains.clone(),
        headless: settings.headless,
    }
}

/// Print the readiness report.
pub async fn run(output_dir: &Path, settings: &Settings, json: bool) -> Result<Status> {
    let report = check(output_dir, settings);
    if json {
        output::print_json(&report);
        return Ok(Status::from_success(report.ready));
    }

    println!("Headshot Doctor");
    println!("===============");
    println!();
    println!("OS:   {}", report.os);
    println!("Arch: {}", report.arch);
    println!();

    match &report.chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome or set HEADSHOT_CHROMIUM_PATH."
        ),
    }

    if report.output_dir_writable {
        println!("[OK] Output directory {} is writable", output_dir.display());
    } else {
        println!("[!!] Output directory {} is not writable", output_dir.display());
    }

    match report.available_memory_mb {
        Some(mb) if mb >= MIN_MEMORY_MB => {
            println!("[OK] Available memory: {mb}MB (>= {MIN_MEMORY_MB}MB required)")
        }
        Some(mb) => println!("[!!] Available memory: {mb}MB (< {MIN_MEMORY_MB}MB, may be insufficient)"),
        None => println!("[??] Could not determine available memory"),
    }

    if report.allowed_domains.is_empty() {
        println!("[--] Address check: any host accepted");
    } else {
        println!(
            "[--] Address check: {}",
            report.allowed_domains.join(", ")
        );
    }
    println!(
        "[--] Browser mode: {}",
        if report.headless { "headless" } else { "headed" }
    );

    println!();
    if report.ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(Status::from_success(report.ready))
}

/// The directory, or its nearest existing ancestor, accepts writes.
fn dir_writable(dir: &Path) -> bool {
    let mut probe = Some(dir);
    while let Some(p) = probe {
        if p.exists() {
            return std::fs::metadata(p)
                .map(|m| m.is_dir() && !m.permissions().readonly())
                .unwrap_or(false);
        }
        probe = p.parent().filter(|parent| !parent.as_os_str().is_empty());
    }
    // A relative path with no existing component lands in the working directory.
    std::env::current_dir()
        .ok()
        .and_then(|cwd| std::fs::metadata(cwd).ok())
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

/// Available memory in MB (platform-specific).
fn get_available_memory_mb() -> Option<u64> {
    #[cfg(target_os = "macos")]
    {
        use std::process::Command;
        let output = Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        let bytes: u64 = s.trim().parse().ok()?;
        Some(bytes / 1_048_576)
    }
    #[cfg(target_os = "linux")]
    {
        use std::process::Command;
        let output = Command::new("free").args(["-m"]).output().ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        s.lines()
            .find(|line| line.starts_with("Mem:"))
            .and_then(|line| line.split_whitespace().nth(6))
            .and_then(|v| v.parse().ok())
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dir_checks_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        assert!(dir_writable(&dir.path().join("not").join("yet")));
    }

    #[test]
    fn test_report_reflects_settings() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            allowed_domains: Vec::new(),
            ..Settings::default()
        };
        let report = check(dir.path(), &settings);
        assert!(report.output_dir_writable);
        assert!(report.allowed_domains.is_empty());
        assert_eq!(report.ready, report.chromium.is_some());
    }
}
