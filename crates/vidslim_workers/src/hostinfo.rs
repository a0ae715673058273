//! Host capability snapshot for command synthesis.
//!
//! Environment overrides win; anything not overridden is probed from
//! the platform. GPU detection walks a ladder of vendor tools and falls
//! through on any tool that is missing, fails, or prints nothing.

use std::process::Command;

use serde::Serialize;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

/// Values the deployment pins via `HOST_*` variables.
#[derive(Debug, Clone, Default)]
pub struct HostOverrides {
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub cpu_model: Option<String>,
    pub total_ram: Option<String>,
    pub gpu: Option<String>,
}

/// The snapshot stored in `system_info` and fed to the model.
#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    pub os: String,
    pub os_version: String,
    pub arch: String,
    pub cpu_model: String,
    pub total_ram: String,
    pub gpu: String,
}

/// Collect the snapshot. Blocking (vendor tools can take a moment);
/// call from `spawn_blocking` inside async workers.
pub fn collect(overrides: &HostOverrides) -> HostInfo {
    let needs_platform = overrides.os.is_none()
        || overrides.os_version.is_none()
        || overrides.cpu_model.is_none()
        || overrides.total_ram.is_none();

    let sys = needs_platform.then(|| {
        System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        )
    });

    let os = overrides
        .os
        .clone()
        .or_else(System::name)
        .unwrap_or_else(|| "unknown".to_string());
    let os_version = overrides
        .os_version
        .clone()
        .or_else(System::os_version)
        .unwrap_or_else(|| "unknown".to_string());
    let cpu_model = overrides.cpu_model.clone().unwrap_or_else(|| {
        sys.as_ref()
            .and_then(|sys| sys.cpus().first().map(|cpu| cpu.brand().trim().to_string()))
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    });
    let total_ram = overrides.total_ram.clone().unwrap_or_else(|| {
        sys.as_ref()
            .map(|sys| format!("{} MB", sys.total_memory() / (1024 * 1024)))
            .unwrap_or_else(|| "unknown".to_string())
    });
    let gpu = overrides.gpu.clone().unwrap_or_else(detect_gpu);

    HostInfo {
        os,
        os_version,
        arch: std::env::consts::ARCH.to_string(),
        cpu_model,
        total_ram,
        gpu,
    }
}

fn detect_gpu() -> String {
    if let Some(name) = run_tool("nvidia-smi", &["--query-gpu=name", "--format=csv,noheader"]) {
        if let Some(first) = first_line(&name) {
            return format!("NVIDIA GPU: {first}");
        }
    }

    if let Some(name) = run_tool("rocm-smi", &["--showproductname"]) {
        if let Some(first) = first_line(&name) {
            return format!("AMD GPU (ROCm): {first}");
        }
    }

    if let Some(vainfo) = run_tool("vainfo", &[]) {
        if vainfo.contains("VAProfile") {
            return "VAAPI available".to_string();
        }
    }

    if std::env::consts::OS == "linux" {
        if let Some(lspci) = run_tool("lspci", &[]) {
            let vga: Vec<&str> = lspci
                .lines()
                .filter(|line| line.contains("AMD") || line.contains("ATI") || line.contains("NVIDIA"))
                .collect();
            if let Some(line) = vga.first() {
                return format!("GPU via lspci: {}", line.trim());
            }
            return "no discrete GPU detected".to_string();
        }
    }

    "unknown".to_string()
}

/// Run a detection tool; `None` when it cannot be executed, exits
/// non-zero, or prints nothing.
fn run_tool(binary: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(binary).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!stdout.is_empty()).then_some(stdout)
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}
