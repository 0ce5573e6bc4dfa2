//! Host resource sampling for display alongside the task list.

use serde::Serialize;
use std::path::Path;
use std::process::Command;
use sysinfo::{Disks, System};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuUsage {
    pub percent: f32,
    pub cores: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskUsage {
    pub mount_point: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuUsage {
    pub index: u32,
    pub name: String,
    pub utilization_percent: f64,
    pub memory_used_mb: f64,
    pub memory_total_mb: f64,
    pub temperature_c: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    pub cpu: CpuUsage,
    pub memory: MemoryUsage,
    pub disk: Option<DiskUsage>,
    pub gpus: Vec<GpuUsage>,
}

pub trait ResourceSampler {
    fn sample(&mut self) -> ResourceSnapshot;
}

/// Samples the local host through `sysinfo`, plus `nvidia-smi` for GPUs.
pub struct SystemSampler {
    system: System,
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn cpu(&mut self) -> CpuUsage {
        // Usage is a delta between two refreshes.
        self.system.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.system.refresh_cpu_usage();

        CpuUsage {
            percent: self.system.global_cpu_usage(),
            cores: self.system.cpus().len(),
        }
    }

    fn memory(&mut self) -> MemoryUsage {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        let used = self.system.used_memory();
        MemoryUsage {
            total_bytes: total,
            used_bytes: used,
            available_bytes: self.system.available_memory(),
            percent: percent(used, total),
        }
    }

    fn root_disk() -> Option<DiskUsage> {
        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))?;

        let total = disk.total_space();
        let available = disk.available_space();
        let used = total.saturating_sub(available);
        Some(DiskUsage {
            mount_point: disk.mount_point().display().to_string(),
            total_bytes: total,
            used_bytes: used,
            available_bytes: available,
            percent: percent(used, total),
        })
    }
}

impl ResourceSampler for SystemSampler {
    fn sample(&mut self) -> ResourceSnapshot {
        ResourceSnapshot {
            cpu: self.cpu(),
            memory: self.memory(),
            disk: Self::root_disk(),
            gpus: probe_gpus(),
        }
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// Query NVIDIA GPUs; hosts without `nvidia-smi` report none.
pub fn probe_gpus() -> Vec<GpuUsage> {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=index,name,utilization.gpu,memory.used,memory.total,temperature.gpu",
            "--format=csv,noheader,nounits",
        ])
        .output();

    match output {
        Ok(output) if output.status.success() => {
            parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            debug!(status = %output.status, "nvidia-smi failed");
            Vec::new()
        }
        Err(e) => {
            debug!(error = %e, "nvidia-smi not available");
            Vec::new()
        }
    }
}

fn parse_nvidia_smi(csv: &str) -> Vec<GpuUsage> {
    csv.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 5 {
                return None;
            }
            Some(GpuUsage {
                index: fields[0].parse().ok()?,
                name: fields[1].to_string(),
                utilization_percent: fields[2].parse().ok()?,
                memory_used_mb: fields[3].parse().ok()?,
                memory_total_mb: fields[4].parse().ok()?,
                temperature_c: fields.get(5).and_then(|t| t.parse().ok()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nvidia_smi() {
        let csv = "0, NVIDIA A100-SXM4-40GB, 87, 30012, 40960, 61\n1, Tesla T4, 0, 3, 15360, [N/A]\ngarbage\n";
        let gpus = parse_nvidia_smi(csv);

        assert_eq!(gpus.len(), 2);
        assert_eq!(gpus[0].name, "NVIDIA A100-SXM4-40GB");
        assert_eq!(gpus[0].utilization_percent, 87.0);
        assert_eq!(gpus[0].temperature_c, Some(61.0));
        assert_eq!(gpus[1].index, 1);
        assert_eq!(gpus[1].temperature_c, None);
    }

    #[test]
    fn test_percent_handles_zero_total() {
        assert_eq!(percent(5, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
    }

    #[test]
    fn test_system_sample_is_plausible() {
        let snapshot = SystemSampler::new().sample();
        assert!(snapshot.cpu.cores > 0);
        assert!(snapshot.memory.total_bytes > 0);
        assert!(snapshot.memory.percent <= 100.0);
    }
}
