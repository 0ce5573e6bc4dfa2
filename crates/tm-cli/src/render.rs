//! Human-readable rendering of tasks and resource samples.

use chrono::{DateTime, Local, Utc};
use tm_core::resources::ResourceSnapshot;
use tm_core::{format_duration, Task};

const NAME_WIDTH: usize = 20;
const COMMAND_WIDTH: usize = 40;

pub fn task_table(tasks: &[Task], now: DateTime<Utc>) -> String {
    let mut lines = vec![format!(
        "{:<7} {:<name$} {:<10} {:>4} {:>12}  {}",
        "ID",
        "NAME",
        "STATUS",
        "PRI",
        "DURATION",
        "COMMAND",
        name = NAME_WIDTH
    )];

    for task in tasks {
        lines.push(format!(
            "{:<7} {:<name$} {:<10} {:>4} {:>12}  {}",
            task.id,
            truncate(&task.name, NAME_WIDTH),
            task.status.as_str(),
            task.priority,
            duration(task, now),
            truncate(&task.command, COMMAND_WIDTH),
            name = NAME_WIDTH
        ));
    }
    lines.join("\n")
}

pub fn task_details(task: &Task, now: DateTime<Utc>) -> String {
    let mut lines = vec![
        format!("Task ID:     {}", task.id),
        format!("Name:        {}", task.name),
        format!("Status:      {}", task.status),
        format!("Session:     {}", task.session_handle),
        format!("Command:     {}", task.command),
        format!("Priority:    {}", task.priority),
        format!("Retries:     {}/{}", task.retry_count, task.max_retries),
    ];
    if let Some(dir) = &task.working_dir {
        lines.push(format!("Directory:   {}", dir.display()));
    }
    lines.push(format!("Created:     {}", timestamp(Some(task.created_time))));
    lines.push(format!("Started:     {}", timestamp(task.start_time)));
    lines.push(format!("Ended:       {}", timestamp(task.end_time)));
    lines.push(format!("Duration:    {}", duration(task, now)));
    if let Some(pid) = task.pid {
        lines.push(format!("PID:         {}", pid));
    }
    if let Some(code) = task.exit_code {
        lines.push(format!("Exit code:   {}", code));
    }
    if let Some(error) = &task.error_message {
        lines.push(format!("Error:       {}", error));
    }
    lines.join("\n")
}

pub fn monitor_header(task: &Task, now: DateTime<Utc>) -> String {
    format!(
        "Task {} ({}) - {} - {}\nCommand: {}",
        task.id,
        task.name,
        task.status,
        duration(task, now),
        task.command
    )
}

pub fn resource_summary(snapshot: &ResourceSnapshot) -> String {
    let mut lines = vec![
        format!(
            "CPU:    {:5.1}% of {} cores",
            snapshot.cpu.percent, snapshot.cpu.cores
        ),
        format!(
            "Memory: {:5.1}% ({} / {})",
            snapshot.memory.percent,
            human_bytes(snapshot.memory.used_bytes),
            human_bytes(snapshot.memory.total_bytes)
        ),
    ];

    if let Some(disk) = &snapshot.disk {
        lines.push(format!(
            "Disk:   {:5.1}% ({} free on {})",
            disk.percent,
            human_bytes(disk.available_bytes),
            disk.mount_point
        ));
    }

    if snapshot.gpus.is_empty() {
        lines.push("GPU:    none detected".to_string());
    }
    for gpu in &snapshot.gpus {
        let temperature = gpu
            .temperature_c
            .map(|t| format!(", {:.0}°C", t))
            .unwrap_or_default();
        lines.push(format!(
            "GPU {}:  {:5.1}% {} ({:.0} / {:.0} MiB{})",
            gpu.index,
            gpu.utilization_percent,
            gpu.name,
            gpu.memory_used_mb,
            gpu.memory_total_mb,
            temperature
        ));
    }
    lines.join("\n")
}

fn duration(task: &Task, now: DateTime<Utc>) -> String {
    task.duration(now)
        .map(format_duration)
        .unwrap_or_else(|| "-".to_string())
}

fn timestamp(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(text: &str, width: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= width {
        return single_line;
    }
    let kept: String = single_line.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
