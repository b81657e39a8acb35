use crossterm::style::Color;
use lazy_static::lazy_static;
use regex::Regex;

pub const MEMORY_FREE_RATIO: f64 = 0.05;
pub const MEMORY_MODERATE_RATIO: f64 = 0.9;
pub const GPU_FREE_RATIO: f64 = 0.05;
pub const GPU_MODERATE_RATIO: f64 = 0.75;

lazy_static! {
    // `| N/A   34C    P0    61W / 400W |  35000MiB / 40960MiB |   82%   Default |`
    static ref UTILIZATION_ROW: Regex = Regex::new(
        r"^\| (?:N/A|..%)\s+[0-9]{2,3}C.*\s([0-9]+)MiB\s+/\s+([0-9]+)MiB.*\s([0-9]+)%"
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Load {
    Free,
    Moderate,
    High,
}

impl Load {
    pub fn classify(gpu_ratio: f64, memory_ratio: f64) -> Self {
        if gpu_ratio >= GPU_MODERATE_RATIO || memory_ratio >= MEMORY_MODERATE_RATIO {
            Load::High
        } else if gpu_ratio >= GPU_FREE_RATIO || memory_ratio >= MEMORY_FREE_RATIO {
            Load::Moderate
        } else {
            Load::Free
        }
    }

    pub fn color(self) -> Color {
        match self {
            Load::Free => Color::Green,
            Load::Moderate => Color::Yellow,
            Load::High => Color::Red,
        }
    }
}

/// Load of the GPU described by a per-GPU utilization row, if `line` is one.
pub fn utilization_load(line: &str) -> Option<Load> {
    let caps = UTILIZATION_ROW.captures(line)?;
    let used: f64 = caps[1].parse().ok()?;
    let total: f64 = caps[2].parse().ok()?;
    let gpu_percent: f64 = caps[3].parse().ok()?;

    let memory_ratio = if total > 0.0 { used / total } else { 0.0 };
    Some(Load::classify(gpu_percent / 100.0, memory_ratio))
}

/// Per-line load for the passthrough section. A utilization row also tints
/// the line above it, which names the GPU.
pub fn line_loads(lines: &[String]) -> Vec<Option<Load>> {
    let mut loads = vec![None; lines.len()];
    for (index, line) in lines.iter().enumerate() {
        if let Some(load) = utilization_load(line) {
            loads[index] = Some(load);
            if index > 0 {
                loads[index - 1] = Some(load);
            }
        }
    }
    loads
}
