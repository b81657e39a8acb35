/// One process from the `nvidia-smi` process list, annotated with what `ps`
/// reported for its pid. The OS fields stay empty when `ps` no longer knows
/// the pid (the process exited between the two queries).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessRow {
    pub gpu_index: String,
    pub pid: String,
    pub gpu_memory_mib: u64,
    pub owner: String,
    pub cpu_percent: Option<f64>,
    pub mem_percent: Option<f64>,
    pub elapsed_time: String,
    pub command: String,
}

impl ProcessRow {
    pub fn new(gpu_index: &str, pid: &str, gpu_memory_mib: u64) -> Self {
        ProcessRow {
            gpu_index: gpu_index.to_string(),
            pid: pid.to_string(),
            gpu_memory_mib,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OwnerSummary {
    pub owner: String,
    pub total_gpu_memory_mib: u64,
    pub total_cpu_percent: f64,
    pub total_mem_percent: f64,
}

/// Totals per owner, in the order owners first appear in `rows`. Rows without
/// an owner are accounted under the empty name.
pub fn summarize_owners(rows: &[ProcessRow]) -> Vec<OwnerSummary> {
    let mut summaries: Vec<OwnerSummary> = Vec::new();

    for row in rows {
        let position = match summaries.iter().position(|s| s.owner == row.owner) {
            Some(position) => position,
            None => {
                summaries.push(OwnerSummary {
                    owner: row.owner.clone(),
                    total_gpu_memory_mib: 0,
                    total_cpu_percent: 0.0,
                    total_mem_percent: 0.0,
                });
                summaries.len() - 1
            }
        };

        let summary = &mut summaries[position];
        summary.total_gpu_memory_mib += row.gpu_memory_mib;
        summary.total_cpu_percent += round_tenths(row.cpu_percent.unwrap_or(0.0));
        summary.total_mem_percent += row.mem_percent.unwrap_or(0.0);
    }

    summaries
}

pub fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
