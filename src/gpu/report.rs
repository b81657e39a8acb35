//! Splitting an `nvidia-smi` report into the utilization part, which is
//! printed as is, and the process list, which gets parsed row by row.

use crate::error::{Error, Result};
use crate::gpu::process::ProcessRow;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

const PROCESSES_HEADER: &str = "| Processes:";
const SUB_HEADER_END: &str = "|====";
const SECTION_END: &str = "+--";
const NOT_SUPPORTED: &str = "Not Supported";
pub const NO_RUNNING_PROCESSES: &str = "No running processes found";

lazy_static! {
    static ref MIG_COLUMNS: Regex = Regex::new(r"GPU\s*GI\s*CI").unwrap();
}

/// Column positions of one `nvidia-smi` process-list flavour.
pub trait ProcessLayout: Sync {
    fn name(&self) -> &'static str;

    /// Whether a line of the process-list sub-header identifies this layout.
    fn matches_header(&self, line: &str) -> bool;

    /// Token index of the pid, counting the leading `|` as token 0.
    fn pid_column(&self) -> usize;

    fn gpu_column(&self) -> usize {
        1
    }

    fn parse_row(&self, line: &str) -> Result<ProcessRow> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let gpu_index = tokens
            .get(self.gpu_column())
            .ok_or_else(|| Error::malformed_row(line, "missing GPU index"))?;
        let pid = tokens
            .get(self.pid_column())
            .ok_or_else(|| Error::malformed_row(line, "missing pid"))?;
        // Usage is the last cell, right before the closing `|`.
        let usage = tokens
            .iter()
            .rev()
            .nth(1)
            .filter(|_| tokens.len() > self.pid_column() + 1)
            .ok_or_else(|| Error::malformed_row(line, "missing GPU memory"))?;
        let gpu_memory_mib = usage
            .strip_suffix("MiB")
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| Error::malformed_row(line, format!("bad GPU memory {usage:?}")))?;

        Ok(ProcessRow::new(gpu_index, pid, gpu_memory_mib))
    }
}

/// `|  GPU       PID   Type   Process name   Usage |`
pub struct LegacyLayout;

impl ProcessLayout for LegacyLayout {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn matches_header(&self, _line: &str) -> bool {
        false
    }

    fn pid_column(&self) -> usize {
        2
    }
}

/// `|  GPU   GI   CI        PID   Type   Process name   GPU Memory |`, used
/// since the MIG-aware drivers.
pub struct ModernLayout;

impl ProcessLayout for ModernLayout {
    fn name(&self) -> &'static str {
        "modern"
    }

    fn matches_header(&self, line: &str) -> bool {
        MIG_COLUMNS.is_match(line)
    }

    fn pid_column(&self) -> usize {
        4
    }
}

/// Layouts recognised from the sub-header, tried in order.
static DETECTABLE_LAYOUTS: [&dyn ProcessLayout; 1] = [&ModernLayout];
static FALLBACK_LAYOUT: LegacyLayout = LegacyLayout;

pub fn detect_layout<'a>(
    header: impl IntoIterator<Item = &'a str>,
) -> &'static dyn ProcessLayout {
    for line in header {
        if let Some(layout) = DETECTABLE_LAYOUTS
            .iter()
            .find(|layout| layout.matches_header(line))
        {
            return *layout;
        }
    }
    &FALLBACK_LAYOUT
}

pub struct Sections {
    /// Lines above the process list, right-trimmed.
    pub passthrough: Vec<String>,
    /// Index of the first line after the `|===` sub-header terminator.
    pub process_start: usize,
    pub layout: &'static dyn ProcessLayout,
}

pub fn split_sections(lines: &[String]) -> Result<Sections> {
    let header_start = lines
        .iter()
        .position(|line| line.starts_with(PROCESSES_HEADER))
        .ok_or(Error::MissingSection("no `| Processes:` section"))?;
    let header_len = lines[header_start..]
        .iter()
        .position(|line| line.starts_with(SUB_HEADER_END))
        .ok_or(Error::MissingSection("process list header is not terminated"))?;

    let header = &lines[header_start..header_start + header_len];
    let layout = detect_layout(header.iter().map(String::as_str));
    let process_start = header_start + header_len + 1;
    if process_start >= lines.len() {
        return Err(Error::MissingSection("process list is truncated"));
    }
    debug!(
        "process list starts at line {} using the {} layout",
        process_start,
        layout.name()
    );

    Ok(Sections {
        passthrough: lines[..header_start]
            .iter()
            .map(|line| line.trim_end().to_string())
            .collect(),
        process_start,
        layout,
    })
}

/// What the process list holds when there is nothing to join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyProcessList {
    /// `nvidia-smi` said so explicitly.
    NoneRunning,
    /// The list closes right away, which is what a container sees when the
    /// processes belong to the host.
    Hidden,
}

pub fn empty_process_list(first_row: &str) -> Option<EmptyProcessList> {
    if first_row.starts_with(SECTION_END) {
        Some(EmptyProcessList::Hidden)
    } else if first_row.contains(NO_RUNNING_PROCESSES) {
        Some(EmptyProcessList::NoneRunning)
    } else {
        None
    }
}

/// Parses rows from `start` up to the closing border, skipping GPUs whose
/// process view is unsupported.
pub fn parse_process_rows(
    lines: &[String],
    start: usize,
    layout: &dyn ProcessLayout,
) -> Result<Vec<ProcessRow>> {
    let mut rows = Vec::new();
    for line in &lines[start..] {
        if line.starts_with(SECTION_END) {
            return Ok(rows);
        }
        if line.contains(NOT_SUPPORTED) {
            continue;
        }
        rows.push(layout.parse_row(line)?);
    }
    Err(Error::MissingSection("process list is not closed"))
}
