use crate::config::Config;
use crate::gpu::process::{round_tenths, OwnerSummary, ProcessRow};
use crate::gpu::report::{EmptyProcessList, NO_RUNNING_PROCESSES};
use crate::ui::colorize::line_loads;
use crate::utils::formatting::{border_for, format_mib, format_percent};
use crossterm::style::Stylize;
use std::io::{self, Write};

const MIN_PID_WIDTH: usize = 5;
/// Inner width of the framed "no processes" rows.
const EMPTY_MESSAGE_WIDTH: usize = 73;
const CONTAINER_HINT: &str =
    "| If you're running in a container, you'll only see processes running inside. |";

/// Prints the utilization part of the report, minus its last line: the
/// border above the process list, which the tables below redraw.
pub fn render_passthrough<W: Write>(out: &mut W, lines: &[String], color: bool) -> io::Result<()> {
    let shown = lines.len().saturating_sub(1);
    if color {
        let loads = line_loads(lines);
        for (line, load) in lines[..shown].iter().zip(loads) {
            match load {
                Some(load) => writeln!(out, "{}", line.as_str().with(load.color()))?,
                None => writeln!(out, "{line}")?,
            }
        }
    } else {
        for line in &lines[..shown] {
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}

/// The fixed block shown instead of the tables when no process is listed.
/// `closing` is the report's last line.
pub fn render_empty_process_list<W: Write>(
    out: &mut W,
    closing: &str,
    kind: EmptyProcessList,
) -> io::Result<()> {
    let closing = closing.trim();
    writeln!(out, "{closing}")?;
    writeln!(
        out,
        "| {NO_RUNNING_PROCESSES}{:pad$}   |",
        "",
        pad = EMPTY_MESSAGE_WIDTH.saturating_sub(NO_RUNNING_PROCESSES.len())
    )?;
    if kind == EmptyProcessList::Hidden {
        writeln!(out, "{CONTAINER_HINT}")?;
    }
    writeln!(out, "{closing}")
}

fn process_line(cells: [&str; 8], pid_width: usize, command_width: usize) -> String {
    let [gpu, pid, user, gpu_mem, cpu, mem, time, command] = cells;
    format!(
        "|  {gpu:>3} {pid:>pid_width$} {user:>8}   {gpu_mem:>8} {cpu:>5} {mem:>5} {time:>9}  {command:<command_width$.command_width$}  |"
    )
}

pub fn render_processes<W: Write>(
    out: &mut W,
    rows: &[ProcessRow],
    config: &Config,
) -> io::Result<()> {
    let pid_width = rows
        .iter()
        .map(|row| row.pid.chars().count())
        .max()
        .unwrap_or(0)
        .max(MIN_PID_WIDTH);
    let command_width = config.command_length;

    let header = process_line(
        ["GPU", "PID", "USER", "GPU MEM", "%CPU", "%MEM", "TIME", "COMMAND"],
        pid_width,
        command_width,
    );
    let border = border_for(&header);
    writeln!(out, "{border}")?;
    writeln!(out, "{header}")?;

    for row in rows.iter().filter(|row| config.shows_owner(&row.owner)) {
        let gpu_mem = format_mib(row.gpu_memory_mib);
        let cpu = format_percent(row.cpu_percent);
        let mem = format_percent(row.mem_percent);
        let line = process_line(
            [
                row.gpu_index.as_str(),
                row.pid.as_str(),
                row.owner.as_str(),
                gpu_mem.as_str(),
                cpu.as_str(),
                mem.as_str(),
                row.elapsed_time.as_str(),
                row.command.as_str(),
            ],
            pid_width,
            command_width,
        );
        writeln!(out, "{line}")?;
    }

    writeln!(out, "{border}")
}

fn summary_line(cells: [&str; 4]) -> String {
    let [user, gpu_mem, cpu, mem] = cells;
    format!("|  {user:>8}   {gpu_mem:>14} {cpu:>11} {mem:>11}  |")
}

pub fn render_owner_summary<W: Write>(
    out: &mut W,
    summaries: &[OwnerSummary],
    config: &Config,
) -> io::Result<()> {
    let header = summary_line(["USER", "TOTAL GPU MEM", "TOTAL %CPU", "TOTAL %MEM"]);
    let border = border_for(&header);
    writeln!(out, "{header}")?;
    writeln!(out, "{border}")?;

    for summary in summaries
        .iter()
        .filter(|summary| config.shows_owner(&summary.owner))
    {
        let gpu_mem = format_mib(summary.total_gpu_memory_mib);
        let cpu = format_percent(Some(round_tenths(summary.total_cpu_percent)));
        let mem = format_percent(Some(round_tenths(summary.total_mem_percent)));
        let line = summary_line([
            summary.owner.as_str(),
            gpu_mem.as_str(),
            cpu.as_str(),
            mem.as_str(),
        ]);
        writeln!(out, "{line}")?;
    }

    writeln!(out, "{border}")
}
