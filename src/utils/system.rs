use crate::config::Config;
use crate::error::{Error, Result};
use crate::gpu::process::ProcessRow;
use crate::utils::formatting::normalize_elapsed;
use log::{debug, warn};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fs;
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::process::Command;

const DIAGNOSTIC_COMMAND: &str = "nvidia-smi";
const PS_COMMAND: &str = "ps";
const PS_COLUMNS: &str = "pid,user,%cpu,%mem,etime,command";
const PS_FIELD_COUNT: usize = 6;

/// Where the report came from, or why there is none.
#[derive(Debug)]
pub enum Report {
    Lines(Vec<String>),
    /// `nvidia-smi` ran but failed; its combined output is shown verbatim.
    DiagnosticFailed { code: Option<i32>, output: String },
}

/// Splits text into lines that keep their trailing newline, except possibly
/// the last one.
pub fn report_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(String::from).collect()
}

/// Process names are not necessarily UTF-8, so reports are decoded lossily
/// whatever their source.
pub fn decode_report(bytes: &[u8]) -> Vec<String> {
    report_lines(&String::from_utf8_lossy(bytes))
}

pub fn acquire_report(config: &Config) -> Result<Report> {
    if let Some(path) = &config.report_path {
        debug!("reading report from {}", path.display());
        let bytes = fs::read(path).map_err(|source| Error::ReportFile {
            path: path.clone(),
            source,
        })?;
        return Ok(Report::Lines(decode_report(&bytes)));
    }

    if stdin_has_data()? {
        let mut bytes = Vec::new();
        io::stdin().read_to_end(&mut bytes)?;
        if !bytes.is_empty() {
            debug!("read report from stdin");
            return Ok(Report::Lines(decode_report(&bytes)));
        }
    }

    run_diagnostic_command()
}

/// Checks without blocking whether stdin is readable, i.e. something was
/// piped in.
fn stdin_has_data() -> Result<bool> {
    let stdin = io::stdin();
    let mut fds = [PollFd::new(stdin.as_fd(), PollFlags::POLLIN)];
    let ready = poll(&mut fds, PollTimeout::ZERO).map_err(io::Error::from)?;
    Ok(ready > 0
        && fds[0]
            .revents()
            .is_some_and(|events| events.intersects(PollFlags::POLLIN | PollFlags::POLLHUP)))
}

fn run_diagnostic_command() -> Result<Report> {
    debug!("running {}", DIAGNOSTIC_COMMAND);
    let output = Command::new(DIAGNOSTIC_COMMAND)
        .output()
        .map_err(|source| Error::Spawn {
            program: DIAGNOSTIC_COMMAND,
            source,
        })?;

    if !output.status.success() {
        return Ok(Report::DiagnosticFailed {
            code: output.status.code(),
            output: format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            ),
        });
    }
    Ok(Report::Lines(decode_report(&output.stdout)))
}

/// A process as the OS process table describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct OsProcess {
    pub pid: String,
    pub user: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub elapsed_time: String,
    pub command: String,
}

pub trait ProcessTable {
    /// Looks up all `pids` in one go. Pids the table does not know are
    /// simply absent from the result.
    fn query(&self, pids: &[&str]) -> Result<Vec<OsProcess>>;
}

/// Queries the process table through `ps`.
pub struct PsProcessTable;

impl ProcessTable for PsProcessTable {
    fn query(&self, pids: &[&str]) -> Result<Vec<OsProcess>> {
        let pid_list = pids.join(",");
        debug!("running {} -o {} -p {}", PS_COMMAND, PS_COLUMNS, pid_list);
        let output = Command::new(PS_COMMAND)
            .args(["-o", PS_COLUMNS, "-p", &pid_list])
            .output()
            .map_err(|source| Error::Spawn {
                program: PS_COMMAND,
                source,
            })?;

        // ps exits with 1 when some of the pids are gone, the rest is still
        // listed.
        if !output.status.success() {
            warn!("{} exited with {}", PS_COMMAND, output.status);
            if output.stdout.is_empty() && !output.stderr.is_empty() {
                return Err(Error::ProcessTable(
                    String::from_utf8_lossy(&output.stderr).trim().to_string(),
                ));
            }
        }
        parse_ps_output(&String::from_utf8_lossy(&output.stdout))
    }
}

pub fn parse_ps_output(text: &str) -> Result<Vec<OsProcess>> {
    let mut processes = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("PID") {
            continue;
        }

        let fields = split_columns(line, PS_FIELD_COUNT);
        if fields.len() < PS_FIELD_COUNT {
            return Err(Error::ProcessTable(format!(
                "expected {PS_FIELD_COUNT} columns in {line:?}"
            )));
        }
        let percent = |value: &str| {
            value
                .parse::<f64>()
                .map_err(|_| Error::ProcessTable(format!("bad percentage {value:?} in {line:?}")))
        };

        processes.push(OsProcess {
            pid: fields[0].to_string(),
            user: fields[1].to_string(),
            cpu_percent: percent(fields[2])?,
            mem_percent: percent(fields[3])?,
            elapsed_time: normalize_elapsed(fields[4]),
            command: fields[5].to_string(),
        });
    }
    Ok(processes)
}

/// Splits on whitespace runs into at most `count` fields; the last field
/// keeps the rest of the line, inner spaces included.
fn split_columns(line: &str, count: usize) -> Vec<&str> {
    let mut fields = Vec::with_capacity(count);
    let mut rest = line.trim();
    while fields.len() + 1 < count {
        match rest.find(char::is_whitespace) {
            Some(end) => {
                fields.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => break,
        }
    }
    if !rest.is_empty() {
        fields.push(rest);
    }
    fields
}

/// Fills in the OS columns of every row whose pid the table reported. A pid
/// listed for several GPUs gets the same details on each of its rows.
pub fn join_process_table(rows: &mut [ProcessRow], table: &dyn ProcessTable) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut pids: Vec<&str> = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        if !pids.contains(&row.pid.as_str()) {
            pids.push(&row.pid);
        }
    }
    let processes = table.query(&pids)?;
    debug!("{} of {} pids found in the process table", processes.len(), pids.len());

    for process in processes {
        for row in rows.iter_mut().filter(|row| row.pid == process.pid) {
            row.owner = process.user.clone();
            row.cpu_percent = Some(process.cpu_percent);
            row.mem_percent = Some(process.mem_percent);
            row.elapsed_time = process.elapsed_time.clone();
            row.command = process.command.clone();
        }
    }
    Ok(())
}
