mod config;
mod error;
mod gpu;
mod ui;
mod utils;

use crate::config::{build_cli, Config, LOG_SPEC_ENV, REPORT_PATH_ENV};
use crate::error::Result;
use crate::gpu::process::summarize_owners;
use crate::gpu::report::{empty_process_list, parse_process_rows, split_sections};
use crate::ui::render::{
    render_empty_process_list, render_owner_summary, render_passthrough, render_processes,
};
use crate::utils::system::{acquire_report, join_process_table, PsProcessTable, Report};
use flexi_logger::{Logger, LoggerHandle};
use log::debug;
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let matches = build_cli().get_matches();
    let config = Config::from_matches(&matches, env::var_os(REPORT_PATH_ENV).map(PathBuf::from));

    let _logger = match init_logger() {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("nvidia-htop: {e}");
            None
        }
    };

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!("{e:?}");
            eprintln!("nvidia-htop: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logger() -> Result<LoggerHandle> {
    let spec = env::var(LOG_SPEC_ENV).unwrap_or_else(|_| "warn".to_string());
    Ok(Logger::try_with_str(spec)?.log_to_stderr().start()?)
}

fn run(config: &Config) -> Result<()> {
    let lines = match acquire_report(config)? {
        Report::Lines(lines) => lines,
        Report::DiagnosticFailed { code, output } => {
            match code {
                Some(code) => println!("nvidia-smi exited with error code {code}:"),
                None => println!("nvidia-smi was terminated by a signal:"),
            }
            println!("{output}");
            return Ok(());
        }
    };
    debug!("report has {} lines", lines.len());

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let sections = split_sections(&lines)?;
    render_passthrough(&mut out, &sections.passthrough, config.color)?;

    if let Some(kind) = empty_process_list(&lines[sections.process_start]) {
        debug!("process list is empty ({kind:?})");
        let closing = lines.last().map(String::as_str).unwrap_or_default();
        render_empty_process_list(&mut out, closing, kind)?;
        return Ok(out.flush()?);
    }

    let mut rows = parse_process_rows(&lines, sections.process_start, sections.layout)?;
    join_process_table(&mut rows, &PsProcessTable)?;
    let summaries = summarize_owners(&rows);

    render_processes(&mut out, &rows, config)?;
    render_owner_summary(&mut out, &summaries, config)?;
    Ok(out.flush()?)
}
