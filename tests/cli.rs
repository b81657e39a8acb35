use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::{NamedTempFile, TempDir};

const BIN: &str = env!("CARGO_BIN_EXE_nvidia-htop");

const UTILIZATION: &str = "\
+-----------------------------------------------------------------------------+
| NVIDIA-SMI 418.87.01    Driver Version: 418.87.01    CUDA Version: 10.1     |
|-------------------------------+----------------------+----------------------+
| GPU  Name        Persistence-M| Bus-Id        Disp.A | Volatile Uncorr. ECC |
| Fan  Temp  Perf  Pwr:Usage/Cap|         Memory-Usage | GPU-Util  Compute M. |
|===============================+======================+======================|
|   0  Tesla V100-SXM2...  On   | 00000000:00:1E.0 Off |                    0 |
| N/A   41C    P0    56W / 300W |      0MiB / 16130MiB |      0%      Default |
+-------------------------------+----------------------+----------------------+

+-----------------------------------------------------------------------------+
";

fn run_with_report(report: &str, args: &[&str]) -> Output {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(report.as_bytes()).unwrap();

    Command::new(BIN)
        .args(args)
        .env("FAKE_STDIN_PATH", file.path())
        .env_remove("NVIDIA_HTOP_LOG")
        .stdin(Stdio::null())
        .output()
        .unwrap()
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn no_processes_report() -> String {
    format!(
        "{UTILIZATION}\
| Processes:                                                       GPU Memory |
|  GPU       PID   Type   Process name                             Usage      |
|=============================================================================|
|  No running processes found                                                 |
+-----------------------------------------------------------------------------+
"
    )
}

/// A directory holding an executable `nvidia-smi` shell script.
fn fake_nvidia_smi(script: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nvidia-smi");
    fs::write(&path, format!("#!/bin/sh\n{script}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    dir
}

fn path_with(dir: &Path) -> OsString {
    let mut paths = vec![dir.to_path_buf()];
    paths.extend(env::split_paths(&env::var_os("PATH").unwrap_or_default()));
    env::join_paths(paths).unwrap()
}

fn run_live(tools: &TempDir, stdin: Stdio) -> Output {
    Command::new(BIN)
        .env_remove("FAKE_STDIN_PATH")
        .env_remove("NVIDIA_HTOP_LOG")
        .env("PATH", path_with(tools.path()))
        .stdin(stdin)
        .output()
        .unwrap()
}

#[test]
fn prints_no_running_processes_block() {
    let output = run_with_report(&no_processes_report(), &[]);
    assert!(output.status.success());

    let stdout = stdout_of(&output);
    assert!(stdout.starts_with("+-----"));
    assert!(stdout.contains("| N/A   41C    P0    56W / 300W |      0MiB / 16130MiB |"));
    assert!(stdout.contains("| No running processes found "));
    assert!(!stdout.contains("container"));
    assert!(!stdout.contains("TOTAL GPU MEM"));
}

#[test]
fn hints_at_container_visibility() {
    let report = format!(
        "{UTILIZATION}\
| Processes:                                                                  |
|  GPU   GI   CI        PID   Type   Process name                  GPU Memory |
|        ID   ID                                                   Usage      |
|=============================================================================|
+-----------------------------------------------------------------------------+
"
    );
    let output = run_with_report(&report, &["-c"]);
    assert!(output.status.success());

    let stdout = stdout_of(&output);
    assert!(stdout.contains(
        "| If you're running in a container, you'll only see processes running inside. |"
    ));
    assert!(!stdout.contains("GPU MEM"));
}

#[test]
fn unsupported_rows_leave_empty_tables() {
    let report = format!(
        "{UTILIZATION}\
| Processes:                                                       GPU Memory |
|  GPU       PID   Type   Process name                             Usage      |
|=============================================================================|
|    0      9876      G   Not Supported                                       |
+-----------------------------------------------------------------------------+
"
    );
    let output = run_with_report(&report, &[]);
    assert!(output.status.success());

    let stdout = stdout_of(&output);
    assert!(stdout.contains("|  GPU   PID     USER    GPU MEM  %CPU  %MEM      TIME  COMMAND"));
    assert!(stdout.contains("|      USER    TOTAL GPU MEM  TOTAL %CPU  TOTAL %MEM  |"));
    assert!(!stdout.contains("9876"));
}

#[test]
fn malformed_report_fails() {
    let output = run_with_report("this is not nvidia-smi output\n", &[]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("malformed report"));
}

#[test]
fn missing_report_file_fails() {
    let output = Command::new(BIN)
        .env("FAKE_STDIN_PATH", "/nonexistent/nvidia-smi.txt")
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("/nonexistent/nvidia-smi.txt"));
}

#[test]
fn failing_nvidia_smi_output_is_shown() {
    let tools = fake_nvidia_smi(
        "echo 'Failed to initialize NVML: Driver/library version mismatch'\n\
         echo 'NVML library version: 550.54' >&2\n\
         exit 3\n",
    );
    let output = run_live(&tools, Stdio::null());
    assert!(output.status.success());

    let stdout = stdout_of(&output);
    assert!(stdout.starts_with("nvidia-smi exited with error code 3:\n"));
    assert!(stdout.contains("Failed to initialize NVML: Driver/library version mismatch"));
    assert!(stdout.contains("NVML library version: 550.54"));
    assert!(!stdout.contains("GPU MEM"));
    assert!(!stdout.contains("TOTAL GPU MEM"));
    assert!(!stdout.contains("No running processes found"));
}

#[test]
fn empty_stdin_falls_back_to_nvidia_smi() {
    let tools = fake_nvidia_smi(&format!(
        "cat <<'REPORT'\n{}REPORT\n",
        no_processes_report()
    ));
    let output = run_live(&tools, Stdio::null());
    assert!(output.status.success());

    let stdout = stdout_of(&output);
    assert!(stdout.contains("| NVIDIA-SMI 418.87.01"));
    assert!(stdout.contains("| No running processes found "));
}

#[test]
fn reads_piped_report_with_latin1_bytes() {
    let tools = fake_nvidia_smi("echo 'nvidia-smi must not run'\nexit 1\n");

    let mut report = b"Tue Oct 15 10:12:03 2024 caf\xe9\n".to_vec();
    report.extend_from_slice(no_processes_report().as_bytes());
    let mut stdin = tempfile::tempfile().unwrap();
    stdin.write_all(&report).unwrap();
    stdin.seek(SeekFrom::Start(0)).unwrap();

    let output = run_live(&tools, Stdio::from(stdin));
    assert!(output.status.success());

    let stdout = stdout_of(&output);
    assert!(stdout.starts_with("Tue Oct 15 10:12:03 2024 caf\u{fffd}\n"));
    assert!(stdout.contains("| No running processes found "));
    assert!(!stdout.contains("must not run"));
}

#[test]
fn joins_rows_with_live_process_table() {
    let live_pid = std::process::id().to_string();
    let gone_pid = "4194303";
    let report = format!(
        "{UTILIZATION}\
| Processes:                                                       GPU Memory |
|  GPU       PID   Type   Process name                             Usage      |
|=============================================================================|
|    0   {live_pid:>7}      C   cli-test                                     100MiB |
|    1   {gone_pid:>7}      C   vanished                                     250MiB |
+-----------------------------------------------------------------------------+
"
    );
    let output = run_with_report(&report, &["-l", "50"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = stdout_of(&output);
    let row_of = |pid: &str| -> Vec<String> {
        stdout
            .lines()
            .map(|line| line.split_whitespace().map(String::from).collect::<Vec<_>>())
            .find(|tokens| tokens.len() > 2 && tokens[1].len() == 1 && tokens[2] == pid)
            .unwrap_or_else(|| panic!("no row for pid {pid} in:\n{stdout}"))
    };

    // `|`, GPU, PID, USER, GPU MEM, %CPU, %MEM, TIME, COMMAND..., `|`
    let live = row_of(&live_pid);
    assert_eq!(live[1], "0");
    assert_ne!(live[3], "100MiB");
    assert_eq!(live[4], "100MiB");
    assert!(live.len() >= 10);

    let gone = row_of(gone_pid);
    assert_eq!(gone, ["|", "1", gone_pid, "250MiB", "|"]);

    let unowned_total = stdout
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .find(|tokens| tokens.len() == 5 && tokens[1] == "250MiB" && tokens[2] == "0.0");
    assert_eq!(
        unowned_total,
        Some(vec!["|", "250MiB", "0.0", "0.0", "|"])
    );
}
