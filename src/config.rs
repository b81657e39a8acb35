use clap::{crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

/// Environment variable naming a captured `nvidia-smi` report to use instead
/// of stdin or a live invocation.
pub const REPORT_PATH_ENV: &str = "FAKE_STDIN_PATH";
/// Environment variable holding the log specification, e.g. `debug`.
pub const LOG_SPEC_ENV: &str = "NVIDIA_HTOP_LOG";

pub const DEFAULT_COMMAND_LENGTH: usize = 20;
/// Owner names are compared on this many leading characters since `ps`
/// truncates long user names.
pub const USER_PREFIX_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub command_length: usize,
    pub color: bool,
    pub user_filter: String,
    pub report_path: Option<PathBuf>,
}

impl Config {
    pub fn from_matches(matches: &ArgMatches, report_path: Option<PathBuf>) -> Self {
        Config {
            command_length: matches
                .get_one::<usize>("command-length")
                .copied()
                .unwrap_or(DEFAULT_COMMAND_LENGTH),
            color: matches.get_flag("color"),
            user_filter: matches
                .get_one::<String>("user")
                .cloned()
                .unwrap_or_default(),
            report_path,
        }
    }

    /// Whether rows owned by `owner` pass the `--user` filter.
    pub fn shows_owner(&self, owner: &str) -> bool {
        if self.user_filter.is_empty() {
            return true;
        }
        owner.chars().take(USER_PREFIX_LEN).eq(self
            .user_filter
            .chars()
            .take(USER_PREFIX_LEN))
    }
}

pub fn build_cli() -> Command {
    Command::new("nvidia-htop")
        .version(crate_version!())
        .about("Prints nvidia-smi output annotated with process owners and per-user GPU usage")
        .arg(
            Arg::new("command-length")
                .short('l')
                .long("command-length")
                .value_name("LENGTH")
                .help("Command column width [default: 20, 100 if LENGTH is omitted]")
                .num_args(0..=1)
                .default_missing_value("100")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("color")
                .short('c')
                .long("color")
                .help("Colorize GPUs: green when free, yellow when moderately used, red when busy")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("user")
                .short('u')
                .long("user")
                .value_name("USER")
                .help("Only show processes of this user"),
        )
}
