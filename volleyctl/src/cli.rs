use std::path::PathBuf;

use clap::Parser;
use volley_model::{JitterWindow, ServerKind};

/// Run a protocol against many targets with bounded concurrency.
#[derive(Parser, Debug)]
#[command(name = "volleyctl", version)]
#[command(about = "Concurrent network scan orchestrator")]
pub struct Cli {
    /// Protocol to run against every target
    #[arg(required_unless_present_any = ["list_protocols", "list_modules", "show_options"])]
    pub protocol: Option<String>,

    /// IPs, CIDR blocks, ranges (10.0.0.1-20), hostnames, or files with one entry per line
    pub targets: Vec<String>,

    /// Concurrent jobs (the worker pool gets one extra slot)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Seconds to wait on a single job before recording a timeout
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Random start delay per job, in seconds: MAX or MIN-MAX
    #[arg(long, value_name = "RANGE", value_parser = parse_jitter)]
    pub jitter: Option<JitterWindow>,

    /// Module to run on top of the protocol
    #[arg(short = 'M', long)]
    pub module: Option<String>,

    /// Module option, repeatable
    #[arg(short = 'o', value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub module_options: Vec<(String, String)>,

    /// List modules, limited to PROTOCOL when one is given
    #[arg(short = 'L', long)]
    pub list_modules: bool,

    /// Show the options of the module selected with -M
    #[arg(long = "options", requires = "module")]
    pub show_options: bool,

    /// List available protocols
    #[arg(long)]
    pub list_protocols: bool,

    /// Callback server transport when the module does not pin one
    #[arg(long, value_parser = parse_server_kind)]
    pub server: Option<ServerKind>,

    /// Address the callback server binds
    #[arg(long)]
    pub server_host: Option<String>,

    /// Port the callback server binds (0 picks a free port)
    #[arg(long)]
    pub server_port: Option<u16>,

    /// Service port the protocol connects to
    #[arg(long)]
    pub port: Option<u16>,

    /// Skip confirmation prompts
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Do not read stdin for progress requests
    #[arg(long)]
    pub no_progress: bool,

    /// Keep results in memory instead of the workspace store
    #[arg(long)]
    pub no_store: bool,

    /// Workspace that receives results
    #[arg(short = 'w', long)]
    pub workspace: Option<String>,

    /// Path to volley.toml
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn is_listing(&self) -> bool {
        self.list_protocols || self.list_modules || self.show_options
    }
}

fn parse_jitter(raw: &str) -> Result<JitterWindow, String> {
    JitterWindow::parse(raw).map_err(|err| err.to_string())
}

fn parse_server_kind(raw: &str) -> Result<ServerKind, String> {
    raw.parse().map_err(|err: volley_model::ModelError| err.to_string())
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_a_full_run() {
        let cli = Cli::try_parse_from([
            "volleyctl", "-t", "20", "--jitter", "1-3", "-M", "canary", "-o", "PATH=/x", "--server",
            "HTTP", "tcp", "10.0.0.0/30", "hosts.txt",
        ])
        .expect("valid command line");

        assert_eq!(cli.protocol.as_deref(), Some("tcp"));
        assert_eq!(cli.targets, vec!["10.0.0.0/30", "hosts.txt"]);
        assert_eq!(cli.threads, Some(20));
        assert_eq!(cli.jitter, Some(JitterWindow::new(1, 3).unwrap()));
        assert_eq!(cli.module_options, vec![("PATH".to_string(), "/x".to_string())]);
        assert_eq!(cli.server, Some(ServerKind::Http));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(Cli::try_parse_from(["volleyctl", "--jitter", "5-1", "tcp"]).is_err());
        assert!(Cli::try_parse_from(["volleyctl", "-o", "PATH", "tcp"]).is_err());
        assert!(Cli::try_parse_from(["volleyctl"]).is_err());
        assert!(Cli::try_parse_from(["volleyctl", "--list-protocols"]).is_ok());
    }
}
