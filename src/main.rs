use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{CommandFactory, Parser};
use pinglog::{
    config::{ProbeConfig, ProbeConfigBuilder, ProtocolPreference},
    controller::Controller,
    icmp::IcmpPinger,
    sink,
};

/// Pings a single address or a list of addresses concurrently, optionally logging every
/// destination to its own file.
///
/// Press Ctrl+C to stop and print statistics, Ctrl+\ to print statistics and continue.
#[derive(Parser, Debug)]
#[command(name = "pinglog", version, about, long_about = None)]
struct Args {
    /// Hosts or addresses to ping
    destinations: Vec<String>,

    /// Ping the destinations until interrupted
    #[arg(short = 't')]
    endless: bool,

    /// Number of echo requests to send to every destination
    #[arg(short = 'n', default_value_t = 4)]
    count: u64,

    /// Size of the echo request payload in bytes (at most 65527)
    #[arg(short = 'l', default_value_t = 32)]
    size: usize,

    /// Set the Don't Fragment flag (IPv4 only)
    #[arg(short = 'f')]
    dont_fragment: bool,

    /// Time To Live of the echo requests
    #[arg(short = 'i', default_value_t = 128)]
    ttl: u8,

    /// Time to wait for each reply, in milliseconds
    #[arg(short = 'w', default_value_t = 4000)]
    timeout: u64,

    /// Delay between two echo requests to the same destination, in milliseconds
    #[arg(short = 'W', default_value_t = 1000)]
    interval: u64,

    /// File with one destination per line, appended to the destinations above
    #[arg(short = 's')]
    source_file: Option<PathBuf>,

    /// Directory receiving one log file per destination
    #[arg(short = 'd')]
    destination_folder: Option<PathBuf>,

    /// Use IPv4 for host names
    #[arg(short = '4', conflicts_with = "ipv6")]
    ipv4: bool,

    /// Use IPv6 for host names
    #[arg(short = '6')]
    ipv6: bool,

    /// Print the summary only
    #[arg(short = 'q')]
    quiet: bool,
}

impl Args {
    fn protocol(&self) -> ProtocolPreference {
        match (self.ipv4, self.ipv6) {
            (true, _) => ProtocolPreference::V4,
            (_, true) => ProtocolPreference::V6,
            _ => ProtocolPreference::Any,
        }
    }

    fn config(&self) -> pinglog::error::Result<ProbeConfig> {
        let mut builder = ProbeConfigBuilder::new()
            .with_endless(self.endless)
            .with_count(self.count)
            .with_payload_size(self.size)
            .with_dont_fragment(self.dont_fragment)
            .with_ttl(self.ttl)
            .with_response_timeout(std::time::Duration::from_millis(self.timeout))
            .with_interval(std::time::Duration::from_millis(self.interval))
            .with_protocol(self.protocol())
            .with_quiet(self.quiet);
        if let Some(dir) = &self.destination_folder {
            builder = builder.with_log_dir(dir);
        }
        builder.build()
    }
}

/// Non-empty lines of `path`; lines starting with `#` are comments.
fn read_destinations(path: &Path) -> std::io::Result<Vec<String>> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect())
}

fn write_usage<W: std::io::Write>(out: &mut W) -> std::io::Result<()> {
    Args::command().write_help(out)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut destinations = args.destinations.clone();
    if let Some(path) = &args.source_file {
        match read_destinations(path) {
            Ok(extra) => destinations.extend(extra),
            Err(err) => {
                eprintln!("pinglog: cannot read {}: {}", path.display(), err);
                return ExitCode::FAILURE;
            }
        }
    }
    if destinations.is_empty() {
        if let Err(err) = write_usage(&mut std::io::stdout()) {
            log::debug!("failed to print help: {}", err);
        }
        return ExitCode::FAILURE;
    }

    let config = match args.config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("pinglog: {}", err);
            return ExitCode::FAILURE;
        }
    };
    if let Some(dir) = &config.log_dir {
        if let Err(err) = sink::prepare_dir(dir).await {
            eprintln!("pinglog: {}", err);
            return ExitCode::FAILURE;
        }
    }

    let mut controller = Controller::new(config, IcmpPinger::new());
    if let Err(err) = controller.install_signal_handlers() {
        log::warn!("{}", err);
    }
    controller.run(destinations).await;
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_map_to_config() {
        let args = Args::parse_from([
            "pinglog", "-n", "2", "-l", "64", "-f", "-i", "30", "-w", "500", "-W", "250", "-4",
            "-q", "example.com",
        ]);
        let config = args.config().unwrap();
        assert_eq!(config.count, 2);
        assert_eq!(config.payload_size, 64);
        assert!(config.dont_fragment);
        assert_eq!(config.ttl, 30);
        assert_eq!(config.response_timeout.as_millis(), 500);
        assert_eq!(config.interval.as_millis(), 250);
        assert_eq!(config.protocol, ProtocolPreference::V4);
        assert!(config.quiet);
        assert_eq!(args.destinations, vec!["example.com"]);
    }

    #[test]
    fn test_usage_lists_destinations() {
        let mut out = Vec::new();
        write_usage(&mut out).unwrap();
        let usage = String::from_utf8(out).unwrap();
        assert!(usage.contains("Usage: pinglog"));
        assert!(usage.contains("DESTINATIONS"));
    }

    #[test]
    fn test_family_flags_conflict() {
        assert!(Args::try_parse_from(["pinglog", "-4", "-6", "host"]).is_err());
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let args = Args::parse_from(["pinglog", "-l", "65528", "host"]);
        assert!(args.config().is_err());
    }

    #[test]
    fn test_read_destinations_skips_blanks_and_comments() {
        let path = std::env::temp_dir().join(format!("pinglog-list-{}", std::process::id()));
        std::fs::write(&path, "10.0.0.1\n\n# gateway\n  example.com  \n").unwrap();
        let destinations = read_destinations(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(destinations, vec!["10.0.0.1", "example.com"]);
    }
}
