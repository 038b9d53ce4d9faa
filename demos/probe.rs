use pinglog::{
    config::ProbeConfigBuilder,
    controller::Controller,
    icmp::IcmpPinger,
    report::Statistics,
};
use std::io::Write;

use clap::Parser;

/// Simple example to show concurrent echo probing
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Hosts or addresses to probe
    #[arg(required = true)]
    destinations: Vec<String>,
    /// Echo requests sent to every destination
    #[arg(short = 'n', long, default_value_t = 4)]
    count: u64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = ProbeConfigBuilder::new()
        .with_count(args.count)
        .with_quiet(true)
        .build()
        .unwrap();

    let controller = Controller::new(config, IcmpPinger::new());
    let snapshot = controller.run(args.destinations).await;

    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "Reachable hosts:").unwrap();
        for (_, result) in snapshot.iter().filter(|(_, result)| result.counters.received > 0) {
            let stats = Statistics::from_result(result);
            writeln!(stdout, "{} ({}% loss)", result.address, stats.loss_percent).unwrap();
        }
    }
}
