//! CLI for tagwatch — watch live coincidence countrates from a time tagger.
//!
//! Connects to the instrument's coincidence telemetry endpoint, pushes the
//! requested configuration, and prints each aggregated data point as text.
//! Stands in for a presentation layer: it only reads the controller's window
//! and invokes its control operations.

use clap::Parser;

use tagwatch_core::{SessionConfig, SessionController, TcpJsonConnector};

#[derive(Parser)]
#[command(name = "tagwatch")]
#[command(about = "Watch live coincidence countrates from a time tagger")]
#[command(version = tagwatch_core::VERSION)]
struct Cli {
    /// Telemetry endpoint, host:port of the coincidence stream
    #[arg(long, default_value = "127.0.0.1:5003")]
    endpoint: String,

    /// Channel groups as semicolon-separated comma lists (e.g. "1,2; 3,4")
    #[arg(long, default_value = "1,2")]
    groups: String,

    /// Coincidence window in picoseconds (1000-10000)
    #[arg(long, default_value_t = 1000)]
    cwin: u32,

    /// Report interval in seconds (0.1-5.0)
    #[arg(long, default_value_t = 1.0)]
    rtime: f64,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = SessionConfig {
        groups: cli.groups,
        coincidence_window_ps: cli.cwin,
        report_interval_secs: cli.rtime,
    };
    if let Err(e) = config.validate() {
        eprintln!("invalid configuration: {e}");
        std::process::exit(1);
    }

    let (mut controller, mut events) =
        SessionController::new(TcpJsonConnector::default(), cli.endpoint, config);
    if let Err(e) = controller.start() {
        eprintln!("failed to start session: {e}");
        std::process::exit(1);
    }
    println!(
        "watching {} (groups {:?}, cwin {} ps, rtime {} s) — ctrl-c to stop",
        controller.endpoint(),
        controller.config().groups,
        controller.config().coincidence_window_ps,
        controller.config().report_interval_secs,
    );

    let mut last_printed = f64::NEG_INFINITY;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                controller.stop();
                break;
            }
            event = events.recv() => match event {
                Some(event) => {
                    controller.handle_event(event);
                    if let Some(error) = controller.last_error() {
                        log::warn!("{error}");
                    }
                    if let Some(point) = controller.window().latest()
                        && point.time_secs != last_printed
                    {
                        last_printed = point.time_secs;
                        let series: Vec<String> = point
                            .rates
                            .iter()
                            .map(|(key, rate)| format!("{key}: {rate:.1}/s"))
                            .collect();
                        println!("t={:>8.2}s  {}", point.time_secs, series.join("  "));
                    }
                }
                // No event senders left; nothing further can arrive.
                None => break,
            },
        }
    }
}
