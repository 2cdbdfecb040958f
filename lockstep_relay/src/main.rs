// CLI entry point for the lockstep relay.
//
// Starts a standalone relay that game clients connect to. See `server.rs`
// for the networking architecture and `session.rs` for the session state.
//
// Usage:
//   relay [OPTIONS]
//     --port <PORT>           Listen port (default: 7878)
//     --clients <N>           Client slots (default: 2)
//     --start-delay <MS>      Delay from all-ready to turn 1 (default: 3000)
//     --config <PATH>         JSON session config; flags given after it
//                             override its values
//
// Logging goes through `env_logger`; set `RUST_LOG` to change the default
// `info` level.

use std::thread;
use std::time::Duration;

use lockstep_core::SessionConfig;
use lockstep_relay::{RelayConfig, start_relay};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = parse_args();
    if let Err(e) = config.session.validate() {
        eprintln!("Invalid session config: {e}");
        std::process::exit(1);
    }

    let (_handle, addr) = match start_relay(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start relay: {e}");
            std::process::exit(1);
        }
    };

    println!("Relay listening on {addr}");
    println!("Press Ctrl+C to stop.");

    // The process exits on SIGINT/SIGTERM; the relay threads go with it.
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}

/// Parse command-line arguments into a `RelayConfig` with plain
/// `std::env::args()` matching.
fn parse_args() -> RelayConfig {
    let mut config = RelayConfig::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--clients" => {
                i += 1;
                config.session.server.max_clients =
                    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                        eprintln!("--clients requires a valid number");
                        std::process::exit(1);
                    });
            }
            "--start-delay" => {
                i += 1;
                config.session.server.start_delay_ms =
                    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                        eprintln!("--start-delay requires a number of milliseconds");
                        std::process::exit(1);
                    });
            }
            "--config" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    eprintln!("--config requires a path");
                    std::process::exit(1);
                };
                config.session = SessionConfig::load(path).unwrap_or_else(|e| {
                    eprintln!("Failed to load {path}: {e}");
                    std::process::exit(1);
                });
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>           Listen port (default: 7878)");
    println!("  --clients <N>           Client slots (default: 2)");
    println!("  --start-delay <MS>      Delay from all-ready to turn 1 (default: 3000)");
    println!("  --config <PATH>         JSON session config");
    println!("  --help, -h              Show this help");
}
