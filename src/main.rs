use std::env;

use clap::Parser;
use retire::api::{self, Cli};
use tracing::error;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: retire serve [port]\n       retire plan --desired-monthly-income <R> --current-age <AGE> --provision <SPEC>...";

#[tokio::main]
async fn main() {
    init_tracing();

    let raw_args: Vec<String> = env::args().collect();
    match raw_args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            let port = raw_args
                .get(2)
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(8080);
            if let Err(e) = api::run_http_server(port).await {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        Some("plan") => {
            let cli = Cli::parse_from(&raw_args[1..]);
            match api::run_plan_command(cli) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("retire=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}
