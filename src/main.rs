//! ncperf: Nearby Connections performance harness command-line front end

use clap::Parser;
use nearby_perf_harness::{app::App, cli::Cli};
use std::process;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(99);
    }));

    let cli = Cli::parse();
    let use_color = cli.use_colors();
    let verbose = cli.verbose || cli.debug;

    match App::new(cli).run().await {
        Ok(verdict) => process::exit(verdict.exit_code()),
        Err(e) => {
            eprintln!("{}", e.format_for_console(use_color));
            if verbose {
                eprintln!();
                eprintln!("{}", e.user_friendly_message());
            }
            process::exit(e.exit_code());
        }
    }
}
