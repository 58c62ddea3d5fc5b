mod actions;
mod app_config;
mod backend;
mod cli;
mod commands;
mod config;
mod error;
mod jmap;
mod output;
mod plain;
mod schema;
mod senders;
mod session;
mod sieve;
mod toolkit;
mod types;

use clap::Parser;

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(format!("warn,bulkman={level}")),
    )
    .format_timestamp(None)
    .init();
}

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    init_logging(cli.verbose);

    let env = commands::dispatch(&cli).await;
    output::print_envelope(&env, cli.plain);

    if !env.ok {
        std::process::exit(1);
    }
}
