use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod billing;
mod cli;
mod clients;
mod config;
mod dates;
mod entries;
mod error;
mod export;
mod filters;
mod format;
mod grouping;
mod invoices;
mod models;
mod projects;
mod referrals;
mod rollups;
mod rounding;
mod settings;
mod storage;
mod store;
mod timer;

use app::App;
use cli::Cli;
use config::AppConfig;
use store::FileStore;

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config::log_filter(|key| std::env::var(key).ok())))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> error::Result<()> {
    let config = AppConfig::load(cli.data, cli.user)?;
    let storage = config.local_storage();
    let user_id = config.resolve_user_id(&storage)?;
    let store = FileStore::open(&config.data_path, user_id)?;
    tracing::debug!(data = %store.path().display(), %user_id, "opened store");

    let mut app = App::new(store, storage);
    if let Some(banner) = app.help_banner() {
        eprintln!("{banner}");
    }
    let mut stdout = std::io::stdout().lock();
    app.run(cli.command, &mut stdout)
}
