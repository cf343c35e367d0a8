mod ballot;
mod commands;
mod config;
mod db;
mod models;
mod tally;
mod voting;

use clap::Parser;
use commands::Args;
use config::Settings;
use db::Database;
use log::{debug, error};
use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            eprintln!("error: {}", e);
            process::exit(2);
        }
    };
    debug!("Using settings {:?}", settings);

    let database = match Database::new(&settings).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            eprintln!("error: {}", e);
            process::exit(2);
        }
    };

    if let Err(why) = commands::run(&database, &settings, args.command).await {
        error!("Command failed: {}", why);
        eprintln!("error: {}", why);
        process::exit(1);
    }
}
