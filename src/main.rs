//! # gaekit Main Entry Point
//!
//! `gaekit serve` (the default) runs the HTTP service; `gaekit env` prints
//! what the process can tell about its App Engine environment.

use clap::{Parser, Subcommand};
use gaekit::{
    config::ConfigLoader,
    environment::{self, ProcessEnvironment},
    server::run_server,
};

#[derive(Debug, Parser)]
#[command(name = "gaekit", version, about = "Google login and App Engine helpers")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve,
    /// Print the execution context as JSON
    Env,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            println!("Loaded configuration for profile: {}", config.profile);
            if let Ok(redacted_json) = config.redacted_json() {
                println!("Configuration: {}", redacted_json);
            }

            run_server(config).await
        }
        Command::Env => {
            let env = ProcessEnvironment;
            let application_root = environment::get_application_root(&env, &config.base_dir);
            let report = environment::environment_report(&env, application_root);
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}
