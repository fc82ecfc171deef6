use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use gemchat::app::{self, LaunchOptions};
use gemchat::telemetry;

#[derive(Parser)]
#[command(name = "gemchat")]
#[command(about = "Terminal chat with a Gemini model, backed by a sessions API", long_about = None)]
struct Cli {
    /// Settings file to use instead of the user config directory.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Session to open after loading.
    #[arg(long)]
    session: Option<String>,
    /// Keep sessions in the local JSON file instead of the web API.
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init();
    let cli = Cli::parse();

    let options = LaunchOptions {
        config_path: cli.config,
        session_id: cli.session,
        offline: cli.offline,
    };
    match app::run(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "gemchat stopped");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
