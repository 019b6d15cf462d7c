use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use tutan_lib::agent_engine::state::TaskStatus;
use tutan_lib::RunOptions;

/// Drive an Android device through a natural-language task.
#[derive(Parser, Debug)]
#[command(name = "tutan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The task to perform, e.g. "open settings and enable wifi"
    #[arg(num_args = 1..)]
    task: Vec<String>,

    /// Device serial (defaults to the first online device)
    #[arg(short, long)]
    device: Option<String>,

    /// Path to config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Connect to a device over Wi-Fi first (host[:port])
    #[arg(long)]
    connect: Option<String>,

    /// List adb devices and exit
    #[arg(long)]
    list_devices: bool,

    /// List recorded sessions and exit
    #[arg(long)]
    list_sessions: bool,

    /// Keep session records in memory only
    #[arg(long)]
    no_persist: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let opts = RunOptions {
        config_path: cli.config,
        device: cli.device,
        task: (!cli.task.is_empty()).then(|| cli.task.join(" ")),
        connect: cli.connect,
        list_devices: cli.list_devices,
        list_sessions: cli.list_sessions,
        no_persist: cli.no_persist,
    };

    match tutan_lib::run(opts).await {
        Ok(Some(outcome)) if outcome.status != TaskStatus::Completed => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
