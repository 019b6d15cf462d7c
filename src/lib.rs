pub mod agent_engine;
pub mod commands;
pub mod config;
pub mod device;
pub mod errors;
pub mod llm;
pub mod perception;
pub mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::agent_engine::state::TaskOutcome;
use crate::commands::{AgentRegistry, DeviceAgentFactory};
use crate::device::adb::Adb;
use crate::device::manager::DeviceManager;
use crate::errors::{TutanError, TutanResult};
use crate::llm::registry::PlannerRegistry;
use crate::storage::{JsonlSessionStore, MemorySessionStore, SessionStore};

/// What one invocation of the binary should do.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub device: Option<String>,
    pub task: Option<String>,
    pub connect: Option<String>,
    pub list_devices: bool,
    pub list_sessions: bool,
    pub no_persist: bool,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_json<T: Serialize>(value: &T) -> TutanResult<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Run one task (or a device/session query) to completion. Events and query
/// results go to stdout as JSON lines, logs to stderr.
pub async fn run(opts: RunOptions) -> TutanResult<Option<TaskOutcome>> {
    init_tracing();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let config = config::load_config(opts.config_path.as_deref())?;

    let store: Arc<dyn SessionStore> = if opts.no_persist {
        Arc::new(MemorySessionStore::new())
    } else {
        Arc::new(JsonlSessionStore::open(config.storage.resolve_sessions_dir()).await?)
    };

    if opts.list_sessions {
        for session in store.list_sessions().await? {
            print_json(&session)?;
        }
        return Ok(None);
    }

    let manager = Arc::new(DeviceManager::new(Adb::locate(&config.device), &config.device));

    if let Some(address) = &opts.connect {
        let message = manager.connect_wireless(address).await?;
        tracing::info!(address = %address, "{message}");
    }

    if opts.list_devices {
        for device in manager.scan(true).await {
            print_json(&device)?;
        }
        return Ok(None);
    }

    let Some(task) = opts.task.clone() else {
        if opts.connect.is_some() {
            return Ok(None);
        }
        return Err(TutanError::Config("no task given".into()));
    };

    let serial = match &opts.device {
        Some(serial) => serial.clone(),
        None => manager
            .scan(true)
            .await
            .into_iter()
            .find(|d| d.is_online())
            .map(|d| d.serial)
            .ok_or_else(|| TutanError::Device("no online device found".into()))?,
    };

    manager.start().await;
    let planners = PlannerRegistry::from_config(&config);
    let factory = DeviceAgentFactory::new(Arc::clone(&manager), planners, store, config);
    let registry = AgentRegistry::new(Arc::new(factory));

    let result = drive_task(&registry, &serial, task).await;

    registry.shutdown().await;
    manager.stop().await;
    result.map(Some)
}

async fn drive_task(registry: &AgentRegistry, serial: &str, task: String) -> TutanResult<TaskOutcome> {
    registry.start_agent(serial).await?;
    let mut events = registry.run_task(serial, task).await?;

    let outcome = registry.wait_task(serial);
    tokio::pin!(outcome);
    let mut events_open = true;
    loop {
        tokio::select! {
            result = &mut outcome => {
                while let Ok(event) = events.try_recv() {
                    print_json(&event)?;
                }
                return result;
            }
            event = events.recv(), if events_open => match event {
                Ok(event) => print_json(&event)?,
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "event consumer lagging"),
                Err(RecvError::Closed) => events_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!(serial, "interrupt received, aborting after the current step");
                registry.abort_task(serial).await;
            }
        }
    }
}
