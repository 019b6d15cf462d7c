//! Operations exposed to a transport layer: one agent per device, tasks
//! started, aborted and stopped through an explicit registry.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::agent_engine::engine::Agent;
use crate::agent_engine::event_bus::EventBus;
use crate::agent_engine::loop_control::AbortFlag;
use crate::agent_engine::state::{AgentEvent, LoopConfig, TaskOutcome};
use crate::config::AppConfig;
use crate::device::controller::DeviceController;
use crate::device::manager::DeviceManager;
use crate::errors::{TutanError, TutanResult};
use crate::llm::registry::PlannerRegistry;
use crate::storage::store::SessionStore;

/// Builds a ready-to-run agent for a device.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn create(&self, serial: &str) -> TutanResult<Agent>;
}

/// Factory for real devices reached through adb and the helper app.
pub struct DeviceAgentFactory {
    manager: Arc<DeviceManager>,
    planners: PlannerRegistry,
    store: Arc<dyn SessionStore>,
    config: AppConfig,
}

impl DeviceAgentFactory {
    pub fn new(
        manager: Arc<DeviceManager>,
        planners: PlannerRegistry,
        store: Arc<dyn SessionStore>,
        config: AppConfig,
    ) -> Self {
        Self {
            manager,
            planners,
            store,
            config,
        }
    }
}

#[async_trait]
impl AgentFactory for DeviceAgentFactory {
    async fn create(&self, serial: &str) -> TutanResult<Agent> {
        match self.manager.find(serial).await {
            Some(d) if d.is_online() => {}
            Some(d) => {
                return Err(TutanError::Device(format!("device {serial} is {}", d.status)));
            }
            None => return Err(TutanError::Device(format!("device {serial} not found"))),
        }

        let planner = self.planners.get_active()?;
        let device = DeviceController::connect(serial, self.manager.adb().clone(), &self.config.device)?;
        if !device.setup_forwarding().await {
            tracing::warn!(serial, "helper port not forwarded, accessibility perception will fail");
        }

        let provider = &self.config.llm.active_provider;
        let model = self
            .config
            .llm
            .providers
            .get(provider)
            .map(|p| p.model.clone())
            .unwrap_or_default();
        Ok(Agent::new(
            device,
            planner,
            Arc::clone(&self.store),
            LoopConfig::from(&self.config.agent),
        )
        .with_model_config(serde_json::json!({ "provider": provider, "model": model })))
    }
}

struct AgentSlot {
    agent: Arc<Mutex<Agent>>,
    abort: AbortFlag,
    events: EventBus,
    task: Option<JoinHandle<TaskOutcome>>,
}

impl AgentSlot {
    /// A task handle still running, or the agent locked by a task whose
    /// handle was taken by `wait_task`.
    fn is_busy(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished()) || self.agent.try_lock().is_err()
    }
}

/// Map of device id to its agent. Entries are only created by
/// `start_agent` and only removed by `stop_agent`/`shutdown`, so at most one
/// agent ever drives a device.
pub struct AgentRegistry {
    factory: Arc<dyn AgentFactory>,
    agents: Mutex<HashMap<String, AgentSlot>>,
    /// Per-device gates serialising `start_agent`, so the factory runs
    /// outside the `agents` lock.
    starting: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AgentRegistry {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            factory,
            agents: Mutex::new(HashMap::new()),
            starting: Mutex::new(HashMap::new()),
        }
    }

    /// Create the device's agent unless it already exists. A slow factory
    /// only holds up other starts for the same device.
    pub async fn start_agent(&self, serial: &str) -> TutanResult<()> {
        let gate = {
            let mut starting = self.starting.lock().await;
            Arc::clone(starting.entry(serial.to_string()).or_default())
        };
        let _starting = gate.lock().await;

        if self.agents.lock().await.contains_key(serial) {
            tracing::debug!(serial, "agent already started");
            return Ok(());
        }
        let agent = self.factory.create(serial).await?;
        let slot = AgentSlot {
            abort: agent.abort_flag(),
            events: agent.events().clone(),
            agent: Arc::new(Mutex::new(agent)),
            task: None,
        };
        self.agents.lock().await.insert(serial.to_string(), slot);
        tracing::info!(serial, "agent started");
        Ok(())
    }

    /// Spawn `task` on the device's agent. The receiver is subscribed before
    /// the task starts, so it sees every event.
    pub async fn run_task(
        &self,
        serial: &str,
        task: String,
    ) -> TutanResult<broadcast::Receiver<AgentEvent>> {
        let mut agents = self.agents.lock().await;
        let slot = agents
            .get_mut(serial)
            .ok_or_else(|| TutanError::Agent(format!("no agent for device {serial}")))?;
        if slot.is_busy() {
            return Err(TutanError::Agent(format!("a task is already running on {serial}")));
        }

        // Nothing is running, so a leftover request can only be stale.
        slot.abort.clear();
        let rx = slot.events.subscribe();
        let agent = Arc::clone(&slot.agent);
        slot.task = Some(tokio::spawn(async move {
            let mut agent = agent.lock().await;
            agent.run_task(&task).await
        }));
        Ok(rx)
    }

    /// Ask the device's task to stop at its next step boundary. `false` when
    /// the device has no agent. A request made while idle is discarded by
    /// the next `run_task`.
    pub async fn abort_task(&self, serial: &str) -> bool {
        let agents = self.agents.lock().await;
        match agents.get(serial) {
            Some(slot) => {
                slot.abort.request();
                tracing::info!(serial, busy = slot.is_busy(), "abort requested");
                true
            }
            None => false,
        }
    }

    /// Wait for the device's current task and return its outcome.
    pub async fn wait_task(&self, serial: &str) -> TutanResult<TaskOutcome> {
        let handle = {
            let mut agents = self.agents.lock().await;
            agents
                .get_mut(serial)
                .and_then(|slot| slot.task.take())
                .ok_or_else(|| TutanError::Agent(format!("no task for device {serial}")))?
        };
        handle
            .await
            .map_err(|e| TutanError::Agent(format!("task on {serial} ended abnormally: {e}")))
    }

    pub async fn is_running(&self, serial: &str) -> bool {
        self.agents
            .lock()
            .await
            .get(serial)
            .is_some_and(AgentSlot::is_busy)
    }

    pub async fn active_devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self.agents.lock().await.keys().cloned().collect();
        devices.sort();
        devices
    }

    /// Remove the device's agent, aborting and awaiting any running task.
    pub async fn stop_agent(&self, serial: &str) -> bool {
        let slot = self.agents.lock().await.remove(serial);
        match slot {
            Some(slot) => {
                finish_slot(serial, slot).await;
                tracing::info!(serial, "agent stopped");
                true
            }
            None => false,
        }
    }

    pub async fn shutdown(&self) {
        let slots: Vec<(String, AgentSlot)> = self.agents.lock().await.drain().collect();
        for (serial, slot) in slots {
            finish_slot(&serial, slot).await;
        }
        tracing::info!("agent registry shut down");
    }
}

async fn finish_slot(serial: &str, slot: AgentSlot) {
    let Some(task) = slot.task else {
        return;
    };
    if !task.is_finished() {
        slot.abort.request();
    }
    match task.await {
        Ok(outcome) => tracing::info!(serial, status = %outcome.status, "task finished"),
        Err(e) => tracing::warn!(serial, error = %e, "task ended abnormally"),
    }
}
