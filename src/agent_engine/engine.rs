use std::sync::Arc;

use serde_json::Value;

use crate::agent_engine::event_bus::EventBus;
use crate::agent_engine::history::ConversationHistory;
use crate::agent_engine::loop_control::{AbortFlag, LoopController};
use crate::agent_engine::state::{AgentEvent, AgentState, LoopConfig, TaskOutcome, TaskStatus};
use crate::device::action::DeviceAction;
use crate::device::controller::DeviceController;
use crate::llm::provider::Planner;
use crate::llm::types::PlanDecision;
use crate::storage::store::SessionStore;
use crate::storage::types::{SessionRecord, StepRecord, StepResult};

/// Drives one device through perceive → plan → act until the task ends.
/// One task at a time; `run_task` takes `&mut self`.
pub struct Agent {
    device: DeviceController,
    planner: Arc<dyn Planner>,
    store: Arc<dyn SessionStore>,
    events: EventBus,
    abort: AbortFlag,
    config: LoopConfig,
    state: AgentState,
    model_config: Value,
}

impl Agent {
    pub fn new(
        device: DeviceController,
        planner: Arc<dyn Planner>,
        store: Arc<dyn SessionStore>,
        config: LoopConfig,
    ) -> Self {
        let model_config = serde_json::json!({ "provider": planner.name() });
        Self {
            device,
            planner,
            store,
            events: EventBus::new(),
            abort: AbortFlag::new(),
            config,
            state: AgentState::Idle,
            model_config,
        }
    }

    /// Recorded with each session.
    pub fn with_model_config(mut self, model_config: Value) -> Self {
        self.model_config = model_config;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Handle for requesting an abort from outside the loop.
    pub fn abort_flag(&self) -> AbortFlag {
        self.abort.clone()
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn device(&self) -> &DeviceController {
        &self.device
    }

    pub async fn run_task(&mut self, task: &str) -> TaskOutcome {
        let session_id = uuid::Uuid::new_v4().to_string();
        let serial = self.device.serial().to_string();
        tracing::info!(serial = %serial, session_id = %session_id, task = %task, "task started");

        let record = SessionRecord::new(
            session_id.clone(),
            serial.clone(),
            task.to_string(),
            self.model_config.clone(),
        );
        if let Err(e) = self.store.create_session(&record).await {
            tracing::error!(session_id = %session_id, error = %e, "failed to persist session");
        }

        self.state = AgentState::Running { session_id: session_id.clone(), step: 0 };
        self.events.emit(AgentEvent::Status("Task started".into()));

        let mut ctrl = LoopController::new(self.config.max_steps);
        let mut history = ConversationHistory::new();

        let status = loop {
            // An exhausted budget wins over a pending abort.
            if ctrl.should_stop() {
                tracing::warn!(serial = %serial, max_steps = self.config.max_steps, "step budget exhausted");
                self.events.emit(AgentEvent::Error("Maximum steps reached".into()));
                break TaskStatus::Timeout;
            }
            if self.abort.is_requested() {
                tracing::info!(serial = %serial, step = ctrl.step(), "task aborted");
                self.events.emit(AgentEvent::Status("Task aborted by user".into()));
                break TaskStatus::Aborted;
            }

            let step = ctrl.begin_step();
            self.state = AgentState::Running { session_id: session_id.clone(), step };
            self.events.emit(AgentEvent::Status(format!("Executing Step {step}...")));

            let perception = self.device.perceive().await;
            let screenshot = if self.config.capture_screenshots {
                self.device.screenshot().await
            } else {
                None
            };
            self.events.emit(AgentEvent::UiUpdate {
                mode: perception.mode,
                elements: perception.elements,
                screenshot,
            });

            let decision = match self
                .planner
                .plan(task, &perception.context, history.messages())
                .await
            {
                Ok(d) => d,
                Err(e) => {
                    tracing::error!(serial = %serial, step, error = %e, "planner failed");
                    self.events.emit(AgentEvent::Error(e.to_string()));
                    break TaskStatus::Failed;
                }
            };
            tracing::info!(step, action = %decision.action, thinking = %decision.thinking, "planned");

            if decision.is_finish() {
                self.events.emit(AgentEvent::Done(decision.finish_message()));
                break TaskStatus::Completed;
            }

            let success = self.act(&decision).await;
            history.record_step(&decision.thinking, &decision.action, &decision.params, success);
            if !success {
                self.events.emit(AgentEvent::Warning(format!(
                    "Action {} failed, retrying...",
                    decision.action
                )));
            }

            let step_record = StepRecord {
                step_number: step,
                thinking: decision.thinking,
                action: decision.action,
                params: decision.params,
                result: StepResult::from(success),
                mode: perception.mode,
                timestamp: chrono::Utc::now(),
            };
            if let Err(e) = self.store.add_step(&session_id, &step_record).await {
                tracing::error!(session_id = %session_id, step, error = %e, "failed to persist step");
            }
            self.events.emit(AgentEvent::Step(step_record));

            tokio::time::sleep(self.config.settle_interval).await;
        };

        if let Err(e) = self.store.update_session_status(&session_id, status).await {
            tracing::error!(session_id = %session_id, error = %e, "failed to persist task status");
        }
        self.abort.clear();
        self.state = AgentState::Idle;
        tracing::info!(serial = %serial, session_id = %session_id, %status, steps = ctrl.step(), "task ended");

        TaskOutcome {
            session_id,
            status,
            steps: ctrl.step(),
        }
    }

    /// Parse and execute the planned action. A rejected action is an
    /// ordinary failure; the device is not touched.
    async fn act(&mut self, decision: &PlanDecision) -> bool {
        match DeviceAction::from_plan(&decision.action, &decision.params) {
            Ok(action) => self.device.execute(&action).await,
            Err(e) => {
                tracing::warn!(action = %decision.action, error = %e, "planned action rejected");
                false
            }
        }
    }
}
