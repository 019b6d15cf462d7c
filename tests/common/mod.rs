#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use tutan_lib::agent_engine::engine::Agent;
use tutan_lib::agent_engine::event_bus::EventBus;
use tutan_lib::agent_engine::loop_control::AbortFlag;
use tutan_lib::agent_engine::state::{AgentEvent, LoopConfig};
use tutan_lib::device::companion::Companion;
use tutan_lib::device::controller::DeviceController;
use tutan_lib::device::shell::{KeyCode, ShellChannel};
use tutan_lib::errors::{TutanError, TutanResult};
use tutan_lib::llm::provider::Planner;
use tutan_lib::llm::types::{ChatMessage, PlanDecision};
use tutan_lib::storage::MemorySessionStore;

pub const SERIAL: &str = "emulator-5554";

/// Shared, ordered record of every device-side call.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

/// Root FrameLayout (filtered, e1) with a Login button (e2) and a Username
/// field (e3).
pub fn login_tree() -> Value {
    json!({
        "class": "android.widget.FrameLayout",
        "bounds": {"left": 0, "top": 0, "right": 1080, "bottom": 1920},
        "children": [
            {
                "class": "android.widget.Button",
                "text": "Login",
                "clickable": true,
                "bounds": {"left": 0, "top": 100, "right": 1080, "bottom": 200}
            },
            {
                "class": "android.widget.EditText",
                "contentDescription": "Username",
                "editable": true,
                "bounds": {"left": 100, "top": 300, "right": 501, "bottom": 401}
            }
        ]
    })
}

pub struct FakeCompanion {
    tree: Mutex<Option<Value>>,
    tap_ok: AtomicBool,
    tree_calls: AtomicUsize,
    log: CallLog,
}

impl FakeCompanion {
    /// `tree: None` makes every tree query fail.
    pub fn new(tree: Option<Value>, log: CallLog) -> Self {
        Self {
            tree: Mutex::new(tree),
            tap_ok: AtomicBool::new(true),
            tree_calls: AtomicUsize::new(0),
            log,
        }
    }

    pub fn set_tree(&self, tree: Option<Value>) {
        *self.tree.lock().unwrap() = tree;
    }

    pub fn set_tap_ok(&self, ok: bool) {
        self.tap_ok.store(ok, Ordering::SeqCst);
    }

    pub fn tree_calls(&self) -> usize {
        self.tree_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Companion for FakeCompanion {
    async fn aria_tree(&self) -> TutanResult<Value> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        self.tree
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TutanError::Companion("connection refused".into()))
    }

    async fn tap(&self, x: i32, y: i32) -> TutanResult<bool> {
        self.log.push(format!("companion_tap {x} {y}"));
        Ok(self.tap_ok.load(Ordering::SeqCst))
    }
}

pub struct FakeShell {
    failing: Mutex<HashSet<&'static str>>,
    log: CallLog,
}

impl FakeShell {
    pub fn new(log: CallLog) -> Self {
        Self {
            failing: Mutex::new(HashSet::new()),
            log,
        }
    }

    /// Make one operation (`tap`, `swipe`, `text`, `key`, ...) exit non-zero.
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    fn record(&self, op: &'static str, entry: String) -> TutanResult<()> {
        self.log.push(entry);
        if self.failing.lock().unwrap().contains(op) {
            return Err(TutanError::Adb(format!("{op} exited with 1")));
        }
        Ok(())
    }
}

#[async_trait]
impl ShellChannel for FakeShell {
    async fn tap(&self, x: i32, y: i32) -> TutanResult<()> {
        self.record("tap", format!("shell_tap {x} {y}"))
    }

    async fn swipe(&self, from: (i32, i32), to: (i32, i32), duration_ms: u32) -> TutanResult<()> {
        self.record(
            "swipe",
            format!("swipe {} {} {} {} {duration_ms}", from.0, from.1, to.0, to.1),
        )
    }

    async fn input_text(&self, text: &str) -> TutanResult<()> {
        self.record("text", format!("text {text}"))
    }

    async fn key_event(&self, key: KeyCode) -> TutanResult<()> {
        self.record("key", format!("key {}", key.as_keyevent()))
    }

    async fn screen_size(&self) -> TutanResult<(u32, u32)> {
        Ok((1080, 1920))
    }

    async fn screenshot(&self) -> TutanResult<Vec<u8>> {
        self.record("screenshot", "screenshot".into())?;
        Ok(b"\x89PNG".to_vec())
    }

    async fn forward(&self, port: u16) -> TutanResult<()> {
        self.record("forward", format!("forward {port}"))
    }
}

/// One planner call as the planner saw it.
#[derive(Debug, Clone)]
pub struct PlanCall {
    pub context: String,
    pub history: Vec<ChatMessage>,
}

/// Replays a fixed script of decisions; once the script runs out it keeps
/// answering `back`.
pub struct ScriptedPlanner {
    script: Mutex<VecDeque<TutanResult<PlanDecision>>>,
    calls: Mutex<Vec<PlanCall>>,
    abort_on_call: Mutex<Option<(usize, AbortFlag)>>,
}

impl ScriptedPlanner {
    pub fn new(script: Vec<TutanResult<PlanDecision>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            abort_on_call: Mutex::new(None),
        }
    }

    /// Raise `flag` while answering the `n`th call (1-based), i.e. mid-step.
    pub fn abort_during_call(&self, n: usize, flag: AbortFlag) {
        *self.abort_on_call.lock().unwrap() = Some((n, flag));
    }

    pub fn calls(&self) -> Vec<PlanCall> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn decision(action: &str, params: Value) -> TutanResult<PlanDecision> {
    Ok(PlanDecision {
        thinking: format!("do {action}"),
        action: action.to_string(),
        params,
    })
}

#[async_trait]
impl Planner for ScriptedPlanner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn plan(
        &self,
        _task: &str,
        context: &str,
        history: &[ChatMessage],
    ) -> TutanResult<PlanDecision> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(PlanCall {
                context: context.to_string(),
                history: history.to_vec(),
            });
            calls.len()
        };
        if let Some((at, flag)) = self.abort_on_call.lock().unwrap().as_ref() {
            if *at == n {
                flag.request();
            }
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| decision("back", json!({})))
    }
}

pub struct Harness {
    pub agent: Agent,
    pub companion: Arc<FakeCompanion>,
    pub shell: Arc<FakeShell>,
    pub planner: Arc<ScriptedPlanner>,
    pub store: Arc<MemorySessionStore>,
    pub log: CallLog,
}

pub fn loop_config(max_steps: u32) -> LoopConfig {
    LoopConfig {
        max_steps,
        ..LoopConfig::default()
    }
}

pub fn controller(companion: &Arc<FakeCompanion>, shell: &Arc<FakeShell>) -> DeviceController {
    DeviceController::with_channels(
        SERIAL,
        Some(Arc::clone(companion) as Arc<dyn Companion>),
        Some(Arc::clone(shell) as Arc<dyn ShellChannel>),
    )
}

pub fn harness(script: Vec<TutanResult<PlanDecision>>, tree: Option<Value>, config: LoopConfig) -> Harness {
    let log = CallLog::default();
    let companion = Arc::new(FakeCompanion::new(tree, log.clone()));
    let shell = Arc::new(FakeShell::new(log.clone()));
    let planner = Arc::new(ScriptedPlanner::new(script));
    let store = Arc::new(MemorySessionStore::new());
    let agent = Agent::new(
        controller(&companion, &shell),
        Arc::clone(&planner) as Arc<dyn Planner>,
        Arc::clone(&store) as Arc<dyn tutan_lib::storage::SessionStore>,
        config,
    );
    Harness {
        agent,
        companion,
        shell,
        planner,
        store,
        log,
    }
}

/// Everything emitted so far, in order.
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn subscribe(bus: &EventBus) -> tokio::sync::broadcast::Receiver<AgentEvent> {
    bus.subscribe()
}
