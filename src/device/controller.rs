//! Perception and action gateway for one device.
//!
//! Perception prefers the helper's accessibility tree and drops to vision
//! mode on the first failure, for good. Taps try the helper first (while in
//! accessibility mode) and fall back to `adb shell input tap`.
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;

use crate::config::DeviceConfig;
use crate::device::action::{DeviceAction, ScrollDirection, Target};
use crate::device::adb::Adb;
use crate::device::companion::{Companion, CompanionClient};
use crate::device::shell::{AdbShell, KeyCode, ShellChannel};
use crate::errors::{TutanError, TutanResult};
use crate::perception::ref_system::RefSystem;
use crate::perception::types::{Perception, PerceptionMode};

pub const VISION_PLACEHOLDER: &str = "UI context unavailable: the accessibility service \
could not be reached. Use visual reasoning to decide the next step.";

const DEFAULT_SCREEN: (u32, u32) = (1080, 1920);
const SCROLL_DURATION_MS: u32 = 300;
const HORIZONTAL_SCROLL_PX: i32 = 200;

pub struct DeviceController {
    serial: String,
    mode: PerceptionMode,
    refs: RefSystem,
    companion: Option<Arc<dyn Companion>>,
    shell: Option<Arc<dyn ShellChannel>>,
    helper_port: u16,
    focus_delay: Duration,
}

impl DeviceController {
    /// Controller talking to the helper on the forwarded port and to adb.
    pub fn connect(serial: &str, adb: Adb, config: &DeviceConfig) -> TutanResult<Self> {
        let companion = CompanionClient::new(
            config.helper_port,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::with_channels(
            serial,
            Some(Arc::new(companion)),
            Some(Arc::new(AdbShell::new(adb, serial))),
        )
        .with_helper_port(config.helper_port)
        .with_focus_delay(Duration::from_millis(config.focus_delay_ms)))
    }

    /// Controller over explicit mechanisms; either may be absent.
    pub fn with_channels(
        serial: &str,
        companion: Option<Arc<dyn Companion>>,
        shell: Option<Arc<dyn ShellChannel>>,
    ) -> Self {
        Self {
            serial: serial.to_string(),
            mode: PerceptionMode::Accessibility,
            refs: RefSystem::new(),
            companion,
            shell,
            helper_port: 8080,
            focus_delay: Duration::from_millis(500),
        }
    }

    pub fn with_helper_port(mut self, port: u16) -> Self {
        self.helper_port = port;
        self
    }

    pub fn with_focus_delay(mut self, delay: Duration) -> Self {
        self.focus_delay = delay;
        self
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn mode(&self) -> PerceptionMode {
        self.mode
    }

    pub fn ref_system(&self) -> &RefSystem {
        &self.refs
    }

    /// Forward the helper port over adb. Failure is logged; perception will
    /// then degrade on its own.
    pub async fn setup_forwarding(&self) -> bool {
        let Some(shell) = &self.shell else {
            return false;
        };
        match shell.forward(self.helper_port).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(serial = %self.serial, error = %e, "port forwarding failed");
                false
            }
        }
    }

    pub async fn perceive(&mut self) -> Perception {
        if self.mode == PerceptionMode::Accessibility {
            match self.fetch_tree().await {
                Ok(tree) => {
                    let context = self.refs.parse(&tree);
                    return Perception {
                        context,
                        mode: PerceptionMode::Accessibility,
                        elements: self.refs.len(),
                    };
                }
                Err(e) => {
                    self.mode = self.mode.degrade();
                    tracing::warn!(
                        serial = %self.serial,
                        error = %e,
                        "accessibility tree unavailable, switching to vision mode"
                    );
                }
            }
        }

        // Without a tree there is no snapshot to address into.
        self.refs.reset();
        Perception {
            context: VISION_PLACEHOLDER.to_string(),
            mode: PerceptionMode::Vision,
            elements: 0,
        }
    }

    async fn fetch_tree(&self) -> TutanResult<serde_json::Value> {
        match &self.companion {
            Some(companion) => companion.aria_tree().await,
            None => Err(TutanError::Device("no helper endpoint configured".into())),
        }
    }

    /// Base64 PNG of the screen, for display only.
    pub async fn screenshot(&self) -> Option<String> {
        let shell = self.shell.as_ref()?;
        match shell.screenshot().await {
            Ok(bytes) => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            Err(e) => {
                tracing::debug!(serial = %self.serial, error = %e, "screenshot failed");
                None
            }
        }
    }

    /// Run one action. `false` means it failed; nothing is rolled back.
    pub async fn execute(&mut self, action: &DeviceAction) -> bool {
        tracing::info!(serial = %self.serial, action = action.kind(), "executing action");
        let ok = match action {
            DeviceAction::Click { target } => self.click(target).await,
            DeviceAction::Type { ref_id, text } => self.type_text(ref_id.as_deref(), text).await,
            DeviceAction::Scroll { direction } => self.scroll(*direction).await,
            DeviceAction::LongPress { target, duration_ms } => {
                self.long_press(target, *duration_ms).await
            }
            DeviceAction::Back => self.key(KeyCode::Back).await,
            DeviceAction::Home => self.key(KeyCode::Home).await,
            DeviceAction::Wait { seconds } => {
                tokio::time::sleep(Duration::try_from_secs_f64(*seconds).unwrap_or_default()).await;
                true
            }
        };
        if !ok {
            tracing::warn!(serial = %self.serial, action = action.kind(), "action failed");
        }
        ok
    }

    fn resolve(&self, target: &Target) -> Option<(i32, i32)> {
        match target {
            Target::Point { x, y } => Some((*x, *y)),
            Target::Ref { ref_id } => {
                let node = self.refs.get_node(ref_id);
                if node.is_none() {
                    tracing::error!(serial = %self.serial, ref_id = %ref_id, "ref id not in current snapshot");
                }
                node.map(|n| n.bounds.center())
            }
        }
    }

    async fn click(&self, target: &Target) -> bool {
        let Some((x, y)) = self.resolve(target) else {
            return false;
        };

        if self.mode == PerceptionMode::Accessibility {
            if let Some(companion) = &self.companion {
                match companion.tap(x, y).await {
                    Ok(true) => return true,
                    Ok(false) => {
                        tracing::debug!(serial = %self.serial, x, y, "helper tap refused, using shell")
                    }
                    Err(e) => {
                        tracing::debug!(serial = %self.serial, error = %e, "helper tap failed, using shell")
                    }
                }
            }
        }

        let Some(shell) = &self.shell else {
            return false;
        };
        match shell.tap(x, y).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(serial = %self.serial, error = %e, "shell tap failed");
                false
            }
        }
    }

    /// The focus click is always attempted first, and its failure does not
    /// stop the text from being sent.
    async fn type_text(&self, ref_id: Option<&str>, text: &str) -> bool {
        if let Some(ref_id) = ref_id {
            let focused = self
                .click(&Target::Ref {
                    ref_id: ref_id.to_string(),
                })
                .await;
            if !focused {
                tracing::warn!(serial = %self.serial, ref_id, "focus click failed, typing anyway");
            }
            tokio::time::sleep(self.focus_delay).await;
        }

        let Some(shell) = &self.shell else {
            return false;
        };
        match shell.input_text(text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(serial = %self.serial, error = %e, "text input failed");
                false
            }
        }
    }

    async fn scroll(&self, direction: ScrollDirection) -> bool {
        let Some(shell) = &self.shell else {
            return false;
        };
        let (width, height) = match shell.screen_size().await {
            Ok(size) => size,
            Err(e) => {
                tracing::debug!(error = %e, assumed = ?DEFAULT_SCREEN, "screen size unknown");
                DEFAULT_SCREEN
            }
        };
        let (from, to) = scroll_path(direction, width as i32, height as i32);
        match shell.swipe(from, to, SCROLL_DURATION_MS).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(serial = %self.serial, error = %e, "scroll swipe failed");
                false
            }
        }
    }

    async fn long_press(&self, target: &Target, duration_ms: u32) -> bool {
        let Some((x, y)) = self.resolve(target) else {
            return false;
        };
        let Some(shell) = &self.shell else {
            return false;
        };
        match shell.swipe((x, y), (x, y), duration_ms).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(serial = %self.serial, error = %e, "long press failed");
                false
            }
        }
    }

    async fn key(&self, key: KeyCode) -> bool {
        let Some(shell) = &self.shell else {
            return false;
        };
        match shell.key_event(key).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(serial = %self.serial, error = %e, "key event failed");
                false
            }
        }
    }
}

/// Swipe endpoints for a scroll. "down" moves content up, i.e. the finger
/// travels from the lower to the upper part of the screen.
pub fn scroll_path(direction: ScrollDirection, width: i32, height: i32) -> ((i32, i32), (i32, i32)) {
    let cx = width / 2;
    let cy = height / 2;
    let offset = height * 2 / 5;
    match direction {
        ScrollDirection::Up => ((cx, cy - offset), (cx, cy + offset)),
        ScrollDirection::Down => ((cx, cy + offset), (cx, cy - offset)),
        ScrollDirection::Left => ((cx + HORIZONTAL_SCROLL_PX, cy), (cx - HORIZONTAL_SCROLL_PX, cy)),
        ScrollDirection::Right => ((cx - HORIZONTAL_SCROLL_PX, cy), (cx + HORIZONTAL_SCROLL_PX, cy)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertical_scroll_spans_eighty_percent() {
        let (from, to) = scroll_path(ScrollDirection::Down, 1080, 2000);
        assert_eq!(from, (540, 1800));
        assert_eq!(to, (540, 200));
        let (from, to) = scroll_path(ScrollDirection::Up, 1080, 2000);
        assert_eq!((from, to), ((540, 200), (540, 1800)));
    }

    #[test]
    fn horizontal_scroll_is_fixed_width() {
        let (from, to) = scroll_path(ScrollDirection::Left, 1080, 1920);
        assert_eq!((from, to), ((740, 960), (340, 960)));
    }

    #[tokio::test]
    async fn no_mechanisms_means_vision_and_failures() {
        let mut ctrl = DeviceController::with_channels("emulator-5554", None, None);
        let p = ctrl.perceive().await;
        assert_eq!(p.mode, PerceptionMode::Vision);
        assert_eq!(p.context, VISION_PLACEHOLDER);
        assert!(!ctrl.execute(&DeviceAction::Back).await);
        assert!(!ctrl.execute(&DeviceAction::Click { target: Target::Point { x: 1, y: 1 } }).await);
        assert!(!ctrl.setup_forwarding().await);
    }
}
