//! Low-level input injection over `adb shell`.
use std::sync::OnceLock;

use async_trait::async_trait;
use base64::Engine as _;
use regex::Regex;

use crate::device::adb::Adb;
use crate::errors::{TutanError, TutanResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Back,
    Home,
}

impl KeyCode {
    pub fn as_keyevent(&self) -> &'static str {
        match self {
            KeyCode::Back => "KEYCODE_BACK",
            KeyCode::Home => "KEYCODE_HOME",
        }
    }
}

/// Shell-level access to one device. Every call maps a non-zero exit status
/// to an error.
#[async_trait]
pub trait ShellChannel: Send + Sync {
    async fn tap(&self, x: i32, y: i32) -> TutanResult<()>;

    async fn swipe(&self, from: (i32, i32), to: (i32, i32), duration_ms: u32) -> TutanResult<()>;

    /// Inject literal text. Implementations handle escaping.
    async fn input_text(&self, text: &str) -> TutanResult<()>;

    async fn key_event(&self, key: KeyCode) -> TutanResult<()>;

    /// Physical screen size in pixels.
    async fn screen_size(&self) -> TutanResult<(u32, u32)>;

    /// PNG bytes of the current screen.
    async fn screenshot(&self) -> TutanResult<Vec<u8>>;

    /// Forward a local TCP port to the same port on the device.
    async fn forward(&self, port: u16) -> TutanResult<()>;
}

pub struct AdbShell {
    adb: Adb,
    serial: String,
}

impl AdbShell {
    pub fn new(adb: Adb, serial: impl Into<String>) -> Self {
        Self {
            adb,
            serial: serial.into(),
        }
    }

    async fn shell(&self, what: &str, args: &[&str]) -> TutanResult<()> {
        let mut full = vec!["-s", self.serial.as_str(), "shell"];
        full.extend_from_slice(args);
        self.adb.exec(&full).await?.check(what)?;
        Ok(())
    }
}

#[async_trait]
impl ShellChannel for AdbShell {
    async fn tap(&self, x: i32, y: i32) -> TutanResult<()> {
        tracing::debug!(serial = %self.serial, x, y, "shell tap");
        let (x, y) = (x.to_string(), y.to_string());
        self.shell("input tap", &["input", "tap", x.as_str(), y.as_str()])
            .await
    }

    async fn swipe(&self, from: (i32, i32), to: (i32, i32), duration_ms: u32) -> TutanResult<()> {
        tracing::debug!(serial = %self.serial, ?from, ?to, duration_ms, "shell swipe");
        let args = [
            from.0.to_string(),
            from.1.to_string(),
            to.0.to_string(),
            to.1.to_string(),
            duration_ms.to_string(),
        ];
        let mut full = vec!["input", "swipe"];
        full.extend(args.iter().map(String::as_str));
        self.shell("input swipe", &full).await
    }

    async fn input_text(&self, text: &str) -> TutanResult<()> {
        tracing::debug!(serial = %self.serial, chars = text.chars().count(), "shell text input");
        let mut last = Ok(());
        for attempt in text_input_attempts(text) {
            let args: Vec<&str> = attempt.args.iter().map(String::as_str).collect();
            last = self.shell(attempt.what, &args).await;
            if let Err(e) = &last {
                tracing::warn!(serial = %self.serial, via = attempt.what, error = %e, "text input attempt failed");
            } else {
                return Ok(());
            }
        }
        last
    }

    async fn key_event(&self, key: KeyCode) -> TutanResult<()> {
        tracing::debug!(serial = %self.serial, key = key.as_keyevent(), "shell keyevent");
        self.shell("input keyevent", &["input", "keyevent", key.as_keyevent()])
            .await
    }

    async fn screen_size(&self) -> TutanResult<(u32, u32)> {
        let out = self
            .adb
            .exec(&["-s", self.serial.as_str(), "shell", "wm", "size"])
            .await?
            .check("wm size")?;
        parse_screen_size(&out.stdout_text())
            .ok_or_else(|| TutanError::Adb(format!("unexpected `wm size` output: {}", out.stdout_text().trim())))
    }

    async fn screenshot(&self) -> TutanResult<Vec<u8>> {
        let out = self
            .adb
            .exec(&["-s", self.serial.as_str(), "exec-out", "screencap", "-p"])
            .await?
            .check("screencap")?;
        Ok(out.stdout)
    }

    async fn forward(&self, port: u16) -> TutanResult<()> {
        let spec = format!("tcp:{port}");
        self.adb
            .exec(&["-s", self.serial.as_str(), "forward", spec.as_str(), spec.as_str()])
            .await?
            .check("forward")?;
        tracing::info!(serial = %self.serial, port, "port forwarding established");
        Ok(())
    }
}

/// One way of getting text onto the device, as `adb shell` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextInputAttempt {
    pub what: &'static str,
    pub args: Vec<String>,
}

/// Ordered text injection attempts. `input text` cannot carry non-ASCII,
/// so such text goes first through the ADB Keyboard IME broadcast
/// (base64 payload), then falls back to the escaped `input text`.
pub fn text_input_attempts(text: &str) -> Vec<TextInputAttempt> {
    let typed = TextInputAttempt {
        what: "input text",
        args: vec!["input".into(), "text".into(), escape_input_text(text)],
    };
    if text.is_ascii() {
        return vec![typed];
    }
    let payload = base64::engine::general_purpose::STANDARD.encode(text.as_bytes());
    let broadcast = TextInputAttempt {
        what: "ADB_INPUT_B64 broadcast",
        args: vec![
            "am".into(),
            "broadcast".into(),
            "-a".into(),
            "ADB_INPUT_B64".into(),
            "--es".into(),
            "msg".into(),
            payload,
        ],
    };
    vec![broadcast, typed]
}

/// Encode text for `input text`: whitespace becomes the `%s` token, and
/// characters the device shell would interpret are backslash-escaped.
pub fn escape_input_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            c if c.is_whitespace() => out.push_str("%s"),
            '\\' | '\'' | '"' | '`' | '$' | '&' | '|' | ';' | '<' | '>' | '(' | ')' | '*'
            | '~' | '?' | '!' | '#' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Parse `wm size` output, preferring an override size over the physical one.
pub fn parse_screen_size(output: &str) -> Option<(u32, u32)> {
    static SIZE_RE: OnceLock<Regex> = OnceLock::new();
    let re = SIZE_RE.get_or_init(|| {
        Regex::new(r"(Physical|Override) size:\s*(\d+)x(\d+)").expect("static regex")
    });

    let mut physical = None;
    for caps in re.captures_iter(output) {
        let size = (caps[2].parse().ok()?, caps[3].parse().ok()?);
        if &caps[1] == "Override" {
            return Some(size);
        }
        physical = Some(size);
    }
    physical
}
