//! Device-connection service: cached `adb devices` scans, wireless
//! connect/disconnect and a background refresh task with an explicit
//! start/stop lifecycle.
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::DeviceConfig;
use crate::device::adb::Adb;
use crate::device::shell::AdbShell;
use crate::errors::{TutanError, TutanResult};

const DEFAULT_WIRELESS_PORT: u16 = 5555;
const SERVER_RESTART_PAUSE: Duration = Duration::from_secs(1);

/// One line of `adb devices -l`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdbDevice {
    pub serial: String,
    /// `device`, `offline`, `unauthorized`, ...
    pub status: String,
    pub model: Option<String>,
    pub last_seen: DateTime<Utc>,
}

impl AdbDevice {
    pub fn is_online(&self) -> bool {
        self.status == "device"
    }
}

#[derive(Default)]
struct DeviceCache {
    devices: Vec<AdbDevice>,
    scanned_at: Option<Instant>,
}

pub struct DeviceManager {
    adb: Adb,
    cache: RwLock<DeviceCache>,
    cache_ttl: Duration,
    refresh_interval: Duration,
    connect_timeout: Duration,
    refresher: Mutex<Option<Refresher>>,
}

/// A running refresh task and the token that stops it. Each `start` gets a
/// fresh token, so the manager can be restarted after `stop`.
struct Refresher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl DeviceManager {
    pub fn new(adb: Adb, config: &DeviceConfig) -> Self {
        tracing::info!(adb = %adb.path().display(), "device manager created");
        Self {
            adb,
            cache: RwLock::new(DeviceCache::default()),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            refresh_interval: Duration::from_secs(config.refresh_interval_secs.max(1)),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            refresher: Mutex::new(None),
        }
    }

    pub fn adb(&self) -> &Adb {
        &self.adb
    }

    /// Shell channel bound to one device.
    pub fn shell(&self, serial: &str) -> AdbShell {
        AdbShell::new(self.adb.clone(), serial)
    }

    /// List devices. Within the cache TTL the previous scan is returned
    /// unless `force` is set. A failed `adb devices` yields an empty list.
    pub async fn scan(&self, force: bool) -> Vec<AdbDevice> {
        if !force {
            let cache = self.cache.read().await;
            if let Some(at) = cache.scanned_at {
                if at.elapsed() < self.cache_ttl {
                    return cache.devices.clone();
                }
            }
        }

        let out = match self.adb.exec(&["devices", "-l"]).await {
            Ok(out) if out.success() => out,
            Ok(out) => {
                tracing::error!(stderr = %out.stderr.trim(), "failed to list devices");
                return Vec::new();
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to list devices");
                return Vec::new();
            }
        };

        let devices = parse_devices(&out.stdout_text(), Utc::now());
        tracing::debug!(count = devices.len(), "device scan complete");
        let mut cache = self.cache.write().await;
        cache.devices = devices.clone();
        cache.scanned_at = Some(Instant::now());
        devices
    }

    /// Find one device by serial in a fresh-enough scan.
    pub async fn find(&self, serial: &str) -> Option<AdbDevice> {
        self.scan(false).await.into_iter().find(|d| d.serial == serial)
    }

    /// `adb connect <host[:port]>`. Returns adb's message on success.
    pub async fn connect_wireless(&self, address: &str) -> TutanResult<String> {
        let address = normalize_address(address);
        let out = self
            .adb
            .exec_with_timeout(&["connect", address.as_str()], self.connect_timeout)
            .await?;
        let stdout = out.stdout_text();
        // adb exits 0 even on "failed to connect"; only the message tells.
        if stdout.to_lowercase().contains("connected") && !stdout.to_lowercase().contains("failed") {
            tracing::info!(address = %address, "wireless device connected");
            self.scan(true).await;
            return Ok(format!("Successfully connected to {address}"));
        }
        let reason = if stdout.trim().is_empty() {
            out.stderr.trim().to_string()
        } else {
            stdout.trim().to_string()
        };
        Err(TutanError::Device(format!("connect {address} failed: {reason}")))
    }

    /// `adb disconnect [serial]`; without a serial every wireless device is dropped.
    pub async fn disconnect(&self, serial: Option<&str>) -> bool {
        let mut args = vec!["disconnect"];
        args.extend(serial);
        let ok = match self.adb.exec(&args).await {
            Ok(out) => out.success(),
            Err(e) => {
                tracing::error!(error = %e, "adb disconnect failed");
                false
            }
        };
        self.scan(true).await;
        ok
    }

    pub async fn restart_server(&self) {
        tracing::warn!("restarting adb server");
        if let Err(e) = self.adb.exec(&["kill-server"]).await {
            tracing::error!(error = %e, "adb kill-server failed");
        }
        tokio::time::sleep(SERVER_RESTART_PAUSE).await;
        if let Err(e) = self.adb.exec(&["start-server"]).await {
            tracing::error!(error = %e, "adb start-server failed");
        }
        self.scan(true).await;
    }

    /// Spawn the periodic refresh task. Calling it twice keeps the first task.
    pub async fn start(self: &Arc<Self>) {
        let mut slot = self.refresher.lock().await;
        if slot.is_some() {
            return;
        }
        let manager = Arc::clone(self);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let period = self.refresh_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        manager.scan(true).await;
                    }
                }
            }
            tracing::debug!("device refresh task exited");
        });
        *slot = Some(Refresher { cancel: token, handle });
        tracing::info!(interval_secs = period.as_secs(), "device refresh task started");
    }

    /// Cancel the refresh task and wait for it to finish.
    pub async fn stop(&self) {
        let refresher = self.refresher.lock().await.take();
        if let Some(Refresher { cancel, handle }) = refresher {
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "device refresh task ended abnormally");
            }
            tracing::info!("device manager stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.refresher
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

/// Append the default adb-over-TCP port when `address` has none.
pub fn normalize_address(address: &str) -> String {
    let address = address.trim();
    if address.contains(':') {
        address.to_string()
    } else {
        format!("{address}:{DEFAULT_WIRELESS_PORT}")
    }
}

/// Parse `adb devices -l` output. The header and blank lines are skipped;
/// `model:` is picked out of the long-format properties.
pub fn parse_devices(output: &str, seen_at: DateTime<Utc>) -> Vec<AdbDevice> {
    static MODEL_RE: OnceLock<Regex> = OnceLock::new();
    let model_re = MODEL_RE.get_or_init(|| Regex::new(r"model:(\S+)").expect("static regex"));

    output
        .lines()
        .skip_while(|l| !l.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let status = parts.next()?;
            Some(AdbDevice {
                serial: serial.to_string(),
                status: status.to_string(),
                model: model_re.captures(line).map(|c| c[1].to_string()),
                last_seen: seen_at,
            })
        })
        .collect()
}
