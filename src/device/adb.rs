use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::DeviceConfig;
use crate::errors::{TutanError, TutanResult};

/// Captured result of one adb invocation.
#[derive(Debug, Clone)]
pub struct AdbOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl AdbOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Turn a non-zero exit into `TutanError::Adb`.
    pub fn check(self, what: &str) -> TutanResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(TutanError::Adb(format!(
                "{what} exited with {}: {}",
                self.code,
                self.stderr.trim()
            )))
        }
    }
}

/// Handle on the adb binary. Cheap to clone; every call spawns a process.
#[derive(Debug, Clone)]
pub struct Adb {
    path: PathBuf,
    timeout: Duration,
}

impl Adb {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    /// Resolve the binary: `ADB_PATH`, then `device.adb_path`, then the
    /// default SDK install location, then plain `adb` from `PATH`.
    pub fn locate(config: &DeviceConfig) -> Self {
        let timeout = Duration::from_secs(config.adb_timeout_secs);

        if let Ok(env_path) = std::env::var("ADB_PATH") {
            let p = PathBuf::from(env_path);
            if p.exists() {
                tracing::debug!(path = %p.display(), "adb from ADB_PATH");
                return Self::new(p, timeout);
            }
        }
        if let Some(p) = config.adb_path.as_ref().filter(|p| p.exists()) {
            tracing::debug!(path = %p.display(), "adb from config");
            return Self::new(p.clone(), timeout);
        }
        if let Some(p) = sdk_adb().filter(|p| p.exists()) {
            tracing::debug!(path = %p.display(), "adb from Android SDK");
            return Self::new(p, timeout);
        }
        Self::new("adb", timeout)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exec(&self, args: &[&str]) -> TutanResult<AdbOutput> {
        self.exec_with_timeout(args, self.timeout).await
    }

    /// Run adb with `args`. A timeout kills the child and reports exit -1,
    /// the same as a spawn failure.
    pub async fn exec_with_timeout(&self, args: &[&str], timeout: Duration) -> TutanResult<AdbOutput> {
        tracing::debug!(adb = %self.path.display(), ?args, "adb exec");

        let child = Command::new(&self.path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TutanError::Adb(format!("failed to spawn {}: {e}", self.path.display())))?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(AdbOutput {
                code: output.status.code().unwrap_or(-1),
                stdout: output.stdout,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(e)) => Err(TutanError::Adb(format!("adb {}: {e}", args.join(" ")))),
            Err(_) => {
                tracing::error!(?args, timeout_secs = timeout.as_secs(), "adb command timed out");
                Ok(AdbOutput {
                    code: -1,
                    stdout: Vec::new(),
                    stderr: "timeout".to_string(),
                })
            }
        }
    }
}

fn sdk_adb() -> Option<PathBuf> {
    let exe = if cfg!(windows) { "adb.exe" } else { "adb" };
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Android").join("sdk"))
    } else if cfg!(windows) {
        dirs::data_local_dir().map(|d| d.join("Android").join("Sdk"))
    } else {
        dirs::home_dir().map(|h| h.join("Android").join("Sdk"))
    };
    base.map(|b| b.join("platform-tools").join(exe))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_maps_nonzero_exit_to_error() {
        let out = AdbOutput {
            code: 1,
            stdout: Vec::new(),
            stderr: "error: device offline\n".into(),
        };
        let err = out.check("input tap").unwrap_err();
        assert_eq!(
            err.to_string(),
            "ADB error: input tap exited with 1: error: device offline"
        );
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let adb = Adb::new("/nonexistent/tutan-adb", Duration::from_secs(1));
        assert!(adb.exec(&["devices"]).await.is_err());
    }
}
