// License gate and update check
//
// The local license file records the expiry date and the last successful
// online verification. Online checks go through a LicenseServer; the
// Baserow client is the production one.

mod client;

pub use client::BaserowClient;

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{LicenseError, LicenseResult};
use crate::scheduler::ShutdownSignal;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Contents of the local license file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalLicense {
    #[serde(rename = "data_expiracao", default)]
    pub expires_on: Option<String>,

    #[serde(rename = "ultima_verificacao_online", default)]
    pub last_online_check: Option<String>,
}

impl LocalLicense {
    pub fn expiry(&self) -> LicenseResult<NaiveDate> {
        let raw = self.expires_on.as_deref().ok_or(LicenseError::MissingExpiry)?;
        parse_date(raw)
    }

    pub fn last_check(&self) -> Option<NaiveDateTime> {
        self.last_online_check
            .as_deref()
            .and_then(|raw| NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok())
    }

    fn mark_checked(&mut self, now: NaiveDateTime) {
        self.last_online_check = Some(now.format(TIMESTAMP_FORMAT).to_string());
    }
}

fn parse_date(raw: &str) -> LicenseResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| LicenseError::Parse(format!("'{}' is not a YYYY-MM-DD date", raw)))
}

/// A row of the license table
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LicenseRow {
    #[serde(rename = "chave", default)]
    pub key: Option<String>,

    #[serde(rename = "ativa", default)]
    pub active: bool,

    #[serde(rename = "validade", default)]
    pub valid_until: Option<String>,
}

/// A row of the release table
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdateRow {
    /// Stored either as a number or a string
    #[serde(rename = "versao", default)]
    pub version: Option<Value>,

    #[serde(default)]
    pub link: Option<String>,
}

/// A newer release than the running one
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateInfo {
    pub version: String,
    pub link: String,
}

/// Where license and release rows come from
pub trait LicenseServer: Send + Sync {
    /// License rows, optionally narrowed by a search term
    fn license_rows(&self, search: Option<&str>) -> LicenseResult<Vec<LicenseRow>>;

    /// Release rows, newest first
    fn update_rows(&self) -> LicenseResult<Vec<UpdateRow>>;
}

/// How a successful verification was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Checked online recently enough, no request made
    Cached,
    /// Server confirmed the license
    Verified,
    /// Server unreachable, local license still valid
    Offline,
}

pub struct LicenseManager {
    server: Arc<dyn LicenseServer>,
    license_file: PathBuf,
    check_interval: Duration,
}

impl LicenseManager {
    pub fn new(
        server: Arc<dyn LicenseServer>,
        license_file: impl Into<PathBuf>,
        check_interval: Duration,
    ) -> Self {
        Self {
            server,
            license_file: license_file.into(),
            check_interval,
        }
    }

    pub fn license_file(&self) -> &Path {
        &self.license_file
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    fn read_license(&self) -> LicenseResult<LocalLicense> {
        let content = match std::fs::read_to_string(&self.license_file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LicenseError::NotActivated)
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    fn write_license(&self, license: &LocalLicense) -> LicenseResult<()> {
        if let Some(parent) = self.license_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.license_file, serde_json::to_string_pretty(license)?)?;
        Ok(())
    }

    /// The local license, if present and not expired on `today`
    pub fn local_license(&self, today: NaiveDate) -> LicenseResult<LocalLicense> {
        let license = self.read_license()?;
        let expiry = license.expiry()?;
        if today > expiry {
            warn!(expired_on = %expiry, "License expired");
            return Err(LicenseError::Expired(expiry));
        }
        Ok(license)
    }

    /// Check the local license and, when the last online check is older
    /// than the interval, confirm it with the server.
    ///
    /// A license the server no longer lists as active is revoked and the
    /// local file is deleted.
    pub fn verify(&self, now: NaiveDateTime) -> LicenseResult<Verification> {
        let mut license = self.local_license(now.date())?;

        let recently_checked = license.last_check().is_some_and(|checked| {
            (now - checked)
                .to_std()
                .is_ok_and(|elapsed| elapsed < self.check_interval)
        });
        if recently_checked {
            debug!("License checked online recently");
            return Ok(Verification::Cached);
        }

        let rows = match self.server.license_rows(None) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Could not verify license online, will retry later");
                return Ok(Verification::Offline);
            }
        };

        let confirmed = rows
            .iter()
            .any(|row| row.active && row.valid_until == license.expires_on);

        if !confirmed {
            warn!("License deactivated on the server");
            if let Err(e) = std::fs::remove_file(&self.license_file) {
                warn!(error = %e, "Failed to delete revoked license file");
            }
            return Err(LicenseError::Revoked);
        }

        license.mark_checked(now);
        self.write_license(&license)?;
        info!("License verified online: active");
        Ok(Verification::Verified)
    }

    /// Activate with a code, writing the local license on success
    pub fn activate(&self, code: &str, now: NaiveDateTime) -> LicenseResult<NaiveDate> {
        let code = code.trim();
        if code.is_empty() {
            return Err(LicenseError::InvalidCode);
        }

        let rows = self.server.license_rows(Some(code))?;
        let row = rows
            .into_iter()
            .find(|row| row.active && row.key.as_deref() == Some(code))
            .ok_or(LicenseError::InvalidCode)?;

        let raw_expiry = row.valid_until.ok_or(LicenseError::MissingExpiry)?;
        let expiry = parse_date(&raw_expiry)?;
        if now.date() > expiry {
            return Err(LicenseError::Expired(expiry));
        }

        let mut license = LocalLicense {
            expires_on: Some(raw_expiry),
            last_online_check: None,
        };
        license.mark_checked(now);
        self.write_license(&license)?;

        info!(expires_on = %expiry, "Software activated");
        Ok(expiry)
    }

    /// Compare the newest release against `current`
    pub fn check_for_update(&self, current: &str) -> LicenseResult<Option<UpdateInfo>> {
        let rows = self.server.update_rows()?;
        let Some(latest) = rows.into_iter().next() else {
            return Ok(None);
        };

        let (Some(version), Some(link)) = (latest.version.as_ref().and_then(version_string), latest.link)
        else {
            return Ok(None);
        };

        let newer = match (version_number(&version), version_number(current)) {
            (Some(online), Some(running)) => online > running,
            _ => false,
        };

        if newer {
            info!(version = %version, current, "Update available");
            Ok(Some(UpdateInfo { version, link }))
        } else {
            Ok(None)
        }
    }
}

fn version_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric value of a "major.minor" version; later parts are ignored
fn version_number(version: &str) -> Option<f64> {
    let mut parts = version.trim().trim_start_matches('v').split('.');
    let major = parts.next()?;
    let numeric = match parts.next() {
        Some(minor) => format!("{}.{}", major, minor),
        None => major.to_string(),
    };
    numeric.parse().ok()
}

/// Messages from the background license monitor
#[derive(Debug)]
pub enum LicenseEvent {
    Verified(Verification),
    UpdateAvailable(UpdateInfo),
    /// The license is no longer valid; the application should exit
    Invalid(LicenseError),
}

/// Periodic license re-verification on its own thread
pub struct LicenseMonitor {
    signal: Arc<ShutdownSignal>,
    thread: Option<thread::JoinHandle<()>>,
}

impl LicenseMonitor {
    /// Check for an update once, then re-verify every check interval.
    /// Events go out on `events`, which may carry a wider message type.
    pub fn start<T>(
        manager: Arc<LicenseManager>,
        current_version: String,
        events: Sender<T>,
    ) -> std::io::Result<Self>
    where
        T: From<LicenseEvent> + Send + 'static,
    {
        let signal = Arc::new(ShutdownSignal::new());
        let monitor_signal = Arc::clone(&signal);
        let interval = manager.check_interval();

        info!(
            interval_secs = interval.as_secs(),
            "Starting license monitor thread"
        );

        let thread = thread::Builder::new()
            .name("license-monitor".to_string())
            .spawn(move || {
                match manager.check_for_update(&current_version) {
                    Ok(Some(update)) => {
                        if events.send(LicenseEvent::UpdateAvailable(update).into()).is_err() {
                            return;
                        }
                    }
                    Ok(None) => debug!("No update available"),
                    Err(e) => warn!(error = %e, "Could not check for updates"),
                }

                while !monitor_signal.wait_timeout(interval) {
                    let event = match manager.verify(Local::now().naive_local()) {
                        Ok(verification) => LicenseEvent::Verified(verification),
                        Err(e) => LicenseEvent::Invalid(e),
                    };
                    let stop = matches!(event, LicenseEvent::Invalid(_));

                    if events.send(event.into()).is_err() || stop {
                        break;
                    }
                }

                debug!("License monitor stopped");
            })?;

        Ok(Self {
            signal,
            thread: Some(thread),
        })
    }

    fn shutdown(&mut self) {
        self.signal.trigger();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("License monitor panicked");
            }
        }
    }
}

impl Drop for LicenseMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
