use std::{fs, io, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub user_id: String,
    pub device_id: Option<String>,
    /// Password the simulated homeserver accepts for re-authentication.
    pub account_password: String,
    pub log_filter: String,
    pub verification_delay_ms: u64,
    pub operation_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_id: "@alice:localhost".into(),
            device_id: Some("ALICEDESKTOP".into()),
            account_password: "correct horse".into(),
            log_filter: "info".into(),
            verification_delay_ms: 300,
            operation_timeout_secs: 10,
        }
    }
}

impl Settings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn verification_delay(&self) -> Duration {
        Duration::from_millis(self.verification_delay_ms)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    user_id: Option<String>,
    device_id: Option<String>,
    account_password: Option<String>,
    log_filter: Option<String>,
    verification_delay_ms: Option<u64>,
    operation_timeout_secs: Option<u64>,
}

/// Defaults, then the TOML file if present, then environment variables.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file.user_id {
        settings.user_id = v;
    }
    if let Some(v) = file.device_id {
        settings.device_id = Some(v).filter(|id| !id.is_empty());
    }
    if let Some(v) = file.account_password {
        settings.account_password = v;
    }
    if let Some(v) = file.log_filter {
        settings.log_filter = v;
    }
    if let Some(v) = file.verification_delay_ms {
        settings.verification_delay_ms = v;
    }
    if let Some(v) = file.operation_timeout_secs {
        settings.operation_timeout_secs = v;
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let var = |primary: &str, alias: &str| lookup(alias).or_else(|| lookup(primary));

    if let Some(v) = var("DEVICE_MANAGER_USER_ID", "APP__USER_ID") {
        settings.user_id = v;
    }
    if let Some(v) = var("DEVICE_MANAGER_DEVICE_ID", "APP__DEVICE_ID") {
        settings.device_id = Some(v).filter(|id| !id.is_empty());
    }
    if let Some(v) = var("DEVICE_MANAGER_LOG", "APP__LOG_FILTER") {
        settings.log_filter = v;
    }
    if let Some(v) = var("DEVICE_MANAGER_TIMEOUT_SECS", "APP__OPERATION_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.operation_timeout_secs = parsed;
        }
    }
}
