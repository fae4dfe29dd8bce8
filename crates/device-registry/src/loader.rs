use crate::notifier::NotifySink;
use anyhow::Context;
use device_notify::NotificationKind;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Restorable,
    Regular,
    Simulator,
}

impl CategoryKind {
    pub const ALL: [CategoryKind; 3] = [Self::Restorable, Self::Regular, Self::Simulator];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Restorable => "restorable",
            Self::Regular => "regular",
            Self::Simulator => "simulator",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionConfig {
    /// Only track the physical device with this ECID. Simulators are not filtered.
    #[serde(default)]
    pub ecid_filter: Option<String>,
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryKind>,
    #[serde(default)]
    pub notify: Option<NotifyConfig>,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            ecid_filter: None,
            categories: default_categories(),
            notify: None,
        }
    }
}

fn default_categories() -> Vec<CategoryKind> {
    CategoryKind::ALL.to_vec()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub socket: Option<String>,
}

impl NotifyConfig {
    pub fn sink(&self) -> anyhow::Result<NotifySink> {
        match (&self.path, &self.socket) {
            (Some(path), None) => Ok(NotifySink::File(path.clone())),
            (None, Some(addr)) => Ok(NotifySink::Socket(addr.clone())),
            (Some(_), Some(_)) => Err(anyhow::anyhow!(
                "notify: set either `path` or `socket`, not both"
            )),
            (None, None) => Err(anyhow::anyhow!("notify: `path` or `socket` is required")),
        }
    }
}

/// One scripted notification, replayed through a mock backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayStep {
    pub category: CategoryKind,
    pub identifier: String,
    /// ECID reported alongside a UDID identifier.
    #[serde(default)]
    pub ecid: Option<String>,
    pub event: NotificationKind,
    #[serde(default)]
    pub raw_state: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    /// Pause before this step, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
}

pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<CompanionConfig> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
    let val: Value =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))?;
    let config: CompanionConfig = serde_yaml::from_value(val)
        .with_context(|| format!("decoding config: {}", path.display()))?;
    if let Some(notify) = &config.notify {
        notify
            .sink()
            .with_context(|| format!("validating config: {}", path.display()))?;
    }
    Ok(config)
}

pub fn load_script_file(path: impl AsRef<Path>) -> anyhow::Result<Vec<ReplayStep>> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading script: {}", path.display()))?;
    let steps: Vec<ReplayStep> = serde_yaml::from_str(&raw)
        .with_context(|| format!("decoding script: {}", path.display()))?;
    Ok(steps)
}
