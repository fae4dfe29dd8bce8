//! Read and subscribe surface for components that only consume the registry.

use std::sync::Arc;

use async_trait::async_trait;
use device_notify::{DeviceIdentifier, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::category::{DeviceCategory, Target, TargetInfo, TargetKind};
use crate::manager::DeviceManager;
use crate::state::CanonicalState;
use crate::{RegistryError, Result};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeEvent {
    pub identifier: DeviceIdentifier,
    pub kind: ChangeKind,
    pub state: CanonicalState,
    pub timestamp: Timestamp,
}

/// Ordered stream of registry changes for one manager.
#[derive(Debug)]
pub struct Subscription {
    initial: Vec<ChangeEvent>,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl Subscription {
    pub(crate) fn new(
        initial: Vec<ChangeEvent>,
        events: mpsc::UnboundedReceiver<ChangeEvent>,
    ) -> Self {
        Self { initial, events }
    }

    /// Devices tracked when the subscription was made, as `Added` events.
    pub fn initial_state(&self) -> &[ChangeEvent] {
        &self.initial
    }

    pub fn take_initial_state(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.initial)
    }

    /// Next change, or `None` once the manager has shut down.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

/// A queryable collection of live targets.
#[async_trait]
pub trait TargetSet: Send + Sync {
    fn kind(&self) -> TargetKind;

    async fn targets(&self) -> Result<Vec<Arc<dyn Target>>>;

    async fn target(&self, identifier: &DeviceIdentifier) -> Result<Arc<dyn Target>>;

    async fn subscribe(&self) -> Result<Subscription>;
}

#[async_trait]
impl<C: DeviceCategory> TargetSet for DeviceManager<C> {
    fn kind(&self) -> TargetKind {
        DeviceManager::kind(self)
    }

    async fn targets(&self) -> Result<Vec<Arc<dyn Target>>> {
        let devices = self.list().await?;
        Ok(devices
            .into_iter()
            .map(|d| d as Arc<dyn Target>)
            .collect())
    }

    async fn target(&self, identifier: &DeviceIdentifier) -> Result<Arc<dyn Target>> {
        let device: Arc<dyn Target> = self.lookup(identifier).await?;
        Ok(device)
    }

    async fn subscribe(&self) -> Result<Subscription> {
        DeviceManager::subscribe(self).await
    }
}

/// Resolves identifiers against several target sets, in order.
#[derive(Clone, Default)]
pub struct TargetProvider {
    sets: Vec<Arc<dyn TargetSet>>,
}

impl TargetProvider {
    pub fn new(sets: Vec<Arc<dyn TargetSet>>) -> Self {
        Self { sets }
    }

    pub fn push(&mut self, set: Arc<dyn TargetSet>) {
        self.sets.push(set);
    }

    /// First live target named `identifier`. A set whose manager has shut down is
    /// skipped.
    pub async fn resolve(&self, identifier: &DeviceIdentifier) -> Result<Arc<dyn Target>> {
        for set in &self.sets {
            match set.target(identifier).await {
                Ok(target) => return Ok(target),
                Err(RegistryError::NotFound(_)) => continue,
                Err(e) => warn!(kind = ?set.kind(), "skipping target set: {e}"),
            }
        }
        Err(RegistryError::NotFound(identifier.clone()))
    }

    /// Every live target, in set order. Like [`resolve`](Self::resolve), sets that fail
    /// are skipped.
    pub async fn targets(&self) -> Vec<TargetInfo> {
        let mut out = Vec::new();
        for set in &self.sets {
            match set.targets().await {
                Ok(targets) => out.extend(targets.iter().map(|t| t.info())),
                Err(e) => warn!(kind = ?set.kind(), "skipping target set: {e}"),
            }
        }
        out
    }

    pub async fn subscribe(&self) -> Result<Vec<Subscription>> {
        let mut out = Vec::with_capacity(self.sets.len());
        for set in &self.sets {
            out.push(set.subscribe().await?);
        }
        Ok(out)
    }
}
