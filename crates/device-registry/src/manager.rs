//! The device lifecycle engine.
//!
//! A [`DeviceManager`] owns one registration with a notification backend and a single
//! Tokio task that owns the registry. Notifications, queries and subscriptions all go
//! through that task's queue, so the registry has exactly one writer and needs no
//! locking. Registering and unregistering happen on the caller's thread, never on the
//! task that processes notifications.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use device_notify::{
    DeviceEvent, DeviceIdentifier, HandleSnapshot, NotificationBackend, NotificationBridge,
    NotificationKind, RegistrationId, Timestamp,
};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::category::{DeviceCategory, TargetKind};
use crate::metrics::RegistryMetrics;
use crate::provider::{ChangeEvent, ChangeKind, Subscription};
use crate::state::{CanonicalState, Classification};
use crate::{RegistryError, Result};

#[derive(Clone, Default)]
pub struct ManagerConfig {
    /// Only track the device with this ECID; notifications for any other device are
    /// dropped. Ignored by categories without ECIDs.
    pub ecid_filter: Option<DeviceIdentifier>,
    pub metrics: Option<RegistryMetrics>,
}

/// Token for the backend subscription. An id of zero means inactive.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RegistrationHandle {
    id: Option<RegistrationId>,
}

impl RegistrationHandle {
    pub fn id(&self) -> i64 {
        self.id.map(|id| id.raw()).unwrap_or(0)
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }
}

/// Registry entry for one tracked device.
#[derive(Debug)]
pub struct DeviceRecord<D> {
    pub identifier: DeviceIdentifier,
    /// Fields copied from the most recent backend handle.
    pub handle: HandleSnapshot,
    pub device: Arc<D>,
    pub state: CanonicalState,
    pub last_event: Timestamp,
}

enum Command<D> {
    Event { epoch: u64, event: DeviceEvent },
    List(oneshot::Sender<Vec<Arc<D>>>),
    Lookup(DeviceIdentifier, oneshot::Sender<Option<Arc<D>>>),
    Subscribe(oneshot::Sender<Subscription>),
}

#[derive(Default)]
struct Listening {
    id: Option<RegistrationId>,
    epoch: u64,
    next_epoch: u64,
}

pub struct DeviceManager<C: DeviceCategory> {
    category: &'static str,
    kind: TargetKind,
    bridge: NotificationBridge,
    listening: Mutex<Listening>,
    // Epoch of the registration whose notifications are currently accepted; 0 = none.
    active_epoch: Arc<AtomicU64>,
    commands: mpsc::UnboundedSender<Command<C::Device>>,
}

impl<C: DeviceCategory> DeviceManager<C> {
    /// Create a manager and spawn its registry task on the current Tokio runtime.
    pub fn new(
        category: C,
        backend: Arc<dyn NotificationBackend>,
        config: ManagerConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| RegistryError::NoRuntime)?;
        let (commands, rx) = mpsc::unbounded_channel();
        let active_epoch = Arc::new(AtomicU64::new(0));
        let name = category.state_table().name();
        let kind = category.kind();
        let filter = match config.ecid_filter {
            Some(ecid) if !category.has_ecid() => {
                warn!(
                    category = name,
                    ecid = %ecid,
                    "category has no ECIDs; ignoring ECID filter"
                );
                None
            }
            filter => filter,
        };
        let registry = Registry {
            category,
            name,
            records: BTreeMap::new(),
            active_epoch: active_epoch.clone(),
            filter,
            subscribers: Vec::new(),
            metrics: config.metrics,
        };
        runtime.spawn(registry.run(rx));
        Ok(Self {
            category: name,
            kind,
            bridge: NotificationBridge::new(backend),
            listening: Mutex::new(Listening::default()),
            active_epoch,
            commands,
        })
    }

    pub fn category(&self) -> &'static str {
        self.category
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Subscribe to the backend. Devices the backend reports during registration are
    /// accepted. Calling this while already listening replaces the old registration.
    pub fn start_listening(&self) -> Result<()> {
        let mut listening = self.listening();
        listening.next_epoch += 1;
        let epoch = listening.next_epoch;
        self.active_epoch.store(epoch, Ordering::SeqCst);

        let commands = self.commands.clone();
        let registered = self.bridge.register(move |event| {
            // A closed queue means the manager is gone; nothing left to update.
            let _ = commands.send(Command::Event { epoch, event });
        });

        match registered {
            Ok(id) => {
                if let Some(previous) = listening.id.replace(id) {
                    warn!(
                        category = self.category,
                        previous = previous.raw(),
                        "already listening; releasing previous registration"
                    );
                    self.bridge.unregister(previous);
                }
                listening.epoch = epoch;
                info!(
                    category = self.category,
                    backend = self.bridge.backend_name(),
                    id = id.raw(),
                    "listening for device notifications"
                );
                Ok(())
            }
            Err(e) => {
                let restored = if listening.id.is_some() {
                    listening.epoch
                } else {
                    0
                };
                self.active_epoch.store(restored, Ordering::SeqCst);
                Err(RegistryError::RegistrationFailure(e))
            }
        }
    }

    /// Drop the backend subscription. Notifications still in flight are ignored.
    pub fn stop_listening(&self) -> Result<()> {
        let mut listening = self.listening();
        let id = listening
            .id
            .take()
            .ok_or(RegistryError::NoActiveSubscription)?;
        self.active_epoch.store(0, Ordering::SeqCst);
        self.bridge.unregister(id);
        info!(category = self.category, id = id.raw(), "stopped listening");
        Ok(())
    }

    pub fn registration(&self) -> RegistrationHandle {
        RegistrationHandle {
            id: self.listening().id,
        }
    }

    /// All tracked devices, ordered by identifier.
    pub async fn list(&self) -> Result<Vec<Arc<C::Device>>> {
        self.request(Command::List).await
    }

    pub async fn lookup(&self, identifier: &DeviceIdentifier) -> Result<Arc<C::Device>> {
        let id = identifier.clone();
        self.request(|reply| Command::Lookup(id, reply))
            .await?
            .ok_or_else(|| RegistryError::NotFound(identifier.clone()))
    }

    /// Changes from this point on, plus the devices tracked right now as `Added` events.
    pub async fn subscribe(&self) -> Result<Subscription> {
        self.request(Command::Subscribe).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command<C::Device>,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| RegistryError::ManagerClosed)?;
        rx.await.map_err(|_| RegistryError::ManagerClosed)
    }

    fn listening(&self) -> MutexGuard<'_, Listening> {
        self.listening.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: DeviceCategory> Drop for DeviceManager<C> {
    fn drop(&mut self) {
        let listening = self
            .listening
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = listening.id.take() {
            self.active_epoch.store(0, Ordering::SeqCst);
            self.bridge.unregister(id);
            debug!(category = self.category, id = id.raw(), "released registration on drop");
        }
    }
}

struct Registry<C: DeviceCategory> {
    category: C,
    name: &'static str,
    records: BTreeMap<DeviceIdentifier, DeviceRecord<C::Device>>,
    active_epoch: Arc<AtomicU64>,
    filter: Option<DeviceIdentifier>,
    subscribers: Vec<mpsc::UnboundedSender<ChangeEvent>>,
    metrics: Option<RegistryMetrics>,
}

impl<C: DeviceCategory> Registry<C> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command<C::Device>>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Event { epoch, event } => {
                    if epoch != self.active_epoch.load(Ordering::SeqCst) {
                        debug!(
                            category = self.name,
                            identifier = %event.identifier(),
                            "registration no longer active; ignoring notification"
                        );
                        self.count_dropped();
                        continue;
                    }
                    self.on_event(event);
                }
                Command::List(reply) => {
                    let devices = self.records.values().map(|r| r.device.clone()).collect();
                    let _ = reply.send(devices);
                }
                Command::Lookup(identifier, reply) => {
                    let _ = reply.send(self.records.get(&identifier).map(|r| r.device.clone()));
                }
                Command::Subscribe(reply) => {
                    let _ = reply.send(self.subscribe());
                }
            }
        }
        debug!(category = self.name, "registry task finished");
    }

    /// Snapshot the registry as `Added` events and attach a new subscriber.
    fn subscribe(&mut self) -> Subscription {
        self.subscribers.retain(|tx| !tx.is_closed());
        let (tx, rx) = mpsc::unbounded_channel();
        let initial = self
            .records
            .values()
            .map(|r| ChangeEvent {
                identifier: r.identifier.clone(),
                kind: ChangeKind::Added,
                state: r.state,
                timestamp: r.last_event,
            })
            .collect();
        self.subscribers.push(tx);
        Subscription::new(initial, rx)
    }

    /// Apply one notification. Returns the change published to subscribers, if any.
    fn on_event(&mut self, event: DeviceEvent) -> Option<ChangeEvent> {
        if let Some(m) = &self.metrics {
            m.events_received.inc();
        }
        let DeviceEvent {
            kind,
            handle,
            timestamp,
        } = event;
        let identifier = handle.identifier.clone();

        if let Some(filter) = &self.filter {
            let ecid = handle.ecid_or_identifier();
            if filter != ecid {
                debug!(
                    category = self.name,
                    identifier = %identifier,
                    ecid = %ecid,
                    filter = %filter,
                    "ECID filtered out; ignoring notification"
                );
                self.count_dropped();
                return None;
            }
        }

        let Classification { state, trackable } = self.category.classify(handle.raw_state);
        if !trackable {
            // A stale record for this identifier is left alone.
            debug!(
                category = self.name,
                identifier = %identifier,
                raw_state = %handle.raw_state,
                state = %state,
                event = %kind,
                "state not tracked by this manager; ignoring notification"
            );
            self.count_dropped();
            return None;
        }

        let change = match kind {
            NotificationKind::Connected => {
                Some(self.connected(identifier, handle, state, timestamp))
            }
            NotificationKind::Disconnected => self.disconnected(identifier, timestamp),
        };
        if let Some(change) = &change {
            self.subscribers
                .retain(|tx| tx.send(change.clone()).is_ok());
        }
        if let Some(m) = &self.metrics {
            m.devices_tracked.set(self.records.len() as i64);
        }
        change
    }

    fn connected(
        &mut self,
        identifier: DeviceIdentifier,
        handle: HandleSnapshot,
        state: CanonicalState,
        timestamp: Timestamp,
    ) -> ChangeEvent {
        let kind = match self.records.get_mut(&identifier) {
            Some(record) => {
                self.category
                    .update(&record.device, &handle, &identifier, state);
                record.handle = handle;
                record.state = state;
                record.last_event = timestamp;
                debug!(
                    category = self.name,
                    identifier = %identifier,
                    state = %state,
                    "device reconnected; refreshed in place"
                );
                ChangeKind::Updated
            }
            None => {
                let device = Arc::new(self.category.construct(&handle, &identifier, state));
                info!(
                    category = self.name,
                    identifier = %identifier,
                    state = %state,
                    "device connected"
                );
                self.records.insert(
                    identifier.clone(),
                    DeviceRecord {
                        identifier: identifier.clone(),
                        handle,
                        device,
                        state,
                        last_event: timestamp,
                    },
                );
                ChangeKind::Added
            }
        };
        ChangeEvent {
            identifier,
            kind,
            state,
            timestamp,
        }
    }

    fn disconnected(
        &mut self,
        identifier: DeviceIdentifier,
        timestamp: Timestamp,
    ) -> Option<ChangeEvent> {
        if self.records.remove(&identifier).is_none() {
            debug!(
                category = self.name,
                identifier = %identifier,
                "disconnect for untracked device"
            );
            return None;
        }
        info!(category = self.name, identifier = %identifier, "device disconnected");
        Some(ChangeEvent {
            identifier,
            kind: ChangeKind::Removed,
            state: CanonicalState::Disconnected,
            timestamp,
        })
    }

    fn count_dropped(&self) {
        if let Some(m) = &self.metrics {
            m.events_dropped.inc();
        }
    }
}
