//! Operator "notify" mode: stream registry changes to a file or socket, one JSON
//! object per line.

use std::path::PathBuf;

use anyhow::Context;
use device_notify::DeviceIdentifier;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::provider::{ChangeEvent, ChangeKind, Subscription};
use crate::state::CanonicalState;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NotifySink {
    File(PathBuf),
    /// `host:port` of a listening TCP socket.
    Socket(String),
}

#[derive(Serialize)]
struct ChangeLine<'a> {
    identifier: &'a DeviceIdentifier,
    kind: ChangeKind,
    state: CanonicalState,
    timestamp: String,
}

/// Render one change as a single line of JSON (without the trailing newline).
pub fn format_change(change: &ChangeEvent) -> anyhow::Result<String> {
    let line = ChangeLine {
        identifier: &change.identifier,
        kind: change.kind,
        state: change.state,
        timestamp: change.timestamp.0.format(&Rfc3339)?,
    };
    Ok(serde_json::to_string(&line)?)
}

pub struct StateChangeNotifier {
    sink: NotifySink,
}

impl StateChangeNotifier {
    pub fn new(sink: NotifySink) -> Self {
        Self { sink }
    }

    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self::new(NotifySink::File(path.into()))
    }

    pub fn to_socket(addr: impl Into<String>) -> Self {
        Self::new(NotifySink::Socket(addr.into()))
    }

    pub fn sink(&self) -> &NotifySink {
        &self.sink
    }

    /// Write the initial state of every subscription, then stream later changes from a
    /// background task. Returns once the initial state is on the sink; the task ends
    /// when every subscription has closed.
    pub async fn start(
        &self,
        subscriptions: Vec<Subscription>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        let mut writer = self.open().await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut initial = Vec::new();
        for mut sub in subscriptions {
            initial.extend(sub.take_initial_state());
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(change) = sub.recv().await {
                    if tx.send(change).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        for change in &initial {
            write_line(&mut writer, change).await?;
        }
        info!(sink = ?self.sink, devices = initial.len(), "reported initial state");

        Ok(tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                write_line(&mut writer, &change).await?;
            }
            debug!("all subscriptions closed; notifier finished");
            Ok(())
        }))
    }

    async fn open(&self) -> anyhow::Result<Box<dyn AsyncWrite + Send + Unpin>> {
        match &self.sink {
            NotifySink::File(path) => {
                let file = tokio::fs::File::create(path)
                    .await
                    .with_context(|| format!("creating notify file: {}", path.display()))?;
                Ok(Box::new(file))
            }
            NotifySink::Socket(addr) => {
                let stream = TcpStream::connect(addr.as_str())
                    .await
                    .with_context(|| format!("connecting notify socket: {addr}"))?;
                Ok(Box::new(stream))
            }
        }
    }
}

async fn write_line<W>(writer: &mut W, change: &ChangeEvent) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut line = format_change(change)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::{regular, RegularDevices};
    use crate::manager::{DeviceManager, ManagerConfig};
    use device_notify::{MockBackend, MockDevice, RawState, Timestamp};
    use std::sync::Arc;
    use time::macros::datetime;
    use tokio::io::AsyncBufReadExt;

    #[test]
    fn test_format_change_line() {
        let change = ChangeEvent {
            identifier: "1000".into(),
            kind: ChangeKind::Added,
            state: CanonicalState::Booting,
            timestamp: Timestamp(datetime!(2024-03-01 12:00:00 UTC)),
        };
        assert_eq!(
            format_change(&change).unwrap(),
            r#"{"identifier":"1000","kind":"added","state":"booting","timestamp":"2024-03-01T12:00:00Z"}"#
        );
    }

    #[tokio::test]
    async fn test_notifier_writes_initial_state_then_changes() {
        let backend = Arc::new(MockBackend::new());
        backend.attach(MockDevice::new("1000", RawState(regular::raw::BOOTED)));
        let manager = DeviceManager::new(
            RegularDevices,
            backend.clone(),
            ManagerConfig::default(),
        )
        .unwrap();
        manager.start_listening().unwrap();
        let sub = manager.subscribe().await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.jsonl");
        let task = StateChangeNotifier::to_file(&path)
            .start(vec![sub])
            .await
            .unwrap();

        backend.attach(MockDevice::new("2000", RawState(regular::raw::BOOTING)));
        backend.detach(&"1000".into());
        // Make sure both notifications were processed before shutting down.
        manager.list().await.unwrap();
        drop(manager);
        task.await.unwrap().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["identifier"], "1000");
        assert_eq!(lines[0]["kind"], "added");
        assert_eq!(lines[0]["state"], "booted");
        assert_eq!(lines[1]["identifier"], "2000");
        assert_eq!(lines[1]["state"], "booting");
        assert_eq!(lines[2]["identifier"], "1000");
        assert_eq!(lines[2]["kind"], "removed");
        assert_eq!(lines[2]["state"], "disconnected");
    }

    #[tokio::test]
    async fn test_notifier_streams_to_socket() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let backend = Arc::new(MockBackend::new());
        let manager = DeviceManager::new(
            RegularDevices,
            backend.clone(),
            ManagerConfig::default(),
        )
        .unwrap();
        manager.start_listening().unwrap();
        let sub = manager.subscribe().await.unwrap();

        let notifier = StateChangeNotifier::to_socket(addr);
        let (started, accepted) = tokio::join!(notifier.start(vec![sub]), listener.accept());
        let _task = started.unwrap();
        let (socket, _) = accepted.unwrap();

        backend.attach(MockDevice::new("1000", RawState(regular::raw::CONNECTING)));

        let mut lines = tokio::io::BufReader::new(socket).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["identifier"], "1000");
        assert_eq!(value["state"], "connecting");
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("targets.jsonl");
        let result = StateChangeNotifier::to_file(path).start(Vec::new()).await;
        assert!(result.is_err());
    }
}
