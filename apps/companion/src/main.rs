use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use device_notify::{MockBackend, MockDevice, NotificationKind, RawState};
use device_registry as devreg;
use devreg::{
    CategoryKind, CompanionConfig, DeviceCategory, DeviceIdentifier, DeviceManager,
    ManagerConfig, MetricsHub, NotifyConfig, ReplayStep, StateChangeNotifier, TargetProvider,
    TargetSet,
};

#[derive(Parser, Debug)]
#[command(
    name = "companion",
    version,
    about = "Device discovery companion",
    disable_help_subcommand = true
)]
struct Cli {
    /// YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Only track the physical device with this ECID (overrides the config file)
    #[arg(long, global = true)]
    ecid_filter: Option<String>,

    /// YAML replay script fed through the mock backends
    #[arg(long, global = true)]
    script: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List tracked targets
    List {
        /// Print JSON instead of a table
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
        /// Also print Prometheus metrics
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Resolve an identifier into a live target
    Resolve {
        identifier: String,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Stream target changes to a file or socket, one JSON object per line
    Notify {
        /// Output file
        #[arg(long, conflicts_with = "socket")]
        path: Option<PathBuf>,
        /// host:port to connect to
        #[arg(long)]
        socket: Option<String>,
        /// Exit once the replay script has finished instead of waiting for Ctrl-C
        #[arg(long, action = ArgAction::SetTrue)]
        exit_after_script: bool,
    },
    /// Validate a config file and print the effective settings
    ConfigCheck { file: PathBuf },
}

/// Running discovery: one mock backend and one manager per enabled category.
struct Companion {
    backends: BTreeMap<CategoryKind, Arc<MockBackend>>,
    provider: TargetProvider,
    metrics: MetricsHub,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    if let Commands::ConfigCheck { file } = &cli.command {
        return config_check(file);
    }

    let config = effective_config(cli.config.as_deref(), cli.ecid_filter.clone())?;
    let steps = match &cli.script {
        Some(path) => devreg::load_script_file(path)?,
        None => Vec::new(),
    };
    let companion = start_discovery(&config)?;

    match cli.command {
        Commands::List { json, metrics } => {
            replay(&companion.backends, &steps).await;
            list_targets(&companion, json, metrics).await
        }
        Commands::Resolve { identifier, json } => {
            replay(&companion.backends, &steps).await;
            resolve_target(&companion, &identifier, json).await
        }
        Commands::Notify {
            path,
            socket,
            exit_after_script,
        } => {
            let notify = match (path, socket) {
                (None, None) => config.notify.clone().ok_or_else(|| {
                    anyhow::anyhow!("provide --path <file> or --socket <addr>")
                })?,
                (path, socket) => NotifyConfig { path, socket },
            };
            notify_mode(companion, &notify, &steps, exit_after_script).await
        }
        Commands::ConfigCheck { .. } => Ok(()),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn effective_config(
    path: Option<&std::path::Path>,
    ecid_filter: Option<String>,
) -> Result<CompanionConfig> {
    let mut config = match path {
        Some(p) => devreg::load_config_file(p)?,
        None => CompanionConfig::default(),
    };
    if ecid_filter.is_some() {
        config.ecid_filter = ecid_filter;
    }
    Ok(config)
}

fn config_check(file: &std::path::Path) -> Result<()> {
    let config = devreg::load_config_file(file)?;
    println!("ok: {} categories", config.categories.len());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Start one manager per configured category. Any registration failure is fatal.
fn start_discovery(config: &CompanionConfig) -> Result<Companion> {
    let metrics = MetricsHub::new().map_err(|e| anyhow::anyhow!(e))?;
    let filter = config.ecid_filter.as_deref().map(DeviceIdentifier::from);
    let mut backends = BTreeMap::new();
    let mut provider = TargetProvider::default();

    for kind in &config.categories {
        if backends.contains_key(kind) {
            continue;
        }
        let backend = Arc::new(MockBackend::new().named(kind.as_str()));
        let ecid_filter = match kind {
            CategoryKind::Simulator => None,
            CategoryKind::Restorable | CategoryKind::Regular => filter.clone(),
        };
        let manager_config = ManagerConfig {
            ecid_filter,
            metrics: Some(metrics.for_category(kind.as_str())),
        };
        let set = match kind {
            CategoryKind::Restorable => {
                start_manager(devreg::RestorableDevices, backend.clone(), manager_config)?
            }
            CategoryKind::Regular => {
                start_manager(devreg::RegularDevices, backend.clone(), manager_config)?
            }
            CategoryKind::Simulator => {
                start_manager(devreg::Simulators, backend.clone(), manager_config)?
            }
        };
        provider.push(set);
        backends.insert(*kind, backend);
    }
    info!(categories = backends.len(), "device discovery started");
    Ok(Companion {
        backends,
        provider,
        metrics,
    })
}

fn start_manager<C: DeviceCategory>(
    category: C,
    backend: Arc<MockBackend>,
    config: ManagerConfig,
) -> Result<Arc<dyn TargetSet>> {
    let name = category.state_table().name();
    let manager = DeviceManager::new(category, backend, config)
        .with_context(|| format!("creating {name} device manager"))?;
    manager
        .start_listening()
        .with_context(|| format!("starting {name} device discovery"))?;
    Ok(Arc::new(manager))
}

async fn replay(backends: &BTreeMap<CategoryKind, Arc<MockBackend>>, steps: &[ReplayStep]) {
    for step in steps {
        if step.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        }
        let Some(backend) = backends.get(&step.category) else {
            warn!(
                category = step.category.as_str(),
                identifier = %step.identifier,
                "category not enabled; skipping step"
            );
            continue;
        };
        let mut device = MockDevice::new(step.identifier.as_str(), RawState(step.raw_state));
        if let Some(ecid) = &step.ecid {
            device = device.with_ecid(ecid.as_str());
        }
        if let Some(name) = &step.name {
            device = device.with_name(name.as_str());
        }
        if let Some(version) = &step.os_version {
            device = device.with_os_version(version.as_str());
        }
        match step.event {
            NotificationKind::Connected => backend.attach(device),
            NotificationKind::Disconnected => {
                // Devices the script never attached still get a disconnect notification.
                if backend.detach(&device.identifier).is_none() {
                    backend.emit(&device, NotificationKind::DISCONNECTED_CODE);
                }
            }
        }
    }
}

async fn list_targets(companion: &Companion, json: bool, metrics: bool) -> Result<()> {
    let targets = companion.provider.targets().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
    } else {
        for t in &targets {
            println!(
                "{}\t{}\t{:?}\t{}\t{}",
                t.identifier,
                t.name,
                t.kind,
                t.state,
                t.os_version.as_deref().unwrap_or("-")
            );
        }
    }
    if metrics {
        print!("{}", companion.metrics.encode_text());
    }
    Ok(())
}

async fn resolve_target(companion: &Companion, identifier: &str, json: bool) -> Result<()> {
    let id = DeviceIdentifier::from(identifier);
    let target = companion
        .provider
        .resolve(&id)
        .await
        .with_context(|| format!("device not available: {identifier}"))?;
    let info = target.info();
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}\t{}\t{:?}\t{}", info.identifier, info.name, info.kind, info.state);
    }
    Ok(())
}

async fn notify_mode(
    companion: Companion,
    notify: &NotifyConfig,
    steps: &[ReplayStep],
    exit_after_script: bool,
) -> Result<()> {
    let Companion {
        backends, provider, ..
    } = companion;
    let notifier = StateChangeNotifier::new(notify.sink()?);
    let subscriptions = provider.subscribe().await?;
    let task = notifier.start(subscriptions).await?;
    println!("{}", serde_json::json!({ "report_initial_state": true }));

    replay(&backends, steps).await;
    if exit_after_script {
        // Wait for the replayed notifications to be processed before shutting down.
        provider.targets().await;
    } else {
        tokio::signal::ctrl_c().await?;
    }

    info!("notifier shutting down");
    drop(provider);
    task.await??;
    Ok(())
}
