use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use component_operator::OperatorConfig;
use component_operator::health::{HealthState, run_health_server};
use component_operator::{run_controller, run_event_watcher};

const LEASE_NAME: &str = "component-operator-leader";
const LEASE_TTL: Duration = Duration::from_secs(15);
const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Time given to in-flight reconciles and event handlers after a signal
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    install_crypto_provider()?;
    init_tracing()?;

    let config = OperatorConfig::from_env()?;
    info!(
        watch_namespace = config.watch_namespace.as_deref().unwrap_or("*"),
        tolerations = config.data_plane_tolerations.len(),
        "Starting component-operator"
    );

    let client = Client::try_default().await?;
    let health_state = Arc::new(HealthState::new());

    // Probes answer before leadership is acquired
    let health = spawn_health_server(health_state.clone());

    let leadership = Leadership::new(client.clone(), &config);
    leadership.acquire().await;
    let renewal = leadership.keep();

    let controller = tokio::spawn(run_controller(
        client.clone(),
        Some(health_state.clone()),
        config.clone(),
    ));
    let events = tokio::spawn(run_event_watcher(
        client,
        Some(health_state.clone()),
        config.watch_namespace.clone(),
    ));

    tokio::select! {
        result = controller => report_exit("component controller", result),
        result = events => report_exit("kbagent event watcher", result),
        result = health => report_exit("health server", result),
        result = renewal => report_exit("lease renewal", result),
        signal = shutdown_signal() => {
            match signal {
                Ok(name) => info!(signal = name, "Shutting down"),
                Err(e) => error!("Signal handler failed: {}, shutting down", e),
            }
            health_state.set_ready(false).await;
            tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
        }
    }

    info!("Operator stopped");
    Ok(())
}

fn install_crypto_provider() -> Result<(), Box<dyn std::error::Error>> {
    let installed = rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_ok();
    if installed || rustls::crypto::CryptoProvider::get_default().is_some() {
        return Ok(());
    }
    Err("no rustls crypto provider available".into())
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("component_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .init();
    Ok(())
}

fn spawn_health_server(state: Arc<HealthState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_health_server(state).await {
            error!("Health server error: {}", e);
        }
    })
}

fn report_exit(task: &str, result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => warn!(task, "Task exited"),
        Err(e) => error!(task, "Task panicked: {}", e),
    }
}

/// Single active replica through a coordination Lease
struct Leadership {
    lock: LeaseLock,
    holder: String,
}

impl Leadership {
    fn new(client: Client, config: &OperatorConfig) -> Self {
        let lock = LeaseLock::new(
            client,
            &config.pod_namespace,
            LeaseLockParams {
                holder_id: config.pod_name.clone(),
                lease_name: LEASE_NAME.to_string(),
                lease_ttl: LEASE_TTL,
            },
        );
        Self {
            lock,
            holder: config.pod_name.clone(),
        }
    }

    /// Block until this replica holds the lease
    async fn acquire(&self) {
        info!(holder = %self.holder, lease = LEASE_NAME, "Waiting for leadership");
        loop {
            match self.lock.try_acquire_or_renew().await {
                Ok(result) if result.acquired_lease => break,
                Ok(_) => info!("Another replica holds the lease"),
                Err(e) => warn!("Failed to acquire lease: {}", e),
            }
            tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
        }
        info!(holder = %self.holder, "Acquired leadership");
    }

    /// Keep renewing the lease; exits the process once it is lost so that a
    /// restart re-enters the election
    fn keep(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
                match self.lock.try_acquire_or_renew().await {
                    Ok(result) if result.acquired_lease => {}
                    Ok(_) => {
                        error!(holder = %self.holder, "Lost leadership, exiting");
                        std::process::exit(1);
                    }
                    Err(e) => {
                        error!(holder = %self.holder, "Failed to renew lease: {}, exiting", e);
                        std::process::exit(1);
                    }
                }
            }
        })
    }
}

/// Resolve with the name of the first termination signal received
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map(|()| "SIGINT")
    }
}
