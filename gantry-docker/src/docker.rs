//! Docker API abstraction for testability.
//!
//! The [`DockerSource`] trait abstracts the bollard Docker API, allowing
//! production code to use [`BollardSource`] while tests use a scripted
//! mock. Only two operations are needed: listing running containers
//! (with enough detail to derive backend configs) and following the
//! container lifecycle event stream.

use std::collections::HashMap;
use std::future::Future;
use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// An exposed container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPort {
    /// Transport protocol ("tcp" / "udp")
    pub proto: String,
    /// Container-side port number
    pub port: u16,
}

/// Container state relevant to backend derivation.
#[derive(Debug, Clone, Default)]
pub struct Container {
    /// Container id (unique, used as the backend name)
    pub id: String,
    /// Human-readable name, or the id
    pub name: String,
    /// Current running state
    pub running: bool,
    /// Internal IPv4 address assigned to the container
    pub ipv4: Option<Ipv4Addr>,
    /// Image basename
    pub image: String,
    /// Exposed ports
    pub ports: Vec<ContainerPort>,
    /// Configured labels
    pub labels: HashMap<String, String>,
}

/// A container lifecycle event.
///
/// `running` is the interpretation of the container state *after* the
/// event; `state` may be missing when the container is already gone
/// (normal for `destroy`).
#[derive(Debug, Clone)]
pub struct ContainerEvent {
    pub id: String,
    pub status: String,
    pub running: bool,
    pub state: Option<Container>,
}

/// Trait abstracting the container runtime.
pub trait DockerSource: Send {
    /// Lists all containers with the detail needed for backend
    /// derivation.
    fn list_containers(&mut self) -> impl Future<Output = Result<Vec<Container>>> + Send;

    /// Waits for the next container lifecycle event. `Ok(None)` means
    /// the event stream ended.
    fn next_event(&mut self) -> impl Future<Output = Result<Option<ContainerEvent>>> + Send;
}

type RawEvent = Result<bollard::models::EventMessage, bollard::errors::Error>;

/// Production Docker source using `bollard`.
///
/// The event stream borrows the client, so it runs in its own task with
/// a cloned handle and feeds raw events through a channel. Subscribing
/// at connect time means events racing the initial listing are observed
/// rather than lost.
pub struct BollardSource {
    docker: bollard::Docker,
    events: mpsc::Receiver<RawEvent>,
}

impl BollardSource {
    /// Connects to the Docker daemon and subscribes to its event stream.
    ///
    /// An empty endpoint uses the platform default socket; otherwise the
    /// endpoint is treated as a unix socket path. Must be called within
    /// a tokio runtime.
    pub fn connect(endpoint: &str) -> Result<Self> {
        let docker = if endpoint.is_empty() {
            bollard::Docker::connect_with_local_defaults()
                .context("connecting to docker daemon")?
        } else {
            bollard::Docker::connect_with_socket(endpoint, 120, bollard::API_DEFAULT_VERSION)
                .with_context(|| format!("connecting to docker at {endpoint}"))?
        };

        let (tx, events) = mpsc::channel(64);
        let handle = docker.clone();
        tokio::spawn(async move {
            let mut stream = handle.events::<String>(None);
            while let Some(item) = stream.next().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self { docker, events })
    }

    /// Inspects one container into the derivation model.
    async fn inspect(&self, id: &str) -> Result<Container> {
        let details = self
            .docker
            .inspect_container(id, None)
            .await
            .with_context(|| format!("inspecting container {id}"))?;

        let name = details
            .name
            .as_deref()
            .map(|n| n.trim_start_matches('/').to_owned())
            .unwrap_or_else(|| id.to_owned());
        let running = details
            .state
            .as_ref()
            .and_then(|state| state.running)
            .unwrap_or(false);
        let image = details
            .config
            .as_ref()
            .and_then(|config| config.image.clone())
            .unwrap_or_default();
        let labels = details
            .config
            .as_ref()
            .and_then(|config| config.labels.clone())
            .unwrap_or_default();

        let network = details.network_settings.as_ref();
        let ipv4 = network
            .and_then(|settings| settings.ip_address.as_deref())
            .and_then(|addr| addr.parse().ok());

        let mut ports = Vec::new();
        if let Some(port_map) = network.and_then(|settings| settings.ports.as_ref()) {
            for key in port_map.keys() {
                // 포트 키 형식: "80/tcp"
                let Some((port, proto)) = key.split_once('/') else {
                    warn!(container = id, port = %key, "unparseable port key");
                    continue;
                };
                let Ok(port) = port.parse::<u16>() else {
                    warn!(container = id, port = %key, "port out of range");
                    continue;
                };
                ports.push(ContainerPort {
                    proto: proto.to_owned(),
                    port,
                });
            }
        }

        Ok(Container {
            id: id.to_owned(),
            name,
            running,
            ipv4,
            image,
            ports,
            labels,
        })
    }
}

/// Container statuses that affect backend publication.
const CONTAINER_STATUSES: &[&str] = &[
    "attach", "commit", "copy", "create", "destroy", "die", "exec_create", "exec_start", "export",
    "kill", "oom", "pause", "rename", "resize", "restart", "start", "stop", "top", "unpause",
];

impl DockerSource for BollardSource {
    async fn list_containers(&mut self) -> Result<Vec<Container>> {
        let options = bollard::container::ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .context("listing containers")?;

        let mut containers = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(id) = summary.id else { continue };
            match self.inspect(&id).await {
                Ok(container) => containers.push(container),
                // destroy와 경합하면 조회가 실패할 수 있음
                Err(err) => warn!(container = %id, %err, "skipping container"),
            }
        }
        Ok(containers)
    }

    async fn next_event(&mut self) -> Result<Option<ContainerEvent>> {
        loop {
            let Some(message) = self.events.recv().await else {
                return Ok(None);
            };
            let message = message.context("docker event stream")?;

            if message.typ != Some(bollard::models::EventMessageTypeEnum::CONTAINER) {
                debug!(?message.typ, "ignoring non-container event");
                continue;
            }
            let Some(status) = message.action.clone() else {
                continue;
            };
            let Some(id) = message.actor.and_then(|actor| actor.id) else {
                continue;
            };
            if !CONTAINER_STATUSES.contains(&status.as_str()) {
                debug!(container = %id, %status, "ignoring unknown container event");
                continue;
            }

            // destroy 등에서는 상태 조회가 실패하는 것이 정상
            let state = self.inspect(&id).await.ok();

            let running = match status.as_str() {
                "start" => true,
                // 컨테이너가 내려가는 중에는 State.Running이 아직
                // true일 수 있음
                "die" | "kill" | "stop" => false,
                _ => state.as_ref().map(|s| s.running).unwrap_or(false),
            };

            return Ok(Some(ContainerEvent {
                id,
                status,
                running,
                state,
            }));
        }
    }
}
