mod cli;
mod docker;
mod labels;
mod publisher;

use anyhow::Result;
use clap::Parser;

use gantry_config_store::TreeSource;

use crate::cli::DockerCli;
use crate::docker::{BollardSource, ContainerEvent, DockerSource};
use crate::publisher::Publisher;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,gantry=debug".to_owned()),
        )
        .json()
        .init();

    let cli = DockerCli::parse();

    tracing::info!("gantry-docker starting");

    let tree = TreeSource::open(&cli.etcd_config()).await?;
    let mut source = BollardSource::connect(&cli.docker_endpoint)?;
    let mut publisher = Publisher::new(tree);

    // 초기 컨테이너 목록을 합성 sync 이벤트로 처리
    for container in source.list_containers().await? {
        let event = ContainerEvent {
            id: container.id.clone(),
            status: "sync".to_owned(),
            running: container.running,
            state: Some(container),
        };
        publisher.handle(event).await;
    }
    tracing::info!(tracked = publisher.tracked(), "initial container sync done");

    // 라이브 이벤트 루프
    loop {
        tokio::select! {
            event = source.next_event() => match event? {
                Some(event) => publisher.handle(event).await,
                None => {
                    tracing::warn!("docker event stream closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    tracing::info!("gantry-docker exiting");
    Ok(())
}
