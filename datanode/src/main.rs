mod config;
mod namenode;
mod state_maintainer;
mod tcp;

use std::time::Duration;

use storage::{file_storage::FileStorage, storage::Storage};
use utilities::{
    logger::{error, info, init_logger, warn},
    result::Result,
};

use crate::{
    config::load_config, namenode::service::NamenodeService, state_maintainer::StateMaintainer,
    tcp::service::TCPService,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let _gaurd = init_logger(
        "Datanode",
        &config.datanode_id,
        &config.log_level,
        &config.log_base,
        config.apm_endpoint.as_deref(),
    )?;
    info!(path = %config.storage_path, "Opening block storage");
    let store = match FileStorage::new(&config.storage_path).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Error while creating the block storage, shutting down");
            return Err(e.into());
        }
    };
    match store.available_blocks().await {
        Ok(blocks) => info!(blocks = blocks.len(), "Block storage opened"),
        Err(e) => warn!(error = %e, "Could not list stored blocks"),
    }
    // the block server has to be up before the namenode learns our address
    let tcp_service = match TCPService::new(&config.listen_addrs, store, config.io_timeout()).await
    {
        Ok(service) => service,
        Err(e) => {
            error!(addrs = %config.listen_addrs, error = %e, "Could not bind, shutting down");
            return Err(e);
        }
    };
    info!(addrs = %config.listen_addrs, "Block server listening");

    let namenode_service = NamenodeService::new(&config);
    namenode_service
        .connect_with_retry(config.register_retries, Duration::from_millis(500))
        .await?;
    StateMaintainer::new(namenode_service).start_heart_beat_loop(config.heartbeat_interval());

    tcp_service.start_and_accept().await
}
