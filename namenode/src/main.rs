use std::sync::Arc;

use namenode::{
    config::load_config,
    datanode::service::DatanodeService,
    dispatcher::Dispatcher,
    namenode_state::{NamenodeState, state_maintainer::StateMaintainer},
};
use utilities::{
    logger::{error, info, init_logger},
    result::Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let _gaurd = init_logger(
        "Namenode",
        &config.id,
        &config.log_level,
        &config.log_base,
        config.apm_endpoint.as_deref(),
    )?;
    let settings = config.placement_settings();
    info!(
        block_size = settings.block_size,
        replication_factor = settings.replication_factor,
        "Starting the namenode"
    );

    let transport = Arc::new(DatanodeService::new(config.datanode_io_timeout()));
    let state = Arc::new(NamenodeState::new(settings, transport));
    StateMaintainer::new(
        state.clone(),
        config.liveness_sweep_interval(),
        config.heartbeat_timeout(),
    )
    .start();

    let dispatcher =
        match Dispatcher::new(&config.listen_addrs, state, config.client_io_timeout()).await {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                error!(addrs = %config.listen_addrs, error = %e, "Could not bind, shutting down");
                return Err(e);
            }
        };
    info!(addrs = %dispatcher.local_addr()?, "Namenode listening");
    dispatcher.start_and_accept().await
}
