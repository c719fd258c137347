use std::time::Duration;

use proto::{request::Request, response::Response};
use tokio::time::timeout;
use utilities::{
    logger::{instrument, trace, tracing},
    result::Result,
    tcp_pool::TcpPool,
};

#[derive(Debug, Clone)]
pub struct NamenodeService {
    namenode_addrs: String,
    tcp_pool: TcpPool,
    io_timeout: Duration,
}

impl NamenodeService {
    pub fn new(namenode_addrs: String, io_timeout: Duration) -> Self {
        Self {
            namenode_addrs,
            tcp_pool: TcpPool::default(),
            io_timeout,
        }
    }

    /// Sends one request on a fresh connection and waits for its response.
    #[instrument(name = "service_namenode_send", skip(self, request), fields(action = request.action()))]
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let mut stream = self.tcp_pool.get_connection(&self.namenode_addrs).await?;
        request.write_to(&mut stream).await?;
        trace!("request sent, waiting for the response");
        match timeout(self.io_timeout, Response::read_from(&mut stream)).await {
            Ok(response) => Ok(response?),
            Err(_) => Err(format!("Timed out waiting for namenode at {}", self.namenode_addrs).into()),
        }
    }
}
