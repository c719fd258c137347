use crate::result::Result;
use std::time::Duration;
use tokio::{net::TcpStream, time::timeout};

#[derive(Debug, Clone, Copy)]
pub struct TcpPool {
    connect_timeout: Duration,
}
impl Default for TcpPool {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
impl TcpPool {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
    pub async fn get_connection(&self, tcp_address: &str) -> Result<TcpStream> {
        match timeout(self.connect_timeout, TcpStream::connect(tcp_address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => {
                Err(format!("Error while connecting to stream at {tcp_address:?} {e:?}").into())
            }
            Err(_) => Err(format!("Timed out while connecting to {tcp_address:?}").into()),
        }
    }
}
