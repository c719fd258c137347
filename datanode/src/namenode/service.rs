use std::time::Duration;

use proto::{request::Request, response::Response};
use tokio::time::timeout;
use utilities::{
    logger::{info, instrument, tracing, warn},
    result::Result,
    retry_policy::retry_with_backoff,
    tcp_pool::TcpPool,
};

use crate::config::Config;

/// Client side of the namenode protocol as used by a datanode: one
/// connection per request.
#[derive(Debug, Clone)]
pub struct NamenodeService {
    namenode_addrs: String,
    tcp_pool: TcpPool,
    io_timeout: Duration,
    registration: Request,
    heartbeat: Request,
}

impl NamenodeService {
    pub fn new(config: &Config) -> Self {
        Self {
            namenode_addrs: config.namenode_addrs.clone(),
            tcp_pool: TcpPool::new(config.io_timeout()),
            io_timeout: config.io_timeout(),
            registration: Request::Register {
                data_node_id: config.datanode_id.clone(),
                data_node_address: config.advertised_address.clone(),
                data_node_port: config.advertised_port,
            },
            heartbeat: Request::Heartbeat {
                data_node_id: config.datanode_id.clone(),
            },
        }
    }

    async fn send(&self, request: &Request) -> Result<Response> {
        let mut stream = self.tcp_pool.get_connection(&self.namenode_addrs).await?;
        let exchange = async {
            request.write_to(&mut stream).await?;
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(
                Response::read_from(&mut stream).await?,
            )
        };
        match timeout(self.io_timeout, exchange).await {
            Ok(response) => response,
            Err(_) => Err(format!("Timed out talking to namenode at {}", self.namenode_addrs).into()),
        }
    }

    #[instrument(name = "service_namenode_connect", skip(self))]
    pub async fn connect(&self) -> Result<String> {
        match self.send(&self.registration).await? {
            Response::Message(message) => {
                info!("Connected to namenode sucessfully");
                Ok(message)
            }
            Response::Error { kind, message } => {
                Err(format!("Namenode refused registration [{kind}] {message}").into())
            }
            other => Err(format!("Unexpected registration response {other:?}").into()),
        }
    }

    pub async fn connect_with_retry(&self, max_retries: u8, base_delay: Duration) -> Result<String> {
        retry_with_backoff(|| self.connect(), max_retries, base_delay).await
    }

    /// A namenode that restarted no longer knows this datanode, in that case
    /// the datanode registers again.
    #[instrument(name = "service_namenode_send_heart_beat", skip(self))]
    pub async fn send_heart_beat(&self) -> Result<()> {
        match self.send(&self.heartbeat).await? {
            Response::Message(_) => Ok(()),
            Response::Error { kind, .. } if kind == "UnknownDataNode" => {
                warn!("Namenode does not know this datanode, registering again");
                self.connect().await?;
                Ok(())
            }
            Response::Error { kind, message } => {
                Err(format!("Heartbeat rejected [{kind}] {message}").into())
            }
            other => Err(format!("Unexpected heartbeat response {other:?}").into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    /// Answers every request with `reply(action)` and records the actions.
    async fn fake_namenode(
        reply: fn(&str) -> Response,
    ) -> (String, Arc<Mutex<Vec<&'static str>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addrs = listener.local_addr().unwrap().to_string();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = Request::read_from(&mut stream).await.unwrap();
                recorded.lock().unwrap().push(request.action());
                reply(request.action()).write_to(&mut stream).await.unwrap();
            }
        });
        (addrs, seen)
    }

    fn config(namenode_addrs: String) -> Config {
        Config {
            namenode_addrs,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn unknown_datanode_heartbeat_triggers_registration() {
        let (addrs, seen) = fake_namenode(|action| match action {
            "heartbeat" => Response::error("UnknownDataNode", "Unknown datanode: datanode-1"),
            _ => Response::Message("registered".into()),
        })
        .await;
        let service = NamenodeService::new(&config(addrs));
        service.send_heart_beat().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["heartbeat", "register"]);
    }

    #[tokio::test]
    async fn refused_registration_is_an_error() {
        let (addrs, _) = fake_namenode(|_| Response::error("MalformedRequest", "nope")).await;
        let service = NamenodeService::new(&config(addrs));
        assert!(service.connect().await.is_err());
    }
}
