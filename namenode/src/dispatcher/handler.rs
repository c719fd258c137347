use std::sync::Arc;

use proto::{request::Request, response::Response};
use utilities::logger::{instrument, tracing, warn};

use crate::{error::NamenodeError, namenode_state::NamenodeState};

/// The action table: one arm per wire action, each calling the matching
/// namenode operation.
#[derive(Clone)]
pub struct RequestHandler {
    state: Arc<NamenodeState>,
}

fn reply<T>(result: Result<T, NamenodeError>, on_success: impl FnOnce(T) -> Response) -> Response {
    match result {
        Ok(value) => on_success(value),
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "Request failed");
            Response::error(e.kind(), e.to_string())
        }
    }
}

impl RequestHandler {
    pub fn new(state: Arc<NamenodeState>) -> Self {
        Self { state }
    }

    #[instrument(name = "dispatcher_handle_request", skip(self, request), fields(action = request.action()))]
    pub async fn handle(&self, request: Request) -> Response {
        let state = &self.state;
        match request {
            Request::Register {
                data_node_id,
                data_node_address,
                data_node_port,
            } => Response::Message(
                state
                    .register(&data_node_id, &data_node_address, data_node_port)
                    .await,
            ),
            Request::Heartbeat { data_node_id } => {
                reply(state.heartbeat(&data_node_id).await, Response::Message)
            }
            Request::CreateDirectory {
                parent_path,
                directory_name,
            } => reply(
                state.create_directory(&parent_path, &directory_name).await,
                |path| Response::Message(format!("Directory {path} created")),
            ),
            Request::DeleteDirectory { directory_path } => reply(
                state.delete_directory(&directory_path).await,
                |_| Response::Message(format!("Directory {directory_path} deleted")),
            ),
            Request::MoveFile {
                source_path,
                destination_path,
            } => reply(
                state.move_file(&source_path, &destination_path).await,
                |_| Response::Message(format!("Moved {source_path} to {destination_path}")),
            ),
            Request::UploadFile {
                local_path,
                dfs_path,
            } => reply(state.upload_file(&local_path, &dfs_path).await, |report| {
                Response::Message(report.message(state.settings().replication_factor))
            }),
            Request::DownloadFile {
                dfs_path,
                local_path,
            } => reply(state.download_file(&dfs_path, &local_path).await, |size| {
                Response::Message(format!(
                    "Downloaded {dfs_path} to {local_path} ({size} bytes)"
                ))
            }),
            Request::Status => Response::Status(state.status().await),
            Request::ListDirectoryContents { dfs_path } => reply(
                state.list_directory_contents(&dfs_path).await,
                Response::Listing,
            ),
            Request::TraverseDirectory { dfs_path } => {
                reply(state.traverse_directory(&dfs_path).await, Response::Tree)
            }
        }
    }
}
