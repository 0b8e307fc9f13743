//! Live Docker implementation of [`LogSource`] backed by bollard.

use std::pin::Pin;

use bollard::query_parameters::{ListContainersOptions, LogsOptions};
use bollard::Docker;
use futures_util::stream::StreamExt;
use tokio_util::sync::CancellationToken;

use super::inventory::ContainerInfo;
use super::source::{ChunkStream, LogSource, SourceError};

#[derive(Debug, Clone)]
pub struct DockerSource {
    client: Docker,
    /// Number of recent lines to replay when a stream is opened.
    tail_lines: u32,
}

impl DockerSource {
    pub fn new(socket_path: &str, tail_lines: u32) -> Result<Self, SourceError> {
        let client = if socket_path.is_empty() {
            Docker::connect_with_defaults()
                .map_err(|e| SourceError::ConnectionFailed(e.to_string()))?
        } else {
            let clean_path = socket_path.trim_start_matches("unix://");
            Docker::connect_with_socket(clean_path, 120, &bollard::API_DEFAULT_VERSION)
                .map_err(|e| SourceError::ConnectionFailed(e.to_string()))?
        };

        Ok(DockerSource { client, tail_lines })
    }
}

fn map_absent(container_id: &str, e: bollard::errors::Error) -> SourceError {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => SourceError::Unavailable(container_id.to_string()),
        other => SourceError::Bollard(other),
    }
}

impl LogSource for DockerSource {
    fn list_running(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<ContainerInfo>, SourceError>> + Send + '_>>
    {
        Box::pin(async move {
            let options = Some(ListContainersOptions {
                all: false,
                ..Default::default()
            });
            let containers = self.client.list_containers(options).await?;
            Ok(containers.into_iter().map(ContainerInfo::from).collect())
        })
    }

    fn stream_logs<'a>(
        &'a self,
        container_id: &'a str,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<ChunkStream, SourceError>> + Send + 'a>>
    {
        Box::pin(async move {
            // Surface an absent container as Unavailable up front instead of
            // as the first stream item.
            self.client
                .inspect_container(container_id, None)
                .await
                .map_err(|e| map_absent(container_id, e))?;

            // Engine timestamps stay off: timestamps are parsed from the
            // payload itself.
            let options = LogsOptions {
                follow: true,
                stdout: true,
                stderr: true,
                since: 0,
                until: 0,
                timestamps: false,
                tail: self.tail_lines.to_string(),
            };

            let stream = self
                .client
                .logs(container_id, Some(options))
                .map(|result| match result {
                    Ok(output) => Ok(output.into_bytes()),
                    Err(e) => Err(SourceError::from(e)),
                })
                .take_until(Box::pin(cancel.cancelled_owned()));

            Ok(Box::pin(stream) as ChunkStream)
        })
    }
}
