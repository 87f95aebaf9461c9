//! Build agent connection and stream draining.

use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, warn};

use crate::error::{BuildError, BuildResult};
use crate::proto::build_client::BuildClient;
use crate::proto::build_response::Data;
use crate::proto::{BuildRequest, BuildResponse, TsuruConfig};

/// Server-streamed build progress.
pub type BuildResponseStream =
    Pin<Box<dyn Stream<Item = Result<BuildResponse, Status>> + Send + 'static>>;

/// Where a cluster's build service listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEndpoint {
    /// `host:port`, optionally with a scheme.
    pub address: String,
    pub tls: bool,
}

impl AgentEndpoint {
    pub fn uri(&self) -> String {
        if self.address.contains("://") {
            return self.address.clone();
        }
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}", self.address)
    }

    fn host(&self) -> &str {
        let rest = self
            .address
            .split_once("://")
            .map_or(self.address.as_str(), |(_, rest)| rest);
        let authority = rest.split('/').next().unwrap_or(rest);
        authority
            .rsplit_once(':')
            .map_or(authority, |(host, _)| host)
    }
}

/// One open connection to a build agent.
#[async_trait]
pub trait BuildAgent: Send + Sync {
    async fn build(&self, request: BuildRequest) -> Result<BuildResponseStream, Status>;
}

/// Opens connections to build agents.
#[async_trait]
pub trait BuildAgentConnector: Send + Sync {
    async fn connect(&self, endpoint: &AgentEndpoint) -> BuildResult<Box<dyn BuildAgent>>;
}

/// Connects over gRPC, with TLS against the native roots when asked.
#[derive(Debug, Clone, Default)]
pub struct GrpcConnector;

#[async_trait]
impl BuildAgentConnector for GrpcConnector {
    async fn connect(&self, endpoint: &AgentEndpoint) -> BuildResult<Box<dyn BuildAgent>> {
        let connect_err = |reason: String| BuildError::Connect {
            address: endpoint.address.clone(),
            reason,
        };
        let mut channel =
            Endpoint::from_shared(endpoint.uri()).map_err(|e| connect_err(e.to_string()))?;
        if endpoint.tls {
            let tls = ClientTlsConfig::new()
                .domain_name(endpoint.host().to_string())
                .with_native_roots();
            channel = channel
                .tls_config(tls)
                .map_err(|e| connect_err(e.to_string()))?;
        }
        let channel = channel
            .connect()
            .await
            .map_err(|e| connect_err(e.to_string()))?;
        debug!(address = %endpoint.address, tls = endpoint.tls, "connected to build agent");
        Ok(Box::new(GrpcAgent {
            client: BuildClient::new(channel),
        }))
    }
}

struct GrpcAgent {
    client: BuildClient<Channel>,
}

#[async_trait]
impl BuildAgent for GrpcAgent {
    async fn build(&self, request: BuildRequest) -> Result<BuildResponseStream, Status> {
        let mut client = self.client.clone();
        let response = client.build(request).await?;
        Ok(Box::pin(response.into_inner()))
    }
}

/// Connect to an agent, giving up when `cancel` fires.
pub async fn connect_agent(
    connector: &dyn BuildAgentConnector,
    endpoint: &AgentEndpoint,
    cancel: &CancellationToken,
) -> BuildResult<Box<dyn BuildAgent>> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(BuildError::Cancelled),
        agent = connector.connect(endpoint) => agent,
    }
}

/// Run one build call and drain its stream to EOF.
///
/// Output chunks go to `out` verbatim and in order. The first
/// `TsuruConfig` is kept, later ones are ignored. Dropping the stream on
/// cancellation cancels the call on the agent side.
pub async fn call_build_service<W>(
    agent: &dyn BuildAgent,
    request: BuildRequest,
    out: &mut W,
    cancel: &CancellationToken,
) -> BuildResult<Option<TsuruConfig>>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let mut stream = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(BuildError::Cancelled),
        opened = agent.build(request) => opened.map_err(BuildError::from_status)?,
    };

    let mut config: Option<TsuruConfig> = None;
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!("build cancelled while streaming");
                return Err(BuildError::Cancelled);
            }
            next = stream.next() => next,
        };
        match next {
            None => break,
            Some(Err(status)) => return Err(BuildError::from_status(status)),
            Some(Ok(BuildResponse { data: Some(Data::Output(chunk)) })) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        warn!("build cancelled while writing output");
                        return Err(BuildError::Cancelled);
                    }
                    written = out.write_all(&chunk) => written?,
                }
            }
            Some(Ok(BuildResponse {
                data: Some(Data::TsuruConfig(tc)),
            })) => {
                if config.is_none() {
                    config = Some(tc);
                } else {
                    debug!("ignoring repeated tsuru config");
                }
            }
            Some(Ok(BuildResponse { data: None })) => {}
        }
    }
    out.flush().await?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn endpoint_uri_and_host() {
        let plain = AgentEndpoint {
            address: "build.example:8000".into(),
            tls: false,
        };
        assert_eq!(plain.uri(), "http://build.example:8000");
        assert_eq!(plain.host(), "build.example");

        let tls = AgentEndpoint {
            address: "build.example:8443".into(),
            tls: true,
        };
        assert_eq!(tls.uri(), "https://build.example:8443");

        let explicit = AgentEndpoint {
            address: "https://secure.example:9000/".into(),
            tls: true,
        };
        assert_eq!(explicit.uri(), "https://secure.example:9000/");
        assert_eq!(explicit.host(), "secure.example");
    }

    struct Scripted(Vec<Result<BuildResponse, Status>>);

    #[async_trait]
    impl BuildAgent for Scripted {
        async fn build(&self, _request: BuildRequest) -> Result<BuildResponseStream, Status> {
            Ok(Box::pin(tokio_stream::iter(self.0.clone())))
        }
    }

    fn output(s: &str) -> Result<BuildResponse, Status> {
        Ok(BuildResponse {
            data: Some(Data::Output(s.as_bytes().to_vec())),
        })
    }

    fn config(procfile: &str) -> Result<BuildResponse, Status> {
        Ok(BuildResponse {
            data: Some(Data::TsuruConfig(TsuruConfig {
                procfile: procfile.into(),
                ..Default::default()
            })),
        })
    }

    #[tokio::test]
    async fn first_config_wins_and_output_keeps_flowing() {
        let agent = Scripted(vec![
            output("a\n"),
            config("web: first"),
            output("b\n"),
            config("web: second"),
            output("c\n"),
        ]);
        let mut out = Vec::new();
        let tc = call_build_service(&agent, BuildRequest::default(), &mut out, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tc.procfile, "web: first");
        assert_eq!(String::from_utf8(out).unwrap(), "a\nb\nc\n");
    }

    #[tokio::test]
    async fn stream_error_stops_drain() {
        let agent = Scripted(vec![output("a\n"), Err(Status::internal("exploded"))]);
        let mut out = Vec::new();
        let err = call_build_service(&agent, BuildRequest::default(), &mut out, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Rpc(s) if s.message() == "exploded"));
        assert_eq!(out, b"a\n");
    }

    #[tokio::test]
    async fn cancel_interrupts_a_stalled_writer() {
        let agent = Scripted(vec![output("longer than the pipe\n"), config("web: run")]);
        // Nobody reads the other end, so the second byte never fits.
        let (mut out, _reader) = tokio::io::duplex(1);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            call_build_service(&agent, BuildRequest::default(), &mut out, &cancel),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, BuildError::Cancelled));
    }

    #[tokio::test]
    async fn pre_cancelled_never_opens() {
        let agent = Scripted(vec![output("a\n")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut out = Vec::new();
        let err = call_build_service(&agent, BuildRequest::default(), &mut out, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Cancelled));
        assert!(out.is_empty());
    }
}
