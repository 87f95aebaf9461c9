//! The tonic client against a loopback build agent.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;

use keel_build::proto::build_response::Data;
use keel_build::proto::build_server::{Build, BuildServer};
use keel_build::proto::{BuildRequest, BuildResponse, TsuruConfig};
use keel_build::{BuildOpts, BuildOrchestrator, GrpcConnector};
use keel_cluster::ClusterRegistry;
use keel_core::{App, Event, ImageNaming};
use keel_state::{Cluster, ServiceContext};
use keel_version::VersionRegistry;
use tokio_stream::Stream;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

/// Echoes the destination images, then reports a Procfile.
struct EchoAgent;

#[tonic::async_trait]
impl Build for EchoAgent {
    type BuildStream = Pin<Box<dyn Stream<Item = Result<BuildResponse, Status>> + Send + 'static>>;

    async fn build(
        &self,
        request: Request<BuildRequest>,
    ) -> Result<Response<Self::BuildStream>, Status> {
        let request = request.into_inner();
        let app = request
            .app
            .ok_or_else(|| Status::invalid_argument("app is required"))?;
        let mut responses: Vec<Result<BuildResponse, Status>> = request
            .destination_images
            .iter()
            .map(|image| {
                Ok(BuildResponse {
                    data: Some(Data::Output(format!("pushing {image}\n").into_bytes())),
                })
            })
            .collect();
        responses.push(Ok(BuildResponse {
            data: Some(Data::TsuruConfig(TsuruConfig {
                procfile: format!("web: ./{} --bytes {}", app.name, request.data.len()),
                ..Default::default()
            })),
        }));
        Ok(Response::new(Box::pin(tokio_stream::iter(responses))))
    }
}

async fn serve_agent() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(BuildServer::new(EchoAgent))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    address
}

#[tokio::test]
async fn build_over_grpc() {
    let address = serve_agent().await;

    let ctx = ServiceContext::in_memory().unwrap();
    let versions = VersionRegistry::from_context(&ctx, ImageNaming::default());
    let clusters = ClusterRegistry::from_context(&ctx, BTreeMap::new());
    clusters
        .save(Cluster {
            name: "local".into(),
            provisioner: "kubernetes".into(),
            default: true,
            custom_data: BTreeMap::from([("build-service-address".into(), address)]),
            ..Default::default()
        })
        .unwrap();
    let orchestrator = BuildOrchestrator::new(versions.clone(), clusters, Arc::new(GrpcConnector));

    let mut out = Vec::new();
    let version = orchestrator
        .build(
            Some(&App::new("myapp").with_pool("poolA")),
            Some(&Event::new("E1")),
            BuildOpts {
                archive: Some(b"my awesome source code :P".to_vec()),
                ..Default::default()
            },
            &mut out,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(version.processes()["web"], vec!["./myapp --bytes 25".to_string()]);
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("pushing tsuru/app-myapp:v1\n"));
    assert!(text.contains("pushing tsuru/app-myapp:latest\n"));
    assert_eq!(
        versions.app_versions("myapp").unwrap().get(1).unwrap().deploy_image,
        "tsuru/app-myapp:v1"
    );
}
