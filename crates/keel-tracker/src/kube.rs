//! Read-only tracker backed by Kubernetes EndpointSlices.
//!
//! Live instances are the endpoints of the slices labeled
//! `kubernetes.io/service-name=<service>`. Nothing is written; the
//! cluster's own readiness tracking replaces heartbeats.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use keel_core::Clock;
use keel_state::TrackedInstance;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{TrackerError, TrackerResult};
use crate::host::{HostIdentity, HostOptions, describe_instance, listen_ports};
use crate::service::InstanceService;

pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointSliceList {
    #[serde(default)]
    pub items: Vec<EndpointSlice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointSlice {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub ports: Vec<EndpointPort>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default)]
    pub addresses: Vec<String>,
    pub target_ref: Option<ObjectReference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectReference {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointPort {
    pub name: Option<String>,
    pub port: Option<i32>,
}

/// Where EndpointSlices come from.
#[async_trait]
pub trait EndpointSliceSource: Send + Sync {
    async fn list(&self, namespace: &str, label_selector: &str) -> TrackerResult<Vec<EndpointSlice>>;
}

/// EndpointSlices read from the Kubernetes API server.
pub struct ApiServerSource {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiServerSource {
    pub fn new(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Configure from the pod's service account and the
    /// `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT` environment.
    pub fn in_cluster() -> TrackerResult<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| TrackerError::Kubernetes("not running inside a cluster".into()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let read = |file: &str| {
            std::fs::read(dir.join(file))
                .map_err(|e| TrackerError::Kubernetes(format!("reading service account {file}: {e}")))
        };
        let token = String::from_utf8_lossy(&read("token")?).trim().to_string();
        let ca = reqwest::Certificate::from_pem(&read("ca.crt")?)?;
        let client = Client::builder().add_root_certificate(ca).build()?;
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host
        };
        Ok(Self::new(client, format!("https://{host}:{port}"), Some(token)))
    }
}

#[async_trait]
impl EndpointSliceSource for ApiServerSource {
    async fn list(&self, namespace: &str, label_selector: &str) -> TrackerResult<Vec<EndpointSlice>> {
        let url = format!(
            "{}/apis/discovery.k8s.io/v1/namespaces/{namespace}/endpointslices",
            self.base_url
        );
        let mut req = self
            .client
            .get(&url)
            .query(&[("labelSelector", label_selector)]);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let list: EndpointSliceList = req.send().await?.error_for_status()?.json().await?;
        debug!(%namespace, slices = list.items.len(), "endpoint slices listed");
        Ok(list.items)
    }
}

pub struct KubeInstanceTracker {
    source: Arc<dyn EndpointSliceSource>,
    clock: Arc<dyn Clock>,
    namespace: String,
    service: String,
    default_port: String,
    default_tls_port: String,
    current: TrackedInstance,
}

impl KubeInstanceTracker {
    /// Ports unnamed in the slices default to the configured listen
    /// ports, then to `80` and `443`.
    pub fn new(
        source: Arc<dyn EndpointSliceSource>,
        clock: Arc<dyn Clock>,
        host: &dyn HostIdentity,
        opts: &HostOptions,
        namespace: impl Into<String>,
        service: impl Into<String>,
    ) -> TrackerResult<Self> {
        let (port, tls_port) = listen_ports(opts.listen.as_deref(), opts.tls_listen.as_deref())?;
        let current = describe_instance(host, opts, clock.now())?;
        Ok(Self {
            source,
            clock,
            namespace: namespace.into(),
            service: service.into(),
            default_port: non_empty_or(port, "80"),
            default_tls_port: non_empty_or(tls_port, "443"),
            current,
        })
    }
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

#[async_trait]
impl InstanceService for KubeInstanceTracker {
    async fn current_instance(&self) -> TrackerResult<TrackedInstance> {
        Ok(self.current.clone())
    }

    async fn live_instances(&self) -> TrackerResult<Vec<TrackedInstance>> {
        let selector = format!("{SERVICE_NAME_LABEL}={}", self.service);
        let slices = self.source.list(&self.namespace, &selector).await?;
        let now = self.clock.now();

        let mut instances = Vec::new();
        for slice in slices {
            let mut port = self.default_port.clone();
            let mut tls_port = self.default_tls_port.clone();
            for p in &slice.ports {
                match (p.name.as_deref(), p.port) {
                    (Some("http"), Some(n)) => port = n.to_string(),
                    (Some("https"), Some(n)) => tls_port = n.to_string(),
                    _ => {}
                }
            }
            for endpoint in slice.endpoints {
                let Some(target) = endpoint.target_ref else {
                    continue;
                };
                instances.push(TrackedInstance {
                    name: target.name,
                    addresses: endpoint.addresses,
                    port: port.clone(),
                    tls_port: tls_port.clone(),
                    last_update: now,
                });
            }
        }
        Ok(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Interface;
    use axum::Router;
    use axum::extract::{Path as UrlPath, Query};
    use axum::routing::get;
    use keel_core::SystemClock;
    use serde_json::{Value, json};
    use std::collections::HashMap;

    struct FakeHost;

    impl HostIdentity for FakeHost {
        fn hostname(&self) -> TrackerResult<String> {
            Ok("keel-api-0".into())
        }

        fn interfaces(&self) -> TrackerResult<Vec<Interface>> {
            Ok(vec![Interface {
                name: "eth0".into(),
                addresses: vec!["10.1.0.7".parse().unwrap()],
            }])
        }
    }

    async fn slices(
        UrlPath(namespace): UrlPath<String>,
        Query(params): Query<HashMap<String, String>>,
    ) -> axum::Json<Value> {
        let selector = params.get("labelSelector").cloned().unwrap_or_default();
        if namespace != "keel-system" || selector != "kubernetes.io/service-name=keel-api" {
            return axum::Json(json!({ "items": [] }));
        }
        axum::Json(json!({
            "items": [
                {
                    "endpoints": [
                        { "addresses": ["10.1.0.7"], "targetRef": { "kind": "Pod", "name": "keel-api-0" } },
                        { "addresses": ["10.1.0.8"] }
                    ],
                    "ports": [
                        { "name": "http", "port": 8080, "protocol": "TCP" },
                        { "name": "metrics", "port": 9090 }
                    ]
                },
                {
                    "endpoints": [
                        { "addresses": ["10.1.0.9", "10.1.0.10"], "targetRef": { "name": "keel-api-1" } }
                    ]
                }
            ]
        }))
    }

    async fn serve() -> String {
        let app = Router::new().route(
            "/apis/discovery.k8s.io/v1/namespaces/{namespace}/endpointslices",
            get(slices),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn tracker(base: String, opts: &HostOptions) -> KubeInstanceTracker {
        let source = ApiServerSource::new(Client::new(), base, Some("token".into()));
        KubeInstanceTracker::new(
            Arc::new(source),
            Arc::new(SystemClock),
            &FakeHost,
            opts,
            "keel-system",
            "keel-api",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn instances_from_endpoint_slices() {
        let base = serve().await;
        let t = tracker(base, &HostOptions::default());

        let live = t.live_instances().await.unwrap();
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].name, "keel-api-0");
        assert_eq!(live[0].addresses, vec!["10.1.0.7"]);
        assert_eq!(live[0].port, "8080");
        assert_eq!(live[0].tls_port, "443");
        assert_eq!(live[1].name, "keel-api-1");
        assert_eq!(live[1].addresses, vec!["10.1.0.9", "10.1.0.10"]);
        assert_eq!(live[1].port, "80");

        let me = t.current_instance().await.unwrap();
        assert_eq!(me.name, "keel-api-0");
        assert_eq!(me.addresses, vec!["10.1.0.7"]);
    }

    #[tokio::test]
    async fn listen_ports_are_the_defaults() {
        let base = serve().await;
        let opts = HostOptions {
            listen: Some("0.0.0.0:8888".into()),
            tls_listen: Some("0.0.0.0:8443".into()),
            ..Default::default()
        };
        let live = tracker(base, &opts).live_instances().await.unwrap();
        assert_eq!(live[0].port, "8080");
        assert_eq!(live[0].tls_port, "8443");
        assert_eq!(live[1].port, "8888");
    }

    #[tokio::test]
    async fn api_errors_surface() {
        let t = tracker("http://127.0.0.1:1".into(), &HostOptions::default());
        let err = t.live_instances().await.unwrap_err();
        assert!(matches!(err, TrackerError::Http(_)));
        assert!(err.is_retryable());
    }
}
