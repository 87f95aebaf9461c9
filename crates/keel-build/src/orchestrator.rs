//! BuildOrchestrator: drives one build from request to committed version.
//!
//! Three entry points share the same dispatch path:
//!
//! - [`BuildOrchestrator::build`] for app deploys (image, container file,
//!   uploaded or downloaded source archive),
//! - [`BuildOrchestrator::build_job`] for job images,
//! - [`BuildOrchestrator::platform_build`] which fans out to one agent per
//!   distinct cluster registry.
//!
//! Store calls are synchronous; the cancellation token is checked before
//! each of them so no new side effect starts once cancellation is seen.

use std::collections::BTreeSet;
use std::sync::Arc;

use keel_cluster::{ClusterRegistry, ClusterSettings};
use keel_core::image::{platform_image_name, split_image_name};
use keel_core::{App, Event, Job};
use keel_state::{Cluster, NewVersionArgs};
use keel_version::{VersionHandle, VersionRegistry};
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::agent::{AgentEndpoint, BuildAgentConnector, call_build_service, connect_agent};
use crate::archive::download_archive;
use crate::error::{BuildError, BuildResult};
use crate::metadata::{Note, reconcile};
use crate::opts::{BuildOpts, BuildSource, JobBuildOpts, PlatformOptions};
use crate::output::{write_action, write_line, write_section};
use crate::proto::{BuildKind, BuildRequest, PushOptions, TsuruApp, TsuruJob, TsuruPlatform};

/// Provisioner whose clusters run the build agents.
pub const DEFAULT_PROVISIONER: &str = "kubernetes";

pub struct BuildOrchestrator {
    versions: VersionRegistry,
    clusters: ClusterRegistry,
    connector: Arc<dyn BuildAgentConnector>,
    http: reqwest::Client,
    provisioner: String,
}

impl BuildOrchestrator {
    pub fn new(
        versions: VersionRegistry,
        clusters: ClusterRegistry,
        connector: Arc<dyn BuildAgentConnector>,
    ) -> Self {
        Self {
            versions,
            clusters,
            connector,
            http: reqwest::Client::new(),
            provisioner: DEFAULT_PROVISIONER.to_string(),
        }
    }

    /// Use `client` for archive downloads.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn with_provisioner(mut self, provisioner: impl Into<String>) -> Self {
        self.provisioner = provisioner.into();
        self
    }

    pub fn versions(&self) -> &VersionRegistry {
        &self.versions
    }

    /// Build a new version of `app`.
    ///
    /// On success the returned version carries processes, custom data,
    /// exposed ports and its base image. A failure after allocation leaves
    /// the pending version in place.
    #[instrument(skip_all, fields(app = app.map(|a| a.name.as_str())))]
    pub async fn build<W>(
        &self,
        app: Option<&App>,
        event: Option<&Event>,
        opts: BuildOpts,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> BuildResult<VersionHandle>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let app = app.ok_or(BuildError::AppNotProvided)?;
        let event = event
            .filter(|e| !e.unique_id.is_empty())
            .ok_or(BuildError::EventNotProvided)?;
        ensure_not_cancelled(cancel)?;
        let source = opts.source()?;
        let kind = source.kind();
        let (source_image, data, containerfile) = match source {
            BuildSource::Image(image) => (image, Vec::new(), String::new()),
            BuildSource::ContainerFile {
                containerfile,
                context,
            } => (String::new(), context, containerfile),
            BuildSource::SourceUpload(data) => (String::new(), data, String::new()),
            BuildSource::ArchiveUrl(url) => {
                debug!(%url, "downloading source archive");
                let data = download_archive(&self.http, &url, cancel).await?;
                (String::new(), data, String::new())
            }
        };

        write_section(
            out,
            &format!("Starting container image build for app {:?}", app.name),
        )
        .await?;

        let cluster = self.clusters.find_by_pool(&self.provisioner, &app.pool)?;
        let settings = self.clusters.settings(&cluster, &app.pool);
        let endpoint = agent_endpoint(&cluster, &settings)?;

        ensure_not_cancelled(cancel)?;
        let mut version = self.versions.new_app_version(
            app,
            NewVersionArgs {
                description: opts.message.clone(),
                event_id: event.unique_id.clone(),
                ..Default::default()
            },
        )?;
        info!(
            app = %app.name,
            version = version.version(),
            cluster = %cluster.name,
            ?kind,
            "build dispatched"
        );

        let destination_images = app_destination_images(&version, opts.tag());
        for image in &destination_images {
            write_action(out, &format!("Destination image: {image}")).await?;
        }

        let request = BuildRequest {
            kind: kind.into(),
            app: Some(TsuruApp {
                name: app.name.clone(),
                env_vars: app.env.clone(),
                team: app.team_owner.clone(),
            }),
            source_image,
            destination_images,
            data,
            containerfile,
            push_options: Some(PushOptions {
                insecure_registry: settings.registry_insecure,
            }),
            ..Default::default()
        };

        let agent = connect_agent(self.connector.as_ref(), &endpoint, cancel).await?;
        let tsuru_config = call_build_service(agent.as_ref(), request, out, cancel).await?;

        let reconciled = reconcile(tsuru_config.as_ref())?;
        for note in &reconciled.notes {
            match note {
                Note::Action(text) => write_action(out, text).await?,
                Note::Verbatim(text) => write_line(out, text).await?,
            }
        }

        ensure_not_cancelled(cancel)?;
        version.add_data(reconciled.data)?;
        version.commit_base_image()?;
        info!(
            app = %app.name,
            version = version.version(),
            image = %version.base_image_name(),
            "build finished"
        );
        Ok(version)
    }

    /// Build the image a job runs. Returns the destination image.
    #[instrument(skip_all, fields(job = job.map(|j| j.name.as_str())))]
    pub async fn build_job<W>(
        &self,
        job: Option<&Job>,
        opts: JobBuildOpts,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> BuildResult<String>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let job = job.ok_or(BuildError::JobNotProvided)?;
        ensure_not_cancelled(cancel)?;
        let image = opts
            .image_id
            .filter(|i| !i.trim().is_empty())
            .ok_or_else(|| BuildError::InvalidRequest("job builds require an image".into()))?;

        write_section(
            out,
            &format!("Starting container image build for job {:?}", job.name),
        )
        .await?;

        let cluster = self.clusters.find_by_pool(&self.provisioner, &job.pool)?;
        let settings = self.clusters.settings(&cluster, &job.pool);
        let endpoint = agent_endpoint(&cluster, &settings)?;

        let destination = self.versions.naming().job_image_name(&job.name);
        write_action(out, &format!("Destination image: {destination}")).await?;

        let request = BuildRequest {
            kind: BuildKind::JobCreateWithContainerImage.into(),
            job: Some(TsuruJob {
                name: job.name.clone(),
                env_vars: job.env.clone(),
            }),
            source_image: image,
            destination_images: vec![destination.clone()],
            push_options: Some(PushOptions {
                insecure_registry: settings.registry_insecure,
            }),
            ..Default::default()
        };

        let agent = connect_agent(self.connector.as_ref(), &endpoint, cancel).await?;
        call_build_service(agent.as_ref(), request, out, cancel).await?;
        info!(job = %job.name, image = %destination, "job image built");
        Ok(destination)
    }

    /// Build a platform image on every cluster that accepts it.
    ///
    /// Clusters sharing a registry get a single build. Returns every
    /// image pushed, in cluster order.
    #[instrument(skip_all, fields(platform = %opts.name, version = opts.version))]
    pub async fn platform_build<W>(
        &self,
        opts: PlatformOptions,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> BuildResult<Vec<String>>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        ensure_not_cancelled(cancel)?;
        let clusters = self.clusters.find_by_provisioner(&self.provisioner)?;

        let mut seen_registries = BTreeSet::new();
        let mut accepted = 0usize;
        let mut images = Vec::new();
        for cluster in &clusters {
            let settings = self.clusters.settings(cluster, "");
            if settings.disable_platform_build {
                write_action(
                    out,
                    &format!(
                        "Skipping platform build on {} cluster: disabled to platform builds",
                        cluster.name
                    ),
                )
                .await?;
                continue;
            }
            let Some(registry) = settings.registry.clone() else {
                write_action(
                    out,
                    &format!(
                        "Skipping platform build on {} cluster: no registry found in cluster configs",
                        cluster.name
                    ),
                )
                .await?;
                continue;
            };
            accepted += 1;
            if opts.rollback_version > 0 {
                return Err(BuildError::RollbackNotImplemented);
            }
            if !seen_registries.insert(registry.clone()) {
                debug!(cluster = %cluster.name, %registry, "registry already built");
                continue;
            }

            let endpoint = agent_endpoint(cluster, &settings)?;
            let destination_images = platform_destination_images(&registry, &opts);
            write_section(
                out,
                &format!(
                    "Building platform {} on {} cluster",
                    opts.name, cluster.name
                ),
            )
            .await?;
            let request = BuildRequest {
                kind: BuildKind::PlatformWithContainerFile.into(),
                platform: Some(TsuruPlatform {
                    name: opts.name.clone(),
                }),
                destination_images: destination_images.clone(),
                containerfile: String::from_utf8_lossy(&opts.data).into_owned(),
                push_options: Some(PushOptions {
                    insecure_registry: settings.registry_insecure,
                }),
                ..Default::default()
            };

            ensure_not_cancelled(cancel)?;
            let agent = connect_agent(self.connector.as_ref(), &endpoint, cancel).await?;
            call_build_service(agent.as_ref(), request, out, cancel).await?;
            info!(cluster = %cluster.name, %registry, "platform image built");
            images.extend(destination_images);
        }

        if accepted == 0 {
            warn!(platform = %opts.name, "no cluster accepts platform builds");
            return Err(BuildError::NoNodesAvailable);
        }
        Ok(images)
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> BuildResult<()> {
    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
    }
    Ok(())
}

fn agent_endpoint(cluster: &Cluster, settings: &ClusterSettings) -> BuildResult<AgentEndpoint> {
    let address = settings.build_service_address.clone().ok_or_else(|| {
        debug!(cluster = %cluster.name, "cluster has no build service address");
        BuildError::BuildV2NotSupported
    })?;
    Ok(AgentEndpoint {
        address,
        tls: settings.build_service_tls,
    })
}

/// The base image, plus `<repository>:<tag>` when `tag` differs from it.
fn app_destination_images(version: &VersionHandle, tag: &str) -> Vec<String> {
    let base = version.base_image_name();
    let (repository, base_tag) = split_image_name(&base);
    let extra = (tag != base_tag).then(|| format!("{repository}:{tag}"));
    std::iter::once(base.clone()).chain(extra).collect()
}

fn platform_destination_images(registry: &str, opts: &PlatformOptions) -> Vec<String> {
    let repository = format!("{}/{}", registry.trim_end_matches('/'), opts.name);
    std::iter::once(platform_image_name(registry, &opts.name, opts.version))
        .chain(opts.extra_tags.iter().map(|tag| format!("{repository}:{tag}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_images_include_extra_tags() {
        let opts = PlatformOptions {
            name: "my-platform".into(),
            version: 42,
            extra_tags: vec!["latest".into()],
            ..Default::default()
        };
        assert_eq!(
            platform_destination_images("reg.example/tsuru", &opts),
            vec![
                "reg.example/tsuru/my-platform:v42",
                "reg.example/tsuru/my-platform:latest"
            ]
        );
    }

    #[test]
    fn missing_build_service_is_build_v2_sentinel() {
        let cluster = Cluster {
            name: "c1".into(),
            ..Default::default()
        };
        let err = agent_endpoint(&cluster, &ClusterSettings::default()).unwrap_err();
        assert!(matches!(err, BuildError::BuildV2NotSupported));

        let settings = ClusterSettings {
            build_service_address: Some("build.example:8000".into()),
            build_service_tls: true,
            ..Default::default()
        };
        let endpoint = agent_endpoint(&cluster, &settings).unwrap();
        assert_eq!(endpoint.address, "build.example:8000");
        assert!(endpoint.tls);
    }
}
