//! Build request options and build kind derivation.

use crate::error::{BuildError, BuildResult};
use crate::proto::BuildKind;

/// Options of an app build.
#[derive(Debug, Clone, Default)]
pub struct BuildOpts {
    /// Pre-built container image to deploy.
    pub image_id: Option<String>,
    /// Inline container file; `archive` is its build context when present.
    pub containerfile: Option<String>,
    /// Uploaded source archive.
    pub archive: Option<Vec<u8>>,
    /// Source archive to download before building.
    pub archive_url: Option<String>,
    /// Extra tag for the destination repository. Empty means `latest`.
    pub tag: String,
    /// Stored as the version description.
    pub message: String,
    /// Deprecated; always rejected.
    pub rebuild: bool,
}

/// Where the build input comes from, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildSource {
    Image(String),
    ContainerFile {
        containerfile: String,
        context: Vec<u8>,
    },
    SourceUpload(Vec<u8>),
    ArchiveUrl(String),
}

impl BuildSource {
    pub fn kind(&self) -> BuildKind {
        match self {
            BuildSource::Image(_) => BuildKind::AppBuildWithContainerImage,
            BuildSource::ContainerFile { .. } => BuildKind::AppBuildWithContainerFile,
            BuildSource::SourceUpload(_) | BuildSource::ArchiveUrl(_) => {
                BuildKind::AppBuildWithSourceUpload
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl BuildOpts {
    /// Derive the build input. Fails without side effects on a
    /// malformed or deprecated request.
    pub fn source(&self) -> BuildResult<BuildSource> {
        if self.rebuild {
            return Err(BuildError::RebuildDeprecated);
        }
        if let Some(image) = non_empty(&self.image_id) {
            return Ok(BuildSource::Image(image.to_string()));
        }
        if let Some(containerfile) = non_empty(&self.containerfile) {
            return Ok(BuildSource::ContainerFile {
                containerfile: containerfile.to_string(),
                context: self.archive.clone().unwrap_or_default(),
            });
        }
        match &self.archive {
            Some(data) if !data.is_empty() => return Ok(BuildSource::SourceUpload(data.clone())),
            _ => {}
        }
        if let Some(url) = non_empty(&self.archive_url) {
            return Ok(BuildSource::ArchiveUrl(url.to_string()));
        }
        match &self.archive {
            Some(_) => Err(BuildError::ArchiveEmpty),
            None => Err(BuildError::InvalidRequest(
                "one of image, container file or source archive is required".into(),
            )),
        }
    }

    /// The extra destination tag, defaulting to `latest`.
    pub fn tag(&self) -> &str {
        if self.tag.is_empty() {
            keel_core::image::LATEST_TAG
        } else {
            &self.tag
        }
    }
}

/// Options of a job image build.
#[derive(Debug, Clone, Default)]
pub struct JobBuildOpts {
    /// Image the job runs; required.
    pub image_id: Option<String>,
}

/// Options of a platform image build.
#[derive(Debug, Clone, Default)]
pub struct PlatformOptions {
    pub name: String,
    pub version: u32,
    pub extra_tags: Vec<String>,
    /// Container file contents.
    pub data: Vec<u8>,
    pub rollback_version: u32,
}
