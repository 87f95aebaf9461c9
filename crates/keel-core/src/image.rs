//! Deterministic container image naming.
//!
//! ```text
//! base   [<registry>/]<namespace>/app-<app>:v<version>
//! build  [<registry>/]<namespace|team>/app-<app>:v<version>-builder
//! job    [<registry>/]<namespace>/job-<job>:latest
//! ```

use crate::config::{DEFAULT_REPOSITORY_NAMESPACE, DockerConfig};

/// Tag the registry treats as "most recent".
pub const LATEST_TAG: &str = "latest";

/// Split an image reference into repository and tag.
///
/// A `:` that belongs to a registry host (`host:5000/repo`) is not a tag
/// separator; references without a tag get [`LATEST_TAG`].
pub fn split_image_name(image: &str) -> (&str, &str) {
    match image.rfind(':') {
        Some(idx) if !image[idx + 1..].contains('/') => (&image[..idx], &image[idx + 1..]),
        _ => (image, LATEST_TAG),
    }
}

/// Image naming rules derived from the `[docker]` config section.
#[derive(Debug, Clone, Default)]
pub struct ImageNaming {
    registry: Option<String>,
    repository_namespace: Option<String>,
}

impl ImageNaming {
    pub fn new(registry: Option<String>, repository_namespace: Option<String>) -> Self {
        Self {
            registry: registry.filter(|r| !r.is_empty()),
            repository_namespace,
        }
    }

    pub fn from_config(docker: &DockerConfig) -> Self {
        Self::new(docker.registry.clone(), docker.repository_namespace.clone())
    }

    /// The configured namespace, `None` when explicitly set to empty.
    fn configured_namespace(&self) -> Option<&str> {
        match self.repository_namespace.as_deref() {
            None => Some(DEFAULT_REPOSITORY_NAMESPACE),
            Some("") => None,
            Some(ns) => Some(ns),
        }
    }

    fn with_registry(&self, name: String) -> String {
        match &self.registry {
            Some(registry) => format!("{registry}/{name}"),
            None => name,
        }
    }

    /// Repository (no tag) holding every image of an app.
    pub fn app_repository(&self, app: &str, team_owner: Option<&str>) -> String {
        let namespace = self
            .configured_namespace()
            .or(team_owner.filter(|t| !t.is_empty()))
            .unwrap_or(DEFAULT_REPOSITORY_NAMESPACE);
        self.with_registry(format!("{namespace}/app-{app}"))
    }

    /// Deployable image of an app version.
    pub fn base_image_name(&self, app: &str, version: u32) -> String {
        let namespace = self
            .configured_namespace()
            .unwrap_or(DEFAULT_REPOSITORY_NAMESPACE);
        self.with_registry(format!("{namespace}/app-{app}:v{version}"))
    }

    /// Intermediate build image of an app version.
    pub fn build_image_name(
        &self,
        app: &str,
        version: u32,
        custom_build_tag: &str,
        team_owner: &str,
    ) -> String {
        let repository = self.app_repository(app, Some(team_owner));
        if custom_build_tag.is_empty() {
            format!("{repository}:v{version}-builder")
        } else {
            format!("{repository}:{custom_build_tag}")
        }
    }

    /// Destination image of a job build.
    pub fn job_image_name(&self, job: &str) -> String {
        let namespace = self
            .configured_namespace()
            .unwrap_or(DEFAULT_REPOSITORY_NAMESPACE);
        self.with_registry(format!("{namespace}/job-{job}:{LATEST_TAG}"))
    }
}

/// Platform image in a cluster registry: `<registry>/<name>:v<version>`.
pub fn platform_image_name(registry: &str, platform: &str, version: u32) -> String {
    let registry = registry.trim_end_matches('/');
    format!("{registry}/{platform}:v{version}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_with_and_without_tag() {
        assert_eq!(split_image_name("tsuru/app-myapp:v1"), ("tsuru/app-myapp", "v1"));
        assert_eq!(split_image_name("tsuru/app-myapp"), ("tsuru/app-myapp", "latest"));
        assert_eq!(
            split_image_name("localhost:3030/tsuru/app-myapp"),
            ("localhost:3030/tsuru/app-myapp", "latest")
        );
        assert_eq!(
            split_image_name("localhost:3030/tsuru/app-myapp:v2"),
            ("localhost:3030/tsuru/app-myapp", "v2")
        );
    }

    #[test]
    fn default_naming() {
        let naming = ImageNaming::default();
        assert_eq!(naming.base_image_name("myapp", 1), "tsuru/app-myapp:v1");
        assert_eq!(
            naming.build_image_name("myapp", 1, "", "myteam"),
            "tsuru/app-myapp:v1-builder"
        );
    }

    #[test]
    fn registry_prefix() {
        let naming = ImageNaming::new(Some("localhost:3030".into()), None);
        assert_eq!(naming.base_image_name("myapp", 2), "localhost:3030/tsuru/app-myapp:v2");
        assert_eq!(
            naming.build_image_name("myapp", 2, "", ""),
            "localhost:3030/tsuru/app-myapp:v2-builder"
        );
    }

    #[test]
    fn custom_build_tag_replaces_tag() {
        let naming = ImageNaming::default();
        assert_eq!(
            naming.build_image_name("myapp", 9, "mytag", "myteam"),
            "tsuru/app-myapp:mytag"
        );
        assert_eq!(naming.base_image_name("myapp", 9), "tsuru/app-myapp:v9");
    }

    #[test]
    fn unset_namespace_uses_team_owner_for_build_image() {
        let naming = ImageNaming::new(None, Some(String::new()));
        assert_eq!(naming.base_image_name("myapp", 9), "tsuru/app-myapp:v9");
        assert_eq!(
            naming.build_image_name("myapp", 9, "", "myteam"),
            "myteam/app-myapp:v9-builder"
        );
    }

    #[test]
    fn job_and_platform_images() {
        let naming = ImageNaming::new(Some("reg.example".into()), Some("ops".into()));
        assert_eq!(naming.job_image_name("backup"), "reg.example/ops/job-backup:latest");
        assert_eq!(
            platform_image_name("reg.example/tsuru/", "python", 42),
            "reg.example/tsuru/python:v42"
        );
    }
}
