//! VersionRegistry: the service over the app version aggregates.
//!
//! Mutations map one-to-one onto [`VersionStore`] calls; the registry
//! adds error translation, image-name lookups and handle construction.
//! It never retries: a [`VersionError::TransactionCancelledByChange`]
//! goes back to the caller.

use std::sync::Arc;

use keel_core::{App, ImageNaming};
use keel_state::{
    AppVersionInfo, AppVersions, NewVersionArgs, ServiceContext, VersionNumber, VersionStore,
    WriteOptions,
};
use tracing::{debug, info};

use crate::error::{VersionError, VersionResult};
use crate::handle::VersionHandle;

#[derive(Clone)]
pub struct VersionRegistry {
    store: Arc<dyn VersionStore>,
    naming: ImageNaming,
}

impl VersionRegistry {
    pub fn new(store: Arc<dyn VersionStore>, naming: ImageNaming) -> Self {
        Self { store, naming }
    }

    pub fn from_context(ctx: &ServiceContext, naming: ImageNaming) -> Self {
        Self::new(ctx.versions.clone(), naming)
    }

    pub fn naming(&self) -> &ImageNaming {
        &self.naming
    }

    fn handle(&self, app: &App, info: AppVersionInfo) -> VersionHandle {
        VersionHandle::new(self.store.clone(), self.naming.clone(), app.clone(), info)
    }

    /// Allocate the next version number for `app`.
    ///
    /// `args.app` is replaced with `app.name`.
    pub fn new_app_version(&self, app: &App, args: NewVersionArgs) -> VersionResult<VersionHandle> {
        let args = NewVersionArgs {
            app: app.name.clone(),
            ..args
        };
        let info = self.store.new_app_version(&args)?;
        info!(app = %app.name, version = info.version, event = %args.event_id, "new app version");
        Ok(self.handle(app, info))
    }

    pub fn app_versions(&self, app: &str) -> VersionResult<AppVersions> {
        self.store
            .app_versions(app)?
            .ok_or(VersionError::NoVersionsAvailable)
    }

    /// Every aggregate, or only those of `app_filter` when non-empty.
    pub fn all_app_versions(&self, app_filter: &[String]) -> VersionResult<Vec<AppVersions>> {
        Ok(self.store.all_app_versions(app_filter)?)
    }

    pub fn update_version(
        &self,
        app: &str,
        info: &AppVersionInfo,
        opts: &WriteOptions,
    ) -> VersionResult<()> {
        self.store.update_version(app, info, opts)?;
        debug!(%app, version = info.version, "version updated");
        Ok(())
    }

    pub fn update_version_success(
        &self,
        app: &str,
        info: &AppVersionInfo,
        opts: &WriteOptions,
    ) -> VersionResult<()> {
        self.store.update_version_success(app, info, opts)?;
        info!(%app, version = info.version, "version promoted");
        Ok(())
    }

    pub fn delete_version_ids(
        &self,
        app: &str,
        versions: &[VersionNumber],
        opts: &WriteOptions,
    ) -> VersionResult<()> {
        self.store.delete_version_ids(app, versions, opts)?;
        info!(%app, ?versions, "versions deleted");
        Ok(())
    }

    pub fn mark_versions_to_removal(
        &self,
        app: &str,
        versions: &[VersionNumber],
        opts: &WriteOptions,
    ) -> VersionResult<()> {
        self.store.mark_versions_to_removal(app, versions, opts)?;
        info!(%app, ?versions, "versions marked to removal");
        Ok(())
    }

    pub fn mark_to_removal(&self, app: &str, opts: &WriteOptions) -> VersionResult<()> {
        self.store.mark_to_removal(app, opts)?;
        info!(%app, "app versions marked to removal");
        Ok(())
    }

    /// Drop every version of `app`. Numbers already handed out stay
    /// allocated; an app without versions is not an error.
    pub fn delete_versions(&self, app: &str, opts: &WriteOptions) -> VersionResult<()> {
        self.store.delete_versions(app, opts)?;
        info!(%app, "app versions deleted");
        Ok(())
    }

    pub fn version_by_number(&self, app: &App, version: VersionNumber) -> VersionResult<VersionHandle> {
        let doc = self.app_versions(&app.name)?;
        let info = doc
            .get(version)
            .cloned()
            .ok_or_else(|| VersionError::VersionNotAvailable {
                app: app.name.clone(),
                version,
            })?;
        Ok(self.handle(app, info))
    }

    pub fn latest_successful_version(&self, app: &App) -> VersionResult<VersionHandle> {
        let doc = self.app_versions(&app.name)?;
        if doc.last_successful_version == 0 {
            return Err(VersionError::NoVersionsAvailable);
        }
        let info = doc
            .get(doc.last_successful_version)
            .cloned()
            .ok_or(VersionError::NoVersionsAvailable)?;
        Ok(self.handle(app, info))
    }

    /// A version still being deployed whose build or base image is `image`.
    pub fn version_by_pending_image(&self, app: &App, image: &str) -> VersionResult<VersionHandle> {
        let doc = self.app_versions(&app.name)?;
        doc.versions
            .values()
            .filter(|info| !info.deploy_successful)
            .map(|info| self.handle(app, info.clone()))
            .find(|h| h.base_image_name() == image || h.build_image_name() == image)
            .ok_or(VersionError::NoVersionsAvailable)
    }

    /// Resolve `"3"`, `"v3"`, or the image of a successful version.
    pub fn version_by_image_or_version(&self, app: &App, requested: &str) -> VersionResult<VersionHandle> {
        let doc = self.app_versions(&app.name)?;
        let number = requested
            .strip_prefix('v')
            .unwrap_or(requested)
            .parse::<VersionNumber>()
            .ok();
        if let Some(info) = number.and_then(|n| doc.get(n)) {
            return Ok(self.handle(app, info.clone()));
        }
        doc.versions
            .values()
            .filter(|info| info.deploy_successful)
            .map(|info| self.handle(app, info.clone()))
            .find(|h| h.base_image_name() == requested || h.build_image_name() == requested)
            .ok_or_else(|| VersionError::InvalidVersion {
                requested: requested.to_string(),
            })
    }
}
