//! Derivation of the cloud, folder and subnet a machine is placed in.
//!
//! Cloud and folder derivation require exactly one candidate so the driver
//! never silently picks between accounts. Subnets are matched by zone and the
//! first match wins.

use thiserror::Error;

use crate::backend::CloudApi;
use crate::machine::Placement;

/// Errors raised while resolving placement.
#[derive(Debug, Error)]
pub enum PlacementError<E>
where
    E: std::error::Error + 'static,
{
    /// No clouds are visible to the credential.
    #[error("no cloud is available for this account; specify the folder id explicitly")]
    NoCloudFound,
    /// Several clouds are visible to the credential.
    #[error("more than one cloud is available ({count}); specify the folder id explicitly")]
    AmbiguousCloud {
        /// Number of clouds found.
        count: usize,
    },
    /// The cloud contains no folders.
    #[error("no folder found in cloud {cloud_id}; specify the folder id explicitly")]
    NoFolderFound {
        /// Cloud that was searched.
        cloud_id: String,
    },
    /// The cloud contains several folders.
    #[error(
        "more than one folder is available in cloud {cloud_id} ({count}); specify the folder id explicitly"
    )]
    AmbiguousFolder {
        /// Cloud that was searched.
        cloud_id: String,
        /// Number of folders found.
        count: usize,
    },
    /// The folder has no subnet in the requested zone.
    #[error("no subnets in zone {zone} of folder {folder_id}; create one or specify the subnet id")]
    NoSubnetInZone {
        /// Folder that was searched.
        folder_id: String,
        /// Requested zone.
        zone: String,
    },
    /// An inventory call failed.
    #[error("inventory lookup failed: {0}")]
    Api(#[source] E),
}

/// Read-only inventory queries used to fill in missing placement fields.
#[derive(Debug)]
pub struct ResourceLocator<'a, A> {
    api: &'a A,
}

impl<'a, A> ResourceLocator<'a, A>
where
    A: CloudApi,
{
    /// Creates a locator over `api`.
    #[must_use]
    pub const fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// Returns the single cloud visible to the credential.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError::NoCloudFound`] or
    /// [`PlacementError::AmbiguousCloud`] unless exactly one cloud exists.
    pub async fn resolve_cloud(&self) -> Result<String, PlacementError<A::Error>> {
        let clouds = self.api.list_clouds().await.map_err(PlacementError::Api)?;
        match clouds.as_slice() {
            [] => Err(PlacementError::NoCloudFound),
            [cloud] => Ok(cloud.id.clone()),
            many => Err(PlacementError::AmbiguousCloud { count: many.len() }),
        }
    }

    /// Returns the single folder of `cloud_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError::NoFolderFound`] or
    /// [`PlacementError::AmbiguousFolder`] unless exactly one folder exists.
    pub async fn resolve_folder(&self, cloud_id: &str) -> Result<String, PlacementError<A::Error>> {
        let folders = self
            .api
            .list_folders(cloud_id)
            .await
            .map_err(PlacementError::Api)?;
        match folders.as_slice() {
            [] => Err(PlacementError::NoFolderFound {
                cloud_id: cloud_id.to_owned(),
            }),
            [folder] => Ok(folder.id.clone()),
            many => Err(PlacementError::AmbiguousFolder {
                cloud_id: cloud_id.to_owned(),
                count: many.len(),
            }),
        }
    }

    /// Returns the first subnet of `folder_id` located in `zone`.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError::NoSubnetInZone`] when none matches.
    pub async fn resolve_subnet(
        &self,
        folder_id: &str,
        zone: &str,
    ) -> Result<String, PlacementError<A::Error>> {
        let subnets = self
            .api
            .list_subnets(folder_id)
            .await
            .map_err(PlacementError::Api)?;
        subnets
            .into_iter()
            .find(|subnet| subnet.zone_id == zone)
            .map(|subnet| subnet.id)
            .ok_or_else(|| PlacementError::NoSubnetInZone {
                folder_id: folder_id.to_owned(),
                zone: zone.to_owned(),
            })
    }

    /// Returns the configured folder, deriving it from the (possibly derived)
    /// cloud when absent.
    ///
    /// # Errors
    ///
    /// Propagates cloud and folder derivation failures.
    pub async fn resolve_folder_id(
        &self,
        placement: &Placement,
    ) -> Result<String, PlacementError<A::Error>> {
        if let Some(folder_id) = non_blank(placement.folder_id.as_deref()) {
            return Ok(folder_id.to_owned());
        }

        let cloud_id = match non_blank(placement.cloud_id.as_deref()) {
            Some(configured) => configured.to_owned(),
            None => {
                let derived = self.resolve_cloud().await?;
                tracing::warn!(cloud_id = %derived, "cloud id not set, using the only available cloud");
                derived
            }
        };

        let folder_id = self.resolve_folder(&cloud_id).await?;
        tracing::warn!(%folder_id, %cloud_id, "folder id not set, using the only available folder");
        Ok(folder_id)
    }

    /// Returns the configured subnet, deriving it from the zone when absent.
    ///
    /// # Errors
    ///
    /// Propagates subnet lookup failures.
    pub async fn resolve_subnet_id(
        &self,
        placement: &Placement,
        folder_id: &str,
    ) -> Result<String, PlacementError<A::Error>> {
        if let Some(subnet_id) = non_blank(placement.subnet_id.as_deref()) {
            return Ok(subnet_id.to_owned());
        }
        let subnet_id = self.resolve_subnet(folder_id, &placement.zone).await?;
        tracing::info!(%subnet_id, zone = %placement.zone, "using subnet found in zone");
        Ok(subnet_id)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|candidate| !candidate.is_empty())
}
