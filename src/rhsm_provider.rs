//! Provider surface.
//!
//! Unique responsibility: expose every resource and data source kind behind
//! two traits, keyed by type name, over one shared [`RhsmApi`].
//!
//! A provisioning runtime drives these handlers; this crate does not speak the
//! plugin protocol itself.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::rhsm_allocation::{AllocationDataSource, AllocationResource};
use crate::rhsm_client::{RhsmApi, RhsmClient};
use crate::rhsm_cloud_access::{CloudAccessAccountResource, CloudAccessDataSource};
use crate::rhsm_config::RhsmConfig;
use crate::rhsm_entitlement::{EntitlementDataSource, EntitlementResource};
use crate::rhsm_error::RhsmError;
use crate::rhsm_manifest::{ExportPolicy, ManifestResource};
use crate::rhsm_pools::PoolsDataSource;
use crate::rhsm_schema::{Schema, SchemaOptions};
use crate::rhsm_state::ResourceState;

/// CRUD handlers of one managed resource kind.
///
/// `read` returning `Ok(None)` means the remote entity is gone and the caller
/// must drop its state. A failed `create` produces no state.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Type name (e.g. `rhsm_allocation`).
    fn type_name(&self) -> &'static str;

    /// Attribute schema.
    fn schema(&self, opts: &SchemaOptions) -> Schema;

    /// Create the remote entity and return its state.
    async fn create(
        &self,
        planned: &ResourceState,
        cancel: &CancellationToken,
    ) -> Result<ResourceState, RhsmError>;

    /// Refresh state from the remote entity.
    async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>, RhsmError>;

    /// Apply in-place changes. Kinds whose inputs all force replacement keep
    /// the default, which refuses.
    async fn update(
        &self,
        prior: &ResourceState,
        planned: &ResourceState,
    ) -> Result<ResourceState, RhsmError> {
        let _ = (prior, planned);
        Err(RhsmError::validation(
            self.type_name(),
            "in-place update is not supported; the resource must be replaced",
        ))
    }

    /// Delete the remote entity.
    async fn delete(&self, state: &ResourceState) -> Result<(), RhsmError>;

    /// Adopt an existing remote entity by id.
    async fn import(&self, id: &str) -> Result<Option<ResourceState>, RhsmError> {
        self.read(&ResourceState::with_id(id)).await
    }
}

/// Read-only lookup of one data source kind.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Type name (e.g. `rhsm_allocation_pools`).
    fn type_name(&self) -> &'static str;

    /// Attribute schema.
    fn schema(&self, opts: &SchemaOptions) -> Schema;

    /// Look the entity up. Absence is an error for data sources.
    async fn read(&self, config: &ResourceState) -> Result<ResourceState, RhsmError>;
}

/// Configured provider: every resource and data source over one API client.
pub struct RhsmProvider {
    schema_options: SchemaOptions,
    resources: Vec<Arc<dyn Resource>>,
    data_sources: Vec<Arc<dyn DataSource>>,
}

impl RhsmProvider {
    /// Exchange the refresh token and build the provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the token exchange fails.
    pub async fn configure(cfg: RhsmConfig) -> Result<Self, RhsmError> {
        let policy = cfg.export;
        let client = RhsmClient::connect(cfg).await?;
        info!("rhsm provider configured");
        Ok(Self::from_api(Arc::new(client), policy))
    }

    /// Build the provider over any [`RhsmApi`] implementation.
    #[must_use]
    pub fn from_api(api: Arc<dyn RhsmApi>, policy: ExportPolicy) -> Self {
        let resources: Vec<Arc<dyn Resource>> = vec![
            Arc::new(AllocationResource::new(Arc::clone(&api))),
            Arc::new(EntitlementResource::new(Arc::clone(&api))),
            Arc::new(ManifestResource::new(Arc::clone(&api), policy)),
            Arc::new(CloudAccessAccountResource::new(Arc::clone(&api))),
        ];
        let data_sources: Vec<Arc<dyn DataSource>> = vec![
            Arc::new(AllocationDataSource::new(Arc::clone(&api))),
            Arc::new(EntitlementDataSource::new(Arc::clone(&api))),
            Arc::new(PoolsDataSource::new(Arc::clone(&api))),
            Arc::new(CloudAccessDataSource::new(api)),
        ];
        Self {
            schema_options: SchemaOptions::default(),
            resources,
            data_sources,
        }
    }

    /// Replace the description rendering options.
    #[must_use]
    pub fn with_schema_options(mut self, opts: SchemaOptions) -> Self {
        self.schema_options = opts;
        self
    }

    /// Registered resource type names.
    #[must_use]
    pub fn resource_types(&self) -> Vec<&'static str> {
        self.resources.iter().map(|r| r.type_name()).collect()
    }

    /// Registered data source type names.
    #[must_use]
    pub fn data_source_types(&self) -> Vec<&'static str> {
        self.data_sources.iter().map(|d| d.type_name()).collect()
    }

    /// Resource handler by type name.
    #[must_use]
    pub fn resource(&self, type_name: &str) -> Option<Arc<dyn Resource>> {
        self.resources
            .iter()
            .find(|r| r.type_name() == type_name)
            .cloned()
    }

    /// Data source handler by type name.
    #[must_use]
    pub fn data_source(&self, type_name: &str) -> Option<Arc<dyn DataSource>> {
        self.data_sources
            .iter()
            .find(|d| d.type_name() == type_name)
            .cloned()
    }

    /// Schema of a resource kind.
    #[must_use]
    pub fn resource_schema(&self, type_name: &str) -> Option<Schema> {
        self.resource(type_name)
            .map(|r| r.schema(&self.schema_options))
    }

    /// Schema of a data source kind.
    #[must_use]
    pub fn data_source_schema(&self, type_name: &str) -> Option<Schema> {
        self.data_source(type_name)
            .map(|d| d.schema(&self.schema_options))
    }

    /// Validate `planned` against the kind's schema, then create.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown type, `Validation` for a bad config, or any
    /// error from the handler.
    pub async fn create_resource(
        &self,
        type_name: &str,
        planned: &ResourceState,
        cancel: &CancellationToken,
    ) -> Result<ResourceState, RhsmError> {
        let resource = self.resource(type_name).ok_or_else(|| RhsmError::NotFound {
            kind: "resource type",
            id: type_name.to_string(),
        })?;
        resource
            .schema(&self.schema_options)
            .validate_config(planned)?;
        debug!(type_name, "creating resource");
        resource.create(planned, cancel).await
    }

    /// Validate `planned` and apply it: in place when no force-new attribute
    /// changed, otherwise delete and create.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown type, `Validation` for a bad config, or any
    /// error from the handler.
    pub async fn apply_resource(
        &self,
        type_name: &str,
        prior: &ResourceState,
        planned: &ResourceState,
        cancel: &CancellationToken,
    ) -> Result<ResourceState, RhsmError> {
        let resource = self.resource(type_name).ok_or_else(|| RhsmError::NotFound {
            kind: "resource type",
            id: type_name.to_string(),
        })?;
        let schema = resource.schema(&self.schema_options);
        schema.validate_config(planned)?;

        let replace = schema.replacement_triggers(prior, planned);
        if replace.is_empty() {
            let mut next = planned.clone();
            if let Some(id) = prior.id() {
                next.set_id(id);
            }
            return resource.update(prior, &next).await;
        }

        info!(type_name, attributes = ?replace, "replacing resource");
        resource.delete(prior).await?;
        resource.create(planned, cancel).await
    }

    /// Validate `config` against the data source schema, then read.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown type or absent entity, `Validation` for a bad
    /// config, or any API error.
    pub async fn read_data_source(
        &self,
        type_name: &str,
        config: &ResourceState,
    ) -> Result<ResourceState, RhsmError> {
        let source = self
            .data_source(type_name)
            .ok_or_else(|| RhsmError::NotFound {
                kind: "data source type",
                id: type_name.to_string(),
            })?;
        source.schema(&self.schema_options).validate_config(config)?;
        source.read(config).await
    }
}
