//! Allocation entitlements: `rhsm_allocation_entitlement` resource and data source.
//!
//! An entitlement is pool capacity attached to an allocation. Its id is only
//! unique inside the parent allocation, so state always carries
//! `allocation_uuid` next to the id.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::rhsm_client::RhsmApi;
use crate::rhsm_error::RhsmError;
use crate::rhsm_models::EntitlementSummary;
use crate::rhsm_provider::{DataSource, Resource};
use crate::rhsm_schema::{Attribute, AttributeType, Schema, SchemaOptions, Validator, is_uuid};
use crate::rhsm_state::ResourceState;

/// Type name shared by the entitlement resource and data source.
pub const ENTITLEMENT_TYPE: &str = "rhsm_allocation_entitlement";

fn set_entitlement(state: &mut ResourceState, e: &EntitlementSummary) {
    state
        .set("contract_number", e.contract_number.as_str())
        .set("sku", e.sku.as_str())
        .set("quantity", e.entitlement_quantity)
        .set("subscription_name", e.subscription_name.clone().unwrap_or_default())
        .set("start_date", e.start_date.clone().unwrap_or_default())
        .set("end_date", e.end_date.clone().unwrap_or_default());
}

fn entitlement_details() -> Vec<Attribute> {
    vec![
        Attribute::computed("contract_number", AttributeType::String)
            .describe("Contract number of the subscription."),
        Attribute::computed("sku", AttributeType::String).describe("SKU of the subscription."),
        Attribute::computed("subscription_name", AttributeType::String)
            .describe("Name of the subscription."),
        Attribute::computed("start_date", AttributeType::String)
            .describe("Start of the entitlement validity window."),
        Attribute::computed("end_date", AttributeType::String)
            .describe("End of the entitlement validity window."),
    ]
}

/// Split an import id `<allocation_uuid>:<entitlement_id>`.
///
/// # Errors
///
/// Returns [`RhsmError::Validation`] if either half is missing or the
/// allocation is not a UUID.
pub fn parse_import_id(id: &str) -> Result<(&str, &str), RhsmError> {
    let Some((allocation_uuid, entitlement_id)) = id.split_once(':') else {
        return Err(RhsmError::validation(
            "id",
            format!("expected <allocation_uuid>:<entitlement_id>, got {id:?}"),
        ));
    };
    if !is_uuid(allocation_uuid) {
        return Err(RhsmError::validation(
            "id",
            format!("expected a UUID before ':', got {allocation_uuid:?}"),
        ));
    }
    if entitlement_id.is_empty() {
        return Err(RhsmError::validation("id", "entitlement id is empty"));
    }
    Ok((allocation_uuid, entitlement_id))
}

/// `rhsm_allocation_entitlement` resource.
pub struct EntitlementResource {
    api: Arc<dyn RhsmApi>,
}

impl EntitlementResource {
    /// Create the resource handler.
    #[must_use]
    pub fn new(api: Arc<dyn RhsmApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Resource for EntitlementResource {
    fn type_name(&self) -> &'static str {
        ENTITLEMENT_TYPE
    }

    fn schema(&self, opts: &SchemaOptions) -> Schema {
        let mut attributes = vec![
            Attribute::required("allocation_uuid", AttributeType::String)
                .force_new()
                .describe("UUID of the allocation to attach the entitlement to.")
                .validate(Validator::IsUuid),
            Attribute::required("pool", AttributeType::String)
                .force_new()
                .describe("Id of the pool to draw the entitlement from."),
            Attribute::required("quantity", AttributeType::Int)
                .describe("Number of entitlements to attach.")
                .validate(Validator::IntAtLeast(1)),
        ];
        attributes.extend(entitlement_details());
        Schema::new(opts, "Entitlement attached to an allocation.", attributes)
    }

    async fn create(
        &self,
        planned: &ResourceState,
        _cancel: &CancellationToken,
    ) -> Result<ResourceState, RhsmError> {
        let allocation_uuid = planned.require_str("allocation_uuid")?;
        let pool_id = planned.require_str("pool")?;
        let quantity = planned.require_i32("quantity")?;

        let pools = self.api.list_allocation_pools(allocation_uuid, false).await?;
        let Some(pool) = pools.iter().find(|p| p.id == pool_id) else {
            return Err(RhsmError::RemoteConflict {
                allocation_uuid: allocation_uuid.to_string(),
                subject: "pool",
                id: pool_id.to_string(),
            });
        };

        let alloc = self
            .api
            .attach_entitlement(allocation_uuid, pool_id, quantity)
            .await?;

        // The attach response does not say which entitlement it created; match
        // on the pool's contract and SKU, newest last.
        let Some(entitlement) = alloc
            .entitlements()
            .iter()
            .rev()
            .find(|e| e.contract_number == pool.contract_number && e.sku == pool.sku)
        else {
            return Err(RhsmError::RemoteConflict {
                allocation_uuid: allocation_uuid.to_string(),
                subject: "entitlement for pool",
                id: pool_id.to_string(),
            });
        };
        info!(allocation_uuid, pool_id, entitlement_id = %entitlement.id, quantity, "entitlement attached");

        let state = ResourceState::with_id(entitlement.id.as_str())
            .with("allocation_uuid", allocation_uuid)
            .with("pool", pool_id);
        self.read(&state).await?.ok_or_else(|| RhsmError::NotFound {
            kind: "entitlement",
            id: entitlement.id.clone(),
        })
    }

    async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>, RhsmError> {
        let entitlement_id = state.require_id()?;
        let allocation_uuid = state.require_str("allocation_uuid")?;

        let Some(alloc) = self.api.show_allocation(allocation_uuid).await? else {
            debug!(allocation_uuid, "parent allocation not found");
            return Ok(None);
        };
        let Some(entitlement) = alloc.entitlements().iter().find(|e| e.id == entitlement_id) else {
            debug!(allocation_uuid, entitlement_id, "entitlement not found");
            return Ok(None);
        };

        let mut next = state.clone();
        set_entitlement(&mut next, entitlement);
        Ok(Some(next))
    }

    async fn update(
        &self,
        _prior: &ResourceState,
        planned: &ResourceState,
    ) -> Result<ResourceState, RhsmError> {
        let entitlement_id = planned.require_id()?;
        let allocation_uuid = planned.require_str("allocation_uuid")?;
        let quantity = planned.require_i32("quantity")?;

        self.api
            .update_entitlement(allocation_uuid, entitlement_id, quantity)
            .await?;
        info!(allocation_uuid, entitlement_id, quantity, "entitlement quantity updated");

        self.read(planned).await?.ok_or_else(|| RhsmError::NotFound {
            kind: "entitlement",
            id: entitlement_id.to_string(),
        })
    }

    async fn delete(&self, state: &ResourceState) -> Result<(), RhsmError> {
        let entitlement_id = state.require_id()?;
        let allocation_uuid = state.require_str("allocation_uuid")?;
        match self.api.remove_entitlement(allocation_uuid, entitlement_id).await {
            Err(e) if !e.is_not_found() => Err(e),
            _ => {
                info!(allocation_uuid, entitlement_id, "entitlement removed");
                Ok(())
            }
        }
    }

    async fn import(&self, id: &str) -> Result<Option<ResourceState>, RhsmError> {
        let (allocation_uuid, entitlement_id) = parse_import_id(id)?;
        let state =
            ResourceState::with_id(entitlement_id).with("allocation_uuid", allocation_uuid);
        self.read(&state).await
    }
}

/// `rhsm_allocation_entitlement` data source.
pub struct EntitlementDataSource {
    api: Arc<dyn RhsmApi>,
}

impl EntitlementDataSource {
    /// Create the data source handler.
    #[must_use]
    pub fn new(api: Arc<dyn RhsmApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DataSource for EntitlementDataSource {
    fn type_name(&self) -> &'static str {
        ENTITLEMENT_TYPE
    }

    fn schema(&self, opts: &SchemaOptions) -> Schema {
        let mut attributes = vec![
            Attribute::required("allocation_uuid", AttributeType::String)
                .describe("UUID of the allocation.")
                .validate(Validator::IsUuid),
            Attribute::required("entitlement_id", AttributeType::String)
                .describe("Id of the entitlement.")
                .validate(Validator::NotEmpty),
            Attribute::computed("quantity", AttributeType::Int)
                .describe("Number of entitlements attached."),
        ];
        attributes.extend(entitlement_details());
        Schema::new(opts, "Look up an entitlement attached to an allocation.", attributes)
    }

    async fn read(&self, config: &ResourceState) -> Result<ResourceState, RhsmError> {
        let allocation_uuid = config.require_str("allocation_uuid")?;
        let entitlement_id = config.require_str("entitlement_id")?;

        let alloc = self
            .api
            .show_allocation(allocation_uuid)
            .await?
            .ok_or_else(|| RhsmError::NotFound {
                kind: "allocation",
                id: allocation_uuid.to_string(),
            })?;
        let entitlement = alloc
            .entitlements()
            .iter()
            .find(|e| e.id == entitlement_id)
            .ok_or_else(|| RhsmError::NotFound {
                kind: "entitlement",
                id: format!("{allocation_uuid}:{entitlement_id}"),
            })?;

        let mut state = config.clone();
        state.set_id(entitlement_id);
        set_entitlement(&mut state, entitlement);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ALLOC, FakeRhsm, MISSING_ALLOC};

    fn resource(fake: &Arc<FakeRhsm>) -> EntitlementResource {
        EntitlementResource::new(Arc::clone(fake) as Arc<dyn RhsmApi>)
    }

    fn planned(pool: &str, quantity: i64) -> ResourceState {
        ResourceState::new()
            .with("allocation_uuid", ALLOC)
            .with("pool", pool)
            .with("quantity", quantity)
    }

    #[tokio::test]
    async fn attach_from_pool_records_sku_and_contract() {
        let fake = Arc::new(FakeRhsm::seeded());
        let state = resource(&fake)
            .create(&planned("pool-A", 5), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!state.require_id().unwrap().is_empty());
        assert_eq!(state.get_str("sku"), Some("RH00001"));
        assert_eq!(state.get_str("contract_number"), Some("12345"));
        assert_eq!(state.get_i64("quantity"), Some(5));
        assert_eq!(state.get_str("allocation_uuid"), Some(ALLOC));
        assert_eq!(state.get_str("pool"), Some("pool-A"));
    }

    #[tokio::test]
    async fn missing_pool_is_a_conflict_naming_both_ids() {
        let fake = Arc::new(FakeRhsm::seeded());
        let err = resource(&fake)
            .create(&planned("pool-Z", 5), &CancellationToken::new())
            .await
            .unwrap_err();

        match &err {
            RhsmError::RemoteConflict {
                allocation_uuid,
                id,
                ..
            } => {
                assert_eq!(allocation_uuid, ALLOC);
                assert_eq!(id, "pool-Z");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        let msg = err.to_string();
        assert!(msg.contains(ALLOC) && msg.contains("pool-Z"));
        fake.with(|s| assert!(s.allocations[ALLOC].entitlements().is_empty()));
    }

    #[tokio::test]
    async fn update_import_and_delete() {
        let fake = Arc::new(FakeRhsm::seeded());
        let r = resource(&fake);
        let created = r
            .create(&planned("pool-A", 5), &CancellationToken::new())
            .await
            .unwrap();
        let id = created.id().unwrap().to_string();

        let mut bigger = created.clone();
        bigger.set("quantity", 8);
        let updated = r.update(&created, &bigger).await.unwrap();
        assert_eq!(updated.get_i64("quantity"), Some(8));

        let imported = r.import(&format!("{ALLOC}:{id}")).await.unwrap().unwrap();
        assert_eq!(imported.id(), Some(id.as_str()));
        assert_eq!(imported.get_i64("quantity"), Some(8));

        r.delete(&updated).await.unwrap();
        assert!(r.read(&updated).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_with_missing_parent_is_absent() {
        let fake = Arc::new(FakeRhsm::seeded());
        let state = ResourceState::with_id("ent-1").with("allocation_uuid", MISSING_ALLOC);
        assert!(resource(&fake).read(&state).await.unwrap().is_none());
    }

    #[test]
    fn import_id_requires_both_halves() {
        assert_eq!(parse_import_id(&format!("{ALLOC}:e-1")).unwrap(), (ALLOC, "e-1"));
        assert!(parse_import_id("e-1").is_err());
        assert!(parse_import_id("nope:e-1").is_err());
        assert!(parse_import_id(&format!("{ALLOC}:")).is_err());
    }

    #[tokio::test]
    async fn data_source_finds_entitlement_or_fails() {
        let fake = Arc::new(FakeRhsm::seeded());
        let created = resource(&fake)
            .create(&planned("pool-A", 2), &CancellationToken::new())
            .await
            .unwrap();
        let ds = EntitlementDataSource::new(Arc::clone(&fake) as Arc<dyn RhsmApi>);

        let config = ResourceState::new()
            .with("allocation_uuid", ALLOC)
            .with("entitlement_id", created.id().unwrap());
        let found = ds.read(&config).await.unwrap();
        assert_eq!(found.get_str("sku"), Some("RH00001"));
        assert_eq!(found.get_i64("quantity"), Some(2));

        let missing = ResourceState::new()
            .with("allocation_uuid", ALLOC)
            .with("entitlement_id", "ent-404");
        assert!(ds.read(&missing).await.unwrap_err().is_not_found());
    }
}
