//! Allocations: `rhsm_allocation` resource and data source.
//!
//! An allocation is created by name and addressed by UUID afterwards. Nothing
//! can be changed in place; a new name means a new allocation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::rhsm_client::RhsmApi;
use crate::rhsm_error::RhsmError;
use crate::rhsm_models::Allocation;
use crate::rhsm_provider::{DataSource, Resource};
use crate::rhsm_schema::{Attribute, AttributeType, Schema, SchemaOptions, Validator};
use crate::rhsm_state::ResourceState;

/// Type name shared by the allocation resource and data source.
pub const ALLOCATION_TYPE: &str = "rhsm_allocation";

/// Allowed allocation names.
pub const NAME_RULE: Validator = Validator::Matches {
    pattern: r"^[a-zA-Z0-9_\-.]{1,100}$",
    message: "name must be less than 100 characters and can use only numbers, letters, underscores, hyphens, and periods",
};

/// Attributes read back from an allocation, in both the resource and the data source.
fn computed_attributes() -> Vec<Attribute> {
    vec![
        Attribute::computed("type", AttributeType::String).describe("Allocation type."),
        Attribute::computed("version", AttributeType::String).describe("Allocation version."),
        Attribute::computed("created_date", AttributeType::String)
            .describe("When the allocation was created."),
        Attribute::computed("created_by", AttributeType::String)
            .describe("Who created the allocation."),
        Attribute::computed("last_modified", AttributeType::String)
            .describe("When the allocation was last modified."),
        Attribute::computed("entitlements_attached_quantity", AttributeType::Int)
            .describe("Total quantity of entitlements attached."),
        Attribute::computed("entitlement_reason", AttributeType::String)
            .describe("Why the attached entitlements are or are not valid."),
        Attribute::computed("entitlement_valid", AttributeType::Bool)
            .describe("Whether the attached entitlements are valid."),
        Attribute::computed(
            "entitlements",
            AttributeType::ObjectList(vec![
                Attribute::computed("id", AttributeType::String),
                Attribute::computed("sku", AttributeType::String),
                Attribute::computed("contract_number", AttributeType::String),
                Attribute::computed("entitlement_quantity", AttributeType::Int),
            ]),
        )
        .describe("Entitlements attached to the allocation."),
    ]
}

/// Copy an allocation into state.
pub(crate) fn flatten_allocation(alloc: &Allocation, state: &mut ResourceState) {
    let (reason, valid) = alloc
        .entitlements_attached
        .as_ref()
        .map_or((String::new(), false), |e| (e.reason.clone(), e.valid));
    let entitlements: Vec<Value> = alloc
        .entitlements()
        .iter()
        .map(|e| {
            json!({
                "id": e.id,
                "sku": e.sku,
                "contract_number": e.contract_number,
                "entitlement_quantity": e.entitlement_quantity,
            })
        })
        .collect();

    state.set_id(alloc.uuid.as_str());
    state
        .set("uuid", alloc.uuid.as_str())
        .set("name", alloc.name.as_str())
        .set("type", alloc.allocation_type.as_str())
        .set("version", alloc.version.as_str())
        .set("created_date", alloc.created_date.as_str())
        .set("created_by", alloc.created_by.as_str())
        .set("last_modified", alloc.last_modified.as_str())
        .set("entitlements_attached_quantity", alloc.entitlements_attached_quantity)
        .set("entitlement_reason", reason)
        .set("entitlement_valid", valid)
        .set("entitlements", entitlements);
}

/// `rhsm_allocation` resource.
pub struct AllocationResource {
    api: Arc<dyn RhsmApi>,
}

impl AllocationResource {
    /// Create the resource handler.
    #[must_use]
    pub fn new(api: Arc<dyn RhsmApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Resource for AllocationResource {
    fn type_name(&self) -> &'static str {
        ALLOCATION_TYPE
    }

    fn schema(&self, opts: &SchemaOptions) -> Schema {
        let mut attributes = vec![
            Attribute::required("name", AttributeType::String)
                .force_new()
                .describe("Name of the allocation.")
                .validate(NAME_RULE),
            Attribute::computed("uuid", AttributeType::String)
                .describe("UUID of the allocation."),
        ];
        attributes.extend(computed_attributes());
        Schema::new(opts, "Satellite allocation in Red Hat Subscription Manager.", attributes)
    }

    async fn create(
        &self,
        planned: &ResourceState,
        _cancel: &CancellationToken,
    ) -> Result<ResourceState, RhsmError> {
        let name = planned.require_str("name")?;
        NAME_RULE.check("name", &Value::from(name))?;

        let created = self.api.create_allocation(name).await?;
        info!(uuid = %created.uuid, name, "allocation created");

        self.read(&ResourceState::with_id(created.uuid.as_str()))
            .await?
            .ok_or(RhsmError::NotFound {
                kind: "allocation",
                id: created.uuid,
            })
    }

    async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>, RhsmError> {
        let uuid = state.require_id()?;
        let Some(alloc) = self.api.show_allocation(uuid).await? else {
            debug!(uuid, "allocation not found");
            return Ok(None);
        };
        let mut next = ResourceState::new();
        flatten_allocation(&alloc, &mut next);
        Ok(Some(next))
    }

    async fn delete(&self, state: &ResourceState) -> Result<(), RhsmError> {
        let uuid = state.require_id()?;
        match self.api.remove_allocation(uuid).await {
            Ok(()) => {
                info!(uuid, "allocation removed");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// `rhsm_allocation` data source.
pub struct AllocationDataSource {
    api: Arc<dyn RhsmApi>,
}

impl AllocationDataSource {
    /// Create the data source handler.
    #[must_use]
    pub fn new(api: Arc<dyn RhsmApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DataSource for AllocationDataSource {
    fn type_name(&self) -> &'static str {
        ALLOCATION_TYPE
    }

    fn schema(&self, opts: &SchemaOptions) -> Schema {
        let mut attributes = vec![
            Attribute::required("uuid", AttributeType::String)
                .describe("UUID of the allocation.")
                .validate(Validator::IsUuid),
            Attribute::computed("name", AttributeType::String)
                .describe("Name of the allocation."),
        ];
        attributes.extend(computed_attributes());
        Schema::new(opts, "Look up an allocation by UUID.", attributes)
    }

    async fn read(&self, config: &ResourceState) -> Result<ResourceState, RhsmError> {
        let uuid = config.require_str("uuid")?;
        let alloc = self
            .api
            .show_allocation(uuid)
            .await?
            .ok_or_else(|| RhsmError::NotFound {
                kind: "allocation",
                id: uuid.to_string(),
            })?;
        let mut state = ResourceState::new();
        flatten_allocation(&alloc, &mut state);
        Ok(state)
    }
}
