//! `rhsm_allocation_pools` data source: pools an allocation can draw entitlements from.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::rhsm_client::RhsmApi;
use crate::rhsm_error::RhsmError;
use crate::rhsm_models::Pool;
use crate::rhsm_provider::DataSource;
use crate::rhsm_schema::{Attribute, AttributeType, Schema, SchemaOptions, Validator};
use crate::rhsm_state::ResourceState;

/// Type name of the pools data source.
pub const POOLS_TYPE: &str = "rhsm_allocation_pools";

fn pool_value(p: &Pool) -> Value {
    json!({
        "id": p.id,
        "sku": p.sku,
        "contract_number": p.contract_number,
        "entitlements_available": p.entitlements_available,
        "service_level": p.service_level,
        "subscription_name": p.subscription_name,
        "subscription_number": p.subscription_number,
        "start_date": p.start_date,
        "end_date": p.end_date,
    })
}

/// `rhsm_allocation_pools` data source.
pub struct PoolsDataSource {
    api: Arc<dyn RhsmApi>,
}

impl PoolsDataSource {
    /// Create the data source handler.
    #[must_use]
    pub fn new(api: Arc<dyn RhsmApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DataSource for PoolsDataSource {
    fn type_name(&self) -> &'static str {
        POOLS_TYPE
    }

    fn schema(&self, opts: &SchemaOptions) -> Schema {
        Schema::new(
            opts,
            "List the subscription pools available to an allocation.",
            vec![
                Attribute::required("allocation_uuid", AttributeType::String)
                    .describe("UUID of the allocation.")
                    .validate(Validator::IsUuid),
                Attribute::optional("future", AttributeType::Bool)
                    .describe("Include pools that become valid in the future."),
                Attribute::computed(
                    "pools",
                    AttributeType::ObjectList(vec![
                        Attribute::computed("id", AttributeType::String),
                        Attribute::computed("sku", AttributeType::String),
                        Attribute::computed("contract_number", AttributeType::String),
                        Attribute::computed("entitlements_available", AttributeType::Int),
                        Attribute::computed("service_level", AttributeType::String),
                        Attribute::computed("subscription_name", AttributeType::String),
                        Attribute::computed("subscription_number", AttributeType::String),
                        Attribute::computed("start_date", AttributeType::String),
                        Attribute::computed("end_date", AttributeType::String),
                    ]),
                )
                .describe("Available pools."),
            ],
        )
    }

    async fn read(&self, config: &ResourceState) -> Result<ResourceState, RhsmError> {
        let uuid = config.require_str("allocation_uuid")?;
        let future = config.get_bool("future").unwrap_or(false);

        let pools = self.api.list_allocation_pools(uuid, future).await?;
        debug!(allocation_uuid = uuid, future, count = pools.len(), "listed pools");

        let mut state = config.clone();
        state.set_id(uuid);
        state.set("pools", pools.iter().map(pool_value).collect::<Vec<_>>());
        Ok(state)
    }
}
