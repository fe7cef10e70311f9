//! Red Hat Cloud Access: `rhsm_cloud_access_account` resource and
//! `rhsm_cloud_access` data source.
//!
//! Accounts are only addressable through the list of enabled providers, so
//! every read lists all providers and picks the account out of it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::rhsm_client::RhsmApi;
use crate::rhsm_error::RhsmError;
use crate::rhsm_models::{CloudAccessAccount, CloudAccessProvider, GoldImageStatus, NewProviderAccount};
use crate::rhsm_provider::{DataSource, Resource};
use crate::rhsm_schema::{Attribute, AttributeType, Schema, SchemaOptions, Validator};
use crate::rhsm_state::{ResourceState, now_unix_ms};

/// Type name of the cloud access account resource.
pub const CLOUD_ACCESS_ACCOUNT_TYPE: &str = "rhsm_cloud_access_account";
/// Type name of the cloud access data source.
pub const CLOUD_ACCESS_TYPE: &str = "rhsm_cloud_access";

/// Provider short names accepted for accounts.
pub const CLOUD_ACCESS_PROVIDERS: &[&str] = &["AWS", "GCE", "MSAZ"];

/// Resource id of a cloud access account: `<provider_short_name>:<account_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudAccessId {
    /// Provider short name (`AWS`, `GCE` or `MSAZ`).
    pub provider_short_name: String,
    /// Account id within the provider; may itself contain `:`.
    pub account_id: String,
}

impl CloudAccessId {
    /// Build an id.
    #[must_use]
    pub fn new(provider_short_name: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            provider_short_name: provider_short_name.into(),
            account_id: account_id.into(),
        }
    }
}

impl fmt::Display for CloudAccessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider_short_name, self.account_id)
    }
}

impl FromStr for CloudAccessId {
    type Err = RhsmError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        let Some((short_name, account_id)) = id.split_once(':') else {
            return Err(RhsmError::validation(
                "id",
                format!("cloud access account id {id:?} is not <provider_short_name>:<account_id>"),
            ));
        };
        if !CLOUD_ACCESS_PROVIDERS.contains(&short_name) {
            return Err(RhsmError::validation(
                "id",
                format!("invalid cloud access provider {short_name:?} in id {id:?}"),
            ));
        }
        if account_id.is_empty() {
            return Err(RhsmError::validation("id", format!("empty account id in {id:?}")));
        }
        Ok(Self::new(short_name, account_id))
    }
}

fn gold_image_status_value(status: &[GoldImageStatus]) -> Vec<Value> {
    let mut sorted = status.to_vec();
    sorted.sort();
    sorted
        .iter()
        .map(|g| json!({ "name": g.name, "description": g.description, "status": g.status }))
        .collect()
}

fn find_account<'a>(
    providers: &'a [CloudAccessProvider],
    id: &CloudAccessId,
) -> Option<&'a CloudAccessAccount> {
    providers
        .iter()
        .find(|p| p.short_name == id.provider_short_name)
        .and_then(|p| p.accounts.iter().find(|a| a.id == id.account_id))
}

fn flatten_account(id: &CloudAccessId, account: &CloudAccessAccount) -> ResourceState {
    let mut state = ResourceState::with_id(id.to_string());
    state
        .set("provider_short_name", id.provider_short_name.as_str())
        .set("account_id", id.account_id.as_str())
        .set("nickname", account.nickname.as_str())
        .set("date_added", account.date_added.as_str())
        .set("source_id", account.source_id.as_str())
        .set("verified", account.verified)
        .set("gold_image_status", gold_image_status_value(&account.gold_image_status))
        .set_string_set(
            "gold_images",
            account.gold_image_status.iter().map(|g| g.name.as_str()),
        );
    state
}

/// `rhsm_cloud_access_account` resource.
pub struct CloudAccessAccountResource {
    api: Arc<dyn RhsmApi>,
}

impl CloudAccessAccountResource {
    /// Create the resource handler.
    #[must_use]
    pub fn new(api: Arc<dyn RhsmApi>) -> Self {
        Self { api }
    }

    async fn lookup(&self, id: &CloudAccessId) -> Result<Option<ResourceState>, RhsmError> {
        let providers = self.api.list_enabled_cloud_access_providers().await?;
        Ok(find_account(&providers, id).map(|a| flatten_account(id, a)))
    }

    async fn request_gold_images(&self, id: &CloudAccessId, images: &[String]) -> Result<(), RhsmError> {
        if images.is_empty() {
            return Ok(());
        }
        self.api
            .enable_gold_images(
                &id.provider_short_name,
                std::slice::from_ref(&id.account_id),
                images,
            )
            .await?;
        info!(account = %id, images = ?images, "gold image access requested");
        Ok(())
    }
}

fn planned_id(planned: &ResourceState) -> Result<CloudAccessId, RhsmError> {
    let short_name = planned.require_str("provider_short_name")?;
    Validator::OneOf(CLOUD_ACCESS_PROVIDERS).check("provider_short_name", &Value::from(short_name))?;
    let account_id = planned.require_str("account_id")?;
    Ok(CloudAccessId::new(short_name, account_id))
}

#[async_trait]
impl Resource for CloudAccessAccountResource {
    fn type_name(&self) -> &'static str {
        CLOUD_ACCESS_ACCOUNT_TYPE
    }

    fn schema(&self, opts: &SchemaOptions) -> Schema {
        Schema::new(
            opts,
            "Red Hat Cloud Access enrollment of an account in a supported cloud provider.",
            vec![
                Attribute::required("account_id", AttributeType::String)
                    .force_new()
                    .describe("Id of the cloud account. For GCE this is a Google Group.")
                    .validate(Validator::NotEmpty),
                Attribute::required("provider_short_name", AttributeType::String)
                    .force_new()
                    .describe("Short name of the cloud provider the account belongs to.")
                    .validate(Validator::OneOf(CLOUD_ACCESS_PROVIDERS)),
                Attribute::optional_computed("gold_images", AttributeType::StringSet).describe(
                    "Gold images to request access to. Access cannot be revoked through the API.",
                ),
                Attribute::optional("nickname", AttributeType::String)
                    .describe("Nickname describing the account."),
                Attribute::computed("date_added", AttributeType::String)
                    .describe("When the account was added to Red Hat Cloud Access."),
                Attribute::computed(
                    "gold_image_status",
                    AttributeType::ObjectSet(vec![
                        Attribute::computed("name", AttributeType::String),
                        Attribute::computed("description", AttributeType::String),
                        Attribute::computed("status", AttributeType::String),
                    ]),
                )
                .describe("Status of gold image access requests."),
                Attribute::computed("source_id", AttributeType::String)
                    .describe("Source id of a linked account."),
                Attribute::computed("verified", AttributeType::Bool)
                    .describe("Whether the account is verified for auto registration."),
            ],
        )
    }

    async fn create(
        &self,
        planned: &ResourceState,
        _cancel: &CancellationToken,
    ) -> Result<ResourceState, RhsmError> {
        let id = planned_id(planned)?;
        let nickname = planned
            .get_str("nickname")
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        self.api
            .add_provider_accounts(
                &id.provider_short_name,
                &[NewProviderAccount {
                    id: id.account_id.clone(),
                    nickname,
                }],
            )
            .await?;
        info!(account = %id, "cloud access account added");

        self.request_gold_images(&id, &planned.get_string_set("gold_images"))
            .await?;

        self.lookup(&id).await?.ok_or_else(|| RhsmError::NotFound {
            kind: "cloud access account",
            id: id.to_string(),
        })
    }

    async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>, RhsmError> {
        let id: CloudAccessId = state.require_id()?.parse()?;
        let found = self.lookup(&id).await?;
        if found.is_none() {
            debug!(account = %id, "cloud access account not found");
        }
        Ok(found)
    }

    async fn update(
        &self,
        prior: &ResourceState,
        planned: &ResourceState,
    ) -> Result<ResourceState, RhsmError> {
        let id: CloudAccessId = prior.require_id()?.parse()?;

        let nickname = planned.get_str("nickname").unwrap_or_default();
        if prior.get_str("nickname").unwrap_or_default() != nickname {
            self.api
                .update_provider_account(&id.provider_short_name, &id.account_id, nickname)
                .await?;
            info!(account = %id, nickname, "cloud access account nickname updated");
        }

        if planned.get("gold_images").is_some() {
            let wanted = planned.get_string_set("gold_images");
            if prior.get_string_set("gold_images") != wanted {
                self.request_gold_images(&id, &wanted).await?;
            }
        }

        self.lookup(&id).await?.ok_or_else(|| RhsmError::NotFound {
            kind: "cloud access account",
            id: id.to_string(),
        })
    }

    async fn delete(&self, state: &ResourceState) -> Result<(), RhsmError> {
        let id: CloudAccessId = state.require_id()?.parse()?;
        self.api
            .remove_provider_account(&id.provider_short_name, &id.account_id)
            .await?;
        info!(account = %id, "cloud access account removed");
        Ok(())
    }
}

/// `rhsm_cloud_access` data source.
pub struct CloudAccessDataSource {
    api: Arc<dyn RhsmApi>,
}

impl CloudAccessDataSource {
    /// Create the data source handler.
    #[must_use]
    pub fn new(api: Arc<dyn RhsmApi>) -> Self {
        Self { api }
    }
}

fn provider_value(p: &CloudAccessProvider) -> Value {
    let accounts: Vec<Value> = p
        .accounts
        .iter()
        .map(|a| {
            json!({
                "id": a.id,
                "nickname": a.nickname,
                "date_added": a.date_added,
                "source_id": a.source_id,
                "verified": a.verified,
                "gold_image_status": gold_image_status_value(&a.gold_image_status),
            })
        })
        .collect();
    let products: Vec<Value> = p
        .products
        .iter()
        .map(|x| {
            json!({
                "name": x.name,
                "sku": x.sku,
                "enabled_quantity": x.enabled_quantity,
                "total_quantity": x.total_quantity,
                "image_groups": x.image_groups,
                "next_renewal": x.next_renewal,
            })
        })
        .collect();
    json!({
        "name": p.name,
        "short_name": p.short_name,
        "accounts": accounts,
        "products": products,
    })
}

#[async_trait]
impl DataSource for CloudAccessDataSource {
    fn type_name(&self) -> &'static str {
        CLOUD_ACCESS_TYPE
    }

    fn schema(&self, opts: &SchemaOptions) -> Schema {
        let status = AttributeType::ObjectSet(vec![
            Attribute::computed("name", AttributeType::String),
            Attribute::computed("description", AttributeType::String),
            Attribute::computed("status", AttributeType::String),
        ]);
        Schema::new(
            opts,
            "Cloud providers enabled for Red Hat Cloud Access, with their accounts and products.",
            vec![
                Attribute::computed(
                    "enabled_accounts",
                    AttributeType::ObjectList(vec![
                        Attribute::computed("name", AttributeType::String),
                        Attribute::computed("short_name", AttributeType::String),
                        Attribute::computed(
                            "accounts",
                            AttributeType::ObjectList(vec![
                                Attribute::computed("id", AttributeType::String),
                                Attribute::computed("nickname", AttributeType::String),
                                Attribute::computed("date_added", AttributeType::String),
                                Attribute::computed("source_id", AttributeType::String),
                                Attribute::computed("verified", AttributeType::Bool),
                                Attribute::computed("gold_image_status", status),
                            ]),
                        ),
                        Attribute::computed(
                            "products",
                            AttributeType::ObjectList(vec![
                                Attribute::computed("name", AttributeType::String),
                                Attribute::computed("sku", AttributeType::String),
                                Attribute::computed("enabled_quantity", AttributeType::Int),
                                Attribute::computed("total_quantity", AttributeType::Int),
                                Attribute::computed("image_groups", AttributeType::StringList),
                                Attribute::computed("next_renewal", AttributeType::String),
                            ]),
                        ),
                    ]),
                )
                .describe("Enabled cloud providers."),
            ],
        )
    }

    async fn read(&self, config: &ResourceState) -> Result<ResourceState, RhsmError> {
        let providers = self.api.list_enabled_cloud_access_providers().await?;
        debug!(count = providers.len(), "listed cloud access providers");

        let mut state = config.clone();
        state.set_id(now_unix_ms().to_string());
        state.set(
            "enabled_accounts",
            providers.iter().map(provider_value).collect::<Vec<_>>(),
        );
        Ok(state)
    }
}
