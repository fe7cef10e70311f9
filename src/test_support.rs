//! In-memory [`RhsmApi`] used by unit tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::rhsm_client::RhsmApi;
use crate::rhsm_error::RhsmError;
use crate::rhsm_models::{
    Allocation, CloudAccessAccount, CloudAccessProvider, EntitlementSummary,
    EntitlementsAttached, ExportJob, ExportJobStatus, GoldImageStatus, NewProviderAccount, Pool,
};

pub const ALLOC: &str = "11111111-1111-1111-1111-111111111111";
pub const MISSING_ALLOC: &str = "22222222-2222-2222-2222-222222222222";

#[derive(Debug, Default)]
pub struct FakeState {
    pub allocations: BTreeMap<String, Allocation>,
    pub pools: BTreeMap<String, Vec<Pool>>,
    pub providers: Vec<CloudAccessProvider>,
    /// Number of pending polls before a job is ready; `None` never becomes ready.
    pub ready_after: Option<u32>,
    pub manifest: Vec<u8>,
    pub fail_download: bool,
    pub export_jobs: u32,
    pub polls: u32,
    pub downloads: u32,
    pub next_id: u32,
}

#[derive(Debug, Default)]
pub struct FakeRhsm {
    pub state: Mutex<FakeState>,
}

impl FakeRhsm {
    /// Fake with one allocation, `pool-A` and an AWS cloud access provider.
    pub fn seeded() -> Self {
        let fake = Self::default();
        {
            let mut s = fake.state.lock().unwrap();
            s.allocations.insert(
                ALLOC.to_string(),
                Allocation {
                    uuid: ALLOC.to_string(),
                    name: "sat-prod".to_string(),
                    allocation_type: "Satellite".to_string(),
                    version: "6.14".to_string(),
                    created_date: "2024-01-01T00:00:00.000Z".to_string(),
                    created_by: "admin".to_string(),
                    last_modified: "2024-02-01T00:00:00.000Z".to_string(),
                    entitlements_attached: Some(EntitlementsAttached {
                        reason: String::new(),
                        valid: true,
                        value: Vec::new(),
                    }),
                    ..Allocation::default()
                },
            );
            s.pools.insert(
                ALLOC.to_string(),
                vec![Pool {
                    id: "pool-A".to_string(),
                    sku: "RH00001".to_string(),
                    contract_number: "12345".to_string(),
                    entitlements_available: 10,
                    subscription_name: "Red Hat Enterprise Linux".to_string(),
                    ..Pool::default()
                }],
            );
            s.providers.push(CloudAccessProvider {
                name: "Amazon Web Services".to_string(),
                short_name: "AWS".to_string(),
                ..CloudAccessProvider::default()
            });
            s.ready_after = Some(0);
            s.manifest = b"PK\x03\x04manifest".to_vec();
        }
        fake
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    fn next_id(s: &mut FakeState, prefix: &str) -> String {
        s.next_id += 1;
        format!("{prefix}-{}", s.next_id)
    }

    fn touch(alloc: &mut Allocation, n: u32) {
        alloc.last_modified = format!("2024-03-{:02}T00:00:00.000Z", n % 28 + 1);
        alloc.entitlements_attached_quantity =
            alloc.entitlements().iter().map(|e| e.entitlement_quantity).sum();
    }
}

fn not_found(kind: &'static str, id: &str) -> RhsmError {
    RhsmError::NotFound {
        kind,
        id: id.to_string(),
    }
}

#[async_trait]
impl RhsmApi for FakeRhsm {
    async fn show_allocation(&self, uuid: &str) -> Result<Option<Allocation>, RhsmError> {
        Ok(self.with(|s| s.allocations.get(uuid).cloned()))
    }

    async fn create_allocation(&self, name: &str) -> Result<Allocation, RhsmError> {
        Ok(self.with(|s| {
            s.next_id += 1;
            let uuid = format!("00000000-0000-0000-0000-{:012}", s.next_id);
            let alloc = Allocation {
                uuid: uuid.clone(),
                name: name.to_string(),
                allocation_type: "Satellite".to_string(),
                last_modified: "2024-01-01T00:00:00.000Z".to_string(),
                ..Allocation::default()
            };
            s.allocations.insert(uuid, alloc.clone());
            alloc
        }))
    }

    async fn remove_allocation(&self, uuid: &str) -> Result<(), RhsmError> {
        self.with(|s| s.allocations.remove(uuid))
            .map(|_| ())
            .ok_or_else(|| not_found("allocation", uuid))
    }

    async fn list_allocation_pools(
        &self,
        uuid: &str,
        _future: bool,
    ) -> Result<Vec<Pool>, RhsmError> {
        self.with(|s| {
            if !s.allocations.contains_key(uuid) {
                return Err(not_found("allocation", uuid));
            }
            Ok(s.pools.get(uuid).cloned().unwrap_or_default())
        })
    }

    async fn attach_entitlement(
        &self,
        uuid: &str,
        pool_id: &str,
        quantity: i32,
    ) -> Result<Allocation, RhsmError> {
        self.with(|s| {
            let pool = s
                .pools
                .get(uuid)
                .and_then(|p| p.iter().find(|p| p.id == pool_id).cloned())
                .ok_or_else(|| not_found("pool", pool_id))?;
            let id = Self::next_id(s, "ent");
            let n = s.next_id;
            let alloc = s
                .allocations
                .get_mut(uuid)
                .ok_or_else(|| not_found("allocation", uuid))?;
            alloc
                .entitlements_attached
                .get_or_insert_with(EntitlementsAttached::default)
                .value
                .push(EntitlementSummary {
                    id,
                    sku: pool.sku,
                    contract_number: pool.contract_number,
                    entitlement_quantity: quantity,
                    ..EntitlementSummary::default()
                });
            Self::touch(alloc, n);
            Ok(alloc.clone())
        })
    }

    async fn update_entitlement(
        &self,
        uuid: &str,
        entitlement_id: &str,
        quantity: i32,
    ) -> Result<(), RhsmError> {
        self.with(|s| {
            s.next_id += 1;
            let n = s.next_id;
            let alloc = s
                .allocations
                .get_mut(uuid)
                .ok_or_else(|| not_found("allocation", uuid))?;
            let ent = alloc
                .entitlements_attached
                .as_mut()
                .and_then(|e| e.value.iter_mut().find(|e| e.id == entitlement_id))
                .ok_or_else(|| not_found("entitlement", entitlement_id))?;
            ent.entitlement_quantity = quantity;
            Self::touch(alloc, n);
            Ok(())
        })
    }

    async fn remove_entitlement(&self, uuid: &str, entitlement_id: &str) -> Result<(), RhsmError> {
        self.with(|s| {
            let alloc = s
                .allocations
                .get_mut(uuid)
                .ok_or_else(|| not_found("allocation", uuid))?;
            if let Some(e) = alloc.entitlements_attached.as_mut() {
                e.value.retain(|e| e.id != entitlement_id);
            }
            Ok(())
        })
    }

    async fn export_allocation(&self, uuid: &str) -> Result<ExportJob, RhsmError> {
        self.with(|s| {
            if !s.allocations.contains_key(uuid) {
                return Err(not_found("allocation", uuid));
            }
            s.export_jobs += 1;
            s.polls = 0;
            let id = format!("job-{}", s.export_jobs);
            Ok(ExportJob {
                href: format!("/allocations/{uuid}/exportJob/{id}"),
                export_job_id: id,
            })
        })
    }

    async fn export_job_status(
        &self,
        uuid: &str,
        job_id: &str,
    ) -> Result<ExportJobStatus, RhsmError> {
        Ok(self.with(|s| {
            s.polls += 1;
            match s.ready_after {
                Some(n) if s.polls > n => ExportJobStatus::Ready {
                    href: format!("https://example.invalid/allocations/{uuid}/export/{job_id}"),
                },
                _ => ExportJobStatus::Pending,
            }
        }))
    }

    async fn download_manifest(&self, href: &str) -> Result<Vec<u8>, RhsmError> {
        self.with(|s| {
            s.downloads += 1;
            if s.fail_download {
                return Err(RhsmError::DownloadFailed {
                    url: href.to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            Ok(s.manifest.clone())
        })
    }

    async fn list_enabled_cloud_access_providers(
        &self,
    ) -> Result<Vec<CloudAccessProvider>, RhsmError> {
        Ok(self.with(|s| s.providers.clone()))
    }

    async fn add_provider_accounts(
        &self,
        short_name: &str,
        accounts: &[NewProviderAccount],
    ) -> Result<(), RhsmError> {
        self.with(|s| {
            let provider = s
                .providers
                .iter_mut()
                .find(|p| p.short_name == short_name)
                .ok_or_else(|| not_found("cloud access provider", short_name))?;
            for a in accounts {
                provider.accounts.push(CloudAccessAccount {
                    id: a.id.clone(),
                    nickname: a.nickname.clone().unwrap_or_default(),
                    date_added: "2024-04-01T00:00:00Z".to_string(),
                    ..CloudAccessAccount::default()
                });
            }
            Ok(())
        })
    }

    async fn update_provider_account(
        &self,
        short_name: &str,
        account_id: &str,
        nickname: &str,
    ) -> Result<(), RhsmError> {
        self.with(|s| {
            let account = s
                .providers
                .iter_mut()
                .filter(|p| p.short_name == short_name)
                .flat_map(|p| p.accounts.iter_mut())
                .find(|a| a.id == account_id)
                .ok_or_else(|| not_found("cloud access account", account_id))?;
            account.nickname = nickname.to_string();
            Ok(())
        })
    }

    async fn remove_provider_account(
        &self,
        short_name: &str,
        account_id: &str,
    ) -> Result<(), RhsmError> {
        self.with(|s| {
            for p in s.providers.iter_mut().filter(|p| p.short_name == short_name) {
                p.accounts.retain(|a| a.id != account_id);
            }
        });
        Ok(())
    }

    async fn enable_gold_images(
        &self,
        short_name: &str,
        accounts: &[String],
        images: &[String],
    ) -> Result<(), RhsmError> {
        self.with(|s| {
            for account in s
                .providers
                .iter_mut()
                .filter(|p| p.short_name == short_name)
                .flat_map(|p| p.accounts.iter_mut())
                .filter(|a| accounts.contains(&a.id))
            {
                for image in images {
                    if !account.gold_image_status.iter().any(|g| &g.name == image) {
                        account.gold_image_status.push(GoldImageStatus {
                            name: image.clone(),
                            description: format!("{image} gold image"),
                            status: "Pending".to_string(),
                        });
                    }
                }
            }
        });
        Ok(())
    }
}
