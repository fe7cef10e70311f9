//! RHSM REST client.
//!
//! Unique responsibility: talk HTTP/JSON to the RHSM management API.
//!
//! API endpoints:
//! - Base: <https://api.access.redhat.com/management/v1>
//! - Header: Authorization: Bearer <access token>
//!
//! The access token is obtained once, at construction, by exchanging the
//! offline refresh token at the Red Hat SSO endpoint. It is never refreshed:
//! a 401 from any later call surfaces as [`RhsmError::AuthExpired`].
//!
//! [`RhsmApi`] is the seam resources and the export workflow are written
//! against; [`RhsmClient`] is its HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, header};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use crate::rhsm_config::RhsmConfig;
use crate::rhsm_error::RhsmError;
use crate::rhsm_models::{
    AccessToken, Allocation, CloudAccessProvider, Envelope, ExportJob, ExportJobReady,
    ExportJobStatus, NewProviderAccount, Pool,
};

/// Operations of the RHSM API used by the provider.
///
/// Lookups return `Ok(None)` when the entity is absent (HTTP 404).
#[async_trait]
pub trait RhsmApi: Send + Sync {
    /// Fetch an allocation, including its attached entitlements.
    async fn show_allocation(&self, uuid: &str) -> Result<Option<Allocation>, RhsmError>;

    /// Create a new (Satellite) allocation with the given name.
    async fn create_allocation(&self, name: &str) -> Result<Allocation, RhsmError>;

    /// Remove an allocation, detaching its entitlements.
    async fn remove_allocation(&self, uuid: &str) -> Result<(), RhsmError>;

    /// List pools available to an allocation.
    async fn list_allocation_pools(&self, uuid: &str, future: bool)
    -> Result<Vec<Pool>, RhsmError>;

    /// Attach `quantity` entitlements from a pool; returns the updated allocation.
    async fn attach_entitlement(
        &self,
        uuid: &str,
        pool_id: &str,
        quantity: i32,
    ) -> Result<Allocation, RhsmError>;

    /// Change the quantity of an attached entitlement.
    async fn update_entitlement(
        &self,
        uuid: &str,
        entitlement_id: &str,
        quantity: i32,
    ) -> Result<(), RhsmError>;

    /// Detach an entitlement from an allocation.
    async fn remove_entitlement(&self, uuid: &str, entitlement_id: &str) -> Result<(), RhsmError>;

    /// Trigger a manifest export for an allocation.
    async fn export_allocation(&self, uuid: &str) -> Result<ExportJob, RhsmError>;

    /// Poll the status of an export job.
    async fn export_job_status(&self, uuid: &str, job_id: &str)
    -> Result<ExportJobStatus, RhsmError>;

    /// Download an exported manifest with the API credential.
    async fn download_manifest(&self, href: &str) -> Result<Vec<u8>, RhsmError>;

    /// List cloud providers enabled for Cloud Access, with their accounts.
    async fn list_enabled_cloud_access_providers(
        &self,
    ) -> Result<Vec<CloudAccessProvider>, RhsmError>;

    /// Enroll accounts with a cloud provider.
    async fn add_provider_accounts(
        &self,
        short_name: &str,
        accounts: &[NewProviderAccount],
    ) -> Result<(), RhsmError>;

    /// Change the nickname of an enrolled account.
    async fn update_provider_account(
        &self,
        short_name: &str,
        account_id: &str,
        nickname: &str,
    ) -> Result<(), RhsmError>;

    /// Remove an account from a provider's enabled list.
    async fn remove_provider_account(
        &self,
        short_name: &str,
        account_id: &str,
    ) -> Result<(), RhsmError>;

    /// Request gold image access for accounts.
    async fn enable_gold_images(
        &self,
        short_name: &str,
        accounts: &[String],
        images: &[String],
    ) -> Result<(), RhsmError>;
}

/// HTTP client for the RHSM management API.
pub struct RhsmClient {
    cfg: RhsmConfig,
    http: reqwest::Client,
    access_token: String,
}

impl RhsmClient {
    /// Build the HTTP client and exchange the refresh token for an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the token exchange fails.
    pub async fn connect(cfg: RhsmConfig) -> Result<Self, RhsmError> {
        let http = build_http(&cfg)?;
        let token = exchange_refresh_token(&http, &cfg).await?;
        info!(
            token_type = %token.token_type,
            expires_in = token.expires_in,
            "obtained rhsm access token"
        );
        Ok(Self {
            cfg,
            http,
            access_token: token.access_token,
        })
    }

    /// Build a client around an already obtained access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_access_token(
        cfg: RhsmConfig,
        access_token: impl Into<String>,
    ) -> Result<Self, RhsmError> {
        let http = build_http(&cfg)?;
        Ok(Self {
            cfg,
            http,
            access_token: access_token.into(),
        })
    }

    /// Get a reference to the current configuration.
    #[must_use]
    pub const fn config(&self) -> &RhsmConfig {
        &self.cfg
    }

    /// Build an API URL from path segments, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RhsmError> {
        let mut url = Url::parse(&self.cfg.api_url)
            .map_err(|e| RhsmError::validation("api_url", e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| RhsmError::validation("api_url", "cannot be a base url"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send one API request. Idempotent GETs are retried on transient failures.
    ///
    /// Success statuses and 404 are returned to the caller; 401 becomes
    /// `AuthExpired` and every other status becomes `Api`.
    async fn call(
        &self,
        operation: &'static str,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<Reply, RhsmError> {
        let retry_max = if method == Method::GET {
            self.cfg.retry_max
        } else {
            0
        };
        let mut attempt: u32 = 0;
        let mut backoff = Duration::from_millis(self.cfg.retry_backoff_ms);

        loop {
            attempt = attempt.saturating_add(1);
            debug!(operation, %method, path = url.path(), attempt, "rhsm request");

            let mut req = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(&self.access_token);
            if let Some(body) = body {
                req = req.json(body);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();

                    if status.is_success() || status == StatusCode::NOT_FOUND {
                        return Ok(Reply { status, body: text });
                    }
                    if status == StatusCode::UNAUTHORIZED {
                        return Err(RhsmError::AuthExpired { operation });
                    }
                    if attempt <= retry_max && is_retryable_status(status) {
                        warn!(operation, %status, ?backoff, "retrying rhsm request");
                        tokio::time::sleep(backoff).await;
                        backoff = next_backoff(backoff);
                        continue;
                    }

                    return Err(RhsmError::Api {
                        operation,
                        status,
                        body: text,
                    });
                }
                Err(e) => {
                    if attempt <= retry_max && is_retryable_reqwest(&e) {
                        warn!(operation, error = %e, ?backoff, "retrying rhsm request");
                        tokio::time::sleep(backoff).await;
                        backoff = next_backoff(backoff);
                        continue;
                    }

                    return Err(RhsmError::Transport {
                        operation,
                        source: e,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl RhsmApi for RhsmClient {
    async fn show_allocation(&self, uuid: &str) -> Result<Option<Allocation>, RhsmError> {
        const OP: &str = "show allocation";
        let mut url = self.endpoint(&["allocations", uuid])?;
        url.query_pairs_mut().append_pair("include", "entitlements");

        let reply = self.call(OP, Method::GET, url, None).await?;
        if reply.is_not_found() {
            return Ok(None);
        }
        reply.json::<Envelope<Allocation>>(OP).map(|e| Some(e.body))
    }

    async fn create_allocation(&self, name: &str) -> Result<Allocation, RhsmError> {
        const OP: &str = "create allocation";
        let mut url = self.endpoint(&["allocations"])?;
        url.query_pairs_mut().append_pair("name", name);

        let reply = self.call(OP, Method::POST, url, None).await?.success(OP)?;
        reply.json::<Envelope<Allocation>>(OP).map(|e| e.body)
    }

    async fn remove_allocation(&self, uuid: &str) -> Result<(), RhsmError> {
        const OP: &str = "remove allocation";
        let mut url = self.endpoint(&["allocations", uuid])?;
        url.query_pairs_mut().append_pair("force", "true");

        let reply = self.call(OP, Method::DELETE, url, None).await?;
        if reply.is_not_found() {
            return Err(RhsmError::NotFound {
                kind: "allocation",
                id: uuid.to_string(),
            });
        }
        Ok(())
    }

    async fn list_allocation_pools(
        &self,
        uuid: &str,
        future: bool,
    ) -> Result<Vec<Pool>, RhsmError> {
        const OP: &str = "list allocation pools";
        let mut url = self.endpoint(&["allocations", uuid, "pools"])?;
        if future {
            url.query_pairs_mut().append_pair("future", "true");
        }

        let reply = self.call(OP, Method::GET, url, None).await?;
        if reply.is_not_found() {
            return Err(RhsmError::NotFound {
                kind: "allocation",
                id: uuid.to_string(),
            });
        }
        reply.json::<Envelope<Vec<Pool>>>(OP).map(|e| e.body)
    }

    async fn attach_entitlement(
        &self,
        uuid: &str,
        pool_id: &str,
        quantity: i32,
    ) -> Result<Allocation, RhsmError> {
        const OP: &str = "attach entitlement";
        let mut url = self.endpoint(&["allocations", uuid, "entitlements"])?;
        url.query_pairs_mut()
            .append_pair("pool", pool_id)
            .append_pair("quantity", &quantity.to_string());

        let reply = self.call(OP, Method::POST, url, None).await?.success(OP)?;
        reply.json::<Envelope<Allocation>>(OP).map(|e| e.body)
    }

    async fn update_entitlement(
        &self,
        uuid: &str,
        entitlement_id: &str,
        quantity: i32,
    ) -> Result<(), RhsmError> {
        const OP: &str = "update entitlement";
        let mut url = self.endpoint(&["allocations", uuid, "entitlements", entitlement_id])?;
        url.query_pairs_mut()
            .append_pair("quantity", &quantity.to_string());

        self.call(OP, Method::PUT, url, None).await?.success(OP)?;
        Ok(())
    }

    async fn remove_entitlement(&self, uuid: &str, entitlement_id: &str) -> Result<(), RhsmError> {
        const OP: &str = "remove entitlement";
        let url = self.endpoint(&["allocations", uuid, "entitlements", entitlement_id])?;

        let reply = self.call(OP, Method::DELETE, url, None).await?;
        if reply.is_not_found() {
            return Err(RhsmError::NotFound {
                kind: "entitlement",
                id: entitlement_id.to_string(),
            });
        }
        Ok(())
    }

    async fn export_allocation(&self, uuid: &str) -> Result<ExportJob, RhsmError> {
        const OP: &str = "export allocation";
        let url = self.endpoint(&["allocations", uuid, "export"])?;

        let reply = self.call(OP, Method::GET, url, None).await?;
        if reply.is_not_found() {
            return Err(RhsmError::NotFound {
                kind: "allocation",
                id: uuid.to_string(),
            });
        }
        reply.json::<Envelope<ExportJob>>(OP).map(|e| e.body)
    }

    async fn export_job_status(
        &self,
        uuid: &str,
        job_id: &str,
    ) -> Result<ExportJobStatus, RhsmError> {
        const OP: &str = "export job status";
        let url = self.endpoint(&["allocations", uuid, "exportJob", job_id])?;

        let reply = self.call(OP, Method::GET, url, None).await?;
        if reply.is_not_found() {
            return Err(RhsmError::NotFound {
                kind: "export job",
                id: job_id.to_string(),
            });
        }
        if reply.status != StatusCode::OK {
            return Ok(ExportJobStatus::Pending);
        }
        let ready = reply.json::<Envelope<ExportJobReady>>(OP)?.body;
        Ok(ExportJobStatus::Ready { href: ready.href })
    }

    async fn download_manifest(&self, href: &str) -> Result<Vec<u8>, RhsmError> {
        let url = if href.starts_with('/') {
            self.cfg.api_endpoint(href)
        } else {
            href.to_string()
        };

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| RhsmError::DownloadFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(RhsmError::AuthExpired {
                operation: "download manifest",
            });
        }
        if !status.is_success() {
            return Err(RhsmError::DownloadFailed {
                url,
                reason: format!("unexpected status {status}"),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| RhsmError::DownloadFailed {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    async fn list_enabled_cloud_access_providers(
        &self,
    ) -> Result<Vec<CloudAccessProvider>, RhsmError> {
        const OP: &str = "list enabled cloud access providers";
        let url = self.endpoint(&["cloud_access_providers", "enabled"])?;

        let reply = self.call(OP, Method::GET, url, None).await?.success(OP)?;
        reply.json::<Envelope<Vec<CloudAccessProvider>>>(OP).map(|e| e.body)
    }

    async fn add_provider_accounts(
        &self,
        short_name: &str,
        accounts: &[NewProviderAccount],
    ) -> Result<(), RhsmError> {
        const OP: &str = "add provider accounts";
        let url = self.endpoint(&["cloud_access_providers", short_name, "accounts"])?;
        let body = serde_json::to_value(accounts).map_err(|source| RhsmError::Json {
            operation: OP,
            source,
        })?;

        self.call(OP, Method::POST, url, Some(&body)).await?.success(OP)?;
        Ok(())
    }

    async fn update_provider_account(
        &self,
        short_name: &str,
        account_id: &str,
        nickname: &str,
    ) -> Result<(), RhsmError> {
        const OP: &str = "update provider account";
        let url = self.endpoint(&["cloud_access_providers", short_name, "accounts", account_id])?;
        let body = serde_json::json!({ "nickname": nickname });

        self.call(OP, Method::PATCH, url, Some(&body)).await?.success(OP)?;
        Ok(())
    }

    async fn remove_provider_account(
        &self,
        short_name: &str,
        account_id: &str,
    ) -> Result<(), RhsmError> {
        const OP: &str = "remove provider account";
        let url = self.endpoint(&["cloud_access_providers", short_name, "accounts"])?;
        let body = serde_json::json!({ "id": account_id });

        self.call(OP, Method::DELETE, url, Some(&body)).await?.success(OP)?;
        Ok(())
    }

    async fn enable_gold_images(
        &self,
        short_name: &str,
        accounts: &[String],
        images: &[String],
    ) -> Result<(), RhsmError> {
        const OP: &str = "enable gold images";
        let url = self.endpoint(&["cloud_access_providers", short_name, "goldimage"])?;
        let body = serde_json::json!({ "accounts": accounts, "images": images });

        self.call(OP, Method::POST, url, Some(&body)).await?.success(OP)?;
        Ok(())
    }
}

/// Exchange the offline refresh token for a short-lived access token.
///
/// # Errors
///
/// Returns `AuthExpired` if SSO rejects the refresh token, `Transport` on
/// network failure and `Api`/`Json` on unexpected responses.
pub async fn exchange_refresh_token(
    http: &reqwest::Client,
    cfg: &RhsmConfig,
) -> Result<AccessToken, RhsmError> {
    const OP: &str = "exchange refresh token";

    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "refresh_token")
        .append_pair("client_id", "rhsm-api")
        .append_pair("refresh_token", &cfg.refresh_token)
        .finish();

    let resp = http
        .post(&cfg.token_url)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(form)
        .send()
        .await
        .map_err(|source| RhsmError::Transport {
            operation: OP,
            source,
        })?;

    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    // SSO answers 400 invalid_grant for an expired or revoked refresh token.
    if status == StatusCode::UNAUTHORIZED
        || (status == StatusCode::BAD_REQUEST && body.contains("invalid_grant"))
    {
        return Err(RhsmError::AuthExpired { operation: OP });
    }
    if !status.is_success() {
        return Err(RhsmError::Api {
            operation: OP,
            status,
            body,
        });
    }

    serde_json::from_str(&body).map_err(|source| RhsmError::Json {
        operation: OP,
        source,
    })
}

/// Raw API reply: a success status or 404.
struct Reply {
    status: StatusCode,
    body: String,
}

impl Reply {
    fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }

    /// Treat a 404 as an ordinary API failure (for non-lookup operations).
    fn success(self, operation: &'static str) -> Result<Self, RhsmError> {
        if self.is_not_found() {
            return Err(RhsmError::Api {
                operation,
                status: self.status,
                body: self.body,
            });
        }
        Ok(self)
    }

    fn json<T: DeserializeOwned>(&self, operation: &'static str) -> Result<T, RhsmError> {
        serde_json::from_str(&self.body).map_err(|source| RhsmError::Json { operation, source })
    }
}

fn build_http(cfg: &RhsmConfig) -> Result<reqwest::Client, RhsmError> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(cfg.timeout_ms))
        .user_agent(cfg.user_agent.clone())
        .build()
        .map_err(|source| RhsmError::Transport {
            operation: "build http client",
            source,
        })
}

#[inline]
const fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 425 | 429 | 500 | 502 | 503 | 504)
}

#[inline]
fn is_retryable_reqwest(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

#[inline]
fn next_backoff(current: Duration) -> Duration {
    let next = current.saturating_mul(2);
    next.min(Duration::from_secs(10))
}
