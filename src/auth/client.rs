use reqwest::{Body, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::models::{
    AdminTokenResponse, ClearedResponse, Item, PublicKeyResponse, SignInResponse, SuccessResponse,
    Template, UserProfile,
};
use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::items::NewItem;
use crate::navigator::{Navigator, NoopNavigator};
use crate::storage::{FileStore, KeyValueStore};

/// Storage key of the session token
pub const DEFAULT_TOKEN_KEY: &str = "api_token";

// The current version from Cargo.toml
const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Authenticated client for the Thingbox API
///
/// The session token lives only in the key-value store. Every operation
/// reads it from there, so a sign-out or a 401 observed by one call is
/// seen by the next one without any shared in-memory state.
pub struct ApiClient {
    base_url: String,
    http_client: reqwest::Client,
    store: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
    token_key: String,
}

impl ApiClient {
    /// Create a new client against `base_url` keeping its session in `store`
    pub fn new(base_url: impl Into<String>, store: Arc<dyn KeyValueStore>) -> ApiResult<Self> {
        // No timeout: a hung call hangs its caller, same as the browser client
        let http_client = reqwest::Client::builder()
            .user_agent(format!("thingbox-client/{}", CURRENT_VERSION))
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            store,
            navigator: Arc::new(NoopNavigator),
            token_key: DEFAULT_TOKEN_KEY.to_string(),
        })
    }

    /// Create a client with a file-backed session store as described by `config`
    pub fn from_config(config: &ClientConfig) -> ApiResult<Self> {
        let store = Arc::new(FileStore::new(config.storage_dir()));
        Ok(Self::new(config.base_url.clone(), store)?.with_token_key(config.token_key.clone()))
    }

    /// Use `navigator` to follow the redirect of an account-switching sign-in
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn with_token_key(mut self, token_key: impl Into<String>) -> Self {
        self.token_key = token_key.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// The persisted session token, if any. An empty value is no session.
    pub fn token(&self) -> ApiResult<Option<String>> {
        Ok(self
            .store
            .get(&self.token_key)?
            .filter(|token| !token.is_empty()))
    }

    pub fn is_signed_in(&self) -> ApiResult<bool> {
        Ok(self.token()?.is_some())
    }

    /// Start a session
    ///
    /// Returns `None` without touching the network when a token is already
    /// stored. Otherwise asks the server for a new token, stores it and
    /// returns the URL where the user completes the sign-in. With
    /// `switch_account` the server is told the user wants a different
    /// account and the navigator is sent to the redirect URL as well.
    pub async fn sign_in(&self, switch_account: bool) -> ApiResult<Option<String>> {
        if self.token()?.is_some() {
            tracing::debug!("Session token already present, sign-in skipped");
            return Ok(None);
        }

        let url = if switch_account {
            self.endpoint("/auth?switch=true")
        } else {
            self.endpoint("/auth")
        };
        tracing::debug!("GET {}", url);

        let response = self.http_client.get(&url).send().await?.error_for_status()?;
        let response_text = response.text().await?;
        let auth: SignInResponse = serde_json::from_str(&response_text)?;

        self.store.set(&self.token_key, &auth.token)?;
        tracing::info!(
            "Stored new session token (length: {}), redirecting to {}",
            auth.token.len(),
            auth.redirect_url
        );

        if switch_account {
            if let Err(e) = self.navigator.navigate(&auth.redirect_url) {
                tracing::warn!(
                    "Failed to open {}: {}. Please open it manually.",
                    auth.redirect_url,
                    e
                );
            }
        }

        Ok(Some(auth.redirect_url))
    }

    /// End the session. Only forgets the token; the server is not told.
    pub fn sign_out(&self) -> ApiResult<()> {
        self.store.remove(&self.token_key)?;
        tracing::info!("Signed out");
        Ok(())
    }

    /// Perform an authorized call and classify its status
    ///
    /// Fails with `Unauthenticated` before any network traffic when no token
    /// is stored. A 401 clears the stored token; a 403 leaves it alone. Only
    /// a 200 counts as success, and the response is handed back undecoded.
    pub async fn request(
        &self,
        url: &str,
        method: Method,
        body: Option<Body>,
    ) -> ApiResult<Response> {
        let mut builder = self.http_client.request(method, url);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        self.send_authorized(builder).await
    }

    /// Attach the session token to `builder`, send it and classify the status
    pub(crate) async fn send_authorized(&self, builder: RequestBuilder) -> ApiResult<Response> {
        let token = self.token()?.ok_or(ApiError::Unauthenticated)?;

        let request = builder
            .header("Authorization", format!("Bearer {}", token))
            .build()?;
        let method = request.method().clone();
        let url = request.url().clone();

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        tracing::debug!("{} {} -> {}", method, url, status);

        match status {
            StatusCode::UNAUTHORIZED => {
                tracing::warn!("Session rejected by server, clearing token");
                self.store.remove(&self.token_key)?;
                Err(ApiError::Unauthenticated)
            }
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
            StatusCode::OK => Ok(response),
            other => Err(ApiError::RequestFailed(other)),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self.request(&self.endpoint(path), Method::GET, None).await?;
        decode(response).await
    }

    pub async fn get_items(&self) -> ApiResult<Vec<Item>> {
        self.get_json("/items").await
    }

    /// The server's public key, base58-encoded
    pub async fn get_public_key(&self) -> ApiResult<String> {
        let key: PublicKeyResponse = self.get_json("/public-key").await?;
        Ok(key.public_key_b58)
    }

    pub async fn get_user(&self) -> ApiResult<UserProfile> {
        self.get_json("/user").await
    }

    /// A one-time token for admin tooling
    pub async fn get_admin_token(&self) -> ApiResult<String> {
        let token: AdminTokenResponse = self.get_json("/admin-token").await?;
        Ok(token.admin_token)
    }

    pub async fn clear_template_cache(&self) -> ApiResult<bool> {
        let cleared: ClearedResponse = self.get_json("/clear-template-cache").await?;
        Ok(cleared.cleared)
    }

    pub async fn get_templates(&self) -> ApiResult<Vec<Template>> {
        self.get_json("/templates").await
    }

    /// Replace template `id` of kind `template_type` with `body`, sent as is
    pub async fn update_template(
        &self,
        id: &str,
        body: impl Into<Body>,
        template_type: &str,
    ) -> ApiResult<bool> {
        let url = self.endpoint(&format!(
            "/templates/{}?type={}",
            urlencoding::encode(id),
            urlencoding::encode(template_type)
        ));
        let response = self.request(&url, Method::PUT, Some(body.into())).await?;
        let result: SuccessResponse = decode(response).await?;
        Ok(result.success)
    }

    /// Items already recorded for a Twitter user id
    pub async fn check_twitter(&self, user_id: &str) -> ApiResult<Vec<Item>> {
        self.get_json(&format!("/check/twitter/{}", urlencoding::encode(user_id)))
            .await
    }

    /// Create an item, optionally tagged with an import batch
    pub async fn add_item(&self, item: &NewItem, batch: Option<&str>) -> ApiResult<()> {
        let mut builder = self.http_client.post(self.endpoint("/items")).json(item);
        if let Some(batch) = batch {
            builder = builder.query(&[("batch", batch)]);
        }
        self.send_authorized(builder).await?;
        Ok(())
    }

    /// The server's public key without a session, for sealing new items
    pub async fn fetch_public_key(&self) -> ApiResult<String> {
        let url = self.endpoint("/public-key");
        tracing::debug!("GET {}", url);

        let response = self.http_client.get(&url).send().await?.error_for_status()?;
        let key: PublicKeyResponse = decode(response).await?;
        Ok(key.public_key_b58)
    }

    /// Fetch public content fragments. No credentials are sent.
    pub async fn fetch_public_content(&self, ids: &[&str]) -> ApiResult<BTreeMap<String, String>> {
        let url = self.endpoint("/content");
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("id", *id)).collect();
        tracing::debug!("GET {} ({} ids)", url, ids.len());

        let response = self
            .http_client
            .get(&url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;
        decode(response).await
    }
}

pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let response_text = response.text().await?;
    Ok(serde_json::from_str(&response_text)?)
}
