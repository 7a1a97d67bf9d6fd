//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with helpers for every DIRAC authorization-server endpoint.
//! Redirects are never followed automatically: tests need to inspect the
//! `Location` header (and the `state`/`code` query parameters it carries)
//! at each hop of the device and authorization-code flows.

use reqwest::Response;
use std::time::Duration;

use super::constants::REQUEST_TIMEOUT_SECS;

pub struct TestClient {
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("failed to build reqwest client");

        Self { client, base_url }
    }

    /// GET /healthz
    pub async fn healthz(&self) -> Response {
        self.client
            .get(format!("{}/healthz", self.base_url))
            .send()
            .await
            .expect("healthz request failed")
    }

    /// POST /{vo}/device
    pub async fn initiate_device(&self, vo: &str, client_id: &str, scope: &str) -> Response {
        self.client
            .post(format!("{}/{}/device", self.base_url, vo))
            .form(&[("client_id", client_id), ("scope", scope), ("audience", "dirac")])
            .send()
            .await
            .expect("device initiation request failed")
    }

    /// GET /{vo}/device?user_code=...
    pub async fn device_browser_redirect(&self, vo: &str, user_code: &str) -> Response {
        self.client
            .get(format!("{}/{}/device", self.base_url, vo))
            .query(&[("user_code", user_code)])
            .send()
            .await
            .expect("device browser redirect request failed")
    }

    /// GET /{vo}/device/complete?code=...&state=...
    pub async fn device_complete(&self, vo: &str, code: &str, state: &str) -> Response {
        self.client
            .get(format!("{}/{}/device/complete", self.base_url, vo))
            .query(&[("code", code), ("state", state)])
            .send()
            .await
            .expect("device completion request failed")
    }

    /// POST /{vo}/token with the device-code grant.
    pub async fn token_device(&self, vo: &str, client_id: &str, device_code: &str) -> Response {
        self.client
            .post(format!("{}/{}/token", self.base_url, vo))
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("client_id", client_id),
                ("device_code", device_code),
            ])
            .send()
            .await
            .expect("device token request failed")
    }

    /// GET /{vo}/authorize with the standard authorization-code+PKCE params.
    #[allow(clippy::too_many_arguments)]
    pub async fn authorize(
        &self,
        vo: &str,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
        code_challenge: &str,
        state: Option<&str>,
    ) -> Response {
        let mut query = vec![
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("scope", scope),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "S256"),
        ];
        if let Some(state) = state {
            query.push(("state", state));
        }
        self.client
            .get(format!("{}/{}/authorize", self.base_url, vo))
            .query(&query)
            .send()
            .await
            .expect("authorize request failed")
    }

    /// GET /{vo}/authorize/complete?code=...&state=...
    pub async fn authorize_complete(&self, vo: &str, code: &str, state: &str) -> Response {
        self.client
            .get(format!("{}/{}/authorize/complete", self.base_url, vo))
            .query(&[("code", code), ("state", state)])
            .send()
            .await
            .expect("authorize completion request failed")
    }

    /// POST /{vo}/token with the authorization_code grant.
    pub async fn token_authcode(
        &self,
        vo: &str,
        client_id: &str,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Response {
        self.client
            .post(format!("{}/{}/token", self.base_url, vo))
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", client_id),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("code_verifier", code_verifier),
            ])
            .send()
            .await
            .expect("authcode token request failed")
    }

    /// GET /{vo}/.well-known/dirac-configuration, with a bearer token.
    pub async fn well_known_configuration(&self, vo: &str, access_token: &str) -> Response {
        self.client
            .get(format!("{}/{}/.well-known/dirac-configuration", self.base_url, vo))
            .bearer_auth(access_token)
            .send()
            .await
            .expect("well-known configuration request failed")
    }

    /// Extracts a query parameter from a redirect response's `Location`
    /// header (itself either an absolute IdP URL or a relative path).
    pub fn location_query_param(response: &Response, key: &str) -> Option<String> {
        let location = response.headers().get(reqwest::header::LOCATION)?.to_str().ok()?;
        let query = location.split_once('?')?.1;
        query
            .split('&')
            .find_map(|pair| pair.split_once('=').filter(|(k, _)| *k == key).map(|(_, v)| v.to_string()))
    }

    /// Extracts the path portion of a redirect response's `Location` header.
    pub fn location_path(response: &Response) -> Option<String> {
        let location = response.headers().get(reqwest::header::LOCATION)?.to_str().ok()?;
        Some(location.split('?').next().unwrap_or(location).to_string())
    }
}
