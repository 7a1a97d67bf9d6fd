//! C5: delegates authentication to the upstream OIDC identity provider
//! configured for each VO.

use anyhow::{Context, Result};
use async_trait::async_trait;
use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreIdTokenClaims, CoreProviderMetadata};
use openidconnect::{
    AuthorizationCode, ClientId, CsrfToken, IssuerUrl, Nonce, OAuth2TokenResponse,
    PkceCodeChallenge, PkceCodeChallengeMethod, PkceCodeVerifier, RedirectUrl, RequestTokenError,
    Scope, TokenResponse,
};
use rand::RngCore;

use crate::crypto::{derive_challenge, IdTokenIdentity, StateCodec, StateMap};
use crate::error::DiracError;

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("failed to build upstream IdP HTTP client")
}

fn extract_organisation_name(raw_jwt: &str) -> Option<String> {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    let payload_b64 = raw_jwt.split('.').nth(1)?;
    let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&payload).ok()?;
    value
        .get("organisation_name")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// 256 bits of randomness, hex-encoded. Used as both the PKCE verifier for
/// our exchange with the upstream IdP and, reusing the same value, the OIDC
/// `nonce` — both need to survive the redirect round trip carried only by
/// the opaque `state` string, and both need equivalent entropy guarantees,
/// so one random value serves both purposes.
fn random_hex_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// One upstream OIDC provider per VO. `build_authorization_url` owns the
/// PKCE-pair and state-encoding steps, since the verifier it generates must
/// be stashed inside `state_map` before encoding — there is nowhere else to
/// keep it alive across the redirect to and from the IdP.
#[async_trait]
pub trait IdPClient: Send + Sync {
    fn vo(&self) -> &str;

    async fn build_authorization_url(
        &self,
        redirect_uri: &str,
        state_map: StateMap,
        state_codec: &StateCodec,
    ) -> Result<String, DiracError>;

    async fn exchange_code(
        &self,
        redirect_uri: &str,
        code: &str,
        code_verifier: &str,
        nonce: &str,
    ) -> Result<IdTokenIdentity, DiracError>;
}

/// Real upstream client backed by OIDC discovery against the VO's
/// `server_metadata_url`. The redirect URI differs between the device and
/// authorization-code callbacks, so it's supplied per call rather than
/// fixed at construction.
pub struct OidcIdPClient {
    vo: String,
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
}

impl OidcIdPClient {
    pub async fn discover(vo: &str, server_metadata_url: &str, client_id: &str) -> Result<Self> {
        let issuer_url = IssuerUrl::new(server_metadata_url.to_string())
            .context("invalid upstream IdP metadata URL")?;
        let http = http_client()?;
        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http)
            .await
            .context("failed to discover upstream IdP metadata")?;

        Ok(Self {
            vo: vo.to_string(),
            provider_metadata,
            client_id: ClientId::new(client_id.to_string()),
        })
    }

    fn client(&self, redirect_uri: &str) -> Result<CoreClient, DiracError> {
        let redirect_url = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| DiracError::InvalidRequest(format!("invalid redirect_uri: {}", e)))?;
        Ok(
            CoreClient::from_provider_metadata(self.provider_metadata.clone(), self.client_id.clone(), None)
                .set_redirect_uri(redirect_url),
        )
    }
}

#[async_trait]
impl IdPClient for OidcIdPClient {
    fn vo(&self) -> &str {
        &self.vo
    }

    async fn build_authorization_url(
        &self,
        redirect_uri: &str,
        mut state_map: StateMap,
        state_codec: &StateCodec,
    ) -> Result<String, DiracError> {
        let client = self.client(redirect_uri)?;

        let verifier = random_hex_verifier();
        let challenge = derive_challenge(&verifier);
        let pkce_challenge =
            PkceCodeChallenge::new(challenge, PkceCodeChallengeMethod::new("S256".to_string()));

        state_map.code_verifier = Some(verifier.clone());
        let encoded_state = state_codec.encode(&state_map);
        let nonce_value = verifier;

        let (auth_url, _csrf, _nonce) = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                move || CsrfToken::new(encoded_state.clone()),
                move || Nonce::new(nonce_value.clone()),
            )
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        Ok(auth_url.to_string())
    }

    async fn exchange_code(
        &self,
        redirect_uri: &str,
        code: &str,
        code_verifier: &str,
        nonce: &str,
    ) -> Result<IdTokenIdentity, DiracError> {
        let client = self.client(redirect_uri)?;
        let http = http_client().map_err(|e| DiracError::UpstreamUnavailable(e.to_string()))?;

        let token_response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| DiracError::UpstreamUnavailable(e.to_string()))?
            .set_pkce_verifier(PkceCodeVerifier::new(code_verifier.to_string()))
            .request_async(&http)
            .await
            .map_err(|e| match e {
                // The IdP answered with a structured OAuth2 error body (a
                // rejected/expired/unknown code) — that's the client's fault.
                RequestTokenError::ServerResponse(resp) => {
                    DiracError::InvalidCode(format!("code exchange rejected: {:?}", resp))
                }
                // Transport failure, unparseable response, or anything else
                // that isn't the IdP telling us the code is bad.
                other => DiracError::UpstreamUnavailable(format!("code exchange failed: {}", other)),
            })?;

        let id_token = token_response
            .id_token()
            .ok_or_else(|| DiracError::InvalidCode("IdP did not return an id_token".to_string()))?;

        let nonce = Nonce::new(nonce.to_string());
        let verifier = client.id_token_verifier();
        let claims: &CoreIdTokenClaims = id_token
            .claims(&verifier, &nonce)
            .map_err(|e| DiracError::InvalidCode(format!("id_token verification failed: {}", e)))?;

        // `organisation_name` is a DIRAC-specific claim that CoreIdTokenClaims'
        // EmptyAdditionalClaims doesn't model. The signature is already
        // verified above, so it's safe to pull straight out of the decoded
        // payload rather than threading a custom claims type through every
        // openidconnect generic parameter.
        let organisation_name = extract_organisation_name(&id_token.to_string())
            .ok_or_else(|| DiracError::InvalidCode("id_token missing organisation_name claim".to_string()))?;

        if organisation_name != self.vo {
            return Err(DiracError::InvalidCode(format!(
                "id_token organisation_name {} does not match vo {}",
                organisation_name, self.vo
            )));
        }

        let preferred_username = claims
            .preferred_username()
            .map(|u| u.as_str().to_string())
            .ok_or_else(|| DiracError::InvalidCode("id_token missing preferred_username claim".to_string()))?;

        Ok(IdTokenIdentity {
            sub: claims.subject().to_string(),
            organisation_name,
            preferred_username,
        })
    }
}

/// A scripted stand-in for an upstream IdP, used by orchestrator tests that
/// exercise the full device/auth-code state machines without a network
/// round trip. Every method is driven by pre-registered fixtures rather
/// than talking to anything real.
pub struct FakeIdPClient {
    vo: String,
    identity: IdTokenIdentity,
}

impl FakeIdPClient {
    pub fn new(vo: impl Into<String>, identity: IdTokenIdentity) -> Self {
        Self {
            vo: vo.into(),
            identity,
        }
    }
}

#[async_trait]
impl IdPClient for FakeIdPClient {
    fn vo(&self) -> &str {
        &self.vo
    }

    async fn build_authorization_url(
        &self,
        _redirect_uri: &str,
        mut state_map: StateMap,
        state_codec: &StateCodec,
    ) -> Result<String, DiracError> {
        state_map.code_verifier = Some("fake-verifier".to_string());
        let encoded_state = state_codec.encode(&state_map);
        Ok(format!("https://idp.example.org/authorize?state={}", encoded_state))
    }

    async fn exchange_code(
        &self,
        _redirect_uri: &str,
        _code: &str,
        _code_verifier: &str,
        _nonce: &str,
    ) -> Result<IdTokenIdentity, DiracError> {
        Ok(self.identity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_idp_round_trips_identity_through_state() {
        let codec = StateCodec::new(b"test-secret".to_vec());
        let identity = IdTokenIdentity {
            sub: "b824d4dc".to_string(),
            organisation_name: "lhcb".to_string(),
            preferred_username: "chaen".to_string(),
        };
        let client = FakeIdPClient::new("lhcb", identity.clone());

        let state_map = StateMap {
            grant_type: "device_code".to_string(),
            user_code: Some("ABCD1234".to_string()),
            uuid: None,
            external_state: None,
            code_verifier: None,
        };
        let url = client
            .build_authorization_url("https://auth.example.org/lhcb/device/complete", state_map, &codec)
            .await
            .unwrap();

        let state_param = url.split("state=").nth(1).unwrap();
        let decoded = codec.decode(state_param).unwrap();
        assert_eq!(decoded.user_code.as_deref(), Some("ABCD1234"));
        assert_eq!(decoded.code_verifier.as_deref(), Some("fake-verifier"));

        let resolved = client
            .exchange_code(
                "https://auth.example.org/lhcb/device/complete",
                "any-code",
                &decoded.code_verifier.unwrap(),
                "unused",
            )
            .await
            .unwrap();
        assert_eq!(resolved.sub, identity.sub);
        assert_eq!(resolved.organisation_name, "lhcb");
    }
}
