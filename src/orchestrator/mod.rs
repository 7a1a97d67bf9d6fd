//! C7: the two endpoint-facing state machines — device and
//! authorization-code-with-PKCE — wired from the lower-level components.
//! Kept free of axum types so it can be exercised directly in tests with
//! [`crate::idp::FakeIdPClient`] and an in-memory flow store.

use crate::context::AuthContext;
use crate::crypto::{verify_challenge, StateMap};
use crate::error::DiracError;
use crate::flow::{FlowRow, FlowStore, FlowStoreError, IdTokenMap};
use crate::idp::IdPClient;

fn map_store_err(e: FlowStoreError) -> DiracError {
    match e {
        FlowStoreError::NotFound => DiracError::InvalidRequest("unknown or expired code".to_string()),
        FlowStoreError::WrongStatus => DiracError::Internal("flow row in an unexpected state".to_string()),
        FlowStoreError::PendingAuthorization => DiracError::PendingAuthorization,
        FlowStoreError::ExpiredFlow => DiracError::ExpiredFlow,
        FlowStoreError::Storage(msg) => DiracError::Internal(msg),
    }
}

fn idp_for<'a>(ctx: &'a AuthContext, vo: &str) -> Result<&'a std::sync::Arc<dyn IdPClient>, DiracError> {
    ctx.idp_for(vo)
        .ok_or_else(|| DiracError::InvalidRequest(format!("unknown VO {}", vo)))
}

fn require_vo(ctx: &AuthContext, vo: &str) -> Result<(), DiracError> {
    if ctx.registry.vo(vo).is_none() {
        return Err(DiracError::InvalidRequest(format!("unknown VO {}", vo)));
    }
    Ok(())
}

fn identity_from_map(map: &IdTokenMap) -> Result<crate::crypto::IdTokenIdentity, DiracError> {
    let field = |key: &str| -> Result<String, DiracError> {
        map.get(key)
            .cloned()
            .ok_or_else(|| DiracError::Internal(format!("completed flow row missing id_token field {}", key)))
    };
    Ok(crate::crypto::IdTokenIdentity {
        sub: field("sub")?,
        organisation_name: field("organisation_name")?,
        preferred_username: field("preferred_username")?,
    })
}

fn id_token_map(identity: &crate::crypto::IdTokenIdentity) -> IdTokenMap {
    let mut map = IdTokenMap::new();
    map.insert("sub".to_string(), identity.sub.clone());
    map.insert("organisation_name".to_string(), identity.organisation_name.clone());
    map.insert("preferred_username".to_string(), identity.preferred_username.clone());
    map
}

pub struct DeviceInitiateResponse {
    pub user_code: String,
    pub device_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_in: i64,
}

/// Starts a device flow: validates the client and scope, then mints a
/// user/device code pair.
pub async fn initiate_device(
    ctx: &AuthContext,
    vo: &str,
    client_id: &str,
    scope: &str,
    audience: &str,
) -> Result<DeviceInitiateResponse, DiracError> {
    require_vo(ctx, vo)?;
    if !ctx.registry.is_known_client(client_id) {
        return Err(DiracError::InvalidRequest(format!("unknown client_id {}", client_id)));
    }
    crate::scope::parse_and_validate(scope, vo, &ctx.registry)?;

    let (user_code, device_code) = ctx
        .flow_store
        .insert_device(client_id, scope, audience)
        .await
        .map_err(map_store_err)?;

    let verification_uri = format!("{}/{}/device", ctx.base_url, vo);
    let verification_uri_complete = format!(
        "{}?user_code={}",
        verification_uri,
        urlencoding::encode(&user_code)
    );

    Ok(DeviceInitiateResponse {
        user_code,
        device_code,
        verification_uri,
        verification_uri_complete,
        expires_in: ctx.device_ttl_secs,
    })
}

/// Validates a submitted `user_code` and builds the upstream IdP redirect
/// URL the browser should be sent to next.
pub async fn device_authorization_redirect(
    ctx: &AuthContext,
    vo: &str,
    user_code: &str,
) -> Result<String, DiracError> {
    require_vo(ctx, vo)?;
    ctx.flow_store
        .validate_user_code(user_code, ctx.device_ttl_secs)
        .await
        .map_err(map_store_err)?;

    let idp = idp_for(ctx, vo)?;
    let redirect_uri = format!("{}/{}/device/complete", ctx.base_url, vo);
    let state_map = StateMap {
        grant_type: "device_code".to_string(),
        user_code: Some(user_code.to_string()),
        uuid: None,
        external_state: None,
        code_verifier: None,
    };
    idp.build_authorization_url(&redirect_uri, state_map, &ctx.state_codec).await
}

/// Handles the IdP's redirect back to `/{vo}/device/complete`: exchanges
/// the code, resolves the identity, and attaches it to the pending flow row.
pub async fn complete_device(ctx: &AuthContext, vo: &str, code: &str, state: &str) -> Result<(), DiracError> {
    let state_map = ctx.state_codec.decode(state)?;
    if state_map.grant_type != "device_code" {
        return Err(DiracError::InvalidRequest("state grant_type mismatch".to_string()));
    }
    let user_code = state_map
        .user_code
        .clone()
        .ok_or_else(|| DiracError::InvalidRequest("state missing user_code".to_string()))?;
    let code_verifier = state_map
        .code_verifier
        .clone()
        .ok_or_else(|| DiracError::InvalidRequest("state missing code_verifier".to_string()))?;

    let idp = idp_for(ctx, vo)?;
    let redirect_uri = format!("{}/{}/device/complete", ctx.base_url, vo);
    let identity = idp
        .exchange_code(&redirect_uri, code, &code_verifier, &code_verifier)
        .await?;

    ctx.flow_store
        .device_attach_id_token(&user_code, id_token_map(&identity), ctx.device_ttl_secs)
        .await
        .map_err(map_store_err)?;

    Ok(())
}

pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: i64,
}

async fn issue_from_row(ctx: &AuthContext, vo: &str, row: &FlowRow) -> Result<IssuedToken, DiracError> {
    let scope_info = crate::scope::parse_and_validate(&row.scope, vo, &ctx.registry)?;
    let id_token = row
        .id_token
        .as_ref()
        .ok_or_else(|| DiracError::Internal("ready flow row missing id_token".to_string()))?;
    let identity = identity_from_map(id_token)?;
    let access_token = ctx.token_issuer.issue(&scope_info.group, &identity, &ctx.registry)?;
    Ok(IssuedToken {
        access_token,
        expires_in: ctx.token_issuer.ttl_secs(),
    })
}

/// RFC 8628 `device_code` token exchange: the CLI polls this until the
/// flow is ready, pending, or expired.
pub async fn token_device(
    ctx: &AuthContext,
    vo: &str,
    client_id: &str,
    device_code: &str,
) -> Result<IssuedToken, DiracError> {
    let row = ctx
        .flow_store
        .get_device(device_code, ctx.device_ttl_secs)
        .await
        .map_err(map_store_err)?;
    if row.client_id != client_id {
        return Err(DiracError::InvalidRequest("client_id mismatch".to_string()));
    }
    issue_from_row(ctx, vo, &row).await
}

/// Starts an authorization-code-with-PKCE flow: validates the client's
/// registered redirect, the requested scope, and the challenge method,
/// then mints an opaque `uuid` correlator and redirects to the IdP.
#[allow(clippy::too_many_arguments)]
pub async fn initiate_authorize(
    ctx: &AuthContext,
    vo: &str,
    response_type: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    code_challenge: &str,
    code_challenge_method: &str,
    audience: &str,
    external_state: Option<&str>,
) -> Result<String, DiracError> {
    require_vo(ctx, vo)?;
    if response_type != "code" {
        return Err(DiracError::InvalidRequest("response_type must be code".to_string()));
    }
    if code_challenge_method != "S256" {
        return Err(DiracError::InvalidRequest(
            "only the S256 code_challenge_method is supported".to_string(),
        ));
    }
    let allowed = ctx
        .registry
        .allowed_redirects(client_id)
        .ok_or_else(|| DiracError::InvalidRequest(format!("unknown client_id {}", client_id)))?;
    if !allowed.iter().any(|candidate| candidate == redirect_uri) {
        return Err(DiracError::InvalidRequest(
            "redirect_uri is not registered for this client".to_string(),
        ));
    }
    crate::scope::parse_and_validate(scope, vo, &ctx.registry)?;

    let uuid = ctx
        .flow_store
        .insert_auth_code(
            client_id,
            scope,
            audience,
            code_challenge,
            code_challenge_method,
            redirect_uri,
        )
        .await
        .map_err(map_store_err)?;

    let idp = idp_for(ctx, vo)?;
    let idp_redirect_uri = format!("{}/{}/authorize/complete", ctx.base_url, vo);
    let state_map = StateMap {
        grant_type: "authorization_code".to_string(),
        user_code: None,
        uuid: Some(uuid),
        external_state: external_state.map(str::to_string),
        code_verifier: None,
    };
    idp.build_authorization_url(&idp_redirect_uri, state_map, &ctx.state_codec).await
}

pub struct AuthorizeCompleteResult {
    pub redirect_uri: String,
    pub code: String,
    pub external_state: Option<String>,
}

/// Handles the IdP's redirect back to `/{vo}/authorize/complete`: exchanges
/// the code, attaches the identity, and returns the client's own redirect
/// target plus the opaque DIRAC authorization code to hand it.
pub async fn complete_authorize(
    ctx: &AuthContext,
    vo: &str,
    code: &str,
    state: &str,
) -> Result<AuthorizeCompleteResult, DiracError> {
    let state_map = ctx.state_codec.decode(state)?;
    if state_map.grant_type != "authorization_code" {
        return Err(DiracError::InvalidRequest("state grant_type mismatch".to_string()));
    }
    let uuid = state_map
        .uuid
        .clone()
        .ok_or_else(|| DiracError::InvalidRequest("state missing uuid".to_string()))?;
    let code_verifier = state_map
        .code_verifier
        .clone()
        .ok_or_else(|| DiracError::InvalidRequest("state missing code_verifier".to_string()))?;

    let idp = idp_for(ctx, vo)?;
    let idp_redirect_uri = format!("{}/{}/authorize/complete", ctx.base_url, vo);
    let identity = idp
        .exchange_code(&idp_redirect_uri, code, &code_verifier, &code_verifier)
        .await?;

    let (issued_code, redirect_uri) = ctx
        .flow_store
        .auth_code_attach_id_token(&uuid, id_token_map(&identity), ctx.auth_code_ttl_secs)
        .await
        .map_err(map_store_err)?;

    Ok(AuthorizeCompleteResult {
        redirect_uri,
        code: issued_code,
        external_state: state_map.external_state,
    })
}

/// RFC 6749 `authorization_code` token exchange with PKCE verification.
pub async fn token_authcode(
    ctx: &AuthContext,
    vo: &str,
    client_id: &str,
    code: &str,
    redirect_uri: &str,
    code_verifier: &str,
) -> Result<IssuedToken, DiracError> {
    let row = ctx
        .flow_store
        .get_auth_code(code, ctx.auth_code_ttl_secs)
        .await
        .map_err(map_store_err)?;
    if row.client_id != client_id {
        return Err(DiracError::InvalidRequest("client_id mismatch".to_string()));
    }
    if row.redirect_uri.as_deref() != Some(redirect_uri) {
        return Err(DiracError::InvalidRequest("redirect_uri mismatch".to_string()));
    }
    let stored_challenge = row.code_challenge.as_deref().unwrap_or_default();
    if !verify_challenge(code_verifier, stored_challenge) {
        return Err(DiracError::InvalidRequest("PKCE verification failed".to_string()));
    }
    issue_from_row(ctx, vo, &row).await
}

/// `POST /{vo}/token` dispatch: routes on `grant_type`, matching RFC 8628's
/// and RFC 6749's literal grant identifiers. Anything else is a 501.
#[allow(clippy::too_many_arguments)]
pub async fn token(
    ctx: &AuthContext,
    vo: &str,
    grant_type: &str,
    client_id: &str,
    device_code: Option<&str>,
    code: Option<&str>,
    redirect_uri: Option<&str>,
    code_verifier: Option<&str>,
) -> Result<IssuedToken, DiracError> {
    match grant_type {
        "urn:ietf:params:oauth:grant-type:device_code" => {
            let device_code = device_code
                .ok_or_else(|| DiracError::InvalidRequest("missing device_code".to_string()))?;
            token_device(ctx, vo, client_id, device_code).await
        }
        "authorization_code" => {
            let code = code.ok_or_else(|| DiracError::InvalidRequest("missing code".to_string()))?;
            let redirect_uri = redirect_uri
                .ok_or_else(|| DiracError::InvalidRequest("missing redirect_uri".to_string()))?;
            let code_verifier = code_verifier
                .ok_or_else(|| DiracError::InvalidRequest("missing code_verifier".to_string()))?;
            token_authcode(ctx, vo, client_id, code, redirect_uri, code_verifier).await
        }
        other => Err(DiracError::NotImplemented(other.to_string())),
    }
}
