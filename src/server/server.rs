//! C9: the HTTP surface. Thin axum handlers that parse the request,
//! delegate to the orchestrator, and translate the result back into a
//! response — no flow/token logic lives here.

use axum::extract::{Path, Query, State};
use axum::http::header::{HeaderMap, ETAG, IF_NONE_MATCH};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::context::AuthContext;
use crate::crypto::DiracClaims;
use crate::error::{DiracError, DiracResult};
use crate::orchestrator;
use crate::registry::{PropertyExpr, SecurityProperty};
use crate::server::auth_guard::require_properties;
use crate::server::http_layers::log_requests;

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": format!("{}-{}", env!("APP_VERSION"), env!("GIT_HASH")),
    }))
}

#[derive(Deserialize)]
struct DeviceInitiateForm {
    client_id: String,
    scope: String,
    #[serde(default = "default_audience")]
    audience: String,
}

fn default_audience() -> String {
    "dirac".to_string()
}

async fn post_device(
    State(ctx): State<AuthContext>,
    Path(vo): Path<String>,
    Form(form): Form<DeviceInitiateForm>,
) -> DiracResult<Json<serde_json::Value>> {
    let initiated =
        orchestrator::initiate_device(&ctx, &vo, &form.client_id, &form.scope, &form.audience).await?;
    Ok(Json(json!({
        "user_code": initiated.user_code,
        "device_code": initiated.device_code,
        "verification_uri": initiated.verification_uri,
        "verification_uri_complete": initiated.verification_uri_complete,
        "expires_in": initiated.expires_in,
    })))
}

#[derive(Deserialize)]
struct DeviceUserCodeQuery {
    user_code: String,
}

async fn get_device(
    State(ctx): State<AuthContext>,
    Path(vo): Path<String>,
    Query(query): Query<DeviceUserCodeQuery>,
) -> DiracResult<Html<String>> {
    let url = orchestrator::device_authorization_redirect(&ctx, &vo, &query.user_code).await?;
    Ok(Html(format!(
        "<html><body><p>Sign in to continue.</p><a href=\"{url}\">Continue</a></body></html>"
    )))
}

#[derive(Deserialize)]
struct CompleteQuery {
    code: String,
    state: String,
}

async fn get_device_complete(
    State(ctx): State<AuthContext>,
    Path(vo): Path<String>,
    Query(query): Query<CompleteQuery>,
) -> DiracResult<Redirect> {
    orchestrator::complete_device(&ctx, &vo, &query.code, &query.state).await?;
    Ok(Redirect::to(&format!("/{}/device/complete/finished", vo)))
}

async fn get_device_finished() -> Html<&'static str> {
    Html("<html><body><p>Sign-in complete. You may return to your terminal.</p></body></html>")
}

#[derive(Deserialize)]
struct AuthorizeQuery {
    response_type: String,
    client_id: String,
    redirect_uri: String,
    scope: String,
    #[serde(default = "default_audience")]
    audience: String,
    code_challenge: String,
    code_challenge_method: String,
    #[serde(default)]
    state: Option<String>,
}

async fn get_authorize(
    State(ctx): State<AuthContext>,
    Path(vo): Path<String>,
    Query(query): Query<AuthorizeQuery>,
) -> DiracResult<Redirect> {
    let url = orchestrator::initiate_authorize(
        &ctx,
        &vo,
        &query.response_type,
        &query.client_id,
        &query.redirect_uri,
        &query.scope,
        &query.code_challenge,
        &query.code_challenge_method,
        &query.audience,
        query.state.as_deref(),
    )
    .await?;
    Ok(Redirect::to(&url))
}

async fn get_authorize_complete(
    State(ctx): State<AuthContext>,
    Path(vo): Path<String>,
    Query(query): Query<CompleteQuery>,
) -> DiracResult<Redirect> {
    let result = orchestrator::complete_authorize(&ctx, &vo, &query.code, &query.state).await?;
    let mut target = format!(
        "{}?code={}",
        result.redirect_uri,
        urlencoding::encode(&result.code)
    );
    if let Some(state) = result.external_state {
        target.push_str(&format!("&state={}", urlencoding::encode(&state)));
    }
    Ok(Redirect::to(&target))
}

#[derive(Deserialize)]
struct TokenForm {
    grant_type: String,
    client_id: String,
    #[serde(default)]
    device_code: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    redirect_uri: Option<String>,
    #[serde(default)]
    code_verifier: Option<String>,
}

// `state` is deliberately absent here: the authorization-code flow already
// handed it back to the client in the `/authorize/complete` redirect
// (`redirect_uri?code=...&state=...`), and the device flow has no client
// `state` to echo in the first place. Re-threading it through the flow row
// just to repeat it at `/token` would add persistence with no new information.
#[derive(Serialize)]
struct TokenResponseBody {
    access_token: String,
    token_type: &'static str,
    expires_in: i64,
}

async fn post_token(
    State(ctx): State<AuthContext>,
    Path(vo): Path<String>,
    Form(form): Form<TokenForm>,
) -> DiracResult<Json<TokenResponseBody>> {
    let issued = orchestrator::token(
        &ctx,
        &vo,
        &form.grant_type,
        &form.client_id,
        form.device_code.as_deref(),
        form.code.as_deref(),
        form.redirect_uri.as_deref(),
        form.code_verifier.as_deref(),
    )
    .await?;
    Ok(Json(TokenResponseBody {
        access_token: issued.access_token,
        token_type: "Bearer",
        expires_in: issued.expires_in,
    }))
}

/// Conditional-GET configuration snapshot. Mirrors the upstream behaviour
/// of comparing `If-None-Match` against a content hash of the registry and
/// answering 304 on a match, without threading a `Last-Modified` flip-flop
/// check the spec doesn't call for.
async fn get_well_known_configuration(
    State(ctx): State<AuthContext>,
    Path(vo): Path<String>,
    claims: DiracClaims,
    headers: HeaderMap,
) -> DiracResult<Response> {
    require_properties(&claims, &PropertyExpr::leaf(SecurityProperty::NormalUser))?;

    let snapshot = ctx
        .registry
        .vo_snapshot(&vo)
        .ok_or_else(|| DiracError::InvalidRequest(format!("unknown VO {}", vo)))?;

    let etag = format!("\"{}\"", ctx.registry.etag);
    if let Some(if_none_match) = headers.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if if_none_match == etag {
            return Ok(StatusCode::NOT_MODIFIED.into_response());
        }
    }

    let mut response = Json(snapshot).into_response();
    response
        .headers_mut()
        .insert(ETAG, etag.parse().expect("hex digest is a valid header value"));
    Ok(response)
}

pub fn make_app(ctx: AuthContext) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/{vo}/device", post(post_device).get(get_device))
        .route("/{vo}/device/complete", get(get_device_complete))
        .route("/{vo}/device/complete/finished", get(get_device_finished))
        .route("/{vo}/authorize", get(get_authorize))
        .route("/{vo}/authorize/complete", get(get_authorize_complete))
        .route("/{vo}/token", post(post_token))
        .route(
            "/{vo}/.well-known/dirac-configuration",
            get(get_well_known_configuration),
        )
        .layer(middleware::from_fn_with_state(ctx.clone(), log_requests))
        .with_state(ctx)
}

pub async fn run_server(ctx: AuthContext, port: u16) -> anyhow::Result<()> {
    let app = make_app(ctx);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("DIRAC authorization server listening on port {}", port);
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
