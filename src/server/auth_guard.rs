//! C8: turns a bearer token into verified [`DiracClaims`], and evaluates
//! property expressions against them. Mirrors the teacher's `Session`
//! extractor — a type implementing `FromRequestParts` so handlers simply
//! name the claims as an argument and axum supplies (or rejects) them.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::context::AuthContext;
use crate::crypto::DiracClaims;
use crate::error::DiracError;
use crate::registry::PropertyExpr;

impl FromRequestParts<AuthContext> for DiracClaims {
    type Rejection = DiracError;

    async fn from_request_parts(parts: &mut Parts, ctx: &AuthContext) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(DiracError::InvalidJwt)?;
        ctx.token_issuer.verify(header)
    }
}

/// Evaluates a property expression against a verified token's granted
/// properties.
pub fn has_properties(claims: &DiracClaims, expr: &PropertyExpr) -> bool {
    expr.evaluate(&claims.dirac_properties)
}

/// Enforces a property expression, turning a failed check into the 403
/// the spec's AuthGuard calls for. Handlers that need more than
/// `NormalUser` call this explicitly after extracting `DiracClaims`.
pub fn require_properties(claims: &DiracClaims, expr: &PropertyExpr) -> Result<(), DiracError> {
    if has_properties(claims, expr) {
        Ok(())
    } else {
        Err(DiracError::Forbidden(
            "the presented token does not carry the required properties".to_string(),
        ))
    }
}
