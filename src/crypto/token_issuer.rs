//! C6: builds the DIRAC claim set, signs the access-token JWT, and verifies
//! bearer tokens presented by downstream callers.

use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DiracError;
use crate::registry::Registry;

/// Minimal shape of an upstream ID token's claims needed to issue a DIRAC
/// access token. `organisation_name` is the VO, per the IdP contract.
#[derive(Debug, Clone)]
pub struct IdTokenIdentity {
    pub sub: String,
    pub organisation_name: String,
    pub preferred_username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiracClaims {
    pub sub: String,
    pub vo: String,
    pub aud: String,
    pub iss: String,
    pub dirac_properties: Vec<String>,
    pub jti: String,
    pub preferred_username: String,
    pub dirac_group: String,
    pub exp: i64,
}

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
    audience: String,
    access_token_ttl_secs: i64,
}

impl TokenIssuer {
    pub fn ttl_secs(&self) -> i64 {
        self.access_token_ttl_secs
    }

    pub fn new(registry: &Registry, access_token_ttl_secs: i64) -> Result<Self, DiracError> {
        let algorithm = match registry.signing_alg.as_str() {
            "HS256" => Algorithm::HS256,
            other => {
                return Err(DiracError::Internal(format!(
                    "unsupported signing algorithm: {}",
                    other
                )))
            }
        };
        Ok(Self {
            encoding_key: EncodingKey::from_secret(registry.signing_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(registry.signing_secret.as_bytes()),
            algorithm,
            issuer: registry.issuer.clone(),
            audience: registry.audience.clone(),
            access_token_ttl_secs,
        })
    }

    /// Builds and signs the DIRAC access token for `group`, given the
    /// upstream identity and the registry snapshot. Fails with
    /// `InvalidRequest` if the resolved DIRAC user is not a member of
    /// `group` — testable property 6.
    pub fn issue(
        &self,
        group: &str,
        identity: &IdTokenIdentity,
        registry: &Registry,
    ) -> Result<String, DiracError> {
        let vo = &identity.organisation_name;
        let sub_id = registry
            .resolve_subject(vo, &identity.sub)
            .ok_or_else(|| {
                DiracError::InvalidRequest(format!(
                    "identity {} is not registered for VO {}",
                    identity.sub, vo
                ))
            })?
            .to_string();

        let group_def = registry.group(vo, group).ok_or_else(|| {
            DiracError::InvalidRequest(format!("unknown group {} for VO {}", group, vo))
        })?;

        if !group_def.users.iter().any(|u| u == &sub_id) {
            return Err(DiracError::InvalidRequest(format!(
                "user {} is not a member of group {}",
                sub_id, group
            )));
        }

        let now = chrono::Utc::now().timestamp();
        let claims = DiracClaims {
            sub: format!("{}:{}", vo, sub_id),
            vo: vo.clone(),
            aud: self.audience.clone(),
            iss: self.issuer.clone(),
            // Mirrors the source: the full set granted to the group, not an
            // intersection with the requested scope's properties.
            dirac_properties: group_def.properties.clone(),
            jti: Uuid::new_v4().to_string(),
            preferred_username: identity.preferred_username.clone(),
            dirac_group: group.to_string(),
            exp: now + self.access_token_ttl_secs,
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| DiracError::Internal(format!("failed to sign access token: {}", e)))
    }

    /// Parses an `Authorization: Bearer <token>` value and validates
    /// signature, issuer, audience and expiry. Any failure collapses to a
    /// single opaque `InvalidJwt`.
    pub fn verify(&self, bearer: &str) -> Result<DiracClaims, DiracError> {
        let token = bearer
            .strip_prefix("Bearer ")
            .ok_or(DiracError::InvalidJwt)?;

        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);

        decode::<DiracClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| DiracError::InvalidJwt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryFile;

    fn registry() -> Registry {
        let file: RegistryFile = toml::from_str(
            r#"
            issuer = "https://auth.example.org"
            audience = "dirac"
            signing_secret = "test-secret"
            signing_alg = "HS256"

            [vos.lhcb]
            default_group = "lhcb_user"
            server_metadata_url = "https://idp.example.org/.well-known/openid-configuration"
            client_id = "dirac_cli"

            [vos.lhcb.subjects]
            "b824d4dc-1111-2222-3333-444455556666" = "chaen"

            [vos.lhcb.groups.lhcb_user]
            users = ["chaen"]
            properties = ["NormalUser"]
            "#,
        )
        .unwrap();
        Registry::from_file(file).unwrap()
    }

    fn identity() -> IdTokenIdentity {
        IdTokenIdentity {
            sub: "b824d4dc-1111-2222-3333-444455556666".to_string(),
            organisation_name: "lhcb".to_string(),
            preferred_username: "chaen".to_string(),
        }
    }

    #[test]
    fn issue_then_verify_round_trips_claims() {
        let registry = registry();
        let issuer = TokenIssuer::new(&registry, 180_000).unwrap();
        let token = issuer.issue("lhcb_user", &identity(), &registry).unwrap();
        let claims = issuer.verify(&format!("Bearer {}", token)).unwrap();

        assert_eq!(claims.sub, "lhcb:chaen");
        assert_eq!(claims.vo, "lhcb");
        assert_eq!(claims.dirac_group, "lhcb_user");
        assert_eq!(claims.dirac_properties, vec!["NormalUser".to_string()]);
    }

    #[test]
    fn verify_rejects_mutated_token() {
        let registry = registry();
        let issuer = TokenIssuer::new(&registry, 180_000).unwrap();
        let token = issuer.issue("lhcb_user", &identity(), &registry).unwrap();
        let mut mutated = token.clone();
        mutated.push('x');
        assert!(issuer.verify(&format!("Bearer {}", mutated)).is_err());
    }

    #[test]
    fn verify_rejects_missing_bearer_prefix() {
        let registry = registry();
        let issuer = TokenIssuer::new(&registry, 180_000).unwrap();
        let token = issuer.issue("lhcb_user", &identity(), &registry).unwrap();
        assert!(issuer.verify(&token).is_err());
    }

    #[test]
    fn issue_fails_for_user_not_in_group() {
        let registry = registry();
        let issuer = TokenIssuer::new(&registry, 180_000).unwrap();
        let mut other = identity();
        other.sub = "unknown-subject".to_string();
        assert!(issuer.issue("lhcb_user", &other, &registry).is_err());
    }

    #[test]
    fn verify_rejects_token_from_different_secret() {
        let registry = registry();
        let issuer = TokenIssuer::new(&registry, 180_000).unwrap();
        let token = issuer.issue("lhcb_user", &identity(), &registry).unwrap();

        let mut tampered_registry = registry.clone();
        tampered_registry.signing_secret = "a-different-secret".to_string();
        let other_issuer = TokenIssuer::new(&tampered_registry, 180_000).unwrap();

        assert!(other_issuer.verify(&format!("Bearer {}", token)).is_err());
    }
}
