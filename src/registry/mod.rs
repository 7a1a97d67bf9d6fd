//! The DIRAC configuration registry: VOs, groups, users, properties and
//! known clients. Read-only after load; held as a single immutable snapshot
//! shared across requests (see design notes on cyclic registry references).

mod property;

pub use property::{PropertyExpr, SecurityProperty};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub users: Vec<String>,
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoDefinition {
    pub default_group: String,
    pub server_metadata_url: String,
    pub client_id: String,
    pub groups: HashMap<String, GroupDefinition>,
    /// Maps an upstream IdP `sub` claim to a DIRAC username. The original
    /// source hard-coded this as a two-entry table (`SID_TO_USERNAME`); here
    /// it is ordinary registry data, per the design notes.
    #[serde(default)]
    pub subjects: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownClient {
    pub client_id: String,
    pub allowed_redirects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryFile {
    pub issuer: String,
    pub audience: String,
    pub signing_secret: String,
    #[serde(default = "default_signing_alg")]
    pub signing_alg: String,
    pub vos: HashMap<String, VoDefinition>,
    #[serde(default)]
    pub known_clients: Vec<KnownClient>,
}

fn default_signing_alg() -> String {
    "HS256".to_string()
}

/// An immutable, process-scoped snapshot of the configuration registry.
///
/// Built once at startup and shared via `Arc` — the opposite of ambient
/// global state: every component that needs registry data receives this
/// explicitly, per the design notes' "reify as an explicit, process-scoped
/// context" guidance.
#[derive(Debug, Clone)]
pub struct Registry {
    pub issuer: String,
    pub audience: String,
    pub signing_secret: String,
    pub signing_alg: String,
    pub vos: HashMap<String, VoDefinition>,
    known_clients: HashMap<String, Vec<String>>,
    /// Content hash of the loaded registry, exposed as the `.well-known`
    /// configuration endpoint's `ETag`.
    pub etag: String,
    pub loaded_at: i64,
}

impl Registry {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read registry file: {:?}", path))?;
        let file: RegistryFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse registry file: {:?}", path))?;
        Self::from_file(file)
    }

    pub fn from_file(file: RegistryFile) -> Result<Self> {
        if file.vos.is_empty() {
            bail!("registry must define at least one VO");
        }
        let etag = {
            let bytes = serde_json::to_vec(&file).unwrap_or_default();
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            format!("{:x}", hasher.finalize())
        };
        let known_clients = file
            .known_clients
            .into_iter()
            .map(|c| (c.client_id, c.allowed_redirects))
            .collect();
        Ok(Self {
            issuer: file.issuer,
            audience: file.audience,
            signing_secret: file.signing_secret,
            signing_alg: file.signing_alg,
            vos: file.vos,
            known_clients,
            etag,
            loaded_at: chrono::Utc::now().timestamp(),
        })
    }

    /// The subset of VO configuration safe to expose over the
    /// `.well-known/dirac-configuration` endpoint: groups and the
    /// properties they carry, nothing that reveals secrets or membership.
    pub fn vo_snapshot(&self, vo: &str) -> Option<serde_json::Value> {
        let def = self.vos.get(vo)?;
        let groups: serde_json::Map<String, serde_json::Value> = def
            .groups
            .iter()
            .map(|(name, group)| (name.clone(), serde_json::json!({ "properties": group.properties })))
            .collect();
        Some(serde_json::json!({
            "vo": vo,
            "default_group": def.default_group,
            "groups": groups,
        }))
    }

    pub fn vo(&self, vo: &str) -> Option<&VoDefinition> {
        self.vos.get(vo)
    }

    pub fn default_group(&self, vo: &str) -> Option<&str> {
        self.vos.get(vo).map(|v| v.default_group.as_str())
    }

    pub fn group(&self, vo: &str, group: &str) -> Option<&GroupDefinition> {
        self.vos.get(vo).and_then(|v| v.groups.get(group))
    }

    /// Resolves an upstream IdP `sub` claim to a DIRAC username for `vo`.
    pub fn resolve_subject(&self, vo: &str, sub_raw: &str) -> Option<&str> {
        self.vos
            .get(vo)
            .and_then(|v| v.subjects.get(sub_raw))
            .map(String::as_str)
    }

    /// Known-clients lookup: `client_id -> allowed_redirects`. Unknown client
    /// or mismatched redirect is the caller's job to turn into a 400.
    pub fn allowed_redirects(&self, client_id: &str) -> Option<&[String]> {
        self.known_clients.get(client_id).map(Vec::as_slice)
    }

    pub fn is_known_client(&self, client_id: &str) -> bool {
        self.known_clients.contains_key(client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RegistryFile {
        toml::from_str(
            r#"
            issuer = "https://auth.example.org"
            audience = "dirac"
            signing_secret = "test-secret"
            signing_alg = "HS256"

            [[known_clients]]
            client_id = "myDIRACClientID"
            allowed_redirects = ["http://localhost:8000/docs/oauth2-redirect"]

            [vos.lhcb]
            default_group = "lhcb_user"
            server_metadata_url = "https://idp.example.org/.well-known/openid-configuration"
            client_id = "dirac_cli"

            [vos.lhcb.groups.lhcb_user]
            users = ["chaen"]
            properties = ["NormalUser"]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn loads_and_exposes_groups() {
        let registry = Registry::from_file(sample()).unwrap();
        assert_eq!(registry.default_group("lhcb"), Some("lhcb_user"));
        let group = registry.group("lhcb", "lhcb_user").unwrap();
        assert_eq!(group.users, vec!["chaen".to_string()]);
    }

    #[test]
    fn known_client_redirects() {
        let registry = Registry::from_file(sample()).unwrap();
        assert!(registry.is_known_client("myDIRACClientID"));
        assert_eq!(
            registry.allowed_redirects("myDIRACClientID"),
            Some(&["http://localhost:8000/docs/oauth2-redirect".to_string()][..])
        );
        assert!(!registry.is_known_client("unknown"));
    }

    #[test]
    fn rejects_empty_registry() {
        let file = RegistryFile {
            issuer: "i".into(),
            audience: "a".into(),
            signing_secret: "s".into(),
            signing_alg: "HS256".into(),
            vos: HashMap::new(),
            known_clients: vec![],
        };
        assert!(Registry::from_file(file).is_err());
    }
}
