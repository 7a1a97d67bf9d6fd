//! C1: parses and validates `group:X property:Y` scope strings against the
//! configuration registry.

use crate::error::DiracError;
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeInfo {
    pub group: String,
    pub properties: Vec<String>,
}

/// Parses a space-separated scope token string and validates it against
/// `registry` for the given VO. Invoked at flow initiation (fail-fast) and
/// again, authoritatively, at token issuance.
pub fn parse_and_validate(scope: &str, vo: &str, registry: &Registry) -> Result<ScopeInfo, DiracError> {
    let mut groups = Vec::new();
    let mut properties = Vec::new();

    for token in scope.split_whitespace() {
        if let Some(name) = token.strip_prefix("group:") {
            groups.push(name.to_string());
        } else if let Some(name) = token.strip_prefix("property:") {
            if crate::registry::SecurityProperty::from_str(name).is_none() {
                return Err(DiracError::InvalidRequest(format!(
                    "unrecognised property in scope: {}",
                    name
                )));
            }
            properties.push(name.to_string());
        } else {
            return Err(DiracError::InvalidRequest(format!(
                "unrecognised scope token: {}",
                token
            )));
        }
    }

    let group = match groups.len() {
        0 => registry
            .default_group(vo)
            .map(str::to_string)
            .ok_or_else(|| {
                DiracError::InvalidRequest(format!("VO {} has no default group", vo))
            })?,
        1 => {
            let requested = groups.remove(0);
            if registry.group(vo, &requested).is_none() {
                return Err(DiracError::InvalidRequest(format!(
                    "unknown group {} for VO {}",
                    requested, vo
                )));
            }
            requested
        }
        _ => {
            return Err(DiracError::InvalidRequest(
                "scope must name at most one group".to_string(),
            ))
        }
    };

    Ok(ScopeInfo { group, properties })
}
