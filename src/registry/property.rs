use serde::{Deserialize, Serialize};

/// The closed set of DIRAC security properties. Ownership of this set
/// belongs to the configuration module; scopes and claims may only name
/// values from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityProperty {
    NormalUser,
    ProductionManagement,
    JobAdministrator,
    CsAdministrator,
    AlarmsManagement,
    ServiceAdministrator,
    Operator,
}

impl SecurityProperty {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityProperty::NormalUser => "NormalUser",
            SecurityProperty::ProductionManagement => "ProductionManagement",
            SecurityProperty::JobAdministrator => "JobAdministrator",
            SecurityProperty::CsAdministrator => "CsAdministrator",
            SecurityProperty::AlarmsManagement => "AlarmsManagement",
            SecurityProperty::ServiceAdministrator => "ServiceAdministrator",
            SecurityProperty::Operator => "Operator",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "NormalUser" => Some(SecurityProperty::NormalUser),
            "ProductionManagement" => Some(SecurityProperty::ProductionManagement),
            "JobAdministrator" => Some(SecurityProperty::JobAdministrator),
            "CsAdministrator" => Some(SecurityProperty::CsAdministrator),
            "AlarmsManagement" => Some(SecurityProperty::AlarmsManagement),
            "ServiceAdministrator" => Some(SecurityProperty::ServiceAdministrator),
            "Operator" => Some(SecurityProperty::Operator),
            _ => None,
        }
    }
}

/// A boolean expression over the set of properties a token carries.
/// Tagged variant, not a trait object: the whole tree is `Send + Sync` and
/// trivially serializable, which a `dyn` evaluator would not be.
#[derive(Debug, Clone)]
pub enum PropertyExpr {
    Leaf(SecurityProperty),
    And(Box<PropertyExpr>, Box<PropertyExpr>),
    Or(Box<PropertyExpr>, Box<PropertyExpr>),
    Not(Box<PropertyExpr>),
}

impl PropertyExpr {
    pub fn leaf(p: SecurityProperty) -> Self {
        PropertyExpr::Leaf(p)
    }

    pub fn and(self, other: PropertyExpr) -> Self {
        PropertyExpr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: PropertyExpr) -> Self {
        PropertyExpr::Or(Box::new(self), Box::new(other))
    }

    pub fn not(self) -> Self {
        PropertyExpr::Not(Box::new(self))
    }

    /// Evaluates the expression against the set of properties a caller holds.
    pub fn evaluate(&self, held: &[String]) -> bool {
        match self {
            PropertyExpr::Leaf(p) => held.iter().any(|h| h == p.as_str()),
            PropertyExpr::And(a, b) => a.evaluate(held) && b.evaluate(held),
            PropertyExpr::Or(a, b) => a.evaluate(held) || b.evaluate(held),
            PropertyExpr::Not(a) => !a.evaluate(held),
        }
    }
}
