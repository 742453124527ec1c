//! Declarative access policies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyType {
    /// Contributes a SQL predicate restricting visible rows.
    #[serde(alias = "ROW_LEVEL", alias = "row_level")]
    RowLevel,
    /// Contributes a boolean gate only.
    #[serde(alias = "ACCESS")]
    Access,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    #[serde(alias = "PERMIT")]
    Permit,
    #[serde(alias = "DENY")]
    Deny,
}

/// A condition on caller attributes.
///
/// `exists` requires every token to resolve. `match` holds a token followed
/// by the values the resolved attribute may take.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub exists: Option<Vec<String>>,
    #[serde(default, rename = "match")]
    pub match_: Option<Vec<String>>,
}

impl Condition {
    pub fn exists(tokens: &[&str]) -> Self {
        Self {
            exists: Some(tokens.iter().map(|t| t.to_string()).collect()),
            match_: None,
        }
    }

    pub fn matches(token: &str, allowed: &[&str]) -> Self {
        let mut values = vec![token.to_string()];
        values.extend(allowed.iter().map(|v| v.to_string()));
        Self {
            exists: None,
            match_: Some(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub effect: Effect,
    #[serde(default)]
    pub condition: Vec<Condition>,
}

impl Rule {
    pub fn new(effect: Effect, condition: Vec<Condition>) -> Self {
        Self { effect, condition }
    }

    pub fn permit() -> Self {
        Self::new(Effect::Permit, vec![])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    #[serde(default)]
    pub action: Vec<String>,
    #[serde(default)]
    pub rule: Vec<Rule>,
}

impl Policy {
    pub fn row_level(id: impl Into<String>, action: Vec<String>, rule: Vec<Rule>) -> Self {
        Self {
            id: id.into(),
            policy_type: PolicyType::RowLevel,
            action,
            rule,
        }
    }

    pub fn access(id: impl Into<String>, rule: Vec<Rule>) -> Self {
        Self {
            id: id.into(),
            policy_type: PolicyType::Access,
            action: vec![],
            rule,
        }
    }
}
