//! Policy evaluation.
//!
//! Turns a report's declarative policies into either a deny/permit gate or
//! a SQL predicate that restricts the rows a caller may see.
//!
//! ```text
//! [Policy] + CallerContext
//!         │
//!         ▼ first matching rule per policy
//! ┌──────────────┬─────────────────────────────┐
//! │ ACCESS       │ PERMIT → TRUE, DENY → FALSE │
//! │ ROW_LEVEL    │ PERMIT → actions (AND)      │
//! │              │ DENY   → FALSE              │
//! └──────────────┴─────────────────────────────┘
//!         │
//!         ▼ any FALSE ⇒ FALSE, otherwise AND-join
//! PolicyResult
//! ```
//!
//! Evaluation never fails: anything that cannot be resolved denies.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::definition::{Condition, Effect, Policy, PolicyType, Rule};

/// Predicate admitting every row.
pub const POLICY_PERMIT: &str = "TRUE";
/// Predicate admitting no rows.
pub const POLICY_DENY: &str = "FALSE";

pub const ROLE_TOKEN: &str = "${role}";
pub const TOKEN_TOKEN: &str = "${token}";
pub const CASELOAD_TOKEN: &str = "${caseload}";

static VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{[A-Za-z_][A-Za-z0-9_]*\}").expect("variable regex is valid"));

/// Identity attributes of the caller a policy is evaluated for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub username: Option<String>,
    pub roles: Vec<String>,
    pub active_caseloads: Vec<String>,
    pub has_token: bool,
}

impl CallerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_caseloads(mut self, caseloads: &[&str]) -> Self {
        self.active_caseloads = caseloads.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_token(mut self) -> Self {
        self.has_token = true;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Outcome of evaluating a policy list: [`POLICY_DENY`], [`POLICY_PERMIT`]
/// or a composite predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyResult(String);

impl PolicyResult {
    pub fn deny() -> Self {
        Self(POLICY_DENY.to_string())
    }

    pub fn permit() -> Self {
        Self(POLICY_PERMIT.to_string())
    }

    pub fn predicate(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn is_deny(&self) -> bool {
        self.0 == POLICY_DENY
    }

    pub fn is_permit(&self) -> bool {
        self.0 == POLICY_PERMIT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Evaluate every policy against the caller.
///
/// An empty policy list denies. Non-deny results are joined in input
/// order without collapsing repeated `TRUE` markers.
pub fn evaluate(policies: &[Policy], caller: Option<&CallerContext>) -> PolicyResult {
    if policies.is_empty() {
        tracing::debug!("no policies defined, denying");
        return PolicyResult::deny();
    }

    let mut predicates = Vec::with_capacity(policies.len());
    for policy in policies {
        let result = evaluate_policy(policy, caller);
        if result == POLICY_DENY {
            tracing::debug!(policy = %policy.id, "policy denied");
            return PolicyResult::deny();
        }
        predicates.push(result);
    }

    PolicyResult(predicates.join(" AND "))
}

/// Values captured while matching a rule, used for action interpolation.
#[derive(Debug, Default)]
struct RuleMatch {
    role: Option<String>,
}

fn evaluate_policy(policy: &Policy, caller: Option<&CallerContext>) -> String {
    let Some((rule, matched)) = policy
        .rule
        .iter()
        .find_map(|rule| match_rule(rule, caller).map(|m| (rule, m)))
    else {
        return POLICY_DENY.to_string();
    };

    match (policy.policy_type, rule.effect) {
        (_, Effect::Deny) => POLICY_DENY.to_string(),
        (PolicyType::Access, Effect::Permit) => POLICY_PERMIT.to_string(),
        (PolicyType::RowLevel, Effect::Permit) => {
            if policy.action.is_empty() {
                return POLICY_PERMIT.to_string();
            }
            let actions: Option<Vec<String>> = policy
                .action
                .iter()
                .map(|action| interpolate(action, caller, &matched))
                .collect();
            match actions {
                Some(actions) => actions.join(" AND "),
                None => POLICY_DENY.to_string(),
            }
        }
    }
}

fn match_rule(rule: &Rule, caller: Option<&CallerContext>) -> Option<RuleMatch> {
    let mut matched = RuleMatch::default();
    for condition in &rule.condition {
        if !condition_holds(condition, caller, &mut matched) {
            return None;
        }
    }
    Some(matched)
}

fn condition_holds(
    condition: &Condition,
    caller: Option<&CallerContext>,
    matched: &mut RuleMatch,
) -> bool {
    if let Some(tokens) = &condition.exists {
        if !tokens
            .iter()
            .all(|token| resolve(token, caller, matched).is_some())
        {
            return false;
        }
    }

    if let Some(values) = &condition.match_ {
        let Some((token, allowed)) = values.split_first() else {
            return false;
        };
        if !match_holds(token, allowed, caller, matched) {
            return false;
        }
    }

    true
}

fn match_holds(
    token: &str,
    allowed: &[String],
    caller: Option<&CallerContext>,
    matched: &mut RuleMatch,
) -> bool {
    match (token, caller) {
        (ROLE_TOKEN, Some(caller)) => {
            let role = caller.roles.iter().find(|r| allowed.contains(r));
            if let Some(role) = role {
                matched.role = Some(role.clone());
            }
            role.is_some()
        }
        (CASELOAD_TOKEN, Some(caller)) => caller
            .active_caseloads
            .first()
            .is_some_and(|c| allowed.contains(c)),
        (TOKEN_TOKEN, Some(caller)) => {
            caller.has_token && allowed.iter().any(|v| v.eq_ignore_ascii_case(POLICY_PERMIT))
        }
        (token, _) if VARIABLE.is_match(token) => false,
        (literal, _) => allowed.iter().any(|v| v == literal),
    }
}

fn resolve(token: &str, caller: Option<&CallerContext>, matched: &RuleMatch) -> Option<String> {
    let caller = caller?;
    match token {
        ROLE_TOKEN => matched.role.clone().or_else(|| caller.roles.first().cloned()),
        TOKEN_TOKEN => caller.has_token.then(|| POLICY_PERMIT.to_string()),
        CASELOAD_TOKEN => caller
            .active_caseloads
            .first()
            .map(|caseload| caseload.replace('\'', "''")),
        _ => None,
    }
}

/// Substitute every `${...}` variable in an action. `None` if any variable
/// is unresolvable.
fn interpolate(action: &str, caller: Option<&CallerContext>, matched: &RuleMatch) -> Option<String> {
    let mut out = String::with_capacity(action.len());
    let mut last = 0;
    for m in VARIABLE.find_iter(action) {
        out.push_str(&action[last..m.start()]);
        out.push_str(&resolve(m.as_str(), caller, matched)?);
        last = m.end();
    }
    out.push_str(&action[last..]);
    Some(out)
}
