//! the iam policy document: who may join a tailnet and with which role.
//!
//! ```json
//! {
//!   "subs": ["oidc|1234"],
//!   "emails": ["alice@example.com", "*@corp.example"],
//!   "filters": ["domain == \"example.com\" && token.email_verified"],
//!   "roles": {"alice@example.com": "admin", "mallory@example.com": "none"}
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ExprError, Result};
use crate::expr::{Claims, Expr};
use crate::hujson;

/// a user's role in a tailnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// member with administrative capability.
    Admin,
    /// ordinary member.
    Member,
    /// not allowed in.
    None,
}

impl Role {
    /// whether the role allows joining the tailnet.
    pub fn is_member(self) -> bool {
        self != Role::None
    }

    /// whether the role carries the admin capability.
    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

/// a parsed iam policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IamPolicy {
    /// identity provider subjects admitted as members.
    pub subs: Vec<String>,

    /// emails admitted as members. `*@domain` admits a whole domain.
    pub emails: Vec<String>,

    /// expressions over claims. any that holds admits the user as a member.
    pub filters: Vec<String>,

    /// explicit roles by sub or email. these take precedence.
    pub roles: BTreeMap<String, Role>,
}

impl IamPolicy {
    /// parse a stored iam document. empty text yields the open policy.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let policy: IamPolicy = serde_json::from_str(&hujson::standardize(text))?;
        for (index, filter) in policy.filters.iter().enumerate() {
            Expr::parse(filter).map_err(|cause| Error::InvalidFilter { index, cause })?;
        }
        Ok(policy)
    }

    /// a policy with no entries admits everyone as a member.
    pub fn is_open(&self) -> bool {
        self.subs.is_empty()
            && self.emails.is_empty()
            && self.filters.is_empty()
            && self.roles.is_empty()
    }

    /// decide the role of an identity.
    ///
    /// an explicit role for the sub, then for the email, wins. otherwise the
    /// identity is a member when listed in `subs` or `emails` or when any
    /// filter holds.
    pub fn evaluate_role(&self, claims: &Claims) -> std::result::Result<Role, ExprError> {
        let sub = claims.sub();
        let email = claims.email();

        let explicit = sub
            .and_then(|s| self.roles.get(s))
            .or_else(|| email.and_then(|e| self.roles.get(e)));
        if let Some(role) = explicit {
            return Ok(*role);
        }
        if self.is_open() {
            return Ok(Role::Member);
        }

        if sub.is_some_and(|s| self.subs.iter().any(|x| x == s)) {
            return Ok(Role::Member);
        }
        if email.is_some_and(|e| self.emails.iter().any(|pattern| email_matches(pattern, e))) {
            return Ok(Role::Member);
        }
        for filter in &self.filters {
            if Expr::parse(filter)?.evaluate(claims)? {
                return Ok(Role::Member);
            }
        }
        Ok(Role::None)
    }
}

fn email_matches(pattern: &str, email: &str) -> bool {
    match pattern.strip_prefix("*@") {
        Some(domain) => email
            .rsplit_once('@')
            .is_some_and(|(_, d)| d.eq_ignore_ascii_case(domain)),
        None => pattern.eq_ignore_ascii_case(email),
    }
}
