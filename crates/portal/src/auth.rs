//! Session context and the auth collaborator contract.
//!
//! Operations that need a principal receive a [`SessionContext`] explicitly and resolve it
//! exactly once through [`AuthProvider::current_principal`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, PortalError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub String);

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Admin,
}

impl Capability {
    pub fn label(&self) -> &'static str {
        match self {
            Capability::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: PrincipalId,
    pub capabilities: BTreeSet<Capability>,
}

impl Principal {
    pub fn member(id: impl Into<String>) -> Self {
        Self {
            id: PrincipalId(id.into()),
            capabilities: BTreeSet::new(),
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        let mut principal = Self::member(id);
        principal.capabilities.insert(Capability::Admin);
        principal
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentPrincipal {
    Anonymous,
    Authenticated(Principal),
}

impl CurrentPrincipal {
    pub fn id(&self) -> Option<&PrincipalId> {
        match self {
            CurrentPrincipal::Anonymous => None,
            CurrentPrincipal::Authenticated(principal) => Some(&principal.id),
        }
    }

    pub fn require(self, capability: Capability) -> Result<Principal, AuthError> {
        match self {
            CurrentPrincipal::Anonymous => Err(AuthError::Unauthenticated),
            CurrentPrincipal::Authenticated(principal) if principal.has(capability) => {
                Ok(principal)
            }
            CurrentPrincipal::Authenticated(principal) => Err(AuthError::Forbidden {
                principal: principal.id.0,
                capability: capability.label(),
            }),
        }
    }
}

/// Caller session carried into every operation; never stored globally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    bearer_token: Option<String>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        Self {
            bearer_token: token,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_principal(
        &self,
        session: &SessionContext,
    ) -> Result<CurrentPrincipal, PortalError>;
}

/// Token table resolver used by the bundled service. Unknown tokens resolve to anonymous.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuth {
    principals: HashMap<String, Principal>,
}

impl StaticTokenAuth {
    pub fn from_admin_tokens(tokens: &BTreeMap<String, String>) -> Self {
        let principals = tokens
            .iter()
            .map(|(token, id)| (token.clone(), Principal::admin(id.clone())))
            .collect();
        Self { principals }
    }

    pub fn with_principal(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.principals.insert(token.into(), principal);
        self
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn current_principal(
        &self,
        session: &SessionContext,
    ) -> Result<CurrentPrincipal, PortalError> {
        let resolved = session
            .token()
            .and_then(|token| self.principals.get(token))
            .cloned()
            .map(CurrentPrincipal::Authenticated)
            .unwrap_or(CurrentPrincipal::Anonymous);
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_reads_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer secret-1"),
        );
        assert_eq!(SessionContext::from_headers(&headers).token(), Some("secret-1"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(SessionContext::from_headers(&headers).token(), None);
    }

    #[test]
    fn require_distinguishes_anonymous_and_forbidden() {
        assert_eq!(
            CurrentPrincipal::Anonymous.require(Capability::Admin),
            Err(AuthError::Unauthenticated)
        );
        let member = CurrentPrincipal::Authenticated(Principal::member("user-1"));
        assert!(matches!(
            member.require(Capability::Admin),
            Err(AuthError::Forbidden { .. })
        ));
        let admin = CurrentPrincipal::Authenticated(Principal::admin("admin-1"));
        assert_eq!(
            admin.require(Capability::Admin).expect("admin").id,
            PrincipalId("admin-1".to_string())
        );
    }

    #[tokio::test]
    async fn static_tokens_resolve_admins() {
        let mut tokens = BTreeMap::new();
        tokens.insert("t-1".to_string(), "admin-1".to_string());
        let auth = StaticTokenAuth::from_admin_tokens(&tokens)
            .with_principal("t-2", Principal::member("user-2"));

        let admin = auth
            .current_principal(&SessionContext::bearer("t-1"))
            .await
            .expect("resolves");
        assert_eq!(admin.id(), Some(&PrincipalId("admin-1".to_string())));

        let unknown = auth
            .current_principal(&SessionContext::bearer("nope"))
            .await
            .expect("resolves");
        assert_eq!(unknown, CurrentPrincipal::Anonymous);
    }
}
