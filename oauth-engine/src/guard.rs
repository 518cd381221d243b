//! Scope checks for protected resources

use crate::error::OAuthError;
use crate::models::AuthContext;
use crate::scope::{ScopeRegistry, ScopeSet};

/// Required scopes of a protected resource.
///
/// An empty requirement only demands that the request is authenticated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeGuard {
    required: ScopeSet,
}

impl ScopeGuard {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
        }
    }

    /// Requires every scope of a registry group
    pub fn for_group(registry: &ScopeRegistry, group: &str) -> Self {
        Self::new(registry.group(group).into_iter().map(|scope| scope.id.clone()))
    }

    pub fn required(&self) -> &ScopeSet {
        &self.required
    }

    pub fn authorize(&self, ctx: &AuthContext) -> Result<(), OAuthError> {
        authorize(ctx, &self.required)
    }
}

/// Checks that `ctx` is authenticated and holds every scope in `required`
pub fn authorize(ctx: &AuthContext, required: &ScopeSet) -> Result<(), OAuthError> {
    let granted = ctx
        .granted_scopes()
        .ok_or(OAuthError::AuthenticationRequired)?;
    let missing: Vec<String> = required.difference(granted).cloned().collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(OAuthError::InsufficientScope { missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CredentialSource, Principal};
    use crate::scope::{parse_scopes, Scope};

    fn authenticated(scopes: &str) -> AuthContext {
        AuthContext::Authenticated(Principal {
            user_id: Some("u1".to_string()),
            client_id: Some("c1".to_string()),
            scopes: parse_scopes(Some(scopes)),
            is_personal: false,
            is_internal: false,
            source: CredentialSource::BearerHeader,
        })
    }

    #[test]
    fn test_anonymous_requires_authentication() {
        let guard = ScopeGuard::new(["read"]);
        assert!(matches!(
            guard.authorize(&AuthContext::Anonymous),
            Err(OAuthError::AuthenticationRequired)
        ));
        assert!(matches!(
            ScopeGuard::default().authorize(&AuthContext::Anonymous),
            Err(OAuthError::AuthenticationRequired)
        ));
    }

    #[test]
    fn test_subset_is_accepted() {
        let guard = ScopeGuard::new(["read"]);
        assert!(guard.authorize(&authenticated("read write")).is_ok());
        assert!(ScopeGuard::default().authorize(&authenticated("")).is_ok());
    }

    #[test]
    fn test_missing_scopes_are_all_reported() {
        let guard = ScopeGuard::new(["user:write", "email:read", "read"]);
        match guard.authorize(&authenticated("read")) {
            Err(OAuthError::InsufficientScope { missing }) => {
                assert_eq!(missing, vec!["email:read", "user:write"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_for_group() {
        let mut registry = ScopeRegistry::new();
        registry
            .register(Scope::new("deposit:write", "", "deposit"))
            .unwrap();
        registry
            .register(Scope::new("deposit:actions", "", "deposit"))
            .unwrap();
        registry.register(Scope::new("user:email", "", "user")).unwrap();

        let guard = ScopeGuard::for_group(&registry, "deposit");
        assert_eq!(guard.required(), &parse_scopes(Some("deposit:actions deposit:write")));
        assert!(guard.authorize(&authenticated("deposit:write")).is_err());
        assert!(guard
            .authorize(&authenticated("deposit:write deposit:actions"))
            .is_ok());
    }
}
