//! Scope catalog
//!
//! Scopes are registered once at startup from a set of [`ScopeProvider`]s,
//! after which the registry is sealed and shared read-only behind an `Arc`.

use crate::error::OAuthError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Ordered set of scope identifiers
pub type ScopeSet = BTreeSet<String>;

/// Parses a space-separated `scope` parameter into a [`ScopeSet`]
pub fn parse_scopes(value: Option<&str>) -> ScopeSet {
    value
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Renders a [`ScopeSet`] as a space-separated `scope` value
pub fn format_scopes(scopes: &ScopeSet) -> String {
    scopes.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}

/// A named permission unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub id: String,
    pub help_text: String,
    pub group: String,
    /// Internal scopes can only be granted to internal clients and tokens
    #[serde(default)]
    pub is_internal: bool,
}

impl Scope {
    pub fn new(
        id: impl Into<String>,
        help_text: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            help_text: help_text.into(),
            group: group.into(),
            is_internal: false,
        }
    }

    pub fn internal(mut self) -> Self {
        self.is_internal = true;
        self
    }
}

/// Source of scopes consumed once at startup
pub trait ScopeProvider: Send + Sync {
    fn scopes(&self) -> Vec<Scope>;
}

impl ScopeProvider for Vec<Scope> {
    fn scopes(&self) -> Vec<Scope> {
        self.clone()
    }
}

/// Scopes every deployment has
pub struct DefaultScopes;

impl ScopeProvider for DefaultScopes {
    fn scopes(&self) -> Vec<Scope> {
        vec![Scope::new(
            "user:email",
            "Allow access to email address (read-only).",
            "user",
        )]
    }
}

#[derive(Debug, Default)]
pub struct ScopeRegistry {
    scopes: BTreeMap<String, Scope>,
    sealed: bool,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scope: Scope) -> Result<(), OAuthError> {
        if self.sealed {
            return Err(OAuthError::RegistrySealed);
        }
        if self.scopes.contains_key(&scope.id) {
            return Err(OAuthError::DuplicateScope(scope.id));
        }
        debug!("Registered scope '{}' in group '{}'", scope.id, scope.group);
        self.scopes.insert(scope.id.clone(), scope);
        Ok(())
    }

    /// Registers every scope of a provider, stopping at the first failure
    pub fn register_provider(&mut self, provider: &dyn ScopeProvider) -> Result<(), OAuthError> {
        for scope in provider.scopes() {
            self.register(scope)?;
        }
        Ok(())
    }

    /// Freezes the registry. Further registrations fail.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn resolve(&self, id: &str) -> Result<&Scope, OAuthError> {
        self.scopes
            .get(id)
            .ok_or_else(|| OAuthError::UnknownScope(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scopes.contains_key(id)
    }

    /// All scopes ordered by group, then id
    pub fn all(&self) -> Vec<&Scope> {
        let mut scopes: Vec<&Scope> = self.scopes.values().collect();
        scopes.sort_by(|a, b| a.group.cmp(&b.group).then_with(|| a.id.cmp(&b.id)));
        scopes
    }

    /// Scopes belonging to one group, ordered by id
    pub fn group(&self, group: &str) -> Vec<&Scope> {
        self.scopes.values().filter(|s| s.group == group).collect()
    }

    /// Checks that every requested scope is registered, and that internal
    /// scopes are only requested when `allow_internal` is set.
    pub fn validate(&self, requested: &ScopeSet, allow_internal: bool) -> Result<(), OAuthError> {
        for id in requested {
            match self.scopes.get(id) {
                None => {
                    return Err(OAuthError::InvalidScope(format!("unknown scope '{id}'")));
                }
                Some(scope) if scope.is_internal && !allow_internal => {
                    return Err(OAuthError::InvalidScope(format!(
                        "scope '{id}' is reserved for internal clients"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Resolves requested ids to their registered scopes, in id order
    pub fn describe(&self, requested: &ScopeSet) -> Vec<Scope> {
        requested
            .iter()
            .filter_map(|id| self.scopes.get(id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ScopeRegistry {
        let mut registry = ScopeRegistry::new();
        registry.register_provider(&DefaultScopes).unwrap();
        registry
            .register(Scope::new("deposit:write", "Upload records", "deposit"))
            .unwrap();
        registry
            .register(Scope::new("deposit:actions", "Publish records", "deposit"))
            .unwrap();
        registry
            .register(Scope::new("admin:tokens", "Manage all tokens", "admin").internal())
            .unwrap();
        registry
    }

    #[test]
    fn test_duplicate_scope_rejected() {
        let mut registry = registry();
        let err = registry
            .register(Scope::new("user:email", "again", "user"))
            .unwrap_err();
        assert!(matches!(err, OAuthError::DuplicateScope(id) if id == "user:email"));
    }

    #[test]
    fn test_sealed_registry_rejects_registration() {
        let mut registry = registry();
        registry.seal();
        assert!(registry.is_sealed());
        assert!(matches!(
            registry.register(Scope::new("late:scope", "", "late")),
            Err(OAuthError::RegistrySealed)
        ));
        // lookups keep working
        assert!(registry.resolve("deposit:write").is_ok());
    }

    #[test]
    fn test_resolve_unknown_scope() {
        let registry = registry();
        assert!(matches!(
            registry.resolve("nope"),
            Err(OAuthError::UnknownScope(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_all_is_ordered_by_group_then_id() {
        let registry = registry();
        let ids: Vec<&str> = registry.all().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["admin:tokens", "deposit:actions", "deposit:write", "user:email"]
        );
    }

    #[test]
    fn test_group_lookup() {
        let registry = registry();
        let ids: Vec<&str> = registry
            .group("deposit")
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["deposit:actions", "deposit:write"]);
        assert!(registry.group("missing").is_empty());
    }

    #[test]
    fn test_validate_rejects_unknown_and_internal() {
        let registry = registry();
        let known = parse_scopes(Some("user:email deposit:write"));
        assert!(registry.validate(&known, false).is_ok());

        let unknown = parse_scopes(Some("user:email bogus"));
        assert!(matches!(
            registry.validate(&unknown, false),
            Err(OAuthError::InvalidScope(_))
        ));

        let internal = parse_scopes(Some("admin:tokens"));
        assert!(matches!(
            registry.validate(&internal, false),
            Err(OAuthError::InvalidScope(_))
        ));
        assert!(registry.validate(&internal, true).is_ok());
    }

    #[test]
    fn test_parse_and_format_scopes() {
        let scopes = parse_scopes(Some("  b:read a:read  b:read "));
        assert_eq!(scopes.len(), 2);
        assert_eq!(format_scopes(&scopes), "a:read b:read");
        assert!(parse_scopes(None).is_empty());
    }
}
