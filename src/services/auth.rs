//! Signed-in operator lookup
//!
//! Sign-in and sign-out happen outside salesboard; this module only reads
//! who is currently signed in.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{Result, SalesboardError};

/// Authenticated identity of the current operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
}

impl Principal {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }

    /// Display name, then email, then uid
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.uid)
    }
}

/// Source of the current principal
pub trait AuthProvider: Send + Sync {
    fn current_principal(&self) -> Option<Principal>;
}

impl<T: AuthProvider + ?Sized> AuthProvider for Arc<T> {
    fn current_principal(&self) -> Option<Principal> {
        (**self).current_principal()
    }
}

/// Fail with `Unauthenticated` unless someone is signed in
pub fn require_principal(auth: &dyn AuthProvider) -> Result<Principal> {
    auth.current_principal()
        .ok_or(SalesboardError::Unauthenticated)
}

/// Fixed principal, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    principal: Option<Principal>,
}

impl StaticAuth {
    pub fn signed_in(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    pub fn signed_out() -> Self {
        Self { principal: None }
    }
}

impl AuthProvider for StaticAuth {
    fn current_principal(&self) -> Option<Principal> {
        self.principal.clone()
    }
}

/// Reads the session file left by the sign-in flow on every lookup
#[derive(Debug, Clone)]
pub struct SessionFileAuth {
    path: PathBuf,
}

impl SessionFileAuth {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_session(&self) -> Result<Option<Principal>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        let principal: Principal = serde_json::from_str(&content)
            .map_err(|e| SalesboardError::Config(format!("invalid session file: {}", e)))?;
        if principal.uid.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(principal))
    }
}

impl AuthProvider for SessionFileAuth {
    fn current_principal(&self) -> Option<Principal> {
        match self.read_session() {
            Ok(principal) => principal,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable session");
                None
            }
        }
    }
}
