//! Hierarchical subject paths (`/customer/123`).

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Hierarchical address of an entity stream.
///
/// A subject is a slash-delimited path: it starts with `/`, has no empty
/// segments and contains no whitespace or control characters. `/` alone is the
/// root and addresses every stream. `/a/b` is a descendant of `/a`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subject(String);

impl Subject {
    /// Parse and validate a subject path.
    pub fn new(path: impl Into<String>) -> Result<Self, ClientError> {
        let path = path.into();
        validate(&path)?;
        Ok(Self(path))
    }

    /// The root subject (`/`).
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Path segments, excluding the leading slash.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// The enclosing subject, or `None` for the root.
    pub fn parent(&self) -> Option<Subject> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Whether `self` lies strictly under `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &Subject) -> bool {
        if self == ancestor {
            return false;
        }
        if ancestor.is_root() {
            return true;
        }
        self.0
            .strip_prefix(ancestor.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Whether `self` is `other` or lies under it.
    pub fn covers(&self, other: &Subject) -> bool {
        other == self || other.is_descendant_of(self)
    }
}

fn validate(path: &str) -> Result<(), ClientError> {
    if path.is_empty() {
        return Err(ClientError::validation("subject must not be empty"));
    }
    if !path.starts_with('/') {
        return Err(ClientError::validation(format!(
            "subject '{path}' must start with '/'"
        )));
    }
    if path.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ClientError::validation(format!(
            "subject '{path}' contains whitespace or control characters"
        )));
    }
    if path != "/" && path[1..].split('/').any(str::is_empty) {
        return Err(ClientError::validation(format!(
            "subject '{path}' contains an empty segment"
        )));
    }
    Ok(())
}

impl core::fmt::Display for Subject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Subject {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Subject {
    type Error = ClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Subject {
    type Error = ClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Subject> for String {
    fn from(value: Subject) -> Self {
        value.0
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
