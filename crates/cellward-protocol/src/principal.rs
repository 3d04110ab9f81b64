use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of subject a [`Principal`] identifies (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    Ai,
    Connector,
    Extension,
    Script,
    User,
    System,
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrincipalKind::Ai => "ai",
            PrincipalKind::Connector => "connector",
            PrincipalKind::Extension => "extension",
            PrincipalKind::Script => "script",
            PrincipalKind::User => "user",
            PrincipalKind::System => "system",
        };
        f.write_str(s)
    }
}

/// An opaque `(type, id)` pair identifying the subject of a capability
/// request. No inheritance: two principals are either the same key or
/// unrelated (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Principal {
    #[serde(rename = "type")]
    pub kind: PrincipalKind,
    pub id: String,
}

impl Principal {
    pub fn new(kind: PrincipalKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// The store/grant lookup key, `"type:id"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_type_colon_id() {
        let p = Principal::new(PrincipalKind::Ai, "s1");
        assert_eq!(p.key(), "ai:s1");
    }

    #[test]
    fn distinct_ids_never_collide() {
        let a = Principal::new(PrincipalKind::Ai, "s1");
        let b = Principal::new(PrincipalKind::User, "s1");
        assert_ne!(a.key(), b.key());
    }
}
