//! Principal identity types and role canonicalization.
//!
//! The portal backend reports roles in two textual encodings (Russian and
//! English spellings). Everything past this module sees only canonical
//! tokens; an unrecognized spelling is carried as [`Role::Other`] and
//! matches no authorization check.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Canonical role of the current principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    /// Back-office manager: reviews and updates deal registrations.
    Manager,
    /// Standard partner user: submits deal registrations.
    User,
    /// Unrecognized spelling, uppercased and passed through unchanged.
    /// Matches no known role, so authorization checks fail closed.
    Other(String),
}

impl Role {
    /// Normalize a raw role string from the backend or a persisted record.
    ///
    /// Uppercases the input, then maps the bilingual synonym table onto
    /// canonical tokens. Anything else is kept as [`Role::Other`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        match upper.as_str() {
            "MANAGER" | "МЕНЕДЖЕР" => Self::Manager,
            "USER" | "ПОЛЬЗОВАТЕЛЬ" => Self::User,
            _ => Self::Other(upper),
        }
    }

    /// Canonical token for this role.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Manager => "MANAGER",
            Self::User => "USER",
            Self::Other(raw) => raw,
        }
    }

    #[must_use]
    pub fn is_manager(&self) -> bool {
        matches!(self, Self::Manager)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.trim().is_empty() {
            return Err(D::Error::custom("empty role"));
        }
        Ok(Self::parse(&raw))
    }
}

/// Linked partner organization of the current principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerOrg {
    pub id: i64,
    pub name: String,
    /// Accreditation status as reported by the back office.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Normalized snapshot of who the current principal is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner: Option<PartnerOrg>,
}

/// Raw `/api/me` payload shape.
///
/// `id` and `role` are required; a 200 response missing either fails
/// structural validation and is handled as a transient fault, not a
/// rejection. Unknown fields are tolerated.
#[derive(Debug, Deserialize)]
struct MePayload {
    id: i64,
    role: Role,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    partner: Option<PartnerOrg>,
}

/// Validate a successful `/api/me` body and normalize it into a
/// [`SessionRecord`].
///
/// # Errors
///
/// Returns the deserialization error when the payload is structurally
/// invalid (missing or non-string role, missing id).
pub fn validate_me_payload(body: serde_json::Value) -> Result<SessionRecord, serde_json::Error> {
    let payload: MePayload = serde_json::from_value(body)?;
    Ok(SessionRecord {
        id: payload.id,
        name: payload.name.unwrap_or_default(),
        email: payload.email,
        phone: payload.phone,
        role: payload.role,
        partner: payload.partner,
    })
}
