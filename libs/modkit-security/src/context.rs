use std::collections::{BTreeMap, BTreeSet};

use crate::access_scope::ScopeValue;

/// Attribute name that always resolves to the subject identifier.
pub const SUBJECT_ID_ATTRIBUTE: &str = "id";

/// `Identity` describes the caller of a request.
///
/// Built by the authentication layer (outside this library) and passed through
/// the request lifecycle. Scope rules consult it to decide which scope tokens
/// the caller holds and which rows those tokens make visible.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Identity {
    /// Subject ID of the authenticated caller. `None` means anonymous.
    #[serde(default)]
    subject_id: Option<ScopeValue>,
    /// Roles asserted for the caller (e.g. `admin`).
    #[serde(default)]
    roles: BTreeSet<String>,
    /// Free-form attributes consulted by attribute-matching scope rules.
    #[serde(default)]
    attributes: BTreeMap<String, ScopeValue>,
}

impl Identity {
    #[must_use]
    pub fn builder() -> IdentityBuilder {
        IdentityBuilder::default()
    }

    /// Create an anonymous identity with no subject, roles, or attributes.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn subject_id(&self) -> Option<&ScopeValue> {
        self.subject_id.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.subject_id.is_some()
    }

    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Look up an attribute. `id` resolves to the subject identifier.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&ScopeValue> {
        if name == SUBJECT_ID_ATTRIBUTE {
            return self.subject_id.as_ref();
        }
        self.attributes.get(name)
    }
}

#[derive(Default)]
pub struct IdentityBuilder {
    subject_id: Option<ScopeValue>,
    roles: BTreeSet<String>,
    attributes: BTreeMap<String, ScopeValue>,
}

impl IdentityBuilder {
    #[must_use]
    pub fn subject_id(mut self, subject_id: impl Into<ScopeValue>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    #[must_use]
    pub fn role(mut self, role: &str) -> Self {
        self.roles.insert(role.to_owned());
        self
    }

    #[must_use]
    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn attribute(mut self, name: &str, value: impl Into<ScopeValue>) -> Self {
        self.attributes.insert(name.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Identity {
        Identity {
            subject_id: self.subject_id,
            roles: self.roles,
            attributes: self.attributes,
        }
    }
}
