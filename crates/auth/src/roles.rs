use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Staff role carried in access tokens.
///
/// Roles are opaque strings; unknown roles are accepted and simply grant nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const MANAGER: Role = Role(Cow::Borrowed("manager"));
    pub const RECEPTION: Role = Role(Cow::Borrowed("reception"));
    pub const TAGGER: Role = Role(Cow::Borrowed("tagger"));
    pub const WASHER: Role = Role(Cow::Borrowed("washer"));
    pub const PACKER: Role = Role(Cow::Borrowed("packer"));
    pub const COURIER: Role = Role(Cow::Borrowed("courier"));
    pub const ACCOUNTANT: Role = Role(Cow::Borrowed("accountant"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
