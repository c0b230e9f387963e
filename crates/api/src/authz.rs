//! API-side authorization guard for commands.
//!
//! Authorization runs at the command boundary, before dispatch, so domain
//! aggregates and infra stay auth-agnostic.

use washline_auth::{AuthzError, CommandAuthorization, Permission, authorize};

use crate::context::{PrincipalContext, ShopContext};

/// Check every permission a command requires in the current request context.
pub fn authorize_command<C: CommandAuthorization>(
    shop: &ShopContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = principal.principal(shop);
    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}

/// Check a single read permission.
pub fn authorize_read(
    shop: &ShopContext,
    principal: &PrincipalContext,
    permission: &Permission,
) -> Result<(), AuthzError> {
    authorize(&principal.principal(shop), permission)
}
