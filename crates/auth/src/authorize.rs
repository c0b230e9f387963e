use serde::Serialize;
use thiserror::Error;

use washline_core::{ShopId, UserId};

use crate::{Permission, Role};

/// Roles and effective grants of a user inside one shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShopMembership {
    pub shop_id: ShopId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

/// A resolved principal acting in `active_shop_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: UserId,
    pub active_shop_id: ShopId,
    pub membership: ShopMembership,
}

impl Principal {
    /// Build a principal whose grants come from the static role policy.
    pub fn from_roles(user_id: UserId, shop_id: ShopId, roles: Vec<Role>) -> Self {
        let permissions = crate::policy::permissions_for_roles(&roles);
        Self {
            user_id,
            active_shop_id: shop_id,
            membership: ShopMembership {
                shop_id,
                roles,
                permissions,
            },
        }
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.membership.roles.contains(role)
    }

    /// Non-failing variant of [`authorize`].
    pub fn can(&self, required: &Permission) -> bool {
        authorize(self, required).is_ok()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("shop mismatch")]
    ShopMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Permissions a command needs; checked by the API before dispatch.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Pure policy check of one permission.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_shop_id != principal.membership.shop_id {
        return Err(AuthzError::ShopMismatch);
    }

    if principal
        .membership
        .permissions
        .iter()
        .any(|grant| grant.grants(required))
    {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions as p;

    #[test]
    fn admin_is_allowed_everything() {
        let principal = Principal::from_roles(UserId::new(), ShopId::new(), vec![Role::ADMIN]);
        assert!(authorize(&principal, &p::BILLS_VOID).is_ok());
        assert!(authorize(&principal, &Permission::for_stage("delivery")).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden_with_its_name() {
        let principal = Principal::from_roles(UserId::new(), ShopId::new(), vec![Role::PACKER]);
        let err = authorize(&principal, &p::REPORTS_VIEW).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("reports.view".to_string()));
    }

    #[test]
    fn membership_of_another_shop_is_rejected() {
        let mut principal = Principal::from_roles(UserId::new(), ShopId::new(), vec![Role::ADMIN]);
        principal.active_shop_id = ShopId::new();
        assert_eq!(
            authorize(&principal, &p::ORDERS_READ),
            Err(AuthzError::ShopMismatch)
        );
    }

    #[test]
    fn can_mirrors_authorize() {
        let principal = Principal::from_roles(UserId::new(), ShopId::new(), vec![Role::RECEPTION]);
        assert!(principal.has_role(&Role::RECEPTION));
        assert!(principal.can(&p::ORDERS_CREATE));
        assert!(!principal.can(&p::BILLS_VOID));
    }
}
