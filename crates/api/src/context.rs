use washline_auth::{Principal, Role};
use washline_core::{ShopId, UserId};

/// Shop context for a request.
///
/// Immutable and present on every authenticated route.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ShopContext {
    shop_id: ShopId,
}

impl ShopContext {
    pub fn new(shop_id: ShopId) -> Self {
        Self { shop_id }
    }

    pub fn shop_id(&self) -> ShopId {
        self.shop_id
    }
}

/// Authenticated staff member and their roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Resolve grants from the role policy for `shop`.
    pub fn principal(&self, shop: &ShopContext) -> Principal {
        Principal::from_roles(self.user_id, shop.shop_id(), self.roles.clone())
    }
}
