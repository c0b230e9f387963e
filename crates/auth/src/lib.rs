//! `washline-auth`: who may do what inside a shop.
//!
//! Decoupled from HTTP and storage: the API derives a [`Principal`] from verified
//! [`JwtClaims`] and the role [`policy`], then calls [`authorize`] per command.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod policy;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, Principal, ShopMembership, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator, encode_hs256};
pub use permissions::Permission;
pub use policy::{permissions_for_role, permissions_for_roles};
pub use roles::Role;
