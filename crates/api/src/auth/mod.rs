//! Authentication: JWT validation and tenant context resolution

mod jwt;
mod middleware;

pub use jwt::{Claims, JwtManager};
pub use middleware::{require_auth, AuthAccount, TenantContext};
