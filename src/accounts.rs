//! Capability checks.
//!
//! Roles are re-read from the store on every check; nothing about a
//! caller's role is cached between requests.

use curie_core::error::{Error, Result};
use tracing::{debug, info};

use crate::context::ServiceContext;

pub const ADMIN_ROLES: [&str; 2] = ["admin", "super_admin"];
pub const KNOWN_ROLES: [&str; 3] = ["user", "admin", "super_admin"];

/// Fail with `Forbidden` unless `account_id` currently holds an admin role.
pub async fn require_admin(ctx: &ServiceContext, account_id: &str) -> Result<()> {
    let role = ctx.accounts.account_role(account_id).await?;
    match role.as_deref() {
        Some(role) if ADMIN_ROLES.contains(&role) => Ok(()),
        other => {
            debug!(account_id, role = ?other, "admin check refused");
            Err(Error::Forbidden(format!(
                "account {} requires an admin role",
                account_id
            )))
        }
    }
}

pub async fn set_role(ctx: &ServiceContext, account_id: &str, role: &str) -> Result<()> {
    if !KNOWN_ROLES.contains(&role) {
        return Err(Error::InvalidRequest(format!(
            "unknown role '{}'; expected one of {}",
            role,
            KNOWN_ROLES.join(", ")
        )));
    }
    ctx.accounts.set_account_role(account_id, role).await?;
    info!(account_id, role, "account role set");
    Ok(())
}
