//! Ownership guard.
//!
//! A mutation of an existing ad or comment is allowed for its owner and for
//! any administrator. Nobody else gets through.

use crate::error::{Result, ServerError};
use crate::identity::{Identity, IdentityId, Role};

/// Outcome of [`authorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Decide whether `acting` may mutate a resource owned by `owner`.
pub fn authorize(owner: IdentityId, acting: &Identity) -> Decision {
    match (acting.id == owner, acting.role) {
        (true, _) | (_, Role::Administrator) => Decision::Allow,
        (false, Role::Member) => Decision::Deny,
    }
}

/// Run [`authorize`] and turn a denial into [`ServerError::Forbidden`].
pub fn ensure(
    owner: IdentityId,
    acting: &Identity,
    resource: &'static str,
) -> Result<()> {
    match authorize(owner, acting) {
        Decision::Allow => Ok(()),
        Decision::Deny => {
            metrics::counter!("authorization_denied_total", "resource" => resource)
                .increment(1);
            tracing::warn!(
                %resource,
                %owner,
                user_id = %acting.id,
                "ownership check denied"
            );
            Err(ServerError::Forbidden { resource })
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: i32, role: Role) -> Identity {
        Identity {
            id: IdentityId(id),
            email: format!("user{id}@adboard.local"),
            password_hash: String::new(),
            first_name: "Ivan".into(),
            last_name: "Petrov".into(),
            phone: "+7 (900) 000-00-00".into(),
            role,
            avatar: None,
        }
    }

    #[test]
    fn test_owner_is_allowed() {
        for role in [Role::Member, Role::Administrator] {
            assert_eq!(authorize(IdentityId(1), &identity(1, role)), Decision::Allow);
        }
    }

    #[test]
    fn test_administrator_is_allowed() {
        for owner in [1, 2, 42] {
            assert_eq!(
                authorize(IdentityId(owner), &identity(99, Role::Administrator)),
                Decision::Allow
            );
        }
    }

    #[test]
    fn test_stranger_is_denied() {
        let stranger = identity(2, Role::Member);
        assert_eq!(authorize(IdentityId(1), &stranger), Decision::Deny);
        assert!(matches!(
            ensure(IdentityId(1), &stranger, "ad"),
            Err(ServerError::Forbidden { resource: "ad" })
        ));
    }
}
