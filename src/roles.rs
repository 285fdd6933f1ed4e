//! Role hierarchy and permission gates.
//!
//! owner(100) > manager(80) > salesperson(40). Permission checks compare
//! levels; a user can never remove or demote themselves.

use uuid::Uuid;

use crate::error::GatewayError;
use crate::types::Role;

/// Whether `role` meets the `required` privilege level.
pub fn has_role_level(role: Role, required: Role) -> bool {
    role.level() >= required.level()
}

/// Settings management requires manager or above.
pub fn can_manage_settings(role: Role) -> bool {
    has_role_level(role, Role::Manager)
}

/// Invite management requires manager or above.
pub fn can_manage_invites(role: Role) -> bool {
    has_role_level(role, Role::Manager)
}

/// Role assignment requires owner.
pub fn can_assign_roles(role: Role) -> bool {
    has_role_level(role, Role::Owner)
}

/// Validate a role change performed by `actor` against `target`.
///
/// # Errors
///
/// - `Auth` when the actor lacks the owner gate
/// - `Conflict` when the actor targets themselves
pub fn check_role_change(
    actor_user_id: Uuid,
    actor_role: Role,
    target_user_id: Uuid,
) -> Result<(), GatewayError> {
    if !can_assign_roles(actor_role) {
        return Err(GatewayError::Auth(
            "role assignment requires owner".to_owned(),
        ));
    }
    if actor_user_id == target_user_id {
        return Err(GatewayError::Conflict(
            "cannot change your own role".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_ordering() {
        assert!(has_role_level(Role::Owner, Role::Manager));
        assert!(has_role_level(Role::Manager, Role::Manager));
        assert!(!has_role_level(Role::Salesperson, Role::Manager));
    }

    #[test]
    fn settings_gate_is_manager_plus() {
        assert!(can_manage_settings(Role::Owner));
        assert!(can_manage_settings(Role::Manager));
        assert!(!can_manage_settings(Role::Salesperson));
    }

    #[test]
    fn role_assignment_is_owner_only() {
        assert!(can_assign_roles(Role::Owner));
        assert!(!can_assign_roles(Role::Manager));
    }

    #[test]
    fn self_demotion_rejected() {
        let me = Uuid::new_v4();
        let err = check_role_change(me, Role::Owner, me).expect_err("must fail");
        assert!(matches!(err, GatewayError::Conflict(_)));
    }

    #[test]
    fn non_owner_cannot_assign() {
        let err = check_role_change(Uuid::new_v4(), Role::Manager, Uuid::new_v4())
            .expect_err("must fail");
        assert!(matches!(err, GatewayError::Auth(_)));
    }

    #[test]
    fn owner_can_change_others() {
        assert!(check_role_change(Uuid::new_v4(), Role::Owner, Uuid::new_v4()).is_ok());
    }
}
