use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;

/// Roles in ascending order of privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Learner,
    Manager,
    Admin,
}

impl Role {
    fn parse(s: &str) -> Option<Role> {
        match s {
            "learner" => Some(Role::Learner),
            "manager" => Some(Role::Manager),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Identity established by the fronting auth layer (session verification is
/// an external collaborator). It forwards the resolved user as trusted
/// `x-user-id` / `x-user-role` headers; requests arriving without them have
/// no session.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub role: Role,
}

impl CurrentUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    /// Recipient-or-elevated-role visibility used by certificate reads.
    pub fn can_view_user(&self, owner: Uuid) -> bool {
        self.id == owner || self.role >= Role::Manager
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or(AppError::Unauthorized)?;
        let role = parts
            .headers
            .get("x-user-role")
            .and_then(|v| v.to_str().ok())
            .and_then(Role::parse)
            .ok_or(AppError::Unauthorized)?;
        Ok(CurrentUser { id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_matches_privilege() {
        assert!(Role::Admin > Role::Manager);
        assert!(Role::Manager > Role::Learner);
    }

    #[test]
    fn manager_can_view_other_users() {
        let manager = CurrentUser { id: Uuid::new_v4(), role: Role::Manager };
        assert!(manager.can_view_user(Uuid::new_v4()));

        let learner = CurrentUser { id: Uuid::new_v4(), role: Role::Learner };
        assert!(learner.can_view_user(learner.id));
        assert!(!learner.can_view_user(Uuid::new_v4()));
    }
}
