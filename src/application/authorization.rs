use crate::domain::directory::{Role, User, UserId};
use crate::domain::job_card::JobCard;
use crate::error::{Result, ServiceError};

/// The authenticated identity performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

impl From<&User> for Caller {
    fn from(user: &User) -> Self {
        Self::new(user.id, user.role)
    }
}

/// Boundary check: the caller must hold one of `allowed`.
pub fn require_role(caller: &Caller, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&caller.role) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "user {} with role {:?} is not allowed to perform this action",
            caller.user_id, caller.role
        )))
    }
}

/// Resource-role invariant: a user referenced as manager/mechanic must
/// actually have that role.
pub fn require_user_role(user: &User, role: Role) -> Result<()> {
    if user.role == role {
        Ok(())
    } else {
        Err(ServiceError::InvalidOperation(format!(
            "user {} is not a {role:?}",
            user.id
        )))
    }
}

pub fn is_assigned_mechanic(job_card: &JobCard, caller: &Caller) -> bool {
    caller.role == Role::Mechanic && job_card.mechanic_id == Some(caller.user_id)
}
