// src/session.rs

use crate::error::AppError;

/// The acting user of a request, if any. A session identifies at most one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    pub user_id: Option<i64>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn user(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    /// The acting user, or `Unauthenticated` for writes without a session.
    pub fn require_user(&self) -> Result<i64, AppError> {
        self.user_id
            .ok_or_else(|| AppError::Unauthenticated("Login required".to_string()))
    }
}
