use serde::{Deserialize, Serialize};

use crate::model::role::Role;

/// The identity of the active session, as handed over by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
