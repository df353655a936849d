use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Reseller role. Ordered from the top of the hierarchy to the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Superadmin,
    Admin,
    Master,
    Dealer,
    Retailer,
}

impl Role {
    /// All roles, top first.
    pub const ALL: [Role; 5] = [
        Role::Superadmin,
        Role::Admin,
        Role::Master,
        Role::Dealer,
        Role::Retailer,
    ];

    /// Depth of the role in the hierarchy. Superadmin is 0.
    pub fn rank(&self) -> u8 {
        match self {
            Role::Superadmin => 0,
            Role::Admin => 1,
            Role::Master => 2,
            Role::Dealer => 3,
            Role::Retailer => 4,
        }
    }

    /// Returns true if `self` sits strictly above `other`.
    pub fn is_above(&self, other: Role) -> bool {
        self.rank() < other.rank()
    }

    /// Superadmin may onboard any role; everyone else only strictly lower roles.
    pub fn can_create(&self, target: Role) -> bool {
        matches!(self, Role::Superadmin) || self.is_above(target)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::Admin => "admin",
            Role::Master => "master",
            Role::Dealer => "dealer",
            Role::Retailer => "retailer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reseller. `created_by` is the parent pointer of the hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub created_by: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, role: Role, created_by: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            role,
            created_by,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_root(&self) -> bool {
        self.created_by.is_none()
    }
}
