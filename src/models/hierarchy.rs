use super::user::{Role, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on upward walks. A well-formed chain is at most five deep,
/// the extra headroom covers superadmins onboarding other superadmins.
pub const MAX_HIERARCHY_DEPTH: usize = 16;

/// How a commission recipient was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedVia {
    /// Found on the originating user's own `created_by` chain.
    Hierarchy,
    /// Role missing from the chain; any active user with the role was used.
    Fallback,
    /// The process-wide superadmin.
    Singleton,
}

impl ResolvedVia {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedVia::Hierarchy => "hierarchy",
            ResolvedVia::Fallback => "fallback",
            ResolvedVia::Singleton => "singleton",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: Uuid,
    pub role: Role,
    pub resolved_via: ResolvedVia,
}

/// Outcome of walking the chain for the named commission roles.
#[derive(Debug, Clone, Default)]
pub struct ChainResolution {
    pub recipients: Vec<Recipient>,
    /// Roles at or above the originator that the chain does not contain.
    pub missing: Vec<Role>,
}

impl ChainResolution {
    pub fn recipient(&self, role: Role) -> Option<&Recipient> {
        self.recipients.iter().find(|r| r.role == role)
    }
}

/// A user together with their ancestors, nearest parent first.
#[derive(Debug, Clone)]
pub struct UplineChain {
    origin: User,
    ancestors: Vec<User>,
}

impl UplineChain {
    pub fn new(origin: User, ancestors: Vec<User>) -> Self {
        Self { origin, ancestors }
    }

    pub fn origin(&self) -> &User {
        &self.origin
    }

    pub fn ancestors(&self) -> &[User] {
        &self.ancestors
    }

    /// Nearest ancestor (excluding the origin) holding `role`.
    pub fn nearest(&self, role: Role) -> Option<&User> {
        self.ancestors.iter().find(|u| u.role == role)
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.origin.id == user_id || self.ancestors.iter().any(|u| u.id == user_id)
    }

    /// Resolves the retailer/dealer/master/admin payees.
    ///
    /// The originator fills the bucket of its own role. Walking upward, the
    /// nearest dealer is found first, the nearest master above that dealer
    /// next, then the nearest admin above that master. Roles below the
    /// originator have no payee and are not reported as missing.
    pub fn resolve_commission_roles(&self) -> ChainResolution {
        let mut resolution = ChainResolution::default();
        let origin_role = self.origin.role;
        let mut cursor = 0usize;

        for role in [Role::Retailer, Role::Dealer, Role::Master, Role::Admin] {
            if origin_role.is_above(role) {
                continue;
            }
            if role == origin_role {
                resolution.recipients.push(Recipient {
                    user_id: self.origin.id,
                    role,
                    resolved_via: ResolvedVia::Hierarchy,
                });
                continue;
            }

            let found = self.ancestors[cursor..]
                .iter()
                .position(|u| u.role == role && u.is_active);

            match found {
                Some(offset) => {
                    let user = &self.ancestors[cursor + offset];
                    resolution.recipients.push(Recipient {
                        user_id: user.id,
                        role,
                        resolved_via: ResolvedVia::Hierarchy,
                    });
                    cursor += offset + 1;
                }
                None => resolution.missing.push(role),
            }
        }

        resolution
    }
}

/// Returns true if making `new_parent_chain[0]` the parent of `user_id` would
/// close a loop. `new_parent_chain` is the proposed parent followed by its
/// ancestors.
pub fn would_create_cycle(user_id: Uuid, new_parent_chain: &[Uuid]) -> bool {
    new_parent_chain.iter().any(|id| *id == user_id)
}
