//! Assignment Hierarchy Resolver
//!
//! Single authority for the Marketer → Admin → SuperAdmin forest. Owns edge
//! creation, reassignment and reviewer-chain resolution; nothing else in the
//! crate reads assignments directly.
//!
//! Authorization for edge changes:
//! - MasterAdmin may manage any edge.
//! - SuperAdmin may manage Marketer → Admin edges whose target Admin sits
//!   under that SuperAdmin.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use fieldforce_types::{Actor, Assignment, AssignmentKind, Role, User};

use crate::config::MIN_CHAIN_DEPTH;
use crate::error::{MissingLink, Result, VerificationError};
use crate::store::VerificationStore;

/// The accountable reviewers for one marketer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReviewerChain {
    pub admin_id: Uuid,
    pub super_admin_id: Uuid,
    pub admin_assignment_id: Uuid,
    pub super_admin_assignment_id: Uuid,
}

impl ReviewerChain {
    /// The edges a submission opened against this chain depends on.
    pub fn edges(&self) -> [Uuid; 2] {
        [self.admin_assignment_id, self.super_admin_assignment_id]
    }
}

/// Outcome of `reassign`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reassignment {
    pub old_superior_id: Option<Uuid>,
    pub new_superior_id: Uuid,
    /// Subordinates now under a different SuperAdmin through the moved edge.
    pub affected_count: usize,
}

pub struct HierarchyResolver {
    store: Arc<dyn VerificationStore>,
    max_chain_depth: usize,
}

impl HierarchyResolver {
    /// `max_chain_depth` is raised to [`MIN_CHAIN_DEPTH`] if lower, so a
    /// legal forest never trips the walk limit.
    pub fn new(store: Arc<dyn VerificationStore>, max_chain_depth: usize) -> Self {
        Self {
            store,
            max_chain_depth: max_chain_depth.max(MIN_CHAIN_DEPTH),
        }
    }

    /// Create an edge. Fails if the subordinate already has one of this kind.
    pub async fn assign(
        &self,
        subordinate_id: Uuid,
        superior_id: Uuid,
        kind: AssignmentKind,
        actor: Actor,
    ) -> Result<Assignment> {
        let (subordinate, superior) = self
            .validate_edge(subordinate_id, superior_id, kind)
            .await?;
        self.authorize(actor, kind, superior.id).await?;

        if let Some(existing) = self.store.active_assignment(subordinate.id, kind).await? {
            return Err(VerificationError::AlreadyAssigned {
                subordinate_id,
                superior_id: existing.superior_id,
                kind,
            });
        }

        let edge = Assignment::new(subordinate.id, superior.id, kind, actor.id);
        // Store deactivates any prior edge under its own guard; here there is
        // none, so a racing assign surfaces as Conflict.
        self.store.replace_assignment(&edge, None).await?;

        info!(
            "Assigned {} {} to {} {} ({})",
            subordinate.role, subordinate.id, superior.role, superior.id, kind
        );
        Ok(edge)
    }

    /// Deactivate the subordinate's edge of this kind. No-op if absent.
    pub async fn unassign(&self, subordinate_id: Uuid, kind: AssignmentKind, actor: Actor) -> Result<()> {
        let Some(edge) = self.store.active_assignment(subordinate_id, kind).await? else {
            debug!("No active {} edge for {}; unassign is a no-op", kind, subordinate_id);
            return Ok(());
        };
        self.authorize(actor, kind, edge.superior_id).await?;

        if self
            .store
            .deactivate_assignment(edge.assignment_id, actor.id, Utc::now())
            .await?
        {
            info!(
                "Unassigned {} from {} ({})",
                subordinate_id, edge.superior_id, kind
            );
        }
        Ok(())
    }

    /// Move a Marketer to a new Admin, or an Admin to a new SuperAdmin.
    ///
    /// Marketers under a moved Admin keep their own rows; they follow the
    /// Admin to the new SuperAdmin through chain resolution.
    pub async fn reassign(
        &self,
        subordinate_id: Uuid,
        new_superior_id: Uuid,
        actor: Actor,
    ) -> Result<Reassignment> {
        let subordinate = self.user(subordinate_id).await?;
        let superior = self.user(new_superior_id).await?;
        // Infer from the subordinate; fall back to the superior's side so a
        // bad pairing still reports both real roles below.
        let kind = AssignmentKind::for_subordinate(subordinate.role)
            .or_else(|| AssignmentKind::for_superior(superior.role))
            .unwrap_or(AssignmentKind::AdminToSuperAdmin);
        let (_, superior) = self
            .validate_edge(subordinate_id, new_superior_id, kind)
            .await?;
        self.authorize(actor, kind, superior.id).await?;

        let current = self.store.active_assignment(subordinate_id, kind).await?;
        if let Some(edge) = &current {
            // Moving away also requires authority over the old branch.
            self.authorize(actor, kind, edge.superior_id).await?;
            if edge.superior_id == new_superior_id {
                debug!(
                    "{} already under {}; reassign is a no-op",
                    subordinate_id, new_superior_id
                );
                return Ok(Reassignment {
                    old_superior_id: Some(new_superior_id),
                    new_superior_id,
                    affected_count: 0,
                });
            }
        }

        let edge = Assignment::new(subordinate_id, new_superior_id, kind, actor.id);
        self.store
            .replace_assignment(&edge, current.as_ref().map(|e| e.assignment_id))
            .await?;

        let affected_count = match kind {
            AssignmentKind::MarketerToAdmin => 0,
            AssignmentKind::AdminToSuperAdmin => self
                .store
                .active_subordinates(subordinate_id, AssignmentKind::MarketerToAdmin)
                .await?
                .len(),
        };

        let old_superior_id = current.map(|e| e.superior_id);
        info!(
            "Reassigned {} {} from {:?} to {} ({} downstream)",
            subordinate.role, subordinate_id, old_superior_id, new_superior_id, affected_count
        );
        Ok(Reassignment {
            old_superior_id,
            new_superior_id,
            affected_count,
        })
    }

    /// Resolve the live reviewer chain for a marketer.
    pub async fn resolve_chain(&self, marketer_id: Uuid) -> Result<ReviewerChain> {
        let marketer = self.user(marketer_id).await?;
        expect_role(&marketer, Role::Marketer)?;

        let admin_edge = self
            .store
            .active_assignment(marketer_id, AssignmentKind::MarketerToAdmin)
            .await?
            .ok_or(VerificationError::IncompleteHierarchy {
                marketer_id,
                missing: MissingLink::Admin,
            })?;

        let super_edge = self
            .store
            .active_assignment(admin_edge.superior_id, AssignmentKind::AdminToSuperAdmin)
            .await?
            .ok_or(VerificationError::IncompleteHierarchy {
                marketer_id,
                missing: MissingLink::SuperAdmin {
                    admin_id: admin_edge.superior_id,
                },
            })?;

        Ok(ReviewerChain {
            admin_id: admin_edge.superior_id,
            super_admin_id: super_edge.superior_id,
            admin_assignment_id: admin_edge.assignment_id,
            super_admin_assignment_id: super_edge.assignment_id,
        })
    }

    pub async fn list_subordinates(
        &self,
        superior_id: Uuid,
        kind: AssignmentKind,
    ) -> Result<BTreeSet<Uuid>> {
        Ok(self
            .store
            .active_subordinates(superior_id, kind)
            .await?
            .into_iter()
            .map(|e| e.subordinate_id)
            .collect())
    }

    /// Every user of `role`, optionally narrowed to one location. No capacity
    /// limits apply.
    pub async fn list_available_superiors(
        &self,
        role: Role,
        location: Option<&str>,
    ) -> Result<BTreeSet<Uuid>> {
        Ok(self
            .store
            .users_by_role(role)
            .await?
            .into_iter()
            .filter(|u| location.map_or(true, |loc| u.location.as_deref() == Some(loc)))
            .map(|u| u.id)
            .collect())
    }

    pub async fn assignment_history(
        &self,
        subordinate_id: Uuid,
        kind: AssignmentKind,
    ) -> Result<Vec<Assignment>> {
        Ok(self.store.assignment_history(subordinate_id, kind).await?)
    }

    // ── internals ──

    async fn user(&self, id: Uuid) -> Result<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or(VerificationError::NotFound { entity: "user", id })
    }

    /// Cycle, existence and role checks shared by assign and reassign.
    async fn validate_edge(
        &self,
        subordinate_id: Uuid,
        superior_id: Uuid,
        kind: AssignmentKind,
    ) -> Result<(User, User)> {
        if subordinate_id == superior_id {
            return Err(VerificationError::CycleDetected {
                subordinate_id,
                superior_id,
            });
        }

        let subordinate = self.user(subordinate_id).await?;
        let superior = self.user(superior_id).await?;

        if subordinate.role != kind.subordinate_role() || superior.role != kind.superior_role() {
            return Err(VerificationError::InvalidHierarchy {
                subordinate_id,
                subordinate_role: subordinate.role,
                superior_id,
                superior_role: superior.role,
                kind,
            });
        }

        if self.chain_contains(superior_id, subordinate_id).await? {
            return Err(VerificationError::CycleDetected {
                subordinate_id,
                superior_id,
            });
        }

        Ok((subordinate, superior))
    }

    /// Walk active edges upward from `start`; true if `target` is reached.
    async fn chain_contains(&self, start: Uuid, target: Uuid) -> Result<bool> {
        let mut cursor = start;
        for _ in 0..self.max_chain_depth {
            let Some(user) = self.store.get_user(cursor).await? else {
                return Ok(false);
            };
            let Some(kind) = AssignmentKind::for_subordinate(user.role) else {
                return Ok(false);
            };
            let Some(edge) = self.store.active_assignment(cursor, kind).await? else {
                return Ok(false);
            };
            if edge.superior_id == target {
                return Ok(true);
            }
            cursor = edge.superior_id;
        }
        // Deeper than any legal forest: treat as corrupt and refuse.
        Ok(true)
    }

    async fn authorize(&self, actor: Actor, kind: AssignmentKind, superior_id: Uuid) -> Result<()> {
        match (actor.role, kind) {
            (Role::MasterAdmin, _) => Ok(()),
            (Role::SuperAdmin, AssignmentKind::MarketerToAdmin) => {
                let admin_parent = self
                    .store
                    .active_assignment(superior_id, AssignmentKind::AdminToSuperAdmin)
                    .await?;
                match admin_parent {
                    Some(edge) if edge.superior_id == actor.id => Ok(()),
                    _ => Err(VerificationError::wrong_actor(
                        actor.id,
                        format!("admin {} is not under this super admin", superior_id),
                    )),
                }
            }
            (Role::SuperAdmin, AssignmentKind::AdminToSuperAdmin) => Err(
                VerificationError::wrong_actor(actor.id, "only a master admin may move admins"),
            ),
            (Role::Marketer | Role::Admin, _) => Err(VerificationError::wrong_actor(
                actor.id,
                format!("{} may not change assignments", actor.role),
            )),
        }
    }
}

pub(crate) fn expect_role(user: &User, expected: Role) -> Result<()> {
    if user.role != expected {
        return Err(VerificationError::WrongRole {
            id: user.id,
            expected,
            actual: user.role,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    struct Forest {
        store: Arc<MemoryStore>,
        resolver: HierarchyResolver,
        master: Actor,
        marketer: User,
        admin: User,
        super_admin: User,
    }

    async fn forest() -> Forest {
        let store = Arc::new(MemoryStore::new());
        let master = User::new(Role::MasterAdmin, "Root");
        let marketer = User::new(Role::Marketer, "Mo");
        let admin = User::new(Role::Admin, "Ada");
        let super_admin = User::new(Role::SuperAdmin, "Sam");
        for u in [&master, &marketer, &admin, &super_admin] {
            store.insert_user(u.clone()).await;
        }
        let resolver = HierarchyResolver::new(store.clone(), 8);
        Forest {
            store,
            resolver,
            master: master.actor(),
            marketer,
            admin,
            super_admin,
        }
    }

    #[tokio::test]
    async fn test_resolve_chain_reports_missing_links() {
        let f = forest().await;

        let err = f.resolver.resolve_chain(f.marketer.id).await.unwrap_err();
        assert!(matches!(
            err,
            VerificationError::IncompleteHierarchy {
                missing: MissingLink::Admin,
                ..
            }
        ));

        f.resolver
            .assign(f.marketer.id, f.admin.id, AssignmentKind::MarketerToAdmin, f.master)
            .await
            .unwrap();
        let err = f.resolver.resolve_chain(f.marketer.id).await.unwrap_err();
        assert!(matches!(
            err,
            VerificationError::IncompleteHierarchy {
                missing: MissingLink::SuperAdmin { admin_id },
                ..
            } if admin_id == f.admin.id
        ));

        f.resolver
            .assign(f.admin.id, f.super_admin.id, AssignmentKind::AdminToSuperAdmin, f.master)
            .await
            .unwrap();
        let chain = f.resolver.resolve_chain(f.marketer.id).await.unwrap();
        assert_eq!(chain.admin_id, f.admin.id);
        assert_eq!(chain.super_admin_id, f.super_admin.id);
    }

    #[tokio::test]
    async fn test_resolve_chain_unknown_user_is_not_found() {
        let f = forest().await;
        let err = f.resolver.resolve_chain(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn test_assign_rejects_mismatched_roles() {
        let f = forest().await;
        let err = f
            .resolver
            .assign(f.super_admin.id, f.admin.id, AssignmentKind::MarketerToAdmin, f.master)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::InvalidHierarchy { .. }));
    }

    #[tokio::test]
    async fn test_shallow_depth_limit_still_allows_legal_chain() {
        let f = forest().await;
        let resolver = HierarchyResolver::new(f.store.clone(), 1);

        resolver
            .assign(f.admin.id, f.super_admin.id, AssignmentKind::AdminToSuperAdmin, f.master)
            .await
            .unwrap();
        resolver
            .assign(f.marketer.id, f.admin.id, AssignmentKind::MarketerToAdmin, f.master)
            .await
            .unwrap();

        let chain = resolver.resolve_chain(f.marketer.id).await.unwrap();
        assert_eq!(chain.admin_id, f.admin.id);
        assert_eq!(chain.super_admin_id, f.super_admin.id);
    }

    #[tokio::test]
    async fn test_assign_self_is_cycle() {
        let f = forest().await;
        let err = f
            .resolver
            .assign(f.admin.id, f.admin.id, AssignmentKind::AdminToSuperAdmin, f.master)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::CycleDetected { .. }));
    }

    #[tokio::test]
    async fn test_assign_twice_requires_unassign() {
        let f = forest().await;
        let other_admin = User::new(Role::Admin, "Bea");
        f.store.insert_user(other_admin.clone()).await;

        f.resolver
            .assign(f.marketer.id, f.admin.id, AssignmentKind::MarketerToAdmin, f.master)
            .await
            .unwrap();
        let err = f
            .resolver
            .assign(f.marketer.id, other_admin.id, AssignmentKind::MarketerToAdmin, f.master)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VerificationError::AlreadyAssigned { superior_id, .. } if superior_id == f.admin.id
        ));

        f.resolver
            .unassign(f.marketer.id, AssignmentKind::MarketerToAdmin, f.master)
            .await
            .unwrap();
        // Idempotent.
        f.resolver
            .unassign(f.marketer.id, AssignmentKind::MarketerToAdmin, f.master)
            .await
            .unwrap();
        f.resolver
            .assign(f.marketer.id, other_admin.id, AssignmentKind::MarketerToAdmin, f.master)
            .await
            .unwrap();

        let history = f
            .resolver
            .assignment_history(f.marketer.id, AssignmentKind::MarketerToAdmin)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|a| a.active).count(), 1);
    }

    #[tokio::test]
    async fn test_super_admin_may_only_manage_own_admins() {
        let f = forest().await;
        let foreign_admin = User::new(Role::Admin, "Foreign");
        f.store.insert_user(foreign_admin.clone()).await;
        f.resolver
            .assign(f.admin.id, f.super_admin.id, AssignmentKind::AdminToSuperAdmin, f.master)
            .await
            .unwrap();

        let sa = f.super_admin.actor();
        f.resolver
            .assign(f.marketer.id, f.admin.id, AssignmentKind::MarketerToAdmin, sa)
            .await
            .unwrap();

        let err = f
            .resolver
            .reassign(f.marketer.id, foreign_admin.id, sa)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::WrongActor { .. }));

        let err = f
            .resolver
            .assign(f.admin.id, f.super_admin.id, AssignmentKind::AdminToSuperAdmin, f.admin.actor())
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::WrongActor { .. }));
    }

    #[tokio::test]
    async fn test_reassign_admin_moves_chain_for_marketers() {
        let f = forest().await;
        let new_sa = User::new(Role::SuperAdmin, "Sol");
        let second_marketer = User::new(Role::Marketer, "Mia");
        f.store.insert_user(new_sa.clone()).await;
        f.store.insert_user(second_marketer.clone()).await;

        for m in [f.marketer.id, second_marketer.id] {
            f.resolver
                .assign(m, f.admin.id, AssignmentKind::MarketerToAdmin, f.master)
                .await
                .unwrap();
        }
        f.resolver
            .assign(f.admin.id, f.super_admin.id, AssignmentKind::AdminToSuperAdmin, f.master)
            .await
            .unwrap();
        let before = f
            .resolver
            .assignment_history(f.marketer.id, AssignmentKind::MarketerToAdmin)
            .await
            .unwrap();

        let moved = f.resolver.reassign(f.admin.id, new_sa.id, f.master).await.unwrap();
        assert_eq!(moved.old_superior_id, Some(f.super_admin.id));
        assert_eq!(moved.new_superior_id, new_sa.id);
        assert_eq!(moved.affected_count, 2);

        for m in [f.marketer.id, second_marketer.id] {
            let chain = f.resolver.resolve_chain(m).await.unwrap();
            assert_eq!(chain.super_admin_id, new_sa.id);
            assert_eq!(chain.admin_id, f.admin.id);
        }
        let after = f
            .resolver
            .assignment_history(f.marketer.id, AssignmentKind::MarketerToAdmin)
            .await
            .unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_reassign_to_same_superior_is_noop() {
        let f = forest().await;
        f.resolver
            .assign(f.marketer.id, f.admin.id, AssignmentKind::MarketerToAdmin, f.master)
            .await
            .unwrap();
        let same = f.resolver.reassign(f.marketer.id, f.admin.id, f.master).await.unwrap();
        assert_eq!(same.affected_count, 0);
        assert_eq!(
            f.resolver
                .assignment_history(f.marketer.id, AssignmentKind::MarketerToAdmin)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_list_available_superiors_filters_by_location() {
        let f = forest().await;
        let lagos = User::new(Role::Admin, "Lagos admin").with_location("Lagos");
        f.store.insert_user(lagos.clone()).await;

        let all = f
            .resolver
            .list_available_superiors(Role::Admin, None)
            .await
            .unwrap();
        assert!(all.contains(&lagos.id) && all.contains(&f.admin.id));

        let in_lagos = f
            .resolver
            .list_available_superiors(Role::Admin, Some("Lagos"))
            .await
            .unwrap();
        assert_eq!(in_lagos.into_iter().collect::<Vec<_>>(), vec![lagos.id]);
    }
}
