//! Building blocks of the versioned update protocol shared by both store backends.
//!
//! An update runs as one transaction: the version guard bumps the primary row only
//! when the caller's expected version still matches, then every declared association
//! is reconciled to its desired set. Any failure rolls the whole unit back.

use itertools::Itertools;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use crate::store::error::StoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Started,
    VersionChecked,
    AssociationsReconciled,
    Committed,
    RolledBack,
}

impl UpdatePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpdatePhase::Committed | UpdatePhase::RolledBack)
    }

    pub fn can_advance_to(&self, next: UpdatePhase) -> bool {
        use UpdatePhase::*;
        match (self, next) {
            (Started, VersionChecked) => true,
            (VersionChecked, AssociationsReconciled) => true,
            (AssociationsReconciled, Committed) => true,
            (current, RolledBack) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdatePhase::Started => "started",
            UpdatePhase::VersionChecked => "version_checked",
            UpdatePhase::AssociationsReconciled => "associations_reconciled",
            UpdatePhase::Committed => "committed",
            UpdatePhase::RolledBack => "rolled_back",
        };
        write!(f, "{}", name)
    }
}

/// Tracks the phase of one update call and logs each transition
#[derive(Debug)]
pub struct PhaseTracker {
    entity: &'static str,
    key: String,
    phase: UpdatePhase,
}

impl PhaseTracker {
    pub fn start(entity: &'static str, key: impl fmt::Display) -> Self {
        let key = key.to_string();
        log::debug!("{} {} update {}", entity, key, UpdatePhase::Started);
        Self {
            entity,
            key,
            phase: UpdatePhase::Started,
        }
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    pub fn advance(&mut self, next: UpdatePhase) {
        if !self.phase.can_advance_to(next) {
            log::warn!(
                "{} {} update: unexpected transition {} -> {}",
                self.entity,
                self.key,
                self.phase,
                next
            );
        }
        log::debug!("{} {} update {}", self.entity, self.key, next);
        self.phase = next;
    }

    /// Record the terminal phase for the outcome of the transaction
    pub fn finish<T>(&mut self, result: StoreResult<T>) -> StoreResult<T> {
        match &result {
            Ok(_) => self.advance(UpdatePhase::Committed),
            Err(err) => {
                self.advance(UpdatePhase::RolledBack);
                log::debug!("{} {} update rolled back: {}", self.entity, self.key, err);
            }
        }
        result
    }
}

/// Rows to remove and add so that a join table holds exactly the desired set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationPlan<M> {
    pub to_delete: Vec<M>,
    pub to_insert: Vec<M>,
}

impl<M> AssociationPlan<M> {
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty() && self.to_insert.is_empty()
    }
}

/// Symmetric difference between the stored and desired association sets.
///
/// Duplicates in `desired` collapse to one row; order of first appearance is kept.
pub fn plan_reconcile<M>(current: &[M], desired: &[M]) -> AssociationPlan<M>
where
    M: Clone + Eq + Hash,
{
    let desired_set: HashSet<&M> = desired.iter().collect();
    let current_set: HashSet<&M> = current.iter().collect();

    AssociationPlan {
        to_delete: current
            .iter()
            .filter(|m| !desired_set.contains(m))
            .unique()
            .cloned()
            .collect(),
        to_insert: desired
            .iter()
            .filter(|m| !current_set.contains(m))
            .unique()
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssignmentMember;
    use crate::store::error::StoreError;

    #[test]
    fn test_plan_adds_and_removes() {
        let plan = plan_reconcile(&[1, 2, 3], &[2, 3, 4]);
        assert_eq!(plan.to_delete, vec![1]);
        assert_eq!(plan.to_insert, vec![4]);
    }

    #[test]
    fn test_plan_empty_desired_clears_everything() {
        let plan = plan_reconcile(&[1, 2], &[]);
        assert_eq!(plan.to_delete, vec![1, 2]);
        assert!(plan.to_insert.is_empty());
    }

    #[test]
    fn test_plan_same_set_is_noop() {
        let plan = plan_reconcile(&[5, 7], &[7, 5]);
        assert!(plan.is_noop());
    }

    #[test]
    fn test_plan_collapses_duplicate_desired_members() {
        let plan = plan_reconcile(&[], &[9, 9, 3]);
        assert_eq!(plan.to_insert, vec![9, 3]);
    }

    #[test]
    fn test_plan_with_composite_members() {
        let current = vec![AssignmentMember::new("abcd1234", 1), AssignmentMember::new("efgh5678", 2)];
        let desired = vec![AssignmentMember::new("abcd1234", 1), AssignmentMember::new("abcd1234", 2)];
        let plan = plan_reconcile(&current, &desired);
        assert_eq!(plan.to_delete, vec![AssignmentMember::new("efgh5678", 2)]);
        assert_eq!(plan.to_insert, vec![AssignmentMember::new("abcd1234", 2)]);
    }

    #[test]
    fn test_phase_transitions() {
        use UpdatePhase::*;
        assert!(Started.can_advance_to(VersionChecked));
        assert!(VersionChecked.can_advance_to(AssociationsReconciled));
        assert!(AssociationsReconciled.can_advance_to(Committed));
        assert!(Started.can_advance_to(RolledBack));
        assert!(VersionChecked.can_advance_to(RolledBack));
        assert!(!Started.can_advance_to(Committed));
        assert!(!Committed.can_advance_to(RolledBack));
        assert!(!RolledBack.can_advance_to(Started));
    }

    #[test]
    fn test_tracker_records_outcome() {
        let mut tracker = PhaseTracker::start("project", 24001);
        tracker.advance(UpdatePhase::VersionChecked);
        let result: StoreResult<()> = tracker.finish(Err(StoreError::EditConflict));
        assert!(matches!(result, Err(StoreError::EditConflict)));
        assert_eq!(tracker.phase(), UpdatePhase::RolledBack);

        let mut tracker = PhaseTracker::start("client", 1);
        tracker.advance(UpdatePhase::VersionChecked);
        tracker.advance(UpdatePhase::AssociationsReconciled);
        assert_eq!(tracker.finish(Ok(3)).unwrap(), 3);
        assert_eq!(tracker.phase(), UpdatePhase::Committed);
    }
}
