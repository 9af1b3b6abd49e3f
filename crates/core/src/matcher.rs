use std::collections::HashMap;

use crate::domain::grant::{ApprovalGrant, ApprovalLevel, PersonId};
use crate::domain::scope::UnitScope;

/// Highest approval level among the grants whose scope covers the unit.
/// `None` when no grant matches (effective level 0).
pub fn effective_level(grants: &[ApprovalGrant], unit: &UnitScope) -> Option<ApprovalLevel> {
    grants
        .iter()
        .filter(|grant| grant.scope.covers(unit))
        .map(|grant| grant.level)
        .max()
}

/// One person's matching grants collapsed into a single display entry.
/// When a person holds several matching grants for the same level the
/// labels of all of them are shown, most specific first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopedApprover {
    pub person_id: PersonId,
    pub level: ApprovalLevel,
    pub scope_description: String,
}

/// Filters `grants` (already restricted to one level by the caller) down
/// to those covering `unit`, dropping `exclude`, and deduplicates per
/// person. Input order decides output order for distinct people.
pub fn approvers_for_unit(
    grants: &[ApprovalGrant],
    unit: &UnitScope,
    exclude: Option<&PersonId>,
) -> Vec<ScopedApprover> {
    let mut order: Vec<PersonId> = Vec::new();
    let mut matched: HashMap<PersonId, Vec<&ApprovalGrant>> = HashMap::new();

    for grant in grants {
        if !grant.scope.covers(unit) {
            continue;
        }
        if exclude.is_some_and(|person| person == &grant.person_id) {
            continue;
        }
        let entry = matched.entry(grant.person_id.clone()).or_default();
        if entry.is_empty() {
            order.push(grant.person_id.clone());
        }
        entry.push(grant);
    }

    order
        .into_iter()
        .map(|person_id| {
            let mut grants = matched.remove(&person_id).unwrap_or_default();
            grants.sort_by(|left, right| {
                right.scope.specificity().cmp(&left.scope.specificity())
            });
            let level = grants.first().map(|grant| grant.level).unwrap_or(ApprovalLevel::L1);
            let scope_description = grants
                .iter()
                .map(|grant| grant.scope.label())
                .collect::<Vec<_>>()
                .join(", ");
            ScopedApprover { person_id, level, scope_description }
        })
        .collect()
}
