use std::sync::Arc;

use gemba_core::domain::grant::{ApprovalLevel, PersonId};
use gemba_core::domain::scope::UnitScope;
use gemba_core::matcher::{approvers_for_unit, effective_level, ScopedApprover};
use gemba_db::repositories::{GrantRepository, RepositoryError};

/// Authority lookups against the stored grant table. The matching rules
/// themselves are pure (`gemba_core::matcher`); this wrapper only fetches
/// the relevant grants.
pub struct ApprovalRegistry {
    grants: Arc<dyn GrantRepository>,
}

impl ApprovalRegistry {
    pub fn new(grants: Arc<dyn GrantRepository>) -> Self {
        Self { grants }
    }

    /// The person's effective level for a unit: the maximum level over
    /// their grants whose scope covers the unit, `None` when nothing
    /// matches.
    pub async fn effective_level_for(
        &self,
        person_id: &PersonId,
        unit: &UnitScope,
    ) -> Result<Option<ApprovalLevel>, RepositoryError> {
        let grants = self.grants.grants_for_person(person_id).await?;
        Ok(effective_level(&grants, unit))
    }

    /// People holding a grant at exactly `level` whose scope covers the
    /// unit, one entry per person, optionally excluding the acting person.
    pub async fn find_approvers(
        &self,
        level: ApprovalLevel,
        unit: &UnitScope,
        exclude: Option<&PersonId>,
    ) -> Result<Vec<ScopedApprover>, RepositoryError> {
        let grants = self.grants.grants_at_level(level).await?;
        Ok(approvers_for_unit(&grants, unit, exclude))
    }
}
