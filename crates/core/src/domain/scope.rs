use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Physical location of a production unit: plant, then optionally area,
/// line, and machine. A ticket always carries a fully resolved scope; an
/// approval grant may leave trailing fields unspecified, meaning it applies
/// to every child under the last specified node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitScope {
    pub plant: String,
    pub area: Option<String>,
    pub line: Option<String>,
    pub machine: Option<String>,
}

impl UnitScope {
    pub fn plant(plant: impl Into<String>) -> Self {
        Self { plant: plant.into(), area: None, line: None, machine: None }
    }

    pub fn new(
        plant: impl Into<String>,
        area: Option<String>,
        line: Option<String>,
        machine: Option<String>,
    ) -> Self {
        Self { plant: plant.into(), area, line, machine }
    }

    /// Plant is the one field every scope must carry; a scope without it
    /// can never match anything.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.plant.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "unit scope requires a plant".to_string(),
            ));
        }
        Ok(())
    }

    /// Structural partial match of a grant scope (`self`) against a unit
    /// scope. Every field the grant specifies must equal the unit's field;
    /// an unspecified field matches anything. Plant must match on both
    /// sides. This is evaluated field-by-field, not as a textual prefix.
    pub fn covers(&self, unit: &UnitScope) -> bool {
        if normalize(&self.plant) != normalize(&unit.plant) {
            return false;
        }

        field_covers(self.area.as_deref(), unit.area.as_deref())
            && field_covers(self.line.as_deref(), unit.line.as_deref())
            && field_covers(self.machine.as_deref(), unit.machine.as_deref())
    }

    /// How many optional fields this scope pins down. A machine-level grant
    /// has specificity 3, a bare plant grant 0.
    pub fn specificity(&self) -> usize {
        usize::from(self.area.is_some())
            + usize::from(self.line.is_some())
            + usize::from(self.machine.is_some())
    }

    /// Human-readable label used in recipient reasons, e.g.
    /// `"Plant: DJ, Area: DMH"`.
    pub fn label(&self) -> String {
        let mut parts = vec![format!("Plant: {}", self.plant)];
        if let Some(area) = &self.area {
            parts.push(format!("Area: {area}"));
        }
        if let Some(line) = &self.line {
            parts.push(format!("Line: {line}"));
        }
        if let Some(machine) = &self.machine {
            parts.push(format!("Machine: {machine}"));
        }
        parts.join(", ")
    }
}

fn field_covers(grant_field: Option<&str>, unit_field: Option<&str>) -> bool {
    match (grant_field, unit_field) {
        (None, _) => true,
        (Some(grant), Some(unit)) => normalize(grant) == normalize(unit),
        (Some(_), None) => false,
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::UnitScope;

    fn unit() -> UnitScope {
        UnitScope::new(
            "DJ",
            Some("DMH".to_string()),
            Some("L03".to_string()),
            Some("M-117".to_string()),
        )
    }

    #[test]
    fn blank_plant_fails_validation() {
        assert!(UnitScope::plant("  ").validate().is_err());
        assert!(UnitScope::plant("DJ").validate().is_ok());
    }

    #[test]
    fn plant_only_grant_covers_every_child() {
        assert!(UnitScope::plant("DJ").covers(&unit()));
    }

    #[test]
    fn plant_mismatch_never_matches() {
        assert!(!UnitScope::plant("KR").covers(&unit()));
    }

    #[test]
    fn specified_fields_must_match_exactly() {
        let grant = UnitScope::new("DJ", Some("DMH".to_string()), None, None);
        assert!(grant.covers(&unit()));

        let wrong_area = UnitScope::new("DJ", Some("PKG".to_string()), None, None);
        assert!(!wrong_area.covers(&unit()));
    }

    #[test]
    fn grant_more_specific_than_unit_does_not_match() {
        let machine_grant = UnitScope::new("DJ", Some("DMH".to_string()), Some("L03".to_string()), Some("M-117".to_string()));
        let line_unit = UnitScope::new("DJ", Some("DMH".to_string()), Some("L03".to_string()), None);
        assert!(!machine_grant.covers(&line_unit));
    }

    #[test]
    fn matching_is_case_and_whitespace_insensitive() {
        let grant = UnitScope::new(" dj ", Some("dmh".to_string()), None, None);
        assert!(grant.covers(&unit()));
    }

    #[test]
    fn specificity_counts_specified_fields() {
        assert_eq!(UnitScope::plant("DJ").specificity(), 0);
        assert_eq!(unit().specificity(), 3);
    }

    #[test]
    fn label_renders_only_specified_fields() {
        let grant = UnitScope::new("DJ", Some("DMH".to_string()), None, None);
        assert_eq!(grant.label(), "Plant: DJ, Area: DMH");
        assert_eq!(unit().label(), "Plant: DJ, Area: DMH, Line: L03, Machine: M-117");
    }
}
