//! Status transitions and the checks that gate visit validation.

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use super::{format_fiche_number, is_valid_fiche_number, ValidationError, ValidationResult};
use crate::models::{Patient, Visit, VisitStatus};

/// Patient to register before a walk-in visit can be validated.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPatientRequest {
    pub nom: String,
    pub prenom: String,
}

/// Outcome of a status change.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    /// Updated visit, ready to persist.
    Apply(Visit),
    /// The visit belongs to an unregistered walk-in. Register the patient,
    /// set `patient_id` on the visit and submit the change again.
    NeedsPatient {
        patient: NewPatientRequest,
        fiche_number: String,
    },
}

/// Check that `visit` may be validated with `fiche_number`.
///
/// Returns the normalized fiche number to persist.
pub fn can_validate(
    visit: &Visit,
    fiche_number: &str,
    all_visits: &[Visit],
) -> ValidationResult<String> {
    let input = fiche_number.trim();
    if input.is_empty() {
        return Err(ValidationError::MissingFicheNumber);
    }

    let formatted = format_fiche_number(input);
    if !is_valid_fiche_number(&formatted) {
        return Err(ValidationError::InvalidFormat(formatted));
    }

    let taken = all_visits
        .iter()
        .any(|other| other.id != visit.id && other.fiche() == Some(formatted.as_str()));
    if taken {
        return Err(ValidationError::DuplicateFicheNumber(formatted));
    }

    Ok(formatted)
}

/// Apply a status change to a visit.
///
/// Any status other than validated clears the fiche number.
pub fn apply_status(
    visit: &Visit,
    status: VisitStatus,
    fiche_input: &str,
    all_visits: &[Visit],
) -> ValidationResult<StatusChange> {
    if status != VisitStatus::Validated {
        let mut updated = visit.clone();
        updated.status = status;
        updated.fiche_number = None;
        updated.touch();
        debug!(visit_id = %visit.id, status = %status, "visit status changed");
        return Ok(StatusChange::Apply(updated));
    }

    let fiche_number = match can_validate(visit, fiche_input, all_visits) {
        Ok(fiche_number) => fiche_number,
        Err(e) => {
            warn!(visit_id = %visit.id, "visit validation rejected: {}", e);
            return Err(e);
        }
    };

    if visit.patient_id.is_none() {
        if let Some((nom, prenom)) = visit.walk_in_name() {
            return Ok(StatusChange::NeedsPatient {
                patient: NewPatientRequest {
                    nom: nom.trim().to_string(),
                    prenom: prenom.trim().to_string(),
                },
                fiche_number,
            });
        }
    }

    let mut updated = visit.clone();
    updated.status = VisitStatus::Validated;
    updated.fiche_number = Some(fiche_number);
    updated.touch();
    debug!(visit_id = %visit.id, "visit validated");
    Ok(StatusChange::Apply(updated))
}

/// Fiche numbers of the patient's earlier visits, oldest first.
///
/// Visits are matched by patient id when both sides carry one, otherwise by exact
/// name. The name comes from the patient record, else from `fallback_name`.
pub fn previous_fiche_numbers(
    all_visits: &[Visit],
    all_patients: &[Patient],
    patient_id: Option<&str>,
    current_time: NaiveDateTime,
    fallback_name: Option<(&str, &str)>,
) -> Vec<String> {
    let name = patient_id
        .and_then(|id| all_patients.iter().find(|p| p.id == id))
        .map(|p| (p.nom.as_str(), p.prenom.as_str()))
        .or(fallback_name);

    let mut earlier: Vec<&Visit> = all_visits
        .iter()
        .filter(|v| v.time < current_time && v.fiche().is_some())
        .filter(|v| match (patient_id, v.patient_id.as_deref()) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => name.is_some() && v.walk_in_name() == name,
        })
        .collect();
    earlier.sort_by_key(|v| v.time);

    earlier
        .into_iter()
        .filter_map(|v| v.fiche().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_visit_time;

    fn at(time: &str) -> NaiveDateTime {
        parse_visit_time(time).unwrap()
    }

    fn validated(patient_id: &str, time: &str, fiche: &str) -> Visit {
        let mut visit = Visit::for_patient(patient_id.into(), at(time));
        visit.status = VisitStatus::Validated;
        visit.fiche_number = Some(fiche.into());
        visit
    }

    #[test]
    fn test_missing_fiche_number() {
        let visit = Visit::for_patient("p1".into(), at("2024-03-01T09:00"));
        assert_eq!(
            can_validate(&visit, "  ", &[]),
            Err(ValidationError::MissingFicheNumber)
        );
    }

    #[test]
    fn test_invalid_fiche_format() {
        let visit = Visit::for_patient("p1".into(), at("2024-03-01T09:00"));
        assert_eq!(
            can_validate(&visit, "abc", &[]),
            Err(ValidationError::InvalidFormat("abc".into()))
        );
    }

    #[test]
    fn test_duplicate_fiche_number() {
        let other = validated("p2", "2024-02-01T09:00", "F24-0001");
        let visit = Visit::for_patient("p1".into(), at("2024-03-01T09:00"));
        assert_eq!(
            can_validate(&visit, "f24-1", &[other]),
            Err(ValidationError::DuplicateFicheNumber("F24-0001".into()))
        );
    }

    #[test]
    fn test_own_fiche_number_is_not_a_duplicate() {
        let visit = validated("p1", "2024-03-01T09:00", "F24-0001");
        let all = vec![visit.clone()];
        assert_eq!(can_validate(&visit, "F24-0001", &all), Ok("F24-0001".into()));
    }

    #[test]
    fn test_can_validate_returns_normalized_number() {
        let visit = Visit::for_patient("p1".into(), at("2024-03-01T09:00"));
        assert_eq!(can_validate(&visit, "f1-23", &[]), Ok("F01-0023".into()));
    }

    #[test]
    fn test_non_validated_status_clears_fiche() {
        let visit = validated("p1", "2024-03-01T09:00", "F24-0001");
        let change = apply_status(&visit, VisitStatus::Postponed, "F24-0001", &[]).unwrap();

        match change {
            StatusChange::Apply(updated) => {
                assert_eq!(updated.status, VisitStatus::Postponed);
                assert_eq!(updated.fiche_number, None);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_validate_registered_patient() {
        let visit = Visit::for_patient("p1".into(), at("2024-03-01T09:00"));
        let change = apply_status(&visit, VisitStatus::Validated, "1-5", &[]).unwrap();

        match change {
            StatusChange::Apply(updated) => {
                assert!(updated.is_validated());
                assert_eq!(updated.fiche_number.as_deref(), Some("F01-0005"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_validate_walk_in_needs_patient() {
        let mut visit = Visit::new(at("2024-03-01T09:00"));
        visit.nom = Some(" Alami ".into());
        visit.prenom = Some("Sara".into());

        let change = apply_status(&visit, VisitStatus::Validated, "F24-0002", &[]).unwrap();
        assert_eq!(
            change,
            StatusChange::NeedsPatient {
                patient: NewPatientRequest {
                    nom: "Alami".into(),
                    prenom: "Sara".into(),
                },
                fiche_number: "F24-0002".into(),
            }
        );
    }

    #[test]
    fn test_validate_anonymous_visit_applies_directly() {
        let visit = Visit::new(at("2024-03-01T09:00"));
        let change = apply_status(&visit, VisitStatus::Validated, "F24-0002", &[]).unwrap();
        assert!(matches!(change, StatusChange::Apply(ref v) if v.is_validated()));
    }

    #[test]
    fn test_rejected_validation_leaves_visit_untouched() {
        let visit = Visit::for_patient("p1".into(), at("2024-03-01T09:00"));
        let result = apply_status(&visit, VisitStatus::Validated, "", &[]);
        assert_eq!(result, Err(ValidationError::MissingFicheNumber));
        assert_eq!(visit.status, VisitStatus::Unset);
    }

    #[test]
    fn test_previous_fiche_numbers_by_id() {
        let visits = vec![
            validated("p1", "2024-02-10T09:00", "F24-0002"),
            validated("p1", "2024-01-10T09:00", "F24-0001"),
            validated("p2", "2024-01-15T09:00", "F24-0003"),
            validated("p1", "2024-03-10T09:00", "F24-0009"),
            Visit::for_patient("p1".into(), at("2024-02-20T09:00")),
        ];

        let previous =
            previous_fiche_numbers(&visits, &[], Some("p1"), at("2024-03-01T00:00"), None);
        assert_eq!(previous, vec!["F24-0001", "F24-0002"]);
    }

    #[test]
    fn test_previous_fiche_numbers_by_name() {
        let mut patient = Patient::new("Alami".into(), "Sara".into());
        patient.id = "p1".into();

        let mut walk_in = Visit::new(at("2024-01-05T09:00"));
        walk_in.nom = Some("Alami".into());
        walk_in.prenom = Some("Sara".into());
        walk_in.status = VisitStatus::Validated;
        walk_in.fiche_number = Some("F24-0100".into());

        let mut other_case = walk_in.clone();
        other_case.id = "other".into();
        other_case.nom = Some("ALAMI".into());
        other_case.fiche_number = Some("F24-0101".into());

        let visits = vec![walk_in, other_case, validated("p1", "2024-02-01T09:00", "F24-0200")];

        let previous = previous_fiche_numbers(
            &visits,
            &[patient],
            Some("p1"),
            at("2024-03-01T00:00"),
            None,
        );
        assert_eq!(previous, vec!["F24-0100", "F24-0200"]);

        let by_fallback = previous_fiche_numbers(
            &visits,
            &[],
            None,
            at("2024-03-01T00:00"),
            Some(("Alami", "Sara")),
        );
        assert_eq!(by_fallback, vec!["F24-0100"]);
    }

    #[test]
    fn test_previous_fiche_numbers_without_identity() {
        let visits = vec![validated("p1", "2024-01-10T09:00", "F24-0001")];
        let previous = previous_fiche_numbers(&visits, &[], None, at("2024-03-01T00:00"), None);
        assert!(previous.is_empty());
    }
}
