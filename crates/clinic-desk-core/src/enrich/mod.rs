//! Patient list enrichment and search.
//!
//! Derives, per patient, the number of validated consultations, the most recent
//! one before today, and the nearest upcoming visit.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::models::{Patient, Visit};

/// Display format of the last consultation.
pub const DATE_FORMAT: &str = "%d/%m/%Y";
/// Display format of the next appointment.
pub const DATE_TIME_FORMAT: &str = "%d/%m/%Y %H:%M";

/// A patient with derived visit information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedPatient {
    pub patient: Patient,
    /// Number of validated visits
    pub consultation_count: usize,
    /// Date of the latest validated visit before today (`dd/MM/yyyy`)
    pub last_consultation: Option<String>,
    /// Nearest visit after now, any status (`dd/MM/yyyy HH:mm`)
    pub next_appointment: Option<String>,
    /// Raw date behind `last_consultation`, used for range filtering
    #[serde(skip)]
    pub last_consultation_date: Option<NaiveDate>,
}

impl EnrichedPatient {
    /// Localized consultation count, as shown in the list.
    pub fn consultation_phrase(&self) -> String {
        match self.consultation_count {
            0 => "Aucune consultation".to_string(),
            1 => "1 consultation".to_string(),
            n => format!("{} consultations", n),
        }
    }

    /// Concatenation of every searchable field.
    fn search_text(&self) -> String {
        let p = &self.patient;
        let mut parts = vec![p.nom.as_str(), p.prenom.as_str(), p.numero_patient.as_str()];
        for value in [&p.telephone, &p.email, &p.ville, &p.cin, &p.date_naissance]
            .into_iter()
            .flatten()
        {
            parts.push(value.as_str());
        }

        let insurance = if p.has_active_mutuelle() {
            "Avec mutuelle"
        } else {
            "Sans mutuelle"
        };
        parts.push(insurance);
        if let Some(mutuelle) = &p.mutuelle {
            parts.push(mutuelle.nom.as_str());
        }
        parts.extend(p.antecedents.iter().map(String::as_str));

        let phrase = self.consultation_phrase();
        let mut text = parts.join(" ");
        text.push(' ');
        text.push_str(&phrase);
        text.to_lowercase()
    }
}

/// Compute the enriched view of every patient.
pub fn enrich(patients: &[Patient], visits: &[Visit], now: NaiveDateTime) -> Vec<EnrichedPatient> {
    let today = now.date();

    patients
        .iter()
        .map(|patient| {
            let own: Vec<&Visit> = visits
                .iter()
                .filter(|v| v.patient_id.as_deref() == Some(patient.id.as_str()))
                .collect();

            let consultation_count = own.iter().filter(|v| v.is_validated()).count();

            let last = own
                .iter()
                .filter(|v| v.is_validated() && v.time.date() != today)
                .max_by_key(|v| v.time)
                .map(|v| v.time);

            let next = own
                .iter()
                .filter(|v| v.time > now)
                .min_by_key(|v| v.time)
                .map(|v| v.time);

            EnrichedPatient {
                patient: patient.clone(),
                consultation_count,
                last_consultation: last.map(|t| t.format(DATE_FORMAT).to_string()),
                next_appointment: next.map(|t| t.format(DATE_TIME_FORMAT).to_string()),
                last_consultation_date: last.map(|t| t.date()),
            }
        })
        .collect()
}

/// Search criteria of the patient list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientFilter {
    /// Free text; every whitespace-separated term must match
    pub query: String,
    /// Inclusive range on the last consultation date
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

impl PatientFilter {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            date_range: None,
        }
    }

    pub fn with_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = Some((start, end));
        self
    }

    /// Whether a patient passes the filter.
    pub fn matches(&self, patient: &EnrichedPatient) -> bool {
        if let Some((start, end)) = self.date_range {
            match patient.last_consultation_date {
                Some(date) if date >= start && date <= end => {}
                _ => return false,
            }
        }

        let terms: Vec<String> = self
            .query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return true;
        }

        let text = patient.search_text();
        terms.iter().all(|term| text.contains(term.as_str()))
    }
}

/// Apply a filter to an enriched list, keeping order.
pub fn filter_patients<'a>(
    patients: &'a [EnrichedPatient],
    filter: &PatientFilter,
) -> Vec<&'a EnrichedPatient> {
    patients.iter().filter(|p| filter.matches(p)).collect()
}
