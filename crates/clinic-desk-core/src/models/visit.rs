//! Visit (appointment / consultation) models.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Storage and wire format for visit times.
pub const VISIT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Visit status as chosen at the desk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum VisitStatus {
    /// Not yet decided
    #[default]
    #[serde(rename = "-")]
    Unset,
    /// Patient attended; requires a fiche number
    #[serde(rename = "Validé")]
    Validated,
    #[serde(rename = "Annulé")]
    Cancelled,
    #[serde(rename = "Reporté")]
    Postponed,
    #[serde(rename = "Absent")]
    Absent,
}

impl VisitStatus {
    /// Label shown and stored for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::Unset => "-",
            VisitStatus::Validated => "Validé",
            VisitStatus::Cancelled => "Annulé",
            VisitStatus::Postponed => "Reporté",
            VisitStatus::Absent => "Absent",
        }
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "-" => Ok(VisitStatus::Unset),
            "Validé" => Ok(VisitStatus::Validated),
            "Annulé" => Ok(VisitStatus::Cancelled),
            "Reporté" => Ok(VisitStatus::Postponed),
            "Absent" => Ok(VisitStatus::Absent),
            other => Err(format!(
                "Invalid visit status: '{}'. Must be one of: -, Validé, Annulé, Reporté, Absent",
                other
            )),
        }
    }
}

/// A scheduled or attended visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    /// Unique visit ID
    pub id: String,
    /// Registered patient, if known. Walk-ins may not have one yet.
    pub patient_id: Option<String>,
    /// Walk-in family name
    pub nom: Option<String>,
    /// Walk-in given name
    pub prenom: Option<String>,
    /// Practice-local date and time
    pub time: NaiveDateTime,
    #[serde(default)]
    pub status: VisitStatus,
    /// Paper file number, set only while validated
    pub fiche_number: Option<String>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub paid: bool,
    pub payment_method: Option<String>,
    /// Creation timestamp
    #[serde(default)]
    pub created_at: String,
    /// Last update timestamp
    #[serde(default)]
    pub updated_at: String,
}

impl Visit {
    /// Schedule a new visit at the given time.
    pub fn new(time: NaiveDateTime) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id: None,
            nom: None,
            prenom: None,
            time,
            status: VisitStatus::Unset,
            fiche_number: None,
            amount: 0.0,
            paid: false,
            payment_method: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Schedule a visit for a registered patient.
    pub fn for_patient(patient_id: String, time: NaiveDateTime) -> Self {
        let mut visit = Self::new(time);
        visit.patient_id = Some(patient_id);
        visit
    }

    pub fn is_validated(&self) -> bool {
        self.status == VisitStatus::Validated
    }

    /// Walk-in names, when both parts are present and non-blank.
    pub fn walk_in_name(&self) -> Option<(&str, &str)> {
        match (self.nom.as_deref(), self.prenom.as_deref()) {
            (Some(nom), Some(prenom)) if !nom.trim().is_empty() && !prenom.trim().is_empty() => {
                Some((nom, prenom))
            }
            _ => None,
        }
    }

    /// Non-empty fiche number.
    pub fn fiche(&self) -> Option<&str> {
        self.fiche_number.as_deref().filter(|f| !f.is_empty())
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Parse a visit time, with or without seconds.
pub fn parse_visit_time(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, VISIT_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M"))
}
