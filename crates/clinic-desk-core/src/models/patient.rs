//! Patient models.

use serde::{Deserialize, Serialize};

/// Supplementary health insurance (mutuelle).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mutuelle {
    /// Whether the plan is currently active
    pub active: bool,
    /// Insurer name
    pub nom: String,
}

/// A patient record of the practice registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Local UUID - always present, generated locally
    pub id: String,
    /// Display number (`P0001`), empty until allocated
    #[serde(default)]
    pub numero_patient: String,
    /// Family name
    pub nom: String,
    /// Given name
    pub prenom: String,
    /// Phone number
    pub telephone: Option<String>,
    pub email: Option<String>,
    /// City of residence
    pub ville: Option<String>,
    /// National identity card number
    pub cin: Option<String>,
    /// Date of birth, as entered at the desk
    pub date_naissance: Option<String>,
    /// Medical history tags, in entry order
    #[serde(default)]
    pub antecedents: Vec<String>,
    /// Insurance, if any
    pub mutuelle: Option<Mutuelle>,
    /// Creation timestamp (RFC 3339), orders patient numbering
    #[serde(default)]
    pub created_at: String,
    /// Last update timestamp
    #[serde(default)]
    pub updated_at: String,
}

impl Patient {
    /// Create a new, not yet numbered patient.
    pub fn new(nom: String, prenom: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            numero_patient: String::new(),
            nom,
            prenom,
            telephone: None,
            email: None,
            ville: None,
            cin: None,
            date_naissance: None,
            antecedents: Vec::new(),
            mutuelle: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// "Nom Prenom", as printed on fiches.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.nom, self.prenom)
    }

    /// Case-insensitive match on both name parts.
    pub fn has_name(&self, nom: &str, prenom: &str) -> bool {
        self.nom.to_lowercase() == nom.to_lowercase()
            && self.prenom.to_lowercase() == prenom.to_lowercase()
    }

    /// Whether the insurance plan is present and active.
    pub fn has_active_mutuelle(&self) -> bool {
        self.mutuelle.as_ref().is_some_and(|m| m.active)
    }

    /// Creation time in milliseconds since the epoch; missing or unparseable is 0.
    pub fn created_at_millis(&self) -> i64 {
        chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.timestamp_millis())
            .unwrap_or(0)
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}
