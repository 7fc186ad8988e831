//! Patient display numbers (`P0001`, `P0002`, ...).
//!
//! Numbers are allocated as `count + 1` and tracked in a persisted used-number set.
//! Allocation is not race-safe: the caller must persist the new patient before the
//! next allocation. Past 9999 patients the number simply widens (`P10000`), which no
//! longer passes [`is_valid_patient_number`].

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::Patient;
use crate::store::{KeyValueStore, StoreError};

/// Store key of the used-number set.
pub const USED_NUMBERS_KEY: &str = "usedPatientNumbers";

static PATIENT_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^P\d{4}$").expect("static patient number pattern"));

/// Numbering errors.
#[derive(Error, Debug)]
pub enum NumberingError {
    #[error("Invalid patient number format: {0} (expected P followed by 4 digits)")]
    Format(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type NumberingResult<T> = Result<T, NumberingError>;

/// Format a patient number. Values below 1 are clamped to 1.
pub fn format_patient_number(n: i64) -> String {
    format!("P{:04}", n.max(1))
}

/// Check the `P` + 4 digits format.
pub fn is_valid_patient_number(value: &str) -> bool {
    PATIENT_NUMBER_RE.is_match(value)
}

/// Next number for a registry of `existing` patients.
pub fn next_patient_number(existing: &[Patient]) -> String {
    format_patient_number(existing.len() as i64 + 1)
}

/// Like [`next_patient_number`], but skips past the highest number when the
/// count-based one is still held (after deletions).
pub fn next_free_patient_number(existing: &[Patient]) -> String {
    let candidate = next_patient_number(existing);
    if existing.iter().any(|p| p.numero_patient == candidate) {
        format_patient_number(i64::from(highest_patient_number(existing)) + 1)
    } else {
        candidate
    }
}

/// Reuse the number of a patient with the same name, or allocate the next free one.
///
/// Keeps repeat walk-ins from getting a second number. A returned number that no
/// patient holds yet is a fresh allocation.
pub fn find_or_generate(nom: &str, prenom: &str, existing: &[Patient]) -> String {
    existing
        .iter()
        .find(|p| p.has_name(nom, prenom) && !p.numero_patient.is_empty())
        .map(|p| p.numero_patient.clone())
        .unwrap_or_else(|| next_free_patient_number(existing))
}

/// Highest numeric suffix in use, 0 for an empty registry.
pub fn highest_patient_number(existing: &[Patient]) -> u32 {
    existing
        .iter()
        .filter_map(|p| number_suffix(&p.numero_patient))
        .max()
        .unwrap_or(0)
}

fn number_suffix(value: &str) -> Option<u32> {
    let digits = value.strip_prefix('P')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Tracks which patient numbers are in circulation.
pub struct PatientNumberAllocator<S> {
    store: S,
    key: String,
}

impl<S: KeyValueStore> PatientNumberAllocator<S> {
    /// Create an allocator over the default key.
    pub fn new(store: S) -> Self {
        Self::with_key(store, USED_NUMBERS_KEY)
    }

    /// Create an allocator over a custom key.
    pub fn with_key(store: S, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
        }
    }

    /// Current used-number set, in insertion order.
    pub fn used_numbers(&self) -> NumberingResult<Vec<String>> {
        let Some(raw) = self.store.get(&self.key)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).map_err(|source| {
            warn!(key = %self.key, "used patient numbers are not a JSON array");
            NumberingError::Store(StoreError::Corrupt {
                key: self.key.clone(),
                source,
            })
        })
    }

    fn write_used(&self, numbers: &[String]) -> NumberingResult<()> {
        let json = serde_json::to_string(numbers).map_err(|source| StoreError::Corrupt {
            key: self.key.clone(),
            source,
        })?;
        self.store.set(&self.key, &json)?;
        Ok(())
    }

    /// Mark a number as used.
    pub fn reserve(&self, value: &str) -> NumberingResult<()> {
        if !is_valid_patient_number(value) {
            return Err(NumberingError::Format(value.to_string()));
        }

        let mut used = self.used_numbers()?;
        if !used.iter().any(|n| n == value) {
            used.push(value.to_string());
            self.write_used(&used)?;
        }
        debug!(number = value, "reserved patient number");
        Ok(())
    }

    /// Drop a number from the used set unless a patient still holds it.
    ///
    /// Returns whether a removal happened.
    pub fn release(&self, value: &str, existing: &[Patient]) -> NumberingResult<bool> {
        if existing.iter().any(|p| p.numero_patient == value) {
            debug!(number = value, "patient number still assigned, not released");
            return Ok(false);
        }

        let mut used = self.used_numbers()?;
        let before = used.len();
        used.retain(|n| n != value);
        if used.len() == before {
            return Ok(false);
        }

        self.write_used(&used)?;
        debug!(number = value, "released patient number");
        Ok(true)
    }

    /// Renumber every patient 1..N by creation time and rewrite the used set.
    ///
    /// Destructive: numbers already printed elsewhere are not updated.
    pub fn reorganize(&self, patients: &mut [Patient]) -> NumberingResult<()> {
        patients.sort_by_key(|p| p.created_at_millis());

        let mut numbers = Vec::with_capacity(patients.len());
        for (index, patient) in patients.iter_mut().enumerate() {
            let number = format_patient_number(index as i64 + 1);
            if patient.numero_patient != number {
                patient.numero_patient = number.clone();
                patient.touch();
            }
            numbers.push(number);
        }

        self.write_used(&numbers)?;
        info!(count = patients.len(), "reorganized patient numbers");
        Ok(())
    }
}
