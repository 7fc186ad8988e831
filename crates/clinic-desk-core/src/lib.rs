//! Clinic Desk Core Library
//!
//! Local-first front-desk core for a single medical practice: patient registry,
//! visit tracking, patient numbering and fiche-number rules.
//!
//! # Architecture
//!
//! ```text
//!   Desk UI shell
//!        │
//!        ▼
//!   ClinicDesk (FFI facade, one SQLite connection)
//!        │
//!        ├── numbering: P0001 allocation ──► app_state["usedPatientNumbers"]
//!        ├── visits:    fiche rules, status changes
//!        │                 │
//!        │                 └── NeedsPatient ──► register walk-in ──► resubmit
//!        ├── enrich:    last / next visit per patient, search
//!        └── export:    daily register (JSON / CSV)
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite persistence for patients, visits and desk state
//! - [`models`]: Domain types (Patient, Visit, VisitStatus)
//! - [`store`]: Key-value store abstraction
//! - [`numbering`]: Patient number allocation
//! - [`visits`]: Visit validation rules
//! - [`enrich`]: Enriched patient list and search
//! - [`export`]: Daily visit register

pub mod db;
pub mod enrich;
pub mod export;
pub mod models;
pub mod numbering;
pub mod store;
pub mod visits;

// Re-export commonly used types
pub use db::Database;
pub use enrich::{enrich, EnrichedPatient, PatientFilter};
pub use models::{Mutuelle, Patient, Visit, VisitStatus};
pub use numbering::PatientNumberAllocator;
pub use store::{KeyValueStore, MemoryStore};
pub use visits::{StatusChange, ValidationError};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicDeskError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<db::DbError> for ClinicDeskError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => ClinicDeskError::NotFound(what),
            other => ClinicDeskError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClinicDeskError {
    fn from(e: serde_json::Error) -> Self {
        ClinicDeskError::SerializationError(e.to_string())
    }
}

impl From<store::StoreError> for ClinicDeskError {
    fn from(e: store::StoreError) -> Self {
        ClinicDeskError::DatabaseError(e.to_string())
    }
}

impl From<numbering::NumberingError> for ClinicDeskError {
    fn from(e: numbering::NumberingError) -> Self {
        match e {
            numbering::NumberingError::Store(inner) => inner.into(),
            other => ClinicDeskError::InvalidInput(other.to_string()),
        }
    }
}

impl From<visits::ValidationError> for ClinicDeskError {
    fn from(e: visits::ValidationError) -> Self {
        ClinicDeskError::Validation(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicDeskError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicDeskError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<ClinicDesk>, ClinicDeskError> {
    let db = Database::open(&path)?;
    Ok(Arc::new(ClinicDesk {
        db: Arc::new(Mutex::new(db)),
    }))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<ClinicDesk>, ClinicDeskError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(ClinicDesk {
        db: Arc::new(Mutex::new(db)),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ClinicDesk {
    db: Arc<Mutex<Database>>,
}

#[uniffi::export]
impl ClinicDesk {
    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Register a new patient with the next free number.
    pub fn register_patient(&self, patient: FfiNewPatient) -> Result<FfiPatient, ClinicDeskError> {
        require_name(&patient.nom, &patient.prenom)?;

        let db = self.db.lock()?;
        let existing = db.list_patients()?;

        let mut record = Patient::new(
            patient.nom.trim().to_string(),
            patient.prenom.trim().to_string(),
        );
        record.telephone = patient.telephone;
        record.email = patient.email;
        record.ville = patient.ville;
        record.cin = patient.cin;
        record.date_naissance = patient.date_naissance;
        record.antecedents = patient.antecedents;
        record.mutuelle = patient.mutuelle.map(Into::into);
        record.numero_patient = numbering::next_free_patient_number(&existing);

        insert_numbered_patient(&db, &record)?;
        info!(patient_id = %record.id, number = %record.numero_patient, "registered patient");
        Ok(record.into())
    }

    /// Update a patient's details. The number is managed by the desk and kept.
    pub fn update_patient(&self, patient: FfiPatient) -> Result<bool, ClinicDeskError> {
        require_name(&patient.nom, &patient.prenom)?;

        let db = self.db.lock()?;
        let Some(mut record) = db.get_patient(&patient.id)? else {
            return Ok(false);
        };

        record.nom = patient.nom.trim().to_string();
        record.prenom = patient.prenom.trim().to_string();
        record.telephone = patient.telephone;
        record.email = patient.email;
        record.ville = patient.ville;
        record.cin = patient.cin;
        record.date_naissance = patient.date_naissance;
        record.antecedents = patient.antecedents;
        record.mutuelle = patient.mutuelle.map(Into::into);
        record.touch();
        Ok(db.update_patient(&record)?)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: String) -> Result<Option<FfiPatient>, ClinicDeskError> {
        let db = self.db.lock()?;
        Ok(db.get_patient(&id)?.map(Into::into))
    }

    /// List all patients, oldest first.
    pub fn list_patients(&self) -> Result<Vec<FfiPatient>, ClinicDeskError> {
        let db = self.db.lock()?;
        Ok(db.list_patients()?.into_iter().map(Into::into).collect())
    }

    /// Delete a patient with all their visits and release their number.
    pub fn delete_patient(&self, id: String) -> Result<bool, ClinicDeskError> {
        let db = self.db.lock()?;
        let Some(patient) = db.get_patient(&id)? else {
            return Ok(false);
        };

        let visit_count = db.list_visits_for_patient(&id)?.len();
        let deleted = db.atomically(|db| -> Result<bool, ClinicDeskError> {
            if !db.delete_patient(&id)? {
                return Ok(false);
            }
            if !patient.numero_patient.is_empty() {
                let remaining = db.list_patients()?;
                PatientNumberAllocator::new(db).release(&patient.numero_patient, &remaining)?;
            }
            Ok(true)
        })?;

        if deleted {
            info!(patient_id = %id, visits = visit_count, "deleted patient");
        }
        Ok(deleted)
    }

    /// Enriched patient list, filtered by free text and an optional
    /// last-consultation range (`YYYY-MM-DD`, inclusive).
    pub fn list_enriched_patients(
        &self,
        query: String,
        range_start: Option<String>,
        range_end: Option<String>,
    ) -> Result<Vec<FfiEnrichedPatient>, ClinicDeskError> {
        let mut filter = PatientFilter::new(query);
        if let (Some(start), Some(end)) = (range_start, range_end) {
            filter = filter.with_range(parse_date(&start)?, parse_date(&end)?);
        }
        let now = chrono::Local::now().naive_local();
        Ok(self
            .enriched_patients_at(&filter, now)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    // =========================================================================
    // Visit Operations
    // =========================================================================

    /// Schedule a visit for a registered patient or a walk-in.
    pub fn schedule_visit(&self, visit: FfiNewVisit) -> Result<FfiVisit, ClinicDeskError> {
        let time = parse_time(&visit.time)?;
        require_amount(visit.amount)?;
        let db = self.db.lock()?;

        if let Some(patient_id) = &visit.patient_id {
            if db.get_patient(patient_id)?.is_none() {
                return Err(ClinicDeskError::NotFound(format!("patient {}", patient_id)));
            }
        }

        let mut record = Visit::new(time);
        record.patient_id = visit.patient_id;
        record.nom = visit.nom;
        record.prenom = visit.prenom;
        record.amount = visit.amount;
        db.insert_visit(&record)?;
        debug!(visit_id = %record.id, "scheduled visit");
        Ok(record.into())
    }

    /// Get a visit by ID.
    pub fn get_visit(&self, id: String) -> Result<Option<FfiVisit>, ClinicDeskError> {
        let db = self.db.lock()?;
        Ok(db.get_visit(&id)?.map(Into::into))
    }

    /// List all visits, ordered by time.
    pub fn list_visits(&self) -> Result<Vec<FfiVisit>, ClinicDeskError> {
        let db = self.db.lock()?;
        Ok(db.list_visits()?.into_iter().map(Into::into).collect())
    }

    /// Record the amount and payment of a visit.
    pub fn record_payment(
        &self,
        visit_id: String,
        amount: f64,
        paid: bool,
        payment_method: Option<String>,
    ) -> Result<FfiVisit, ClinicDeskError> {
        require_amount(amount)?;

        let db = self.db.lock()?;
        let mut visit = db
            .get_visit(&visit_id)?
            .ok_or_else(|| ClinicDeskError::NotFound(format!("visit {}", visit_id)))?;

        visit.amount = amount;
        visit.paid = paid;
        visit.payment_method = payment_method.filter(|m| !m.trim().is_empty());
        visit.touch();
        db.update_visit(&visit)?;
        Ok(visit.into())
    }

    /// Change a visit's status. Validating requires a fiche number; a walk-in
    /// is registered as a patient (or matched to an existing one) on the way.
    pub fn set_visit_status(
        &self,
        visit_id: String,
        status: String,
        fiche_number: String,
    ) -> Result<FfiVisit, ClinicDeskError> {
        let status: VisitStatus = status.parse().map_err(ClinicDeskError::InvalidInput)?;
        let db = self.db.lock()?;
        let visit = db
            .get_visit(&visit_id)?
            .ok_or_else(|| ClinicDeskError::NotFound(format!("visit {}", visit_id)))?;
        let all_visits = db.list_visits()?;

        // A walk-in's patient is only kept if the visit update lands too
        let updated = db.atomically(|db| -> Result<Visit, ClinicDeskError> {
            let updated = match visits::apply_status(&visit, status, &fiche_number, &all_visits)? {
                StatusChange::Apply(updated) => updated,
                StatusChange::NeedsPatient {
                    patient,
                    fiche_number,
                } => {
                    let patient_id = register_walk_in(db, &patient)?;
                    let mut with_patient = visit.clone();
                    with_patient.patient_id = Some(patient_id);
                    match visits::apply_status(&with_patient, status, &fiche_number, &all_visits)?
                    {
                        StatusChange::Apply(updated) => updated,
                        StatusChange::NeedsPatient { .. } => {
                            return Err(ClinicDeskError::Validation(
                                "Visit still has no patient after registration".to_string(),
                            ))
                        }
                    }
                }
            };
            db.update_visit(&updated)?;
            Ok(updated)
        })?;

        Ok(updated.into())
    }

    /// Delete a visit.
    pub fn delete_visit(&self, id: String) -> Result<bool, ClinicDeskError> {
        let db = self.db.lock()?;
        Ok(db.delete_visit(&id)?)
    }

    /// Fiche numbers of the same patient's earlier visits, oldest first.
    pub fn previous_fiche_numbers(&self, visit_id: String) -> Result<Vec<String>, ClinicDeskError> {
        let db = self.db.lock()?;
        let visit = db
            .get_visit(&visit_id)?
            .ok_or_else(|| ClinicDeskError::NotFound(format!("visit {}", visit_id)))?;
        let all_visits = db.list_visits()?;
        let patients = db.list_patients()?;

        Ok(visits::previous_fiche_numbers(
            &all_visits,
            &patients,
            visit.patient_id.as_deref(),
            visit.time,
            visit.walk_in_name(),
        ))
    }

    // =========================================================================
    // Numbering Maintenance
    // =========================================================================

    /// Renumber all patients 1..N by registration date. Returns the patient count.
    pub fn reorganize_patient_numbers(&self) -> Result<u32, ClinicDeskError> {
        let db = self.db.lock()?;
        let patients = db.list_patients()?;
        renumber_patients(&db, patients)
    }

    /// Highest patient number in use (0 when the registry is empty).
    pub fn highest_patient_number(&self) -> Result<u32, ClinicDeskError> {
        let db = self.db.lock()?;
        Ok(numbering::highest_patient_number(&db.list_patients()?))
    }

    /// Numbers currently recorded as in use.
    pub fn used_patient_numbers(&self) -> Result<Vec<String>, ClinicDeskError> {
        let db = self.db.lock()?;
        Ok(PatientNumberAllocator::new(&*db).used_numbers()?)
    }

    // =========================================================================
    // Export Operations
    // =========================================================================

    /// Export the register of a day (`YYYY-MM-DD`) as JSON.
    pub fn export_register_json(&self, date: String) -> Result<String, ClinicDeskError> {
        let date = parse_date(&date)?;
        let db = self.db.lock()?;
        let register = export::RegisterExporter::new(&db).export_day(date)?;
        Ok(register.to_json()?)
    }

    /// Export the register of a day (`YYYY-MM-DD`) as CSV.
    pub fn export_register_csv(&self, date: String) -> Result<String, ClinicDeskError> {
        let date = parse_date(&date)?;
        let db = self.db.lock()?;
        let register = export::RegisterExporter::new(&db).export_day(date)?;
        Ok(register.to_csv())
    }
}

impl ClinicDesk {
    /// Enriched, filtered patient list as of `now`.
    pub fn enriched_patients_at(
        &self,
        filter: &PatientFilter,
        now: NaiveDateTime,
    ) -> Result<Vec<EnrichedPatient>, ClinicDeskError> {
        let db = self.db.lock()?;
        let patients = db.list_patients()?;
        let visits = db.list_visits()?;

        Ok(enrich(&patients, &visits, now)
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect())
    }
}

/// Insert a patient and record its number as used, all or nothing.
fn insert_numbered_patient(db: &Database, patient: &Patient) -> Result<(), ClinicDeskError> {
    db.atomically(|db| {
        PatientNumberAllocator::new(db).reserve(&patient.numero_patient)?;
        db.insert_patient(patient)?;
        Ok(())
    })
}

/// Find or register the patient behind a walk-in visit. Returns the patient ID.
fn register_walk_in(
    db: &Database,
    request: &visits::NewPatientRequest,
) -> Result<String, ClinicDeskError> {
    let existing = db.list_patients()?;
    let number = numbering::find_or_generate(&request.nom, &request.prenom, &existing);
    if let Some(found) = db.get_patient_by_number(&number)? {
        debug!(patient_id = %found.id, number = %number, "walk-in matched registered patient");
        return Ok(found.id);
    }

    let mut patient = Patient::new(request.nom.clone(), request.prenom.clone());
    patient.numero_patient = number;
    insert_numbered_patient(db, &patient)?;
    info!(
        patient_id = %patient.id,
        number = %patient.numero_patient,
        "registered walk-in patient"
    );
    Ok(patient.id)
}

/// Renumber patients and write back both their numbers and the used set, all or nothing.
fn renumber_patients(db: &Database, mut patients: Vec<Patient>) -> Result<u32, ClinicDeskError> {
    db.atomically(|db| {
        PatientNumberAllocator::new(db).reorganize(&mut patients)?;
        db.update_patient_numbers(&patients)?;
        Ok(patients.len() as u32)
    })
}

fn require_name(nom: &str, prenom: &str) -> Result<(), ClinicDeskError> {
    if nom.trim().is_empty() || prenom.trim().is_empty() {
        return Err(ClinicDeskError::InvalidInput(
            "Patient name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn require_amount(amount: f64) -> Result<(), ClinicDeskError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ClinicDeskError::InvalidInput(format!("Invalid amount: {}", amount)));
    }
    Ok(())
}

fn parse_date(value: &str) -> Result<NaiveDate, ClinicDeskError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| ClinicDeskError::InvalidInput(format!("Invalid date {}: {}", value, e)))
}

fn parse_time(value: &str) -> Result<NaiveDateTime, ClinicDeskError> {
    models::parse_visit_time(value)
        .map_err(|e| ClinicDeskError::InvalidInput(format!("Invalid visit time {}: {}", value, e)))
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe insurance info.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMutuelle {
    pub active: bool,
    pub nom: String,
}

impl From<Mutuelle> for FfiMutuelle {
    fn from(m: Mutuelle) -> Self {
        Self {
            active: m.active,
            nom: m.nom,
        }
    }
}

impl From<FfiMutuelle> for Mutuelle {
    fn from(m: FfiMutuelle) -> Self {
        Mutuelle {
            active: m.active,
            nom: m.nom,
        }
    }
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub numero_patient: String,
    pub nom: String,
    pub prenom: String,
    pub telephone: Option<String>,
    pub email: Option<String>,
    pub ville: Option<String>,
    pub cin: Option<String>,
    pub date_naissance: Option<String>,
    pub antecedents: Vec<String>,
    pub mutuelle: Option<FfiMutuelle>,
    pub created_at: String,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id,
            numero_patient: patient.numero_patient,
            nom: patient.nom,
            prenom: patient.prenom,
            telephone: patient.telephone,
            email: patient.email,
            ville: patient.ville,
            cin: patient.cin,
            date_naissance: patient.date_naissance,
            antecedents: patient.antecedents,
            mutuelle: patient.mutuelle.map(Into::into),
            created_at: patient.created_at,
        }
    }
}

/// FFI-safe registration form.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiNewPatient {
    pub nom: String,
    pub prenom: String,
    pub telephone: Option<String>,
    pub email: Option<String>,
    pub ville: Option<String>,
    pub cin: Option<String>,
    pub date_naissance: Option<String>,
    pub antecedents: Vec<String>,
    pub mutuelle: Option<FfiMutuelle>,
}

/// FFI-safe visit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisit {
    pub id: String,
    pub patient_id: Option<String>,
    pub nom: Option<String>,
    pub prenom: Option<String>,
    /// `YYYY-MM-DDTHH:MM:SS`
    pub time: String,
    pub status: String,
    pub fiche_number: Option<String>,
    pub amount: f64,
    pub paid: bool,
    pub payment_method: Option<String>,
}

impl From<Visit> for FfiVisit {
    fn from(visit: Visit) -> Self {
        Self {
            id: visit.id,
            patient_id: visit.patient_id,
            nom: visit.nom,
            prenom: visit.prenom,
            time: visit.time.format(models::VISIT_TIME_FORMAT).to_string(),
            status: visit.status.as_str().to_string(),
            fiche_number: visit.fiche_number,
            amount: visit.amount,
            paid: visit.paid,
            payment_method: visit.payment_method,
        }
    }
}

/// FFI-safe scheduling form.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiNewVisit {
    pub patient_id: Option<String>,
    pub nom: Option<String>,
    pub prenom: Option<String>,
    /// `YYYY-MM-DDTHH:MM[:SS]`
    pub time: String,
    pub amount: f64,
}

/// FFI-safe enriched patient row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEnrichedPatient {
    pub patient: FfiPatient,
    pub consultation_count: u32,
    pub last_consultation: Option<String>,
    pub next_appointment: Option<String>,
}

impl From<EnrichedPatient> for FfiEnrichedPatient {
    fn from(enriched: EnrichedPatient) -> Self {
        Self {
            patient: enriched.patient.into(),
            consultation_count: enriched.consultation_count as u32,
            last_consultation: enriched.last_consultation,
            next_appointment: enriched.next_appointment,
        }
    }
}
