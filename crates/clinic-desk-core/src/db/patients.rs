//! Patient database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{Mutuelle, Patient};

const PATIENT_COLUMNS: &str = "id, numero_patient, nom, prenom, telephone, email, ville, cin, \
     date_naissance, antecedents, mutuelle, created_at, updated_at";

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        let antecedents_json = serde_json::to_string(&patient.antecedents)?;
        let mutuelle_json = patient
            .mutuelle
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            r#"
            INSERT INTO patients (
                id, numero_patient, nom, prenom, telephone, email, ville, cin,
                date_naissance, antecedents, mutuelle, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                patient.id,
                patient.numero_patient,
                patient.nom,
                patient.prenom,
                patient.telephone,
                patient.email,
                patient.ville,
                patient.cin,
                patient.date_naissance,
                antecedents_json,
                mutuelle_json,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing patient. The creation timestamp is kept.
    pub fn update_patient(&self, patient: &Patient) -> DbResult<bool> {
        let antecedents_json = serde_json::to_string(&patient.antecedents)?;
        let mutuelle_json = patient
            .mutuelle
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                numero_patient = ?2,
                nom = ?3,
                prenom = ?4,
                telephone = ?5,
                email = ?6,
                ville = ?7,
                cin = ?8,
                date_naissance = ?9,
                antecedents = ?10,
                mutuelle = ?11,
                updated_at = ?12
            WHERE id = ?1
            "#,
            params![
                patient.id,
                patient.numero_patient,
                patient.nom,
                patient.prenom,
                patient.telephone,
                patient.email,
                patient.ville,
                patient.cin,
                patient.date_naissance,
                antecedents_json,
                mutuelle_json,
                patient.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM patients WHERE id = ?", PATIENT_COLUMNS),
                [id],
                read_patient_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Find a patient by display number.
    pub fn get_patient_by_number(&self, numero_patient: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM patients WHERE numero_patient = ? LIMIT 1",
                    PATIENT_COLUMNS
                ),
                [numero_patient],
                read_patient_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all patients, oldest first.
    pub fn list_patients(&self) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM patients ORDER BY created_at, rowid",
            PATIENT_COLUMNS
        ))?;

        let rows = stmt.query_map([], read_patient_row)?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.try_into()?);
        }
        Ok(patients)
    }

    /// Delete a patient. Their visits go with them.
    pub fn delete_patient(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM patients WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Write back display numbers after a renumbering, all or nothing.
    pub fn update_patient_numbers(&self, patients: &[Patient]) -> DbResult<()> {
        self.atomically(|db| {
            let mut stmt = db.conn.prepare(
                "UPDATE patients SET numero_patient = ?2, updated_at = ?3 WHERE id = ?1",
            )?;
            for patient in patients {
                let rows_affected = stmt.execute(params![
                    patient.id,
                    patient.numero_patient,
                    patient.updated_at
                ])?;
                if rows_affected == 0 {
                    return Err(DbError::NotFound(format!("patient {}", patient.id)));
                }
            }
            Ok(())
        })
    }
}

/// Intermediate row struct for database mapping.
struct PatientRow {
    id: String,
    numero_patient: String,
    nom: String,
    prenom: String,
    telephone: Option<String>,
    email: Option<String>,
    ville: Option<String>,
    cin: Option<String>,
    date_naissance: Option<String>,
    antecedents: String,
    mutuelle: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_patient_row(row: &Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        id: row.get(0)?,
        numero_patient: row.get(1)?,
        nom: row.get(2)?,
        prenom: row.get(3)?,
        telephone: row.get(4)?,
        email: row.get(5)?,
        ville: row.get(6)?,
        cin: row.get(7)?,
        date_naissance: row.get(8)?,
        antecedents: row.get(9)?,
        mutuelle: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl TryFrom<PatientRow> for Patient {
    type Error = DbError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        let antecedents: Vec<String> = serde_json::from_str(&row.antecedents)?;
        let mutuelle: Option<Mutuelle> = row
            .mutuelle
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Patient {
            id: row.id,
            numero_patient: row.numero_patient,
            nom: row.nom,
            prenom: row.prenom,
            telephone: row.telephone,
            email: row.email,
            ville: row.ville,
            cin: row.cin,
            date_naissance: row.date_naissance,
            antecedents,
            mutuelle,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Visit;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();

        let mut patient = Patient::new("Dupont".into(), "Marie".into());
        patient.numero_patient = "P0001".into();
        patient.antecedents = vec!["Asthme".into(), "HTA".into()];
        patient.mutuelle = Some(Mutuelle {
            active: true,
            nom: "CNOPS".into(),
        });

        db.insert_patient(&patient).unwrap();

        let retrieved = db.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(retrieved, patient);
    }

    #[test]
    fn test_update_patient() {
        let db = setup_db();

        let mut patient = Patient::new("Dupont".into(), "Marie".into());
        db.insert_patient(&patient).unwrap();

        patient.telephone = Some("0600000000".into());
        patient.antecedents.push("Diabète".into());
        assert!(db.update_patient(&patient).unwrap());

        let retrieved = db.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(retrieved.telephone, Some("0600000000".into()));
        assert_eq!(retrieved.antecedents, vec!["Diabète".to_string()]);
        assert_eq!(retrieved.created_at, patient.created_at);
    }

    #[test]
    fn test_update_keeps_model_timestamp() {
        let db = setup_db();

        let mut patient = Patient::new("Dupont".into(), "Marie".into());
        db.insert_patient(&patient).unwrap();

        patient.updated_at = "2024-05-01T08:00:00+00:00".into();
        db.update_patient(&patient).unwrap();
        let retrieved = db.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(retrieved.updated_at, "2024-05-01T08:00:00+00:00");

        patient.numero_patient = "P0001".into();
        patient.touch();
        db.update_patient_numbers(&[patient.clone()]).unwrap();
        let retrieved = db.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(retrieved.updated_at, patient.updated_at);
        assert!(chrono::DateTime::parse_from_rfc3339(&retrieved.updated_at).is_ok());
    }

    #[test]
    fn test_update_missing_patient() {
        let db = setup_db();
        let patient = Patient::new("Dupont".into(), "Marie".into());
        assert!(!db.update_patient(&patient).unwrap());
    }

    #[test]
    fn test_list_patients_in_creation_order() {
        let db = setup_db();

        let mut second = Patient::new("B".into(), "b".into());
        second.created_at = "2024-02-01T00:00:00+00:00".into();
        let mut first = Patient::new("A".into(), "a".into());
        first.created_at = "2024-01-01T00:00:00+00:00".into();

        db.insert_patient(&second).unwrap();
        db.insert_patient(&first).unwrap();

        let names: Vec<String> = db
            .list_patients()
            .unwrap()
            .into_iter()
            .map(|p| p.nom)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_get_by_number() {
        let db = setup_db();
        let mut patient = Patient::new("Dupont".into(), "Marie".into());
        patient.numero_patient = "P0004".into();
        db.insert_patient(&patient).unwrap();

        let found = db.get_patient_by_number("P0004").unwrap().unwrap();
        assert_eq!(found.id, patient.id);
        assert!(db.get_patient_by_number("P0005").unwrap().is_none());
    }

    #[test]
    fn test_delete_cascades_to_visits() {
        let db = setup_db();
        let patient = Patient::new("Dupont".into(), "Marie".into());
        db.insert_patient(&patient).unwrap();

        let time = crate::models::parse_visit_time("2024-03-01T09:00").unwrap();
        let visit = Visit::for_patient(patient.id.clone(), time);
        db.insert_visit(&visit).unwrap();

        assert!(db.delete_patient(&patient.id).unwrap());
        assert!(db.get_visit(&visit.id).unwrap().is_none());
        assert!(!db.delete_patient(&patient.id).unwrap());
    }

    #[test]
    fn test_update_patient_numbers_is_atomic() {
        let db = setup_db();
        let mut patient = Patient::new("Dupont".into(), "Marie".into());
        patient.numero_patient = "P0009".into();
        db.insert_patient(&patient).unwrap();

        patient.numero_patient = "P0001".into();
        let ghost = Patient::new("Ghost".into(), "x".into());

        let result = db.update_patient_numbers(&[patient.clone(), ghost]);
        assert!(matches!(result, Err(DbError::NotFound(_))));

        // Rolled back
        let retrieved = db.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(retrieved.numero_patient, "P0009");

        db.update_patient_numbers(&[patient.clone()]).unwrap();
        let retrieved = db.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(retrieved.numero_patient, "P0001");
    }
}
