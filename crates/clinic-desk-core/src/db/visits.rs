//! Visit database operations.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{Visit, VisitStatus, VISIT_TIME_FORMAT};

const VISIT_COLUMNS: &str = "id, patient_id, nom, prenom, time, status, fiche_number, amount, \
     paid, payment_method, created_at, updated_at";

impl Database {
    /// Insert a new visit.
    pub fn insert_visit(&self, visit: &Visit) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO visits (
                id, patient_id, nom, prenom, time, status, fiche_number,
                amount, paid, payment_method, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                visit.id,
                visit.patient_id,
                visit.nom,
                visit.prenom,
                visit.time.format(VISIT_TIME_FORMAT).to_string(),
                visit.status.as_str(),
                visit.fiche_number,
                visit.amount,
                visit.paid,
                visit.payment_method,
                visit.created_at,
                visit.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing visit.
    pub fn update_visit(&self, visit: &Visit) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE visits SET
                patient_id = ?2,
                nom = ?3,
                prenom = ?4,
                time = ?5,
                status = ?6,
                fiche_number = ?7,
                amount = ?8,
                paid = ?9,
                payment_method = ?10,
                updated_at = ?11
            WHERE id = ?1
            "#,
            params![
                visit.id,
                visit.patient_id,
                visit.nom,
                visit.prenom,
                visit.time.format(VISIT_TIME_FORMAT).to_string(),
                visit.status.as_str(),
                visit.fiche_number,
                visit.amount,
                visit.paid,
                visit.payment_method,
                visit.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a visit by ID.
    pub fn get_visit(&self, id: &str) -> DbResult<Option<Visit>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM visits WHERE id = ?", VISIT_COLUMNS),
                [id],
                read_visit_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all visits, ordered by time.
    pub fn list_visits(&self) -> DbResult<Vec<Visit>> {
        self.query_visits(
            &format!("SELECT {} FROM visits ORDER BY time, rowid", VISIT_COLUMNS),
            [],
        )
    }

    /// List all visits of a patient, ordered by time.
    pub fn list_visits_for_patient(&self, patient_id: &str) -> DbResult<Vec<Visit>> {
        self.query_visits(
            &format!(
                "SELECT {} FROM visits WHERE patient_id = ? ORDER BY time, rowid",
                VISIT_COLUMNS
            ),
            [patient_id],
        )
    }

    /// List the visits of one calendar day, ordered by time.
    pub fn list_visits_on(&self, date: NaiveDate) -> DbResult<Vec<Visit>> {
        let day = date.format("%Y-%m-%d").to_string();
        self.query_visits(
            &format!(
                "SELECT {} FROM visits WHERE substr(time, 1, 10) = ? ORDER BY time, rowid",
                VISIT_COLUMNS
            ),
            [day],
        )
    }

    /// Delete a visit.
    pub fn delete_visit(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM visits WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    fn query_visits<P: rusqlite::Params>(&self, sql: &str, params: P) -> DbResult<Vec<Visit>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, read_visit_row)?;

        let mut visits = Vec::new();
        for row in rows {
            visits.push(row?.try_into()?);
        }
        Ok(visits)
    }
}

/// Intermediate row struct for database mapping.
struct VisitRow {
    id: String,
    patient_id: Option<String>,
    nom: Option<String>,
    prenom: Option<String>,
    time: String,
    status: String,
    fiche_number: Option<String>,
    amount: f64,
    paid: bool,
    payment_method: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_visit_row(row: &Row<'_>) -> rusqlite::Result<VisitRow> {
    Ok(VisitRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        nom: row.get(2)?,
        prenom: row.get(3)?,
        time: row.get(4)?,
        status: row.get(5)?,
        fiche_number: row.get(6)?,
        amount: row.get(7)?,
        paid: row.get(8)?,
        payment_method: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl TryFrom<VisitRow> for Visit {
    type Error = DbError;

    fn try_from(row: VisitRow) -> Result<Self, Self::Error> {
        let time = crate::models::parse_visit_time(&row.time)
            .map_err(|e| DbError::Constraint(format!("Bad visit time {}: {}", row.time, e)))?;
        let status: VisitStatus = row.status.parse().map_err(DbError::Constraint)?;

        Ok(Visit {
            id: row.id,
            patient_id: row.patient_id,
            nom: row.nom,
            prenom: row.prenom,
            time,
            status,
            fiche_number: row.fiche_number,
            amount: row.amount,
            paid: row.paid,
            payment_method: row.payment_method,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{parse_visit_time, Patient};

    fn setup_db() -> (Database, Patient) {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Dupont".into(), "Marie".into());
        db.insert_patient(&patient).unwrap();
        (db, patient)
    }

    #[test]
    fn test_insert_and_get() {
        let (db, patient) = setup_db();

        let mut visit =
            Visit::for_patient(patient.id.clone(), parse_visit_time("2024-03-01T09:30").unwrap());
        visit.status = VisitStatus::Validated;
        visit.fiche_number = Some("F24-0001".into());
        visit.amount = 250.0;
        visit.paid = true;
        visit.payment_method = Some("Espèces".into());
        db.insert_visit(&visit).unwrap();

        let retrieved = db.get_visit(&visit.id).unwrap().unwrap();
        assert_eq!(retrieved, visit);
    }

    #[test]
    fn test_walk_in_visit_without_patient() {
        let (db, _) = setup_db();

        let mut visit = Visit::new(parse_visit_time("2024-03-01T10:00").unwrap());
        visit.nom = Some("Alami".into());
        visit.prenom = Some("Sara".into());
        db.insert_visit(&visit).unwrap();

        let retrieved = db.get_visit(&visit.id).unwrap().unwrap();
        assert_eq!(retrieved.patient_id, None);
        assert_eq!(retrieved.walk_in_name(), Some(("Alami", "Sara")));
    }

    #[test]
    fn test_visit_for_unknown_patient_rejected() {
        let (db, _) = setup_db();
        let visit =
            Visit::for_patient("nobody".into(), parse_visit_time("2024-03-01T10:00").unwrap());
        assert!(db.insert_visit(&visit).is_err());
    }

    #[test]
    fn test_duplicate_fiche_rejected_by_database() {
        let (db, patient) = setup_db();

        let mut first =
            Visit::for_patient(patient.id.clone(), parse_visit_time("2024-03-01T09:00").unwrap());
        first.status = VisitStatus::Validated;
        first.fiche_number = Some("F24-0001".into());
        db.insert_visit(&first).unwrap();

        let mut second =
            Visit::for_patient(patient.id.clone(), parse_visit_time("2024-03-02T09:00").unwrap());
        db.insert_visit(&second).unwrap();

        second.status = VisitStatus::Validated;
        second.fiche_number = Some("F24-0001".into());
        assert!(db.update_visit(&second).is_err());
    }

    #[test]
    fn test_update_stores_model_timestamp() {
        let (db, patient) = setup_db();
        let mut visit =
            Visit::for_patient(patient.id.clone(), parse_visit_time("2024-03-01T09:00").unwrap());
        db.insert_visit(&visit).unwrap();

        visit.paid = true;
        visit.updated_at = "2024-03-01T09:45:00+00:00".into();
        assert!(db.update_visit(&visit).unwrap());

        let retrieved = db.get_visit(&visit.id).unwrap().unwrap();
        assert_eq!(retrieved, visit);
    }

    #[test]
    fn test_list_ordering_and_filters() {
        let (db, patient) = setup_db();

        for time in ["2024-03-02T09:00", "2024-03-01T15:00", "2024-03-01T08:00"] {
            let visit =
                Visit::for_patient(patient.id.clone(), parse_visit_time(time).unwrap());
            db.insert_visit(&visit).unwrap();
        }
        db.insert_visit(&Visit::new(parse_visit_time("2024-03-01T12:00").unwrap()))
            .unwrap();

        let all = db.list_visits().unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].time <= w[1].time));

        assert_eq!(db.list_visits_for_patient(&patient.id).unwrap().len(), 3);

        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let on_day = db.list_visits_on(day).unwrap();
        assert_eq!(on_day.len(), 3);
        assert_eq!(on_day[0].time, parse_visit_time("2024-03-01T08:00").unwrap());
    }

    #[test]
    fn test_delete_visit() {
        let (db, patient) = setup_db();
        let visit =
            Visit::for_patient(patient.id.clone(), parse_visit_time("2024-03-01T09:00").unwrap());
        db.insert_visit(&visit).unwrap();

        assert!(db.delete_visit(&visit.id).unwrap());
        assert!(!db.delete_visit(&visit.id).unwrap());
    }
}
