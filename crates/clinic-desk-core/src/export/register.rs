//! Daily visit register (cash book of validated visits).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::{Database, DbResult};
use crate::models::{Patient, Visit};

/// Single line of the register.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterLine {
    /// Visit time (`HH:mm`)
    pub time: String,
    pub fiche_number: String,
    /// Patient display number, empty for unregistered visits
    pub numero_patient: String,
    pub patient_name: String,
    pub amount: f64,
    pub paid: bool,
    pub payment_method: Option<String>,
}

/// Register of one day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitRegister {
    /// Day covered (`YYYY-MM-DD`)
    pub date: String,
    /// Export timestamp
    pub exported_at: String,
    pub lines: Vec<RegisterLine>,
    /// Sum of all amounts
    pub total_amount: f64,
    /// Sum of paid amounts
    pub total_paid: f64,
    /// Sum of amounts still due
    pub total_unpaid: f64,
}

impl VisitRegister {
    /// Build the register of `date` from validated visits.
    pub fn for_day(date: NaiveDate, visits: &[Visit], patients: &[Patient]) -> Self {
        let mut day_visits: Vec<&Visit> = visits
            .iter()
            .filter(|v| v.is_validated() && v.time.date() == date)
            .collect();
        day_visits.sort_by_key(|v| v.time);

        let lines: Vec<RegisterLine> = day_visits
            .into_iter()
            .map(|visit| {
                let patient = visit
                    .patient_id
                    .as_deref()
                    .and_then(|id| patients.iter().find(|p| p.id == id));
                let (numero_patient, patient_name) = match patient {
                    Some(p) => (p.numero_patient.clone(), p.full_name()),
                    None => (
                        String::new(),
                        visit
                            .walk_in_name()
                            .map(|(nom, prenom)| format!("{} {}", nom, prenom))
                            .unwrap_or_default(),
                    ),
                };

                RegisterLine {
                    time: visit.time.format("%H:%M").to_string(),
                    fiche_number: visit.fiche().unwrap_or_default().to_string(),
                    numero_patient,
                    patient_name,
                    amount: visit.amount,
                    paid: visit.paid,
                    payment_method: visit.payment_method.clone(),
                }
            })
            .collect();

        let total_amount = lines.iter().map(|l| l.amount).sum();
        let total_paid = lines.iter().filter(|l| l.paid).map(|l| l.amount).sum();
        let total_unpaid = lines.iter().filter(|l| !l.paid).map(|l| l.amount).sum();

        Self {
            date: date.format("%Y-%m-%d").to_string(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            lines,
            total_amount,
            total_paid,
            total_unpaid,
        }
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV format.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        // Header
        csv.push_str(
            "date,time,fiche_number,numero_patient,patient_name,amount,paid,payment_method\n",
        );

        for line in &self.lines {
            csv.push_str(&format!(
                "{},{},{},{},{},{:.2},{},{}\n",
                self.date,
                line.time,
                escape_csv(&line.fiche_number),
                escape_csv(&line.numero_patient),
                escape_csv(&line.patient_name),
                line.amount,
                if line.paid { "yes" } else { "no" },
                escape_csv(line.payment_method.as_deref().unwrap_or("")),
            ));
        }

        csv
    }
}

/// Register exporter over the database.
pub struct RegisterExporter<'a> {
    db: &'a Database,
}

impl<'a> RegisterExporter<'a> {
    /// Create a new register exporter.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Register of one day.
    pub fn export_day(&self, date: NaiveDate) -> DbResult<VisitRegister> {
        let visits = self.db.list_visits_on(date)?;
        let patients = self.db.list_patients()?;
        Ok(VisitRegister::for_day(date, &visits, &patients))
    }
}

/// Escape a string for CSV output.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
