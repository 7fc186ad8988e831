//! SQLite schema definition.

/// Complete database schema for the clinic desk.
pub const SCHEMA: &str = r#"
-- Enable foreign keys (visit cascade on patient delete)
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    numero_patient TEXT NOT NULL DEFAULT '',     -- P0001, empty until allocated
    nom TEXT NOT NULL,
    prenom TEXT NOT NULL,
    telephone TEXT,
    email TEXT,
    ville TEXT,
    cin TEXT,
    date_naissance TEXT,
    antecedents TEXT NOT NULL DEFAULT '[]',      -- JSON array of strings
    mutuelle TEXT,                               -- JSON object {active, nom}
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_numero ON patients(numero_patient);
CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(nom, prenom);

-- ============================================================================
-- Visits
-- ============================================================================

CREATE TABLE IF NOT EXISTS visits (
    id TEXT PRIMARY KEY,
    patient_id TEXT REFERENCES patients(id) ON DELETE CASCADE,  -- NULL for walk-ins
    nom TEXT,
    prenom TEXT,
    time TEXT NOT NULL,                          -- YYYY-MM-DDTHH:MM:SS, practice local
    status TEXT NOT NULL DEFAULT '-',            -- -, Validé, Annulé, Reporté, Absent
    fiche_number TEXT,
    amount REAL NOT NULL DEFAULT 0,
    paid INTEGER NOT NULL DEFAULT 0,
    payment_method TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_visits_patient ON visits(patient_id);
CREATE INDEX IF NOT EXISTS idx_visits_time ON visits(time);

-- No two visits may hold the same fiche number
CREATE UNIQUE INDEX IF NOT EXISTS idx_visits_fiche
    ON visits(fiche_number) WHERE fiche_number IS NOT NULL AND fiche_number <> '';

-- ============================================================================
-- Desk State (small key-value values such as the used patient numbers)
-- ============================================================================

CREATE TABLE IF NOT EXISTS app_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_fiche_number_unique_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO visits (id, time, fiche_number) VALUES ('v1', '2024-01-01T09:00:00', 'F24-0001')",
            [],
        )
        .unwrap();

        // Same fiche number on another visit should fail
        let result = conn.execute(
            "INSERT INTO visits (id, time, fiche_number) VALUES ('v2', '2024-01-02T09:00:00', 'F24-0001')",
            [],
        );
        assert!(result.is_err());

        // Visits without a fiche number are unconstrained
        for id in ["v3", "v4"] {
            let result = conn.execute(
                "INSERT INTO visits (id, time, fiche_number) VALUES (?, '2024-01-03T09:00:00', NULL)",
                [id],
            );
            assert!(result.is_ok());
        }
    }

    #[test]
    fn test_visit_cascade() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO patients (id, nom, prenom) VALUES ('p1', 'Dupont', 'Marie')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO visits (id, patient_id, time) VALUES ('v1', 'p1', '2024-01-01T09:00:00')",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM patients WHERE id = 'p1'", []).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM visits", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
