use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("schooldesk.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            grade TEXT NOT NULL,
            section TEXT NOT NULL,
            roll_no INTEGER NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            guardian TEXT,
            monthly_fee REAL NOT NULL,
            active INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_grade_section ON students(grade, section)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_grade_roll ON students(grade, section, roll_no)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            grade TEXT NOT NULL,
            name TEXT NOT NULL,
            credit_hours REAL NOT NULL,
            max_theory REAL NOT NULL,
            max_practical REAL NOT NULL,
            sort_order INTEGER NOT NULL,
            UNIQUE(grade, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_grade ON subjects(grade, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            term TEXT NOT NULL,
            theory REAL NOT NULL,
            practical REAL NOT NULL,
            final_grade TEXT,
            grade_point REAL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(student_id, subject_id, term)
        )",
        [],
    )?;
    // Early workspaces predate the grade snapshot columns.
    ensure_marks_snapshot_columns(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student ON marks(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_subject ON marks(subject_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_term ON marks(term)",
        [],
    )?;

    ensure_students_guardian(&conn)?;

    Ok(conn)
}

fn ensure_marks_snapshot_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "marks", "final_grade")? {
        conn.execute("ALTER TABLE marks ADD COLUMN final_grade TEXT", [])?;
    }
    if !table_has_column(conn, "marks", "grade_point")? {
        conn.execute("ALTER TABLE marks ADD COLUMN grade_point REAL", [])?;
    }
    Ok(())
}

fn ensure_students_guardian(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "guardian")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN guardian TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
