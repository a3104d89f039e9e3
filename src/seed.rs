use crate::db;
use rusqlite::Connection;
use uuid::Uuid;

/// Demo-mode sample data: one class group with subjects and first-term
/// marks, enough for every screen to render something. Applied only when
/// the caller selected demo mode explicitly and the workspace is empty.
pub fn seed_demo_workspace(conn: &Connection) -> anyhow::Result<()> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
    if existing > 0 {
        return Ok(());
    }

    let students = [
        (1, "Adhikari", "Sita"),
        (2, "Gurung", "Bikash"),
        (3, "Shrestha", "Anita"),
        (4, "Tamang", "Ramesh"),
    ];
    let subjects: [(&str, f64, f64, f64); 3] = [
        ("English", 4.0, 100.0, 0.0),
        ("Mathematics", 4.0, 100.0, 0.0),
        ("Science", 4.0, 75.0, 25.0),
    ];
    // (theory, practical) per student per subject, row-major.
    let marks: [[(f64, f64); 3]; 4] = [
        [(82.0, 0.0), (91.0, 0.0), (60.0, 22.0)],
        [(67.0, 0.0), (74.0, 0.0), (55.0, 18.0)],
        [(82.0, 0.0), (88.0, 0.0), (63.0, 22.0)],
        [(45.0, 0.0), (33.0, 0.0), (40.0, 15.0)],
    ];

    let tx = conn.unchecked_transaction()?;
    let now = db::now_rfc3339();

    let mut student_ids = Vec::new();
    for (roll_no, last, first) in students {
        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO students(id, grade, section, roll_no, last_name, first_name, guardian, monthly_fee, active, updated_at)
             VALUES(?, '5', 'A', ?, ?, ?, NULL, 1000.0, 1, ?)",
            (&id, roll_no, last, first, &now),
        )?;
        student_ids.push(id);
    }

    let mut subject_ids = Vec::new();
    for (sort_order, (name, credit, max_theory, max_practical)) in subjects.iter().enumerate() {
        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO subjects(id, grade, name, credit_hours, max_theory, max_practical, sort_order)
             VALUES(?, '5', ?, ?, ?, ?, ?)",
            (&id, name, credit, max_theory, max_practical, sort_order as i64),
        )?;
        subject_ids.push(id);
    }

    for (si, student_id) in student_ids.iter().enumerate() {
        for (ji, subject_id) in subject_ids.iter().enumerate() {
            let (theory, practical) = marks[si][ji];
            tx.execute(
                "INSERT INTO marks(id, student_id, subject_id, term, theory, practical, updated_at)
                 VALUES(?, ?, ?, 'First Term', ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    student_id,
                    subject_id,
                    theory,
                    practical,
                    &now,
                ),
            )?;
        }
    }

    tx.commit()?;
    Ok(())
}
