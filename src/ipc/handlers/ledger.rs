use crate::defaults::{self, SchoolConfig};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::scoring::{
    aggregate_student, assign_ranks, RawSubjectMarks, StudentAggregate, SubjectResult,
};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRow {
    pub display_name: String,
    #[serde(flatten)]
    pub aggregate: StudentAggregate,
    pub subjects: Vec<SubjectResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerModel {
    pub grade: String,
    pub section: String,
    pub term: String,
    pub rows: Vec<LedgerRow>,
}

/// Builds the report-card ledger for one (grade, section, term) group.
///
/// Everything is recomputed from raw stored marks; the grade snapshot
/// written at marks entry is never consulted, so a later scale change
/// cannot leave the ledger stale. Ranks are assigned over the whole
/// group, then rows are returned in roll-number order for display.
pub fn build_ledger(
    conn: &Connection,
    config: &SchoolConfig,
    grade: &str,
    section: &str,
    term: &str,
) -> Result<LedgerModel, HandlerErr> {
    let mut students_stmt = conn
        .prepare(
            "SELECT id, roll_no, last_name, first_name
             FROM students
             WHERE grade = ? AND section = ? AND active = 1
             ORDER BY roll_no",
        )
        .map_err(HandlerErr::db_query)?;
    let students: Vec<(String, i64, String, String)> = students_stmt
        .query_map((grade, section), |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    let mut marks_stmt = conn
        .prepare(
            "SELECT m.student_id, sub.name, m.theory, m.practical,
                    sub.max_theory, sub.max_practical, sub.credit_hours
             FROM marks m
             JOIN subjects sub ON sub.id = m.subject_id
             JOIN students s ON s.id = m.student_id
             WHERE s.grade = ? AND s.section = ? AND m.term = ?
             ORDER BY sub.sort_order",
        )
        .map_err(HandlerErr::db_query)?;
    let raw_marks: Vec<(String, RawSubjectMarks)> = marks_stmt
        .query_map((grade, section, term), |r| {
            let student_id: String = r.get(0)?;
            Ok((
                student_id,
                RawSubjectMarks {
                    subject_name: r.get(1)?,
                    theory: r.get(2)?,
                    practical: r.get(3)?,
                    max_theory: r.get(4)?,
                    max_practical: r.get(5)?,
                    credit_hours: r.get(6)?,
                },
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    let mut rows: Vec<LedgerRow> = Vec::with_capacity(students.len());
    for (student_id, roll_no, last, first) in &students {
        let subjects: Vec<SubjectResult> = raw_marks
            .iter()
            .filter(|(sid, _)| sid == student_id)
            .map(|(_, raw)| crate::scoring::aggregate_subject(&config.grade_scale, raw))
            .collect();
        let aggregate = aggregate_student(&config.grade_scale, student_id, *roll_no, &subjects);
        rows.push(LedgerRow {
            display_name: format!("{}, {}", last, first),
            aggregate,
            subjects,
        });
    }

    let mut aggregates: Vec<StudentAggregate> =
        rows.iter().map(|r| r.aggregate.clone()).collect();
    assign_ranks(&mut aggregates);
    for (row, ranked) in rows.iter_mut().zip(aggregates) {
        row.aggregate.rank = ranked.rank;
    }

    // Students come out of the query in roll order already; ranking did
    // not reorder anything.
    Ok(LedgerModel {
        grade: grade.to_string(),
        section: section.to_string(),
        term: term.to_string(),
        rows,
    })
}

fn handle_ledger_build(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (Some(grade), Some(section), Some(term)) = (
        req.params.get("grade").and_then(|v| v.as_str()),
        req.params.get("section").and_then(|v| v.as_str()),
        req.params.get("term").and_then(|v| v.as_str()),
    ) else {
        return err(&req.id, "bad_params", "missing grade/section/term", None);
    };

    let config = match defaults::load_config(conn) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    match build_ledger(conn, &config, grade, section, term) {
        Ok(model) => match serde_json::to_value(&model) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => e.response(&req.id),
    }
}

fn handle_ledger_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (Some(grade), Some(section), Some(term), Some(student_id)) = (
        req.params.get("grade").and_then(|v| v.as_str()),
        req.params.get("section").and_then(|v| v.as_str()),
        req.params.get("term").and_then(|v| v.as_str()),
        req.params.get("studentId").and_then(|v| v.as_str()),
    ) else {
        return err(
            &req.id,
            "bad_params",
            "missing grade/section/term/studentId",
            None,
        );
    };

    let config = match defaults::load_config(conn) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Single report card still needs the whole group: rank is relative.
    let model = match build_ledger(conn, &config, grade, section, term) {
        Ok(m) => m,
        Err(e) => return e.response(&req.id),
    };
    let Some(row) = model
        .rows
        .into_iter()
        .find(|r| r.aggregate.student_id == student_id)
    else {
        return err(&req.id, "not_found", "student not in this group", None);
    };

    match serde_json::to_value(&row) {
        Ok(v) => ok(&req.id, json!({ "grade": grade, "section": section, "term": term, "row": v })),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "ledger.build" => Some(handle_ledger_build(state, req)),
        "ledger.student" => Some(handle_ledger_student(state, req)),
        _ => None,
    }
}
