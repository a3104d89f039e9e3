use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One band of the letter-grade scale. Bands are kept sorted by
/// `min_percent` descending; the last band is the failing catch-all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub min_percent: f64,
    pub grade: String,
    pub grade_point: f64,
}

/// Round to 2 decimals for GPA display values.
pub fn round_2(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Maps a percentage to a letter grade and grade point.
///
/// Total over all reals: the first band whose cutoff is satisfied wins,
/// anything below every cutoff (including negatives) lands in the last
/// band, and values above 100 land in the top band.
pub fn resolve_grade(scale: &[GradeBand], percentage: f64) -> (&str, f64) {
    for band in scale {
        if percentage >= band.min_percent {
            return (&band.grade, band.grade_point);
        }
    }
    match scale.last() {
        Some(band) => (&band.grade, band.grade_point),
        None => ("F", 0.0),
    }
}

/// The failing grade is the scale's catch-all band.
pub fn failing_grade(scale: &[GradeBand]) -> &str {
    scale.last().map(|b| b.grade.as_str()).unwrap_or("F")
}

/// Raw per-subject marks as stored; a subject with no practical
/// component carries zeros, never missing fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSubjectMarks {
    pub subject_name: String,
    pub theory: f64,
    pub practical: f64,
    pub max_theory: f64,
    pub max_practical: f64,
    pub credit_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub subject_name: String,
    pub theory: f64,
    pub practical: f64,
    pub total_marks: f64,
    pub max_total: f64,
    pub percentage: f64,
    pub grade: String,
    pub grade_point: f64,
    pub credit_hours: f64,
}

pub fn aggregate_subject(scale: &[GradeBand], raw: &RawSubjectMarks) -> SubjectResult {
    let total_marks = raw.theory + raw.practical;
    let max_total = raw.max_theory + raw.max_practical;
    let percentage = if max_total > 0.0 {
        100.0 * total_marks / max_total
    } else {
        0.0
    };
    let (grade, grade_point) = resolve_grade(scale, percentage);
    SubjectResult {
        subject_name: raw.subject_name.clone(),
        theory: raw.theory,
        practical: raw.practical,
        total_marks,
        max_total,
        percentage,
        grade: grade.to_string(),
        grade_point,
        credit_hours: raw.credit_hours,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAggregate {
    pub student_id: String,
    pub roll_no: i64,
    pub total_marks: f64,
    pub max_total: f64,
    pub percentage: f64,
    pub gpa: f64,
    pub overall_grade: String,
    pub passed: bool,
    pub rank: Option<i64>,
}

/// Sums a student's subject results into the term aggregate. Rank stays
/// unset until the whole class group is known.
///
/// GPA is the credit-hour-weighted mean of per-subject grade points, not
/// the grade point of the overall percentage; the two grade fields are
/// computed independently and may disagree. A single failing subject
/// fails the term regardless of the overall average.
pub fn aggregate_student(
    scale: &[GradeBand],
    student_id: &str,
    roll_no: i64,
    results: &[SubjectResult],
) -> StudentAggregate {
    let mut total_marks = 0.0;
    let mut max_total = 0.0;
    let mut point_sum = 0.0;
    let mut credit_sum = 0.0;
    let fail = failing_grade(scale);
    let mut passed = true;

    for r in results {
        total_marks += r.total_marks;
        max_total += r.max_total;
        point_sum += r.grade_point * r.credit_hours;
        credit_sum += r.credit_hours;
        if r.grade == fail {
            passed = false;
        }
    }

    let percentage = if max_total > 0.0 {
        100.0 * total_marks / max_total
    } else {
        0.0
    };
    let gpa = if credit_sum > 0.0 {
        round_2(point_sum / credit_sum)
    } else {
        0.0
    };
    let (overall_grade, _) = resolve_grade(scale, percentage);

    StudentAggregate {
        student_id: student_id.to_string(),
        roll_no,
        total_marks,
        max_total,
        percentage,
        gpa,
        overall_grade: overall_grade.to_string(),
        passed,
        rank: None,
    }
}

/// Competition ranking over a class group: descending by total marks,
/// ties share a rank, and the sequence after a tie group skips the tied
/// count (1,2,2,4). The slice itself is not reordered, so the caller's
/// display order (roll number) is untouched.
pub fn assign_ranks(students: &mut [StudentAggregate]) {
    let mut order: Vec<usize> = (0..students.len()).collect();
    order.sort_by(|&a, &b| {
        students[b]
            .total_marks
            .partial_cmp(&students[a].total_marks)
            .unwrap_or(Ordering::Equal)
    });

    let mut prev_total = f64::NAN;
    let mut prev_rank = 0_i64;
    for (pos, &i) in order.iter().enumerate() {
        let rank = if pos > 0 && students[i].total_marks == prev_total {
            prev_rank
        } else {
            (pos as i64) + 1
        };
        students[i].rank = Some(rank);
        prev_total = students[i].total_marks;
        prev_rank = rank;
    }
}
