use crate::db;
use crate::normalize::{normalize_sections, Section};
use crate::scoring::GradeBand;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

/// Canonical grade order, lowest first. Promotion walks this list.
pub const GRADE_ORDER: [&str; 13] = [
    "Nursery", "LKG", "UKG", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10",
];

pub const SECTION_CODES: [&str; 4] = ["A", "B", "C", "D"];

/// Fallback monthly fee when no fee table entry exists for a grade.
pub fn default_monthly_fee(grade: &str) -> f64 {
    match grade {
        "Nursery" | "LKG" | "UKG" => 800.0,
        "1" | "2" | "3" | "4" | "5" => 1000.0,
        "6" | "7" | "8" => 1200.0,
        "9" | "10" => 1500.0,
        _ => 1000.0,
    }
}

/// NEB-style letter scale. The final band is the failing catch-all.
pub fn default_grade_scale() -> Vec<GradeBand> {
    let bands = [
        (90.0, "A+", 4.0),
        (80.0, "A", 3.6),
        (70.0, "B+", 3.2),
        (60.0, "B", 2.8),
        (50.0, "C+", 2.6),
        (40.0, "C", 2.2),
        (35.0, "D", 1.6),
        (0.0, "F", 0.0),
    ];
    bands
        .iter()
        .map(|(min_percent, grade, grade_point)| GradeBand {
            min_percent: *min_percent,
            grade: grade.to_string(),
            grade_point: *grade_point,
        })
        .collect()
}

fn default_sections() -> Vec<Section> {
    SECTION_CODES
        .iter()
        .map(|c| Section {
            code: c.to_string(),
            name: format!("Section {}", c),
        })
        .collect()
}

/// Every configurable lookup the pages used to hardcode, merged over the
/// stored settings rows. Loaded once per request; nothing else in the
/// crate re-derives a fallback.
#[derive(Debug, Clone)]
pub struct SchoolConfig {
    pub grades: Vec<String>,
    pub sections: Vec<Section>,
    pub fees: HashMap<String, f64>,
    pub grade_scale: Vec<GradeBand>,
}

impl SchoolConfig {
    pub fn monthly_fee_for(&self, grade: &str) -> f64 {
        self.fees
            .get(grade)
            .copied()
            .unwrap_or_else(|| default_monthly_fee(grade))
    }

    pub fn has_grade(&self, grade: &str) -> bool {
        self.grades.iter().any(|g| g == grade)
    }
}

pub const SETTINGS_GRADES: &str = "config.grades";
pub const SETTINGS_SECTIONS: &str = "config.sections";
pub const SETTINGS_FEES: &str = "config.fees";
pub const SETTINGS_GRADE_SCALE: &str = "config.gradeScale";

pub fn load_config(conn: &Connection) -> anyhow::Result<SchoolConfig> {
    let grades = match db::settings_get_json(conn, SETTINGS_GRADES)? {
        Some(v) => {
            let parsed: Vec<String> = v
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(|g| g.as_str())
                        .map(|g| g.trim().to_string())
                        .filter(|g| !g.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            if parsed.is_empty() {
                GRADE_ORDER.iter().map(|g| g.to_string()).collect()
            } else {
                parsed
            }
        }
        None => GRADE_ORDER.iter().map(|g| g.to_string()).collect(),
    };

    let sections = match db::settings_get_json(conn, SETTINGS_SECTIONS)? {
        Some(v) => {
            let normalized = normalize_sections(&v);
            if normalized.is_empty() {
                default_sections()
            } else {
                normalized
            }
        }
        None => default_sections(),
    };

    let fees = match db::settings_get_json(conn, SETTINGS_FEES)? {
        Some(v) => v
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_f64().map(|fee| (k.clone(), fee)))
                    .collect()
            })
            .unwrap_or_default(),
        None => HashMap::new(),
    };

    let grade_scale = match db::settings_get_json(conn, SETTINGS_GRADE_SCALE)? {
        Some(v) => {
            let parsed: Vec<GradeBand> = serde_json::from_value(v).unwrap_or_default();
            if parsed.is_empty() {
                default_grade_scale()
            } else {
                parsed
            }
        }
        None => default_grade_scale(),
    };

    Ok(SchoolConfig {
        grades,
        sections,
        fees,
        grade_scale,
    })
}

pub fn save_grades(conn: &Connection, grades: &[String]) -> anyhow::Result<()> {
    db::settings_set_json(conn, SETTINGS_GRADES, &json!(grades))
}

pub fn save_sections(conn: &Connection, sections: &[Section]) -> anyhow::Result<()> {
    db::settings_set_json(conn, SETTINGS_SECTIONS, &serde_json::to_value(sections)?)
}

pub fn save_fees(conn: &Connection, fees: &HashMap<String, f64>) -> anyhow::Result<()> {
    db::settings_set_json(conn, SETTINGS_FEES, &json!(fees))
}

pub fn save_grade_scale(conn: &Connection, scale: &[GradeBand]) -> anyhow::Result<()> {
    db::settings_set_json(conn, SETTINGS_GRADE_SCALE, &serde_json::to_value(scale)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_fallback_covers_every_canonical_grade() {
        for grade in GRADE_ORDER {
            assert!(default_monthly_fee(grade) > 0.0);
        }
        // Unknown grades still get a usable default.
        assert!(default_monthly_fee("Playgroup") > 0.0);
    }

    #[test]
    fn config_fee_wins_over_fallback() {
        let mut fees = HashMap::new();
        fees.insert("5".to_string(), 1750.0);
        let config = SchoolConfig {
            grades: GRADE_ORDER.iter().map(|g| g.to_string()).collect(),
            sections: default_sections(),
            fees,
            grade_scale: default_grade_scale(),
        };
        assert_eq!(config.monthly_fee_for("5"), 1750.0);
        assert_eq!(config.monthly_fee_for("6"), default_monthly_fee("6"));
    }

    #[test]
    fn default_scale_is_descending_with_zero_floor() {
        let scale = default_grade_scale();
        for pair in scale.windows(2) {
            assert!(pair[0].min_percent > pair[1].min_percent);
        }
        assert_eq!(scale.last().unwrap().min_percent, 0.0);
        assert_eq!(scale.last().unwrap().grade, "F");
        assert_eq!(scale.last().unwrap().grade_point, 0.0);
    }
}
