use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical section representation. Everything downstream of the
/// data-access boundary works with this type only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub code: String,
    pub name: String,
}

// Stored section lists accumulated three shapes over time: bare code
// strings ("A"), long opaque document ids, and objects with some subset
// of code/name/id fields. This is the single place that flattens them.

fn looks_like_document_id(s: &str) -> bool {
    s.len() >= 12 && s.chars().all(|c| c.is_ascii_alphanumeric())
}

fn section_from_str(s: &str) -> Option<Section> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    if looks_like_document_id(t) {
        // Opaque id with no display data; keep it intact as both fields.
        return Some(Section {
            code: t.to_string(),
            name: t.to_string(),
        });
    }
    let code = t.to_ascii_uppercase();
    Some(Section {
        name: format!("Section {}", code),
        code,
    })
}

fn section_from_object(obj: &serde_json::Map<String, Value>) -> Option<Section> {
    let get_str = |key: &str| {
        obj.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let code = get_str("code")
        .map(|c| {
            if looks_like_document_id(c) {
                c.to_string()
            } else {
                c.to_ascii_uppercase()
            }
        })
        .or_else(|| {
            get_str("name")
                .filter(|n| n.len() <= 4)
                .map(|n| n.to_ascii_uppercase())
        })
        .or_else(|| get_str("id").map(str::to_string))?;
    let name = get_str("name")
        .map(str::to_string)
        .unwrap_or_else(|| format!("Section {}", code));
    Some(Section { code, name })
}

/// Converts whatever shape the store held into canonical sections,
/// dropping unusable entries and duplicate codes (first wins).
pub fn normalize_sections(raw: &Value) -> Vec<Section> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };

    let mut out: Vec<Section> = Vec::new();
    for item in items {
        let section = match item {
            Value::String(s) => section_from_str(s),
            Value::Object(obj) => section_from_object(obj),
            _ => None,
        };
        if let Some(section) = section {
            if !out.iter().any(|s| s.code == section.code) {
                out.push(section);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_codes_become_uppercase_sections() {
        let got = normalize_sections(&json!(["a", "B"]));
        assert_eq!(
            got,
            vec![
                Section {
                    code: "A".into(),
                    name: "Section A".into()
                },
                Section {
                    code: "B".into(),
                    name: "Section B".into()
                },
            ]
        );
    }

    #[test]
    fn objects_prefer_code_then_short_name_then_id() {
        let got = normalize_sections(&json!([
            { "code": "c", "name": "Morning C" },
            { "name": "D" },
            { "id": "5f1e9a2b7c3d4e5f6a7b8c9d", "name": "Evening Shift" },
        ]));
        assert_eq!(got[0].code, "C");
        assert_eq!(got[0].name, "Morning C");
        assert_eq!(got[1].code, "D");
        assert_eq!(got[2].code, "5f1e9a2b7c3d4e5f6a7b8c9d");
        assert_eq!(got[2].name, "Evening Shift");
    }

    #[test]
    fn long_ids_pass_through_unmangled() {
        let got = normalize_sections(&json!(["5f1e9a2b7c3d4e5f6a7b8c9d"]));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].code, "5f1e9a2b7c3d4e5f6a7b8c9d");
    }

    #[test]
    fn junk_and_duplicates_are_dropped() {
        let got = normalize_sections(&json!(["A", "", 42, null, { "code": "a" }, "A"]));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].code, "A");
    }

    #[test]
    fn non_array_input_yields_nothing() {
        assert!(normalize_sections(&json!("A")).is_empty());
        assert!(normalize_sections(&json!({ "sections": ["A"] })).is_empty());
    }
}
