use anyhow::{anyhow, bail};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::session::PreconditionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub roll_no: u32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Student {
    pub fn new(id: impl Into<String>, roll_no: u32, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roll_no,
            name: name.into(),
            avatar: None,
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    /// Explicit avatar if one was supplied, otherwise initials from the name.
    pub fn display_avatar(&self) -> String {
        match self.avatar.as_deref().map(str::trim) {
            Some(a) if !a.is_empty() => a.to_string(),
            _ => initials(&self.name),
        }
    }

    /// `needle` must already be lower-cased and trimmed.
    fn matches(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.name.to_lowercase().contains(needle)
            || self.roll_no.to_string().contains(needle)
    }
}

/// First letter of the first two words, upper-cased: "Aarav Sharma" -> "AS".
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .take(2)
        .filter_map(|w| w.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Normalized form of a search query as it is matched against the roster.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// An ordered, validated roster. Never empty.
#[derive(Debug, Clone)]
pub struct Roster {
    students: Vec<Student>,
    by_id: HashMap<String, usize>,
}

impl Roster {
    pub fn new(students: Vec<Student>) -> Result<Self, PreconditionError> {
        if students.is_empty() {
            return Err(PreconditionError::EmptyRoster);
        }
        let mut by_id = HashMap::with_capacity(students.len());
        let mut roll_nos = HashSet::with_capacity(students.len());
        for (i, s) in students.iter().enumerate() {
            if by_id.insert(s.id.clone(), i).is_some() {
                return Err(PreconditionError::DuplicateStudent(s.id.clone()));
            }
            if !roll_nos.insert(s.roll_no) {
                return Err(PreconditionError::DuplicateRollNo(s.roll_no));
            }
        }
        Ok(Self { students, by_id })
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn get(&self, pos: usize) -> Option<&Student> {
        self.students.get(pos)
    }

    pub fn position(&self, student_id: &str) -> Option<usize> {
        self.by_id.get(student_id).copied()
    }

    /// Roster positions of the students matching `query`, in roster order.
    pub fn matching(&self, query: &str) -> Vec<usize> {
        let needle = normalize_query(query);
        self.students
            .iter()
            .enumerate()
            .filter(|(_, s)| s.matches(&needle))
            .map(|(i, _)| i)
            .collect()
    }
}

fn parse_student_id(v: Option<&serde_json::Value>) -> Option<String> {
    match v? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => n.as_u64().map(|n| n.to_string()).or_else(|| {
            n.as_i64().map(|n| n.to_string())
        }),
        _ => None,
    }
}

/// Parses a roster payload: `[{ "id", "rollNo", "name", "avatar"? }]`.
///
/// Only the shape is checked here; uniqueness and emptiness are enforced by
/// [`Roster::new`].
pub fn parse_students(value: &serde_json::Value) -> anyhow::Result<Vec<Student>> {
    let Some(items) = value.as_array() else {
        bail!("students must be an array");
    };
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let id = parse_student_id(item.get("id"))
            .ok_or_else(|| anyhow!("students[{}].id must be a non-empty string or integer", i))?;
        let roll_no = item
            .get("rollNo")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| anyhow!("students[{}].rollNo must be a non-negative integer", i))?;
        let name = item
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("students[{}].name must be a non-empty string", i))?;
        let student = Student::new(id, roll_no, name);
        let student = match item.get("avatar") {
            None | Some(serde_json::Value::Null) => student,
            Some(serde_json::Value::String(s)) if s.trim().is_empty() => student,
            Some(serde_json::Value::String(s)) => student.with_avatar(s.trim()),
            Some(_) => bail!("students[{}].avatar must be a string or null", i),
        };
        out.push(student);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Roster {
        Roster::new(vec![
            Student::new("1", 1, "Aarav Sharma"),
            Student::new("2", 2, "Bhavya Patel"),
            Student::new("10", 10, "Jhanvi Kapoor"),
        ])
        .expect("valid roster")
    }

    #[test]
    fn initials_use_first_two_words() {
        assert_eq!(initials("Aarav Sharma"), "AS");
        assert_eq!(initials("  jhanvi   kapoor devi "), "JK");
        assert_eq!(initials("Cher"), "C");
        assert_eq!(initials(""), "");
    }

    #[test]
    fn explicit_avatar_wins_over_initials() {
        let s = Student::new("1", 1, "Aarav Sharma").with_avatar("A!");
        assert_eq!(s.display_avatar(), "A!");
        assert_eq!(Student::new("1", 1, "Aarav Sharma").display_avatar(), "AS");
    }

    #[test]
    fn matching_is_case_insensitive_on_name_and_substring_on_roll_no() {
        let r = sample();
        assert_eq!(r.matching(""), vec![0, 1, 2]);
        assert_eq!(r.matching("BHAVYA"), vec![1]);
        assert_eq!(r.matching("  sharma "), vec![0]);
        // "1" is a substring of both 1 and 10.
        assert_eq!(r.matching("1"), vec![0, 2]);
        assert!(r.matching("zzz").is_empty());
    }

    #[test]
    fn roster_rejects_empty_and_duplicates() {
        assert_eq!(
            Roster::new(vec![]).unwrap_err(),
            PreconditionError::EmptyRoster
        );
        let dup_id = Roster::new(vec![
            Student::new("1", 1, "A"),
            Student::new("1", 2, "B"),
        ]);
        assert_eq!(
            dup_id.unwrap_err(),
            PreconditionError::DuplicateStudent("1".to_string())
        );
        let dup_roll = Roster::new(vec![
            Student::new("1", 7, "A"),
            Student::new("2", 7, "B"),
        ]);
        assert_eq!(dup_roll.unwrap_err(), PreconditionError::DuplicateRollNo(7));
    }

    #[test]
    fn parse_students_accepts_numeric_ids_and_optional_avatar() {
        let parsed = parse_students(&json!([
            { "id": 1, "rollNo": 1, "name": "Aarav Sharma", "avatar": "AS" },
            { "id": "stu-2", "rollNo": 2, "name": " Bhavya Patel " }
        ]))
        .expect("parse");
        assert_eq!(parsed[0].id, "1");
        assert_eq!(parsed[0].avatar.as_deref(), Some("AS"));
        assert_eq!(parsed[1].id, "stu-2");
        assert_eq!(parsed[1].name, "Bhavya Patel");
        assert_eq!(parsed[1].avatar, None);
    }

    #[test]
    fn parse_students_names_the_bad_row() {
        let e = parse_students(&json!([
            { "id": 1, "rollNo": 1, "name": "Aarav Sharma" },
            { "id": 2, "rollNo": -4, "name": "Bhavya Patel" }
        ]))
        .unwrap_err();
        assert!(e.to_string().contains("students[1].rollNo"), "{}", e);
        assert!(parse_students(&json!({ "id": 1 })).is_err());
    }
}
