use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Course, UserProfile};

/// Full data dump. Tasks and notes belong to other tools and ride along untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Backup {
    pub user: UserProfile,
    pub courses: Vec<Course>,
    pub tasks: serde_json::Value,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
}

/// The parts of a backup this tool stores but never reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notebook {
    pub tasks: serde_json::Value,
    pub notes: String,
}

impl Backup {
    pub fn new(user: UserProfile, courses: Vec<Course>, notebook: Notebook) -> Self {
        let tasks = match notebook.tasks {
            serde_json::Value::Null => serde_json::Value::Array(Vec::new()),
            tasks => tasks,
        };
        Self {
            user,
            courses,
            tasks,
            notes: notebook.notes,
            exported_at: Some(Utc::now()),
        }
    }

    pub fn notebook(&self) -> Notebook {
        Notebook {
            tasks: self.tasks.clone(),
            notes: self.notes.clone(),
        }
    }
}

/// Gives every course without a usable id, or sharing one with an earlier
/// course, the next free id. Returns how many ids were reassigned.
pub fn assign_missing_ids(courses: &mut [Course]) -> usize {
    let mut next_id = courses.iter().map(|c| c.id).max().unwrap_or(0).max(0) + 1;
    let mut seen = HashSet::new();
    let mut reassigned = 0;

    for course in courses.iter_mut() {
        if course.id <= 0 || !seen.insert(course.id) {
            course.id = next_id;
            seen.insert(next_id);
            next_id += 1;
            reassigned += 1;
        }
    }

    reassigned
}

pub fn load(path: &Path) -> anyhow::Result<Backup> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read backup {}", path.display()))?;
    parse(&raw).with_context(|| format!("invalid backup {}", path.display()))
}

pub fn parse(raw: &str) -> anyhow::Result<Backup> {
    let mut backup: Backup = serde_json::from_str(raw)?;
    let reassigned = assign_missing_ids(&mut backup.courses);
    if reassigned > 0 {
        tracing::warn!(reassigned, "backup courses without a unique id were given new ids");
    }
    Ok(backup)
}

pub fn write(path: &Path, backup: &Backup) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(backup)?;
    std::fs::write(path, body)
        .with_context(|| format!("failed to write backup {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GradingMode;

    #[test]
    fn parses_app_export_and_reads_tasks() {
        let raw = r#"{
            "user": {"name": "Kiara", "semester": 5, "minGrade": 3.0, "maxGrade": 5.0,
                     "targetGrade": 4.2, "gradingMode": "detailed", "theme": "dark"},
            "courses": [{"id": 3, "name": "Statistics", "code": "EST-210", "cuts": []}],
            "tasks": [{"id": 1, "text": "Read chapter 4", "done": false}],
            "notes": "bring calculator"
        }"#;

        let backup = parse(raw).expect("backup parses");
        assert_eq!(backup.user.grading_mode, GradingMode::Detailed);
        assert_eq!(backup.user.target_grade, 4.2);
        assert_eq!(backup.courses[0].code, "EST-210");
        assert_eq!(backup.tasks[0]["text"], "Read chapter 4");
        assert_eq!(backup.notes, "bring calculator");
        assert!(backup.exported_at.is_none());
    }

    #[test]
    fn written_backup_keeps_what_it_does_not_read() {
        let raw = r#"{
            "user": {"name": "Kiara", "theme": "dark", "accentColor": "rose",
                     "preferences": {"compactMode": true}},
            "courses": [{"id": 3, "code": "EST-210",
                         "schedule": {"day": "Monday", "time": "08:00"}}],
            "tasks": [{"id": 1, "text": "Read chapter 4", "done": false}],
            "notes": "bring calculator"
        }"#;

        let loaded = parse(raw).unwrap();
        let rewritten = Backup::new(loaded.user.clone(), loaded.courses.clone(), loaded.notebook());
        let value = serde_json::to_value(&rewritten).unwrap();

        assert_eq!(value["tasks"][0]["text"], "Read chapter 4");
        assert_eq!(value["notes"], "bring calculator");
        assert_eq!(value["courses"][0]["schedule"]["day"], "Monday");
        assert_eq!(value["user"]["theme"], "dark");
        assert_eq!(value["user"]["preferences"]["compactMode"], true);

        let reparsed = parse(&value.to_string()).unwrap();
        assert_eq!(reparsed.courses, loaded.courses);
        assert_eq!(reparsed.user, loaded.user);
    }

    #[test]
    fn courses_without_unique_ids_get_fresh_ones() {
        let raw = r#"{"courses": [
            {"code": "A"}, {"id": 7, "code": "B"}, {"code": "C"}, {"id": 7, "code": "D"}
        ]}"#;

        let backup = parse(raw).unwrap();
        let ids: Vec<i64> = backup.courses.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![8, 7, 9, 10]);

        let mut clean = backup.courses.clone();
        assert_eq!(assign_missing_ids(&mut clean), 0);
        assert_eq!(clean, backup.courses);
    }

    #[test]
    fn serializes_in_camel_case() {
        let backup = Backup::new(UserProfile::default(), Vec::new(), Notebook::default());
        let value = serde_json::to_value(&backup).unwrap();
        assert!(value["user"].get("minGrade").is_some());
        assert!(value.get("exportedAt").is_some());
        assert_eq!(value["tasks"], serde_json::json!([]));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse("{\"courses\": 12}").is_err());
    }
}
