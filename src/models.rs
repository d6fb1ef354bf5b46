use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GradingMode {
    /// Cut grades are typed in directly.
    #[default]
    Simple,
    /// Cut grades are derived from their activities.
    Detailed,
}

impl std::fmt::Display for GradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GradingMode::Simple => write!(f, "simple"),
            GradingMode::Detailed => write!(f, "detailed"),
        }
    }
}

/// `min` is the lowest passing grade, `max` the top of the scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingScale {
    pub min: f64,
    pub max: f64,
}

impl Default for GradingScale {
    fn default() -> Self {
        Self { min: 3.0, max: 5.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Activity {
    pub id: i64,
    pub name: String,
    pub weight: f64,
    pub grade: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cut {
    pub id: i64,
    pub name: String,
    pub weight: f64,
    pub grade: String,
    pub activities: Vec<Activity>,
}

impl Cut {
    pub fn find_activity_mut(&mut self, name: &str) -> Option<&mut Activity> {
        self.activities
            .iter_mut()
            .find(|activity| activity.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn next_activity_id(&self) -> i64 {
        self.activities.iter().map(|a| a.id).max().unwrap_or(0) + 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    pub id: i64,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schedule {
    pub day: String,
    pub time: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modality {
    #[default]
    #[serde(rename = "presencial", alias = "in-person")]
    InPerson,
    #[serde(rename = "virtual")]
    Virtual,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::InPerson => "presencial",
            Modality::Virtual => "virtual",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "virtual" => Modality::Virtual,
            _ => Modality::InPerson,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub credits: i32,
    pub professor: String,
    pub semester: i32,
    pub modality: Modality,
    pub location: String,
    pub color: String,
    pub average: String,
    pub progress: f64,
    pub cuts: Vec<Cut>,
    pub resources: Vec<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    /// Fields this tool does not interpret, kept so backups round-trip.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Course {
    pub fn find_cut_mut(&mut self, name: &str) -> Option<&mut Cut> {
        self.cuts
            .iter_mut()
            .find(|cut| cut.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn next_cut_id(&self) -> i64 {
        self.cuts.iter().map(|c| c.id).max().unwrap_or(0) + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub semester: i32,
    pub university: Option<String>,
    pub career: Option<String>,
    pub min_grade: f64,
    pub max_grade: f64,
    pub target_grade: f64,
    pub grading_mode: GradingMode,
    /// Theme, preferences, achievements and the like; carried, never read.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for UserProfile {
    fn default() -> Self {
        let scale = GradingScale::default();
        Self {
            name: String::new(),
            semester: 1,
            university: None,
            career: None,
            min_grade: scale.min,
            max_grade: scale.max,
            target_grade: 4.5,
            grading_mode: GradingMode::Simple,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseStatus {
    Passing,
    AtRisk,
    Ungraded,
}

impl CourseStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CourseStatus::Passing => "passing",
            CourseStatus::AtRisk => "at risk",
            CourseStatus::Ungraded => "ungraded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_deserializes_from_backup_layout() {
        let raw = r#"{
            "id": 1717000000000,
            "name": "Calculus II",
            "code": "MAT-202",
            "credits": 4,
            "professor": "Dr. Rivas",
            "semester": 3,
            "modality": "virtual",
            "color": "royal",
            "average": "3.10",
            "progress": 0.6,
            "cuts": [
                {"id": 1, "name": "Midterm", "weight": 30, "grade": "3.5",
                 "activities": [{"id": 7, "name": "Quiz", "weight": 40, "grade": "4.0"}]},
                {"id": 2, "name": "Final", "weight": 40, "grade": ""}
            ],
            "resources": []
        }"#;

        let course: Course = serde_json::from_str(raw).expect("valid course json");
        assert_eq!(course.code, "MAT-202");
        assert_eq!(course.modality, Modality::Virtual);
        assert_eq!(course.cuts.len(), 2);
        assert_eq!(course.cuts[0].activities[0].grade, "4.0");
        assert!(course.cuts[1].activities.is_empty());
        assert_eq!(course.location, "");
        assert!(course.schedule.is_none());
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = r#"{
            "id": 5,
            "code": "FIS-101",
            "schedule": {"day": "Tuesday", "time": "10:00"},
            "isArchived": true
        }"#;

        let course: Course = serde_json::from_str(raw).unwrap();
        assert_eq!(
            course.schedule,
            Some(Schedule {
                day: "Tuesday".to_string(),
                time: "10:00".to_string()
            })
        );
        assert_eq!(course.extra["isArchived"], Value::Bool(true));

        let written = serde_json::to_value(&course).unwrap();
        assert_eq!(written["schedule"]["time"], "10:00");
        assert_eq!(written["isArchived"], true);

        let profile: UserProfile =
            serde_json::from_str(r#"{"name": "Kiara", "theme": "dark", "completedAchievements": ["a1"]}"#)
                .unwrap();
        let written = serde_json::to_value(&profile).unwrap();
        assert_eq!(written["theme"], "dark");
        assert_eq!(written["completedAchievements"][0], "a1");
        assert_eq!(written["minGrade"], 3.0);
    }

    #[test]
    fn lookups_ignore_case_and_ids_advance() {
        let mut course = Course {
            cuts: vec![
                Cut {
                    id: 4,
                    name: "Midterm".to_string(),
                    ..Cut::default()
                },
                Cut {
                    id: 9,
                    name: "Final".to_string(),
                    ..Cut::default()
                },
            ],
            ..Course::default()
        };

        assert!(course.find_cut_mut(" midterm ").is_some());
        assert!(course.find_cut_mut("Lab").is_none());
        assert_eq!(course.next_cut_id(), 10);
        assert_eq!(Cut::default().next_activity_id(), 1);
    }

    #[test]
    fn profile_defaults_match_grading_scale() {
        let profile: UserProfile = serde_json::from_str(r#"{"name": "Avery"}"#).unwrap();
        assert_eq!(profile.min_grade, 3.0);
        assert_eq!(profile.max_grade, 5.0);
        assert_eq!(profile.target_grade, 4.5);
        assert_eq!(profile.grading_mode, GradingMode::Simple);
    }
}
