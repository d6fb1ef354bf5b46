use serde::Deserialize;

use crate::models::{Activity, Course, Cut};

/// One line of a grade import. Blank activity columns address the cut itself.
#[derive(Debug, Clone, Deserialize)]
pub struct GradeRow {
    pub course_code: String,
    #[serde(default)]
    pub course_name: String,
    #[serde(default)]
    pub semester: Option<i32>,
    pub cut_name: String,
    pub cut_weight: f64,
    #[serde(default)]
    pub activity_name: Option<String>,
    #[serde(default)]
    pub activity_weight: Option<f64>,
    #[serde(default)]
    pub grade: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MergeSummary {
    pub applied: usize,
    pub skipped: usize,
    pub created_courses: usize,
    /// Ids of every course touched by the merge, in first-touch order.
    pub touched: Vec<i64>,
}

/// Merges grade rows into `courses`, creating missing courses, cuts and activities.
pub fn apply_rows(courses: &mut Vec<Course>, rows: &[GradeRow]) -> MergeSummary {
    let mut summary = MergeSummary::default();

    for row in rows {
        let code = row.course_code.trim();
        if code.is_empty() || row.cut_name.trim().is_empty() {
            tracing::warn!(cut = %row.cut_name, "skipping grade row without course code or cut name");
            summary.skipped += 1;
            continue;
        }

        let index = match courses
            .iter()
            .position(|course| course.code.eq_ignore_ascii_case(code))
        {
            Some(index) => index,
            None => {
                let next_id = courses.iter().map(|c| c.id).max().unwrap_or(0) + 1;
                courses.push(Course {
                    id: next_id,
                    code: code.to_string(),
                    name: if row.course_name.trim().is_empty() {
                        code.to_string()
                    } else {
                        row.course_name.trim().to_string()
                    },
                    semester: row.semester.unwrap_or(1),
                    ..Course::default()
                });
                summary.created_courses += 1;
                courses.len() - 1
            }
        };

        let course = &mut courses[index];
        if let Some(semester) = row.semester {
            course.semester = semester;
        }
        apply_to_course(course, row);

        summary.applied += 1;
        if !summary.touched.contains(&course.id) {
            summary.touched.push(course.id);
        }
    }

    summary
}

fn apply_to_course(course: &mut Course, row: &GradeRow) {
    let cut_name = row.cut_name.trim();
    if course.find_cut_mut(cut_name).is_none() {
        let id = course.next_cut_id();
        course.cuts.push(Cut {
            id,
            name: cut_name.to_string(),
            ..Cut::default()
        });
    }
    let Some(cut) = course.find_cut_mut(cut_name) else {
        return;
    };
    cut.weight = row.cut_weight;

    let activity_name = row
        .activity_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let Some(activity_name) = activity_name else {
        cut.grade = row.grade.trim().to_string();
        return;
    };

    if cut.find_activity_mut(activity_name).is_none() {
        let id = cut.next_activity_id();
        cut.activities.push(Activity {
            id,
            name: activity_name.to_string(),
            ..Activity::default()
        });
    }
    if let Some(activity) = cut.find_activity_mut(activity_name) {
        if let Some(weight) = row.activity_weight {
            activity.weight = weight;
        }
        activity.grade = row.grade.trim().to_string();
    }
}
