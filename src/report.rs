use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::{self, format_grade, Standing};
use crate::config::Settings;
use crate::models::{Course, CourseStatus};
use crate::oracle;

#[derive(Debug, Clone)]
pub struct CourseSummary {
    pub course: Course,
    pub standing: Standing,
    pub status: CourseStatus,
}

/// Recomputes each course with the active mode and pairs it with its standing.
pub fn summarize(courses: &[Course], settings: &Settings) -> Vec<CourseSummary> {
    let mut summaries: Vec<CourseSummary> = courses
        .iter()
        .cloned()
        .map(|mut course| {
            let standing = aggregate::recompute_course(&mut course, settings.mode);
            if standing.is_overweight() {
                tracing::warn!(
                    code = %course.code,
                    evaluated_weight = standing.evaluated_weight,
                    "cut weights add up to more than 100"
                );
            }
            let status = standing.status(&settings.scale);
            CourseSummary {
                course,
                standing,
                status,
            }
        })
        .collect();

    summaries.sort_by(|a, b| {
        a.course
            .semester
            .cmp(&b.course.semester)
            .then_with(|| a.course.code.cmp(&b.course.code))
    });
    summaries
}

pub fn at_risk(summaries: &[CourseSummary]) -> Vec<&CourseSummary> {
    summaries
        .iter()
        .filter(|summary| summary.status == CourseStatus::AtRisk)
        .collect()
}

pub fn build_report(
    semester: Option<i32>,
    generated_on: NaiveDate,
    courses: &[Course],
    settings: &Settings,
) -> String {
    let summaries = summarize(courses, settings);

    let mut output = String::new();
    let scope_label = semester
        .map(|value| format!("semester {value}"))
        .unwrap_or_else(|| "all semesters".to_string());

    let _ = writeln!(output, "# Semester Grade Report");
    let _ = writeln!(
        output,
        "Generated for {} on {} ({} mode, passing grade {:.1} of {:.1})",
        scope_label, generated_on, settings.mode, settings.scale.min, settings.scale.max
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Course Standings");

    if summaries.is_empty() {
        let _ = writeln!(output, "No courses recorded for this scope.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {} ({}) average {} with {:.0}% evaluated [{}]{}",
                summary.course.name,
                summary.course.code,
                summary.standing.average_display(),
                summary.standing.progress() * 100.0,
                summary.status.label(),
                if summary.standing.is_overweight() {
                    " (cut weights exceed 100%)"
                } else {
                    ""
                }
            );
        }
        let recomputed: Vec<Course> = summaries.iter().map(|s| s.course.clone()).collect();
        let mean = match semester {
            Some(value) => aggregate::semester_average(&recomputed, value),
            None => aggregate::overall_average(&recomputed),
        };
        let _ = writeln!(output);
        let _ = writeln!(output, "Average across courses: {}", format_grade(mean));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attention Needed");

    let risky = at_risk(&summaries);
    if risky.is_empty() {
        let _ = writeln!(output, "No courses below the passing grade.");
    } else {
        for summary in risky {
            let _ = writeln!(
                output,
                "- {} ({}) is at {} against a passing grade of {:.1}",
                summary.course.name,
                summary.course.code,
                summary.standing.average_display(),
                settings.scale.min
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Oracle Outlook (target {:.1})", settings.target);

    if summaries.is_empty() {
        let _ = writeln!(output, "Nothing to project.");
    } else {
        for summary in summaries.iter() {
            let outlook = oracle::classify(
                settings.target,
                summary.standing.average,
                summary.standing.remaining_weight(),
                &settings.scale,
            );
            let detail = match outlook.needed_display() {
                Some(needed) => format!(
                    "{} (needs {} on the remaining {:.0}%)",
                    outlook.label(),
                    needed,
                    summary.standing.remaining_weight()
                ),
                None => outlook.label().to_string(),
            };
            let _ = writeln!(output, "- {}: {}", summary.course.name, detail);
        }
    }

    output
}

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    semester: i32,
    code: &'a str,
    name: &'a str,
    credits: i32,
    professor: &'a str,
    modality: &'static str,
    average: String,
    progress: String,
    status: &'static str,
    cuts: usize,
}

pub fn write_summary_csv<W: std::io::Write>(
    writer: W,
    summaries: &[CourseSummary],
) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for summary in summaries {
        csv_writer.serialize(SummaryRow {
            semester: summary.course.semester,
            code: &summary.course.code,
            name: &summary.course.name,
            credits: summary.course.credits,
            professor: &summary.course.professor,
            modality: summary.course.modality.as_str(),
            average: summary.standing.average_display(),
            progress: format!("{:.2}", summary.standing.progress()),
            status: summary.status.label(),
            cuts: summary.course.cuts.len(),
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Activity, Cut, GradingMode, GradingScale};

    fn settings(mode: GradingMode) -> Settings {
        Settings {
            mode,
            scale: GradingScale { min: 3.0, max: 5.0 },
            target: 4.0,
        }
    }

    fn sample_courses() -> Vec<Course> {
        vec![
            Course {
                id: 1,
                name: "Data Structures".to_string(),
                code: "CS-201".to_string(),
                semester: 3,
                credits: 4,
                professor: "Jules Moreno".to_string(),
                cuts: vec![
                    Cut {
                        id: 1,
                        name: "Midterm".to_string(),
                        weight: 50.0,
                        grade: "4.0".to_string(),
                        activities: vec![
                            Activity {
                                id: 1,
                                name: "Project".to_string(),
                                weight: 100.0,
                                grade: "2.0".to_string(),
                            },
                        ],
                    },
                    Cut {
                        id: 2,
                        name: "Final".to_string(),
                        weight: 50.0,
                        grade: String::new(),
                        activities: Vec::new(),
                    },
                ],
                ..Course::default()
            },
            Course {
                id: 2,
                name: "Ethics".to_string(),
                code: "HUM-105".to_string(),
                semester: 3,
                credits: 2,
                ..Course::default()
            },
        ]
    }

    #[test]
    fn report_lists_standings_and_outlook() {
        let date = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let report = build_report(Some(3), date, &sample_courses(), &settings(GradingMode::Simple));

        assert!(report.starts_with("# Semester Grade Report\nGenerated for semester 3 on 2026-05-04"));
        assert!(report.contains("- Data Structures (CS-201) average 2.00 with 50% evaluated [at risk]"));
        assert!(report.contains("- Ethics (HUM-105) average 0.00 with 0% evaluated [ungraded]"));
        assert!(report.contains("Average across courses: 1.00"));
        assert!(report.contains("- Data Structures (CS-201) is at 2.00 against a passing grade of 3.0"));
        assert!(report.contains("- Data Structures: achievable (needs 4.00 on the remaining 50%)"));
        assert!(report.contains("- Ethics: achievable (needs 4.00 on the remaining 100%)"));
    }

    #[test]
    fn detailed_mode_changes_the_standing() {
        let summaries = summarize(&sample_courses(), &settings(GradingMode::Detailed));
        let data_structures = &summaries[0];
        assert_eq!(data_structures.course.cuts[0].grade, "2.00");
        assert_eq!(data_structures.course.cuts[1].grade, "0.00");
        assert_eq!(data_structures.standing.average_display(), "1.00");
        assert_eq!(data_structures.standing.progress(), 1.0);
        assert_eq!(at_risk(&summaries).len(), 1);
    }

    #[test]
    fn empty_report_says_so() {
        let date = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let report = build_report(None, date, &[], &settings(GradingMode::Simple));
        assert!(report.contains("Generated for all semesters"));
        assert!(report.contains("No courses recorded for this scope."));
        assert!(report.contains("Nothing to project."));
    }

    #[test]
    fn csv_export_has_one_row_per_course() {
        let summaries = summarize(&sample_courses(), &settings(GradingMode::Simple));
        let mut buffer = Vec::new();
        write_summary_csv(&mut buffer, &summaries).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "semester,code,name,credits,professor,modality,average,progress,status,cuts"
        );
        assert_eq!(
            lines[1],
            "3,CS-201,Data Structures,4,Jules Moreno,presencial,2.00,0.50,at risk,2"
        );
        assert_eq!(lines.len(), 3);
    }
}
