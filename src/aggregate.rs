use crate::models::{Activity, Course, CourseStatus, Cut, GradingMode, GradingScale};

/// Parses a stored grade. Blank, non-numeric and non-finite values are `None`.
pub fn parse_grade(raw: &str) -> Option<f64> {
    let value = raw.trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

/// Two decimals, ties rounded away from zero (`4.125` shows as `4.13`).
pub fn format_grade(value: f64) -> String {
    format!("{:.2}", (value * 100.0).round() / 100.0)
}

/// Weighted contribution of the activities graded so far. Activity weights
/// are not required to reach 100, so a partially graded cut reads low.
pub fn activity_sum(activities: &[Activity]) -> f64 {
    activities
        .iter()
        .filter_map(|activity| {
            parse_grade(&activity.grade)
                .filter(|grade| *grade >= 0.0)
                .map(|grade| grade * activity.weight / 100.0)
        })
        .sum()
}

pub fn recompute_cut_grade(cut: &Cut, mode: GradingMode) -> f64 {
    match mode {
        GradingMode::Detailed if !cut.activities.is_empty() => activity_sum(&cut.activities),
        // Detailed without activities keeps whatever was entered before the switch.
        GradingMode::Detailed | GradingMode::Simple => parse_grade(&cut.grade).unwrap_or(0.0),
    }
}

/// Result of folding a course's cuts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standing {
    /// Accumulated `grade * weight / 100`; not divided by the evaluated weight.
    pub average: f64,
    /// Sum of the weights of graded cuts, unclamped.
    pub evaluated_weight: f64,
}

impl Standing {
    pub fn average_display(&self) -> String {
        format_grade(self.average)
    }

    /// Evaluated fraction, clamped to `[0, 1]` even when cut weights overflow 100.
    pub fn progress(&self) -> f64 {
        (self.evaluated_weight / 100.0).clamp(0.0, 1.0)
    }

    pub fn remaining_weight(&self) -> f64 {
        100.0 - self.evaluated_weight
    }

    pub fn is_overweight(&self) -> bool {
        self.evaluated_weight > 100.0
    }

    pub fn status(&self, scale: &GradingScale) -> CourseStatus {
        if self.evaluated_weight <= 0.0 {
            CourseStatus::Ungraded
        } else if self.average >= scale.min {
            CourseStatus::Passing
        } else {
            CourseStatus::AtRisk
        }
    }
}

pub fn recompute_course_average(course: &Course) -> Standing {
    let mut average = 0.0;
    let mut evaluated_weight = 0.0;

    for cut in course.cuts.iter() {
        let Some(grade) = parse_grade(&cut.grade) else {
            continue;
        };
        if grade < 0.0 || cut.weight <= 0.0 {
            continue;
        }

        average += grade * cut.weight / 100.0;
        evaluated_weight += cut.weight;
    }

    Standing {
        average,
        evaluated_weight,
    }
}

/// Re-folds the whole course from scratch and stores the derived fields.
/// Cut grade strings are only rewritten in detailed mode.
pub fn recompute_course(course: &mut Course, mode: GradingMode) -> Standing {
    if mode == GradingMode::Detailed {
        for cut in course.cuts.iter_mut() {
            cut.grade = format_grade(recompute_cut_grade(cut, mode));
        }
    }

    let standing = recompute_course_average(course);
    course.average = standing.average_display();
    course.progress = standing.progress();
    standing
}

/// Mean of the stored averages of one semester. Unreadable averages count as zero.
pub fn semester_average(courses: &[Course], semester: i32) -> f64 {
    let averages: Vec<f64> = courses
        .iter()
        .filter(|course| course.semester == semester)
        .map(|course| parse_grade(&course.average).unwrap_or(0.0))
        .collect();

    if averages.is_empty() {
        0.0
    } else {
        averages.iter().sum::<f64>() / averages.len() as f64
    }
}

/// Mean over every course that has started accumulating a grade.
pub fn overall_average(courses: &[Course]) -> f64 {
    let averages: Vec<f64> = courses
        .iter()
        .filter_map(|course| parse_grade(&course.average))
        .filter(|average| *average > 0.0)
        .collect();

    if averages.is_empty() {
        0.0
    } else {
        averages.iter().sum::<f64>() / averages.len() as f64
    }
}
