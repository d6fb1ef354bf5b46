use std::fmt::Write;

use crate::aggregate::{format_grade, recompute_course_average, Standing};
use crate::models::{Course, GradingScale};

/// Absorbs float noise so that a need of exactly the scale maximum stays achievable.
const GRADE_EPSILON: f64 = 1e-9;

/// Score needed on the remaining weight to finish at `target`.
/// A fully evaluated course has nothing left to solve for and yields 0.
pub fn calculate_needed(target: f64, current_absolute_grade: f64, remaining_weight: f64) -> f64 {
    if remaining_weight <= 0.0 {
        return 0.0;
    }
    (target - current_absolute_grade) / (remaining_weight / 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outlook {
    /// The accumulated grade already meets the target, so a zero on the
    /// remainder still reaches it. A negative need always lands here.
    Achieved,
    /// Nothing left to evaluate and the target was missed.
    Closed,
    Achievable { needed: f64 },
    Impossible { needed: f64 },
}

impl Outlook {
    pub fn label(&self) -> &'static str {
        match self {
            Outlook::Achieved => "achieved",
            Outlook::Closed => "closed",
            Outlook::Achievable { .. } => "achievable",
            Outlook::Impossible { .. } => "impossible",
        }
    }

    /// Needed score as shown to the student, if one applies.
    pub fn needed_display(&self) -> Option<String> {
        match self {
            Outlook::Achieved | Outlook::Closed => None,
            Outlook::Achievable { needed } | Outlook::Impossible { needed } => {
                Some(format_grade(*needed))
            }
        }
    }
}

pub fn classify(
    target: f64,
    current_absolute_grade: f64,
    remaining_weight: f64,
    scale: &GradingScale,
) -> Outlook {
    if current_absolute_grade >= target {
        return Outlook::Achieved;
    }
    if remaining_weight <= 0.0 {
        return Outlook::Closed;
    }

    // current < target and remaining > 0, so needed is positive here.
    let needed = calculate_needed(target, current_absolute_grade, remaining_weight);
    if needed > scale.max + GRADE_EPSILON {
        Outlook::Impossible { needed }
    } else {
        Outlook::Achievable { needed }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub label: String,
    pub target: f64,
}

/// The fixed what-if ladder, plus the student's own target when it is not already on it.
pub fn scenarios(scale: &GradingScale, personal_target: Option<f64>) -> Vec<Scenario> {
    let mut ladder = vec![
        Scenario {
            label: "pass".to_string(),
            target: scale.min,
        },
        Scenario {
            label: "high".to_string(),
            target: scale.max * 0.8,
        },
        Scenario {
            label: "excellence".to_string(),
            target: scale.max * 0.9,
        },
        Scenario {
            label: "perfect".to_string(),
            target: scale.max,
        },
    ];

    if let Some(target) = personal_target {
        let known = ladder
            .iter()
            .any(|scenario| (scenario.target - target).abs() < GRADE_EPSILON);
        if !known {
            ladder.push(Scenario {
                label: "personal".to_string(),
                target,
            });
        }
    }

    ladder
}

#[derive(Debug, Clone)]
pub struct Projection {
    pub course_name: String,
    pub standing: Standing,
    pub outcomes: Vec<(Scenario, Outlook)>,
}

impl Projection {
    pub fn outlook_for(&self, target: f64) -> Option<Outlook> {
        self.outcomes
            .iter()
            .find(|(scenario, _)| (scenario.target - target).abs() < GRADE_EPSILON)
            .map(|(_, outlook)| *outlook)
    }
}

/// Runs every scenario against the course's current cut grades.
pub fn project(course: &Course, scale: &GradingScale, personal_target: Option<f64>) -> Projection {
    let standing = recompute_course_average(course);
    let outcomes = scenarios(scale, personal_target)
        .into_iter()
        .map(|scenario| {
            let outlook = classify(
                scenario.target,
                standing.average,
                standing.remaining_weight(),
                scale,
            );
            (scenario, outlook)
        })
        .collect();

    Projection {
        course_name: course.name.clone(),
        standing,
        outcomes,
    }
}

/// Request text for the external advice service.
pub fn strategy_prompt(
    course_name: &str,
    current_grade: f64,
    target: f64,
    needed: f64,
    remaining_weight: f64,
) -> String {
    let mut prompt = String::new();
    let _ = write!(
        prompt,
        "Course: {}. Current grade: {:.2}. Target: {:.1}. ",
        course_name, current_grade, target
    );
    let _ = write!(
        prompt,
        "Needs {:.2} on the remaining {}%. Give me 3 brief tips.",
        needed, remaining_weight
    );
    prompt
}
