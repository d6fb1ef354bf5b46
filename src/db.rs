use anyhow::Context;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};

use crate::aggregate;
use crate::backup::{self, Notebook};
use crate::entries::{self, GradeRow, MergeSummary};
use crate::models::{
    Activity, Course, Cut, GradingMode, Modality, Resource, Schedule, UserProfile,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let profile = UserProfile {
        name: "Avery Lee".to_string(),
        semester: 3,
        university: Some("Universidad Nacional".to_string()),
        career: Some("Systems Engineering".to_string()),
        ..UserProfile::default()
    };

    let mut courses = vec![
        Course {
            id: 1,
            name: "Data Structures".to_string(),
            code: "CS-201".to_string(),
            credits: 4,
            professor: "Jules Moreno".to_string(),
            semester: 3,
            modality: Modality::InPerson,
            location: "Block C, room 204".to_string(),
            color: "cortex".to_string(),
            cuts: vec![
                seed_cut(1, "First cut", 30.0, "3.8", Vec::new()),
                seed_cut(2, "Second cut", 30.0, "4.2", Vec::new()),
                seed_cut(3, "Final exam", 40.0, "", Vec::new()),
            ],
            ..Course::default()
        },
        Course {
            id: 2,
            name: "Probability".to_string(),
            code: "MAT-240".to_string(),
            credits: 3,
            professor: "Kiara Patel".to_string(),
            semester: 3,
            modality: Modality::Virtual,
            color: "royal".to_string(),
            cuts: vec![
                seed_cut(
                    1,
                    "Midterm",
                    50.0,
                    "2.9",
                    vec![
                        seed_activity(1, "Quiz 1", 30.0, "2.5"),
                        seed_activity(2, "Workshop", 20.0, "4.0"),
                        seed_activity(3, "Partial exam", 50.0, "2.7"),
                    ],
                ),
                seed_cut(2, "Final", 50.0, "", Vec::new()),
            ],
            ..Course::default()
        },
    ];

    let mut tx = pool.begin().await?;
    save_profile(&mut *tx, &profile).await?;
    for course in courses.iter_mut() {
        aggregate::recompute_course(course, profile.grading_mode);
        save_course(&mut *tx, course).await?;
    }
    tx.commit().await?;

    Ok(())
}

fn seed_cut(id: i64, name: &str, weight: f64, grade: &str, activities: Vec<Activity>) -> Cut {
    Cut {
        id,
        name: name.to_string(),
        weight,
        grade: grade.to_string(),
        activities,
    }
}

fn seed_activity(id: i64, name: &str, weight: f64, grade: &str) -> Activity {
    Activity {
        id,
        name: name.to_string(),
        weight,
        grade: grade.to_string(),
    }
}

pub async fn fetch_profile(pool: &PgPool) -> anyhow::Result<Option<UserProfile>> {
    let row = sqlx::query(
        "SELECT full_name, semester, university, career, min_grade, max_grade, \
         target_grade, grading_mode, extra FROM gradebook.profile WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| {
        let mode: String = row.get("grading_mode");
        let extra: Json<serde_json::Map<String, serde_json::Value>> = row.get("extra");
        UserProfile {
            name: row.get("full_name"),
            semester: row.get("semester"),
            university: row.get("university"),
            career: row.get("career"),
            min_grade: row.get("min_grade"),
            max_grade: row.get("max_grade"),
            target_grade: row.get("target_grade"),
            grading_mode: parse_mode(&mode),
            extra: extra.0,
        }
    }))
}

fn parse_mode(raw: &str) -> GradingMode {
    match raw {
        "detailed" => GradingMode::Detailed,
        _ => GradingMode::Simple,
    }
}

pub async fn save_profile(conn: &mut PgConnection, profile: &UserProfile) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO gradebook.profile
        (id, full_name, semester, university, career, min_grade, max_grade, target_grade,
         grading_mode, extra)
        VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            semester = EXCLUDED.semester,
            university = EXCLUDED.university,
            career = EXCLUDED.career,
            min_grade = EXCLUDED.min_grade,
            max_grade = EXCLUDED.max_grade,
            target_grade = EXCLUDED.target_grade,
            grading_mode = EXCLUDED.grading_mode,
            extra = EXCLUDED.extra,
            updated_at = now()
        "#,
    )
    .bind(&profile.name)
    .bind(profile.semester)
    .bind(&profile.university)
    .bind(&profile.career)
    .bind(profile.min_grade)
    .bind(profile.max_grade)
    .bind(profile.target_grade)
    .bind(profile.grading_mode.to_string())
    .bind(Json(&profile.extra))
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_notebook(pool: &PgPool) -> anyhow::Result<Notebook> {
    let row = sqlx::query("SELECT tasks, notes FROM gradebook.profile WHERE id = 1")
        .fetch_optional(pool)
        .await?;

    Ok(match row {
        Some(row) => {
            let tasks: Json<serde_json::Value> = row.get("tasks");
            Notebook {
                tasks: tasks.0,
                notes: row.get("notes"),
            }
        }
        None => Notebook::default(),
    })
}

pub async fn save_notebook(conn: &mut PgConnection, notebook: &Notebook) -> anyhow::Result<()> {
    let tasks = match &notebook.tasks {
        serde_json::Value::Null => serde_json::Value::Array(Vec::new()),
        tasks => tasks.clone(),
    };
    sqlx::query(
        r#"
        INSERT INTO gradebook.profile (id, tasks, notes)
        VALUES (1, $1, $2)
        ON CONFLICT (id) DO UPDATE
        SET tasks = EXCLUDED.tasks, notes = EXCLUDED.notes, updated_at = now()
        "#,
    )
    .bind(Json(tasks))
    .bind(&notebook.notes)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_courses(pool: &PgPool, semester: Option<i32>) -> anyhow::Result<Vec<Course>> {
    let mut query = String::from(
        "SELECT id, code, name, credits, professor, semester, modality, location, color, \
         cuts, resources, average, progress, schedule, extra FROM gradebook.courses",
    );
    if semester.is_some() {
        query.push_str(" WHERE semester = $1");
    }
    query.push_str(" ORDER BY semester, code");

    let mut rows = sqlx::query(&query);
    if let Some(value) = semester {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut courses = Vec::with_capacity(records.len());

    for row in records {
        let modality: String = row.get("modality");
        let cuts: Json<Vec<Cut>> = row.try_get("cuts").context("unreadable cuts column")?;
        let resources: Json<Vec<Resource>> =
            row.try_get("resources").context("unreadable resources column")?;
        let schedule: Option<Json<Schedule>> =
            row.try_get("schedule").context("unreadable schedule column")?;
        let extra: Json<serde_json::Map<String, serde_json::Value>> =
            row.try_get("extra").context("unreadable extra column")?;

        courses.push(Course {
            id: row.get("id"),
            code: row.get("code"),
            name: row.get("name"),
            credits: row.get("credits"),
            professor: row.get("professor"),
            semester: row.get("semester"),
            modality: Modality::parse(&modality),
            location: row.get("location"),
            color: row.get("color"),
            average: row.get("average"),
            progress: row.get("progress"),
            cuts: cuts.0,
            resources: resources.0,
            schedule: schedule.map(|value| value.0),
            extra: extra.0,
        });
    }

    Ok(courses)
}

pub async fn save_course(conn: &mut PgConnection, course: &Course) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO gradebook.courses
        (id, code, name, credits, professor, semester, modality, location, color,
         cuts, resources, average, progress, schedule, extra)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (id) DO UPDATE
        SET code = EXCLUDED.code,
            name = EXCLUDED.name,
            credits = EXCLUDED.credits,
            professor = EXCLUDED.professor,
            semester = EXCLUDED.semester,
            modality = EXCLUDED.modality,
            location = EXCLUDED.location,
            color = EXCLUDED.color,
            cuts = EXCLUDED.cuts,
            resources = EXCLUDED.resources,
            average = EXCLUDED.average,
            progress = EXCLUDED.progress,
            schedule = EXCLUDED.schedule,
            extra = EXCLUDED.extra,
            updated_at = now()
        "#,
    )
    .bind(course.id)
    .bind(&course.code)
    .bind(&course.name)
    .bind(course.credits)
    .bind(&course.professor)
    .bind(course.semester)
    .bind(course.modality.as_str())
    .bind(&course.location)
    .bind(&course.color)
    .bind(Json(&course.cuts))
    .bind(Json(&course.resources))
    .bind(&course.average)
    .bind(course.progress)
    .bind(course.schedule.as_ref().map(Json))
    .bind(Json(&course.extra))
    .execute(conn)
    .await
    .with_context(|| format!("failed to save course {}", course.code))?;
    Ok(())
}

/// Recomputes and persists every stored course, or just the one matching `code`.
pub async fn recompute_all(
    pool: &PgPool,
    code: Option<&str>,
    mode: GradingMode,
) -> anyhow::Result<usize> {
    let mut courses = fetch_courses(pool, None).await?;
    if let Some(code) = code {
        courses.retain(|course| course.code.eq_ignore_ascii_case(code.trim()));
    }

    let mut tx = pool.begin().await?;
    for course in courses.iter_mut() {
        let standing = aggregate::recompute_course(course, mode);
        tracing::debug!(
            code = %course.code,
            average = %course.average,
            evaluated_weight = standing.evaluated_weight,
            "recomputed course"
        );
        save_course(&mut *tx, course).await?;
    }
    tx.commit().await?;

    Ok(courses.len())
}

/// Writes a backup's profile, notebook and courses. Courses are upserted by id,
/// so ids are made unique first or later courses would overwrite earlier ones.
pub async fn restore(
    pool: &PgPool,
    profile: &UserProfile,
    notebook: &Notebook,
    courses: &[Course],
    mode: GradingMode,
) -> anyhow::Result<usize> {
    let mut courses = courses.to_vec();
    let reassigned = backup::assign_missing_ids(&mut courses);
    if reassigned > 0 {
        tracing::warn!(reassigned, "restoring courses under new ids");
    }

    let mut tx = pool.begin().await?;
    save_profile(&mut *tx, profile).await?;
    save_notebook(&mut *tx, notebook).await?;
    for course in courses.iter_mut() {
        aggregate::recompute_course(course, mode);
        save_course(&mut *tx, course).await?;
    }
    tx.commit().await?;
    Ok(courses.len())
}

pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    mode: GradingMode,
) -> anyhow::Result<MergeSummary> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<GradeRow>().enumerate() {
        // Header is line 1.
        let row = result.with_context(|| format!("invalid grade row on line {}", index + 2))?;
        rows.push(row);
    }

    let mut courses = fetch_courses(pool, None).await?;
    let summary = entries::apply_rows(&mut courses, &rows);

    let mut tx = pool.begin().await?;
    for course in courses
        .iter_mut()
        .filter(|course| summary.touched.contains(&course.id))
    {
        aggregate::recompute_course(course, mode);
        save_course(&mut *tx, course).await?;
    }
    tx.commit().await?;

    Ok(summary)
}
