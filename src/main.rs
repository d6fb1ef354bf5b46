use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod backup;
mod config;
mod db;
mod entries;
mod models;
mod oracle;
mod report;

use config::{GradingArgs, Settings};
use models::{Course, UserProfile};

#[derive(Parser)]
#[command(name = "semester-gradebook")]
#[command(about = "Weighted grade tracking and target projection for a semester", long_about = None)]
struct Cli {
    #[command(flatten)]
    grading: GradingArgs,
    /// Read courses and profile from a JSON backup instead of Postgres
    #[arg(long, global = true)]
    from_backup: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a sample profile and courses
    Seed,
    /// Merge grade rows from a CSV file into stored courses
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Load a JSON backup into the database
    Restore {
        #[arg(long)]
        json: PathBuf,
    },
    /// Write the profile and courses to a JSON backup
    Backup {
        #[arg(long, default_value = "gradebook-backup.json")]
        out: PathBuf,
    },
    /// Recompute and store averages with the active grading mode
    Recompute {
        #[arg(long)]
        code: Option<String>,
    },
    /// Show averages, progress and status per course
    Standings {
        #[arg(long)]
        semester: Option<i32>,
    },
    /// Project what is needed on the rest of a course
    Oracle {
        #[arg(long)]
        code: String,
        /// Print the advice request for the personal target
        #[arg(long)]
        prompt: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        semester: Option<i32>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export a CSV summary of courses
    Export {
        #[arg(long)]
        semester: Option<i32>,
        #[arg(long, default_value = "courses.csv")]
        out: PathBuf,
    },
}

struct Gradebook {
    profile: Option<UserProfile>,
    notebook: backup::Notebook,
    courses: Vec<Course>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = config::database_url()?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_gradebook(from_backup: Option<&Path>, semester: Option<i32>) -> anyhow::Result<Gradebook> {
    if let Some(path) = from_backup {
        let backup = backup::load(path)?;
        info!(path = %path.display(), courses = backup.courses.len(), "loaded backup");
        let notebook = backup.notebook();
        let courses = backup
            .courses
            .into_iter()
            .filter(|course| semester.map_or(true, |value| course.semester == value))
            .collect();
        return Ok(Gradebook {
            profile: Some(backup.user),
            notebook,
            courses,
        });
    }

    let pool = connect().await?;
    let profile = db::fetch_profile(&pool).await?;
    let notebook = db::fetch_notebook(&pool).await?;
    let courses = db::fetch_courses(&pool, semester).await?;
    Ok(Gradebook {
        profile,
        notebook,
        courses,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let from_backup = cli.from_backup.as_deref();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let profile = db::fetch_profile(&pool).await?;
            let settings = Settings::resolve(&cli.grading, profile.as_ref())?;
            let summary = db::import_csv(&pool, &csv, settings.mode).await?;
            if summary.skipped > 0 {
                warn!(skipped = summary.skipped, "some grade rows were skipped");
            }
            println!(
                "Applied {} grade rows to {} courses ({} new) from {}.",
                summary.applied,
                summary.touched.len(),
                summary.created_courses,
                csv.display()
            );
        }
        Commands::Restore { json } => {
            let backup = backup::load(&json)?;
            let settings = Settings::resolve(&cli.grading, Some(&backup.user))?;
            let pool = connect().await?;
            let restored =
                db::restore(&pool, &backup.user, &backup.notebook(), &backup.courses, settings.mode)
                    .await?;
            println!("Restored {restored} courses from {}.", json.display());
        }
        Commands::Backup { out } => {
            let gradebook = load_gradebook(from_backup, None).await?;
            let snapshot = backup::Backup::new(
                gradebook.profile.unwrap_or_default(),
                gradebook.courses,
                gradebook.notebook,
            );
            backup::write(&out, &snapshot)?;
            println!("Backup written to {}.", out.display());
        }
        Commands::Recompute { code } => {
            let pool = connect().await?;
            let profile = db::fetch_profile(&pool).await?;
            let settings = Settings::resolve(&cli.grading, profile.as_ref())?;
            let updated = db::recompute_all(&pool, code.as_deref(), settings.mode).await?;
            println!("Recomputed {updated} courses in {} mode.", settings.mode);
        }
        Commands::Standings { semester } => {
            let gradebook = load_gradebook(from_backup, semester).await?;
            let settings = Settings::resolve(&cli.grading, gradebook.profile.as_ref())?;
            let summaries = report::summarize(&gradebook.courses, &settings);

            if summaries.is_empty() {
                println!("No courses found.");
                return Ok(());
            }

            println!("Course standings ({} mode):", settings.mode);
            for summary in summaries.iter() {
                println!(
                    "- {} ({}) average {} with {:.0}% evaluated [{}]",
                    summary.course.name,
                    summary.course.code,
                    summary.standing.average_display(),
                    summary.standing.progress() * 100.0,
                    summary.status.label()
                );
            }

            let recomputed: Vec<Course> = summaries.iter().map(|s| s.course.clone()).collect();
            let mean = match semester {
                Some(value) => aggregate::semester_average(&recomputed, value),
                None => aggregate::overall_average(&recomputed),
            };
            println!("Average across courses: {}", aggregate::format_grade(mean));

            let risky = report::at_risk(&summaries);
            if !risky.is_empty() {
                println!(
                    "{} courses are below the passing grade of {:.1}.",
                    risky.len(),
                    settings.scale.min
                );
            }
        }
        Commands::Oracle { code, prompt } => {
            let gradebook = load_gradebook(from_backup, None).await?;
            let settings = Settings::resolve(&cli.grading, gradebook.profile.as_ref())?;
            let Some(mut course) = gradebook
                .courses
                .into_iter()
                .find(|course| course.code.eq_ignore_ascii_case(code.trim()))
            else {
                bail!("no course with code {code}");
            };

            aggregate::recompute_course(&mut course, settings.mode);
            let projection = oracle::project(&course, &settings.scale, Some(settings.target));

            println!(
                "{}: accumulated {} with {}% evaluated, {}% remaining",
                projection.course_name,
                projection.standing.average_display(),
                projection.standing.evaluated_weight,
                projection.standing.remaining_weight().max(0.0)
            );
            for (scenario, outlook) in projection.outcomes.iter() {
                match outlook.needed_display() {
                    Some(needed) => println!(
                        "- {} {:.1}: {} (needs {})",
                        scenario.label,
                        scenario.target,
                        outlook.label(),
                        needed
                    ),
                    None => println!("- {} {:.1}: {}", scenario.label, scenario.target, outlook.label()),
                }
            }

            if prompt {
                match projection.outlook_for(settings.target) {
                    Some(oracle::Outlook::Achievable { needed })
                    | Some(oracle::Outlook::Impossible { needed }) => {
                        println!();
                        println!(
                            "{}",
                            oracle::strategy_prompt(
                                &projection.course_name,
                                projection.standing.average,
                                settings.target,
                                needed,
                                projection.standing.remaining_weight(),
                            )
                        );
                    }
                    _ => println!("No strategy needed for target {:.1}.", settings.target),
                }
            }
        }
        Commands::Report { semester, out } => {
            let gradebook = load_gradebook(from_backup, semester).await?;
            let settings = Settings::resolve(&cli.grading, gradebook.profile.as_ref())?;
            let report = report::build_report(
                semester,
                Utc::now().date_naive(),
                &gradebook.courses,
                &settings,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { semester, out } => {
            let gradebook = load_gradebook(from_backup, semester).await?;
            let settings = Settings::resolve(&cli.grading, gradebook.profile.as_ref())?;
            let summaries = report::summarize(&gradebook.courses, &settings);
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            report::write_summary_csv(file, &summaries)?;
            println!("Exported {} courses to {}.", summaries.len(), out.display());
        }
    }

    Ok(())
}
