use anyhow::{bail, Context};
use clap::Args;

use crate::models::{GradingMode, GradingScale, UserProfile};

#[derive(Debug, Clone, Default, Args)]
pub struct GradingArgs {
    /// Override the stored grading mode
    #[arg(long, value_enum, global = true)]
    pub mode: Option<GradingMode>,
    /// Lowest passing grade
    #[arg(long, global = true)]
    pub min_grade: Option<f64>,
    /// Top of the grading scale
    #[arg(long, global = true)]
    pub max_grade: Option<f64>,
    /// Personal target grade used by the oracle
    #[arg(long, global = true)]
    pub target_grade: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub mode: GradingMode,
    pub scale: GradingScale,
    pub target: f64,
}

impl Settings {
    /// Flags win over the stored profile, which wins over the defaults.
    pub fn resolve(args: &GradingArgs, profile: Option<&UserProfile>) -> anyhow::Result<Self> {
        let base = profile.cloned().unwrap_or_default();

        if let (Some(flag), Some(stored)) = (args.mode, profile.map(|p| p.grading_mode)) {
            if flag != stored {
                tracing::warn!(%flag, %stored, "grading mode flag overrides stored profile");
            }
        }

        let settings = Settings {
            mode: args.mode.unwrap_or(base.grading_mode),
            scale: GradingScale {
                min: args.min_grade.unwrap_or(base.min_grade),
                max: args.max_grade.unwrap_or(base.max_grade),
            },
            target: args.target_grade.unwrap_or(base.target_grade),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !self.scale.max.is_finite() || self.scale.max <= 0.0 {
            bail!("max grade must be positive, got {}", self.scale.max);
        }
        if !self.scale.min.is_finite() || self.scale.min >= self.scale.max {
            bail!(
                "min grade {} must be below max grade {}",
                self.scale.min,
                self.scale.max
            );
        }
        if !self.target.is_finite() {
            bail!("target grade must be a number");
        }
        Ok(())
    }
}

pub fn database_url() -> anyhow::Result<String> {
    std::env::var("DATABASE_URL").context("DATABASE_URL must be set to a Postgres instance")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_profile_or_flags() {
        let settings = Settings::resolve(&GradingArgs::default(), None).unwrap();
        assert_eq!(settings.mode, GradingMode::Simple);
        assert_eq!(settings.scale, GradingScale { min: 3.0, max: 5.0 });
        assert_eq!(settings.target, 4.5);
    }

    #[test]
    fn flags_override_profile() {
        let profile = UserProfile {
            grading_mode: GradingMode::Detailed,
            min_grade: 60.0,
            max_grade: 100.0,
            target_grade: 85.0,
            ..UserProfile::default()
        };
        let args = GradingArgs {
            mode: Some(GradingMode::Simple),
            target_grade: Some(90.0),
            ..GradingArgs::default()
        };

        let settings = Settings::resolve(&args, Some(&profile)).unwrap();
        assert_eq!(settings.mode, GradingMode::Simple);
        assert_eq!(settings.scale.min, 60.0);
        assert_eq!(settings.scale.max, 100.0);
        assert_eq!(settings.target, 90.0);
    }

    #[test]
    fn inverted_scale_is_rejected() {
        let args = GradingArgs {
            min_grade: Some(5.0),
            max_grade: Some(4.0),
            ..GradingArgs::default()
        };
        assert!(Settings::resolve(&args, None).is_err());

        let zero_max = GradingArgs {
            max_grade: Some(0.0),
            min_grade: Some(-1.0),
            ..GradingArgs::default()
        };
        assert!(Settings::resolve(&zero_max, None).is_err());
    }
}
