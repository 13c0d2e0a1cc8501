//! Study configuration files (JSON).
//!
//! Missing fields fall back to the default study, so a file only needs to name
//! what it changes.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::domain::StudyConfig;
use crate::error::AppError;

pub fn read_study_json(path: &Path) -> Result<StudyConfig, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open study config '{}': {e}", path.display())))?;
    let study: StudyConfig = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Failed to parse study config '{}': {e}", path.display())))?;
    validate_study(&study)?;
    Ok(study)
}

/// Checks that do not need the panel.
pub fn validate_study(study: &StudyConfig) -> Result<(), AppError> {
    if study.treated.trim().is_empty() {
        return Err(AppError::new(2, "Study needs a treated unit."));
    }
    if study.specs.is_empty() {
        return Err(AppError::new(2, "Study needs at least one specification."));
    }
    if study.min_donors == 0 {
        return Err(AppError::new(2, "min_donors must be >= 1."));
    }
    if let Some(m) = study.pre_mults.iter().find(|m| !(m.is_finite() && **m > 0.0)) {
        return Err(AppError::new(2, format!("Invalid pre-RMSPE multiplier: {m}")));
    }
    if !(study.date_min <= study.fit_end && study.fit_end <= study.full_end) {
        return Err(AppError::new(
            2,
            "Study windows must satisfy date_min <= fit_end <= full_end.",
        ));
    }
    for spec in &study.specs {
        if spec.pre_start >= spec.t0 {
            return Err(AppError::new(
                2,
                format!("Spec {}: pre_start={} must be < t0={}", spec.id, spec.pre_start, spec.t0),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_partial_config_over_defaults() {
        let dir = std::env::temp_dir().join(format!("synth-control-study-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("study.json");
        let mut f = File::create(&path).unwrap();
        write!(
            f,
            r#"{{"treated":"CA","pre_mults":[3.0],"specs":[{{"id":"X","outcome":"theft","t0":"2015-01-01","pre_start":"2011-01-01"}}]}}"#
        )
        .unwrap();

        let study = read_study_json(&path).unwrap();
        assert_eq!(study.specs.len(), 1);
        assert_eq!(study.specs[0].id, "X");
        assert_eq!(study.min_donors, 5);
    }

    #[test]
    fn rejects_bad_multipliers_and_windows() {
        let study = StudyConfig {
            pre_mults: vec![2.0, -1.0],
            ..StudyConfig::default()
        };
        assert_eq!(validate_study(&study).unwrap_err().exit_code(), 2);

        let mut study = StudyConfig::default();
        study.specs[0].pre_start = study.specs[0].t0;
        assert!(validate_study(&study).is_err());
        assert!(validate_study(&StudyConfig::default()).is_ok());
    }
}
