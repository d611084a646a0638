//! Validation for loaded [`crate::model::PipelineConfig`] values that a
//! type alone cannot express — threshold ranges, non-empty paths.

use crate::error::ConfigError;
use crate::model::PipelineConfig;

fn validate_unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid_field(field, format!("{value} is outside [0, 1]")))
    }
}

/// Validate every tunable that a type alone doesn't constrain.
///
/// # Errors
///
/// Returns the first [`ConfigError::InvalidField`] encountered.
pub fn validate(config: &PipelineConfig) -> Result<(), ConfigError> {
    let thresholds = &config.audio.thresholds;
    validate_unit_interval("audio.thresholds.fp_dup", thresholds.fp_dup)?;
    validate_unit_interval("audio.thresholds.speech_music_max", thresholds.speech_music_max)?;
    validate_unit_interval("audio.thresholds.speech_silence_max", thresholds.speech_silence_max)?;
    validate_unit_interval("audio.thresholds.overlap_ad_max", thresholds.overlap_ad_max)?;
    validate_unit_interval(
        "audio.thresholds.overlap_commentary_min",
        thresholds.overlap_commentary_min,
    )?;
    validate_unit_interval(
        "audio.thresholds.speech_commentary_min",
        thresholds.speech_commentary_min,
    )?;

    if config.ripping.selection.min_primary_runtime <= 0.0 {
        return Err(ConfigError::invalid_field(
            "ripping.selection.min_primary_runtime",
            "must be positive",
        ));
    }
    if config.ripping.selection.duration_tolerance < 0.0 {
        return Err(ConfigError::invalid_field(
            "ripping.selection.duration_tolerance",
            "must be non-negative",
        ));
    }
    if config.ripping.min_rip_size_bytes == 0 {
        return Err(ConfigError::invalid_field(
            "ripping.min_rip_size_bytes",
            "must be positive",
        ));
    }
    if config.ripping.progress_interval_secs == 0 {
        return Err(ConfigError::invalid_field(
            "ripping.progress_interval_secs",
            "must be positive",
        ));
    }

    if config.binaries.probe.trim().is_empty() {
        return Err(ConfigError::invalid_field("binaries.probe", "must not be empty"));
    }
    if config.binaries.encoder.trim().is_empty() {
        return Err(ConfigError::invalid_field("binaries.encoder", "must not be empty"));
    }

    Ok(())
}
