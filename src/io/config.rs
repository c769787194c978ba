//! JSON configuration files.
//!
//! - initial fit parameter values: `{"time_constants": [..], "amps_rSV0": [..], ..}`
//! - target model: `{"summand_component0": "exp(-t/k0)", ..}`

use std::fs;
use std::path::Path;

use crate::domain::{InitialValues, TargetModelText};
use crate::error::ConfigurationError;

fn read(path: &Path, what: &str) -> Result<String, ConfigurationError> {
    fs::read_to_string(path).map_err(|e| {
        ConfigurationError::Invalid(format!("failed to read {what} '{}': {e}", path.display()))
    })
}

/// Load initial fit parameter values.
pub fn load_initial_values(path: &Path) -> Result<InitialValues, ConfigurationError> {
    let text = read(path, "initial values file")?;
    serde_json::from_str(&text)
        .map_err(|e| ConfigurationError::InitialValues(format!("'{}': {e}", path.display())))
}

/// Load a user-defined target model.
pub fn load_target_model(path: &Path) -> Result<TargetModelText, ConfigurationError> {
    let text = read(path, "target model file")?;
    let model: TargetModelText = serde_json::from_str(&text).map_err(|e| {
        ConfigurationError::Invalid(format!("target model '{}': {e}", path.display()))
    })?;
    log::debug!(
        "target model '{}' defines summands for components {:?}",
        path.display(),
        model.summands.keys().collect::<Vec<_>>()
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn loads_both_file_kinds() {
        let mut init = tempfile::NamedTempFile::new().unwrap();
        write!(init, r#"{{"time_constants": [5, 50], "amps_rSV0": [1, 2], "amps_rSV1": [3, 4]}}"#)
            .unwrap();
        let values = load_initial_values(init.path()).unwrap();
        assert_eq!(values.time_constants, vec![5.0, 50.0]);
        assert_eq!(values.amplitudes[&1], vec![3.0, 4.0]);

        let mut model = tempfile::NamedTempFile::new().unwrap();
        write!(model, r#"{{"summand_component0": "exp(-t/k0)", "summand_component2": ""}}"#).unwrap();
        let text = load_target_model(model.path()).unwrap();
        assert_eq!(text.summands[&0], "exp(-t/k0)");
        assert_eq!(text.summands[&2], "");
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = load_initial_values(Path::new("/nonexistent/initial.json")).unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid(_)));
    }
}
