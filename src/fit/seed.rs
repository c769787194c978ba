//! Starting parameters for the global fit.
//!
//! Initial values come from a user map (`time_constants`, `amps_rSV<i>`)
//! whose lists are indexed by component number. When the shortest list is
//! too short for the selected component set, the fit still runs from
//! built-in defaults, and the caller is told so through [`SeedSource`].

use nalgebra::DMatrix;

use crate::domain::{ComponentSet, FitParameterSet, InitialValues, SeedSource};
use crate::error::ConfigurationError;

/// Default decay constant (ps) when no usable initial values exist.
pub const DEFAULT_TAU: f64 = 50.0;
/// Default amplitude when no usable initial values exist.
pub const DEFAULT_AMPLITUDE: f64 = 0.7;

/// Seeded parameters and where they came from.
#[derive(Debug, Clone)]
pub struct Seed {
    pub params: FitParameterSet,
    pub source: SeedSource,
}

/// Build the starting parameter set for `components`.
pub fn seed_parameters(
    components: &ComponentSet,
    initial: Option<&InitialValues>,
) -> Result<Seed, ConfigurationError> {
    let n = components.len();

    let Some(initial) = initial else {
        return Ok(defaults(components, "no initial fit parameter values supplied".to_string()));
    };

    let shortest = initial.min_len();
    if shortest < n {
        let reason = format!(
            "insufficient initial fit parameter values: shortest list has {shortest} entries \
             but {n} components are selected; using all decay constants = {DEFAULT_TAU}, \
             all amplitudes = {DEFAULT_AMPLITUDE}"
        );
        log::warn!("{reason}");
        return Ok(defaults(components, reason));
    }

    let mut taus = Vec::with_capacity(n);
    let mut amplitudes = DMatrix::zeros(n, n);
    for (j, component) in components.iter().enumerate() {
        let tau = initial.time_constants.get(component).copied().ok_or_else(|| {
            ConfigurationError::InitialValues(format!(
                "'time_constants' has no entry for component {component}"
            ))
        })?;
        taus.push(tau);

        for i in 0..n {
            let key = format!("amps_rSV{i}");
            let list = initial.amplitudes.get(&i).ok_or_else(|| {
                ConfigurationError::InitialValues(format!(
                    "missing key '{key}'; expected 'time_constants', 'amps_rSV0', 'amps_rSV1', ... \
                     for {n} selected components"
                ))
            })?;
            amplitudes[(i, j)] = list.get(component).copied().ok_or_else(|| {
                ConfigurationError::InitialValues(format!(
                    "'{key}' has no entry for component {component}"
                ))
            })?;
        }
    }

    if let Some(bad) = taus.iter().chain(amplitudes.iter()).find(|v| !v.is_finite()) {
        return Err(ConfigurationError::InitialValues(format!(
            "non-finite initial value {bad}"
        )));
    }

    Ok(Seed {
        params: FitParameterSet::from_parts(components.clone(), taus, amplitudes)?,
        source: SeedSource::UserValues,
    })
}

fn defaults(components: &ComponentSet, reason: String) -> Seed {
    let n = components.len();
    let params = FitParameterSet::from_flat(
        components.clone(),
        &nalgebra::DVector::from_fn(FitParameterSet::flat_len(n), |k, _| {
            if k < n { DEFAULT_TAU } else { DEFAULT_AMPLITUDE }
        }),
    );
    Seed {
        params,
        source: SeedSource::Defaults { reason },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn set(v: &[usize]) -> ComponentSet {
        ComponentSet::new(v.to_vec()).unwrap()
    }

    #[test]
    fn values_are_indexed_by_component_number() {
        let initial = InitialValues {
            time_constants: vec![1.0, 2.0, 3.0],
            amplitudes: BTreeMap::from([(0, vec![10.0, 11.0, 12.0]), (1, vec![20.0, 21.0, 22.0])]),
        };
        let seed = seed_parameters(&set(&[2, 0]), Some(&initial)).unwrap();
        assert_eq!(seed.source, SeedSource::UserValues);
        assert_eq!(seed.params.tau_of(2), Some(3.0));
        assert_eq!(seed.params.tau_of(0), Some(1.0));
        assert_eq!(seed.params.amp_of(0, 2), Some(12.0));
        assert_eq!(seed.params.amp_of(1, 0), Some(20.0));
    }

    #[test]
    fn short_lists_fall_back_to_reported_defaults() {
        let initial = InitialValues {
            time_constants: vec![1.0],
            amplitudes: BTreeMap::from([(0, vec![1.0]), (1, vec![1.0])]),
        };
        let seed = seed_parameters(&set(&[0, 1]), Some(&initial)).unwrap();
        assert!(matches!(seed.source, SeedSource::Defaults { .. }));
        assert_eq!(seed.params.taus(), &[DEFAULT_TAU, DEFAULT_TAU]);
        assert!(seed.params.amplitudes().iter().all(|&a| a == DEFAULT_AMPLITUDE));
    }

    #[test]
    fn missing_amplitude_key_is_configuration_error() {
        let initial = InitialValues {
            time_constants: vec![1.0, 2.0],
            amplitudes: BTreeMap::from([(0, vec![1.0, 1.0])]),
        };
        let err = seed_parameters(&set(&[0, 1]), Some(&initial)).unwrap_err();
        match err {
            ConfigurationError::InitialValues(msg) => assert!(msg.contains("amps_rSV1"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn component_beyond_list_is_configuration_error() {
        let initial = InitialValues {
            time_constants: vec![1.0, 2.0],
            amplitudes: BTreeMap::from([(0, vec![1.0, 1.0]), (1, vec![1.0, 1.0])]),
        };
        assert!(seed_parameters(&set(&[0, 4]), Some(&initial)).is_err());
    }

    #[test]
    fn no_values_uses_defaults() {
        let seed = seed_parameters(&set(&[1]), None).unwrap();
        assert!(matches!(seed.source, SeedSource::Defaults { .. }));
        assert_eq!(seed.params.tau_of(1), Some(DEFAULT_TAU));
    }
}
