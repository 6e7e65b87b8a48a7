//! Effect parameter-applier table
//!
//! Each effect kind maps to a static list of parameter descriptors. Applying
//! a parameter map clamps known names into range and ignores the rest, so a
//! stage is configured by its tag alone.

use std::collections::BTreeMap;

use log::debug;

use crate::graph::EffectUnit;
use crate::model::{EffectKind, EffectStage};

/// Range and default of one effect parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

const fn spec(name: &'static str, min: f64, max: f64, default: f64) -> ParameterSpec {
    ParameterSpec {
        name,
        min,
        max,
        default,
    }
}

const REVERB: &[ParameterSpec] = &[
    spec("wet_dry_mix", 0.0, 100.0, 30.0),
    spec("room_size", 0.0, 1.0, 0.5),
    spec("decay", 0.1, 20.0, 2.0),
    spec("pre_delay", 0.0, 0.5, 0.02),
];

const DELAY: &[ParameterSpec] = &[
    spec("delay_time", 0.0, 2.0, 0.25),
    spec("feedback", 0.0, 100.0, 40.0),
    spec("wet_dry_mix", 0.0, 100.0, 30.0),
    spec("low_pass_cutoff", 10.0, 22050.0, 15000.0),
];

const CHORUS: &[ParameterSpec] = &[
    spec("rate", 0.1, 10.0, 1.0),
    spec("depth", 0.0, 1.0, 0.5),
    spec("wet_dry_mix", 0.0, 100.0, 50.0),
];

const COMPRESSOR: &[ParameterSpec] = &[
    spec("threshold", -60.0, 0.0, -20.0),
    spec("ratio", 1.0, 20.0, 4.0),
    spec("attack", 0.0001, 0.2, 0.01),
    spec("release", 0.01, 3.0, 0.1),
    spec("makeup_gain", -20.0, 40.0, 0.0),
];

const EQUALIZER: &[ParameterSpec] = &[
    spec("low_gain", -24.0, 24.0, 0.0),
    spec("mid_gain", -24.0, 24.0, 0.0),
    spec("high_gain", -24.0, 24.0, 0.0),
    spec("global_gain", -24.0, 24.0, 0.0),
];

const DISTORTION: &[ParameterSpec] = &[
    spec("pre_gain", -80.0, 20.0, -6.0),
    spec("wet_dry_mix", 0.0, 100.0, 50.0),
];

const FILTER: &[ParameterSpec] = &[
    spec("cutoff", 10.0, 22050.0, 1000.0),
    spec("resonance", 0.0, 1.0, 0.5),
];

const GATE: &[ParameterSpec] = &[
    spec("threshold", -80.0, 0.0, -40.0),
    spec("attack", 0.0001, 0.1, 0.001),
    spec("release", 0.01, 2.0, 0.1),
];

const LIMITER: &[ParameterSpec] = &[
    spec("ceiling", -20.0, 0.0, -0.3),
    spec("release", 0.001, 1.0, 0.05),
];

/// Parameter descriptors for an effect kind
pub fn parameter_specs(kind: EffectKind) -> &'static [ParameterSpec] {
    match kind {
        EffectKind::Reverb => REVERB,
        EffectKind::Delay => DELAY,
        EffectKind::Chorus => CHORUS,
        EffectKind::Compressor => COMPRESSOR,
        EffectKind::Equalizer => EQUALIZER,
        EffectKind::Distortion => DISTORTION,
        EffectKind::Filter => FILTER,
        EffectKind::Gate => GATE,
        EffectKind::Limiter => LIMITER,
    }
}

/// Create a processing unit for a stage, with defaults overridden by its parameters
pub fn instantiate(stage: &EffectStage) -> EffectUnit {
    let mut unit = EffectUnit::new(stage.kind);
    for spec in parameter_specs(stage.kind) {
        unit.values.insert(spec.name.to_string(), spec.default);
    }
    apply_parameters(&mut unit, &stage.parameters);
    unit
}

/// Apply a parameter map to a unit
///
/// Returns how many parameters were applied; unknown names are skipped.
pub fn apply_parameters(unit: &mut EffectUnit, parameters: &BTreeMap<String, f64>) -> usize {
    let specs = parameter_specs(unit.kind);
    let mut applied = 0;
    for (name, value) in parameters {
        match specs.iter().find(|spec| spec.name == name.as_str()) {
            Some(spec) if value.is_finite() => {
                unit.values.insert(name.clone(), value.clamp(spec.min, spec.max));
                applied += 1;
            }
            Some(_) => debug!("[EFFECTS] {} ignoring non-finite {}", unit.kind, name),
            None => debug!("[EFFECTS] {} has no parameter {}", unit.kind, name),
        }
    }
    applied
}
