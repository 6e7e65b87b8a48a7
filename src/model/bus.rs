//! Auxiliary buses and their effect stages
//!
//! Effect stages store parameters, not processing state. The engine owns the
//! matching graph node for each stage and wires the enabled ones in list
//! order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{BusId, EffectId};

/// Type tag of an effect stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Reverb,
    Delay,
    Chorus,
    Compressor,
    Equalizer,
    Distortion,
    Filter,
    Gate,
    Limiter,
}

impl EffectKind {
    /// Stable lowercase identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectKind::Reverb => "reverb",
            EffectKind::Delay => "delay",
            EffectKind::Chorus => "chorus",
            EffectKind::Compressor => "compressor",
            EffectKind::Equalizer => "equalizer",
            EffectKind::Distortion => "distortion",
            EffectKind::Filter => "filter",
            EffectKind::Gate => "gate",
            EffectKind::Limiter => "limiter",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single effect in a bus chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectStage {
    #[serde(default)]
    pub id: EffectId,
    pub kind: EffectKind,
    /// Whether this effect is wired into the chain
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Effect-specific parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
}

fn enabled_default() -> bool {
    true
}

impl EffectStage {
    /// Create an enabled effect with no explicit parameters
    pub fn new(kind: EffectKind) -> Self {
        Self {
            id: EffectId::new(),
            kind,
            enabled: true,
            parameters: BTreeMap::new(),
        }
    }

    /// Builder: set a parameter
    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Builder: set the enabled flag
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Get a specific parameter value
    pub fn param(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }
}

/// An auxiliary bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    #[serde(default)]
    pub id: BusId,
    #[serde(default)]
    pub name: String,
    /// Ordered effect chain (index 0 first)
    #[serde(default)]
    pub effects: Vec<EffectStage>,
    #[serde(default = "unity")]
    pub input_gain: f32,
    #[serde(default = "unity")]
    pub output_gain: f32,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
}

fn unity() -> f32 {
    1.0
}

impl Bus {
    /// Create an empty bus at unity gain
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: BusId::new(),
            name: name.into(),
            effects: Vec::new(),
            input_gain: 1.0,
            output_gain: 1.0,
            mute: false,
            solo: false,
        }
    }

    /// Builder: append an effect
    pub fn with_effect(mut self, effect: EffectStage) -> Self {
        self.effects.push(effect);
        self
    }

    /// Insert an effect at a position, clamped to the chain length
    ///
    /// # Returns
    /// The actual index where the effect was inserted
    pub fn insert_effect(&mut self, index: usize, effect: EffectStage) -> usize {
        let index = index.min(self.effects.len());
        self.effects.insert(index, effect);
        index
    }

    /// Remove an effect by id
    pub fn remove_effect(&mut self, id: EffectId) -> Option<EffectStage> {
        let index = self.effects.iter().position(|e| e.id == id)?;
        Some(self.effects.remove(index))
    }

    /// Move an effect to a new position, clamped to the chain length
    pub fn move_effect(&mut self, id: EffectId, new_index: usize) -> bool {
        let Some(current) = self.effects.iter().position(|e| e.id == id) else {
            return false;
        };
        let effect = self.effects.remove(current);
        let new_index = new_index.min(self.effects.len());
        self.effects.insert(new_index, effect);
        true
    }

    /// Get an effect by id
    pub fn effect(&self, id: EffectId) -> Option<&EffectStage> {
        self.effects.iter().find(|e| e.id == id)
    }

    /// Get a mutable effect by id
    pub fn effect_mut(&mut self, id: EffectId) -> Option<&mut EffectStage> {
        self.effects.iter_mut().find(|e| e.id == id)
    }

    /// Enabled effects in chain order
    pub fn enabled_effects(&self) -> impl Iterator<Item = &EffectStage> {
        self.effects.iter().filter(|e| e.enabled)
    }
}
