//! Declarative composite configuration loaded from YAML.
//!
//! A config names the composite, its settings, any recorded sequences, and
//! the ordered unit list. Every section defaults, so a file only has to say
//! what differs:
//!
//! ```yaml
//! label: door
//! settings:
//!   cooldown: 0.5
//! units:
//!   - label: creak
//!     effect: !Pulse
//!       duration: 1.0
//!   - label: slam
//!     timing:
//!       initial_delay: 0.25
//!     effect: !Pulse
//!       duration: 0.5
//! ```

pub mod settings;

pub use settings::Settings;

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::composite::{Composite, CompositeSettings};
use crate::effects::{HoldingPause, Looper, LooperStart, Pause, PlayTap, Pulse, ScriptPause, Shake};
use crate::error::Result;
use crate::sequence::{Sequence, SequenceBinding, TrackId};
use crate::shaker::ShakeChannel;
use crate::timing::TimingPolicy;
use crate::unit::{Effect, EffectUnit};

/// Which built-in effect a unit wraps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EffectConfig {
    Pulse {
        #[serde(default)]
        duration: f64,
    },
    Pause {
        duration: f64,
    },
    HoldingPause {
        #[serde(default)]
        duration: f64,
    },
    ScriptPause {
        #[serde(default)]
        auto_resume: Option<f64>,
    },
    Looper {
        #[serde(default)]
        duration: f64,
        /// Omit to loop until stopped.
        #[serde(default)]
        loops: Option<u32>,
    },
    LooperStart,
    Shake {
        #[serde(default)]
        channel: i32,
        duration: f64,
    },
}

impl Default for EffectConfig {
    fn default() -> Self {
        EffectConfig::Pulse { duration: 0.0 }
    }
}

/// Binds a unit to a track of a named sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRef {
    pub name: String,
    pub track: u32,
    #[serde(default)]
    pub quantized: bool,
    #[serde(default = "default_bpm")]
    pub bpm: f64,
}

fn default_bpm() -> f64 {
    120.0
}

/// One unit: its effect, timing and optional sequence binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    pub label: String,
    pub active: bool,
    pub chance: f64,
    pub timing: TimingPolicy,
    pub sequence: Option<SequenceRef>,
    pub effect: EffectConfig,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            label: String::new(),
            active: true,
            chance: 100.0,
            timing: TimingPolicy::default(),
            sequence: None,
            effect: EffectConfig::default(),
        }
    }
}

/// A whole composite as written in YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    pub label: String,
    pub settings: CompositeSettings,
    pub sequences: Vec<Sequence>,
    pub units: Vec<UnitConfig>,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            label: "feedbacks".to_string(),
            settings: CompositeSettings::default(),
            sequences: Vec::new(),
            units: Vec::new(),
        }
    }
}

/// Shared sinks handed to the effects a config builds.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    pub tap: PlayTap,
    pub shakes: ShakeChannel,
}

impl CompositeConfig {
    /// Parse a config from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        log::debug!(
            "loaded '{}' from {}: {} units",
            config.label,
            path.display(),
            config.units.len()
        );
        Ok(config)
    }

    /// Write the config as YAML, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Look up a sequence by name.
    pub fn sequence(&self, name: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|s| s.name == name)
    }

    /// Build a composite with private sinks. Dangling references and bad
    /// values are logged and skipped, so building always succeeds.
    pub fn build(&self) -> Composite {
        self.build_with(&BuildContext::default())
    }

    /// Build a composite whose effects report to `cx`.
    pub fn build_with(&self, cx: &BuildContext) -> Composite {
        let mut sequences: HashMap<&str, Rc<Sequence>> = HashMap::new();
        for sequence in &self.sequences {
            if sequences.contains_key(sequence.name.as_str()) {
                log::warn!(
                    "sequence '{}' is defined twice, keeping the first",
                    sequence.name
                );
                continue;
            }
            let mut sorted = sequence.clone();
            sorted.sanitize();
            sorted.sort();
            sequences.insert(sequence.name.as_str(), Rc::new(sorted));
        }

        let units = self
            .units
            .iter()
            .enumerate()
            .map(|(i, unit)| build_unit(i, unit, &sequences, cx))
            .collect();

        Composite::new(self.label.clone(), units).with_settings(self.settings.clone())
    }
}

fn build_unit(
    index: usize,
    config: &UnitConfig,
    sequences: &HashMap<&str, Rc<Sequence>>,
    cx: &BuildContext,
) -> EffectUnit {
    let label = if config.label.is_empty() {
        format!("unit{index}")
    } else {
        config.label.clone()
    };

    let mut timing = config.timing.clone();
    if let Some(reference) = &config.sequence {
        timing.sequence = bind_sequence(&label, reference, sequences);
    }

    EffectUnit::boxed(label.clone(), build_effect(&label, &config.effect, cx))
        .with_timing(timing)
        .with_chance(config.chance)
        .with_active(config.active)
}

/// Resolve a unit's sequence reference. A dangling reference leaves the unit
/// unbound so the rest of the composite still builds.
fn bind_sequence(
    label: &str,
    reference: &SequenceRef,
    sequences: &HashMap<&str, Rc<Sequence>>,
) -> Option<SequenceBinding> {
    let Some(sequence) = sequences.get(reference.name.as_str()) else {
        log::warn!(
            "unit '{label}': unknown sequence '{}', playing unbound",
            reference.name
        );
        return None;
    };
    let track = TrackId(reference.track);
    if !sequence.track_ids().contains(&track) {
        log::warn!(
            "unit '{label}': sequence '{}' has no track {}, playing unbound",
            reference.name,
            reference.track
        );
        return None;
    }
    Some(if reference.quantized {
        SequenceBinding::quantized(sequence.clone(), track, reference.bpm)
    } else {
        SequenceBinding::original(sequence.clone(), track)
    })
}

fn build_effect(label: &str, config: &EffectConfig, cx: &BuildContext) -> Box<dyn Effect> {
    let tap = cx.tap.clone();
    match *config {
        EffectConfig::Pulse { duration } => Box::new(Pulse::new(label, duration).with_tap(tap)),
        EffectConfig::Pause { duration } => Box::new(Pause { duration, tap }),
        EffectConfig::HoldingPause { duration } => Box::new(HoldingPause { duration, tap }),
        EffectConfig::ScriptPause { auto_resume } => Box::new(ScriptPause { auto_resume, tap }),
        EffectConfig::Looper { duration, loops } => Box::new(Looper {
            duration,
            loops,
            tap,
        }),
        EffectConfig::LooperStart => Box::new(LooperStart),
        EffectConfig::Shake { channel, duration } => Box::new(Shake {
            channel: cx.shakes.clone(),
            channel_id: channel,
            duration,
            tap,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedbackError;
    use crate::timing::Direction;
    use crate::unit::Hold;

    #[test]
    fn minimal_config() {
        let config = CompositeConfig::from_yaml("units: []").unwrap();
        assert_eq!(config.label, "feedbacks");
        assert!(config.units.is_empty());
        assert_eq!(config.settings, CompositeSettings::default());
    }

    #[test]
    fn full_config_builds() {
        let yaml = r#"
label: door
settings:
  direction: Backward
  cooldown: 0.5
  seed: 4
sequences:
  - name: knock
    tracks:
      - id: 0
        key: k
    events:
      - { track_id: 0, timestamp: 0.5 }
      - { track_id: 0, timestamp: 0.0 }
    trailing_silence: 0.5
units:
  - label: creak
    effect: !Pulse
      duration: 1.0
  - label: wait
    effect: !HoldingPause
      duration: 0.25
  - label: knocks
    chance: 50
    sequence:
      name: knock
      track: 0
    timing:
      initial_delay: -1.0
  - effect: LooperStart
"#;
        let config = CompositeConfig::from_yaml(yaml).unwrap();
        let c = config.build();
        assert_eq!(c.label(), "door");
        assert_eq!(c.direction(), Direction::Backward);
        assert_eq!(c.units().len(), 4);
        assert_eq!(c.units()[1].hold(), Some(Hold::UntilAllComplete));
        let knocks = c.unit("knocks").unwrap();
        assert_eq!(knocks.chance, 50.0);
        assert_eq!(knocks.timing.initial_delay, 0.0);
        let binding = knocks.timing.sequence.as_ref().unwrap();
        assert_eq!(binding.cues(), &[0.0, 0.5]);
        assert_eq!(binding.duration(), 1.0);
        assert!(c.unit("unit3").is_some());
    }

    fn labels_played(yaml: &str) -> Vec<String> {
        let cx = BuildContext::default();
        let mut c = CompositeConfig::from_yaml(yaml)
            .unwrap()
            .build_with(&cx)
            .with_kill_switch(crate::composite::KillSwitch::new());
        c.play(crate::unit::Vec3::ZERO, 1.0);
        cx.tap.take().into_iter().map(|r| r.effect).collect()
    }

    #[test]
    fn unknown_sequence_leaves_unit_unbound() {
        let yaml = r#"
units:
  - label: hit
    effect: !Pulse
      duration: 0.5
  - label: lost
    sequence: { name: missing, track: 0 }
"#;
        let c = CompositeConfig::from_yaml(yaml).unwrap().build();
        assert!(c.unit("lost").unwrap().timing.sequence.is_none());
        assert_eq!(labels_played(yaml), vec!["hit", "lost"]);
    }

    #[test]
    fn missing_track_leaves_unit_unbound() {
        let yaml = r#"
sequences:
  - name: s
    tracks: [{ id: 1 }]
units:
  - label: hit
  - sequence: { name: s, track: 2 }
"#;
        let c = CompositeConfig::from_yaml(yaml).unwrap().build();
        assert!(c.unit("unit1").unwrap().timing.sequence.is_none());
        assert_eq!(labels_played(yaml), vec!["hit", "unit1"]);
    }

    #[test]
    fn infinite_timestamps_do_not_break_the_build() {
        let yaml = r#"
sequences:
  - name: s
    tracks: [{ id: 0 }]
    events:
      - { track_id: 0, timestamp: 0.0 }
      - { track_id: 0, timestamp: .inf }
    trailing_silence: 0.5
units:
  - label: knocks
    sequence: { name: s, track: 0, quantized: true, bpm: 120 }
"#;
        let c = CompositeConfig::from_yaml(yaml).unwrap().build();
        let binding = c.unit("knocks").unwrap().timing.sequence.as_ref().unwrap();
        assert_eq!(binding.cues(), &[0.0]);
        assert_eq!(binding.duration(), 0.5);
    }

    #[test]
    fn duplicate_sequence_keeps_the_first() {
        let yaml = r#"
sequences:
  - name: s
    tracks: [{ id: 0 }]
    events: [{ track_id: 0, timestamp: 0.0 }]
  - name: s
    tracks: [{ id: 0 }]
    events: [{ track_id: 0, timestamp: 0.5 }]
units:
  - sequence: { name: s, track: 0 }
"#;
        let c = CompositeConfig::from_yaml(yaml).unwrap().build();
        let binding = c.unit("unit0").unwrap().timing.sequence.as_ref().unwrap();
        assert_eq!(binding.cues(), &[0.0]);
    }

    #[test]
    fn unknown_effect_is_rejected() {
        let yaml = "units:\n  - effect: !Explode\n      radius: 2\n";
        assert!(matches!(
            CompositeConfig::from_yaml(yaml),
            Err(FeedbackError::Yaml(_))
        ));
    }

    #[test]
    fn tap_sees_built_effects() {
        let yaml = "units:\n  - label: hit\n    effect: !Pulse\n      duration: 0.5\n";
        let cx = BuildContext::default();
        let mut c = CompositeConfig::from_yaml(yaml)
            .unwrap()
            .build_with(&cx)
            .with_kill_switch(crate::composite::KillSwitch::new());
        c.play(crate::unit::Vec3::ZERO, 1.0);
        let records = cx.tap.take();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].effect, "hit");
    }
}
