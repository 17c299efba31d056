//! Tagged parameter commands and timed automation.
//!
//! Commands arrive as JSON (from the CLI, a preset generator or an
//! automation script), are validated once at the boundary and only then
//! applied to the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::engine::AudioEngine;
use crate::chain::topology::BAND_COUNT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterCommand {
    SetPreamp { db: f32 },
    SetBandGain { index: usize, db: f32 },
    SetEq { gains: Vec<f32> },
    SetPresence { db: f32 },
    SetStereoWidth { value: f32 },
    SetReflection { level: f32 },
    SetVolume { value: f32 },
    SetPlaybackRate { rate: f32 },
    SetLimiter { enabled: bool },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid command json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} must be finite, got {value}")]
    NotFinite { field: &'static str, value: f32 },
    #[error("band index {0} out of range 0..{BAND_COUNT}")]
    BandIndex(usize),
    #[error("expected {BAND_COUNT} eq gains, got {0}")]
    EqLength(usize),
    #[error("playback rate must be positive, got {0}")]
    PlaybackRate(f32),
    #[error("automation time must be finite and non-negative, got {0}")]
    Time(f64),
}

/// A command that passed [`ParameterCommand::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidCommand(ParameterCommand);

impl ValidCommand {
    pub fn command(&self) -> &ParameterCommand {
        &self.0
    }
}

fn finite(field: &'static str, value: f32) -> Result<(), CommandError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CommandError::NotFinite { field, value })
    }
}

impl ParameterCommand {
    pub fn parse(json: &str) -> Result<ValidCommand, CommandError> {
        serde_json::from_str::<ParameterCommand>(json)?.validate()
    }

    pub fn validate(self) -> Result<ValidCommand, CommandError> {
        match &self {
            ParameterCommand::SetPreamp { db } => finite("db", *db)?,
            ParameterCommand::SetBandGain { index, db } => {
                if *index >= BAND_COUNT {
                    return Err(CommandError::BandIndex(*index));
                }
                finite("db", *db)?;
            }
            ParameterCommand::SetEq { gains } => {
                if gains.len() != BAND_COUNT {
                    return Err(CommandError::EqLength(gains.len()));
                }
                for db in gains {
                    finite("gains", *db)?;
                }
            }
            ParameterCommand::SetPresence { db } => finite("db", *db)?,
            ParameterCommand::SetStereoWidth { value } => finite("value", *value)?,
            ParameterCommand::SetReflection { level } => finite("level", *level)?,
            ParameterCommand::SetVolume { value } => finite("value", *value)?,
            ParameterCommand::SetPlaybackRate { rate } => {
                finite("rate", *rate)?;
                if *rate <= 0.0 {
                    return Err(CommandError::PlaybackRate(*rate));
                }
            }
            ParameterCommand::SetLimiter { .. } => {}
        }
        Ok(ValidCommand(self))
    }
}

impl AudioEngine {
    pub fn apply(&self, command: &ValidCommand) {
        log::debug!("Applying {:?}", command.command());
        match command.command() {
            ParameterCommand::SetPreamp { db } => self.set_preamp(*db),
            ParameterCommand::SetBandGain { index, db } => self.set_band_gain(*index, *db),
            ParameterCommand::SetEq { gains } => self.set_eq(gains),
            ParameterCommand::SetPresence { db } => self.set_presence(*db),
            ParameterCommand::SetStereoWidth { value } => self.set_stereo_width(*value),
            ParameterCommand::SetReflection { level } => self.set_reflection(*level),
            ParameterCommand::SetVolume { value } => self.set_volume(*value),
            ParameterCommand::SetPlaybackRate { rate } => self.set_playback_rate(*rate),
            ParameterCommand::SetLimiter { enabled } => self.set_limiter_enabled(*enabled),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledCommand {
    /// Context time in seconds.
    pub at: f64,
    pub command: ParameterCommand,
}

/// Commands ordered by time, handed out as the render clock passes them.
#[derive(Debug, Clone, Default)]
pub struct Automation {
    events: Vec<(f64, ValidCommand)>,
    next: usize,
}

impl Automation {
    pub fn from_json(json: &str) -> Result<Self, CommandError> {
        let scheduled: Vec<ScheduledCommand> = serde_json::from_str(json)?;
        Self::new(scheduled)
    }

    pub fn new(scheduled: Vec<ScheduledCommand>) -> Result<Self, CommandError> {
        let mut events = scheduled
            .into_iter()
            .map(|s| {
                if !s.at.is_finite() || s.at < 0.0 {
                    return Err(CommandError::Time(s.at));
                }
                Ok((s.at, s.command.validate()?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        events.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { events, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[cfg(test)]
    pub fn remaining(&self) -> usize {
        self.events.len() - self.next
    }

    /// Applies every command scheduled at or before `now`; returns how many ran.
    pub fn apply_due(&mut self, engine: &AudioEngine, now: f64) -> usize {
        let start = self.next;
        while let Some((at, command)) = self.events.get(self.next) {
            if *at > now {
                break;
            }
            engine.apply(command);
            self.next += 1;
        }
        self.next - start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::media::MediaElement;
    use crate::chain::engine::EngineSettings;
    use crate::chain::topology::NodeRole;

    fn built() -> (AudioEngine, MediaElement) {
        let mut engine = AudioEngine::new(
            8_000,
            EngineSettings {
                initial_volume: 1.0,
                seed: Some(9),
            },
        );
        let media = MediaElement::from_channels(vec![0.0; 800], vec![0.0; 800], 8_000);
        engine.build(&media);
        (engine, media)
    }

    #[test]
    fn parses_tagged_commands() {
        let command = ParameterCommand::parse(r#"{"type":"set_band_gain","index":0,"db":8.0}"#).unwrap();
        assert_eq!(
            command.command(),
            &ParameterCommand::SetBandGain { index: 0, db: 8.0 }
        );
        let command = ParameterCommand::parse(r#"{"type":"set_limiter","enabled":false}"#).unwrap();
        assert_eq!(command.command(), &ParameterCommand::SetLimiter { enabled: false });
    }

    #[test]
    fn rejects_unknown_and_malformed_commands() {
        assert!(matches!(
            ParameterCommand::parse(r#"{"type":"set_bass_boost","db":3}"#),
            Err(CommandError::Parse(_))
        ));
        assert!(matches!(
            ParameterCommand::parse(r#"{"type":"set_volume"}"#),
            Err(CommandError::Parse(_))
        ));
    }

    #[test]
    fn validates_at_the_boundary() {
        assert!(matches!(
            ParameterCommand::SetBandGain { index: 10, db: 1.0 }.validate(),
            Err(CommandError::BandIndex(10))
        ));
        assert!(matches!(
            ParameterCommand::SetEq { gains: vec![0.0; 9] }.validate(),
            Err(CommandError::EqLength(9))
        ));
        assert!(matches!(
            ParameterCommand::SetVolume { value: f32::NAN }.validate(),
            Err(CommandError::NotFinite { field: "value", .. })
        ));
        assert!(matches!(
            ParameterCommand::SetPlaybackRate { rate: 0.0 }.validate(),
            Err(CommandError::PlaybackRate(_))
        ));
        assert!(ParameterCommand::SetPlaybackRate { rate: 3.0 }.validate().is_ok());
    }

    #[test]
    fn applies_to_engine() {
        let (engine, media) = built();
        engine.apply(&ParameterCommand::parse(r#"{"type":"set_reflection","level":0.4}"#).unwrap());
        engine.apply(&ParameterCommand::parse(r#"{"type":"set_playback_rate","rate":0.5}"#).unwrap());
        assert_eq!(engine.param(NodeRole::Wet, "gain").unwrap().target(), 0.4);
        assert_eq!(media.playback_rate(), 0.5);
    }

    #[test]
    fn automation_runs_in_time_order() {
        let (engine, _media) = built();
        let mut automation = Automation::from_json(
            r#"[
                {"at": 1.0, "command": {"type": "set_volume", "value": 0.25}},
                {"at": 0.0, "command": {"type": "set_volume", "value": 0.75}},
                {"at": 2.5, "command": {"type": "set_limiter", "enabled": false}}
            ]"#,
        )
        .unwrap();
        assert_eq!(automation.len(), 3);

        assert_eq!(automation.apply_due(&engine, 0.5), 1);
        assert_eq!(engine.param(NodeRole::Output, "gain").unwrap().target(), 0.75);
        assert_eq!(automation.apply_due(&engine, 0.5), 0);
        assert_eq!(automation.apply_due(&engine, 3.0), 2);
        assert_eq!(engine.param(NodeRole::Output, "gain").unwrap().target(), 0.25);
        assert_eq!(engine.param(NodeRole::Limiter, "ratio").unwrap().target(), 1.0);
        assert_eq!(automation.remaining(), 0);
    }

    #[test]
    fn automation_rejects_negative_time() {
        let result = Automation::from_json(r#"[{"at": -1.0, "command": {"type": "set_volume", "value": 1.0}}]"#);
        assert!(matches!(result, Err(CommandError::Time(_))));
    }
}
