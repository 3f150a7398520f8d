use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;
use crate::trigger_config::Trigger;

pub const DEFAULT_NUM_LOGIC_CHANNELS: usize = 12;
pub const DEFAULT_SAMPLE_RATE: u64 = 100_000_000;
pub const DEFAULT_LIMIT_SAMPLES: u64 = 10_000;
pub const DEFAULT_PATTERN_MODE: PatternMode = PatternMode::Incremental;

pub const MIN_SAMPLE_RATE: u64 = 1;
pub const MAX_SAMPLE_RATE: u64 = 1_000_000_000;
pub const SAMPLE_RATE_STEP: u64 = 1;

pub const LOGIC_GROUP_NAME: &str = "Logic";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternMode {
    Sigrok,
    Random,
    Incremental,
    WalkingOne,
    WalkingZero,
    AllLow,
    AllHigh,
    Squid,
}

impl PatternMode {
    pub const ALL: [PatternMode; 8] = [
        PatternMode::Sigrok,
        PatternMode::Random,
        PatternMode::Incremental,
        PatternMode::WalkingOne,
        PatternMode::WalkingZero,
        PatternMode::AllLow,
        PatternMode::AllHigh,
        PatternMode::Squid,
    ];

    // No spaces, the names are used verbatim on command lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternMode::Sigrok => "sigrok",
            PatternMode::Random => "random",
            PatternMode::Incremental => "incremental",
            PatternMode::WalkingOne => "walking-one",
            PatternMode::WalkingZero => "walking-zero",
            PatternMode::AllLow => "all-low",
            PatternMode::AllHigh => "all-high",
            PatternMode::Squid => "squid",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(PatternMode::as_str).collect()
    }

    /// Modes whose output never changes and can be precomputed.
    pub fn is_static(&self) -> bool {
        matches!(self, PatternMode::AllLow | PatternMode::AllHigh)
    }
}

impl fmt::Display for PatternMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatternMode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownPattern(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Logic,
    Analog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub index: usize,
    pub name: String,
    pub kind: ChannelKind,
    pub enabled: bool,
}

impl ChannelDescriptor {
    pub fn logic(index: usize) -> Self {
        Self {
            index,
            name: format!("D{}", index),
            kind: ChannelKind::Logic,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGroup {
    pub name: String,
    pub channels: Vec<usize>,
}

/// Counters of the acquisition currently running on the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    /// Samples produced by the pattern generator, drives pacing.
    pub generated_samples: u64,
    /// Samples handed to the sink in the current trigger cycle.
    pub sent_samples: u64,
    /// Samples in the frame currently being filled.
    pub sent_frame_samples: u64,
    pub total_sent_samples: u64,
    pub frames_sent: u64,
    pub elapsed_micros: u64,
    pub tick_sequence: u64,
    pub trigger_fired: bool,
    pub cycles: u64,
}

/// Mutable state of one simulated device.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    channels: Vec<ChannelDescriptor>,
    groups: Vec<ChannelGroup>,
    sample_rate: u64,
    limit_samples: u64,
    limit_msec: u64,
    pattern_mode: PatternMode,
    capture_ratio: u64,
    holdoff_samples: u64,
    repeat_trigger: bool,
    trigger: Option<Trigger>,
    static_pattern: Vec<u8>,
    pub(crate) run: RunState,
}

impl DeviceContext {
    pub fn new(num_logic_channels: usize) -> Self {
        let channels: Vec<ChannelDescriptor> =
            (0..num_logic_channels).map(ChannelDescriptor::logic).collect();

        let groups = if num_logic_channels > 0 {
            vec![ChannelGroup {
                name: LOGIC_GROUP_NAME.to_string(),
                channels: (0..num_logic_channels).collect(),
            }]
        } else {
            Vec::new()
        };

        Self {
            channels,
            groups,
            sample_rate: DEFAULT_SAMPLE_RATE,
            limit_samples: DEFAULT_LIMIT_SAMPLES,
            limit_msec: 0,
            pattern_mode: DEFAULT_PATTERN_MODE,
            capture_ratio: 0,
            holdoff_samples: 0,
            repeat_trigger: false,
            trigger: None,
            static_pattern: vec![0x00; num_logic_channels.div_ceil(8)],
            run: RunState::default(),
        }
    }

    pub fn logic_channel_count(&self) -> usize {
        self.channels
            .iter()
            .filter(|ch| ch.kind == ChannelKind::Logic)
            .count()
    }

    /// Bytes of one raw sample covering every modeled logic channel.
    pub fn raw_unit_size(&self) -> usize {
        self.logic_channel_count().div_ceil(8)
    }

    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    pub fn channel_groups(&self) -> &[ChannelGroup] {
        &self.groups
    }

    pub fn logic_group(&self) -> Option<&ChannelGroup> {
        self.groups.iter().find(|g| g.name == LOGIC_GROUP_NAME)
    }

    pub fn set_channel_enabled(&mut self, index: usize, enabled: bool) -> Result<(), ConfigError> {
        let count = self.channels.len();
        let channel = self
            .channels
            .get_mut(index)
            .ok_or(ConfigError::NoSuchChannel { channel: index, count })?;
        log::debug!("Channel {} {}", channel.name, if enabled { "enabled" } else { "disabled" });
        channel.enabled = enabled;
        Ok(())
    }

    pub fn sample_rate(&self) -> u64 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, hz: u64) -> Result<(), ConfigError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&hz) {
            return Err(ConfigError::SampleRateOutOfRange(hz));
        }
        log::debug!("Setting samplerate to {} Hz", hz);
        self.sample_rate = hz;
        Ok(())
    }

    pub fn limit_samples(&self) -> u64 {
        self.limit_samples
    }

    /// Setting a sample limit clears any time limit.
    pub fn set_limit_samples(&mut self, samples: u64) {
        log::debug!("Setting sample limit to {}", samples);
        self.limit_samples = samples;
        self.limit_msec = 0;
    }

    pub fn limit_msec(&self) -> u64 {
        self.limit_msec
    }

    /// Setting a time limit clears any sample limit.
    pub fn set_limit_msec(&mut self, msec: u64) {
        log::debug!("Setting time limit to {} ms", msec);
        self.limit_msec = msec;
        self.limit_samples = 0;
    }

    pub fn pattern_mode(&self) -> PatternMode {
        self.pattern_mode
    }

    /// Also refreshes the precomputed buffer for the constant patterns.
    pub fn set_pattern_mode(&mut self, mode: PatternMode) {
        log::debug!("Setting logic pattern to {}", mode);
        self.pattern_mode = mode;
        match mode {
            PatternMode::AllLow => self.static_pattern.fill(0x00),
            PatternMode::AllHigh => self.static_pattern.fill(0xff),
            _ => {}
        }
    }

    pub fn static_pattern(&self) -> &[u8] {
        &self.static_pattern
    }

    pub fn capture_ratio(&self) -> u64 {
        self.capture_ratio
    }

    pub fn set_capture_ratio(&mut self, percent: u64) -> Result<(), ConfigError> {
        if percent > 100 {
            return Err(ConfigError::CaptureRatioOutOfRange(percent));
        }
        self.capture_ratio = percent;
        Ok(())
    }

    pub fn holdoff_samples(&self) -> u64 {
        self.holdoff_samples
    }

    pub fn set_holdoff_samples(&mut self, samples: u64) {
        self.holdoff_samples = samples;
    }

    pub fn repeat_trigger(&self) -> bool {
        self.repeat_trigger
    }

    pub fn set_repeat_trigger(&mut self, repeat: bool) {
        self.repeat_trigger = repeat;
    }

    pub fn trigger(&self) -> Option<&Trigger> {
        self.trigger.as_ref()
    }

    /// An empty condition list removes the trigger.
    pub fn set_trigger(&mut self, trigger: Option<Trigger>) -> Result<(), ConfigError> {
        let trigger = trigger.filter(|t| !t.is_empty());
        if let Some(channel) = trigger.as_ref().and_then(Trigger::max_channel) {
            let count = self.logic_channel_count();
            if channel >= count {
                return Err(ConfigError::NoSuchChannel { channel, count });
            }
        }
        match &trigger {
            Some(t) => log::debug!("Setting trigger to {}", t),
            None => log::debug!("Clearing trigger"),
        }
        self.trigger = trigger;
        Ok(())
    }

    /// Samples retained ahead of a trigger match. Only defined for a finite
    /// sample limit.
    pub fn pre_trigger_samples(&self) -> u64 {
        if self.limit_samples > 0 {
            let samples = u128::from(self.capture_ratio) * u128::from(self.limit_samples) / 100;
            u64::try_from(samples).unwrap_or(u64::MAX)
        } else {
            0
        }
    }

    pub fn run_state(&self) -> &RunState {
        &self.run
    }
}
