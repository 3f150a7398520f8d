use std::fmt;
use std::str::FromStr;

/// Condition a single logic channel has to satisfy for a trigger to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerMatch {
    Zero,
    One,
    Rising,
    Falling,
    Edge,
}

impl TriggerMatch {
    pub const ALL: [TriggerMatch; 5] = [
        TriggerMatch::Zero,
        TriggerMatch::One,
        TriggerMatch::Rising,
        TriggerMatch::Falling,
        TriggerMatch::Edge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMatch::Zero => "0",
            TriggerMatch::One => "1",
            TriggerMatch::Rising => "r",
            TriggerMatch::Falling => "f",
            TriggerMatch::Edge => "e",
        }
    }

    /// Edge-sensitive matches need the channel's previous level.
    pub fn needs_history(&self) -> bool {
        matches!(
            self,
            TriggerMatch::Rising | TriggerMatch::Falling | TriggerMatch::Edge
        )
    }

    /// Evaluate the match against the current level of a channel and, for
    /// edge matches, its level in the preceding sample. Without history an
    /// edge never matches.
    pub fn evaluate(&self, previous: Option<bool>, current: bool) -> bool {
        match (self, previous) {
            (TriggerMatch::Zero, _) => !current,
            (TriggerMatch::One, _) => current,
            (TriggerMatch::Rising, Some(prev)) => !prev && current,
            (TriggerMatch::Falling, Some(prev)) => prev && !current,
            (TriggerMatch::Edge, Some(prev)) => prev != current,
            (_, None) => false,
        }
    }
}

impl fmt::Display for TriggerMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown trigger match '{0}', expected one of 0, 1, r, f, e")]
pub struct ParseTriggerMatchError(pub String);

impl FromStr for TriggerMatch {
    type Err = ParseTriggerMatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerMatch::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ParseTriggerMatchError(s.to_string()))
    }
}

/// One `(channel, match)` pair of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerCondition {
    pub channel: usize,
    pub kind: TriggerMatch,
}

impl TriggerCondition {
    pub fn new(channel: usize, kind: TriggerMatch) -> Self {
        Self { channel, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseTriggerError {
    #[error("Trigger condition '{0}' is not of the form D<channel>=<match>")]
    Syntax(String),

    #[error("Invalid channel in trigger condition '{0}'")]
    Channel(String),

    #[error(transparent)]
    Match(#[from] ParseTriggerMatchError),
}

impl FromStr for TriggerCondition {
    type Err = ParseTriggerError;

    /// Parses `D2=r` or `2=r`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (channel, kind) = s
            .trim()
            .split_once('=')
            .ok_or_else(|| ParseTriggerError::Syntax(s.to_string()))?;
        let channel = channel.trim();
        let channel = channel
            .strip_prefix('D')
            .unwrap_or(channel)
            .parse()
            .map_err(|_| ParseTriggerError::Channel(s.to_string()))?;
        Ok(Self::new(channel, kind.trim().parse()?))
    }
}

#[derive(Debug, Default)]
pub struct ChannelTriggerBuilder {
    conditions: Vec<TriggerCondition>,
}

impl ChannelTriggerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition for `channel`. A later condition for the same
    /// channel replaces the earlier one.
    pub fn channel(mut self, channel: usize, kind: TriggerMatch) -> Self {
        match self.conditions.iter_mut().find(|c| c.channel == channel) {
            Some(existing) => existing.kind = kind,
            None => self.conditions.push(TriggerCondition::new(channel, kind)),
        }
        self
    }

    pub fn is_low(self, channel: usize) -> Self {
        self.channel(channel, TriggerMatch::Zero)
    }

    pub fn is_high(self, channel: usize) -> Self {
        self.channel(channel, TriggerMatch::One)
    }

    pub fn rises(self, channel: usize) -> Self {
        self.channel(channel, TriggerMatch::Rising)
    }

    pub fn falls(self, channel: usize) -> Self {
        self.channel(channel, TriggerMatch::Falling)
    }

    pub fn toggles(self, channel: usize) -> Self {
        self.channel(channel, TriggerMatch::Edge)
    }

    /// All conditions must hold on the same sample.
    pub fn all_match(self) -> Trigger {
        Trigger::new(self.conditions)
    }
}

/// Software trigger: an ordered list of conditions combined with logical AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trigger {
    pub conditions: Vec<TriggerCondition>,
}

impl Trigger {
    pub fn new(conditions: Vec<TriggerCondition>) -> Self {
        Self { conditions }
    }

    pub fn start_capturing_when() -> ChannelTriggerBuilder {
        ChannelTriggerBuilder::new()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Highest channel index referenced by any condition.
    pub fn max_channel(&self) -> Option<usize> {
        self.conditions.iter().map(|c| c.channel).max()
    }
}

impl From<Vec<TriggerCondition>> for Trigger {
    fn from(conditions: Vec<TriggerCondition>) -> Self {
        Self::new(conditions)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "D{}={}", c.channel, c.kind)?;
        }
        Ok(())
    }
}

impl FromStr for Trigger {
    type Err = ParseTriggerError;

    /// Comma separated conditions, e.g. `D0=1,D2=r`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let conditions = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<TriggerCondition>, _>>()?;
        Ok(Self::new(conditions))
    }
}
