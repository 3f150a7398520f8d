//! Key based configuration access.
//!
//! Every [`ConfigKey`] has one entry in a static table naming its scope and
//! the typed accessors it supports. `config_get`, `config_set` and
//! `config_list` only look the entry up and call the accessor.

use std::fmt;

use crate::device_context::{
    ChannelGroup, DeviceContext, PatternMode, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE, SAMPLE_RATE_STEP,
};
use crate::trigger_config::{Trigger, TriggerCondition, TriggerMatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    SampleRate,
    LimitSamples,
    LimitMsec,
    PatternMode,
    CaptureRatio,
    Holdoff,
    RepeatTrigger,
    TriggerMatch,
    DeviceOptions,
}

impl ConfigKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::SampleRate => "samplerate",
            ConfigKey::LimitSamples => "limit_samples",
            ConfigKey::LimitMsec => "limit_time",
            ConfigKey::PatternMode => "pattern",
            ConfigKey::CaptureRatio => "captureratio",
            ConfigKey::Holdoff => "holdoff",
            ConfigKey::RepeatTrigger => "repeat_trigger",
            ConfigKey::TriggerMatch => "triggermatch",
            ConfigKey::DeviceOptions => "device_options",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOp {
    Get,
    Set,
    List,
}

impl fmt::Display for ConfigOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigOp::Get => "get",
            ConfigOp::Set => "set",
            ConfigOp::List => "list",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    U64(u64),
    Bool(bool),
    Str(String),
    StrList(Vec<&'static str>),
    Range { min: u64, max: u64, step: u64 },
    MatchKinds(Vec<TriggerMatch>),
    Conditions(Vec<TriggerCondition>),
    Keys(Vec<ConfigKey>),
}

impl ConfigValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::U64(_) => "u64",
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Str(_) => "string",
            ConfigValue::StrList(_) => "string list",
            ConfigValue::Range { .. } => "range",
            ConfigValue::MatchKinds(_) => "trigger match list",
            ConfigValue::Conditions(_) => "trigger condition list",
            ConfigValue::Keys(_) => "key list",
        }
    }

    fn into_u64(self, key: ConfigKey) -> Result<u64, ConfigError> {
        match self {
            ConfigValue::U64(v) => Ok(v),
            other => Err(ConfigError::WrongType { key, expected: "u64", actual: other.type_name() }),
        }
    }

    fn into_bool(self, key: ConfigKey) -> Result<bool, ConfigError> {
        match self {
            ConfigValue::Bool(v) => Ok(v),
            other => Err(ConfigError::WrongType { key, expected: "bool", actual: other.type_name() }),
        }
    }

    fn into_string(self, key: ConfigKey) -> Result<String, ConfigError> {
        match self {
            ConfigValue::Str(v) => Ok(v),
            other => Err(ConfigError::WrongType { key, expected: "string", actual: other.type_name() }),
        }
    }

    fn into_conditions(self, key: ConfigKey) -> Result<Vec<TriggerCondition>, ConfigError> {
        match self {
            ConfigValue::Conditions(v) => Ok(v),
            other => Err(ConfigError::WrongType {
                key,
                expected: "trigger condition list",
                actual: other.type_name(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Key '{key}' does not support {op} in this scope")]
    NotSupported { key: ConfigKey, op: ConfigOp },

    #[error("Key '{key}' expects a {expected} value, got {actual}")]
    WrongType {
        key: ConfigKey,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Unknown pattern '{0}'")]
    UnknownPattern(String),

    #[error("Sample rate {0} Hz out of range (1 Hz to 1 GHz)")]
    SampleRateOutOfRange(u64),

    #[error("Capture ratio {0}% out of range (max 100%)")]
    CaptureRatioOutOfRange(u64),

    #[error("Channel {channel} does not exist (device has {count} logic channels)")]
    NoSuchChannel { channel: usize, count: usize },

    #[error("Key '{0}' must be addressed to a channel group")]
    ChannelGroupRequired(ConfigKey),

    #[error("Unknown channel group '{0}'")]
    UnknownChannelGroup(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigScope {
    Device,
    ChannelGroup,
}

type Getter = fn(&DeviceContext) -> ConfigValue;
type Setter = fn(&mut DeviceContext, ConfigKey, ConfigValue) -> Result<(), ConfigError>;
type Lister = fn(ConfigScope) -> ConfigValue;

struct ConfigEntry {
    key: ConfigKey,
    scope: ConfigScope,
    get: Option<Getter>,
    set: Option<Setter>,
    list: Option<Lister>,
}

static CONFIG_TABLE: &[ConfigEntry] = &[
    ConfigEntry {
        key: ConfigKey::SampleRate,
        scope: ConfigScope::Device,
        get: Some(get_sample_rate),
        set: Some(set_sample_rate),
        list: Some(list_sample_rates),
    },
    ConfigEntry {
        key: ConfigKey::LimitSamples,
        scope: ConfigScope::Device,
        get: Some(get_limit_samples),
        set: Some(set_limit_samples),
        list: None,
    },
    ConfigEntry {
        key: ConfigKey::LimitMsec,
        scope: ConfigScope::Device,
        get: Some(get_limit_msec),
        set: Some(set_limit_msec),
        list: None,
    },
    ConfigEntry {
        key: ConfigKey::PatternMode,
        scope: ConfigScope::ChannelGroup,
        get: Some(get_pattern_mode),
        set: Some(set_pattern_mode),
        list: Some(list_pattern_modes),
    },
    ConfigEntry {
        key: ConfigKey::CaptureRatio,
        scope: ConfigScope::Device,
        get: Some(get_capture_ratio),
        set: Some(set_capture_ratio),
        list: None,
    },
    ConfigEntry {
        key: ConfigKey::Holdoff,
        scope: ConfigScope::Device,
        get: Some(get_holdoff),
        set: Some(set_holdoff),
        list: None,
    },
    ConfigEntry {
        key: ConfigKey::RepeatTrigger,
        scope: ConfigScope::Device,
        get: Some(get_repeat_trigger),
        set: Some(set_repeat_trigger),
        list: None,
    },
    ConfigEntry {
        key: ConfigKey::TriggerMatch,
        scope: ConfigScope::Device,
        get: Some(get_trigger_match),
        set: Some(set_trigger_match),
        list: Some(list_trigger_matches),
    },
    ConfigEntry {
        key: ConfigKey::DeviceOptions,
        scope: ConfigScope::Device,
        get: None,
        set: None,
        list: Some(list_device_options),
    },
];

fn entry(key: ConfigKey, op: ConfigOp) -> Result<&'static ConfigEntry, ConfigError> {
    CONFIG_TABLE
        .iter()
        .find(|e| e.key == key)
        .ok_or(ConfigError::NotSupported { key, op })
}

fn check_group(
    ctx: &DeviceContext,
    key: ConfigKey,
    scope: ConfigScope,
    group: Option<&ChannelGroup>,
) -> Result<(), ConfigError> {
    match (scope, group) {
        (ConfigScope::ChannelGroup, None) => Err(ConfigError::ChannelGroupRequired(key)),
        (ConfigScope::ChannelGroup, Some(g)) if !ctx.channel_groups().contains(g) => {
            Err(ConfigError::UnknownChannelGroup(g.name.clone()))
        }
        _ => Ok(()),
    }
}

pub fn config_get(
    ctx: &DeviceContext,
    key: ConfigKey,
    group: Option<&ChannelGroup>,
) -> Result<ConfigValue, ConfigError> {
    let e = entry(key, ConfigOp::Get)?;
    let get = e.get.ok_or(ConfigError::NotSupported { key, op: ConfigOp::Get })?;
    check_group(ctx, key, e.scope, group)?;
    Ok(get(ctx))
}

pub fn config_set(
    ctx: &mut DeviceContext,
    key: ConfigKey,
    value: ConfigValue,
    group: Option<&ChannelGroup>,
) -> Result<(), ConfigError> {
    let e = entry(key, ConfigOp::Set)?;
    let set = e.set.ok_or(ConfigError::NotSupported { key, op: ConfigOp::Set })?;
    check_group(ctx, key, e.scope, group)?;
    set(ctx, key, value)
}

/// Listing is scoped: device level keys are listed without a channel
/// group, channel group keys only with one.
pub fn config_list(
    ctx: &DeviceContext,
    key: ConfigKey,
    group: Option<&ChannelGroup>,
) -> Result<ConfigValue, ConfigError> {
    let scope = match group {
        Some(g) if !ctx.channel_groups().contains(g) => {
            return Err(ConfigError::UnknownChannelGroup(g.name.clone()))
        }
        Some(_) => ConfigScope::ChannelGroup,
        None => ConfigScope::Device,
    };
    let e = entry(key, ConfigOp::List)?;
    match e.list {
        Some(list) if e.scope == scope || key == ConfigKey::DeviceOptions => Ok(list(scope)),
        _ => Err(ConfigError::NotSupported { key, op: ConfigOp::List }),
    }
}

fn get_sample_rate(ctx: &DeviceContext) -> ConfigValue {
    ConfigValue::U64(ctx.sample_rate())
}

fn set_sample_rate(ctx: &mut DeviceContext, key: ConfigKey, v: ConfigValue) -> Result<(), ConfigError> {
    ctx.set_sample_rate(v.into_u64(key)?)
}

fn list_sample_rates(_: ConfigScope) -> ConfigValue {
    ConfigValue::Range {
        min: MIN_SAMPLE_RATE,
        max: MAX_SAMPLE_RATE,
        step: SAMPLE_RATE_STEP,
    }
}

fn get_limit_samples(ctx: &DeviceContext) -> ConfigValue {
    ConfigValue::U64(ctx.limit_samples())
}

fn set_limit_samples(ctx: &mut DeviceContext, key: ConfigKey, v: ConfigValue) -> Result<(), ConfigError> {
    ctx.set_limit_samples(v.into_u64(key)?);
    Ok(())
}

fn get_limit_msec(ctx: &DeviceContext) -> ConfigValue {
    ConfigValue::U64(ctx.limit_msec())
}

fn set_limit_msec(ctx: &mut DeviceContext, key: ConfigKey, v: ConfigValue) -> Result<(), ConfigError> {
    ctx.set_limit_msec(v.into_u64(key)?);
    Ok(())
}

fn get_pattern_mode(ctx: &DeviceContext) -> ConfigValue {
    ConfigValue::Str(ctx.pattern_mode().as_str().to_string())
}

fn set_pattern_mode(ctx: &mut DeviceContext, key: ConfigKey, v: ConfigValue) -> Result<(), ConfigError> {
    let mode: PatternMode = v.into_string(key)?.parse()?;
    ctx.set_pattern_mode(mode);
    Ok(())
}

fn list_pattern_modes(_: ConfigScope) -> ConfigValue {
    ConfigValue::StrList(PatternMode::names())
}

fn get_capture_ratio(ctx: &DeviceContext) -> ConfigValue {
    ConfigValue::U64(ctx.capture_ratio())
}

fn set_capture_ratio(ctx: &mut DeviceContext, key: ConfigKey, v: ConfigValue) -> Result<(), ConfigError> {
    ctx.set_capture_ratio(v.into_u64(key)?)
}

fn get_holdoff(ctx: &DeviceContext) -> ConfigValue {
    ConfigValue::U64(ctx.holdoff_samples())
}

fn set_holdoff(ctx: &mut DeviceContext, key: ConfigKey, v: ConfigValue) -> Result<(), ConfigError> {
    ctx.set_holdoff_samples(v.into_u64(key)?);
    Ok(())
}

fn get_repeat_trigger(ctx: &DeviceContext) -> ConfigValue {
    ConfigValue::Bool(ctx.repeat_trigger())
}

fn set_repeat_trigger(ctx: &mut DeviceContext, key: ConfigKey, v: ConfigValue) -> Result<(), ConfigError> {
    ctx.set_repeat_trigger(v.into_bool(key)?);
    Ok(())
}

fn get_trigger_match(ctx: &DeviceContext) -> ConfigValue {
    ConfigValue::Conditions(ctx.trigger().map(|t| t.conditions.clone()).unwrap_or_default())
}

fn set_trigger_match(ctx: &mut DeviceContext, key: ConfigKey, v: ConfigValue) -> Result<(), ConfigError> {
    ctx.set_trigger(Some(Trigger::new(v.into_conditions(key)?)))
}

fn list_trigger_matches(_: ConfigScope) -> ConfigValue {
    ConfigValue::MatchKinds(TriggerMatch::ALL.to_vec())
}

fn list_device_options(scope: ConfigScope) -> ConfigValue {
    ConfigValue::Keys(
        CONFIG_TABLE
            .iter()
            .filter(|e| e.scope == scope && e.key != ConfigKey::DeviceOptions)
            .map(|e| e.key)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KEYS: [ConfigKey; 9] = [
        ConfigKey::SampleRate,
        ConfigKey::LimitSamples,
        ConfigKey::LimitMsec,
        ConfigKey::PatternMode,
        ConfigKey::CaptureRatio,
        ConfigKey::Holdoff,
        ConfigKey::RepeatTrigger,
        ConfigKey::TriggerMatch,
        ConfigKey::DeviceOptions,
    ];

    fn logic_group(ctx: &DeviceContext) -> ChannelGroup {
        ctx.logic_group().cloned().unwrap()
    }

    #[test]
    fn test_table_has_every_key_once() {
        for key in ALL_KEYS {
            assert_eq!(CONFIG_TABLE.iter().filter(|e| e.key == key).count(), 1, "{key}");
        }
        assert_eq!(CONFIG_TABLE.len(), ALL_KEYS.len());
    }

    #[test]
    fn test_limit_keys_clear_each_other() {
        let mut ctx = DeviceContext::new(8);
        config_set(&mut ctx, ConfigKey::LimitSamples, ConfigValue::U64(5000), None).unwrap();
        config_set(&mut ctx, ConfigKey::LimitMsec, ConfigValue::U64(200), None).unwrap();
        assert_eq!(config_get(&ctx, ConfigKey::LimitSamples, None), Ok(ConfigValue::U64(0)));
        assert_eq!(config_get(&ctx, ConfigKey::LimitMsec, None), Ok(ConfigValue::U64(200)));

        config_set(&mut ctx, ConfigKey::LimitSamples, ConfigValue::U64(5000), None).unwrap();
        assert_eq!(config_get(&ctx, ConfigKey::LimitMsec, None), Ok(ConfigValue::U64(0)));
    }

    #[test]
    fn test_pattern_mode_requires_channel_group() {
        let mut ctx = DeviceContext::new(8);
        let err = config_set(
            &mut ctx,
            ConfigKey::PatternMode,
            ConfigValue::Str("random".into()),
            None,
        );
        assert_eq!(err, Err(ConfigError::ChannelGroupRequired(ConfigKey::PatternMode)));
        assert_eq!(ctx.pattern_mode(), PatternMode::Incremental);
        assert!(config_get(&ctx, ConfigKey::PatternMode, None).is_err());

        let group = logic_group(&ctx);
        config_set(
            &mut ctx,
            ConfigKey::PatternMode,
            ConfigValue::Str("all-high".into()),
            Some(&group),
        )
        .unwrap();
        assert_eq!(
            config_get(&ctx, ConfigKey::PatternMode, Some(&group)),
            Ok(ConfigValue::Str("all-high".into()))
        );
        assert_eq!(ctx.static_pattern(), &[0xff]);
    }

    #[test]
    fn test_unknown_pattern_is_rejected() {
        let mut ctx = DeviceContext::new(8);
        let group = logic_group(&ctx);
        let err = config_set(
            &mut ctx,
            ConfigKey::PatternMode,
            ConfigValue::Str("sawtooth".into()),
            Some(&group),
        );
        assert_eq!(err, Err(ConfigError::UnknownPattern("sawtooth".into())));
    }

    #[test]
    fn test_unknown_group_is_rejected() {
        let ctx = DeviceContext::new(8);
        let bogus = ChannelGroup { name: "Analog".into(), channels: vec![0] };
        assert_eq!(
            config_get(&ctx, ConfigKey::PatternMode, Some(&bogus)),
            Err(ConfigError::UnknownChannelGroup("Analog".into()))
        );
    }

    #[test]
    fn test_wrong_value_type() {
        let mut ctx = DeviceContext::new(8);
        let err = config_set(&mut ctx, ConfigKey::RepeatTrigger, ConfigValue::U64(1), None);
        assert!(matches!(err, Err(ConfigError::WrongType { expected: "bool", .. })));
        assert!(!ctx.repeat_trigger());
    }

    #[test]
    fn test_list_is_scoped() {
        let ctx = DeviceContext::new(8);
        let group = logic_group(&ctx);

        assert_eq!(
            config_list(&ctx, ConfigKey::SampleRate, None),
            Ok(ConfigValue::Range { min: 1, max: 1_000_000_000, step: 1 })
        );
        assert_eq!(
            config_list(&ctx, ConfigKey::TriggerMatch, None),
            Ok(ConfigValue::MatchKinds(TriggerMatch::ALL.to_vec()))
        );
        assert!(config_list(&ctx, ConfigKey::PatternMode, None).is_err());
        assert!(config_list(&ctx, ConfigKey::SampleRate, Some(&group)).is_err());

        assert_eq!(
            config_list(&ctx, ConfigKey::PatternMode, Some(&group)),
            Ok(ConfigValue::StrList(PatternMode::names()))
        );
        assert_eq!(PatternMode::names()[2], "incremental");

        assert_eq!(
            config_list(&ctx, ConfigKey::DeviceOptions, Some(&group)),
            Ok(ConfigValue::Keys(vec![ConfigKey::PatternMode]))
        );
        assert_eq!(
            config_list(&ctx, ConfigKey::DeviceOptions, None),
            Ok(ConfigValue::Keys(vec![
                ConfigKey::SampleRate,
                ConfigKey::LimitSamples,
                ConfigKey::LimitMsec,
                ConfigKey::CaptureRatio,
                ConfigKey::Holdoff,
                ConfigKey::RepeatTrigger,
                ConfigKey::TriggerMatch,
            ]))
        );
    }

    #[test]
    fn test_get_only_and_list_only_keys() {
        let mut ctx = DeviceContext::new(8);
        assert_eq!(
            config_get(&ctx, ConfigKey::DeviceOptions, None),
            Err(ConfigError::NotSupported { key: ConfigKey::DeviceOptions, op: ConfigOp::Get })
        );
        assert!(config_set(&mut ctx, ConfigKey::DeviceOptions, ConfigValue::Bool(true), None).is_err());
        assert!(config_list(&ctx, ConfigKey::Holdoff, None).is_err());
    }

    #[test]
    fn test_trigger_match_round_trip() {
        let mut ctx = DeviceContext::new(8);
        let conditions = vec![TriggerCondition::new(2, TriggerMatch::Rising)];
        config_set(
            &mut ctx,
            ConfigKey::TriggerMatch,
            ConfigValue::Conditions(conditions.clone()),
            None,
        )
        .unwrap();
        assert_eq!(
            config_get(&ctx, ConfigKey::TriggerMatch, None),
            Ok(ConfigValue::Conditions(conditions))
        );

        config_set(&mut ctx, ConfigKey::TriggerMatch, ConfigValue::Conditions(Vec::new()), None)
            .unwrap();
        assert!(ctx.trigger().is_none());
    }
}
