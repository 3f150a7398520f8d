use std::time::Duration;

use crate::acquisition::{
    AcquisitionController, AcquisitionError, AcquisitionOptions, TickReport,
};
use crate::config::{self, ConfigError, ConfigKey, ConfigValue};
use crate::device_context::{
    ChannelDescriptor, ChannelGroup, DeviceContext, PatternMode, RunState,
    DEFAULT_NUM_LOGIC_CHANNELS,
};
use crate::session_sink::SessionSink;
use crate::soft_trigger::TriggerState;
use crate::trigger_config::Trigger;

pub const MODEL: &str = "Demo device";

/// A simulated logic analyzer that is not acquiring. All configuration
/// happens here; starting an acquisition consumes the handle.
#[derive(Debug, Clone)]
pub struct IdleDemoDevice {
    ctx: DeviceContext,
    options: AcquisitionOptions,
}

impl IdleDemoDevice {
    /// Create a device with `num_logic_channels` channels named `D0`, `D1`, ...
    pub fn open(num_logic_channels: usize) -> Self {
        log::debug!(
            "Opening {} with {} logic channels",
            MODEL,
            num_logic_channels
        );
        Self {
            ctx: DeviceContext::new(num_logic_channels),
            options: AcquisitionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AcquisitionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn model(&self) -> &'static str {
        MODEL
    }

    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    pub fn options(&self) -> &AcquisitionOptions {
        &self.options
    }

    pub fn channels(&self) -> &[ChannelDescriptor] {
        self.ctx.channels()
    }

    /// The group holding every logic channel, if the device has any.
    pub fn logic_group(&self) -> Option<ChannelGroup> {
        self.ctx.logic_group().cloned()
    }

    pub fn set_channel_enabled(&mut self, index: usize, enabled: bool) -> Result<(), ConfigError> {
        self.ctx.set_channel_enabled(index, enabled)
    }

    pub fn config_get(
        &self,
        key: ConfigKey,
        group: Option<&ChannelGroup>,
    ) -> Result<ConfigValue, ConfigError> {
        config::config_get(&self.ctx, key, group)
    }

    pub fn config_set(
        &mut self,
        key: ConfigKey,
        value: ConfigValue,
        group: Option<&ChannelGroup>,
    ) -> Result<(), ConfigError> {
        config::config_set(&mut self.ctx, key, value, group)
    }

    pub fn config_list(
        &self,
        key: ConfigKey,
        group: Option<&ChannelGroup>,
    ) -> Result<ConfigValue, ConfigError> {
        config::config_list(&self.ctx, key, group)
    }

    pub fn set_sample_rate(&mut self, hz: u64) -> Result<(), ConfigError> {
        self.ctx.set_sample_rate(hz)
    }

    pub fn set_limit_samples(&mut self, samples: u64) {
        self.ctx.set_limit_samples(samples);
    }

    pub fn set_limit_time(&mut self, limit: Duration) {
        self.ctx
            .set_limit_msec(u64::try_from(limit.as_millis()).unwrap_or(u64::MAX));
    }

    pub fn set_pattern_mode(&mut self, mode: PatternMode) {
        self.ctx.set_pattern_mode(mode);
    }

    pub fn set_capture_ratio(&mut self, percent: u64) -> Result<(), ConfigError> {
        self.ctx.set_capture_ratio(percent)
    }

    pub fn set_holdoff_samples(&mut self, samples: u64) {
        self.ctx.set_holdoff_samples(samples);
    }

    pub fn set_repeat_trigger(&mut self, repeat: bool) {
        self.ctx.set_repeat_trigger(repeat);
    }

    pub fn set_trigger(&mut self, trigger: Option<Trigger>) -> Result<(), ConfigError> {
        self.ctx.set_trigger(trigger)
    }

    /// Start acquiring into `sink`. On failure the idle device and the sink
    /// are returned untouched.
    pub fn start_acquisition<S: SessionSink>(
        self,
        sink: S,
    ) -> Result<AcquiringDemoDevice<S>, (IdleDemoDevice, S, AcquisitionError)> {
        let options = self.options;
        match AcquisitionController::start(self.ctx, sink, options) {
            Ok(controller) => Ok(AcquiringDemoDevice {
                controller,
                options,
            }),
            Err((ctx, sink, e)) => {
                log::warn!("Failed to start acquisition: {}", e);
                Err((IdleDemoDevice { ctx, options }, sink, e))
            }
        }
    }
}

impl Default for IdleDemoDevice {
    fn default() -> Self {
        Self::open(DEFAULT_NUM_LOGIC_CHANNELS)
    }
}

/// A device with an acquisition in progress. Configuration is read-only
/// until [`AcquiringDemoDevice::stop`] hands the idle device back.
pub struct AcquiringDemoDevice<S: SessionSink> {
    controller: AcquisitionController<S>,
    options: AcquisitionOptions,
}

impl<S: SessionSink> AcquiringDemoDevice<S> {
    /// Timer callback: call every [`AcquisitionOptions::tick_interval`].
    pub fn tick(&mut self) -> TickReport {
        self.controller.tick()
    }

    pub fn tick_at(&mut self, elapsed: Duration) -> TickReport {
        self.controller.tick_at(elapsed)
    }

    pub fn tick_interval(&self) -> Duration {
        self.options.tick_interval
    }

    pub fn is_finished(&self) -> bool {
        self.controller.is_finished()
    }

    pub fn run_state(&self) -> &RunState {
        self.controller.run_state()
    }

    pub fn trigger_state(&self) -> TriggerState {
        self.controller.trigger_state()
    }

    pub fn unit_size(&self) -> usize {
        self.controller.packer().unit_size()
    }

    pub fn sink(&self) -> &S {
        self.controller.sink()
    }

    pub fn config_get(
        &self,
        key: ConfigKey,
        group: Option<&ChannelGroup>,
    ) -> Result<ConfigValue, ConfigError> {
        config::config_get(self.controller.context(), key, group)
    }

    /// End the acquisition, flushing buffered samples, and return to idle.
    pub fn stop(self) -> (IdleDemoDevice, S) {
        let (ctx, sink) = self.controller.stop();
        (
            IdleDemoDevice {
                ctx,
                options: self.options,
            },
            sink,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_sink::CollectingSink;
    use crate::trigger_config::TriggerCondition;
    use crate::trigger_config::TriggerMatch;

    fn acquire(device: IdleDemoDevice) -> AcquiringDemoDevice<CollectingSink> {
        match device.start_acquisition(CollectingSink::new()) {
            Ok(running) => running,
            Err((_, _, e)) => unreachable!("start failed: {e}"),
        }
    }

    #[test]
    fn test_open_defaults() {
        let device = IdleDemoDevice::default();
        assert_eq!(device.model(), "Demo device");
        assert_eq!(device.channels().len(), 12);
        assert_eq!(
            device.config_get(ConfigKey::SampleRate, None),
            Ok(ConfigValue::U64(100_000_000))
        );
        let group = device.logic_group();
        assert_eq!(
            device.config_get(ConfigKey::PatternMode, group.as_ref()),
            Ok(ConfigValue::Str("incremental".into()))
        );
    }

    #[test]
    fn test_all_low_all_high_without_tick() {
        let mut device = IdleDemoDevice::open(16);
        let group = device.logic_group();
        device
            .config_set(ConfigKey::PatternMode, ConfigValue::Str("all-low".into()), group.as_ref())
            .unwrap();
        assert_eq!(device.context().static_pattern(), &[0x00, 0x00]);
        device
            .config_set(ConfigKey::PatternMode, ConfigValue::Str("all-high".into()), group.as_ref())
            .unwrap();
        assert_eq!(device.context().static_pattern(), &[0xff, 0xff]);
    }

    #[test]
    fn test_full_cycle_through_config() {
        let mut device = IdleDemoDevice::open(8);
        device.config_set(ConfigKey::SampleRate, ConfigValue::U64(10_000), None).unwrap();
        device.config_set(ConfigKey::LimitSamples, ConfigValue::U64(1_500), None).unwrap();
        device.set_channel_enabled(7, false).unwrap();

        let mut running = acquire(device);
        assert_eq!(running.unit_size(), 1);
        assert_eq!(
            running.config_get(ConfigKey::LimitSamples, None),
            Ok(ConfigValue::U64(1_500))
        );

        running.tick_at(Duration::from_millis(100));
        assert!(!running.is_finished());
        running.tick_at(Duration::from_millis(200));
        assert!(running.is_finished());

        let (device, sink) = running.stop();
        let capture = sink.into_capture().unwrap();
        assert_eq!(capture.sample_count(), 1_500);
        assert_eq!(capture.header.channel_names.len(), 7);
        // Incremental pattern, channel 7 masked away.
        assert_eq!(capture.data[200], 200 & 0x7f);

        // The idle device keeps its configuration and can start again.
        assert_eq!(device.context().limit_samples(), 1_500);
        let running = acquire(device);
        assert_eq!(running.run_state().generated_samples, 0);
    }

    #[test]
    fn test_stop_flushes_partial_frame() {
        let mut device = IdleDemoDevice::open(4);
        device.set_sample_rate(1_000).unwrap();
        device.set_limit_time(Duration::from_secs(10));

        let mut running = acquire(device);
        running.tick_at(Duration::from_millis(150));
        assert!(running.sink().frames().is_empty());

        let (_, sink) = running.stop();
        assert_eq!(sink.frames().len(), 1);
        assert_eq!(sink.sample_count(), 150);
        assert_eq!(sink.sessions_ended(), 1);
    }

    #[test]
    fn test_trigger_via_config_and_list() {
        let mut device = IdleDemoDevice::open(8);
        assert_eq!(
            device.config_list(ConfigKey::TriggerMatch, None),
            Ok(ConfigValue::MatchKinds(TriggerMatch::ALL.to_vec()))
        );
        device
            .config_set(
                ConfigKey::TriggerMatch,
                ConfigValue::Conditions(vec![TriggerCondition::new(3, TriggerMatch::One)]),
                None,
            )
            .unwrap();
        device.set_sample_rate(1_000_000).unwrap();
        device.set_limit_samples(10);

        let mut running = acquire(device);
        assert_eq!(running.trigger_state(), TriggerState::Armed);
        running.tick_at(Duration::from_millis(1));
        assert!(running.is_finished());
        assert_eq!(running.trigger_state(), TriggerState::Stopped);

        let (_, sink) = running.stop();
        let capture = sink.into_capture().unwrap();
        // Incremental: channel 3 is first high at sample 8.
        assert_eq!(capture.data, (8u8..18).collect::<Vec<_>>());
    }
}
