use std::collections::TryReserveError;
use std::time::{Duration, Instant};

use crate::channel_packer::ChannelPacker;
use crate::device_context::{DeviceContext, RunState};
use crate::pattern_generator::PatternGenerator;
use crate::sample_pacer::SamplePacer;
use crate::session_sink::{SessionHeader, SessionSink};
use crate::soft_trigger::{SampleDisposition, TriggerMatcher, TriggerSession, TriggerState};

/// Interval at which the host is expected to call [`AcquisitionController::tick`].
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_SAMPLES_PER_FRAME: u64 = 1000;
pub const DEFAULT_MAX_SAMPLES_PER_TICK: u64 = 1_000_000;

/// Host side tuning of the acquisition engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionOptions {
    /// Samples per submitted frame, zero submits whatever a tick produced.
    pub samples_per_frame: u64,
    /// Upper bound on samples generated in one tick.
    pub max_samples_per_tick: u64,
    pub tick_interval: Duration,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            samples_per_frame: DEFAULT_SAMPLES_PER_FRAME,
            max_samples_per_tick: DEFAULT_MAX_SAMPLES_PER_TICK,
            tick_interval: TICK_INTERVAL,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("Failed to allocate {what} buffer")]
    Resource {
        what: &'static str,
        #[source]
        source: TryReserveError,
    },
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub generated: u64,
    pub sent: u64,
    pub finished: bool,
}

/// Runs one acquisition: paces generation against elapsed time, feeds the
/// trigger, packs output samples and hands frames to the sink.
///
/// Ticks must not overlap; every call does a bounded amount of work and
/// never blocks.
pub struct AcquisitionController<S: SessionSink> {
    ctx: DeviceContext,
    sink: S,
    options: AcquisitionOptions,
    generator: PatternGenerator,
    packer: ChannelPacker,
    matcher: TriggerMatcher,
    pacer: SamplePacer,
    raw: Vec<u8>,
    packed: Vec<u8>,
    frame: Vec<u8>,
    started_at: Instant,
    finished: bool,
}

impl<S: SessionSink> AcquisitionController<S> {
    /// Set up every per-acquisition buffer, then begin the session. On
    /// failure the context and sink are handed back unchanged.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn start(
        mut ctx: DeviceContext,
        mut sink: S,
        options: AcquisitionOptions,
    ) -> Result<Self, (DeviceContext, S, AcquisitionError)> {
        let packer = ChannelPacker::new(ctx.channels());
        let unit_size = packer.unit_size();

        let session = ctx
            .trigger()
            .map(|t| TriggerSession::new(t, ctx.pre_trigger_samples(), ctx.holdoff_samples()));
        let matcher = match TriggerMatcher::new(session, unit_size) {
            Ok(m) => m,
            Err(source) => {
                let what = "pre-trigger";
                return Err((ctx, sink, AcquisitionError::Resource { what, source }));
            }
        };

        let frame_samples = match options.samples_per_frame {
            0 => options.max_samples_per_tick,
            n => n,
        };
        let frame_bytes = usize::try_from(frame_samples)
            .unwrap_or(usize::MAX)
            .saturating_mul(unit_size);
        let mut frame = Vec::new();
        if let Err(source) = frame.try_reserve_exact(frame_bytes) {
            let what = "frame";
            return Err((ctx, sink, AcquisitionError::Resource { what, source }));
        }

        let generator = PatternGenerator::new(
            ctx.pattern_mode(),
            ctx.logic_channel_count(),
            ctx.static_pattern(),
        );
        let raw = vec![0u8; generator.raw_unit_size()];
        let pacer = SamplePacer::new(ctx.sample_rate(), options.max_samples_per_tick);

        let channel_names = packer
            .enabled_channels()
            .iter()
            .filter_map(|&i| ctx.channels().get(i).map(|ch| ch.name.clone()))
            .collect();
        sink.begin_session(&SessionHeader {
            sample_rate: ctx.sample_rate(),
            channel_names,
            unit_size,
            samples_per_frame: options.samples_per_frame,
        });

        ctx.run = RunState::default();
        let mut controller = Self {
            ctx,
            sink,
            options,
            generator,
            packer,
            matcher,
            pacer,
            raw,
            packed: Vec::with_capacity(unit_size),
            frame,
            started_at: Instant::now(),
            finished: false,
        };
        controller.matcher.start();
        controller.ctx.run.trigger_fired = controller.matcher.is_fired();

        log::debug!(
            "Acquisition started: {} Hz, {} of {} channels, unit size {}, pattern {}, trigger {}",
            controller.ctx.sample_rate(),
            controller.packer.enabled_count(),
            controller.ctx.logic_channel_count(),
            unit_size,
            controller.ctx.pattern_mode(),
            controller
                .ctx
                .trigger()
                .map_or_else(|| "none".to_string(), ToString::to_string),
        );

        if controller.packer.enabled_count() == 0 {
            log::warn!("No logic channels enabled, ending acquisition without data");
            controller.finish();
        }

        Ok(controller)
    }

    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    pub fn run_state(&self) -> &RunState {
        &self.ctx.run
    }

    pub fn options(&self) -> &AcquisitionOptions {
        &self.options
    }

    pub fn packer(&self) -> &ChannelPacker {
        &self.packer
    }

    pub fn trigger_state(&self) -> TriggerState {
        self.matcher.state()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Tick using the time elapsed since the acquisition started.
    pub fn tick(&mut self) -> TickReport {
        self.tick_at(self.started_at.elapsed())
    }

    /// Tick as if `elapsed` had passed since the acquisition started.
    pub fn tick_at(&mut self, elapsed: Duration) -> TickReport {
        if self.finished {
            return TickReport {
                finished: true,
                ..TickReport::default()
            };
        }

        #[cfg(feature = "cpu-profiling")]
        let _span = tracy_client::span!("acquisition_tick");

        let elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.ctx.run.tick_sequence += 1;
        self.ctx.run.elapsed_micros = elapsed_us;

        let limit_samples = self.ctx.limit_samples();
        let limit_us = self.ctx.limit_msec().saturating_mul(1000);
        let paced_us = if limit_us > 0 {
            elapsed_us.min(limit_us)
        } else {
            elapsed_us
        };

        // Once fired every generated sample is output, so the sample limit
        // bounds generation directly.
        let remaining = (limit_samples > 0 && self.matcher.is_fired() && !self.ctx.repeat_trigger())
            .then(|| limit_samples.saturating_sub(self.ctx.run.sent_samples));
        let due = self
            .pacer
            .samples_due(paced_us, self.ctx.run.generated_samples, remaining);

        let sent_before = self.ctx.run.total_sent_samples;
        let mut generated = 0;
        while generated < due {
            self.generator.next_unit(&mut self.raw);
            self.ctx.run.generated_samples += 1;
            generated += 1;

            match self.matcher.feed(&self.raw) {
                SampleDisposition::PreTrigger => {
                    self.packed.clear();
                    self.packer.pack_into(&self.raw, &mut self.packed);
                    self.matcher.retain(&self.packed);
                }
                SampleDisposition::Trigger => {
                    log::info!(
                        "Trigger matched at sample {} ({} pre-trigger samples)",
                        self.ctx.run.generated_samples - 1,
                        self.matcher.pre_trigger_samples()
                    );
                    self.ctx.run.trigger_fired = true;
                    self.send_pre_trigger();
                    self.send_raw();
                }
                SampleDisposition::Output => self.send_raw(),
                SampleDisposition::Suppressed | SampleDisposition::Discard => {}
            }

            if limit_samples > 0 && self.ctx.run.sent_samples >= limit_samples {
                if self.ctx.repeat_trigger() {
                    self.next_cycle();
                } else {
                    log::debug!("Sample limit of {} reached", limit_samples);
                    self.finish();
                    break;
                }
            }
        }

        if !self.finished {
            if self.options.samples_per_frame == 0 {
                self.flush_frame();
            }
            if limit_us > 0
                && elapsed_us >= limit_us
                && self.ctx.run.generated_samples >= self.pacer.target(limit_us)
            {
                log::debug!("Time limit of {} ms reached", self.ctx.limit_msec());
                self.finish();
            }
        }

        let report = TickReport {
            generated,
            sent: self.ctx.run.total_sent_samples - sent_before,
            finished: self.finished,
        };
        log::trace!(
            "Tick {} at {} us: generated {}, sent {}",
            self.ctx.run.tick_sequence,
            elapsed_us,
            report.generated,
            report.sent
        );
        report
    }

    /// Flush, end the session and give back the context and sink.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn stop(mut self) -> (DeviceContext, S) {
        if !self.finished {
            log::debug!("Acquisition stopped by request");
            self.finish();
        }
        (self.ctx, self.sink)
    }

    fn limit_reached(&self) -> bool {
        let limit = self.ctx.limit_samples();
        limit > 0 && self.ctx.run.sent_samples >= limit
    }

    fn send_raw(&mut self) {
        if self.limit_reached() {
            return;
        }
        self.packer.pack_into(&self.raw, &mut self.frame);
        self.sample_sent();
    }

    fn send_pre_trigger(&mut self) {
        let unit_size = self.packer.unit_size();
        let retained: Vec<u8> = self.matcher.take_pre_trigger().collect();
        for sample in retained.chunks_exact(unit_size.max(1)) {
            if self.limit_reached() {
                break;
            }
            self.frame.extend_from_slice(sample);
            self.sample_sent();
        }
    }

    fn sample_sent(&mut self) {
        let run = &mut self.ctx.run;
        run.sent_samples += 1;
        run.total_sent_samples += 1;
        run.sent_frame_samples += 1;
        let spf = self.options.samples_per_frame;
        if spf > 0 && self.ctx.run.sent_frame_samples >= spf {
            self.flush_frame();
        }
    }

    fn flush_frame(&mut self) {
        if self.frame.is_empty() {
            return;
        }
        self.sink.submit_frame(
            &self.frame,
            self.packer.enabled_count(),
            self.packer.unit_size(),
        );
        self.frame.clear();
        self.ctx.run.frames_sent += 1;
        self.ctx.run.sent_frame_samples = 0;
    }

    fn next_cycle(&mut self) {
        self.flush_frame();
        self.ctx.run.cycles += 1;
        log::info!(
            "Capture cycle {} complete, re-arming trigger",
            self.ctx.run.cycles
        );
        self.matcher.rearm();
        self.ctx.run.sent_samples = 0;
        self.ctx.run.trigger_fired = self.matcher.is_fired();
    }

    fn finish(&mut self) {
        self.flush_frame();
        self.matcher.stop();
        self.sink.end_session();
        self.finished = true;
        log::debug!(
            "Acquisition finished: {} samples in {} frames",
            self.ctx.run.total_sent_samples,
            self.ctx.run.frames_sent
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_context::PatternMode;
    use crate::session_sink::CollectingSink;
    use crate::trigger_config::Trigger;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn context(channels: usize, rate: u64) -> DeviceContext {
        let mut ctx = DeviceContext::new(channels);
        ctx.set_sample_rate(rate).unwrap();
        ctx
    }

    fn start(ctx: DeviceContext, options: AcquisitionOptions) -> AcquisitionController<CollectingSink> {
        match AcquisitionController::start(ctx, CollectingSink::new(), options) {
            Ok(c) => c,
            Err((_, _, e)) => unreachable!("start failed: {e}"),
        }
    }

    fn unframed() -> AcquisitionOptions {
        AcquisitionOptions {
            samples_per_frame: 0,
            ..AcquisitionOptions::default()
        }
    }

    /// Every packed sample the sink received.
    fn samples(sink: &CollectingSink) -> Vec<Vec<u8>> {
        let unit = sink.header().map_or(1, |h| h.unit_size);
        sink.frames()
            .iter()
            .flat_map(|f| f.chunks(unit).map(<[u8]>::to_vec))
            .collect()
    }

    #[test]
    fn test_paced_by_elapsed_time() {
        let mut ctx = context(8, 10_000);
        ctx.set_limit_samples(0);
        let mut acq = start(ctx, unframed());

        assert_eq!(acq.tick_at(ms(100)).generated, 1_000);
        // Late tick catches up.
        assert_eq!(acq.tick_at(ms(350)).generated, 2_500);
        // Early duplicate tick produces nothing.
        assert_eq!(acq.tick_at(ms(350)).generated, 0);
        assert_eq!(acq.run_state().generated_samples, 3_500);
        assert_eq!(acq.sink().sample_count(), 3_500);
        assert_eq!(acq.run_state().tick_sequence, 3);
    }

    #[test]
    fn test_sample_limit_stops() {
        let mut ctx = context(8, 1_000_000);
        ctx.set_limit_samples(5_000);
        let mut acq = start(ctx, AcquisitionOptions::default());

        let report = acq.tick_at(ms(100));
        assert_eq!(report.sent, 5_000);
        assert!(report.finished);
        assert_eq!(acq.tick_at(ms(200)), TickReport { generated: 0, sent: 0, finished: true });

        let (ctx, sink) = acq.stop();
        assert_eq!(ctx.run_state().sent_samples, 5_000);
        assert_eq!(sink.frames().len(), 5);
        assert_eq!(sink.sessions_ended(), 1);
    }

    #[test]
    fn test_time_limit_stops() {
        let mut ctx = context(8, 1_000);
        ctx.set_limit_msec(250);
        let mut acq = start(ctx, unframed());

        assert!(!acq.tick_at(ms(100)).finished);
        let report = acq.tick_at(ms(400));
        assert!(report.finished);
        assert_eq!(acq.run_state().generated_samples, 250);
        assert_eq!(acq.sink().sample_count(), 250);
    }

    #[test]
    fn test_frames_have_fixed_size() {
        let mut ctx = context(12, 1_000_000);
        ctx.set_limit_samples(0);
        let options = AcquisitionOptions {
            samples_per_frame: 300,
            ..AcquisitionOptions::default()
        };
        let mut acq = start(ctx, options);
        acq.tick_at(Duration::from_micros(1_000));

        let sink = acq.sink();
        assert_eq!(sink.frames().len(), 3);
        assert!(sink.frames().iter().all(|f| f.len() == 600));
        assert_eq!(acq.run_state().sent_frame_samples, 100);

        let (_, sink) = acq.stop();
        assert_eq!(sink.frames().len(), 4);
        assert_eq!(sink.frames()[3].len(), 200);
        assert_eq!(sink.sample_count(), 1_000);
    }

    #[test]
    fn test_thirteen_channels_last_byte_masked() {
        let mut ctx = context(13, 1_000_000);
        ctx.set_limit_samples(2_000);
        ctx.set_pattern_mode(PatternMode::Random);
        let mut acq = start(ctx, AcquisitionOptions::default());
        acq.tick_at(ms(10));

        let (_, sink) = acq.stop();
        assert_eq!(sink.header().map(|h| h.unit_size), Some(2));
        let all = samples(&sink);
        assert_eq!(all.len(), 2_000);
        assert!(all.iter().all(|s| s[1] & 0xe0 == 0));
    }

    #[test]
    fn test_rising_trigger_gates_output() {
        // Walking one over 8 channels: channel 2 rises at samples 2, 10, 18, ...
        let mut ctx = context(8, 1_000_000);
        ctx.set_pattern_mode(PatternMode::WalkingOne);
        ctx.set_limit_samples(100);
        ctx.set_capture_ratio(20).unwrap();
        ctx.set_trigger(Some(Trigger::start_capturing_when().rises(2).all_match()))
            .unwrap();
        let mut acq = start(ctx, unframed());
        assert_eq!(acq.trigger_state(), TriggerState::Armed);

        acq.tick_at(ms(1));
        let (ctx, sink) = acq.stop();
        let all = samples(&sink);

        // Only two samples preceded the edge.
        assert_eq!(all.len(), 100);
        assert_eq!(all[0], vec![0x01]);
        assert_eq!(all[1], vec![0x02]);
        assert_eq!(all[2], vec![0x04]);
        assert!(ctx.run_state().trigger_fired);
    }

    #[test]
    fn test_pre_trigger_budget_is_bounded() {
        let mut ctx = context(8, 1_000_000);
        ctx.set_pattern_mode(PatternMode::Incremental);
        ctx.set_limit_samples(100);
        ctx.set_capture_ratio(20).unwrap();
        // Channel 7 first rises at sample 128.
        ctx.set_trigger(Some(Trigger::start_capturing_when().rises(7).all_match()))
            .unwrap();
        let mut acq = start(ctx, unframed());
        acq.tick_at(ms(1));

        let (_, sink) = acq.stop();
        let all = samples(&sink);
        assert_eq!(all.len(), 100);
        assert_eq!(all[0], vec![108]);
        assert_eq!(all[19], vec![127]);
        assert_eq!(all[20], vec![128]);
    }

    #[test]
    fn test_holdoff_drops_samples_after_match() {
        let mut ctx = context(8, 1_000_000);
        ctx.set_pattern_mode(PatternMode::Incremental);
        ctx.set_limit_samples(20);
        ctx.set_holdoff_samples(10);
        ctx.set_trigger(Some(Trigger::start_capturing_when().rises(7).all_match()))
            .unwrap();
        let mut acq = start(ctx, unframed());
        acq.tick_at(ms(1));

        let (_, sink) = acq.stop();
        let all = samples(&sink);
        assert_eq!(all.len(), 20);
        assert_eq!(all[0], vec![128]);
        // 129..=138 were held off.
        assert_eq!(all[1], vec![139]);
    }

    #[test]
    fn test_repeat_trigger_cycles_until_stop() {
        let mut ctx = context(8, 1_000_000);
        ctx.set_pattern_mode(PatternMode::WalkingOne);
        ctx.set_limit_samples(50);
        ctx.set_repeat_trigger(true);
        ctx.set_trigger(Some(Trigger::start_capturing_when().rises(0).all_match()))
            .unwrap();
        let mut acq = start(ctx, unframed());

        let report = acq.tick_at(ms(1));
        assert!(!report.finished);
        assert!(acq.run_state().cycles >= 10);
        assert!(acq.run_state().sent_samples < 50);
        assert_eq!(
            acq.run_state().total_sent_samples,
            acq.run_state().cycles * 50 + acq.run_state().sent_samples
        );

        acq.tick_at(ms(2));
        assert!(!acq.is_finished());
        let (ctx, sink) = acq.stop();
        assert_eq!(sink.sessions_ended(), 1);

        let all = samples(&sink);
        assert_eq!(all.len() as u64, ctx.run_state().total_sent_samples);
        // Cycles begin on the rising edge of channel 0: samples 8, 64, 120, ...
        assert_eq!(all[0], vec![0x01]);
        assert_eq!(all[50], vec![0x01]);
        assert_eq!(all[49], vec![0x02]);
    }

    #[test]
    fn test_repeat_without_trigger_keeps_streaming() {
        let mut ctx = context(8, 1_000);
        ctx.set_limit_samples(50);
        ctx.set_repeat_trigger(true);
        let mut acq = start(ctx, AcquisitionOptions::default());

        acq.tick_at(ms(1_000));
        assert_eq!(acq.run_state().cycles, 20);
        assert_eq!(acq.sink().sample_count(), 1_000);
        assert_eq!(acq.sink().frames().len(), 20);
    }

    #[test]
    fn test_batch_cap_bounds_a_tick() {
        let mut ctx = context(8, 1_000_000);
        ctx.set_limit_samples(0);
        let options = AcquisitionOptions {
            samples_per_frame: 0,
            max_samples_per_tick: 10_000,
            ..AcquisitionOptions::default()
        };
        let mut acq = start(ctx, options);

        assert_eq!(acq.tick_at(ms(100)).generated, 10_000);
        assert_eq!(acq.tick_at(ms(100)).generated, 10_000);
        assert_eq!(acq.run_state().generated_samples, 20_000);
    }

    #[test]
    fn test_no_enabled_channels_is_empty_acquisition() {
        let ctx = DeviceContext::new(0);
        let mut acq = start(ctx, AcquisitionOptions::default());
        assert!(acq.is_finished());
        assert!(acq.tick_at(ms(100)).finished);

        let (_, sink) = acq.stop();
        assert_eq!(sink.sessions_begun(), 1);
        assert_eq!(sink.sessions_ended(), 1);
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn test_oversized_pre_trigger_is_resource_error() {
        let mut ctx = context(64, 1_000_000);
        ctx.set_limit_samples(u64::MAX / 100);
        ctx.set_capture_ratio(100).unwrap();
        ctx.set_trigger(Some(Trigger::start_capturing_when().is_high(0).all_match()))
            .unwrap();

        match AcquisitionController::start(ctx, CollectingSink::new(), AcquisitionOptions::default()) {
            Err((ctx, sink, AcquisitionError::Resource { what, .. })) => {
                assert_eq!(what, "pre-trigger");
                assert_eq!(sink.sessions_begun(), 0);
                assert_eq!(ctx.run_state(), &RunState::default());
            }
            Ok(_) => unreachable!("start should fail"),
        }
    }
}
