//! # Logic Demo RS
//!
//! A software-simulated logic analyzer. It generates synthetic logic channel
//! data on demand so acquisition code, triggers and data consumers can be
//! exercised without hardware.
//!
//! ## Features
//!
//! - **Pattern generation**: sigrok logo, random, incremental, walking one/zero,
//!   all-low, all-high and squid patterns
//! - **Rate pacing**: the sample count follows wall-clock time, however
//!   irregularly the timer fires
//! - **Soft triggers**: level and edge conditions on any channel with
//!   pre-trigger capture ratio, holdoff and repeated capture cycles
//! - **Dense packing**: only enabled channels are emitted, unused bits of the
//!   last byte are always zero
//! - **DataFrame output**: captures convert to a `polars` `DataFrame`
//!
//! ## Examples
//!
//! ### Timed acquisition
//!
//! ```rust
//! use logic_demo_rs::{CollectingSink, IdleDemoDevice, PatternMode};
//! use std::time::Duration;
//!
//! let mut device = IdleDemoDevice::open(8);
//! device.set_sample_rate(10_000)?;
//! device.set_limit_samples(2_000);
//! device.set_pattern_mode(PatternMode::WalkingOne);
//!
//! let mut running = device
//!     .start_acquisition(CollectingSink::new())
//!     .map_err(|(_, _, e)| e)?;
//!
//! // A host timer would call `tick()` every 100 ms instead.
//! running.tick_at(Duration::from_millis(100));
//! running.tick_at(Duration::from_millis(200));
//! assert!(running.is_finished());
//!
//! let (_device, sink) = running.stop();
//! let capture = sink.into_capture()?;
//! assert_eq!(capture.sample_count(), 2_000);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Triggered capture
//!
//! ```rust
//! use logic_demo_rs::{CollectingSink, IdleDemoDevice, PatternMode, Trigger};
//! use std::time::Duration;
//!
//! let mut device = IdleDemoDevice::open(8);
//! device.set_sample_rate(1_000_000)?;
//! device.set_limit_samples(100);
//! device.set_capture_ratio(20)?;
//! device.set_pattern_mode(PatternMode::Incremental);
//! device.set_trigger(Some(Trigger::start_capturing_when().rises(7).all_match()))?;
//!
//! let mut running = device
//!     .start_acquisition(CollectingSink::new())
//!     .map_err(|(_, _, e)| e)?;
//! running.tick_at(Duration::from_millis(1));
//!
//! let (_device, sink) = running.stop();
//! let df = sink.into_capture()?.to_dataframe()?;
//! assert_eq!(df.height(), 100);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Key based configuration
//!
//! ```rust
//! use logic_demo_rs::{ConfigKey, ConfigValue, IdleDemoDevice};
//!
//! let mut device = IdleDemoDevice::open(12);
//! device.config_set(ConfigKey::LimitSamples, ConfigValue::U64(5000), None)?;
//! device.config_set(ConfigKey::LimitMsec, ConfigValue::U64(200), None)?;
//! assert_eq!(device.config_get(ConfigKey::LimitSamples, None)?, ConfigValue::U64(0));
//!
//! // Pattern mode lives on the logic channel group.
//! let group = device.logic_group();
//! let patterns = device.config_list(ConfigKey::PatternMode, group.as_ref())?;
//! println!("Patterns: {:?}", patterns);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod acquisition;
pub mod channel_packer;
pub mod config;
pub mod demo_device;
pub mod device_context;
pub mod pattern_generator;
pub mod sample_pacer;
pub mod session_sink;
pub mod soft_trigger;
pub mod trigger_config;

// Re-export the main types for convenience
pub use trigger_config::{
    ChannelTriggerBuilder, ParseTriggerError, Trigger, TriggerCondition, TriggerMatch,
};

pub use device_context::{
    ChannelDescriptor, ChannelGroup, ChannelKind, DeviceContext, PatternMode, RunState,
};

pub use config::{ConfigError, ConfigKey, ConfigValue};

pub use session_sink::{Capture, CaptureError, CollectingSink, SessionHeader, SessionSink};

pub use soft_trigger::{TriggerMatcher, TriggerState};

pub use acquisition::{AcquisitionError, AcquisitionOptions, TickReport, TICK_INTERVAL};

pub use demo_device::{AcquiringDemoDevice, IdleDemoDevice};
