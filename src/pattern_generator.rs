use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::device_context::PatternMode;

/// "sigrok" in a 5x8 font, one byte per column, a blank column between letters.
const PATTERN_SIGROK: [u8; 64] = [
    0x4c, 0x92, 0x92, 0x92, 0x64, 0x00, 0x00, 0x00, // s
    0x82, 0xfe, 0xfe, 0x82, 0x00, 0x00, 0x00, 0x00, // i
    0x7c, 0x82, 0x82, 0x92, 0x74, 0x00, 0x00, 0x00, // g
    0xfe, 0x12, 0x12, 0x32, 0xcc, 0x00, 0x00, 0x00, // r
    0x7c, 0x82, 0x82, 0x82, 0x7c, 0x00, 0x00, 0x00, // o
    0xfe, 0x10, 0x28, 0x44, 0x82, 0x00, 0x00, 0x00, // k
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xbe, 0xbe, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // !
];

/// 16x16 squid bitmap, one row per channel, MSB is the leftmost pixel.
/// Each sample scans one pixel column, so the picture shows up when the
/// channels are stacked in a waveform view.
const PATTERN_SQUID: [u16; 16] = [
    0x03c0, 0x0ff0, 0x1ff8, 0x3dbc, 0x3dbc, 0x3ffc, 0x1ff8, 0x0ff0, 0x0a50, 0x1248, 0x1428,
    0x2424, 0x2814, 0x4812, 0x500a, 0x9009,
];
const SQUID_WIDTH: u64 = 16;

/// Produces raw samples covering every modeled logic channel, bit `n` of
/// byte `n / 8` holding channel `n`.
#[derive(Debug)]
pub struct PatternGenerator {
    mode: PatternMode,
    channel_count: usize,
    raw_unit_size: usize,
    step: u64,
    static_pattern: Vec<u8>,
    rng: StdRng,
}

impl PatternGenerator {
    /// `static_pattern` is the device's precomputed all-low/all-high buffer.
    pub fn new(mode: PatternMode, channel_count: usize, static_pattern: &[u8]) -> Self {
        let raw_unit_size = channel_count.div_ceil(8);
        let mut pattern = static_pattern.to_vec();
        pattern.resize(raw_unit_size, 0x00);

        Self {
            mode,
            channel_count,
            raw_unit_size,
            step: 0,
            static_pattern: pattern,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn mode(&self) -> PatternMode {
        self.mode
    }

    pub fn raw_unit_size(&self) -> usize {
        self.raw_unit_size
    }

    /// Samples generated so far.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Write the next sample into `out`, which must hold `raw_unit_size` bytes.
    pub fn next_unit(&mut self, out: &mut [u8]) {
        let out = &mut out[..self.raw_unit_size];
        let step = self.step;

        match self.mode {
            PatternMode::Sigrok => {
                let column = PATTERN_SIGROK[(step % PATTERN_SIGROK.len() as u64) as usize];
                out.fill(column);
            }
            PatternMode::Random => self.rng.fill(out),
            PatternMode::Incremental => {
                out.fill(0x00);
                for (dst, src) in out.iter_mut().zip(step.to_le_bytes()) {
                    *dst = src;
                }
            }
            PatternMode::WalkingOne => {
                out.fill(0x00);
                if let Some(bit) = self.walking_bit(step) {
                    out[bit / 8] |= 1 << (bit % 8);
                }
            }
            PatternMode::WalkingZero => {
                out.fill(0xff);
                if let Some(bit) = self.walking_bit(step) {
                    out[bit / 8] &= !(1 << (bit % 8));
                }
            }
            PatternMode::AllLow | PatternMode::AllHigh => out.copy_from_slice(&self.static_pattern),
            PatternMode::Squid => {
                out.fill(0x00);
                let shift = SQUID_WIDTH - 1 - step % SQUID_WIDTH;
                for channel in 0..self.channel_count {
                    let row = PATTERN_SQUID[channel % PATTERN_SQUID.len()];
                    if (row >> shift) & 1 == 1 {
                        out[channel / 8] |= 1 << (channel % 8);
                    }
                }
            }
        }

        self.step += 1;
    }

    fn walking_bit(&self, step: u64) -> Option<usize> {
        if self.channel_count == 0 {
            return None;
        }
        Some((step % self.channel_count as u64) as usize)
    }
}
