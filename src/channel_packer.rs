use crate::device_context::{ChannelDescriptor, ChannelKind};

/// Projects raw samples onto the enabled logic channels.
///
/// Packing is dense: the k-th enabled channel in ascending index order lands
/// in bit `k % 8` of byte `k / 8`. The last byte of every packed sample is
/// masked so bits past the enabled channel count are always zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPacker {
    enabled: Vec<usize>,
    enabled_mask: Vec<u8>,
    unit_size: usize,
    partial_byte_index: usize,
    partial_byte_mask: u8,
    identity: bool,
}

impl ChannelPacker {
    /// Build the packer from the channel list as it is at acquisition start.
    pub fn new(channels: &[ChannelDescriptor]) -> Self {
        let mut enabled: Vec<usize> = channels
            .iter()
            .filter(|ch| ch.kind == ChannelKind::Logic && ch.enabled)
            .map(|ch| ch.index)
            .collect();
        enabled.sort_unstable();
        enabled.dedup();
        Self::from_enabled(enabled)
    }

    fn from_enabled(enabled: Vec<usize>) -> Self {
        let count = enabled.len();
        let unit_size = count.div_ceil(8);

        let mask_len = enabled.last().map_or(0, |last| last / 8 + 1);
        let mut enabled_mask = vec![0u8; mask_len];
        for &index in &enabled {
            enabled_mask[index / 8] |= 1 << (index % 8);
        }

        let partial_byte_mask = match count % 8 {
            0 => 0xff,
            rem => (1u8 << rem) - 1,
        };

        // Channels 0..n all enabled: the raw bytes already are the packed sample.
        let identity = enabled.iter().enumerate().all(|(k, &index)| k == index);

        Self {
            enabled,
            enabled_mask,
            unit_size,
            partial_byte_index: unit_size.saturating_sub(1),
            partial_byte_mask,
            identity,
        }
    }

    pub fn enabled_channels(&self) -> &[usize] {
        &self.enabled
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled.len()
    }

    /// Bitset of enabled channel indices, channel `n` in bit `n % 8` of byte `n / 8`.
    pub fn enabled_mask(&self) -> &[u8] {
        &self.enabled_mask
    }

    pub fn unit_size(&self) -> usize {
        self.unit_size
    }

    pub fn partial_byte_index(&self) -> usize {
        self.partial_byte_index
    }

    pub fn partial_byte_mask(&self) -> u8 {
        self.partial_byte_mask
    }

    /// Pack one raw sample, appending `unit_size` bytes to `out`.
    pub fn pack_into(&self, raw: &[u8], out: &mut Vec<u8>) {
        if self.unit_size == 0 {
            return;
        }

        let start = out.len();
        if self.identity {
            out.extend_from_slice(&raw[..self.unit_size]);
        } else {
            out.resize(start + self.unit_size, 0x00);
            let packed = &mut out[start..];
            for (k, &index) in self.enabled.iter().enumerate() {
                if (raw[index / 8] >> (index % 8)) & 1 == 1 {
                    packed[k / 8] |= 1 << (k % 8);
                }
            }
        }

        out[start + self.partial_byte_index] &= self.partial_byte_mask;
    }
}
