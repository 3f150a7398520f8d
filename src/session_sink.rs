use polars::prelude::*;

const SAMPLE_COLUMN_NAME: &str = "sample";
const TIME_COLUMN_NAME: &str = "time";

/// Sent once when an acquisition starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHeader {
    pub sample_rate: u64,
    /// Names of the enabled logic channels, in packed bit order.
    pub channel_names: Vec<String>,
    pub unit_size: usize,
    /// Zero when framing is disabled.
    pub samples_per_frame: u64,
}

/// Transport receiving the packets of an acquisition.
pub trait SessionSink {
    fn begin_session(&mut self, header: &SessionHeader);

    /// `data` holds whole samples of `unit_size` bytes each.
    fn submit_frame(&mut self, data: &[u8], channel_count: usize, unit_size: usize);

    fn end_session(&mut self);
}

impl<S: SessionSink + ?Sized> SessionSink for Box<S> {
    fn begin_session(&mut self, header: &SessionHeader) {
        (**self).begin_session(header);
    }

    fn submit_frame(&mut self, data: &[u8], channel_count: usize, unit_size: usize) {
        (**self).submit_frame(data, channel_count, unit_size);
    }

    fn end_session(&mut self) {
        (**self).end_session();
    }
}

/// Sink keeping every frame in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    header: Option<SessionHeader>,
    frames: Vec<Vec<u8>>,
    sessions_begun: usize,
    sessions_ended: usize,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self) -> Option<&SessionHeader> {
        self.header.as_ref()
    }

    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    pub fn sessions_begun(&self) -> usize {
        self.sessions_begun
    }

    pub fn sessions_ended(&self) -> usize {
        self.sessions_ended
    }

    /// Total samples received across all frames.
    pub fn sample_count(&self) -> usize {
        match self.header.as_ref().map(|h| h.unit_size) {
            Some(unit_size) if unit_size > 0 => {
                self.frames.iter().map(Vec::len).sum::<usize>() / unit_size
            }
            _ => 0,
        }
    }

    pub fn into_capture(self) -> Result<Capture, CaptureError> {
        let header = self.header.ok_or(CaptureError::NoSession)?;
        Ok(Capture {
            data: self.frames.concat(),
            frame_count: self.frames.len(),
            complete: self.sessions_ended > 0,
            header,
        })
    }
}

impl SessionSink for CollectingSink {
    fn begin_session(&mut self, header: &SessionHeader) {
        self.header = Some(header.clone());
        self.frames.clear();
        self.sessions_begun += 1;
    }

    fn submit_frame(&mut self, data: &[u8], _channel_count: usize, _unit_size: usize) {
        self.frames.push(data.to_vec());
    }

    fn end_session(&mut self) {
        self.sessions_ended += 1;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("No acquisition session was received")]
    NoSession,

    #[error("Failure to build capture data frame")]
    DataFrame(#[from] PolarsError),
}

/// The packed samples of one finished acquisition.
#[derive(Debug, Clone)]
pub struct Capture {
    pub header: SessionHeader,
    pub data: Vec<u8>,
    pub frame_count: usize,
    /// Whether the session was ended by the device.
    pub complete: bool,
}

impl Capture {
    pub fn sample_count(&self) -> usize {
        if self.header.unit_size == 0 {
            return 0;
        }
        self.data.len() / self.header.unit_size
    }

    pub fn samples(&self) -> impl Iterator<Item = &[u8]> {
        // chunks_exact panics on a zero size.
        self.data.chunks_exact(self.header.unit_size.max(1))
    }

    /// Level of the k-th enabled channel in every sample.
    pub fn channel_levels(&self, k: usize) -> Vec<bool> {
        self.samples()
            .map(|s| (s[k / 8] >> (k % 8)) & 1 == 1)
            .collect()
    }

    /// One row per sample: index, time in seconds and one boolean column per
    /// enabled channel.
    pub fn to_dataframe(&self) -> Result<DataFrame, CaptureError> {
        #[cfg(feature = "cpu-profiling")]
        let _span = tracy_client::span!("capture_to_dataframe");

        let columns: Vec<Column> = self
            .header
            .channel_names
            .iter()
            .enumerate()
            .map(|(k, name)| Series::new(name.as_str().into(), self.channel_levels(k)).into())
            .collect();

        let mut selection = vec![col(SAMPLE_COLUMN_NAME), col(TIME_COLUMN_NAME)];
        selection.extend(self.header.channel_names.iter().map(|n| col(n.as_str())));

        let seconds_per_sample = 1.0 / self.header.sample_rate as f64;
        let df = DataFrame::new(columns)?
            .lazy()
            .with_row_index(SAMPLE_COLUMN_NAME, Some(0))
            .with_column(
                (col(SAMPLE_COLUMN_NAME).cast(DataType::Float64) * lit(seconds_per_sample))
                    .alias(TIME_COLUMN_NAME),
            )
            .select(selection)
            .collect()?;

        Ok(df)
    }
}
