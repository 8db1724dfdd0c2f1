use crate::device::{BoardDriver, unix_now};
use crate::error::DeviceError;
use cogsync_core::{ChannelLayout, MarkerCode};
use ndarray::Array2;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::f64::consts::TAU;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub sampling_rate: f64,
    pub signal_channels: usize,
    pub aux_channels: usize,
    /// Fail every read after this many successful ones.
    pub fail_after_reads: Option<usize>,
    /// Refuse to prepare, as if the board was not connected.
    pub unavailable: bool,
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 250.0,
            signal_channels: 8,
            aux_channels: 3,
            fail_after_reads: None,
            unavailable: false,
            seed: None,
        }
    }
}

#[derive(Debug)]
struct BoardState {
    prepared: bool,
    streaming: bool,
    last_timestamp: f64,
    package: u64,
    reads: usize,
    pending_markers: VecDeque<f64>,
    rng: StdRng,
}

/// In-process board with the same row layout as an 8-channel biosignal amplifier:
/// package counter, signal rows, aux rows, timestamp, marker.
///
/// Samples are generated from wall-clock time elapsed since the previous read.
/// Inserted markers are queued and written one per sample, so two markers never
/// share a sample.
#[derive(Debug)]
pub struct SyntheticBoard {
    config: SyntheticConfig,
    state: Mutex<BoardState>,
}

impl SyntheticBoard {
    pub fn new(config: SyntheticConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            state: Mutex::new(BoardState {
                prepared: false,
                streaming: false,
                last_timestamp: 0.0,
                package: 0,
                reads: 0,
                pending_markers: VecDeque::new(),
                rng,
            }),
        }
    }

    fn rows(&self) -> usize {
        self.config.signal_channels + self.config.aux_channels + 3
    }

    fn timestamp_row(&self) -> usize {
        1 + self.config.signal_channels + self.config.aux_channels
    }

    /// Reads served so far, including failed ones.
    pub fn reads(&self) -> usize {
        self.state.lock().reads
    }
}

impl Default for SyntheticBoard {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

impl BoardDriver for SyntheticBoard {
    fn prepare(&self) -> Result<(), DeviceError> {
        if self.config.unavailable {
            return Err(DeviceError::Unavailable("synthetic board is disconnected".into()));
        }
        self.state.lock().prepared = true;
        info!(
            rate = self.config.sampling_rate,
            channels = self.config.signal_channels,
            "synthetic board prepared"
        );
        Ok(())
    }

    fn start_stream(&self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if !state.prepared {
            return Err(DeviceError::Unavailable("stream started before prepare".into()));
        }
        state.streaming = true;
        state.last_timestamp = unix_now();
        Ok(())
    }

    fn read_available(&self) -> Result<Option<Array2<f64>>, DeviceError> {
        let mut state = self.state.lock();
        if !state.streaming {
            return Err(DeviceError::Stream("stream is not running".into()));
        }
        state.reads += 1;
        if let Some(limit) = self.config.fail_after_reads {
            if state.reads > limit {
                return Err(DeviceError::Stream(format!(
                    "synthetic board dropped out after {limit} reads"
                )));
            }
        }

        let period = 1.0 / self.config.sampling_rate;
        let elapsed = unix_now() - state.last_timestamp;
        let due = (elapsed / period).floor().max(0.0) as usize;
        let count = due.max(state.pending_markers.len());
        if count == 0 {
            return Ok(None);
        }

        let ts_row = self.timestamp_row();
        let mut data = Array2::<f64>::zeros((self.rows(), count));
        for i in 0..count {
            state.package = (state.package + 1) % 256;
            let t = state.last_timestamp + period;
            state.last_timestamp = t;

            data[[0, i]] = state.package as f64;
            for ch in 0..self.config.signal_channels {
                let freq = 8.0 + ch as f64;
                let noise: f64 = state.rng.random_range(-5.0..5.0);
                data[[1 + ch, i]] = 20.0 * (TAU * freq * t).sin() + noise;
            }
            for ax in 0..self.config.aux_channels {
                data[[1 + self.config.signal_channels + ax, i]] =
                    state.rng.random_range(-0.01..0.01);
            }
            data[[ts_row, i]] = t;
            data[[ts_row + 1, i]] = state.pending_markers.pop_front().unwrap_or(0.0);
        }
        debug!(samples = count, "synthetic read");
        Ok(Some(data))
    }

    fn insert_marker(&self, code: MarkerCode) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if !state.streaming {
            return Err(DeviceError::Marker(format!(
                "cannot insert marker {code} while not streaming"
            )));
        }
        state.pending_markers.push_back(code.as_f64());
        Ok(())
    }

    fn channel_layout(&self) -> ChannelLayout {
        let signal_start = 1;
        let aux_start = signal_start + self.config.signal_channels;
        let ts = self.timestamp_row();
        ChannelLayout {
            signal: (signal_start..aux_start).collect(),
            aux: (aux_start..ts).collect(),
            timestamp: ts,
            marker: Some(ts + 1),
        }
    }

    fn stop_stream(&self) -> Result<(), DeviceError> {
        self.state.lock().streaming = false;
        Ok(())
    }

    fn release(&self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.streaming = false;
        state.prepared = false;
        info!(reads = state.reads, "synthetic board released");
        Ok(())
    }
}
