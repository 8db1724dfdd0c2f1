use crate::error::LayoutError;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Fixed per-device mapping from raw matrix rows to channel groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub signal: Vec<usize>,
    pub aux: Vec<usize>,
    pub timestamp: usize,
    pub marker: Option<usize>,
}

impl ChannelLayout {
    /// Rows a raw matrix needs for every index in the layout to be valid.
    pub fn required_rows(&self) -> usize {
        self.signal
            .iter()
            .chain(self.aux.iter())
            .chain(std::iter::once(&self.timestamp))
            .chain(self.marker.iter())
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Splits a channel-major raw matrix (rows = channels, columns = samples).
    pub fn split(&self, raw: &Array2<f64>) -> Result<SignalBatch, LayoutError> {
        let rows = raw.nrows();
        if let Some(&index) = self
            .signal
            .iter()
            .chain(self.aux.iter())
            .chain(std::iter::once(&self.timestamp))
            .chain(self.marker.iter())
            .find(|&&i| i >= rows)
        {
            return Err(LayoutError::MissingRow { index, rows });
        }

        SignalBatch::new(
            raw.select(Axis(0), &self.signal),
            raw.select(Axis(0), &self.aux),
            raw.row(self.timestamp).to_owned(),
            self.marker.map(|m| raw.row(m).to_owned()),
        )
    }
}

/// Channel groups from a single acquisition poll.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalBatch {
    signal: Array2<f64>,
    aux: Array2<f64>,
    timestamps: Array1<f64>,
    markers: Option<Array1<f64>>,
}

impl SignalBatch {
    pub fn new(
        signal: Array2<f64>,
        aux: Array2<f64>,
        timestamps: Array1<f64>,
        markers: Option<Array1<f64>>,
    ) -> Result<Self, LayoutError> {
        let expected = timestamps.len();
        let check = |group: &'static str, actual: usize| {
            if actual == expected {
                Ok(())
            } else {
                Err(LayoutError::SampleCount {
                    group,
                    expected,
                    actual,
                })
            }
        };
        check("signal", signal.ncols())?;
        check("aux", aux.ncols())?;
        if let Some(markers) = &markers {
            check("markers", markers.len())?;
        }
        Ok(Self {
            signal,
            aux,
            timestamps,
            markers,
        })
    }

    pub fn signal(&self) -> &Array2<f64> {
        &self.signal
    }

    pub fn aux(&self) -> &Array2<f64> {
        &self.aux
    }

    pub fn timestamps(&self) -> &Array1<f64> {
        &self.timestamps
    }

    pub fn markers(&self) -> Option<&Array1<f64>> {
        self.markers.as_ref()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<f64> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }

    /// True when the timestamp vector never decreases.
    pub fn is_monotonic(&self) -> bool {
        self.timestamps
            .iter()
            .zip(self.timestamps.iter().skip(1))
            .all(|(a, b)| a <= b)
    }
}
