use cogsync_core::{ChannelLayout, MarkerCode, MarkerEvent, SignalBatch};
use crossbeam::channel::Receiver;
use ndarray::{Array2, Axis};
use tracing::{debug, error, warn};

/// Append-only recording of every drained batch, grouped by channel kind.
#[derive(Debug, Clone)]
pub struct SignalBuffer {
    signal: Array2<f64>,
    aux: Array2<f64>,
    timestamps: Vec<f64>,
    markers: Option<Vec<f64>>,
}

impl SignalBuffer {
    pub fn new(layout: &ChannelLayout) -> Self {
        Self {
            signal: Array2::zeros((layout.signal.len(), 0)),
            aux: Array2::zeros((layout.aux.len(), 0)),
            timestamps: Vec::new(),
            markers: layout.marker.map(|_| Vec::new()),
        }
    }

    fn append(&mut self, batch: &SignalBatch) -> Result<(), ndarray::ShapeError> {
        // Both matrices are checked before either grows so groups stay the same length.
        if batch.signal().nrows() != self.signal.nrows() || batch.aux().nrows() != self.aux.nrows()
        {
            return Err(ndarray::ShapeError::from_kind(
                ndarray::ErrorKind::IncompatibleShape,
            ));
        }
        self.signal.append(Axis(1), batch.signal().view())?;
        self.aux.append(Axis(1), batch.aux().view())?;
        self.timestamps.extend(batch.timestamps().iter().copied());
        if let Some(markers) = self.markers.as_mut() {
            match batch.markers() {
                Some(m) => markers.extend(m.iter().copied()),
                None => markers.extend(std::iter::repeat_n(0.0, batch.len())),
            }
        }
        Ok(())
    }

    pub fn signal(&self) -> &Array2<f64> {
        &self.signal
    }

    pub fn aux(&self) -> &Array2<f64> {
        &self.aux
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn markers(&self) -> Option<&[f64]> {
        self.markers.as_deref()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }

    /// Markers as recorded by the board, with the acquisition time of their sample.
    pub fn marker_events(&self) -> Vec<MarkerEvent> {
        let Some(markers) = &self.markers else {
            return Vec::new();
        };
        markers
            .iter()
            .zip(self.timestamps.iter())
            .filter_map(|(&value, &time)| {
                MarkerCode::from_sample(value).map(|code| MarkerEvent { code, time })
            })
            .collect()
    }
}

/// Consumer end of the acquisition queue.
pub struct StreamAggregator {
    receiver: Receiver<SignalBatch>,
    buffer: SignalBuffer,
    batches: usize,
    order_violations: usize,
    rejected: usize,
}

impl StreamAggregator {
    pub fn new(receiver: Receiver<SignalBatch>, layout: &ChannelLayout) -> Self {
        Self {
            receiver,
            buffer: SignalBuffer::new(layout),
            batches: 0,
            order_violations: 0,
            rejected: 0,
        }
    }

    /// Moves every batch queued right now into the buffer, oldest first. Never waits.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(batch) = self.receiver.try_recv() {
            self.push(batch);
            drained += 1;
        }
        if drained > 0 {
            debug!(drained, samples = self.buffer.len(), "drained acquisition queue");
        }
        drained
    }

    fn push(&mut self, batch: SignalBatch) {
        if let (Some(last), Some(first)) = (self.buffer.last_timestamp(), batch.first_timestamp()) {
            if first < last {
                self.order_violations += 1;
                warn!(last, first, "batch starts before the previous batch ended");
            }
        }
        if !batch.is_monotonic() {
            self.order_violations += 1;
            warn!(samples = batch.len(), "batch timestamps decrease");
        }
        match self.buffer.append(&batch) {
            Ok(()) => self.batches += 1,
            Err(err) => {
                self.rejected += 1;
                error!(%err, "batch shape does not match the buffer, dropped");
            }
        }
    }

    pub fn buffer(&self) -> &SignalBuffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> SignalBuffer {
        self.buffer
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn order_violations(&self) -> usize {
        self.order_violations
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use ndarray::{Array1, array};

    fn layout() -> ChannelLayout {
        ChannelLayout {
            signal: vec![0, 1],
            aux: vec![2],
            timestamp: 3,
            marker: Some(4),
        }
    }

    fn batch(start: f64, markers: [f64; 2]) -> SignalBatch {
        SignalBatch::new(
            array![[1.0, 2.0], [3.0, 4.0]],
            array![[0.1, 0.2]],
            array![start, start + 0.004],
            Some(Array1::from(markers.to_vec())),
        )
        .unwrap()
    }

    #[test]
    fn empty_queue_returns_immediately() {
        let (_tx, rx) = channel::bounded::<SignalBatch>(4);
        let mut aggregator = StreamAggregator::new(rx, &layout());
        assert_eq!(aggregator.drain(), 0);
        assert!(aggregator.buffer().is_empty());
        assert_eq!(aggregator.buffer().signal().dim(), (2, 0));
    }

    #[test]
    fn appends_in_fifo_order() {
        let (tx, rx) = channel::bounded(4);
        let mut aggregator = StreamAggregator::new(rx, &layout());
        tx.send(batch(10.0, [0.0, 1.0])).unwrap();
        tx.send(batch(10.008, [11.0, 0.0])).unwrap();
        assert_eq!(aggregator.drain(), 2);

        let buffer = aggregator.buffer();
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.signal().dim(), (2, 4));
        assert_eq!(buffer.aux().dim(), (1, 4));
        assert_eq!(buffer.timestamps()[0], 10.0);
        assert_eq!(buffer.timestamps()[2], 10.008);
        assert!(buffer.timestamps().windows(2).all(|w| w[0] < w[1]));
        let codes: Vec<u32> = buffer.marker_events().iter().map(|e| e.code.0).collect();
        assert_eq!(codes, vec![1, 11]);
        assert_eq!(aggregator.order_violations(), 0);
    }

    #[test]
    fn late_batches_are_kept_and_counted() {
        let (tx, rx) = channel::bounded(4);
        let mut aggregator = StreamAggregator::new(rx, &layout());
        tx.send(batch(20.0, [0.0, 0.0])).unwrap();
        aggregator.drain();
        tx.send(batch(19.0, [0.0, 0.0])).unwrap();
        aggregator.drain();
        assert_eq!(aggregator.buffer().len(), 4);
        assert_eq!(aggregator.order_violations(), 1);
    }

    #[test]
    fn mismatched_batch_is_rejected_whole() {
        let (tx, rx) = channel::bounded(4);
        let mut aggregator = StreamAggregator::new(rx, &layout());
        let odd = SignalBatch::new(
            Array2::zeros((3, 1)),
            Array2::zeros((1, 1)),
            array![1.0],
            None,
        )
        .unwrap();
        tx.send(odd).unwrap();
        aggregator.drain();
        assert_eq!(aggregator.rejected(), 1);
        assert!(aggregator.buffer().is_empty());
        assert_eq!(aggregator.buffer().aux().dim(), (1, 0));
    }
}
