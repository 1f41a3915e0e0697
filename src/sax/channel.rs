//! Event Channel
//!
//! Bounded FIFO of record batches between the scanning thread and the
//! dispatching thread. One mutex guards the pending queue and the free list;
//! the producer waits on one condition variable, the consumer on the other.
//!
//! The producer blocks once `high_water` batches are pending and resumes
//! when the consumer has drained the queue down to `low_water`. Consumed
//! batches are cleared and returned to the free list, so in steady state no
//! batch is allocated or freed.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use super::events::EventRecord;

/// A group of records moved through the channel as a unit
pub type Batch = Vec<EventRecord>;

/// Notified when the producer blocks on, or resumes from, a full channel
pub trait ChannelObserver: Send + Sync {
    fn producer_blocked(&self, pending: usize);
    fn producer_resumed(&self, pending: usize);
}

#[derive(Default)]
struct ChannelState {
    pending: VecDeque<Batch>,
    free: Vec<Batch>,
    producer_done: bool,
    consumer_gone: bool,
    allocated: usize,
}

pub struct EventChannel {
    state: Mutex<ChannelState>,
    /// Signalled when a batch is pending or the producer is done
    consume_resume: Condvar,
    /// Signalled when the queue drained to the low water mark
    produce_resume: Condvar,
    batch_capacity: usize,
    high_water: usize,
    low_water: usize,
    observer: Option<Arc<dyn ChannelObserver>>,
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("batch_capacity", &self.batch_capacity)
            .field("high_water", &self.high_water)
            .field("low_water", &self.low_water)
            .field("pending", &self.pending_len())
            .finish()
    }
}

impl EventChannel {
    /// Water marks are normalised so that `low_water < high_water`.
    pub fn new(batch_capacity: usize, high_water: usize, low_water: usize) -> Self {
        let high_water = high_water.max(1);
        EventChannel {
            state: Mutex::new(ChannelState::default()),
            consume_resume: Condvar::new(),
            produce_resume: Condvar::new(),
            batch_capacity: batch_capacity.max(1),
            high_water,
            low_water: low_water.min(high_water - 1),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ChannelObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    #[inline]
    pub fn batch_capacity(&self) -> usize {
        self.batch_capacity
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// An empty batch, from the free list when one is available
    pub fn take_batch(&self) -> Batch {
        let mut state = self.lock();
        match state.free.pop() {
            Some(batch) => batch,
            None => {
                state.allocated += 1;
                Vec::with_capacity(self.batch_capacity)
            }
        }
    }

    /// Enqueue a batch, blocking while the channel is above its high water
    /// mark. Returns false if the consumer has gone away.
    pub fn produce(&self, batch: Batch) -> bool {
        let mut state = self.lock();
        if state.consumer_gone {
            return false;
        }

        if state.pending.len() >= self.high_water {
            self.blocked(state.pending.len());
            while state.pending.len() > self.low_water && !state.consumer_gone {
                state = self
                    .produce_resume
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if state.consumer_gone {
                return false;
            }
            self.resumed(state.pending.len());
        }

        state.pending.push_back(batch);
        drop(state);
        self.consume_resume.notify_one();
        true
    }

    /// Next batch in FIFO order. Returns None once the producer is done and
    /// the queue is drained.
    pub fn consume(&self) -> Option<Batch> {
        let mut state = self.lock();
        loop {
            if let Some(batch) = state.pending.pop_front() {
                let wake = state.pending.len() <= self.low_water;
                drop(state);
                if wake {
                    self.produce_resume.notify_one();
                }
                return Some(batch);
            }
            if state.producer_done {
                return None;
            }
            state = self
                .consume_resume
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Return a consumed batch to the free list
    pub fn recycle(&self, mut batch: Batch) {
        batch.clear();
        self.lock().free.push(batch);
    }

    /// The producer will send nothing more
    pub fn close(&self) {
        self.lock().producer_done = true;
        self.consume_resume.notify_all();
    }

    /// The consumer will take nothing more; a blocked producer is released
    pub fn abandon(&self) {
        self.lock().consumer_gone = true;
        self.produce_resume.notify_all();
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn free_len(&self) -> usize {
        self.lock().free.len()
    }

    /// Batches allocated over the channel's lifetime
    pub fn allocated(&self) -> usize {
        self.lock().allocated
    }

    fn blocked(&self, pending: usize) {
        match &self.observer {
            Some(observer) => observer.producer_blocked(pending),
            None => log::trace!("event producer blocked with {} batches pending", pending),
        }
    }

    fn resumed(&self, pending: usize) {
        match &self.observer {
            Some(observer) => observer.producer_resumed(pending),
            None => log::trace!("event producer resumed with {} batches pending", pending),
        }
    }
}

/// Closes the channel when dropped, including while unwinding
pub struct CloseOnDrop<'a>(pub &'a EventChannel);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Abandons the channel when dropped, including while unwinding
pub struct AbandonOnDrop<'a>(pub &'a EventChannel);

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        self.0.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::position::TextPosition;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum Transition {
        Blocked(usize),
        Resumed(usize),
    }

    struct Recorder(mpsc::Sender<Transition>);

    impl ChannelObserver for Recorder {
        fn producer_blocked(&self, pending: usize) {
            let _ = self.0.send(Transition::Blocked(pending));
        }

        fn producer_resumed(&self, pending: usize) {
            let _ = self.0.send(Transition::Resumed(pending));
        }
    }

    fn batch_of(channel: &EventChannel, index: usize) -> Batch {
        let mut batch = channel.take_batch();
        batch.push(EventRecord::Characters {
            text: index.to_string(),
            at: TextPosition::START,
        });
        batch
    }

    fn text_of(batch: &Batch) -> String {
        match &batch[0] {
            EventRecord::Characters { text, .. } => text.clone(),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_fifo_and_close() {
        let channel = EventChannel::new(4, 8, 4);
        for i in 0..3 {
            assert!(channel.produce(batch_of(&channel, i)));
        }
        channel.close();

        let mut seen = Vec::new();
        while let Some(batch) = channel.consume() {
            seen.push(text_of(&batch));
            channel.recycle(batch);
        }
        assert_eq!(seen, vec!["0", "1", "2"]);
        assert_eq!(channel.free_len(), 3);
    }

    #[test]
    fn test_batches_are_reused() {
        let channel = EventChannel::new(4, 8, 4);
        for i in 0..10 {
            assert!(channel.produce(batch_of(&channel, i)));
            let batch = channel.consume().unwrap();
            channel.recycle(batch);
        }
        assert_eq!(channel.allocated(), 1);
    }

    #[test]
    fn test_backpressure_transitions() {
        let (tx, rx) = mpsc::channel();
        let channel = Arc::new(EventChannel::new(4, 8, 4).with_observer(Arc::new(Recorder(tx))));

        let producer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                for i in 0..12 {
                    assert!(channel.produce(batch_of(&channel, i)));
                }
                channel.close();
            })
        };

        let first = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(first, Transition::Blocked(8));
        assert_eq!(channel.pending_len(), 8);

        let mut seen = Vec::new();
        for _ in 0..4 {
            let batch = channel.consume().unwrap();
            seen.push(text_of(&batch));
            channel.recycle(batch);
        }
        let second = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(second, Transition::Resumed(4));

        while let Some(batch) = channel.consume() {
            seen.push(text_of(&batch));
            channel.recycle(batch);
        }
        producer.join().unwrap();

        let expected: Vec<String> = (0..12).map(|i| i.to_string()).collect();
        assert_eq!(seen, expected);
        assert!(rx.try_iter().all(|t| !matches!(t, Transition::Blocked(_))));
    }

    #[test]
    fn test_abandon_releases_producer() {
        let channel = Arc::new(EventChannel::new(1, 1, 0));
        assert!(channel.produce(batch_of(&channel, 0)));

        let producer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.produce(batch_of(&channel, 1)))
        };
        thread::sleep(Duration::from_millis(20));
        channel.abandon();
        assert!(!producer.join().unwrap());
    }

    #[test]
    fn test_water_marks_normalised() {
        let channel = EventChannel::new(0, 0, 10);
        assert_eq!(channel.high_water, 1);
        assert_eq!(channel.low_water, 0);
        assert_eq!(channel.batch_capacity(), 1);
    }
}
