//! Lock-free SPSC frame queue between one channel's capture thread and the
//! other channel's render thread.
//!
//! Both ends are wait-free. When the queue is full the frame being pushed is
//! dropped and counted; frames already queued are never evicted, so delivery
//! stays FIFO.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::frame::AudioFrame;

/// Counters shared by both halves of a queue.
#[derive(Debug, Default)]
pub struct QueueStats {
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl QueueStats {
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Capture-side half.
pub struct FrameSender {
    inner: HeapProd<AudioFrame>,
    stats: Arc<QueueStats>,
}

/// Render-side half.
pub struct FrameReceiver {
    inner: HeapCons<AudioFrame>,
    stats: Arc<QueueStats>,
}

/// Create a queue holding at most `capacity` frames.
pub fn frame_queue(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (prod, cons) = HeapRb::<AudioFrame>::new(capacity).split();
    let stats = Arc::new(QueueStats::default());
    (
        FrameSender {
            inner: prod,
            stats: stats.clone(),
        },
        FrameReceiver { inner: cons, stats },
    )
}

impl FrameSender {
    /// Never blocks. Returns `false` if the frame was dropped.
    #[inline]
    pub fn push(&mut self, frame: AudioFrame) -> bool {
        match self.inner.try_push(frame) {
            Ok(()) => {
                self.stats.pushed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_rejected) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        self.stats.clone()
    }
}

impl FrameReceiver {
    /// Never blocks. `None` means the render side must substitute silence.
    #[inline]
    pub fn pop(&mut self) -> Option<AudioFrame> {
        self.inner.try_pop()
    }

    pub fn len(&self) -> usize {
        self.inner.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(tag: u64) -> AudioFrame {
        AudioFrame::new(vec![tag as f32], Duration::from_millis(tag))
    }

    #[test]
    fn overflow_drops_newest_and_keeps_order() {
        let (mut tx, mut rx) = frame_queue(5);
        let accepted: Vec<bool> = (0..8).map(|i| tx.push(frame(i))).collect();

        assert_eq!(accepted, vec![true, true, true, true, true, false, false, false]);
        assert_eq!(tx.stats().dropped(), 3);
        assert_eq!(tx.stats().pushed(), 5);

        let seen: Vec<u64> = std::iter::from_fn(|| rx.pop())
            .map(|f| f.captured_at.as_millis() as u64)
            .collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn empty_queue_pops_none() {
        let (_tx, mut rx) = frame_queue(2);
        assert!(rx.pop().is_none());
        assert!(rx.is_empty());
    }

    #[test]
    fn draining_frees_space() {
        let (mut tx, mut rx) = frame_queue(1);
        assert!(tx.push(frame(1)));
        assert!(!tx.push(frame(2)));
        assert_eq!(rx.pop().unwrap().samples, vec![1.0]);
        assert!(tx.push(frame(3)));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn works_across_threads() {
        let (mut tx, mut rx) = frame_queue(64);
        let producer = std::thread::spawn(move || {
            for i in 0..64 {
                assert!(tx.push(frame(i)));
            }
        });
        producer.join().unwrap();
        let mut expected = 0;
        while let Some(f) = rx.pop() {
            assert_eq!(f.samples[0], expected as f32);
            expected += 1;
        }
        assert_eq!(expected, 64);
    }
}
