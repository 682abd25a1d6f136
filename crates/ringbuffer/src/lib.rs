// Interleaved PCM ring buffer between a decode thread and an output callback

use parking_lot::Mutex;
use std::sync::Arc;

/// Fixed-capacity FIFO of interleaved f32 samples
pub struct SampleRing {
    buffer: Vec<f32>,
    head: usize,
    len: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Append as many samples as fit; returns how many were taken
    pub fn push(&mut self, data: &[f32]) -> usize {
        let count = data.len().min(self.free());
        let capacity = self.capacity();
        let tail = (self.head + self.len) % capacity;

        let first = count.min(capacity - tail);
        self.buffer[tail..tail + first].copy_from_slice(&data[..first]);
        self.buffer[..count - first].copy_from_slice(&data[first..count]);

        self.len += count;
        count
    }

    /// Fill `output` from the front; returns how many samples were written
    pub fn pop(&mut self, output: &mut [f32]) -> usize {
        let count = output.len().min(self.len);
        let capacity = self.capacity();

        let first = count.min(capacity - self.head);
        output[..first].copy_from_slice(&self.buffer[self.head..self.head + first]);
        output[first..count].copy_from_slice(&self.buffer[..count - first]);

        self.head = (self.head + count) % capacity;
        self.len -= count;
        count
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

/// Thread-safe handle to a `SampleRing`
#[derive(Clone)]
pub struct SharedRing {
    inner: Arc<Mutex<SampleRing>>,
}

impl SharedRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SampleRing::new(capacity))),
        }
    }

    pub fn push(&self, data: &[f32]) -> usize {
        self.inner.lock().push(data)
    }

    pub fn pop(&self, output: &mut [f32]) -> usize {
        self.inner.lock().pop(output)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear()
    }
}
