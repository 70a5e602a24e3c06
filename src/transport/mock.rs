//! Mock transport for testing

use super::Transport;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Scripted transport: every write releases the next queued reply
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    replies: VecDeque<Vec<u8>>,
    streamed: VecDeque<Vec<u8>>,
    clears: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes already sitting in the input buffer
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().unwrap().read_buffer.extend(data);
    }

    /// Bytes that become readable after the next write
    pub fn queue_reply(&self, data: &[u8]) {
        self.inner.lock().unwrap().replies.push_back(data.to_vec());
    }

    /// Bytes a pushing device sends right after the next input flush
    pub fn queue_stream(&self, data: &[u8]) {
        self.inner.lock().unwrap().streamed.push_back(data.to_vec());
    }

    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().write_buffer.clone()
    }

    pub fn clear_written(&self) {
        self.inner.lock().unwrap().write_buffer.clear();
    }

    /// How many times the input buffer was flushed
    pub fn clears(&self) -> usize {
        self.inner.lock().unwrap().clears
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let available = inner.read_buffer.len().min(buffer.len());
        if available == 0 {
            return Err(Error::Timeout);
        }

        for item in buffer.iter_mut().take(available) {
            *item = inner.read_buffer.pop_front().unwrap();
        }

        Ok(available)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.write_buffer.extend_from_slice(data);
        if let Some(reply) = inner.replies.pop_front() {
            inner.read_buffer.extend(reply);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.read_buffer.clear();
        inner.clears += 1;
        if let Some(pushed) = inner.streamed.pop_front() {
            inner.read_buffer.extend(pushed);
        }
        Ok(())
    }
}
