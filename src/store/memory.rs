//! In-memory store for testing

use std::sync::{Arc, Mutex};

use super::{ImuRecord, OutputRecord, RecordStore};
use crate::error::{Error, Result};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    outputs: Vec<OutputRecord>,
    imu: Vec<ImuRecord>,
    failing: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_output(&self, record: OutputRecord) {
        self.inner.lock().unwrap().outputs.push(record);
    }

    /// Every call fails with a store error while set
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().unwrap().failing = failing;
    }

    pub fn published(&self) -> Vec<ImuRecord> {
        self.inner.lock().unwrap().imu.clone()
    }

    fn check(&self) -> Result<()> {
        if self.inner.lock().unwrap().failing {
            return Err(Error::Store("connection refused".to_string()));
        }
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn latest_output(&self) -> Result<Option<OutputRecord>> {
        self.check()?;
        Ok(self.inner.lock().unwrap().outputs.last().cloned())
    }

    fn list_outputs(&self) -> Result<Vec<OutputRecord>> {
        self.check()?;
        Ok(self.inner.lock().unwrap().outputs.clone())
    }

    fn publish_imu(&self, record: &ImuRecord) -> Result<()> {
        self.check()?;
        self.inner.lock().unwrap().imu.push(*record);
        Ok(())
    }
}
