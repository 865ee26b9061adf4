//! Rendezvous Channel: a thin policy layer over `SegmentManager` that
//! retries the initial `open` race with a bounded sleep, exposes only
//! the four synchronization verbs plus object construction/lookup, and
//! routes failures through an injected logger.

use std::time::Duration;

use rdv_common::{Logger, Status};

use crate::error::SegmentError;
use crate::segment::SegmentManager;

/// How long [`RendezvousChannel::open`] keeps retrying before giving up.
/// The worker may not have created the segment yet by the time the
/// back-end starts attaching to it.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RendezvousChannel {
    manager: SegmentManager,
    logger: Logger,
}

impl RendezvousChannel {
    /// Creates a fresh segment (front-end side, during `instantiate`).
    pub fn create(segment_id: &str, arena_bytes: usize, logger: Logger) -> Result<Self, SegmentError> {
        let manager = SegmentManager::create(segment_id, arena_bytes)?;
        Ok(RendezvousChannel { manager, logger })
    }

    /// Attaches to a segment created by the other side, retrying with a
    /// bounded exponential backoff until it appears rather than failing
    /// on the first race.
    pub fn open(segment_id: &str, timeout: Duration, logger: Logger) -> Result<Self, SegmentError> {
        let result = rdv_common::backoff::retry_until(timeout, || SegmentManager::open(segment_id).ok());
        match result {
            Some(manager) => Ok(RendezvousChannel { manager, logger }),
            None => {
                logger.abort(format!("failed to attach to segment '{segment_id}' within {timeout:?}"));
                Err(SegmentError::NotFound(segment_id.to_string()))
            }
        }
    }

    pub fn is_operational(&self) -> bool {
        self.manager.is_operational()
    }

    pub fn segment_id(&self) -> &str {
        self.manager.segment_id()
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn construct_object<T: Copy>(&self, name: &str, value: T) -> Result<*mut T, SegmentError> {
        self.manager.construct_object(name, value).inspect_err(|e| {
            self.logger.warning(format!("constructObject('{name}') failed: {e}"));
        })
    }

    pub fn construct_vector<T: Copy>(
        &self,
        name: &str,
        n: usize,
        value: T,
    ) -> Result<Vec<*mut T>, SegmentError> {
        self.manager.construct_vector(name, n, value).inspect_err(|e| {
            self.logger.warning(format!("constructVector('{name}', {n}) failed: {e}"));
        })
    }

    pub fn find_object<T: Copy>(&self, name: &str) -> Result<*mut T, SegmentError> {
        self.manager
            .find_object(name)
            .inspect_err(|e| self.logger.warning(format!("findObject('{name}') failed: {e}")))
    }

    pub fn find_vector<T: Copy>(&self, name: &str, n: usize) -> Result<Vec<*mut T>, SegmentError> {
        self.manager
            .find_vector(name, n)
            .inspect_err(|e| self.logger.warning(format!("findVector('{name}', {n}) failed: {e}")))
    }

    /// Locates a vector by name alone, deriving its element count from the
    /// segment's directory rather than requiring the caller to already
    /// know it — the back-end declares variables by name, not by count.
    pub fn find_vector_all<T: Copy>(&self, name: &str) -> Result<Vec<*mut T>, SegmentError> {
        self.manager
            .find_vector_all(name)
            .inspect_err(|e| self.logger.warning(format!("findVector('{name}') failed: {e}")))
    }

    /// Protocol contract: a side may touch shared data only while it
    /// holds the turn, and must call the matching `wait_for…` immediately
    /// after signalling before touching shared data again. These four
    /// verbs are the only supported way to cross that boundary.
    pub fn master_wait_for_slave(&self) -> Status {
        self.to_status(self.manager.master_wait_for_slave())
    }

    pub fn master_signal_to_slave(&self) -> Status {
        self.to_status(self.manager.master_signal_to_slave())
    }

    pub fn slave_wait_for_master(&self) -> Status {
        self.to_status(self.manager.slave_wait_for_master())
    }

    pub fn slave_signal_to_master(&self) -> Status {
        self.to_status(self.manager.slave_signal_to_master())
    }

    fn to_status(&self, result: Result<(), SegmentError>) -> Status {
        match result {
            Ok(()) => Status::Ok,
            Err(e) => {
                self.logger.abort(format!("rendezvous primitive failed: {e}"));
                Status::Fatal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdv_common::Logger;
    use serial_test::serial;

    fn unique_id(tag: &str) -> String {
        format!("/rdv-test-chan-{}-{}-{}", tag, std::process::id(), fastrand::u32(..))
    }

    #[test]
    #[serial]
    fn open_retries_until_creator_appears() {
        let id = unique_id("retry");
        let id_for_thread = id.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            RendezvousChannel::create(&id_for_thread, 4096, Logger::with_default_sink("creator")).unwrap()
        });

        let opener =
            RendezvousChannel::open(&id, Duration::from_secs(2), Logger::with_default_sink("opener")).unwrap();
        assert!(opener.is_operational());
        let _creator = handle.join().unwrap();
    }

    #[test]
    #[serial]
    fn open_gives_up_after_timeout() {
        let id = unique_id("never");
        let err = RendezvousChannel::open(&id, Duration::from_millis(20), Logger::with_default_sink("x"))
            .unwrap_err();
        assert!(matches!(err, SegmentError::NotFound(_)));
    }
}
