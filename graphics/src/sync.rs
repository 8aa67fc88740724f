//! CPU-GPU synchronization.
//!
//! A [`SyncGate`] owns the single monotonically increasing counter the GPU
//! publishes as it finishes work. Every submission is followed by a signal
//! of the gate's current value, after which the value is advanced; anything
//! that must not be touched until that submission retires remembers the
//! signaled value and asks the gate to wait for it.
//!
//! ```text
//! submit A, signal 1 ─┐
//! submit B, signal 2 ─┼─> GPU completes 1, then 2
//! wait_until(1)  <────┘   (returns once A has executed)
//! ```

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;

/// How long a single wait may block before it is reported as a possible hang.
pub const DEFAULT_HANG_THRESHOLD: Duration = Duration::from_secs(5);

/// Proof that every submission made so far has completed.
///
/// Obtained from [`SyncGate::drain`]; it borrows the gate mutably, so no new
/// work can be signaled while it is alive. Operations that destroy or read
/// back GPU memory take it as a parameter.
#[derive(Debug)]
pub struct Drained<'g> {
    completed: u64,
    _gate: PhantomData<&'g mut SyncGate>,
}

impl Drained<'_> {
    /// Counter value observed at the end of the drain.
    pub fn completed(&self) -> u64 {
        self.completed
    }
}

/// The shared completion counter.
#[derive(Debug)]
pub struct SyncGate {
    device: Arc<GraphicsDevice>,
    /// Value the next signal will publish.
    next_value: u64,
    /// Highest completed value observed so far.
    last_completed: u64,
    hang_threshold: Duration,
}

impl SyncGate {
    /// Create a gate; the first signal publishes 1.
    pub fn new(device: Arc<GraphicsDevice>) -> Self {
        Self {
            device,
            next_value: 1,
            last_completed: 0,
            hang_threshold: DEFAULT_HANG_THRESHOLD,
        }
    }

    /// Set how long a wait blocks before a hang warning is logged.
    ///
    /// Waits keep going after the warning; only device loss ends them.
    pub fn with_hang_threshold(mut self, threshold: Duration) -> Self {
        self.hang_threshold = threshold;
        self
    }

    /// The device the gate signals on.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Value the next signal will publish.
    pub fn current_value(&self) -> u64 {
        self.next_value
    }

    /// Highest value seen completed, without querying the device.
    pub fn last_completed(&self) -> u64 {
        self.last_completed
    }

    /// Signal the current value behind the work submitted so far, then
    /// advance. Returns the signaled value: the work is done once
    /// [`completed`](Self::completed) reaches it.
    pub fn signal_after_submit(&mut self) -> Result<u64, GraphicsError> {
        let value = self.next_value;
        self.device.signal(value)?;
        self.next_value += 1;
        log::trace!("SyncGate: signaled {value}");
        Ok(value)
    }

    /// Query the highest completed value.
    ///
    /// Fails with [`GraphicsError::Validation`] if the device reports a value
    /// lower than one it reported before.
    pub fn completed(&mut self) -> Result<u64, GraphicsError> {
        let value = self.device.completed_value()?;
        self.observe(value)?;
        Ok(value)
    }

    fn observe(&mut self, value: u64) -> Result<(), GraphicsError> {
        if value < self.last_completed {
            return Err(GraphicsError::Validation(format!(
                "completion counter went backwards: {} -> {value}",
                self.last_completed
            )));
        }
        self.last_completed = value;
        Ok(())
    }

    /// Whether work signaled with `value` has completed.
    pub fn is_reached(&mut self, value: u64) -> Result<bool, GraphicsError> {
        if value <= self.last_completed {
            return Ok(true);
        }
        Ok(self.completed()? >= value)
    }

    /// Block until the counter reaches `value`.
    ///
    /// Returns immediately when it already has. Waiting for a value that was
    /// never signaled is an error, since it would block forever. Each time a
    /// wait exceeds the hang threshold a warning is logged and the wait
    /// continues.
    pub fn wait_until(&mut self, value: u64) -> Result<(), GraphicsError> {
        if value >= self.next_value {
            return Err(GraphicsError::InvalidParameter(format!(
                "waiting for {value}, but only values below {} were signaled",
                self.next_value
            )));
        }
        if self.is_reached(value)? {
            return Ok(());
        }

        let start = Instant::now();
        loop {
            if self.device.wait_for_value(value, self.hang_threshold)? {
                break;
            }
            log::warn!(
                "SyncGate: still waiting for {value} after {:.1?} (completed: {}); GPU may be hung",
                start.elapsed(),
                self.device.completed_value()?
            );
        }
        let reached = self.device.completed_value()?;
        self.observe(reached)?;
        log::trace!("SyncGate: reached {value} after {:.1?}", start.elapsed());
        Ok(())
    }

    /// Wait until all work submitted so far has completed.
    ///
    /// Signals a fresh value and waits for it, so work submitted without a
    /// signal of its own is covered too.
    pub fn drain(&mut self) -> Result<Drained<'_>, GraphicsError> {
        let value = self.signal_after_submit()?;
        self.wait_until(value)?;
        log::debug!("SyncGate: drained at {value}");
        Ok(Drained {
            completed: value,
            _gate: PhantomData,
        })
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    fn manual_gate() -> (Arc<DummyBackend>, SyncGate) {
        let backend = Arc::new(DummyBackend::manual().unwrap());
        let device = GraphicsDevice::new(backend.clone());
        (backend, SyncGate::new(device))
    }

    #[test]
    fn test_signal_values_increase() {
        let device = GraphicsDevice::dummy().unwrap();
        let mut gate = SyncGate::new(device);
        assert_eq!(gate.current_value(), 1);
        assert_eq!(gate.signal_after_submit().unwrap(), 1);
        assert_eq!(gate.signal_after_submit().unwrap(), 2);
        assert_eq!(gate.current_value(), 3);
        gate.wait_until(2).unwrap();
        assert!(gate.is_reached(1).unwrap());
    }

    #[test]
    fn test_wait_for_unsignaled_value_fails() {
        let device = GraphicsDevice::dummy().unwrap();
        let mut gate = SyncGate::new(device);
        assert!(matches!(
            gate.wait_until(1),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_is_reached_follows_release() {
        let (backend, mut gate) = manual_gate();
        let first = gate.signal_after_submit().unwrap();
        let second = gate.signal_after_submit().unwrap();
        assert!(!gate.is_reached(first).unwrap());

        backend.release_until(first);
        gate.wait_until(first).unwrap();
        assert!(gate.is_reached(first).unwrap());
        assert!(!gate.is_reached(second).unwrap());
    }

    #[test]
    fn test_wait_survives_hang_warning() {
        let (backend, gate) = manual_gate();
        let mut gate = gate.with_hang_threshold(Duration::from_millis(5));
        let value = gate.signal_after_submit().unwrap();

        let releaser = {
            let backend = Arc::clone(&backend);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(40));
                backend.release_until(value);
            })
        };
        gate.wait_until(value).unwrap();
        releaser.join().unwrap();
        assert_eq!(gate.last_completed(), value);
    }

    #[test]
    fn test_device_lost_ends_wait() {
        let (backend, mut gate) = manual_gate();
        let value = gate.signal_after_submit().unwrap();
        backend.lose_device("driver reset");
        let err = gate.wait_until(value).unwrap_err();
        assert!(err.is_device_lost());
    }

    #[test]
    fn test_drain_covers_everything() {
        let device = GraphicsDevice::dummy().unwrap();
        let mut gate = SyncGate::new(device);
        gate.signal_after_submit().unwrap();
        let drained = gate.drain().unwrap();
        assert_eq!(drained.completed(), 2);
    }
}
