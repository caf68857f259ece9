//! Decoupled sender.
//!
//! The control loop drops each command into a single slot; a worker thread
//! drains the slot and writes to the channel. A command that has not been
//! transmitted yet is replaced by a newer one (latest command wins), so a
//! stalled write never backs up perception. Closing the handle joins the
//! worker, which closes the channel and with it sends the final STOP.

use anyhow::{anyhow, Context, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use super::{ChannelStats, CommandChannel, Dispatch, Transport};
use crate::command::Command;

#[derive(Default)]
struct Slot {
    pending: Option<Command>,
    closing: bool,
    failure: Option<String>,
    stats: ChannelStats,
}

#[derive(Default)]
struct Shared {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a running sender thread.
pub struct SenderWorker {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl SenderWorker {
    /// Move a connected channel onto its own thread.
    pub fn spawn<T: Transport + 'static>(channel: CommandChannel<T>) -> Result<Self> {
        let shared = Arc::new(Shared::default());
        shared.lock().stats = channel.stats().clone();

        let worker_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("command-sender".to_string())
            .spawn(move || run_sender(channel, &worker_shared))
            .context("failed to spawn command sender thread")?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Offer a command; replaces any command still waiting in the slot.
    pub fn submit(&self, command: Command) -> Result<()> {
        let mut slot = self.shared.lock();
        if let Some(failure) = &slot.failure {
            return Err(anyhow!("command sender stopped: {}", failure));
        }
        if slot.closing {
            return Err(anyhow!("command sender is closing"));
        }
        if let Some(previous) = slot.pending.replace(command) {
            slot.stats.superseded += 1;
            log::debug!("{} superseded by {} before transmission", previous, command);
        }
        drop(slot);
        self.shared.ready.notify_one();
        Ok(())
    }

    /// Stop accepting commands and wait for the final STOP to go out.
    pub fn shutdown(&mut self) {
        self.shared.lock().closing = true;
        self.shared.ready.notify_one();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("command sender thread panicked");
            }
        }
    }
}

fn run_sender<T: Transport>(mut channel: CommandChannel<T>, shared: &Shared) {
    loop {
        let command = {
            let mut slot = shared.lock();
            while slot.pending.is_none() && !slot.closing {
                slot = shared
                    .ready
                    .wait(slot)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            match slot.pending.take() {
                Some(command) => command,
                None => break,
            }
        };

        let result = channel.send(command);
        let mut slot = shared.lock();
        let superseded = slot.stats.superseded;
        slot.stats = channel.stats().clone();
        slot.stats.superseded = superseded;
        if let Err(e) = result {
            slot.failure = Some(format!("{e:#}"));
            break;
        }
    }

    channel.close();
    let mut slot = shared.lock();
    let superseded = slot.stats.superseded;
    slot.stats = channel.stats().clone();
    slot.stats.superseded = superseded;
}

impl Dispatch for SenderWorker {
    fn dispatch(&mut self, command: Command) -> Result<()> {
        self.submit(command)
    }

    fn close(&mut self) {
        self.shutdown();
    }

    fn stats(&self) -> ChannelStats {
        self.shared.lock().stats.clone()
    }

    fn failure(&self) -> Option<String> {
        self.shared.lock().failure.clone()
    }
}

impl Drop for SenderWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::RecordingTransport;
    use std::time::{Duration, Instant};

    #[test]
    fn shutdown_ends_with_stop() {
        let transport = RecordingTransport::default();
        let mut worker = SenderWorker::spawn(CommandChannel::attached(transport.clone())).unwrap();
        worker.submit(Command::Forward).unwrap();
        worker.shutdown();

        let bytes = transport.bytes();
        assert_eq!(bytes.last(), Some(&b'x'));
        assert!(bytes.len() <= 2);
        assert!(worker.stats().stopped_on_close);
        assert_eq!(transport.shutdown_count(), 1);
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let mut worker =
            SenderWorker::spawn(CommandChannel::attached(RecordingTransport::default())).unwrap();
        worker.shutdown();
        assert!(worker.submit(Command::Left).is_err());
        worker.shutdown();
    }

    #[test]
    fn burst_keeps_only_latest_pending_command() {
        let transport = RecordingTransport::default();
        let mut worker = SenderWorker::spawn(CommandChannel::attached(transport.clone())).unwrap();
        for _ in 0..100 {
            worker.submit(Command::Left).unwrap();
        }
        worker.submit(Command::Right).unwrap();
        worker.shutdown();

        let bytes = transport.bytes();
        let stats = worker.stats();
        assert_eq!(bytes.last(), Some(&b'x'));
        assert_eq!(
            stats.commands.total() + stats.superseded,
            101 + 1,
            "every submitted command is either sent or superseded, plus the final stop"
        );
        assert!(bytes.len() <= 102);
    }

    #[test]
    fn transport_failure_is_reported_on_next_submit() {
        let transport = RecordingTransport::failing_on(&[1]);
        let mut worker = SenderWorker::spawn(CommandChannel::attached(transport.clone())).unwrap();
        worker.submit(Command::Forward).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let err = loop {
            match worker.submit(Command::Forward) {
                Err(e) => break e,
                Ok(()) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5))
                }
                Ok(()) => panic!("sender never reported the failure"),
            }
        };
        assert!(err.to_string().contains("broken pipe"));

        worker.shutdown();
        assert_eq!(transport.bytes(), b"x");
        assert_eq!(worker.stats().send_failures, 1);
    }

    #[test]
    fn failure_is_visible_without_another_submit() {
        let transport = RecordingTransport::failing_on(&[1]);
        let mut worker = SenderWorker::spawn(CommandChannel::attached(transport.clone())).unwrap();
        assert_eq!(worker.failure(), None);
        worker.submit(Command::Forward).unwrap();

        // Joining the sender guarantees the failed write has been recorded.
        worker.shutdown();
        let failure = worker.failure().expect("failure recorded");
        assert!(failure.contains("broken pipe"));
        assert_eq!(transport.bytes(), b"x");
    }
}
