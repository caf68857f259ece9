//! Command channel to the robot controller.
//!
//! The channel owns one byte-stream session and enforces the stop guarantee:
//! whatever ends the session (normal shutdown, quit, or a failed write), a
//! STOP byte is attempted before the connection is released.
//!
//! State machine:
//!
//! ```text
//! Uninitialized --connect--> Connected --send ok--> Connected
//!                            Connected --close / failed send--> Closed (terminal)
//! ```

mod endpoint;
mod retry;
mod transport;
pub mod worker;

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::command::{Command, CommandCounts};

pub use endpoint::{ControllerEndpoint, DEFAULT_CONTROLLER_ADDR};
pub use retry::RetryPolicy;
pub use transport::{LocalTransport, TcpTransport, Transport};
pub use worker::SenderWorker;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Connected,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Connected => write!(f, "connected"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Delivery statistics for one session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub peer: String,
    pub commands: CommandCounts,
    pub last_command: Option<Command>,
    pub send_failures: u64,
    /// Commands overwritten in the decoupled sender's slot before transmission.
    pub superseded: u64,
    /// Whether the final STOP went out on close.
    pub stopped_on_close: bool,
}

/// Where the loop hands each tick's command.
pub trait Dispatch {
    /// Deliver one command. An error ends the control loop.
    fn dispatch(&mut self, command: Command) -> Result<()>;

    /// Attempt STOP and release the session. Idempotent.
    fn close(&mut self);

    fn stats(&self) -> ChannelStats;

    /// Transport failure that ended the session, if any.
    fn failure(&self) -> Option<String>;
}

impl<D: Dispatch + ?Sized> Dispatch for Box<D> {
    fn dispatch(&mut self, command: Command) -> Result<()> {
        (**self).dispatch(command)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn stats(&self) -> ChannelStats {
        (**self).stats()
    }

    fn failure(&self) -> Option<String> {
        (**self).failure()
    }
}

/// Synchronous command channel over a `Transport`.
pub struct CommandChannel<T: Transport> {
    transport: Option<T>,
    state: ConnectionState,
    stats: ChannelStats,
    failure: Option<String>,
}

impl<T: Transport> CommandChannel<T> {
    pub fn new() -> Self {
        Self {
            transport: None,
            state: ConnectionState::Uninitialized,
            stats: ChannelStats::default(),
            failure: None,
        }
    }

    /// Channel over an already open transport.
    pub fn attached(transport: T) -> Self {
        let mut channel = Self::new();
        channel.adopt(transport);
        channel
    }

    /// Establish the session, retrying per `retry`.
    pub fn connect_with<F>(&mut self, retry: &RetryPolicy, connect: F) -> Result<()>
    where
        F: FnMut() -> Result<T>,
    {
        self.connect_until_cancelled(retry, || false, connect)
    }

    /// Establish the session, giving up early once `cancelled` reports true.
    pub fn connect_until_cancelled<C, F>(
        &mut self,
        retry: &RetryPolicy,
        cancelled: C,
        mut connect: F,
    ) -> Result<()>
    where
        C: Fn() -> bool,
        F: FnMut() -> Result<T>,
    {
        if self.state != ConnectionState::Uninitialized {
            return Err(anyhow!("cannot connect a {} channel", self.state));
        }
        let transport =
            retry.run_until_cancelled("controller connect", cancelled, |_| connect())?;
        self.adopt(transport);
        Ok(())
    }

    fn adopt(&mut self, transport: T) {
        self.stats.peer = transport.describe();
        log::info!("command channel connected to {}", self.stats.peer);
        self.transport = Some(transport);
        self.state = ConnectionState::Connected;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Encode and write one command.
    ///
    /// On a transport failure the session is torn down: one best-effort STOP
    /// is attempted on the same session and the channel becomes `Closed`.
    /// The failed command is not retried.
    pub fn send(&mut self, command: Command) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(anyhow!("cannot send {}: channel is {}", command, self.state));
        }
        let Some(transport) = self.transport.as_mut() else {
            return Err(anyhow!("cannot send {}: no transport", command));
        };

        match transport.write_byte(command.as_byte()) {
            Ok(()) => {
                self.stats.commands.record(command);
                self.stats.last_command = Some(command);
                log::info!(
                    "sent command {} ('{}')",
                    command,
                    command.as_byte() as char
                );
                Ok(())
            }
            Err(e) => {
                self.stats.send_failures += 1;
                log::error!(
                    "transport failure sending {} to {}: {:#}",
                    command,
                    self.stats.peer,
                    e
                );
                self.release_with_stop();
                let e = e.context(format!("command channel to {} failed", self.stats.peer));
                self.failure = Some(format!("{e:#}"));
                Err(e)
            }
        }
    }

    /// Attempt STOP, then release the session. Safe to call repeatedly.
    pub fn close(&mut self) {
        match self.state {
            ConnectionState::Connected => {
                self.release_with_stop();
                log::info!("command channel to {} closed", self.stats.peer);
            }
            ConnectionState::Uninitialized => self.state = ConnectionState::Closed,
            ConnectionState::Closed => {}
        }
    }

    fn release_with_stop(&mut self) {
        self.state = ConnectionState::Closed;
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        match transport.write_byte(Command::Stop.as_byte()) {
            Ok(()) => {
                self.stats.commands.record(Command::Stop);
                self.stats.last_command = Some(Command::Stop);
                self.stats.stopped_on_close = true;
                log::info!("sent final STOP to {}", self.stats.peer);
            }
            Err(e) => {
                log::warn!("final STOP to {} failed: {:#}", self.stats.peer, e);
            }
        }
        if let Err(e) = transport.shutdown() {
            log::warn!("{:#}", e);
        }
    }
}

impl<T: Transport> Default for CommandChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Drop for CommandChannel<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Transport> Dispatch for CommandChannel<T> {
    fn dispatch(&mut self, command: Command) -> Result<()> {
        self.send(command)
    }

    fn close(&mut self) {
        CommandChannel::close(self)
    }

    fn stats(&self) -> ChannelStats {
        self.stats.clone()
    }

    fn failure(&self) -> Option<String> {
        self.failure.clone()
    }
}

/// How to reach the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerSettings {
    pub endpoint: ControllerEndpoint,
    /// Run without a robot: commands are logged, never transmitted.
    pub local_only: bool,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    /// Transmit from a worker thread fed by a latest-command-wins slot.
    pub decoupled_send: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            endpoint: ControllerEndpoint::default(),
            local_only: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            decoupled_send: false,
        }
    }
}

/// Connect the command channel described by `settings`.
pub fn open_dispatch(
    settings: &ControllerSettings,
    retry: &RetryPolicy,
) -> Result<Box<dyn Dispatch + Send>> {
    open_dispatch_until_cancelled(settings, retry, || false)
}

/// Connect the command channel, abandoning the retries once `cancelled`
/// reports true.
pub fn open_dispatch_until_cancelled(
    settings: &ControllerSettings,
    retry: &RetryPolicy,
    cancelled: impl Fn() -> bool,
) -> Result<Box<dyn Dispatch + Send>> {
    let mut channel: CommandChannel<Box<dyn Transport>> = CommandChannel::new();
    if settings.local_only {
        log::info!("local mode: commands will not be transmitted");
        channel.connect_until_cancelled(&RetryPolicy::no_retry(), cancelled, || {
            Ok(Box::new(LocalTransport::new()) as Box<dyn Transport>)
        })?;
    } else {
        channel.connect_until_cancelled(retry, cancelled, || {
            TcpTransport::connect(
                &settings.endpoint,
                settings.connect_timeout,
                settings.write_timeout,
            )
            .map(|t| Box::new(t) as Box<dyn Transport>)
        })?;
    }

    if settings.decoupled_send {
        Ok(Box::new(SenderWorker::spawn(channel)?))
    } else {
        Ok(Box::new(channel))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Transport double that records every byte that reached the wire.
    #[derive(Clone, Default)]
    pub struct RecordingTransport {
        pub wire: Arc<Mutex<Vec<u8>>>,
        pub shutdowns: Arc<Mutex<u32>>,
        /// 1-based write numbers that fail.
        pub fail_writes: Vec<usize>,
        writes: Arc<Mutex<usize>>,
    }

    impl RecordingTransport {
        pub fn failing_on(writes: &[usize]) -> Self {
            Self {
                fail_writes: writes.to_vec(),
                ..Self::default()
            }
        }

        pub fn bytes(&self) -> Vec<u8> {
            self.wire.lock().unwrap().clone()
        }

        pub fn shutdown_count(&self) -> u32 {
            *self.shutdowns.lock().unwrap()
        }
    }

    impl Transport for RecordingTransport {
        fn describe(&self) -> String {
            "recording".to_string()
        }

        fn write_byte(&mut self, byte: u8) -> Result<()> {
            let mut writes = self.writes.lock().unwrap();
            *writes += 1;
            if self.fail_writes.contains(&*writes) {
                return Err(anyhow!("broken pipe"));
            }
            self.wire.lock().unwrap().push(byte);
            Ok(())
        }

        fn shutdown(&mut self) -> Result<()> {
            *self.shutdowns.lock().unwrap() += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingTransport;
    use super::*;

    #[test]
    fn new_channel_is_uninitialized() {
        let channel: CommandChannel<RecordingTransport> = CommandChannel::new();
        assert_eq!(channel.state(), ConnectionState::Uninitialized);
    }

    #[test]
    fn send_before_connect_is_rejected() {
        let mut channel: CommandChannel<RecordingTransport> = CommandChannel::new();
        assert!(channel.send(Command::Forward).is_err());
    }

    #[test]
    fn connect_retries_until_success() {
        let transport = RecordingTransport::default();
        let mut attempts = 0;
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            jitter: false,
        };
        let mut channel = CommandChannel::new();
        channel
            .connect_with(&retry, || {
                attempts += 1;
                if attempts < 3 {
                    Err(anyhow!("connection refused"))
                } else {
                    Ok(transport.clone())
                }
            })
            .unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(channel.state(), ConnectionState::Connected);
        assert_eq!(channel.stats().peer, "recording");
    }

    #[test]
    fn connect_gives_up_and_stays_uninitialized() {
        let mut channel: CommandChannel<RecordingTransport> = CommandChannel::new();
        let result = channel.connect_with(&RetryPolicy::no_retry(), || Err(anyhow!("refused")));
        assert!(result.is_err());
        assert_eq!(channel.state(), ConnectionState::Uninitialized);
    }

    #[test]
    fn cancelled_connect_stops_retrying() {
        let retry = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(5),
            jitter: false,
        };
        let quit = std::sync::atomic::AtomicBool::new(false);
        let mut attempts = 0;
        let mut channel: CommandChannel<RecordingTransport> = CommandChannel::new();
        let started = std::time::Instant::now();
        let result = channel.connect_until_cancelled(
            &retry,
            || quit.load(std::sync::atomic::Ordering::SeqCst),
            || {
                attempts += 1;
                quit.store(true, std::sync::atomic::Ordering::SeqCst);
                Err(anyhow!("connection refused"))
            },
        );
        assert!(format!("{:#}", result.unwrap_err()).contains("cancelled"));
        assert_eq!(attempts, 1);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(channel.state(), ConnectionState::Uninitialized);
    }

    #[test]
    fn connect_twice_is_rejected() {
        let mut channel = CommandChannel::attached(RecordingTransport::default());
        let again = channel.connect_with(&RetryPolicy::no_retry(), || {
            Ok(RecordingTransport::default())
        });
        assert!(again.is_err());
    }

    #[test]
    fn sends_encoded_bytes_in_order() {
        let transport = RecordingTransport::default();
        let mut channel = CommandChannel::attached(transport.clone());
        for command in [Command::Forward, Command::Left, Command::Right] {
            channel.send(command).unwrap();
        }
        assert_eq!(transport.bytes(), b"wad");
        assert_eq!(channel.state(), ConnectionState::Connected);
        assert_eq!(channel.stats().commands.total(), 3);
        assert_eq!(channel.stats().last_command, Some(Command::Right));
    }

    #[test]
    fn close_sends_stop_last() {
        let transport = RecordingTransport::default();
        let mut channel = CommandChannel::attached(transport.clone());
        channel.send(Command::Forward).unwrap();
        channel.close();
        assert_eq!(transport.bytes(), b"wx");
        assert_eq!(transport.shutdown_count(), 1);
        assert_eq!(channel.state(), ConnectionState::Closed);
        assert!(channel.stats().stopped_on_close);
    }

    #[test]
    fn close_is_idempotent() {
        let transport = RecordingTransport::default();
        let mut channel = CommandChannel::attached(transport.clone());
        channel.close();
        channel.close();
        assert_eq!(transport.bytes(), b"x");
        assert_eq!(transport.shutdown_count(), 1);
    }

    #[test]
    fn drop_sends_stop() {
        let transport = RecordingTransport::default();
        {
            let mut channel = CommandChannel::attached(transport.clone());
            channel.send(Command::Left).unwrap();
        }
        assert_eq!(transport.bytes(), b"ax");
    }

    #[test]
    fn failed_send_attempts_stop_and_closes() {
        let transport = RecordingTransport::failing_on(&[2]);
        let mut channel = CommandChannel::attached(transport.clone());
        channel.send(Command::Forward).unwrap();

        let err = channel.send(Command::Right).unwrap_err();
        assert!(format!("{err:#}").contains("broken pipe"));
        assert_eq!(channel.state(), ConnectionState::Closed);
        assert_eq!(transport.bytes(), b"wx");
        assert_eq!(transport.shutdown_count(), 1);
        assert_eq!(channel.stats().send_failures, 1);
        assert!(channel.failure().is_some_and(|f| f.contains("broken pipe")));

        // Closed is terminal: nothing else reaches the wire.
        assert!(channel.send(Command::Forward).is_err());
        channel.close();
        assert_eq!(transport.bytes(), b"wx");
        assert_eq!(transport.shutdown_count(), 1);
    }

    #[test]
    fn broken_session_still_releases_resources() {
        let transport = RecordingTransport::failing_on(&[1, 2]);
        let mut channel = CommandChannel::attached(transport.clone());
        assert!(channel.send(Command::Forward).is_err());
        assert!(transport.bytes().is_empty());
        assert_eq!(transport.shutdown_count(), 1);
        assert!(!channel.stats().stopped_on_close);
    }

    #[test]
    fn local_dispatch_never_needs_a_robot() {
        let settings = ControllerSettings {
            local_only: true,
            ..ControllerSettings::default()
        };
        let mut dispatch = open_dispatch(&settings, &RetryPolicy::no_retry()).unwrap();
        dispatch.dispatch(Command::Forward).unwrap();
        dispatch.close();
        let stats = dispatch.stats();
        assert_eq!(stats.peer, "local");
        assert_eq!(stats.last_command, Some(Command::Stop));
        assert!(stats.stopped_on_close);
    }
}
