use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use super::endpoint::ControllerEndpoint;
use crate::command::Command;

/// Byte-stream session to the robot controller.
///
/// Ordered and reliable; one command byte per write, no framing.
pub trait Transport: Send {
    /// Peer description for logs.
    fn describe(&self) -> String;

    /// Write one command byte and flush it.
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Release the underlying connection.
    fn shutdown(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        (**self).write_byte(byte)
    }

    fn shutdown(&mut self) -> Result<()> {
        (**self).shutdown()
    }
}

/// Plain TCP session with bounded connect and write times.
pub struct TcpTransport {
    stream: TcpStream,
    peer: String,
}

impl TcpTransport {
    pub fn connect(
        endpoint: &ControllerEndpoint,
        connect_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self> {
        let mut last_err = None;
        for addr in endpoint.resolve()? {
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(stream) => {
                    stream
                        .set_write_timeout(Some(write_timeout))
                        .context("failed to set controller write timeout")?;
                    stream
                        .set_nodelay(true)
                        .context("failed to disable Nagle on controller socket")?;
                    return Ok(Self {
                        stream,
                        peer: addr.to_string(),
                    });
                }
                Err(e) => last_err = Some(anyhow!("{}: {}", addr, e)),
            }
        }
        Err(last_err
            .unwrap_or_else(|| anyhow!("no addresses for {}", endpoint))
            .context(format!("failed to connect to controller {}", endpoint)))
    }
}

impl Transport for TcpTransport {
    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.stream
            .write_all(&[byte])
            .and_then(|_| self.stream.flush())
            .with_context(|| format!("write to {} failed", self.peer))
    }

    fn shutdown(&mut self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(anyhow!("shutdown of {} failed: {}", self.peer, e)),
        }
    }
}

/// Robot-less session: commands are logged and counted, nothing is sent.
#[derive(Debug, Default)]
pub struct LocalTransport {
    written: Vec<u8>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }
}

impl Transport for LocalTransport {
    fn describe(&self) -> String {
        "local".to_string()
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        let command = Command::from_byte(byte)?;
        log::debug!("local mode: {} not transmitted", command);
        self.written.push(byte);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}
