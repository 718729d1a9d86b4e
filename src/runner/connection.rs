//! Control-channel transports.
//!
//! - `Pipe`: in-process duplex channel for an embedding controller
//! - `LineConnection`: JSON lines over any async byte stream (stdin/stdout)

use crate::core::{Error, Result};
use crate::runner::command::{Command, Reply};
use crate::server::protocol::write_message;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, BufReader, Stdin, Stdout};
use tokio::sync::mpsc;

/// Runner side of a control channel.
#[async_trait]
pub trait Connection: Send {
    /// Block until the next command arrives. `ChannelClosed` once the peer
    /// has gone away.
    async fn recv(&mut self) -> Result<Command>;

    /// Send a reply to the peer.
    async fn send(&mut self, reply: Reply) -> Result<()>;
}

/// One end of an in-process duplex channel.
#[derive(Debug)]
pub struct Pipe<Out, In> {
    tx: mpsc::UnboundedSender<Out>,
    rx: mpsc::UnboundedReceiver<In>,
}

/// Create a connected pair: `(controller, runner)`.
pub fn pipe() -> (Pipe<Command, Reply>, Pipe<Reply, Command>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    (
        Pipe {
            tx: command_tx,
            rx: reply_rx,
        },
        Pipe {
            tx: reply_tx,
            rx: command_rx,
        },
    )
}

impl<Out, In> Pipe<Out, In> {
    /// Send a frame to the other end.
    pub fn send_frame(&self, frame: Out) -> Result<()> {
        self.tx.send(frame).map_err(|_| Error::ChannelClosed)
    }

    /// Receive the next frame from the other end.
    pub async fn recv_frame(&mut self) -> Result<In> {
        self.rx.recv().await.ok_or(Error::ChannelClosed)
    }
}

#[async_trait]
impl Connection for Pipe<Reply, Command> {
    async fn recv(&mut self) -> Result<Command> {
        self.recv_frame().await
    }

    async fn send(&mut self, reply: Reply) -> Result<()> {
        self.send_frame(reply)
    }
}

/// Commands as JSON lines on `reader`, replies as JSON lines on `writer`.
pub struct LineConnection<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> LineConnection<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl LineConnection<BufReader<Stdin>, Stdout> {
    /// Read commands from stdin, answer on stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

#[async_trait]
impl<R, W> Connection for LineConnection<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Command> {
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(Error::ChannelClosed);
            }
            let raw = line.trim();
            if raw.is_empty() {
                continue;
            }
            return Ok(serde_json::from_str(raw)?);
        }
    }

    async fn send(&mut self, reply: Reply) -> Result<()> {
        write_message(&mut self.writer, &reply).await
    }
}
