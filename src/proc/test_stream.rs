//! Channel-backed Read/Write fakes so supervisor tests can script a
//! worker without spawning one.

use std::io::{Read, Write};
use std::sync::mpsc::{Receiver, Sender};

/// Buffers writes and ships the accumulated bytes on `flush`, one
/// message per flushed command.
pub(crate) struct ChannelWriter {
    tx: Sender<Vec<u8>>,
    buffer: Vec<u8>,
}

impl ChannelWriter {
    pub(crate) fn new(tx: Sender<Vec<u8>>) -> Self {
        Self {
            tx,
            buffer: Vec::new(),
        }
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let message = std::mem::take(&mut self.buffer);
        self.tx
            .send(message)
            .map_err(|_| std::io::Error::other("command channel closed"))
    }
}

/// Blocking reader over scripted byte chunks; EOF when the sender side
/// is dropped.
pub(crate) struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    leftover: Vec<u8>,
}

impl ChannelReader {
    pub(crate) fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            leftover: Vec::new(),
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.leftover.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.leftover = chunk,
                Err(_) => return Ok(0),
            }
        }
        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }
}
