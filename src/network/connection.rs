//! Connection Handler
//!
//! Reads newline-terminated statements, executes them strictly in order,
//! and writes one JSON line per statement. Blank lines are skipped; a
//! line longer than `maxLineBytes` gets one error line and the
//! connection closes.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::db::Database;
use crate::error::{LodeError, Result};
use crate::exec::response;
use crate::exec::session::Session;
use crate::exec::Executor;

enum Frame {
    Line(Vec<u8>),
    Eof,
    TooLong,
}

/// Handles a single client connection
pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    executor: Executor,
    session: Session,
    max_line_bytes: usize,
    peer_addr: String,
}

impl Connection {
    pub fn new(stream: TcpStream, db: Arc<Database>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency on small lines
        stream.set_nodelay(true)?;

        let max_line_bytes = db.config().max_line_bytes;
        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            executor: Executor::new(db),
            session: Session::new(),
            max_line_bytes,
            peer_addr,
        })
    }

    /// Handle the connection until the client disconnects
    pub fn handle(&mut self) -> Result<()> {
        debug!(peer = %self.peer_addr, "connection established");

        loop {
            let frame = match self.read_frame() {
                Ok(frame) => frame,
                Err(LodeError::Io(ref e)) if is_disconnect(e.kind()) => {
                    debug!(peer = %self.peer_addr, "client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let line = match frame {
                Frame::Eof => {
                    debug!(peer = %self.peer_addr, "client disconnected");
                    return Ok(());
                }
                Frame::TooLong => {
                    warn!(peer = %self.peer_addr, "statement line too long; closing");
                    let err = LodeError::Parse("statement line too long".into());
                    let _ = self.write_response(&response::failure(&err));
                    return Ok(());
                }
                Frame::Line(line) => line,
            };

            let Ok(text) = String::from_utf8(line) else {
                let err = LodeError::Parse("statement is not UTF-8".into());
                self.write_response(&response::failure(&err))?;
                continue;
            };
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            let reply = self.executor.execute(&mut self.session, text);
            if let Err(e) = self.write_response(&reply) {
                if let LodeError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) {
                        debug!(peer = %self.peer_addr, "client went away mid-response");
                        return Ok(());
                    }
                }
                return Err(e);
            }
        }
    }

    /// Read bytes up to the next newline, enforcing the line cap
    fn read_frame(&mut self) -> Result<Frame> {
        let mut buf = Vec::new();
        let cap = self.max_line_bytes as u64 + 1;
        let n = (&mut self.reader).take(cap).read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok(Frame::Eof);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.len() > self.max_line_bytes {
            return Ok(Frame::TooLong);
        }
        Ok(Frame::Line(buf))
    }

    fn write_response(&mut self, reply: &serde_json::Value) -> Result<()> {
        serde_json::to_writer(&mut self.writer, reply)
            .map_err(|e| LodeError::Internal(format!("response encoding failed: {}", e)))?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
    )
}
