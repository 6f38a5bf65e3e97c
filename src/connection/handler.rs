//! Connection Handler Module
//!
//! Each client gets its own task that runs a read-dispatch-reply loop
//! until the client disconnects or sends bytes that are not RESP.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Dispatch every complete │ │
//!    │  │ request in the buffer   │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Flush replies           │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes from socket  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. EOF, I/O error or protocol error: handler task ends
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a stream, so a read may hold half a request or several of them.
//! Incoming bytes accumulate in a `BytesMut`; each dispatched request is
//! cut from the front and any remainder waits for the next read.

use crate::commands::CommandHandler;
use crate::protocol::{ParseError, RespValue};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

/// Maximum number of buffered, not yet dispatched bytes (64 MB)
pub const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

const INITIAL_BUFFER_SIZE: usize = 4096;

/// Handles one client connection.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Bytes received but not yet dispatched
    buffer: BytesMut,

    command_handler: CommandHandler,
}

impl ConnectionHandler {
    pub fn new(stream: TcpStream, addr: SocketAddr, command_handler: CommandHandler) -> Self {
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
        }
    }

    /// Runs the connection loop until the client goes away.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                info!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let replies = self.dispatch_buffered().await?;
            if replies > 0 {
                // One flush per batch of pipelined requests
                self.stream.flush().await?;
            }

            self.read_more_data().await?;
        }
    }

    /// Dispatches every complete request currently buffered, in order.
    ///
    /// On a protocol error the client gets one error reply and the
    /// connection is closed, since the stream can no longer be framed.
    async fn dispatch_buffered(&mut self) -> Result<usize, ConnectionError> {
        let mut replies = 0;

        loop {
            match self.command_handler.handle_buffer(&self.buffer) {
                Ok(Some((reply, consumed))) => {
                    self.buffer.advance(consumed);
                    trace!(
                        client = %self.addr,
                        consumed = consumed,
                        remaining = self.buffer.len(),
                        "Dispatched request"
                    );
                    self.stream.write_all(&reply).await?;
                    replies += 1;
                }
                Ok(None) => return Ok(replies),
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "Protocol error");
                    let reply = RespValue::error(format!("ERR Protocol error: {}", e));
                    self.stream.write_all(&reply.serialize()).await?;
                    self.stream.flush().await?;
                    return Err(ConnectionError::ParseError(e));
                }
            }
        }
    }

    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial request in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(())
    }
}

/// Errors that can end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The client sent bytes that are not valid RESP
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial request)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Runs a [`ConnectionHandler`] to completion.
///
/// Errors are already logged by the handler, so they are dropped here.
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, command_handler: CommandHandler) {
    let handler = ConnectionHandler::new(stream, addr, command_handler);
    if let Err(e) = handler.run().await {
        trace!(client = %addr, error = %e, "Connection task finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse_message;
    use crate::storage::StorageEngine;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn create_test_server() -> (SocketAddr, Arc<StorageEngine>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());

        let storage_clone = Arc::clone(&storage);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = CommandHandler::in_memory(Arc::clone(&storage_clone));
                tokio::spawn(handle_connection(stream, client_addr, handler));
            }
        });

        (addr, storage)
    }

    /// Reads from the socket until one full reply has arrived.
    async fn read_reply(client: &mut TcpStream, pending: &mut BytesMut) -> RespValue {
        loop {
            if let Some((value, consumed)) = parse_message(&pending[..]).unwrap() {
                pending.advance(consumed);
                return value;
            }
            let n = client.read_buf(pending).await.unwrap();
            assert!(n > 0, "server closed the connection");
        }
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (addr, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();

        assert_eq!(&buf[..n], b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_set_get() {
        let (addr, storage) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut pending = BytesMut::new();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client, &mut pending).await, RespValue::ok());

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .await
            .unwrap();
        assert_eq!(
            read_reply(&mut client, &mut pending).await,
            RespValue::bulk_string("Ariz")
        );

        assert!(storage.exists(b"name"));
    }

    #[tokio::test]
    async fn test_pipelined_requests_reply_in_order() {
        let (addr, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut pending = BytesMut::new();

        client
            .write_all(
                b"*2\r\n$4\r\nINCR\r\n$1\r\nn\r\n\
                  *2\r\n$4\r\nINCR\r\n$1\r\nn\r\n\
                  *2\r\n$3\r\nGET\r\n$1\r\nn\r\n",
            )
            .await
            .unwrap();

        assert_eq!(read_reply(&mut client, &mut pending).await, RespValue::integer(1));
        assert_eq!(read_reply(&mut client, &mut pending).await, RespValue::integer(2));
        assert_eq!(
            read_reply(&mut client, &mut pending).await,
            RespValue::bulk_string("2")
        );
    }

    #[tokio::test]
    async fn test_request_split_across_writes() {
        let (addr, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut pending = BytesMut::new();

        client.write_all(b"*2\r\n$4\r\nEC").await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.write_all(b"HO\r\n$5\r\nhello\r\n").await.unwrap();

        assert_eq!(
            read_reply(&mut client, &mut pending).await,
            RespValue::bulk_string("hello")
        );
    }

    #[tokio::test]
    async fn test_command_error_keeps_connection_open() {
        let (addr, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut pending = BytesMut::new();

        client.write_all(b"*1\r\n$3\r\nGET\r\n").await.unwrap();
        assert_eq!(
            read_reply(&mut client, &mut pending).await,
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client, &mut pending).await, RespValue::pong());
    }

    #[tokio::test]
    async fn test_protocol_error_closes_connection() {
        let (addr, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut pending = BytesMut::new();

        client.write_all(b"*1\r\n$abc\r\n").await.unwrap();

        match read_reply(&mut client, &mut pending).await {
            RespValue::Error(msg) => assert!(msg.starts_with("ERR Protocol error")),
            other => panic!("expected an error reply, got {:?}", other),
        }

        // Server hangs up after the error reply
        let n = client.read_buf(&mut pending).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_clients_share_storage() {
        let (addr, _) = create_test_server().await;

        let mut writer = TcpStream::connect(addr).await.unwrap();
        let mut reader = TcpStream::connect(addr).await.unwrap();
        let mut pending = BytesMut::new();

        writer
            .write_all(b"*3\r\n$5\r\nRPUSH\r\n$1\r\nl\r\n$1\r\na\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut writer, &mut pending).await, RespValue::integer(1));

        let mut pending = BytesMut::new();
        reader
            .write_all(b"*4\r\n$6\r\nLRANGE\r\n$1\r\nl\r\n$1\r\n0\r\n$2\r\n-1\r\n")
            .await
            .unwrap();
        assert_eq!(
            read_reply(&mut reader, &mut pending).await,
            RespValue::array(vec![RespValue::bulk_string("a")])
        );
    }
}
