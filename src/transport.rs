//! # Transport Session
//!
//! The duplex byte channel the dispatcher talks through. A channel is opened
//! by a [`ChannelConnector`] and owned exclusively by whoever is running an
//! exchange on it; nothing here knows about Modbus semantics beyond the MBAP
//! length field used to tell where a response frame ends.
//!
//! ## Timeout semantics
//!
//! [`ModbusChannel::receive`] returns `ModbusError::Timeout` only when the
//! deadline passes with zero bytes read. If part of a frame arrived first,
//! the partial bytes are returned and left to the codec to reject.
//!
//! ## Framing
//!
//! `receive` reads exactly one MBAP frame. Bytes still queued behind that
//! frame mean the stream is out of step with the request sequence, so the
//! frame is returned and the channel marks itself disconnected.
//!
//! ```rust,no_run
//! use modbus_scanner::transport::{ChannelConnector, ModbusChannel, TcpConnector};
//! use std::time::Duration;
//!
//! # async fn example() -> modbus_scanner::ModbusResult<()> {
//! let connector = TcpConnector::from_address("127.0.0.1:502")?;
//! let mut channel = connector.connect(Duration::from_secs(1)).await?;
//! channel.send(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x00, 0x00, 0x00, 0x01]).await?;
//! let reply = channel.receive(512, Duration::from_secs(1)).await?;
//! println!("{} bytes", reply.len());
//! channel.close().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::constants::{MAX_MBAP_LENGTH, MODBUS_RESPONSE_BUFFER_SIZE};
use crate::error::{ModbusError, ModbusResult};

/// Bytes before the MBAP length field's payload: transaction(2) + protocol(2) + length(2)
const MBAP_PREFIX_LEN: usize = 6;

/// Format raw bytes as hex string for packet logging
pub fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log packet with direction
pub fn log_packet(direction: &str, data: &[u8], unit_id: Option<u8>) {
    let hex_string = format_hex_packet(data);
    match unit_id {
        Some(id) => info!("[MODBUS-TCP] {} unit:{} {}", direction, id, hex_string),
        None => info!("[MODBUS-TCP] {} {}", direction, hex_string),
    }
}

/// Duplex byte channel to a single Modbus server
pub trait ModbusChannel: Send {
    /// Write a complete request frame
    fn send(&mut self, frame: &[u8]) -> impl Future<Output = ModbusResult<()>> + Send;

    /// Wait at most `timeout` for one response frame of at most `max_bytes`
    fn receive(
        &mut self,
        max_bytes: usize,
        timeout: Duration,
    ) -> impl Future<Output = ModbusResult<Vec<u8>>> + Send;

    /// Close the channel; further use is an error
    fn close(&mut self) -> impl Future<Output = ModbusResult<()>> + Send;

    fn is_connected(&self) -> bool;
}

/// Opens channels to one configured server
pub trait ChannelConnector: Send + Sync {
    type Channel: ModbusChannel;

    /// Open a channel, giving up after `timeout`. The channel keeps `timeout`
    /// as its write deadline.
    fn connect(&self, timeout: Duration)
        -> impl Future<Output = ModbusResult<Self::Channel>> + Send;
}

/// Transport layer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Opens [`TcpChannel`]s to a fixed server address
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: SocketAddr,
    packet_logging: bool,
}

impl TcpConnector {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            packet_logging: false,
        }
    }

    /// Create a connector from a `host:port` string
    pub fn from_address(addr: &str) -> ModbusResult<Self> {
        let address = addr.parse::<SocketAddr>().map_err(|e| {
            ModbusError::invalid_argument(format!("Invalid address '{}': {}", addr, e))
        })?;
        Ok(Self::new(address))
    }

    /// Dump every frame sent and received at `info` level
    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

impl ChannelConnector for TcpConnector {
    type Channel = TcpChannel;

    async fn connect(&self, timeout: Duration) -> ModbusResult<TcpChannel> {
        let mut channel = TcpChannel::connect(self.address, timeout).await?;
        channel.set_packet_logging(self.packet_logging);
        Ok(channel)
    }
}

/// Modbus TCP channel over a tokio `TcpStream`
pub struct TcpChannel {
    stream: Option<TcpStream>,
    address: SocketAddr,
    timeout: Duration,
    stats: TransportStats,
    /// Enable packet logging for debugging
    packet_logging: bool,
}

impl TcpChannel {
    /// Connect to `address`, giving up after `connect_timeout`
    pub async fn connect(address: SocketAddr, connect_timeout: Duration) -> ModbusResult<Self> {
        let stream = match timeout(connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ModbusError::connection(format!(
                    "Failed to connect to {}: {}",
                    address, e
                )))
            }
            Err(_) => {
                return Err(ModbusError::timeout(
                    format!("connect to {}", address),
                    connect_timeout.as_millis() as u64,
                ))
            }
        };
        // Modbus frames are tiny; don't let Nagle hold them back
        stream.set_nodelay(true)?;
        debug!("Connected to Modbus server {}", address);

        Ok(Self {
            stream: Some(stream),
            address,
            timeout: connect_timeout,
            stats: TransportStats::default(),
            packet_logging: false,
        })
    }

    /// Enable or disable packet logging
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }

    fn stream_mut(&mut self) -> ModbusResult<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| ModbusError::connection(format!("Channel to {} is closed", self.address)))
    }

    /// Whether anything is already queued behind the frame just read.
    /// End of stream counts too: the channel cannot carry another exchange.
    fn has_trailing_bytes(&self) -> bool {
        let Some(stream) = self.stream.as_ref() else {
            return false;
        };
        let mut scratch = [0u8; 1];
        match stream.try_read(&mut scratch) {
            Ok(_) => true,
            Err(e) => e.kind() != std::io::ErrorKind::WouldBlock,
        }
    }

    /// Total frame length once the MBAP prefix is known
    fn expected_frame_len(buf: &[u8]) -> Option<usize> {
        if buf.len() < MBAP_PREFIX_LEN {
            return None;
        }
        let length = u16::from_be_bytes([buf[4], buf[5]]) as usize;
        Some(MBAP_PREFIX_LEN + length.min(MAX_MBAP_LENGTH))
    }
}

impl ModbusChannel for TcpChannel {
    async fn send(&mut self, frame: &[u8]) -> ModbusResult<()> {
        if self.packet_logging {
            log_packet("send", frame, frame.get(6).copied());
        }

        let write_timeout = self.timeout;
        let address = self.address;
        let stream = self.stream_mut()?;
        match timeout(write_timeout, stream.write_all(frame)).await {
            Ok(Ok(())) => {
                self.stats.requests_sent += 1;
                self.stats.bytes_sent += frame.len() as u64;
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Send to {} failed: {}", address, e);
                self.stats.errors += 1;
                self.stream = None;
                Err(ModbusError::Io(e))
            }
            Err(_) => {
                self.stats.timeouts += 1;
                self.stats.errors += 1;
                self.stream = None;
                Err(ModbusError::timeout(
                    "send request",
                    write_timeout.as_millis() as u64,
                ))
            }
        }
    }

    async fn receive(&mut self, max_bytes: usize, wait: Duration) -> ModbusResult<Vec<u8>> {
        let deadline = Instant::now() + wait;
        let mut buf = BytesMut::with_capacity(max_bytes.min(MODBUS_RESPONSE_BUFFER_SIZE));
        let mut chunk = [0u8; MODBUS_RESPONSE_BUFFER_SIZE];
        let address = self.address;
        let stream = self.stream_mut()?;

        let result = loop {
            let target = Self::expected_frame_len(&buf)
                .unwrap_or(MBAP_PREFIX_LEN)
                .min(max_bytes);
            if buf.len() >= target {
                break Ok(());
            }

            let want = (target - buf.len()).min(chunk.len());
            match timeout_at(deadline, stream.read(&mut chunk[..want])).await {
                Ok(Ok(0)) => {
                    break if buf.is_empty() {
                        Err(ModbusError::connection(format!(
                            "Connection closed by {}",
                            address
                        )))
                    } else {
                        Ok(())
                    };
                }
                Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => break Err(ModbusError::Io(e)),
                Err(_) if buf.is_empty() => {
                    break Err(ModbusError::timeout(
                        "receive response",
                        wait.as_millis() as u64,
                    ))
                }
                Err(_) => {
                    debug!(
                        "Deadline hit after {} partial bytes from {}",
                        buf.len(),
                        address
                    );
                    break Ok(());
                }
            }
        };

        match result {
            Ok(()) => {
                self.stats.responses_received += 1;
                self.stats.bytes_received += buf.len() as u64;
                if self.packet_logging {
                    log_packet("receive", &buf, buf.get(6).copied());
                }
                if self.has_trailing_bytes() {
                    warn!(
                        "Extra bytes after {}-byte frame from {}; dropping channel",
                        buf.len(),
                        address
                    );
                    self.stats.errors += 1;
                    self.stream = None;
                }
                Ok(buf.to_vec())
            }
            Err(err) => {
                self.stats.errors += 1;
                if err.is_timeout() {
                    self.stats.timeouts += 1;
                } else {
                    self.stream = None;
                }
                Err(err)
            }
        }
    }

    async fn close(&mut self) -> ModbusResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("Closed channel to {}", self.address);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Scripted in-memory channel for tests
#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// What the mock server does with one request
    #[derive(Debug, Clone)]
    pub enum MockReply {
        Frame(Vec<u8>),
        Timeout,
        Fault,
    }

    pub type Responder = Arc<dyn Fn(&[u8]) -> MockReply + Send + Sync>;

    pub struct MockChannel {
        responder: Responder,
        pending: VecDeque<MockReply>,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        connected: bool,
    }

    impl MockChannel {
        pub fn new(responder: Responder) -> Self {
            Self {
                responder,
                pending: VecDeque::new(),
                sent: Arc::new(Mutex::new(Vec::new())),
                connected: true,
            }
        }

        pub fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ModbusChannel for MockChannel {
        async fn send(&mut self, frame: &[u8]) -> ModbusResult<()> {
            if !self.connected {
                return Err(ModbusError::connection("mock channel closed"));
            }
            self.sent.lock().unwrap().push(frame.to_vec());
            let reply = (self.responder)(frame);
            self.pending.push_back(reply);
            Ok(())
        }

        async fn receive(&mut self, max_bytes: usize, wait: Duration) -> ModbusResult<Vec<u8>> {
            match self.pending.pop_front() {
                Some(MockReply::Frame(mut bytes)) => {
                    bytes.truncate(max_bytes);
                    Ok(bytes)
                }
                Some(MockReply::Timeout) | None => {
                    Err(ModbusError::timeout("receive response", wait.as_millis() as u64))
                }
                Some(MockReply::Fault) => Err(ModbusError::connection("connection reset by peer")),
            }
        }

        async fn close(&mut self) -> ModbusResult<()> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    /// How a [`MockConnector`] answers connect attempts
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum ConnectBehavior {
        Accept,
        Refuse,
        TimeOut,
    }

    /// Hands out [`MockChannel`]s sharing one responder and request log
    #[derive(Clone)]
    pub struct MockConnector {
        responder: Responder,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        connects: Arc<AtomicUsize>,
        timeouts: Arc<Mutex<Vec<Duration>>>,
        behavior: ConnectBehavior,
    }

    impl MockConnector {
        pub fn new(responder: impl Fn(&[u8]) -> MockReply + Send + Sync + 'static) -> Self {
            Self {
                responder: Arc::new(responder),
                sent: Arc::new(Mutex::new(Vec::new())),
                connects: Arc::new(AtomicUsize::new(0)),
                timeouts: Arc::new(Mutex::new(Vec::new())),
                behavior: ConnectBehavior::Accept,
            }
        }

        /// Connector whose every connect attempt is refused
        pub fn refusing() -> Self {
            Self {
                behavior: ConnectBehavior::Refuse,
                ..Self::new(|_| MockReply::Timeout)
            }
        }

        /// Connector whose every connect attempt runs out of time
        pub fn timing_out() -> Self {
            Self {
                behavior: ConnectBehavior::TimeOut,
                ..Self::new(|_| MockReply::Timeout)
            }
        }

        pub fn connect_count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        /// Timeout passed to each connect attempt, in order
        pub fn connect_timeouts(&self) -> Vec<Duration> {
            self.timeouts.lock().unwrap().clone()
        }

        pub fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ChannelConnector for MockConnector {
        type Channel = MockChannel;

        async fn connect(&self, timeout: Duration) -> ModbusResult<MockChannel> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.timeouts.lock().unwrap().push(timeout);
            match self.behavior {
                ConnectBehavior::Accept => {}
                ConnectBehavior::Refuse => {
                    return Err(ModbusError::connection("connection refused"))
                }
                ConnectBehavior::TimeOut => {
                    return Err(ModbusError::timeout(
                        "connect to mock",
                        timeout.as_millis() as u64,
                    ))
                }
            }
            let mut channel = MockChannel::new(self.responder.clone());
            channel.sent = self.sent.clone();
            Ok(channel)
        }
    }

    /// Read coils reply echoing the request header with one status byte
    pub fn coil_reply(request: &[u8], status: u8) -> Vec<u8> {
        let mut reply = request[..8].to_vec();
        reply[4..6].copy_from_slice(&4u16.to_be_bytes());
        reply.extend_from_slice(&[0x01, status]);
        reply
    }

    /// Read holding registers reply carrying one register
    pub fn register_reply(request: &[u8], value: u16) -> Vec<u8> {
        let mut reply = request[..8].to_vec();
        reply[4..6].copy_from_slice(&5u16.to_be_bytes());
        reply.push(0x02);
        reply.extend_from_slice(&value.to_be_bytes());
        reply
    }

    /// Exception reply for the request's function code
    pub fn exception_reply(request: &[u8], code: u8) -> Vec<u8> {
        let mut reply = request[..8].to_vec();
        reply[4..6].copy_from_slice(&3u16.to_be_bytes());
        reply[7] |= 0x80;
        reply.push(code);
        reply
    }

    /// Address field of a request frame
    pub fn request_address(request: &[u8]) -> u16 {
        u16::from_be_bytes([request[8], request[9]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_format_hex_packet() {
        assert_eq!(format_hex_packet(&[0x00, 0x01, 0xFF]), "00 01 FF");
        assert_eq!(format_hex_packet(&[]), "");
    }

    #[test]
    fn test_expected_frame_len() {
        assert_eq!(TcpChannel::expected_frame_len(&[0x00, 0x01, 0x00]), None);
        assert_eq!(
            TcpChannel::expected_frame_len(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x04]),
            Some(10)
        );
    }

    #[test]
    fn test_connector_from_address() {
        let connector = TcpConnector::from_address("127.0.0.1:502").unwrap();
        assert_eq!(connector.address().port(), 502);
        assert!(TcpConnector::from_address("not-an-address").is_err());
    }

    #[tokio::test]
    async fn test_tcp_channel_reads_one_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 12];
            socket.read_exact(&mut request).await.unwrap();
            // Reply in two writes to exercise frame reassembly
            socket.write_all(&[0x00, 0x01, 0x00, 0x00]).await.unwrap();
            socket
                .write_all(&[0x00, 0x04, 0x01, 0x01, 0x01, 0x01])
                .await
                .unwrap();
        });

        let connector = TcpConnector::new(address);
        let mut channel = connector.connect(Duration::from_secs(1)).await.unwrap();
        channel
            .send(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x00, 0x00, 0x00, 0x01])
            .await
            .unwrap();
        let reply = channel
            .receive(MODBUS_RESPONSE_BUFFER_SIZE, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(reply, vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x01]);
        let stats = channel.get_stats();
        assert_eq!(stats.requests_sent, 1);
        assert_eq!(stats.responses_received, 1);
        assert_eq!(stats.bytes_received, 10);

        channel.close().await.unwrap();
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_tcp_channel_timeout_without_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(socket);
        });

        let mut channel = TcpChannel::connect(address, Duration::from_secs(1))
            .await
            .unwrap();
        let err = channel
            .receive(MODBUS_RESPONSE_BUFFER_SIZE, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(channel.get_stats().timeouts, 1);
        server.abort();
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let result = TcpChannel::connect(address, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tcp_channel_returns_partial_frame_at_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Header announces 4 more bytes, only the function code follows
            socket
                .write_all(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01])
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(socket);
        });

        let mut channel = TcpChannel::connect(address, Duration::from_secs(1))
            .await
            .unwrap();
        let reply = channel
            .receive(MODBUS_RESPONSE_BUFFER_SIZE, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(reply, vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01]);
        assert_eq!(channel.get_stats().timeouts, 0);
        server.abort();
    }

    #[tokio::test]
    async fn test_tcp_channel_drops_on_trailing_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Complete frame followed by two stray bytes in one write
            socket
                .write_all(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x01, 0xAA, 0xBB])
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(socket);
        });

        let mut channel = TcpChannel::connect(address, Duration::from_secs(1))
            .await
            .unwrap();
        // Let both segments land before reading
        tokio::time::sleep(Duration::from_millis(50)).await;
        let reply = channel
            .receive(MODBUS_RESPONSE_BUFFER_SIZE, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(reply, vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x01]);
        assert!(!channel.is_connected());
        server.abort();
    }
}
