//! # Device Session Module
//!
//! Owns the meter transport for the lifetime of one connection.
//!
//! This module handles:
//! - Turning inbound transport chunks into decoded readings
//! - Stamping each reading with a unique acquisition timestamp
//! - Appending readings durably before notifying subscribers
//! - Queuing outbound command frames
//! - Exactly-once disconnect notification, whether the user or the
//!   transport ends the session
//!
//! All session logic runs on a single spawned task: inbound reads, outbound
//! command writes, and store appends are multiplexed through one `select!`
//! loop, so no two pieces of session state ever run in parallel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::atorch::decoder::FrameAccumulator;
use crate::atorch::encoder::encode_command_frame;
use crate::atorch::protocol::Command;
use crate::error::Result;
use crate::store::{Reading, ReadingStore};
use crate::transport::MeterPort;

/// Transport read buffer size; a few report frames per chunk at most
const READ_BUFFER_SIZE: usize = 256;

/// Depth of the outbound command queue
const COMMAND_QUEUE_DEPTH: usize = 16;

/// Capacity of the reading broadcast channel; slow subscribers lag rather
/// than block the stream
const READING_CHANNEL_CAPACITY: usize = 64;

/// Requests forwarded from session handles to the session task
enum SessionRequest {
    Command(Command),
    Disconnect,
}

/// State shared between session handles and the session task
struct SessionShared {
    connected: AtomicBool,
    frames_decoded: AtomicU64,
    decode_failures: AtomicU64,
    bytes_discarded: AtomicU64,
}

/// Stream counters of a session
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    /// Frames successfully decoded
    pub frames_decoded: u64,
    /// Malformed frames discarded (expected transport noise)
    pub decode_failures: u64,
    /// Bytes skipped during resynchronization
    pub bytes_discarded: u64,
}

/// One live meter connection, from connect to disconnect
///
/// Created by [`DeviceSession::connect`] with an already-opened transport
/// (device discovery lives in [`crate::transport`]). Dropping the session
/// handle tears the connection down the same way [`disconnect`] does.
///
/// [`disconnect`]: DeviceSession::disconnect
pub struct DeviceSession {
    shared: Arc<SessionShared>,
    request_tx: mpsc::Sender<SessionRequest>,
    reading_tx: broadcast::Sender<Reading>,
    connected_rx: watch::Receiver<bool>,
}

impl DeviceSession {
    /// Start streaming from an opened transport
    ///
    /// Spawns the session task and begins consuming the inbound byte
    /// stream. Every successfully decoded report is stamped, appended to
    /// `store`, then broadcast to subscribers, in that order; store
    /// durability never depends on subscriber presence.
    ///
    /// # Arguments
    ///
    /// * `port` - Opened transport, exclusively owned by this session
    /// * `store` - Process-wide reading store
    pub fn connect(port: Box<dyn MeterPort>, store: Arc<ReadingStore>) -> Self {
        let shared = Arc::new(SessionShared {
            connected: AtomicBool::new(true),
            frames_decoded: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            bytes_discarded: AtomicU64::new(0),
        });

        let (request_tx, request_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (reading_tx, _) = broadcast::channel(READING_CHANNEL_CAPACITY);
        let (connected_tx, connected_rx) = watch::channel(true);

        tokio::spawn(session_task(
            port,
            store,
            Arc::clone(&shared),
            request_rx,
            reading_tx.clone(),
            connected_tx,
        ));

        info!("Meter session streaming");
        Self {
            shared,
            request_tx,
            reading_tx,
            connected_rx,
        }
    }

    /// Whether the session is still streaming
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Subscribe to decoded readings
    ///
    /// Each subscriber sees readings in decode order, delivered after the
    /// corresponding store append has been issued.
    pub fn subscribe_readings(&self) -> broadcast::Receiver<Reading> {
        self.reading_tx.subscribe()
    }

    /// Subscribe to the connected flag
    ///
    /// The flag transitions `true -> false` exactly once per session, no
    /// matter whether the user or the transport initiated the disconnect.
    pub fn subscribe_state(&self) -> watch::Receiver<bool> {
        self.connected_rx.clone()
    }

    /// Current stream counters
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            frames_decoded: self.shared.frames_decoded.load(Ordering::Relaxed),
            decode_failures: self.shared.decode_failures.load(Ordering::Relaxed),
            bytes_discarded: self.shared.bytes_discarded.load(Ordering::Relaxed),
        }
    }

    /// Queue an outbound command frame
    ///
    /// Fire-and-forget: the session task performs the write. Calling this
    /// after a disconnect is a no-op, not an error, to tolerate
    /// late-arriving UI commands; nothing is written to the transport.
    pub async fn send_command(&self, command: Command) -> Result<()> {
        if !self.is_connected() {
            debug!("Ignoring {:?} while disconnected", command);
            return Ok(());
        }

        // A send failure means the task just shut down; treat it like the
        // disconnected no-op above.
        let _ = self.request_tx.send(SessionRequest::Command(command)).await;
        Ok(())
    }

    /// Disconnect the session and wait for teardown
    ///
    /// Idempotent, and safe against a racing transport-initiated
    /// disconnect: the notification still fires exactly once. In-flight
    /// store appends complete; only future inbound processing stops.
    pub async fn disconnect(&self) {
        let _ = self.request_tx.send(SessionRequest::Disconnect).await;

        let mut state = self.connected_rx.clone();
        while *state.borrow_and_update() {
            if state.changed().await.is_err() {
                break;
            }
        }
    }
}

/// The single event loop owning the transport
async fn session_task(
    mut port: Box<dyn MeterPort>,
    store: Arc<ReadingStore>,
    shared: Arc<SessionShared>,
    mut request_rx: mpsc::Receiver<SessionRequest>,
    reading_tx: broadcast::Sender<Reading>,
    connected_tx: watch::Sender<bool>,
) {
    let mut accumulator = FrameAccumulator::new();
    let mut read_buf = [0u8; READ_BUFFER_SIZE];
    let mut last_key: i64 = 0;
    let mut pending_write: Option<Vec<u8>> = None;

    loop {
        // Outbound frames are written between select rounds so the write
        // never competes with the read for the port borrow
        if let Some(frame) = pending_write.take() {
            if let Err(e) = write_frame(port.as_mut(), &frame).await {
                warn!("Command write failed, disconnecting: {}", e);
                break;
            }
            debug!("Sent command frame ({} bytes)", frame.len());
        }

        tokio::select! {
            request = request_rx.recv() => match request {
                Some(SessionRequest::Command(command)) => {
                    pending_write = Some(encode_command_frame(command));
                }
                Some(SessionRequest::Disconnect) | None => {
                    info!("Session disconnect requested");
                    break;
                }
            },
            read = port.read_chunk(&mut read_buf) => match read {
                Ok(0) => {
                    info!("Transport closed by the device");
                    break;
                }
                Ok(n) => {
                    for report in accumulator.feed(&read_buf[..n]) {
                        let timestamp_ms = next_timestamp(&mut last_key);
                        let reading = Reading::from_report(&report, timestamp_ms);

                        // Append first; subscribers are notified only after
                        // the store transaction has been issued. An append
                        // failure loses this reading from durable storage
                        // but does not end the stream.
                        if let Err(e) = store.append(&reading).await {
                            error!("Failed to append reading at {}: {}", timestamp_ms, e);
                        }
                        let _ = reading_tx.send(reading);
                    }

                    shared
                        .frames_decoded
                        .store(accumulator.frames_decoded(), Ordering::Relaxed);
                    shared
                        .decode_failures
                        .store(accumulator.decode_failures(), Ordering::Relaxed);
                    shared
                        .bytes_discarded
                        .store(accumulator.bytes_discarded(), Ordering::Relaxed);
                }
                Err(e) => {
                    warn!("Transport read failed, disconnecting: {}", e);
                    break;
                }
            },
        }
    }

    // Whoever observes the Streaming -> Disconnected transition first wins;
    // the notification fires exactly once per session
    if shared.connected.swap(false, Ordering::SeqCst) {
        let _ = connected_tx.send(false);
        info!(
            "Session closed: {} frames decoded, {} decode failures, {} bytes discarded",
            accumulator.frames_decoded(),
            accumulator.decode_failures(),
            accumulator.bytes_discarded()
        );
    }
}

async fn write_frame(port: &mut dyn MeterPort, frame: &[u8]) -> std::io::Result<()> {
    port.write_all(frame).await?;
    port.flush().await
}

/// Assign the next acquisition timestamp
///
/// Wall-clock milliseconds, nudged forward when the clock has not advanced
/// past the previous key, so store keys never collide within a session.
fn next_timestamp(last_key: &mut i64) -> i64 {
    let now = Utc::now().timestamp_millis();
    *last_key = if now > *last_key { now } else { *last_key + 1 };
    *last_key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atorch::encoder::DcReportFrame;
    use crate::transport::port_trait::mocks::MockMeterPort;
    use tokio::time::{sleep, timeout, Duration};

    fn report_frame(voltage_dv: u32) -> Vec<u8> {
        DcReportFrame {
            voltage_dv,
            current_ma: 1_000,
            temperature_c: 25,
            run_seconds: 1,
            ..Default::default()
        }
        .encode()
    }

    async fn start_session() -> (MockMeterPort, Arc<ReadingStore>, DeviceSession) {
        let store = Arc::new(ReadingStore::open("sqlite::memory:").await.unwrap());
        let mock = MockMeterPort::new();
        let session = DeviceSession::connect(Box::new(mock.clone()), Arc::clone(&store));
        (mock, store, session)
    }

    async fn recv_reading(rx: &mut broadcast::Receiver<Reading>) -> Reading {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for reading")
            .expect("reading channel closed")
    }

    async fn wait_disconnected(state: &mut watch::Receiver<bool>) {
        timeout(Duration::from_secs(5), async {
            while *state.borrow_and_update() {
                state.changed().await.unwrap();
            }
        })
        .await
        .expect("timed out waiting for disconnect notification");
    }

    #[tokio::test]
    async fn test_decoded_reading_is_stored_and_broadcast() {
        let (mock, store, session) = start_session().await;
        let mut readings = session.subscribe_readings();

        mock.push_chunk(&report_frame(124));

        let reading = recv_reading(&mut readings).await;
        assert_eq!(reading.voltage_mv, 12_400);
        assert_eq!(reading.current_ma, 1_000);

        // The append was issued before the notification, so the store
        // already holds the same reading
        let stored = store.get_all().await.unwrap();
        assert_eq!(stored, vec![reading]);
    }

    #[tokio::test]
    async fn test_n_decodes_yield_n_records_in_decode_order() {
        let (mock, store, session) = start_session().await;
        let mut readings = session.subscribe_readings();

        // Three frames, split awkwardly across chunks
        let mut stream = Vec::new();
        for voltage_dv in [100, 200, 300] {
            stream.extend_from_slice(&report_frame(voltage_dv));
        }
        mock.push_chunk(&stream[..50]);
        mock.push_chunk(&stream[50..]);

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(recv_reading(&mut readings).await);
        }

        let voltages: Vec<u32> = received.iter().map(|r| r.voltage_mv).collect();
        assert_eq!(voltages, vec![10_000, 20_000, 30_000]);

        // Exactly three records, unique timestamp keys, decode order
        let mut stored = store.get_all().await.unwrap();
        stored.sort_by_key(|r| r.timestamp_ms);
        assert_eq!(stored, received);
        assert!(stored.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
    }

    #[tokio::test]
    async fn test_corrupted_frame_does_not_lose_the_next_one() {
        let (mock, store, session) = start_session().await;
        let mut readings = session.subscribe_readings();

        let mut corrupted = report_frame(124);
        corrupted[20] ^= 0xA5;
        mock.push_chunk(&corrupted);
        mock.push_chunk(&report_frame(52));

        let reading = recv_reading(&mut readings).await;
        assert_eq!(reading.voltage_mv, 5_200);
        assert_eq!(store.get_all().await.unwrap().len(), 1);
        assert!(session.stats().decode_failures >= 1);
    }

    #[tokio::test]
    async fn test_send_command_writes_encoded_frame() {
        let (mock, _store, session) = start_session().await;

        session.send_command(Command::ResetAll).await.unwrap();

        // The session task performs the write; poll until it lands
        let expected = encode_command_frame(Command::ResetAll);
        for _ in 0..100 {
            if !mock.written_frames().is_empty() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(mock.written_frames(), vec![expected]);
    }

    #[tokio::test]
    async fn test_send_command_while_disconnected_is_a_noop() {
        let (mock, _store, session) = start_session().await;
        let mut state = session.subscribe_state();

        mock.close();
        wait_disconnected(&mut state).await;

        session.send_command(Command::ResetEnergy).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        assert!(mock.written_frames().is_empty());
    }

    #[tokio::test]
    async fn test_transport_close_fires_disconnect_notification() {
        let (mock, _store, session) = start_session().await;
        let mut state = session.subscribe_state();
        assert!(session.is_connected());

        mock.close();
        wait_disconnected(&mut state).await;
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_against_transport_close() {
        let (mock, _store, session) = start_session().await;
        let mut state = session.subscribe_state();

        // Transport close and user disconnect race; the notification must
        // still fire exactly once and both paths must complete
        mock.close();
        session.disconnect().await;
        session.disconnect().await;

        wait_disconnected(&mut state).await;
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_user_disconnect_stops_the_stream() {
        let (mock, store, session) = start_session().await;
        let mut readings = session.subscribe_readings();

        mock.push_chunk(&report_frame(124));
        recv_reading(&mut readings).await;

        session.disconnect().await;
        assert!(!session.is_connected());

        // Frames arriving after disconnect are never decoded or stored
        mock.push_chunk(&report_frame(200));
        sleep(Duration::from_millis(50)).await;
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[test]
    fn test_next_timestamp_never_collides() {
        let mut last_key = 0i64;
        let first = next_timestamp(&mut last_key);
        let second = next_timestamp(&mut last_key);
        let third = next_timestamp(&mut last_key);
        assert!(first < second && second < third);
    }

    #[test]
    fn test_next_timestamp_survives_clock_standstill() {
        // Force the "clock has not advanced" branch with a key from the far
        // future
        let mut last_key = i64::MAX - 10;
        let next = next_timestamp(&mut last_key);
        assert_eq!(next, i64::MAX - 9);
    }
}
