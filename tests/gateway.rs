//! End-to-end tests over real TCP sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fleetwire::protocol::{ChecksumStrategy, encode_frame};
use fleetwire::{
    DeviceHandlerFactory, Envelope, FrameFormat, Gateway, GatewayConfig, Imei, MemorySink,
    SessionEvent,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};

const IMEI_A: &str = "123456789012345";
const IMEI_B: &str = "358899051234567";

struct Running {
    addr: SocketAddr,
    gateway: Arc<Gateway<DeviceHandlerFactory>>,
    sink: Arc<MemorySink>,
    run: JoinHandle<fleetwire::Result<()>>,
}

impl Running {
    async fn start(config: GatewayConfig) -> Self {
        let sink = Arc::new(MemorySink::new());
        let gateway = Arc::new(Gateway::for_devices(config, sink.clone()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::clone(&gateway);
        let run = tokio::spawn(async move { server.run_with_listener(listener).await });
        Self { addr, gateway, sink, run }
    }

    async fn stop(self) -> Arc<MemorySink> {
        self.gateway.shutdown();
        tokio::time::timeout(Duration::from_secs(5), self.run)
            .await
            .expect("gateway did not stop")
            .unwrap()
            .unwrap();
        self.sink
    }
}

/// Eight packed BCD bytes, left-padded with a zero nibble.
fn bcd_imei(digits: &str) -> Vec<u8> {
    let padded = format!("0{digits}");
    padded
        .as_bytes()
        .chunks(2)
        .map(|pair| ((pair[0] - b'0') << 4) | (pair[1] - b'0'))
        .collect()
}

fn login(format: FrameFormat, imei: &str, sequence: u16) -> Vec<u8> {
    encode_frame(format, Envelope::Standard, 0x01, &bcd_imei(imei), sequence).unwrap().to_vec()
}

/// 18-byte position block, 2024-05-01 12:30:00, 12 satellites, 50 km/h.
fn position(lat_raw: u32, lon_raw: u32, course_word: u16) -> Vec<u8> {
    let mut body = vec![24, 5, 1, 12, 30, 0, 0xC9];
    body.extend_from_slice(&lat_raw.to_be_bytes());
    body.extend_from_slice(&lon_raw.to_be_bytes());
    body.push(50);
    body.extend_from_slice(&course_word.to_be_bytes());
    body
}

fn location(format: FrameFormat, body: &[u8], sequence: u16) -> Vec<u8> {
    encode_frame(format, Envelope::Standard, 0x12, body, sequence).unwrap().to_vec()
}

async fn read_reply(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("no reply from gateway")
        .unwrap();
    buf
}

async fn connect_and_login(addr: SocketAddr, imei: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&login(FrameFormat::default(), imei, 1)).await.unwrap();
    let ack = read_reply(&mut stream, 9).await;
    assert_eq!(ack[3], 0x01);
    stream
}

async fn next_event<S: Stream<Item = SessionEvent> + Unpin>(events: &mut S) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .expect("no session event")
        .expect("event stream ended")
}

/// Poll until `$cond` holds or two seconds pass.
macro_rules! eventually {
    ($cond:expr) => {{
        let mut reached = false;
        for _ in 0..200 {
            if $cond {
                reached = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(reached, "condition not reached: {}", stringify!($cond));
    }};
}

#[tokio::test]
async fn published_login_gets_published_ack() {
    let config = GatewayConfig {
        checksum: ChecksumStrategy::Crc16,
        length_includes_checksum: true,
        ..GatewayConfig::default()
    };
    let running = Running::start(config).await;
    let mut device = TcpStream::connect(running.addr).await.unwrap();

    device
        .write_all(&[
            0x78, 0x78, 0x0D, 0x01, 0x01, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45, 0x00, 0x01,
            0x8C, 0xDD, 0x0D, 0x0A,
        ])
        .await
        .unwrap();

    let ack = read_reply(&mut device, 10).await;
    assert_eq!(ack, vec![0x78, 0x78, 0x05, 0x01, 0x00, 0x01, 0xD9, 0xDC, 0x0D, 0x0A]);
    running.stop().await;
}

#[tokio::test]
async fn fragmented_and_noisy_stream() {
    let running = Running::start(GatewayConfig::default()).await;
    let mut device = TcpStream::connect(running.addr).await.unwrap();

    let mut bytes = vec![0xFF, 0x00, 0x0D, 0x0A];
    bytes.extend_from_slice(&login(FrameFormat::default(), IMEI_A, 0x0102));
    for chunk in bytes.chunks(3) {
        device.write_all(chunk).await.unwrap();
        device.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let ack = read_reply(&mut device, 9).await;
    assert_eq!(&ack[4..6], &[0x01, 0x02]);
    running.stop().await;
}

#[tokio::test]
async fn concurrent_devices_reach_sink() {
    let running = Running::start(GatewayConfig::default()).await;
    let format = FrameFormat::default();

    let mut a = connect_and_login(running.addr, IMEI_A).await;
    let mut b = connect_and_login(running.addr, IMEI_B).await;

    // North-east and south-west fixes
    a.write_all(&location(format, &position(0x026B_3F3E, 0x0CC1_6559, 0x1400 | 45), 2))
        .await
        .unwrap();
    b.write_all(&location(format, &position(0x0400_0000, 0x0800_0000, 0x1800 | 270), 2))
        .await
        .unwrap();

    let imei_a = Imei::parse(IMEI_A).unwrap();
    let imei_b = Imei::parse(IMEI_B).unwrap();
    eventually!(running.sink.len().await == 2);

    let sink = running.stop().await;
    let rec_a = sink.get(&imei_a).await.unwrap();
    let rec_b = sink.get(&imei_b).await.unwrap();

    assert!(rec_a.latitude > 22.0 && rec_a.longitude > 118.0);
    assert!(rec_b.latitude < 0.0 && rec_b.longitude < 0.0);
    assert_eq!(rec_a.course_degrees, 45);
    assert_eq!(rec_b.course_degrees, 270);
    assert_eq!(rec_b.satellites, Some(12));
    assert_eq!(rec_a.speed_kmh, 50);
    drop((a, b));
}

#[tokio::test]
async fn reconnect_supersedes_and_stale_close_is_harmless() {
    let running = Running::start(GatewayConfig::default()).await;
    let mut events = Box::pin(running.gateway.registry().events());
    let imei = Imei::parse(IMEI_A).unwrap();

    let first = connect_and_login(running.addr, IMEI_A).await;
    let first_id = running.gateway.registry().lookup(&imei).await.unwrap().id;

    let second = connect_and_login(running.addr, IMEI_A).await;
    let second_id = running.gateway.registry().lookup(&imei).await.unwrap().id;
    assert_ne!(first_id, second_id);

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Bound { imei: imei.clone(), connection: first_id }
    );
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Superseded { imei: imei.clone(), previous: first_id, current: second_id }
    );

    // The old socket closing must not unregister the new one
    drop(first);
    eventually!(running.gateway.active_connections() == 1);
    assert_eq!(running.gateway.registry().lookup(&imei).await.map(|h| h.id), Some(second_id));

    drop(second);
    eventually!(running.gateway.registry().is_empty().await);
    running.stop().await;
}

#[tokio::test]
async fn unauthenticated_positions_are_not_stored() {
    let running = Running::start(GatewayConfig::default()).await;
    let mut device = TcpStream::connect(running.addr).await.unwrap();

    let format = FrameFormat::default();
    device
        .write_all(&location(format, &position(0x026B_3F3E, 0x0CC1_6559, 0x1400), 1))
        .await
        .unwrap();
    // A heartbeat ack proves the location was processed first
    device
        .write_all(&encode_frame(format, Envelope::Standard, 0x13, &[0x44, 0x04, 0x03], 2).unwrap())
        .await
        .unwrap();
    let ack = read_reply(&mut device, 9).await;
    assert_eq!(ack[3], 0x13);

    let sink = running.stop().await;
    assert!(sink.is_empty().await);
}
