//! Concrete pose sources.
//!
//! - [`ReplayPoseSource`] hands out a fixed list of poses, one per query.
//! - [`UdpPoseSource`] listens for a localization pose stream and reports
//!   the most recent datagram.
//!
//! Pose datagrams are UTF-8 text holding `x y theta`, `x,y,theta`, a JSON
//! array `[x, y, theta]` or a JSON object `{"x": .., "y": .., "theta": ..}`.
//! The heading may be omitted.

use std::{
    collections::VecDeque,
    io,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use mapcal_session::{Pose, PoseQueryError, PoseSource};
use serde::{Deserialize, Serialize};

/// Maximum UDP datagram size.
const MAX_DATAGRAM_SIZE: usize = 65536;

/// Read timeout of the receiver thread, bounding how long shutdown takes.
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const DEFAULT_POSE_BIND: &str = "0.0.0.0:5600";
pub const DEFAULT_POSE_TIMEOUT_MS: u64 = 2000;

/// Where poses come from, as written in the project file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoseSourceConfig {
    /// Recorded poses, consumed one per capture.
    Replay { poses: Vec<[f64; 3]> },
    /// Live pose stream.
    Udp {
        #[serde(default = "default_bind")]
        bind: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_bind() -> String {
    DEFAULT_POSE_BIND.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_POSE_TIMEOUT_MS
}

impl Default for PoseSourceConfig {
    fn default() -> Self {
        Self::Udp {
            bind: default_bind(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl PoseSourceConfig {
    /// Open the configured source.
    pub fn connect(&self) -> Result<Box<dyn PoseSource>, PoseQueryError> {
        match self {
            Self::Replay { poses } => {
                log::info!("replaying {} recorded poses", poses.len());
                Ok(Box::new(ReplayPoseSource::new(poses.iter().copied())))
            }
            Self::Udp { bind, timeout_ms } => {
                let timeout = Duration::from_millis(*timeout_ms);
                Ok(Box::new(UdpPoseSource::bind(bind.as_str(), timeout)?))
            }
        }
    }
}

/// Hands out recorded poses in order.
#[derive(Clone, Debug, Default)]
pub struct ReplayPoseSource {
    poses: VecDeque<Pose>,
    served: usize,
}

impl ReplayPoseSource {
    pub fn new<P: Into<Pose>>(poses: impl IntoIterator<Item = P>) -> Self {
        Self {
            poses: poses.into_iter().map(Into::into).collect(),
            served: 0,
        }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.poses.len()
    }
}

impl PoseSource for ReplayPoseSource {
    fn current_pose(&mut self) -> Result<Pose, PoseQueryError> {
        let Some(pose) = self.poses.pop_front() else {
            let reason = format!("recorded poses exhausted after {}", self.served);
            return Err(PoseQueryError::Unavailable(reason));
        };
        self.served += 1;
        Ok(pose)
    }
}

/// Most recent datagram seen by the receiver thread.
#[derive(Debug)]
struct Reading {
    received: Instant,
    /// Decoded pose, or why the datagram was rejected.
    pose: Result<Pose, String>,
}

/// Latest reading plus a condvar signalled on every new datagram.
type LatestReading = Arc<(Mutex<Option<Reading>>, Condvar)>;

/// Reports the latest pose received on a UDP socket.
///
/// A background thread reads the socket continuously and keeps only the
/// newest datagram, so the kernel buffer never fills up with old poses.
/// A query returns that datagram when it is at most `timeout` old and
/// otherwise waits up to `timeout` for a new one.
pub struct UdpPoseSource {
    latest: LatestReading,
    running: Arc<AtomicBool>,
    local_addr: SocketAddr,
    timeout: Duration,
    worker: Option<JoinHandle<()>>,
}

impl UdpPoseSource {
    pub fn bind(addr: impl ToSocketAddrs, timeout: Duration) -> Result<Self, PoseQueryError> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(RECV_POLL_INTERVAL))?;
        let local_addr = socket.local_addr()?;

        let latest = LatestReading::default();
        let running = Arc::new(AtomicBool::new(true));
        let worker = thread::Builder::new()
            .name("mapcal-pose-rx".into())
            .spawn({
                let latest = Arc::clone(&latest);
                let running = Arc::clone(&running);
                move || receive_loop(&socket, &latest, &running)
            })?;

        log::info!("listening for poses on {local_addr}");
        Ok(Self {
            latest,
            running,
            local_addr,
            timeout,
            worker: Some(worker),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl PoseSource for UdpPoseSource {
    fn current_pose(&mut self) -> Result<Pose, PoseQueryError> {
        let timeout = self.timeout;
        let is_stale = |slot: &mut Option<Reading>| {
            slot.as_ref()
                .is_none_or(|reading| reading.received.elapsed() > timeout)
        };

        let (slot, fresh) = &*self.latest;
        let guard = slot.lock().map_err(|_| receiver_stopped())?;
        let (guard, _) = fresh
            .wait_timeout_while(guard, timeout, is_stale)
            .map_err(|_| receiver_stopped())?;

        let reading = guard
            .as_ref()
            .filter(|reading| reading.received.elapsed() <= timeout)
            .ok_or(PoseQueryError::Timeout(timeout))?;
        match &reading.pose {
            Ok(pose) => {
                log::debug!("pose ({:.4}, {:.4}, {:.4})", pose.x, pose.y, pose.theta);
                Ok(*pose)
            }
            Err(reason) => Err(PoseQueryError::Malformed(reason.clone())),
        }
    }
}

impl Drop for UdpPoseSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn receiver_stopped() -> PoseQueryError {
    PoseQueryError::Unavailable("pose receiver thread stopped".into())
}

fn receive_loop(
    socket: &UdpSocket,
    latest: &(Mutex<Option<Reading>>, Condvar),
    running: &AtomicBool,
) {
    let (slot, fresh) = latest;
    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

    while running.load(Ordering::Relaxed) {
        let len = match socket.recv(&mut buffer) {
            Ok(len) => len,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                log::error!("pose receive error: {e}");
                continue;
            }
        };

        let pose = decode_datagram(&buffer[..len], buffer.len()).map_err(|e| match e {
            PoseQueryError::Malformed(reason) => reason,
            other => other.to_string(),
        });
        if let Err(reason) = &pose {
            log::debug!("rejected pose datagram: {reason}");
        }

        let Ok(mut guard) = slot.lock() else {
            log::error!("pose slot poisoned, receiver stopping");
            return;
        };
        *guard = Some(Reading {
            received: Instant::now(),
            pose,
        });
        drop(guard);
        fresh.notify_all();
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Decode one datagram read into a buffer of `capacity` bytes.
///
/// A datagram filling the whole buffer may have been cut short and is
/// rejected.
fn decode_datagram(bytes: &[u8], capacity: usize) -> Result<Pose, PoseQueryError> {
    if bytes.len() >= capacity {
        return Err(PoseQueryError::Malformed(format!(
            "datagram of {} bytes may be truncated",
            bytes.len()
        )));
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|e| PoseQueryError::Malformed(format!("not UTF-8: {e}")))?;
    parse_pose(text)
}

/// Parse one pose message.
pub fn parse_pose(text: &str) -> Result<Pose, PoseQueryError> {
    let text = text.trim();
    if text.starts_with('{') {
        return serde_json::from_str(text).map_err(|e| PoseQueryError::Malformed(e.to_string()));
    }

    let body = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .unwrap_or(text);
    let values = body
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PoseQueryError::Malformed(format!("{text:?}: {e}")))?;

    match values[..] {
        [x, y] => Ok(Pose::new(x, y, 0.0)),
        [x, y, theta] => Ok(Pose::new(x, y, theta)),
        _ => Err(PoseQueryError::Malformed(format!(
            "expected 2 or 3 numbers, got {}",
            values.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udp_source(timeout: Duration) -> (UdpPoseSource, UdpSocket) {
        let source = UdpPoseSource::bind("127.0.0.1:0", timeout).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.connect(source.local_addr()).unwrap();
        (source, sender)
    }

    fn settle() {
        thread::sleep(Duration::from_millis(100));
    }

    #[test]
    fn parses_supported_pose_formats() {
        let expected = Pose::new(1.5, -2.0, 0.25);
        for text in [
            "1.5 -2.0 0.25",
            "1.5,-2.0,0.25",
            "[1.5, -2.0, 0.25]\n",
            r#"{"x": 1.5, "y": -2.0, "theta": 0.25}"#,
        ] {
            assert_eq!(parse_pose(text).unwrap(), expected, "{text:?}");
        }
        assert_eq!(parse_pose("3 4").unwrap(), Pose::new(3.0, 4.0, 0.0));
    }

    #[test]
    fn rejects_malformed_poses() {
        for text in ["", "1", "1 2 3 4", "x y", "[1, 2", r#"{"x": 1}"#] {
            assert!(
                matches!(parse_pose(text), Err(PoseQueryError::Malformed(_))),
                "{text:?}"
            );
        }
    }

    #[test]
    fn datagram_filling_the_buffer_is_rejected() {
        let full = [b'1'; 16];
        assert!(matches!(
            decode_datagram(&full, full.len()),
            Err(PoseQueryError::Malformed(_))
        ));
        assert_eq!(
            decode_datagram(b"1 2 0", 16).unwrap(),
            Pose::new(1.0, 2.0, 0.0)
        );
        assert!(matches!(
            decode_datagram(&[0xff, 0xfe], 16),
            Err(PoseQueryError::Malformed(_))
        ));
    }

    #[test]
    fn replay_serves_in_order_then_runs_dry() {
        let mut source = ReplayPoseSource::new([[1.0, 2.0, 0.0], [3.0, 4.0, 0.5]]);
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.current_pose().unwrap(), Pose::new(1.0, 2.0, 0.0));
        assert_eq!(source.current_pose().unwrap(), Pose::new(3.0, 4.0, 0.5));
        assert!(matches!(
            source.current_pose(),
            Err(PoseQueryError::Unavailable(_))
        ));
    }

    #[test]
    fn udp_source_reports_latest_datagram() {
        let (mut source, sender) = udp_source(Duration::from_secs(2));
        sender.send(b"1 1 0").unwrap();
        sender.send(b"2,3,0.5").unwrap();
        settle();

        assert_eq!(source.current_pose().unwrap(), Pose::new(2.0, 3.0, 0.5));
    }

    #[test]
    fn udp_source_keeps_up_with_a_long_stream() {
        let (mut source, sender) = udp_source(Duration::from_secs(2));
        // Minutes of a 10 Hz stream nobody queried, far more than the
        // socket buffer holds.
        for i in 0..3000 {
            sender.send(format!("{i} 0 0").as_bytes()).unwrap();
        }
        settle();
        sender.send(b"3000 0 0").unwrap();
        settle();

        assert_eq!(source.current_pose().unwrap().x, 3000.0);
    }

    #[test]
    fn udp_source_waits_for_the_next_datagram() {
        let (mut source, sender) = udp_source(Duration::from_secs(2));
        let late = thread::spawn(move || {
            settle();
            sender.send(b"4 5 0").unwrap();
        });

        assert_eq!(source.current_pose().unwrap(), Pose::new(4.0, 5.0, 0.0));
        late.join().unwrap();
    }

    #[test]
    fn udp_source_times_out_without_traffic() {
        let (mut source, _sender) = udp_source(Duration::from_millis(50));
        assert!(matches!(
            source.current_pose(),
            Err(PoseQueryError::Timeout(_))
        ));
    }

    #[test]
    fn udp_source_refuses_poses_older_than_the_timeout() {
        let (mut source, sender) = udp_source(Duration::from_millis(100));
        sender.send(b"1 1 0").unwrap();
        thread::sleep(Duration::from_millis(300));

        assert!(matches!(
            source.current_pose(),
            Err(PoseQueryError::Timeout(_))
        ));
    }

    #[test]
    fn udp_source_reports_malformed_latest_datagram() {
        let (mut source, sender) = udp_source(Duration::from_secs(2));
        sender.send(b"1 1 0").unwrap();
        sender.send(b"not a pose").unwrap();
        settle();

        assert!(matches!(
            source.current_pose(),
            Err(PoseQueryError::Malformed(_))
        ));
    }

    #[test]
    fn config_defaults_and_tags() {
        let udp: PoseSourceConfig = serde_json::from_str(r#"{"kind": "udp"}"#).unwrap();
        assert_eq!(udp, PoseSourceConfig::default());

        let replay: PoseSourceConfig =
            serde_json::from_str(r#"{"kind": "replay", "poses": [[0, 1, 2]]}"#).unwrap();
        assert_eq!(
            replay,
            PoseSourceConfig::Replay {
                poses: vec![[0.0, 1.0, 2.0]]
            }
        );
        let mut source = replay.connect().unwrap();
        assert_eq!(source.current_pose().unwrap(), Pose::new(0.0, 1.0, 2.0));
    }
}
