//! Ping-pong throughput measurement
//!
//! One pre-encoded single-packet probe is sent over and over; every round
//! trip moves one packet each way, plus an ack packet when acks are enabled.

use std::time::{Duration, Instant};

use hidlink_transport::protocol::PACKET_SIZE;
use hidlink_transport::{Message, ProtocolError, Session};
use tracing::info;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Bytes moved during one reporting interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    /// Host-to-device bytes per second
    pub unidirectional: u64,
    /// Bytes per second over all directions, acks included
    pub cumulated: u64,
}

/// Counts round trips and turns them into per-interval rates
#[derive(Debug)]
pub struct ThroughputCounter {
    ack_enabled: bool,
    window_start: Instant,
    window_bytes: u64,
    total_round_trips: u64,
}

impl ThroughputCounter {
    pub fn new(ack_enabled: bool, now: Instant) -> Self {
        Self {
            ack_enabled,
            window_start: now,
            window_bytes: 0,
            total_round_trips: 0,
        }
    }

    pub fn record_round_trip(&mut self) {
        self.window_bytes += PACKET_SIZE as u64;
        self.total_round_trips += 1;
    }

    pub fn total_round_trips(&self) -> u64 {
        self.total_round_trips
    }

    fn rate(&self) -> Rate {
        let factor = if self.ack_enabled { 3 } else { 2 };
        Rate {
            unidirectional: self.window_bytes,
            cumulated: self.window_bytes * factor,
        }
    }

    /// Close the current window once a full interval has passed
    pub fn tick(&mut self, now: Instant) -> Option<Rate> {
        if now.duration_since(self.window_start) < REPORT_INTERVAL {
            return None;
        }
        let rate = self.rate();
        self.window_start = now;
        self.window_bytes = 0;
        Some(rate)
    }
}

/// Result of a finished benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub round_trips: u64,
    pub elapsed: Duration,
}

/// Run ping-pong round trips with `probe` for `duration`, or until the
/// session's cancel token fires. `on_rate` is called once per interval.
pub fn run(
    session: &Session,
    probe: &Message,
    duration: Duration,
    mut on_rate: impl FnMut(Rate),
) -> Result<Summary, ProtocolError> {
    let stream = session.prepare(probe)?;
    let start = Instant::now();
    let mut counter = ThroughputCounter::new(session.config().ack_enabled, start);
    info!(
        "Benchmarking with {} byte probe for {:?}",
        probe.len(),
        duration
    );

    while start.elapsed() < duration && !session.cancel_token().is_cancelled() {
        session.ping_pong(&stream)?;
        counter.record_round_trip();
        if let Some(rate) = counter.tick(Instant::now()) {
            on_rate(rate);
        }
    }

    Ok(Summary {
        round_trips: counter.total_round_trips(),
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use hidlink_transport::{
        cmd, CancelToken, FlipBit, SessionConfig, Transport, TransportDeviceInfo, TransportError,
    };

    /// Answers every packet with itself
    #[derive(Default)]
    struct Loopback {
        info: TransportDeviceInfo,
        last: Mutex<Option<Vec<u8>>>,
    }

    impl Transport for Loopback {
        fn send_packet(&self, packet: &[u8]) -> Result<(), TransportError> {
            *self.last.lock().unwrap() = Some(packet.to_vec());
            Ok(())
        }

        fn read_packet(&self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
            self.last.lock().unwrap().clone().ok_or(TransportError::Timeout)
        }

        fn reset(&self) -> Result<(), TransportError> {
            Ok(())
        }

        fn dispose(&self) -> Result<(), TransportError> {
            Ok(())
        }

        fn device_info(&self) -> &TransportDeviceInfo {
            &self.info
        }
    }

    #[test]
    fn test_counter_without_ack() {
        let start = Instant::now();
        let mut counter = ThroughputCounter::new(false, start);
        for _ in 0..10 {
            counter.record_round_trip();
        }
        assert_eq!(counter.tick(start + Duration::from_millis(999)), None);
        assert_eq!(
            counter.tick(start + Duration::from_secs(1)),
            Some(Rate {
                unidirectional: 640,
                cumulated: 1280
            })
        );
        // Window restarts after each report
        assert_eq!(counter.tick(start + Duration::from_millis(1500)), None);
        assert_eq!(counter.total_round_trips(), 10);
    }

    #[test]
    fn test_counter_with_ack() {
        let start = Instant::now();
        let mut counter = ThroughputCounter::new(true, start);
        counter.record_round_trip();
        let rate = counter.tick(start + Duration::from_secs(2)).unwrap();
        assert_eq!(rate.unidirectional, 64);
        assert_eq!(rate.cumulated, 192);
    }

    #[test]
    fn test_run_against_loopback() {
        let transport = Arc::new(Loopback::default());
        let config = SessionConfig::default().with_packet_settle(Duration::ZERO);
        let session = Session::resume(transport, config, CancelToken::new(), FlipBit::Set);

        let probe = Message::new(cmd::PING, vec![1, 2, 3, 4]);
        let summary = run(&session, &probe, Duration::from_millis(20), |_| {}).unwrap();
        assert!(summary.round_trips > 0);
        assert_eq!(session.next_flip_bit(), FlipBit::Clear);
    }

    #[test]
    fn test_run_stops_when_cancelled() {
        let transport = Arc::new(Loopback::default());
        let cancel = CancelToken::new();
        cancel.cancel();
        let session = Session::resume(transport, SessionConfig::default(), cancel, FlipBit::Clear);

        let probe = Message::new(cmd::PING, vec![0; 4]);
        let summary = run(&session, &probe, Duration::from_secs(60), |_| {}).unwrap();
        assert_eq!(summary.round_trips, 0);
    }
}
