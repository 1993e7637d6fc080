//! Tests against a real device (pid.codes 1209:4321 by default).
//!
//! Run manually with: cargo test -p hidlink-transport --test hardware -- --ignored

use std::sync::Arc;
use std::time::Duration;

use hidlink_transport::protocol::timing;
use hidlink_transport::{cmd, CancelToken, HidTransport, Message, Session, SessionConfig};

const VID: u16 = 0x1209;
const PID: u16 = 0x4321;

fn connect(probe: &Message) -> Session {
    let transport = HidTransport::open_first(VID, PID).expect("no device attached");
    std::thread::sleep(Duration::from_millis(timing::POST_OPEN_DELAY_MS));
    Session::connect(
        Arc::new(transport),
        probe,
        SessionConfig::default(),
        CancelToken::new(),
    )
    .expect("handshake failed")
}

#[test]
#[ignore] // requires hardware
fn ping_round_trip() {
    let probe = Message::new(cmd::PING, vec![0xA5, 0x5A, 0x01, 0x02]);
    let session = connect(&probe);
    let reply = session.request(&probe, true).unwrap();
    assert_eq!(reply, probe);
    session.disconnect().unwrap();
}

#[test]
#[ignore] // requires hardware
fn status_query() {
    let session = connect(&Message::new(cmd::PING, vec![1, 2, 3, 4]));
    let reply = session
        .request(&Message::empty(cmd::GET_DEVICE_STATUS), true)
        .unwrap();
    assert_eq!(reply.command(), cmd::GET_DEVICE_STATUS);
    session.disconnect().unwrap();
}
