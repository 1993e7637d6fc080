//! Scripted in-memory transport for tests and dry runs
//!
//! Replies are queued up front and handed out one per read; an empty queue
//! reads as a timeout. Every packet written is recorded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::codec::encode;
use crate::error::TransportError;
use crate::types::{FlipBit, Message, TransportDeviceInfo};
use crate::Transport;

/// One scripted read result
#[derive(Debug, Clone)]
pub enum MockReply {
    Packet(Vec<u8>),
    Timeout,
    Error(String),
}

/// Transport double that replays queued replies
pub struct MockTransport {
    info: TransportDeviceInfo,
    replies: Mutex<VecDeque<MockReply>>,
    sent: Mutex<Vec<Vec<u8>>>,
    failing_sends: AtomicU32,
    resets: AtomicUsize,
    disposed: AtomicBool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            info: TransportDeviceInfo {
                device_path: "mock".into(),
                ..Default::default()
            },
            replies: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            failing_sends: AtomicU32::new(0),
            resets: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn push_reply(&self, reply: MockReply) {
        self.replies.lock().push_back(reply);
    }

    pub fn push_packet(&self, bytes: impl Into<Vec<u8>>) {
        self.push_reply(MockReply::Packet(bytes.into()));
    }

    /// Queue every packet of a device-to-host message.
    ///
    /// Panics if the message does not fit a packet stream.
    pub fn push_message(&self, message: &Message) {
        let stream = encode(message, FlipBit::Clear, false).expect("mock message too large");
        for packet in stream.iter() {
            self.push_packet(packet.as_bytes());
        }
    }

    pub fn push_timeout(&self) {
        self.push_reply(MockReply::Timeout);
    }

    /// Make the next `n` sends fail
    pub fn fail_next_sends(&self, n: u32) {
        self.failing_sends.store(n, Ordering::SeqCst);
    }

    /// Everything written so far
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    pub fn pending_replies(&self) -> usize {
        self.replies.lock().len()
    }

    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn send_packet(&self, packet: &[u8]) -> Result<(), TransportError> {
        if self.is_disposed() {
            return Err(TransportError::Disconnected);
        }
        let failing = self.failing_sends.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_sends.store(failing - 1, Ordering::SeqCst);
            return Err(TransportError::HidError("scripted send failure".into()));
        }
        self.sent.lock().push(packet.to_vec());
        Ok(())
    }

    fn read_packet(&self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if self.is_disposed() {
            return Err(TransportError::Disconnected);
        }
        match self.replies.lock().pop_front() {
            Some(MockReply::Packet(bytes)) => Ok(bytes),
            Some(MockReply::Error(msg)) => Err(TransportError::HidError(msg)),
            Some(MockReply::Timeout) | None => Err(TransportError::Timeout),
        }
    }

    fn reset(&self) -> Result<(), TransportError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn dispose(&self) -> Result<(), TransportError> {
        self.disposed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}
