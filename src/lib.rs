//! Host-side tooling for devices speaking the 64-byte HID message framing
//! protocol. The protocol engine itself lives in `hidlink-transport`.

pub mod bench;
pub mod config;
