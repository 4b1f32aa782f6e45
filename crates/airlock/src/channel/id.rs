//! Channel identity and addressing.

use chrono::Utc;

use crate::types::Connection;

/// Generate a channel uid: unix seconds plus a 24-bit random hex suffix.
pub fn generate_uid() -> String {
    let suffix = rand::random::<u32>() & 0x00ff_ffff;
    format!("{}-{:06x}", Utc::now().timestamp(), suffix)
}

/// URL commands are PUT to and events are streamed from.
pub fn channel_url(connection: &Connection, uid: &str) -> String {
    format!("{}/~/channel/{}", connection.base_url(), uid)
}
