//! Headless signaling client for Jitsi-style conference bridges.
//!
//! The library negotiates an authenticated stream over a WebSocket text
//! channel, joins a room, advertises capabilities, answers the bridge's
//! Jingle offer with locally gathered ICE candidates and a fresh DTLS
//! identity, and keeps the session alive with heartbeats and presence
//! tracking. Media transport itself is out of scope; the session state
//! (SSRC map, codecs, certificate PEMs) is handed to the embedder.

pub mod caps;
pub mod conference;
pub mod crypto;
pub mod ice;
pub mod jingle;
pub mod keepalive;
pub mod negotiator;
pub mod request;
pub mod session;
pub mod transport;
pub mod types;
pub mod xml;
