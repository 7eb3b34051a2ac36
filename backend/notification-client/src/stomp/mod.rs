/// STOMP 1.2 framing for the live notification channel
///
/// The broker speaks STOMP over WebSocket text messages. This module only
/// covers framing; session flow (CONNECT, SUBSCRIBE, RECEIPT) lives in
/// `websocket::connector`.
pub mod frame;

pub use frame::{Command, Frame, FrameOrHeartbeat, StompError};
