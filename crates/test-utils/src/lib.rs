//! Test support for the RTGS SDK.
//!
//! - [`MockHub`]: an in-memory [`HubConnector`](rtgs_sdk::HubConnector) that
//!   records what the client writes and lets a test play the hub's side.
//! - [`HandlerSet`]: a full set of recording subscriber handlers.
//! - [`LogCapture`]: a tracing layer for asserting on emitted events.

mod handlers;
mod hub;
mod logs;

pub use handlers::{HandlerSet, RecordingHandler, inbound_frame, settle};
pub use hub::{MockHub, RECV_TIMEOUT};
pub use logs::{CapturedEvent, LogCapture};
