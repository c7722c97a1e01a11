/// Session protocol
///
/// Length-prefixed CBOR envelopes over a long-lived TCP connection. Each
/// connection keeps its own idempotency cache keyed by request id so a
/// client may resend a request after a network hiccup and get the exact
/// same bytes back.

mod cache;
mod envelope;
mod frame;
mod server;

pub use cache::{ResponseCache, DEFAULT_CACHE_CAPACITY};
pub use envelope::{
    decode_request, encode_response, DecodeError, ErrorInfo, RequestBody, RequestEnvelope,
    ResponseBody, ResponseEnvelope, PROTOCOL_VERSION,
};
pub use frame::{read_frame, write_frame, FrameError, DEFAULT_MAX_FRAME_LEN};
pub use server::{RequestHandler, SessionServer, SessionService};

use serde::{Deserialize, Serialize};

/// Result code carried in every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Ok,
    Unauthorized,
    InvalidArgument,
    Internal,
}
