//! Wire protocol: frame codec plus typed message payloads.

pub mod codec;
pub mod message;

pub use codec::{command_bytes, double_sha256, encode_frame, write_frame, Frame, FrameReader};
