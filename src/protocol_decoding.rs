//! Pluggable semantic decoding of captured payloads.

pub mod hamlib;
pub mod packet_codec;
pub mod types;

pub use hamlib::HamlibDecoder;
pub use packet_codec::{Decoder, PacketCodec};
pub use types::ProtocolMode;
