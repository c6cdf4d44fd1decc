//! EU instruction decode: turning a raw 128-bit Gen9 EU instruction record
//! into a typed, fully-populated `DecodedInst`.

pub mod decode;
pub mod types;

pub use decode::Decoder;
pub use types::{DecodedInst, EuRegion, InstCommon, InstDst, InstSend, InstSrc, RegFile, RegType};
