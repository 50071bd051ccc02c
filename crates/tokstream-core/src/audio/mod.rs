//! Audio frame handling

mod encoder;
mod frame;

pub use encoder::encode_wav;
pub use frame::{AudioFrame, PrefixTrimmer, BYTES_PER_SAMPLE};
