//! # codecgate-params
//!
//! Parameter-set parsing for H.264 and H.265 elementary streams.
//!
//! Given the raw SPS/PPS (and VPS for HEVC) NAL units of a stream, produces a
//! [`CodecDescription`]: a codec identifier string, the coded picture size,
//! and the decoder configuration record a decoder needs to initialize itself.
//! Nothing here performs I/O or decodes picture data.
//!
//! ## Crate structure
//!
//! - [`nal`] — NAL header classification, Annex B framing, parameter-set collection
//! - [`bits`] — Emulation-prevention removal and Exp-Golomb bit reader
//! - [`h264`] — AVC SPS/PPS parsing, `avc1` codec string, `avcC` record
//! - [`h265`] — HEVC VPS/SPS/PPS parsing, `hvc1` codec string, `hvcC` record
//! - [`description`] — Input ([`ParameterSets`]) and output ([`CodecDescription`]) values
//! - [`error`] — [`ParseError`]

pub mod bits;
pub mod description;
pub mod error;
pub mod h264;
pub mod h265;
pub mod nal;

pub use description::{CodecDescription, ParameterSets};
pub use error::ParseError;
pub use h264::parse_h264;
pub use h265::parse_h265;
pub use nal::Codec;

/// Parse a set of parameter units, using the HEVC path when a VPS is present.
pub fn parse(sets: &ParameterSets) -> Result<CodecDescription, ParseError> {
    match &sets.vps {
        Some(vps) => parse_h265(vps, &sets.sps, &sets.pps),
        None => parse_h264(&sets.sps, &sets.pps),
    }
}
