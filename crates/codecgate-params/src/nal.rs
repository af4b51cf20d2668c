//! # NAL Unit Headers & Annex B Framing
//!
//! Classifies NAL units from H.264 (AVC) and H.265 (HEVC) bitstreams and
//! splits Annex B elementary streams into units, so parameter sets can be
//! pulled out of a raw `.h264`/`.h265` file.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::description::ParameterSets;
use crate::error::ParseError;

/// Codec family of a bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    H264,
    H265,
}

impl Codec {
    pub fn name(self) -> &'static str {
        match self {
            Codec::H264 => "H.264",
            Codec::H265 => "H.265",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "h.264" | "avc" => Ok(Codec::H264),
            "h265" | "h.265" | "hevc" => Ok(Codec::H265),
            other => Err(format!("unknown codec {other:?}")),
        }
    }
}

/// H.264 NAL unit types used here.
pub mod avc_type {
    pub const IDR: u8 = 5;
    pub const SPS: u8 = 7;
    pub const PPS: u8 = 8;
}

/// H.265 NAL unit types used here.
pub mod hevc_type {
    pub const BLA_W_LP: u8 = 16;
    pub const CRA: u8 = 21;
    pub const VPS: u8 = 32;
    pub const SPS: u8 = 33;
    pub const PPS: u8 = 34;
}

/// Role of a NAL unit within the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalClass {
    /// VPS, SPS or PPS.
    ParameterSet,
    /// IDR, CRA or BLA slice.
    Keyframe,
    /// Any other slice data.
    Slice,
    /// SEI, delimiters, filler and reserved types.
    Other,
}

/// Decoded NAL unit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    pub nal_type: u8,
    pub codec: Codec,
    pub class: NalClass,
}

/// Parse the NAL unit header at the start of `unit`.
///
/// H.264 headers are 1 byte: `forbidden(1) | nal_ref_idc(2) | nal_type(5)`.
/// H.265 headers are 2 bytes: `forbidden(1) | nal_type(6) | layer_id(6) | tid(3)`.
///
/// Returns `None` if the unit is too short for its header.
pub fn parse_header(unit: &[u8], codec: Codec) -> Option<NalHeader> {
    let nal_type = match codec {
        Codec::H264 => unit.first()? & 0x1F,
        Codec::H265 => {
            if unit.len() < 2 {
                return None;
            }
            (unit[0] >> 1) & 0x3F
        }
    };
    Some(NalHeader {
        nal_type,
        codec,
        class: classify(nal_type, codec),
    })
}

fn classify(nal_type: u8, codec: Codec) -> NalClass {
    match codec {
        Codec::H264 => match nal_type {
            avc_type::SPS | avc_type::PPS | 13 => NalClass::ParameterSet,
            avc_type::IDR => NalClass::Keyframe,
            1..=4 => NalClass::Slice,
            _ => NalClass::Other,
        },
        Codec::H265 => match nal_type {
            hevc_type::VPS | hevc_type::SPS | hevc_type::PPS => NalClass::ParameterSet,
            hevc_type::BLA_W_LP..=hevc_type::CRA => NalClass::Keyframe,
            0..=9 => NalClass::Slice,
            _ => NalClass::Other,
        },
    }
}

/// Find the next start code at or after `from`.
///
/// Returns `(position, length)`; the 4-byte form `00 00 00 01` is preferred
/// over the 3-byte `00 00 01` it contains.
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 {
            if data[i + 2] == 0x01 {
                return Some((i, 3));
            }
            if data[i + 2] == 0x00 && data.get(i + 3) == Some(&0x01) {
                return Some((i, 4));
            }
        }
        i += 1;
    }
    None
}

/// Iterator over the NAL units of an Annex B stream, without start codes.
///
/// Bytes before the first start code are ignored. A NAL unit never ends in
/// `0x00`, so trailing zero bytes (`trailing_zero_8bits`, or the leading zero
/// of a 4-byte start code) are trimmed off each unit.
pub struct AnnexBUnits<'a> {
    data: &'a [u8],
    cursor: Option<usize>,
}

impl<'a> AnnexBUnits<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let cursor = find_start_code(data, 0).map(|(pos, len)| pos + len);
        Self { data, cursor }
    }
}

impl<'a> Iterator for AnnexBUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let start = self.cursor?;
            let end = match find_start_code(self.data, start) {
                Some((pos, len)) => {
                    self.cursor = Some(pos + len);
                    pos
                }
                None => {
                    self.cursor = None;
                    self.data.len()
                }
            };
            let unit = &self.data[start..end];
            let len = unit.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
            if len > 0 {
                return Some(&unit[..len]);
            }
        }
    }
}

/// Guess the codec of an Annex B stream from its first parameter set.
pub fn detect_codec(stream: &[u8]) -> Option<Codec> {
    for unit in AnnexBUnits::new(stream) {
        if unit[0] & 0x80 != 0 {
            continue;
        }
        // An H.264 slice with nal_ref_idc 2 (0x41) shares the VPS type bits,
        // so a VPS also needs nuh_layer_id 0 and a nonzero temporal id.
        if is_hevc_vps_header(unit) {
            return Some(Codec::H265);
        }
        if unit[0] & 0x1F == avc_type::SPS {
            return Some(Codec::H264);
        }
    }
    None
}

fn is_hevc_vps_header(unit: &[u8]) -> bool {
    let &[first, second, ..] = unit else {
        return false;
    };
    let nal_type = (first >> 1) & 0x3F;
    let layer_id = (u16::from(first & 0x01) << 5) | u16::from(second >> 3);
    let temporal_id_plus1 = second & 0x07;
    nal_type == hevc_type::VPS && layer_id == 0 && temporal_id_plus1 != 0
}

/// Counts of unit classes seen in a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamCensus {
    pub units: usize,
    pub parameter_sets: usize,
    pub keyframes: usize,
    pub slices: usize,
}

/// Tally the NAL units of an Annex B stream by class.
pub fn census(stream: &[u8], codec: Codec) -> StreamCensus {
    let mut census = StreamCensus::default();
    for unit in AnnexBUnits::new(stream) {
        census.units += 1;
        match parse_header(unit, codec).map(|h| h.class) {
            Some(NalClass::ParameterSet) => census.parameter_sets += 1,
            Some(NalClass::Keyframe) => census.keyframes += 1,
            Some(NalClass::Slice) => census.slices += 1,
            _ => {}
        }
    }
    census
}

/// Pull the first VPS/SPS/PPS out of an Annex B stream.
///
/// The returned sets are zero-copy views into `stream`. For H.264 no VPS is
/// collected; for H.265 a VPS is required.
pub fn collect_parameter_sets(stream: &Bytes, codec: Codec) -> Result<ParameterSets, ParseError> {
    let mut vps = None;
    let mut sps = None;
    let mut pps = None;

    for unit in AnnexBUnits::new(stream) {
        let Some(header) = parse_header(unit, codec) else {
            continue;
        };
        let slot = match (codec, header.nal_type) {
            (Codec::H264, avc_type::SPS) | (Codec::H265, hevc_type::SPS) => &mut sps,
            (Codec::H264, avc_type::PPS) | (Codec::H265, hevc_type::PPS) => &mut pps,
            (Codec::H265, hevc_type::VPS) => &mut vps,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(stream.slice_ref(unit));
        }
        let have_vps = codec == Codec::H264 || vps.is_some();
        if have_vps && sps.is_some() && pps.is_some() {
            break;
        }
    }

    let sps = sps.ok_or(ParseError::Missing { unit: "SPS" })?;
    let pps = pps.ok_or(ParseError::Missing { unit: "PPS" })?;
    match codec {
        Codec::H264 => Ok(ParameterSets::avc(sps, pps)),
        Codec::H265 => {
            let vps = vps.ok_or(ParseError::Missing { unit: "VPS" })?;
            Ok(ParameterSets::hevc(vps, sps, pps))
        }
    }
}
