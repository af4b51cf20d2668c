//! # H.265/HEVC Parameter Sets
//!
//! Reads `profile_tier_level()` and picture geometry from the SPS, validates
//! the VPS and PPS headers, and emits the `hvc1` codec string (ISO/IEC
//! 14496-15 Annex E) plus an `HEVCDecoderConfigurationRecord` (`hvcC`).
//!
//! HEVC NAL headers are 2 bytes and the general profile/tier/level block is a
//! fixed 12 bytes, so unlike H.264 the interesting fields sit behind
//! emulation-prevention bytes in practice (`00 00 03` inside the constraint
//! flags).

use std::fmt::Write as _;

use bytes::{BufMut, BytesMut};

use crate::bits::{BitReader, to_rbsp};
use crate::description::{CodecDescription, put_nal_unit};
use crate::error::ParseError;
use crate::nal::hevc_type;

/// 2-byte header, 4 bytes of VPS fields, 12 bytes of general PTL.
pub const MIN_VPS_LEN: usize = 18;
/// 2-byte header, 1 byte of SPS fields, 12 bytes of general PTL.
pub const MIN_SPS_LEN: usize = 15;
/// 2-byte header plus at least one RBSP byte.
pub const MIN_PPS_LEN: usize = 3;

/// Highest general_profile_idc defined (High Throughput SCC).
const MAX_PROFILE_IDC: u8 = 11;

/// General profile, tier and level of a coded video sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTierLevel {
    pub profile_space: u8,
    pub tier_flag: bool,
    pub profile_idc: u8,
    pub compatibility_flags: u32,
    pub constraint_flags: [u8; 6],
    pub level_idc: u8,
}

/// Video parameter set fields used for validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcVps {
    pub vps_id: u8,
    pub max_sub_layers_minus1: u8,
    pub ptl: ProfileTierLevel,
}

/// Sequence parameter set fields needed to configure a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcSps {
    pub vps_id: u8,
    pub sps_id: u32,
    pub max_sub_layers_minus1: u8,
    pub temporal_id_nesting: bool,
    pub ptl: ProfileTierLevel,
    pub chroma_format_idc: u32,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub width: u32,
    pub height: u32,
}

fn check_header(nal: &[u8], unit: &'static str, min_len: usize, expected: u8) -> Result<(), ParseError> {
    if nal.len() < min_len {
        return Err(ParseError::Truncated {
            unit,
            needed: min_len,
            actual: nal.len(),
        });
    }
    if nal[0] & 0x80 != 0 {
        return Err(ParseError::ForbiddenBit { unit });
    }
    let found = (nal[0] >> 1) & 0x3F;
    if found != expected {
        return Err(ParseError::UnexpectedNalType {
            unit,
            expected,
            found,
        });
    }
    let temporal_id_plus1 = nal[1] & 0x07;
    if temporal_id_plus1 == 0 {
        return Err(ParseError::OutOfRange {
            unit,
            field: "nuh_temporal_id_plus1",
            value: 0,
        });
    }
    Ok(())
}

fn read_max_sub_layers(r: &mut BitReader<'_>, field: &'static str) -> Result<u8, ParseError> {
    let value = r.read_bits(3, field)?;
    if value > 6 {
        return Err(r.out_of_range(field, value.into()));
    }
    Ok(value as u8)
}

/// Parse `profile_tier_level(1, max_sub_layers_minus1)`.
fn parse_ptl(r: &mut BitReader<'_>, max_sub_layers_minus1: u8) -> Result<ProfileTierLevel, ParseError> {
    let profile_space = r.read_bits(2, "general_profile_space")? as u8;
    let tier_flag = r.read_flag("general_tier_flag")?;
    let profile_idc = r.read_bits(5, "general_profile_idc")? as u8;
    let compatibility_flags = r.read_bits(32, "general_profile_compatibility_flags")?;
    let mut constraint_flags = [0u8; 6];
    for byte in &mut constraint_flags {
        *byte = r.read_u8("general_constraint_indicator_flags")?;
    }
    let level_idc = r.read_u8("general_level_idc")?;

    let sub_layers = usize::from(max_sub_layers_minus1);
    let mut present = [(false, false); 6];
    for entry in present.iter_mut().take(sub_layers) {
        entry.0 = r.read_flag("sub_layer_profile_present_flag")?;
        entry.1 = r.read_flag("sub_layer_level_present_flag")?;
    }
    if sub_layers > 0 {
        r.skip_bits(2 * (8 - sub_layers), "reserved_zero_2bits")?;
    }
    for &(profile_present, level_present) in present.iter().take(sub_layers) {
        if profile_present {
            r.skip_bits(88, "sub_layer_profile")?;
        }
        if level_present {
            r.skip_bits(8, "sub_layer_level_idc")?;
        }
    }

    Ok(ProfileTierLevel {
        profile_space,
        tier_flag,
        profile_idc,
        compatibility_flags,
        constraint_flags,
        level_idc,
    })
}

/// Parse a video parameter set NAL unit (with its 2-byte header).
pub fn parse_vps(nal: &[u8]) -> Result<HevcVps, ParseError> {
    check_header(nal, "VPS", MIN_VPS_LEN, hevc_type::VPS)?;
    let rbsp = to_rbsp(&nal[2..]);
    let mut r = BitReader::new(&rbsp, "VPS");

    let vps_id = r.read_bits(4, "vps_video_parameter_set_id")? as u8;
    r.read_flag("vps_base_layer_internal_flag")?;
    r.read_flag("vps_base_layer_available_flag")?;
    r.read_bits(6, "vps_max_layers_minus1")?;
    let max_sub_layers_minus1 = read_max_sub_layers(&mut r, "vps_max_sub_layers_minus1")?;
    r.read_flag("vps_temporal_id_nesting_flag")?;
    let reserved = r.read_bits(16, "vps_reserved_0xffff_16bits")?;
    if reserved != 0xFFFF {
        return Err(r.out_of_range("vps_reserved_0xffff_16bits", reserved.into()));
    }
    let ptl = parse_ptl(&mut r, max_sub_layers_minus1)?;

    Ok(HevcVps {
        vps_id,
        max_sub_layers_minus1,
        ptl,
    })
}

/// Parse a sequence parameter set NAL unit (with its 2-byte header).
pub fn parse_sps(nal: &[u8]) -> Result<HevcSps, ParseError> {
    check_header(nal, "SPS", MIN_SPS_LEN, hevc_type::SPS)?;
    let rbsp = to_rbsp(&nal[2..]);
    let mut r = BitReader::new(&rbsp, "SPS");

    let vps_id = r.read_bits(4, "sps_video_parameter_set_id")? as u8;
    let max_sub_layers_minus1 = read_max_sub_layers(&mut r, "sps_max_sub_layers_minus1")?;
    let temporal_id_nesting = r.read_flag("sps_temporal_id_nesting_flag")?;
    let ptl = parse_ptl(&mut r, max_sub_layers_minus1)?;
    if ptl.profile_idc == 0 || ptl.profile_idc > MAX_PROFILE_IDC {
        return Err(ParseError::UnsupportedProfile {
            codec: "H.265",
            profile_idc: ptl.profile_idc,
        });
    }

    let sps_id = r.read_ue("sps_seq_parameter_set_id")?;
    if sps_id > 15 {
        return Err(r.out_of_range("sps_seq_parameter_set_id", sps_id.into()));
    }
    let chroma_format_idc = r.read_ue("chroma_format_idc")?;
    if chroma_format_idc > 3 {
        return Err(r.out_of_range("chroma_format_idc", chroma_format_idc.into()));
    }
    let separate_colour_plane = chroma_format_idc == 3 && r.read_flag("separate_colour_plane_flag")?;

    let pic_width = u64::from(r.read_ue("pic_width_in_luma_samples")?);
    let pic_height = u64::from(r.read_ue("pic_height_in_luma_samples")?);
    if pic_width == 0 {
        return Err(r.out_of_range("pic_width_in_luma_samples", 0));
    }
    if pic_height == 0 {
        return Err(r.out_of_range("pic_height_in_luma_samples", 0));
    }

    let (mut left, mut right, mut top, mut bottom) = (0u64, 0u64, 0u64, 0u64);
    if r.read_flag("conformance_window_flag")? {
        left = r.read_ue("conf_win_left_offset")?.into();
        right = r.read_ue("conf_win_right_offset")?.into();
        top = r.read_ue("conf_win_top_offset")?.into();
        bottom = r.read_ue("conf_win_bottom_offset")?.into();
    }

    let bit_depth_luma_minus8 = r.read_ue("bit_depth_luma_minus8")?;
    if bit_depth_luma_minus8 > 8 {
        return Err(r.out_of_range("bit_depth_luma_minus8", bit_depth_luma_minus8.into()));
    }
    let bit_depth_chroma_minus8 = r.read_ue("bit_depth_chroma_minus8")?;
    if bit_depth_chroma_minus8 > 8 {
        return Err(r.out_of_range("bit_depth_chroma_minus8", bit_depth_chroma_minus8.into()));
    }

    let chroma_array_type = if separate_colour_plane { 0 } else { chroma_format_idc };
    let (sub_width, sub_height) = match chroma_array_type {
        1 => (2, 2),
        2 => (2, 1),
        _ => (1, 1),
    };
    let width = pic_width
        .checked_sub(sub_width * (left + right))
        .filter(|w| *w > 0)
        .ok_or_else(|| r.out_of_range("conf_win_left/right_offset", left + right))?;
    let height = pic_height
        .checked_sub(sub_height * (top + bottom))
        .filter(|h| *h > 0)
        .ok_or_else(|| r.out_of_range("conf_win_top/bottom_offset", top + bottom))?;

    Ok(HevcSps {
        vps_id,
        sps_id,
        max_sub_layers_minus1,
        temporal_id_nesting,
        ptl,
        chroma_format_idc,
        bit_depth_luma_minus8,
        bit_depth_chroma_minus8,
        width: u32::try_from(width).map_err(|_| r.out_of_range("width", width))?,
        height: u32::try_from(height).map_err(|_| r.out_of_range("height", height))?,
    })
}

/// Validate a picture parameter set and return the SPS id it references.
pub fn parse_pps(nal: &[u8]) -> Result<u32, ParseError> {
    check_header(nal, "PPS", MIN_PPS_LEN, hevc_type::PPS)?;
    let rbsp = to_rbsp(&nal[2..]);
    let mut r = BitReader::new(&rbsp, "PPS");
    let pps_id = r.read_ue("pps_pic_parameter_set_id")?;
    if pps_id > 63 {
        return Err(r.out_of_range("pps_pic_parameter_set_id", pps_id.into()));
    }
    let sps_id = r.read_ue("pps_seq_parameter_set_id")?;
    if sps_id > 15 {
        return Err(r.out_of_range("pps_seq_parameter_set_id", sps_id.into()));
    }
    Ok(sps_id)
}

/// `hvc1.<space><profile>.<compat>.<tier><level>[.<constraint>...]`.
///
/// Compatibility flags are written bit-reversed in hex; trailing zero
/// constraint bytes are omitted.
pub fn codec_string(ptl: &ProfileTierLevel) -> String {
    let mut out = String::from("hvc1.");
    match ptl.profile_space {
        1 => out.push('A'),
        2 => out.push('B'),
        3 => out.push('C'),
        _ => {}
    }
    let tier = if ptl.tier_flag { 'H' } else { 'L' };
    let _ = write!(
        out,
        "{}.{:X}.{}{}",
        ptl.profile_idc,
        ptl.compatibility_flags.reverse_bits(),
        tier,
        ptl.level_idc
    );
    let significant = ptl
        .constraint_flags
        .iter()
        .rposition(|b| *b != 0)
        .map_or(0, |i| i + 1);
    for byte in &ptl.constraint_flags[..significant] {
        let _ = write!(out, ".{byte:X}");
    }
    out
}

/// Build an `HEVCDecoderConfigurationRecord` with one array each for VPS,
/// SPS and PPS and 4-byte NAL length fields.
pub fn build_hvcc(info: &HevcSps, vps: &[u8], sps: &[u8], pps: &[u8]) -> Result<BytesMut, ParseError> {
    let ptl = &info.ptl;
    let mut record = BytesMut::with_capacity(23 + 3 * 5 + vps.len() + sps.len() + pps.len());
    record.put_u8(1); // configurationVersion
    record.put_u8((ptl.profile_space << 6) | (u8::from(ptl.tier_flag) << 5) | ptl.profile_idc);
    record.put_u32(ptl.compatibility_flags);
    record.put_slice(&ptl.constraint_flags);
    record.put_u8(ptl.level_idc);
    record.put_u16(0xF000); // min_spatial_segmentation_idc = 0
    record.put_u8(0xFC); // parallelismType = 0
    record.put_u8(0xFC | info.chroma_format_idc as u8);
    record.put_u8(0xF8 | info.bit_depth_luma_minus8 as u8);
    record.put_u8(0xF8 | info.bit_depth_chroma_minus8 as u8);
    record.put_u16(0); // avgFrameRate
    // constantFrameRate(2) = 0 | numTemporalLayers(3) | temporalIdNested(1) | lengthSizeMinusOne(2) = 3
    record.put_u8(
        ((info.max_sub_layers_minus1 + 1) << 3) | (u8::from(info.temporal_id_nesting) << 2) | 0x03,
    );

    let arrays: [(u8, &'static str, &[u8]); 3] = [
        (hevc_type::VPS, "VPS", vps),
        (hevc_type::SPS, "SPS", sps),
        (hevc_type::PPS, "PPS", pps),
    ];
    record.put_u8(arrays.len() as u8);
    for (nal_type, name, unit) in arrays {
        record.put_u8(0x80 | nal_type); // array_completeness = 1
        record.put_u16(1); // numNalus
        put_nal_unit(&mut record, name, unit)?;
    }
    Ok(record)
}

/// HEVC entry point: VPS + SPS + PPS to codec description.
pub fn parse_h265(vps: &[u8], sps: &[u8], pps: &[u8]) -> Result<CodecDescription, ParseError> {
    let vps_info = parse_vps(vps)?;
    let info = parse_sps(sps)?;
    if info.vps_id != vps_info.vps_id {
        return Err(ParseError::IdMismatch {
            unit: "SPS",
            referenced: info.vps_id.into(),
            found: vps_info.vps_id.into(),
        });
    }
    let referenced = parse_pps(pps)?;
    if referenced != info.sps_id {
        return Err(ParseError::IdMismatch {
            unit: "PPS",
            referenced,
            found: info.sps_id,
        });
    }
    let record = build_hvcc(&info, vps, sps, pps)?;
    let codec = codec_string(&info.ptl);
    tracing::debug!(%codec, width = info.width, height = info.height, "parsed H.265 parameter sets");
    Ok(CodecDescription {
        codec,
        description: record.freeze(),
        coded_width: info.width,
        coded_height: info.height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VPS: [u8; 24] = [
        0x40, 0x01, 0x0C, 0x01, 0xFF, 0xFF, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90, 0x00, 0x00,
        0x03, 0x00, 0x00, 0x03, 0x00, 0x78, 0x17, 0x02, 0x40,
    ];
    const SPS: [u8; 26] = [
        0x42, 0x01, 0x01, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90, 0x00, 0x00, 0x03, 0x00, 0x00,
        0x03, 0x00, 0x78, 0xA0, 0x03, 0xC0, 0x80, 0x11, 0x07, 0xCB, 0x96,
    ];
    const PPS: [u8; 4] = [0x44, 0x01, 0xC0, 0x71];

    fn main_ptl() -> ProfileTierLevel {
        ProfileTierLevel {
            profile_space: 0,
            tier_flag: false,
            profile_idc: 1,
            compatibility_flags: 0x6000_0000,
            constraint_flags: [0x90, 0, 0, 0, 0, 0],
            level_idc: 120,
        }
    }

    #[test]
    fn vps_fields() {
        let vps = parse_vps(&VPS).unwrap();
        assert_eq!(vps.vps_id, 0);
        assert_eq!(vps.max_sub_layers_minus1, 0);
        assert_eq!(vps.ptl, main_ptl());
    }

    #[test]
    fn sps_reads_ptl_through_emulation_prevention() {
        let sps = parse_sps(&SPS).unwrap();
        assert_eq!(sps.ptl, main_ptl());
        assert_eq!(sps.chroma_format_idc, 1);
        assert!(sps.temporal_id_nesting);
        assert_eq!((sps.width, sps.height), (1920, 1080));
    }

    #[test]
    fn codec_string_main_profile() {
        assert_eq!(codec_string(&main_ptl()), "hvc1.1.6.L120.90");
    }

    #[test]
    fn codec_string_high_tier_with_profile_space() {
        let ptl = ProfileTierLevel {
            profile_space: 1,
            tier_flag: true,
            profile_idc: 2,
            compatibility_flags: 0x2000_0000,
            constraint_flags: [0xB0, 0, 0x01, 0, 0, 0],
            level_idc: 153,
        };
        assert_eq!(codec_string(&ptl), "hvc1.A2.4.H153.B0.0.1");
    }

    #[test]
    fn hvcc_record_layout() {
        let desc = parse_h265(&VPS, &SPS, &PPS).unwrap();
        assert_eq!(desc.codec, "hvc1.1.6.L120.90");
        let record = &desc.description;
        assert_eq!(record.len(), 92);
        assert_eq!(
            &record[..23],
            &[
                0x01, 0x01, 0x60, 0x00, 0x00, 0x00, 0x90, 0x00, 0x00, 0x00, 0x00, 0x00, 0x78, 0xF0,
                0x00, 0xFC, 0xFD, 0xF8, 0xF8, 0x00, 0x00, 0x0F, 0x03,
            ]
        );
        // VPS array header followed by the unit itself.
        assert_eq!(&record[23..28], &[0xA0, 0x00, 0x01, 0x00, 0x18]);
        assert_eq!(&record[28..52], &VPS);
    }

    #[test]
    fn truncated_sps_is_rejected() {
        assert_eq!(
            parse_sps(&SPS[..10]).unwrap_err(),
            ParseError::Truncated {
                unit: "SPS",
                needed: MIN_SPS_LEN,
                actual: 10
            }
        );
        assert!(matches!(
            parse_sps(&SPS[..19]),
            Err(ParseError::Exhausted { unit: "SPS", .. })
        ));
    }

    #[test]
    fn bad_vps_marker_is_rejected() {
        let mut vps = VPS;
        vps[4] = 0x00;
        assert!(matches!(
            parse_vps(&vps),
            Err(ParseError::OutOfRange {
                field: "vps_reserved_0xffff_16bits",
                ..
            })
        ));
    }

    #[test]
    fn unknown_profile_is_rejected() {
        let mut sps = SPS;
        sps[3] = 0x1F; // general_profile_idc = 31
        assert_eq!(
            parse_sps(&sps).unwrap_err(),
            ParseError::UnsupportedProfile {
                codec: "H.265",
                profile_idc: 31
            }
        );
    }

    #[test]
    fn zero_temporal_id_is_rejected() {
        let mut pps = PPS;
        pps[1] = 0x00;
        assert!(matches!(
            parse_pps(&pps),
            Err(ParseError::OutOfRange {
                field: "nuh_temporal_id_plus1",
                ..
            })
        ));
    }

    #[test]
    fn units_in_wrong_slots_are_rejected() {
        assert_eq!(
            parse_h265(&SPS, &VPS, &PPS).unwrap_err(),
            ParseError::UnexpectedNalType {
                unit: "VPS",
                expected: 32,
                found: 33
            }
        );
    }
}
