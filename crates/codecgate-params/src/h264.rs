//! # H.264/AVC Parameter Sets
//!
//! Parses the SPS far enough to recover profile, level, chroma layout and the
//! cropped picture size, checks the PPS against it, and emits the `avc1`
//! codec string plus an `AVCDecoderConfigurationRecord` (`avcC`).
//!
//! | Bytes | Field |
//! |-------|-------|
//! | 0 | NAL header (type 7) |
//! | 1 | profile_idc |
//! | 2 | constraint_set flags |
//! | 3 | level_idc |
//! | 4.. | Exp-Golomb coded fields |

use bytes::{BufMut, BytesMut};

use crate::bits::{BitReader, to_rbsp};
use crate::description::{CodecDescription, put_nal_unit};
use crate::error::ParseError;
use crate::nal::avc_type;

/// NAL header plus profile, constraint flags and level.
pub const MIN_SPS_LEN: usize = 4;
/// NAL header plus at least one RBSP byte.
pub const MIN_PPS_LEN: usize = 2;

/// profile_idc values this parser understands.
const SUPPORTED_PROFILES: [u8; 16] = [
    66, 77, 88, 100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135,
];

/// Profiles whose SPS carries chroma_format_idc and bit depths.
const CHROMA_INFO_PROFILES: [u8; 13] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135];

/// Profiles whose `avcC` record carries the chroma/bit-depth extension.
const AVCC_EXTENDED_PROFILES: [u8; 4] = [100, 110, 122, 144];

/// Fields of a sequence parameter set needed to configure a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcSps {
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub seq_parameter_set_id: u32,
    pub chroma_format_idc: u32,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub frame_mbs_only: bool,
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
    let found = nal[0] & 0x1F;
    if found != expected {
        return Err(ParseError::UnexpectedNalType {
            unit,
            expected,
            found,
        });
    }
    Ok(())
}

/// Skip one `scaling_list()` structure of `size` coefficients.
fn skip_scaling_list(r: &mut BitReader<'_>, size: usize) -> Result<(), ParseError> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = r.read_se("delta_scale")?;
            if !(-128..=127).contains(&delta) {
                return Err(r.out_of_range("delta_scale", delta.unsigned_abs().into()));
            }
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

/// Parse a sequence parameter set NAL unit (with its 1-byte header).
pub fn parse_sps(nal: &[u8]) -> Result<AvcSps, ParseError> {
    check_header(nal, "SPS", MIN_SPS_LEN, avc_type::SPS)?;
    let rbsp = to_rbsp(&nal[1..]);
    let mut r = BitReader::new(&rbsp, "SPS");

    let profile_idc = r.read_u8("profile_idc")?;
    let constraint_flags = r.read_u8("constraint_set_flags")?;
    let level_idc = r.read_u8("level_idc")?;
    if !SUPPORTED_PROFILES.contains(&profile_idc) {
        return Err(ParseError::UnsupportedProfile {
            codec: "H.264",
            profile_idc,
        });
    }

    let seq_parameter_set_id = r.read_ue("seq_parameter_set_id")?;
    if seq_parameter_set_id > 31 {
        return Err(r.out_of_range("seq_parameter_set_id", seq_parameter_set_id.into()));
    }

    let mut chroma_format_idc = 1;
    let mut separate_colour_plane = false;
    let mut bit_depth_luma_minus8 = 0;
    let mut bit_depth_chroma_minus8 = 0;
    if CHROMA_INFO_PROFILES.contains(&profile_idc) {
        chroma_format_idc = r.read_ue("chroma_format_idc")?;
        if chroma_format_idc > 3 {
            return Err(r.out_of_range("chroma_format_idc", chroma_format_idc.into()));
        }
        if chroma_format_idc == 3 {
            separate_colour_plane = r.read_flag("separate_colour_plane_flag")?;
        }
        bit_depth_luma_minus8 = r.read_ue("bit_depth_luma_minus8")?;
        if bit_depth_luma_minus8 > 6 {
            return Err(r.out_of_range("bit_depth_luma_minus8", bit_depth_luma_minus8.into()));
        }
        bit_depth_chroma_minus8 = r.read_ue("bit_depth_chroma_minus8")?;
        if bit_depth_chroma_minus8 > 6 {
            return Err(r.out_of_range("bit_depth_chroma_minus8", bit_depth_chroma_minus8.into()));
        }
        r.read_flag("qpprime_y_zero_transform_bypass_flag")?;
        if r.read_flag("seq_scaling_matrix_present_flag")? {
            let lists = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..lists {
                if r.read_flag("seq_scaling_list_present_flag")? {
                    skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    let log2_max_frame_num_minus4 = r.read_ue("log2_max_frame_num_minus4")?;
    if log2_max_frame_num_minus4 > 12 {
        return Err(r.out_of_range("log2_max_frame_num_minus4", log2_max_frame_num_minus4.into()));
    }
    match r.read_ue("pic_order_cnt_type")? {
        0 => {
            r.read_ue("log2_max_pic_order_cnt_lsb_minus4")?;
        }
        1 => {
            r.read_flag("delta_pic_order_always_zero_flag")?;
            r.read_se("offset_for_non_ref_pic")?;
            r.read_se("offset_for_top_to_bottom_field")?;
            let cycle = r.read_ue("num_ref_frames_in_pic_order_cnt_cycle")?;
            if cycle > 255 {
                return Err(r.out_of_range("num_ref_frames_in_pic_order_cnt_cycle", cycle.into()));
            }
            for _ in 0..cycle {
                r.read_se("offset_for_ref_frame")?;
            }
        }
        2 => {}
        other => return Err(r.out_of_range("pic_order_cnt_type", other.into())),
    }
    r.read_ue("max_num_ref_frames")?;
    r.read_flag("gaps_in_frame_num_value_allowed_flag")?;

    let width_in_mbs = u64::from(r.read_ue("pic_width_in_mbs_minus1")?) + 1;
    let height_in_map_units = u64::from(r.read_ue("pic_height_in_map_units_minus1")?) + 1;
    let frame_mbs_only = r.read_flag("frame_mbs_only_flag")?;
    if !frame_mbs_only {
        r.read_flag("mb_adaptive_frame_field_flag")?;
    }
    r.read_flag("direct_8x8_inference_flag")?;

    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0u64, 0u64, 0u64, 0u64);
    if r.read_flag("frame_cropping_flag")? {
        crop_left = r.read_ue("frame_crop_left_offset")?.into();
        crop_right = r.read_ue("frame_crop_right_offset")?.into();
        crop_top = r.read_ue("frame_crop_top_offset")?.into();
        crop_bottom = r.read_ue("frame_crop_bottom_offset")?.into();
    }

    let field_factor = if frame_mbs_only { 1 } else { 2 };
    let chroma_array_type = if separate_colour_plane { 0 } else { chroma_format_idc };
    let (crop_unit_x, crop_unit_y) = match chroma_array_type {
        0 => (1, field_factor),
        1 => (2, 2 * field_factor),
        2 => (2, field_factor),
        _ => (1, field_factor),
    };

    let full_width = width_in_mbs * 16;
    let full_height = field_factor * height_in_map_units * 16;
    let width = full_width
        .checked_sub(crop_unit_x * (crop_left + crop_right))
        .filter(|w| *w > 0)
        .ok_or_else(|| r.out_of_range("frame_crop_left/right_offset", crop_left + crop_right))?;
    let height = full_height
        .checked_sub(crop_unit_y * (crop_top + crop_bottom))
        .filter(|h| *h > 0)
        .ok_or_else(|| r.out_of_range("frame_crop_top/bottom_offset", crop_top + crop_bottom))?;

    Ok(AvcSps {
        profile_idc,
        constraint_flags,
        level_idc,
        seq_parameter_set_id,
        chroma_format_idc,
        bit_depth_luma_minus8,
        bit_depth_chroma_minus8,
        frame_mbs_only,
        width: u32::try_from(width).map_err(|_| r.out_of_range("width", width))?,
        height: u32::try_from(height).map_err(|_| r.out_of_range("height", height))?,
    })
}

/// Validate a picture parameter set and return the SPS id it references.
pub fn parse_pps(nal: &[u8]) -> Result<u32, ParseError> {
    check_header(nal, "PPS", MIN_PPS_LEN, avc_type::PPS)?;
    let rbsp = to_rbsp(&nal[1..]);
    let mut r = BitReader::new(&rbsp, "PPS");
    let pps_id = r.read_ue("pic_parameter_set_id")?;
    if pps_id > 255 {
        return Err(r.out_of_range("pic_parameter_set_id", pps_id.into()));
    }
    let sps_id = r.read_ue("seq_parameter_set_id")?;
    if sps_id > 31 {
        return Err(r.out_of_range("seq_parameter_set_id", sps_id.into()));
    }
    Ok(sps_id)
}

/// `avc1.PPCCLL` with uppercase hex profile, constraint flags and level.
pub fn codec_string(sps: &AvcSps) -> String {
    format!(
        "avc1.{:02X}{:02X}{:02X}",
        sps.profile_idc, sps.constraint_flags, sps.level_idc
    )
}

/// Build an `AVCDecoderConfigurationRecord` with one SPS and one PPS and
/// 4-byte NAL length fields.
pub fn build_avcc(info: &AvcSps, sps: &[u8], pps: &[u8]) -> Result<BytesMut, ParseError> {
    let mut record = BytesMut::with_capacity(11 + sps.len() + pps.len() + 4);
    record.put_u8(1); // configurationVersion
    record.put_u8(info.profile_idc);
    record.put_u8(info.constraint_flags);
    record.put_u8(info.level_idc);
    record.put_u8(0xFC | 0x03); // lengthSizeMinusOne = 3
    record.put_u8(0xE0 | 0x01); // numOfSequenceParameterSets = 1
    put_nal_unit(&mut record, "SPS", sps)?;
    record.put_u8(1); // numOfPictureParameterSets
    put_nal_unit(&mut record, "PPS", pps)?;

    if AVCC_EXTENDED_PROFILES.contains(&info.profile_idc) {
        record.put_u8(0xFC | info.chroma_format_idc as u8);
        record.put_u8(0xF8 | info.bit_depth_luma_minus8 as u8);
        record.put_u8(0xF8 | info.bit_depth_chroma_minus8 as u8);
        record.put_u8(0); // numOfSequenceParameterSetExt
    }
    Ok(record)
}

/// AVC entry point: SPS + PPS to codec description.
pub fn parse_h264(sps: &[u8], pps: &[u8]) -> Result<CodecDescription, ParseError> {
    let info = parse_sps(sps)?;
    let referenced = parse_pps(pps)?;
    if referenced != info.seq_parameter_set_id {
        return Err(ParseError::IdMismatch {
            unit: "PPS",
            referenced,
            found: info.seq_parameter_set_id,
        });
    }
    let record = build_avcc(&info, sps, pps)?;
    let codec = codec_string(&info);
    tracing::debug!(%codec, width = info.width, height = info.height, "parsed H.264 parameter sets");
    Ok(CodecDescription {
        codec,
        description: record.freeze(),
        coded_width: info.width,
        coded_height: info.height,
    })
}
