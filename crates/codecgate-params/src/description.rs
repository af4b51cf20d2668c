//! Input and output values of a parameter-set parse.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Serialize, Serializer};

use crate::error::ParseError;

/// Raw parameter units of one stream, without start codes.
///
/// Every field is held as [`Bytes`], so owned buffers, static slices and
/// sub-range views of a larger stream all normalize to the same form without
/// copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    pub vps: Option<Bytes>,
    pub sps: Bytes,
    pub pps: Bytes,
}

impl ParameterSets {
    pub fn avc(sps: impl Into<Bytes>, pps: impl Into<Bytes>) -> Self {
        Self {
            vps: None,
            sps: sps.into(),
            pps: pps.into(),
        }
    }

    pub fn hevc(vps: impl Into<Bytes>, sps: impl Into<Bytes>, pps: impl Into<Bytes>) -> Self {
        Self {
            vps: Some(vps.into()),
            sps: sps.into(),
            pps: pps.into(),
        }
    }
}

/// Decoder-ready configuration derived from a stream's parameter sets.
///
/// `codec` is an RFC 6381 style identifier (`avc1.42001F`, `hvc1.1.6.L120.90`)
/// and `description` the matching `avcC`/`hvcC` decoder configuration record.
/// Dimensions are after cropping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecDescription {
    pub codec: String,
    #[serde(serialize_with = "serialize_base64")]
    pub description: Bytes,
    pub coded_width: u32,
    pub coded_height: u32,
}

/// Append a 16-bit length-prefixed NAL unit to a configuration record.
pub(crate) fn put_nal_unit(
    record: &mut BytesMut,
    unit_name: &'static str,
    unit: &[u8],
) -> Result<(), ParseError> {
    let len = u16::try_from(unit.len()).map_err(|_| ParseError::TooLarge {
        unit: unit_name,
        len: unit.len(),
    })?;
    record.put_u16(len);
    record.put_slice(unit);
    Ok(())
}

fn serialize_base64<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_accept_any_contiguous_bytes() {
        let stream = Bytes::from_static(&[0x00, 0x00, 0x01, 0x68, 0xCE, 0x3C, 0x80]);
        let sets = ParameterSets::avc(vec![0x67, 0x42, 0x00, 0x1F], stream.slice(3..));
        assert_eq!(&sets.sps[..], &[0x67, 0x42, 0x00, 0x1F]);
        assert_eq!(&sets.pps[..], &[0x68, 0xCE, 0x3C, 0x80]);

        let sets = ParameterSets::hevc(&b"\x40\x01"[..], &b"\x42\x01"[..], &b"\x44\x01"[..]);
        assert_eq!(sets.vps.as_deref(), Some(&[0x40, 0x01][..]));
    }

    #[test]
    fn oversized_units_do_not_fit_a_record() {
        let mut record = BytesMut::new();
        let unit = vec![0u8; 70_000];
        assert_eq!(
            put_nal_unit(&mut record, "PPS", &unit).unwrap_err(),
            ParseError::TooLarge {
                unit: "PPS",
                len: 70_000
            }
        );
        put_nal_unit(&mut record, "PPS", &[0x68, 0xCE]).unwrap();
        assert_eq!(&record[..], &[0x00, 0x02, 0x68, 0xCE]);
    }

    #[test]
    fn description_serializes_as_decoder_config() {
        let desc = CodecDescription {
            codec: "avc1.42001F".into(),
            description: Bytes::from_static(&[0x01, 0x42, 0x00, 0x1F]),
            coded_width: 1280,
            coded_height: 720,
        };
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "codec": "avc1.42001F",
                "description": "AUIAHw==",
                "codedWidth": 1280,
                "codedHeight": 720,
            })
        );
    }
}
