//! # Integration tests: Annex B stream → parameter sets → codec description
//!
//! Streams are assembled from real-layout parameter sets with start codes, the
//! way an encoder writes a raw `.h264` / `.h265` file, then run through
//! collection and parsing end to end.

use bytes::Bytes;
use codecgate_params::nal::{self, Codec};
use codecgate_params::{ParameterSets, ParseError, parse};

// ─── Fixtures ───────────────────────────────────────────────────────────────

const AVC_SPS: &[u8] = &[0x67, 0x42, 0x00, 0x1F, 0xED, 0x00, 0xA0, 0x0B, 0x72];
const AVC_PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];

const HEVC_VPS: &[u8] = &[
    0x40, 0x01, 0x0C, 0x01, 0xFF, 0xFF, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90, 0x00, 0x00,
    0x03, 0x00, 0x00, 0x03, 0x00, 0x78, 0x17, 0x02, 0x40,
];
const HEVC_SPS: &[u8] = &[
    0x42, 0x01, 0x01, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90, 0x00, 0x00, 0x03, 0x00, 0x00,
    0x03, 0x00, 0x78, 0xA0, 0x03, 0xC0, 0x80, 0x11, 0x07, 0xCB, 0x96,
];
const HEVC_PPS: &[u8] = &[0x44, 0x01, 0xC0, 0x71];

fn annex_b(units: &[&[u8]]) -> Bytes {
    let mut out = Vec::new();
    for unit in units {
        out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        out.extend_from_slice(unit);
    }
    Bytes::from(out)
}

// ─── H.264 ──────────────────────────────────────────────────────────────────

#[test]
fn avc_stream_end_to_end() {
    let idr: &[u8] = &[0x65, 0x88, 0x84, 0x00, 0x33];
    let stream = annex_b(&[&[0x09, 0xF0], AVC_SPS, AVC_PPS, idr]);

    assert_eq!(nal::detect_codec(&stream), Some(Codec::H264));
    let sets = nal::collect_parameter_sets(&stream, Codec::H264).unwrap();
    let desc = parse(&sets).unwrap();

    assert_eq!(desc.codec, "avc1.42001F");
    assert_eq!((desc.coded_width, desc.coded_height), (1280, 720));
    assert!(!desc.description.is_empty());
}

#[test]
fn avc_sets_from_owned_and_view_buffers_agree() {
    let owned = ParameterSets::avc(AVC_SPS.to_vec(), AVC_PPS.to_vec());
    let stream = annex_b(&[AVC_SPS, AVC_PPS]);
    let views = ParameterSets::avc(stream.slice(4..4 + AVC_SPS.len()), stream.slice(8 + AVC_SPS.len()..));

    assert_eq!(parse(&owned).unwrap(), parse(&views).unwrap());
}

#[test]
fn avc_stream_without_pps_is_reported() {
    let stream = annex_b(&[AVC_SPS, &[0x65, 0x88]]);
    assert_eq!(
        nal::collect_parameter_sets(&stream, Codec::H264).unwrap_err(),
        ParseError::Missing { unit: "PPS" }
    );
}

// ─── H.265 ──────────────────────────────────────────────────────────────────

#[test]
fn hevc_stream_end_to_end() {
    let idr: &[u8] = &[0x26, 0x01, 0xAF, 0x06, 0xB8];
    let stream = annex_b(&[HEVC_VPS, HEVC_SPS, HEVC_PPS, idr]);

    assert_eq!(nal::detect_codec(&stream), Some(Codec::H265));
    let census = nal::census(&stream, Codec::H265);
    assert_eq!(census.parameter_sets, 3);
    assert_eq!(census.keyframes, 1);

    let sets = nal::collect_parameter_sets(&stream, Codec::H265).unwrap();
    let desc = parse(&sets).unwrap();
    assert_eq!(desc.codec, "hvc1.1.6.L120.90");
    assert_eq!((desc.coded_width, desc.coded_height), (1920, 1080));
}

#[test]
fn vps_presence_selects_hevc_path() {
    // AVC units handed to the HEVC path fail on the VPS slot.
    let sets = ParameterSets::hevc(AVC_SPS, AVC_SPS, AVC_PPS);
    assert!(matches!(
        parse(&sets),
        Err(ParseError::Truncated { unit: "VPS", .. })
    ));
}

// ─── Failure reasons ────────────────────────────────────────────────────────

#[test]
fn every_failure_has_a_reason() {
    let cases = [
        ParameterSets::avc(Bytes::from_static(&[0x67]), AVC_PPS),
        ParameterSets::avc(AVC_SPS, Bytes::from_static(&[0x68])),
        ParameterSets::avc(Bytes::new(), AVC_PPS),
        ParameterSets::hevc(HEVC_VPS, &HEVC_SPS[..12], HEVC_PPS),
        ParameterSets::hevc(HEVC_VPS, HEVC_SPS, Bytes::from_static(&[0x44])),
    ];
    for sets in cases {
        let err = parse(&sets).unwrap_err();
        assert!(!err.reason().is_empty(), "{sets:?}");
    }
}
