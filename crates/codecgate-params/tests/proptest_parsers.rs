//! Property-based tests for the parameter-set parsers.
//!
//! Inputs come off the wire, so every parser must turn arbitrary bytes into
//! either a description or a [`ParseError`] without panicking.

use bytes::Bytes;
use codecgate_params::nal::{self, AnnexBUnits, Codec};
use codecgate_params::{parse_h264, parse_h265};
use proptest::prelude::*;

const AVC_SPS: &[u8] = &[0x67, 0x64, 0x00, 0x28, 0xAC, 0xD9, 0x40, 0x78, 0x02, 0x27, 0xE5, 0x40];
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

// ─── Arbitrary input ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn h264_never_panics(
        sps in proptest::collection::vec(any::<u8>(), 0..64),
        pps in proptest::collection::vec(any::<u8>(), 0..16),
    ) {
        let _ = parse_h264(&sps, &pps);
    }

    #[test]
    fn h265_never_panics(
        vps in proptest::collection::vec(any::<u8>(), 0..64),
        sps in proptest::collection::vec(any::<u8>(), 0..96),
        pps in proptest::collection::vec(any::<u8>(), 0..16),
    ) {
        let _ = parse_h265(&vps, &sps, &pps);
    }

    /// Bodies behind a plausible header byte get further into the parser than
    /// uniformly random input does.
    #[test]
    fn h264_with_valid_header_never_panics(
        body in proptest::collection::vec(any::<u8>(), 0..48),
    ) {
        let mut sps = vec![0x67];
        sps.extend_from_slice(&body);
        if let Ok(desc) = parse_h264(&sps, AVC_PPS) {
            prop_assert!(desc.codec.starts_with("avc1."));
        }
    }

    #[test]
    fn annex_b_units_never_empty(
        stream in proptest::collection::vec(prop_oneof![Just(0u8), Just(1u8), any::<u8>()], 0..256),
    ) {
        for unit in AnnexBUnits::new(&stream) {
            prop_assert!(!unit.is_empty());
        }
        let stream = Bytes::from(stream);
        let _ = nal::detect_codec(&stream);
        let _ = nal::collect_parameter_sets(&stream, Codec::H264);
        let _ = nal::collect_parameter_sets(&stream, Codec::H265);
    }
}

// ─── Truncation ──────────────────────────────────────────────────────────────

proptest! {
    /// A cut-short SPS either fails or, if everything the parser reads
    /// survived, yields the same codec string as the whole unit.
    #[test]
    fn truncated_avc_sps_is_consistent(len in 0usize..12) {
        let full = parse_h264(AVC_SPS, AVC_PPS).unwrap();
        if let Ok(desc) = parse_h264(&AVC_SPS[..len], AVC_PPS) {
            prop_assert_eq!(desc.codec, full.codec);
        }
    }

    #[test]
    fn truncated_hevc_sps_is_consistent(len in 0usize..26) {
        let full = parse_h265(HEVC_VPS, HEVC_SPS, HEVC_PPS).unwrap();
        if let Ok(desc) = parse_h265(HEVC_VPS, &HEVC_SPS[..len], HEVC_PPS) {
            prop_assert_eq!(desc.codec, full.codec);
        }
    }

    #[test]
    fn truncated_vps_below_minimum_fails(len in 0usize..18) {
        prop_assert!(parse_h265(&HEVC_VPS[..len], HEVC_SPS, HEVC_PPS).is_err());
    }
}
