//! The computational module seam.
//!
//! A [`CodecModule`] is the loaded unit the gate fronts: two synchronous entry
//! points that turn parameter units into a [`CodecDescription`]. Loading is
//! asynchronous and happens once per gate.

use std::fmt;
use std::sync::Arc;

use codecgate_params::{CodecDescription, ParseError};

use crate::config::ModuleSource;
use crate::error::ModuleLoadError;

/// What a module loader resolves to.
pub type LoadResult = Result<Arc<dyn CodecModule>, ModuleLoadError>;

/// Named entry points a module must export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    ParseH264,
    ParseH265,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 2] = [EntryPoint::ParseH264, EntryPoint::ParseH265];

    pub fn name(self) -> &'static str {
        match self {
            EntryPoint::ParseH264 => "ParseH264",
            EntryPoint::ParseH265 => "ParseH265",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A loaded parameter-set parser.
///
/// `None` from an entry point means the module ran but produced nothing,
/// which the gate reports as an empty result.
pub trait CodecModule: Send + Sync + 'static {
    fn parse_h264(&self, sps: &[u8], pps: &[u8]) -> Option<Result<CodecDescription, ParseError>>;

    fn parse_h265(
        &self,
        vps: &[u8],
        sps: &[u8],
        pps: &[u8],
    ) -> Option<Result<CodecDescription, ParseError>>;

    /// Whether the module tolerates overlapping calls. Modules that don't
    /// say so get one call at a time.
    fn is_reentrant(&self) -> bool {
        false
    }

    /// Whether `entry` is present. Checked once when the module settles.
    fn exports(&self, entry: EntryPoint) -> bool {
        let _ = entry;
        true
    }
}

/// The parsers from `codecgate-params`, in process.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeModule;

impl CodecModule for NativeModule {
    fn parse_h264(&self, sps: &[u8], pps: &[u8]) -> Option<Result<CodecDescription, ParseError>> {
        Some(codecgate_params::parse_h264(sps, pps))
    }

    fn parse_h265(
        &self,
        vps: &[u8],
        sps: &[u8],
        pps: &[u8],
    ) -> Option<Result<CodecDescription, ParseError>> {
        Some(codecgate_params::parse_h265(vps, sps, pps))
    }

    fn is_reentrant(&self) -> bool {
        true
    }
}

pub async fn load_native() -> LoadResult {
    tracing::debug!("instantiating native parameter-set module");
    Ok(Arc::new(NativeModule))
}

/// Load the module named by `source`.
pub async fn load(source: ModuleSource) -> LoadResult {
    match source {
        ModuleSource::Native => load_native().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: &[u8] = &[0x67, 0x42, 0x00, 0x1F, 0xED, 0x00, 0xA0, 0x0B, 0x72];
    const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];

    #[test]
    fn native_module_exports_everything() {
        let module = NativeModule;
        assert!(module.is_reentrant());
        for entry in EntryPoint::ALL {
            assert!(module.exports(entry), "{entry}");
        }
    }

    #[test]
    fn native_module_always_produces_a_value() {
        let module = NativeModule;
        let desc = module.parse_h264(SPS, PPS).unwrap().unwrap();
        assert_eq!(desc.codec, "avc1.42001F");
        assert!(module.parse_h265(&[], SPS, PPS).unwrap().is_err());
    }

    #[tokio::test]
    async fn load_resolves_native_source() {
        let module = load(ModuleSource::Native).await.unwrap();
        assert!(module.is_reentrant());
    }
}
