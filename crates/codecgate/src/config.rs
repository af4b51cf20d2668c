use serde::Deserialize;

pub const CONFIG_VERSION: u32 = 1;

/// How calls are admitted into a loaded module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Admission {
    /// Serialize unless the module declares itself reentrant.
    #[default]
    Auto,
    /// Always one call at a time.
    Serial,
    /// Never serialize.
    Concurrent,
}

/// Where the module comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleSource {
    /// The parsers compiled into this binary.
    #[default]
    Native,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GateConfigInput {
    pub version: u32,
    pub module: ModuleConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModuleConfigInput {
    pub source: Option<ModuleSource>,
    pub admission: Option<Admission>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleConfig {
    pub source: ModuleSource,
    pub admission: Admission,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    pub version: u32,
    pub module: ModuleConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            module: ModuleConfig::default(),
        }
    }
}

impl GateConfigInput {
    pub fn resolve(self) -> Result<GateConfig, String> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(format!("Unsupported config version {}", version));
        }

        let module = ModuleConfig {
            source: self.module.source.unwrap_or_default(),
            admission: self.module.admission.unwrap_or_default(),
        };

        Ok(GateConfig { version, module })
    }
}

impl GateConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, String> {
        if input.trim().is_empty() {
            return Ok(GateConfig::default());
        }
        let parsed: GateConfigInput =
            toml::from_str(input).map_err(|e| format!("Invalid config TOML: {}", e))?;
        parsed.resolve()
    }
}
