//! Topology configuration: nodes, channels, and run-wide parameters loaded
//! from YAML/JSON with environment-variable overrides (§6 External
//! Interfaces).

use serde::{Deserialize, Serialize};

use crate::channel::ChannelParameters;
use crate::components::bsm::DetectorParameters;
use crate::components::memory::MemoryParameters;
use crate::error::{Result, SimError};
use crate::protocols::generation::GenerationParameters;
use crate::quantum::state::Formalism;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub memory_count: usize,
    #[serde(default)]
    pub memory_params: MemoryParameters,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    EndNode,
    BsmNode,
    Router,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub sender: String,
    pub receiver: String,
    pub params: ChannelParameters,
    #[serde(default)]
    pub is_quantum: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub stop_time: u64,
    #[serde(default)]
    pub formalism: FormalismConfig,
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub detector_params: DetectorParams,
    #[serde(default)]
    pub generation_params: GenerationParamsConfig,
    #[serde(default)]
    pub master_seed: u64,
    #[serde(default)]
    pub remote_quantum_manager: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormalismConfig {
    Ket,
    Density,
    #[default]
    BellDiagonal,
}

impl From<FormalismConfig> for Formalism {
    fn from(value: FormalismConfig) -> Self {
        match value {
            FormalismConfig::Ket => Formalism::Ket,
            FormalismConfig::Density => Formalism::Density,
            FormalismConfig::BellDiagonal => Formalism::BellDiagonal,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DetectorParams {
    pub efficiency: f64,
    pub dark_count_rate: f64,
    pub coincidence_window: u64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        let defaults = DetectorParameters::default();
        Self { efficiency: defaults.efficiency, dark_count_rate: defaults.dark_count_rate, coincidence_window: defaults.coincidence_window }
    }
}

impl From<DetectorParams> for DetectorParameters {
    fn from(value: DetectorParams) -> Self {
        DetectorParameters { efficiency: value.efficiency, dark_count_rate: value.dark_count_rate, coincidence_window: value.coincidence_window }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationParamsConfig {
    #[default]
    Sequence,
    Realistic,
}

impl From<GenerationParamsConfig> for GenerationParameters {
    fn from(value: GenerationParamsConfig) -> Self {
        match value {
            GenerationParamsConfig::Sequence => GenerationParameters::sequence_parameters(),
            GenerationParamsConfig::Realistic => GenerationParameters::realistic(),
        }
    }
}

/// Loads a topology from a YAML or JSON file, applying `SIM_`-prefixed
/// environment variable overrides (e.g. `SIM_STOP_TIME`) the way the
/// teacher's config layer composes file + environment sources.
pub fn load_topology(path: &std::path::Path) -> Result<TopologyConfig> {
    let _ = dotenvy::dotenv();
    let builder = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("SIM").separator("__"));
    let settings = builder.build().map_err(|e| SimError::Config(e.to_string()))?;
    settings.try_deserialize().map_err(|e| SimError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formalism_config_maps_to_runtime_formalism() {
        assert_eq!(Formalism::from(FormalismConfig::Ket), Formalism::Ket);
        assert_eq!(Formalism::from(FormalismConfig::BellDiagonal), Formalism::BellDiagonal);
    }
}
