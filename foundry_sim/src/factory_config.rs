use std::{
    collections::{BTreeMap, HashSet},
    env, fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{ItemStack, ProductionRequirement};

pub const BUILTIN_FACTORY_CONFIG: &str = include_str!("data/factory_config.json");

/// Simulation time-units per second.
pub const TICKS_PER_SECOND: f32 = 60.0;

/// Identifier of the unit type a factory produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct UnitTypeId(pub String);

impl UnitTypeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable per-type factory parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    name: String,
    unit_type: UnitTypeId,
    produce_time: f32,
    launch_velocity: f32,
    max_spawn: u32,
    grace_period_multiplier: f32,
    speedup_time: f32,
    max_speedup: f32,
    size: u32,
    requirements: ProductionRequirement,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            unit_type: UnitTypeId::default(),
            produce_time: 1000.0,
            launch_velocity: 0.0,
            max_spawn: 2,
            grace_period_multiplier: 15.0,
            speedup_time: 1_200_000.0,
            max_speedup: 2.0,
            size: 1,
            requirements: ProductionRequirement::default(),
        }
    }
}

impl FactoryConfig {
    pub fn new(
        name: impl Into<String>,
        unit_type: UnitTypeId,
        requirements: Vec<ItemStack>,
    ) -> Self {
        Self {
            name: name.into(),
            unit_type,
            requirements: ProductionRequirement::new(requirements),
            ..Self::default()
        }
    }

    pub fn with_produce_time(mut self, produce_time: f32) -> Self {
        self.produce_time = produce_time;
        self
    }

    pub fn with_launch_velocity(mut self, launch_velocity: f32) -> Self {
        self.launch_velocity = launch_velocity;
        self
    }

    pub fn with_max_spawn(mut self, max_spawn: u32) -> Self {
        self.max_spawn = max_spawn;
        self
    }

    pub fn with_grace_period(mut self, multiplier: f32) -> Self {
        self.grace_period_multiplier = multiplier;
        self
    }

    pub fn with_speedup(mut self, speedup_time: f32, max_speedup: f32) -> Self {
        self.speedup_time = speedup_time;
        self.max_speedup = max_speedup;
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit_type(&self) -> &UnitTypeId {
        &self.unit_type
    }

    pub fn produce_time(&self) -> f32 {
        self.produce_time
    }

    pub fn launch_velocity(&self) -> f32 {
        self.launch_velocity
    }

    pub fn max_spawn(&self) -> u32 {
        self.max_spawn
    }

    pub fn grace_period_multiplier(&self) -> f32 {
        self.grace_period_multiplier
    }

    pub fn speedup_time(&self) -> f32 {
        self.speedup_time
    }

    pub fn max_speedup(&self) -> f32 {
        self.max_speedup
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn requirements(&self) -> &ProductionRequirement {
        &self.requirements
    }

    /// Warmup an untrusted factory must exceed before it starts producing.
    pub fn grace_threshold(&self) -> f32 {
        self.produce_time * self.grace_period_multiplier
    }

    /// Seconds per cycle at full speed, for stat display.
    pub fn craft_seconds(&self) -> f32 {
        self.produce_time / TICKS_PER_SECOND
    }

    pub fn validate(&self) -> Result<(), FactoryConfigError> {
        let invalid = |reason: &str| FactoryConfigError::Invalid {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if !(self.produce_time.is_finite() && self.produce_time > 0.0) {
            return Err(invalid("produce_time must be positive"));
        }
        if self.max_spawn == 0 {
            return Err(invalid("max_spawn must be at least 1"));
        }
        if !(self.speedup_time.is_finite() && self.speedup_time > 0.0) {
            return Err(invalid("speedup_time must be positive"));
        }
        if self.grace_period_multiplier < 0.0 || self.max_speedup < 0.0 {
            return Err(invalid("grace period and speedup limits must not be negative"));
        }
        if self.size == 0 {
            return Err(invalid("size must be at least 1"));
        }
        let mut seen = HashSet::new();
        for stack in self.requirements.stacks() {
            if stack.amount == 0 {
                return Err(invalid("requirement amounts must be positive"));
            }
            if !seen.insert(stack.item) {
                return Err(invalid("requirement items must be unique"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum FactoryConfigError {
    #[error("failed to parse factory config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read factory config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("factory `{name}` is invalid: {reason}")]
    Invalid { name: String, reason: String },
    #[error("factory `{0}` is defined more than once")]
    Duplicate(String),
    #[error("unknown factory type `{0}`")]
    UnknownType(String),
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    factories: Vec<FactoryConfig>,
}

/// Factory types available to the simulation, keyed by name.
#[derive(Resource, Debug, Clone, Default)]
pub struct FactoryCatalog {
    types: BTreeMap<String, Arc<FactoryConfig>>,
    path: Option<PathBuf>,
}

impl FactoryCatalog {
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_FACTORY_CONFIG).expect("builtin factory config should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, FactoryConfigError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let mut catalog = Self::default();
        for config in file.factories {
            catalog.insert(config)?;
        }
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self, FactoryConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| FactoryConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let mut catalog = Self::from_json_str(&contents)?;
        catalog.path = Some(path.to_path_buf());
        Ok(catalog)
    }

    pub fn insert(&mut self, config: FactoryConfig) -> Result<Arc<FactoryConfig>, FactoryConfigError> {
        config.validate()?;
        if self.types.contains_key(config.name()) {
            return Err(FactoryConfigError::Duplicate(config.name().to_string()));
        }
        let config = Arc::new(config);
        self.types
            .insert(config.name().to_string(), Arc::clone(&config));
        Ok(config)
    }

    pub fn get(&self, name: &str) -> Result<Arc<FactoryConfig>, FactoryConfigError> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| FactoryConfigError::UnknownType(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

pub fn load_factory_catalog_from_env() -> FactoryCatalog {
    if let Some(path) = env::var("FACTORY_CONFIG_PATH").ok().map(PathBuf::from) {
        match FactoryCatalog::from_file(&path) {
            Ok(catalog) => {
                tracing::info!(
                    target: "foundry::config",
                    path = %path.display(),
                    factories = catalog.len(),
                    "factory_config.loaded=file"
                );
                return catalog;
            }
            Err(err) => {
                tracing::warn!(
                    target: "foundry::config",
                    path = %path.display(),
                    error = %err,
                    "factory_config.load_failed"
                );
            }
        }
    }

    let catalog = FactoryCatalog::builtin();
    tracing::info!(
        target: "foundry::config",
        factories = catalog.len(),
        "factory_config.loaded=builtin"
    );
    catalog
}
