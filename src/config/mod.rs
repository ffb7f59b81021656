mod settings;

pub use settings::{
    default_categories, Config, ConfigError, LivenessConfig, LoadOptions, ProcessConfig,
    VerifyConfig, EXAMPLE_CONFIG,
};
