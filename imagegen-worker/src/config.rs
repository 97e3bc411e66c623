use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use imagegen_common::generation::GenerationSettings;
use imagegen_common::record_store::WriteCondition;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3310")]
    pub port: u16,

    #[envconfig(from = "TABLENAME")]
    pub table_name: NonEmptyString,

    #[envconfig(from = "BUCKET", default = "halfjourneybucket1234")]
    pub bucket: NonEmptyString,

    #[envconfig(default = "stability.stable-diffusion-xl-v0")]
    pub model_id: NonEmptyString,

    #[envconfig(default = "us-west-2")]
    pub bedrock_region: String,

    // Only used to build the public link handed out by the notifier.
    #[envconfig(default = "eu-north-1")]
    pub object_storage_region: String,

    // Set to talk to a local S3-compatible store instead of AWS.
    pub object_storage_endpoint: Option<String>,

    #[envconfig(default = "true")]
    pub conditional_write_back: bool,

    #[envconfig(nested = true)]
    pub generation: GenerationConfig,

    pub discord_app_id: Option<NonEmptyString>,

    #[envconfig(default = "https://discord.com/api")]
    pub discord_api_url: String,

    #[envconfig(default = "5000")]
    pub webhook_timeout_ms: EnvMsDuration,

    #[envconfig(default = "1000000")]
    pub max_body_size: usize,

    #[envconfig(default = "16")]
    pub max_concurrent_invocations: usize,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn write_condition(&self) -> WriteCondition {
        if self.conditional_write_back {
            WriteCondition::ExistingRowUnclaimed
        } else {
            WriteCondition::None
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct GenerationConfig {
    #[envconfig(from = "GENERATION_CFG_SCALE", default = "8")]
    pub cfg_scale: u32,

    #[envconfig(from = "GENERATION_HEIGHT", default = "512")]
    pub height: u32,

    #[envconfig(from = "GENERATION_WIDTH", default = "512")]
    pub width: u32,

    #[envconfig(from = "GENERATION_SAMPLER", default = "DDIM")]
    pub sampler: String,

    #[envconfig(from = "GENERATION_SAMPLES", default = "1")]
    pub samples: u32,

    #[envconfig(from = "GENERATION_STEPS", default = "50")]
    pub steps: u32,
}

impl From<&GenerationConfig> for GenerationSettings {
    fn from(config: &GenerationConfig) -> Self {
        GenerationSettings {
            cfg_scale: config.cfg_scale,
            height: config.height,
            width: config.width,
            sampler: config.sampler.clone(),
            samples: config.samples,
            steps: config.steps,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_generation_settings() {
        let env = HashMap::from([("TABLENAME".to_owned(), "prompts".to_owned())]);
        let config = Config::init_from_hashmap(&env).unwrap();

        assert_eq!(config.table_name.as_str(), "prompts");
        assert_eq!(config.bucket.as_str(), "halfjourneybucket1234");
        assert_eq!(config.model_id.as_str(), "stability.stable-diffusion-xl-v0");
        assert_eq!(config.bind(), "0.0.0.0:3310");
        assert_eq!(config.write_condition(), WriteCondition::ExistingRowUnclaimed);
        assert!(config.discord_app_id.is_none());
        assert_eq!(
            GenerationSettings::from(&config.generation),
            GenerationSettings::default()
        );
    }

    #[test]
    fn table_name_is_required() {
        let env = HashMap::new();
        assert!(Config::init_from_hashmap(&env).is_err());

        let env = HashMap::from([("TABLENAME".to_owned(), String::new())]);
        assert!(Config::init_from_hashmap(&env).is_err());
    }

    #[test]
    fn unconditional_write_back_can_be_restored() {
        let env = HashMap::from([
            ("TABLENAME".to_owned(), "prompts".to_owned()),
            ("CONDITIONAL_WRITE_BACK".to_owned(), "false".to_owned()),
            ("GENERATION_STEPS".to_owned(), "30".to_owned()),
        ]);
        let config = Config::init_from_hashmap(&env).unwrap();

        assert_eq!(config.write_condition(), WriteCondition::None);
        assert_eq!(GenerationSettings::from(&config.generation).steps, 30);
    }

    #[test]
    fn parses_ms_durations() {
        assert_eq!(
            "250".parse::<EnvMsDuration>().unwrap().0,
            time::Duration::from_millis(250)
        );
        assert_eq!(
            "soon".parse::<EnvMsDuration>().unwrap_err(),
            ParseEnvMsDurationError
        );
    }
}
