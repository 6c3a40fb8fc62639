use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub candidate: CandidateSettings,
    pub crawler: CrawlerSettings,
    pub email: EmailSettings,
    pub api: ApiSettings,
    pub outreach: OutreachSettings,
    pub tracker: TrackerSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct CandidateSettings {
    pub name: String,
    pub signature: String,
    pub cv_path: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct CrawlerSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_depth: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_pages: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub delay_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct EmailSettings {
    pub smtp_server: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub smtp_port: u16,
    pub sender: String,
    pub password: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub delay_min_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub delay_max_secs: u64,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_retries: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub backoff_factor: f64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub rate_limit_pause_secs: f64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_secs: u64,
}

#[derive(serde::Deserialize, Clone)]
pub struct OutreachSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub api_calls_limit: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub api_calls_pause_secs: u64,
}

#[derive(serde::Deserialize, Clone)]
pub struct TrackerSettings {
    pub log_path: String,
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT.");
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
