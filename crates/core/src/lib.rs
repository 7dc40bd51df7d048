pub mod domain;
pub mod engine;
pub mod llm;
pub mod market;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_MATURATION_HOURS: i64 = 24;
    const DEFAULT_COLLABORATOR_TIMEOUT_SECS: u64 = 20;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub alpha_vantage_api_key: Option<String>,
        pub market_data_base_url: Option<String>,
        pub advisor_provider: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub openai_api_key: Option<String>,
        pub maturation_hours: i64,
        pub collaborator_timeout_secs: u64,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: non_empty_var("DATABASE_URL"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                alpha_vantage_api_key: non_empty_var("ALPHA_VANTAGE_API_KEY"),
                market_data_base_url: non_empty_var("MARKET_DATA_BASE_URL"),
                advisor_provider: non_empty_var("ADVISOR_PROVIDER"),
                anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
                openai_api_key: non_empty_var("OPENAI_API_KEY"),
                maturation_hours: parsed_var("ADVICE_MATURATION_HOURS")?
                    .unwrap_or(DEFAULT_MATURATION_HOURS),
                collaborator_timeout_secs: parsed_var("COLLABORATOR_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_COLLABORATOR_TIMEOUT_SECS),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_openai_api_key(&self) -> anyhow::Result<&str> {
            self.openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY is required")
        }

        pub fn maturation_window(&self) -> chrono::Duration {
            chrono::Duration::hours(self.maturation_hours.max(0))
        }

        pub fn collaborator_timeout(&self) -> Duration {
            Duration::from_secs(self.collaborator_timeout_secs.max(1))
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn parsed_var<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        non_empty_var(key)
            .map(|v| v.trim().parse::<T>())
            .transpose()
            .with_context(|| format!("{key} is not a valid number"))
    }
}
