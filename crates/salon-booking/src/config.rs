use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::scheduling::{OperatingHours, TransitionPolicy};

/// Value shipped in sample `.env` files; treated the same as no key.
const PLACEHOLDER_API_KEY: &str = "your_openai_api_key_here";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub database_path: PathBuf,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub request_timeout_seconds: u64,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub chat_model: String,
    pub chat_temperature: f32,
    pub llm_timeout_seconds: u64,
    pub agent_max_steps: usize,
    pub chat_history_limit: usize,
    pub slot_start_hour: u32,
    pub slot_end_hour: u32,
    pub slot_duration_minutes: u32,
    pub strict_status_transitions: bool,
    pub seed_sample_data: bool,
    pub salon_name: String,
    pub salon_phone: String,
    pub salon_address: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let openai_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let config = Self {
            api_host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            api_port: env::var("API_PORT").unwrap_or_else(|_| "8080".into()).parse()?,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "./data/salon.db".into())
                .into(),
            upload_dir: env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "./uploads/documents".into())
                .into(),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| "10485760".into())
                .parse()?,
            request_timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "120".into())
                .parse()?,
            openai_api_key,
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            chat_model: env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            chat_temperature: env::var("CHAT_TEMPERATURE")
                .unwrap_or_else(|_| "0.7".into())
                .parse()?,
            llm_timeout_seconds: env::var("LLM_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "60".into())
                .parse()?,
            agent_max_steps: env::var("AGENT_MAX_STEPS")
                .unwrap_or_else(|_| "6".into())
                .parse()?,
            chat_history_limit: env::var("CHAT_HISTORY_LIMIT")
                .unwrap_or_else(|_| "40".into())
                .parse()?,
            slot_start_hour: env::var("SLOT_START_HOUR")
                .unwrap_or_else(|_| "9".into())
                .parse()?,
            slot_end_hour: env::var("SLOT_END_HOUR")
                .unwrap_or_else(|_| "18".into())
                .parse()?,
            slot_duration_minutes: env::var("SLOT_DURATION_MINUTES")
                .unwrap_or_else(|_| "60".into())
                .parse()?,
            strict_status_transitions: env::var("STRICT_STATUS_TRANSITIONS")
                .unwrap_or_else(|_| "false".into())
                .parse()?,
            seed_sample_data: env::var("SEED_SAMPLE_DATA")
                .unwrap_or_else(|_| "true".into())
                .parse()?,
            salon_name: env::var("SALON_NAME").unwrap_or_else(|_| "My Nail Store".into()),
            salon_phone: env::var("SALON_PHONE").unwrap_or_else(|_| "0123456788".into()),
            salon_address: env::var("SALON_ADDRESS")
                .unwrap_or_else(|_| "01 Hai Banh Chung, District 4, Hon Da City".into()),
        };

        config
            .operating_hours()
            .validate()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .context("Invalid SLOT_START_HOUR / SLOT_END_HOUR / SLOT_DURATION_MINUTES")?;
        if config.agent_max_steps == 0 {
            return Err(anyhow::anyhow!("AGENT_MAX_STEPS must be at least 1"));
        }

        Ok(config)
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.api_host, self.api_port))
    }

    pub fn operating_hours(&self) -> OperatingHours {
        OperatingHours::new(
            self.slot_start_hour,
            self.slot_end_hour,
            self.slot_duration_minutes,
        )
    }

    pub fn transition_policy(&self) -> TransitionPolicy {
        if self.strict_status_transitions {
            TransitionPolicy::Strict
        } else {
            TransitionPolicy::Permissive
        }
    }

    /// The usable model key, if any.
    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .filter(|key| *key != PLACEHOLDER_API_KEY)
    }

    pub fn agent_enabled(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn print_config(&self) {
        info!("API address: {}:{}", self.api_host, self.api_port);
        info!("Database: {}", self.database_path.display());
        info!(
            "Uploads: {} (max {} bytes)",
            self.upload_dir.display(),
            self.max_upload_bytes
        );
        info!(
            "Chat model: {} at {} (temperature {}, key {})",
            self.chat_model,
            self.openai_base_url,
            self.chat_temperature,
            if self.agent_enabled() { "set" } else { "not configured" }
        );
        info!(
            "Agent: {} steps per turn, {} messages of history",
            self.agent_max_steps, self.chat_history_limit
        );
        info!(
            "Operating hours: {:02}:00-{:02}:00, {} minute slots",
            self.slot_start_hour, self.slot_end_hour, self.slot_duration_minutes
        );
        info!(
            "Status transitions: {}",
            if self.strict_status_transitions { "strict" } else { "permissive" }
        );
        info!("Salon: {} / {} / {}", self.salon_name, self.salon_phone, self.salon_address);
    }
}

#[cfg(test)]
pub(crate) fn create_test_config() -> Config {
    Config {
        api_host: "127.0.0.1".into(),
        api_port: 8080,
        database_path: PathBuf::from(":memory:"),
        upload_dir: std::env::temp_dir().join("salon-booking-test-uploads"),
        max_upload_bytes: 1024 * 1024,
        request_timeout_seconds: 30,
        openai_api_key: None,
        openai_base_url: "http://127.0.0.1:1".into(),
        chat_model: "gpt-4o-mini".into(),
        chat_temperature: 0.7,
        llm_timeout_seconds: 5,
        agent_max_steps: 4,
        chat_history_limit: 40,
        slot_start_hour: 9,
        slot_end_hour: 18,
        slot_duration_minutes: 60,
        strict_status_transitions: false,
        seed_sample_data: false,
        salon_name: "My Nail Store".into(),
        salon_phone: "0123456788".into(),
        salon_address: "01 Hai Banh Chung".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_key_disables_agent() {
        let mut config = create_test_config();
        assert!(!config.agent_enabled());

        config.openai_api_key = Some(PLACEHOLDER_API_KEY.into());
        assert!(!config.agent_enabled());
        assert_eq!(config.api_key(), None);

        config.openai_api_key = Some("sk-live".into());
        assert!(config.agent_enabled());
        assert_eq!(config.api_key(), Some("sk-live"));
    }

    #[test]
    fn test_derived_domain_values() {
        let mut config = create_test_config();
        let hours = config.operating_hours();
        assert_eq!((hours.start_hour, hours.end_hour, hours.slot_minutes), (9, 18, 60));
        assert_eq!(config.transition_policy(), TransitionPolicy::Permissive);

        config.strict_status_transitions = true;
        assert_eq!(config.transition_policy(), TransitionPolicy::Strict);
    }

    #[test]
    fn test_api_addr() {
        let mut config = create_test_config();
        assert_eq!(config.api_addr().unwrap().port(), 8080);
        config.api_host = "not a host".into();
        assert!(config.api_addr().is_err());
    }
}
