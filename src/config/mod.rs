pub mod error;
pub mod load;
pub mod settings;

pub use error::ConfigError;
pub use load::load_settings;
pub use settings::{
    AgentSettings, DeliverySettings, QueueBackend, QueueSettings, Settings, API_BASE_ENV,
    DEFAULT_API_BASE, DEFAULT_QUEUE_TOPIC, DEFAULT_REDIS_URL, DEFAULT_TOKEN_ENV, REDIS_URL_ENV,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::AdapterKind;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn empty_settings_use_documented_defaults() {
        let settings = Settings::from_yaml("").expect("parse");
        assert_eq!(settings.queue.backend, QueueBackend::Redis);
        assert_eq!(settings.queue.topic, DEFAULT_QUEUE_TOPIC);
        assert_eq!(settings.queue.concurrency, 2);
        assert_eq!(settings.queue.attempts, 3);
        assert_eq!(settings.delivery.request_timeout_secs, 30);
        assert_eq!(settings.delivery.max_retries, 3);
        assert_eq!(settings.delivery.default_retry_after_ms, 5_000);
        assert_eq!(settings.delivery.max_jitter_ms, 500);
        assert_eq!(settings.delivery.chunk_chars, 2_000);
        assert_eq!(settings.agent.adapter, AdapterKind::Claude);
        settings.validate().expect("defaults validate");
    }

    #[test]
    fn partial_sections_keep_defaults_for_missing_fields() {
        let settings = Settings::from_yaml(
            r#"
queue:
  backend: file
  concurrency: 4
agent:
  adapter: codex
  system_prompt: "Answer briefly."
  known_bad_resume_versions: ["1.0.0"]
"#,
        )
        .expect("parse");
        assert_eq!(settings.queue.backend, QueueBackend::File);
        assert_eq!(settings.queue.concurrency, 4);
        assert_eq!(settings.queue.topic, DEFAULT_QUEUE_TOPIC);
        assert_eq!(settings.agent.adapter, AdapterKind::Codex);
        assert_eq!(settings.agent.system_prompt.as_deref(), Some("Answer briefly."));
        assert_eq!(settings.delivery.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn validation_rejects_zero_concurrency_and_bad_redis_url() {
        let mut settings = Settings::default();
        settings.queue.concurrency = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.queue.redis_url = "http://localhost".to_string();
        let err = settings.validate().expect_err("bad url");
        assert!(err.to_string().contains("queue.redis_url"));

        settings.queue.backend = QueueBackend::File;
        settings.validate().expect("file backend ignores redis url");
    }

    #[test]
    fn validation_caps_chunk_size_at_platform_limit() {
        let mut settings = Settings::default();
        settings.delivery.chunk_chars = 2_001;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn load_settings_applies_env_overrides_over_file() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        fs::write(&path, "queue:\n  redis_url: redis://file-host:6379\n").expect("write");

        std::env::set_var(REDIS_URL_ENV, "redis://env-host:6380");
        let loaded = load_settings(&path);
        std::env::remove_var(REDIS_URL_ENV);

        let settings = loaded.expect("load");
        assert_eq!(settings.queue.redis_url, "redis://env-host:6380");
    }

    #[test]
    fn missing_settings_file_loads_defaults() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let dir = tempdir().expect("tempdir");
        let settings = load_settings(&dir.path().join("absent.yaml")).expect("defaults");
        assert_eq!(settings.queue.topic, DEFAULT_QUEUE_TOPIC);
    }
}
