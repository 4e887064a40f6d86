use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use fieldkit_fetch::{AcquisitionRequest, EngineOptions};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "FIELDKIT_";

/// Settings merged from defaults, `fieldkit.toml`, `FIELDKIT_*` variables and
/// command-line flags, in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage_dir: PathBuf,
    pub url: Option<String>,
    pub token: Option<String>,
    pub file_name: Option<String>,
    pub timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub trusted_domains: Vec<String>,
    pub space_margin_mb: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let storage_dir = home::home_dir()
            .unwrap_or_default()
            .join(".fieldkit")
            .join("models");

        Self {
            storage_dir,
            url: None,
            token: None,
            file_name: None,
            timeout_secs: 30 * 60,
            probe_timeout_secs: 15,
            trusted_domains: Vec::new(),
            space_margin_mb: 50,
        }
    }
}

impl Settings {
    pub fn figment(config: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load(config: &Path) -> Result<Self> {
        Self::figment(config)
            .extract()
            .with_context(|| format!("failed to load settings from {}", config.display()))
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions::new(&self.storage_dir)
            .trusted_domains(self.trusted_domains.iter().cloned())
            .probe_timeout(Duration::from_secs(self.probe_timeout_secs))
            .space_margin(self.space_margin_mb.saturating_mul(1024 * 1024))
    }

    /// Configured file name, or the last path segment of the URL.
    pub fn file_name(&self) -> Result<String> {
        if let Some(name) = self.file_name.as_deref().filter(|n| !n.is_empty()) {
            return Ok(name.to_string());
        }

        let url = self.url()?;
        let parsed = url::Url::parse(url).with_context(|| format!("invalid url: {url}"))?;
        match parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|last| !last.is_empty())
        {
            Some(last) => Ok(last.to_string()),
            None => bail!("cannot derive a file name from {url}; set file_name"),
        }
    }

    pub fn url(&self) -> Result<&str> {
        self.url
            .as_deref()
            .filter(|u| !u.is_empty())
            .context("no url configured; pass --url or set url in fieldkit.toml")
    }

    pub fn request(&self, force_fresh: bool) -> Result<AcquisitionRequest> {
        Ok(AcquisitionRequest::new(self.url()?, self.file_name()?)
            .maybe_credential(self.token.clone())
            .timeout(Duration::from_secs(self.timeout_secs))
            .force_fresh(force_fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "fieldkit.toml",
                r#"
                    storage_dir = "/data/models"
                    url = "https://huggingface.co/org/asr/resolve/main/asr.bin"
                    trusted_domains = ["huggingface.co"]
                    timeout_secs = 60
                "#,
            )?;
            jail.set_env("FIELDKIT_TIMEOUT_SECS", "120");
            jail.set_env("FIELDKIT_TOKEN", "hf_secret");

            let settings = Settings::load(Path::new("fieldkit.toml")).map_err(|e| e.to_string())?;

            assert_eq!(settings.storage_dir, PathBuf::from("/data/models"));
            assert_eq!(settings.timeout_secs, 120);
            assert_eq!(settings.token.as_deref(), Some("hf_secret"));
            assert_eq!(settings.probe_timeout_secs, 15);
            assert_eq!(settings.file_name().map_err(|e| e.to_string())?, "asr.bin");
            Ok(())
        });
    }

    #[test]
    fn missing_file_uses_defaults() {
        Jail::expect_with(|_| {
            let settings = Settings::load(Path::new("absent.toml")).map_err(|e| e.to_string())?;
            assert_eq!(settings, Settings::default());
            assert!(settings.url().is_err());
            Ok(())
        });
    }

    #[test]
    fn engine_options_from_settings() {
        let settings = Settings {
            storage_dir: PathBuf::from("/data/models"),
            trusted_domains: vec!["huggingface.co".into()],
            space_margin_mb: 2,
            ..Settings::default()
        };
        let options = settings.engine_options();

        assert_eq!(options.space_margin, 2 * 1024 * 1024);
        assert_eq!(options.trusted_domains, vec!["huggingface.co".to_string()]);
        assert_eq!(
            options.partial_path("asr.bin"),
            PathBuf::from("/data/models/asr.bin.tmp")
        );
    }

    #[test]
    fn request_drops_empty_token() {
        let settings = Settings {
            url: Some("https://example.com/files/model.gguf".into()),
            token: Some(String::new()),
            ..Settings::default()
        };
        let request = settings.request(true).unwrap();

        assert_eq!(request.file_name, "model.gguf");
        assert!(request.credential.is_none());
        assert!(request.force_fresh);
    }
}
