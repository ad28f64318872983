//! Provider endpoints and the local credentials file.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProviderError, Result};

/// Default location of the credentials file, relative to the working directory.
pub const DEFAULT_CREDENTIALS_FILE: &str = ".aitest_config.json";

pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Vendors with a built-in client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    OpenAi,
    Anthropic,
}

impl Vendor {
    pub const ALL: [Vendor; 2] = [Vendor::OpenAi, Vendor::Anthropic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "openai",
            Vendor::Anthropic => "anthropic",
        }
    }

    /// Environment variable holding this vendor's API key.
    pub fn key_env(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "OPENAI_API_KEY",
            Vendor::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn base_url_env(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "OPENAI_BASE_URL",
            Vendor::Anthropic => "ANTHROPIC_BASE_URL",
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Vendor::OpenAi),
            "anthropic" => Ok(Vendor::Anthropic),
            other => Err(ProviderError::Config(format!("unknown vendor: {other}"))),
        }
    }
}

/// Endpoint settings for one provider client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl ProviderConfig {
    pub fn for_vendor(vendor: Vendor) -> Self {
        let base_url = match vendor {
            Vendor::OpenAi => OPENAI_DEFAULT_BASE_URL,
            Vendor::Anthropic => ANTHROPIC_DEFAULT_BASE_URL,
        };
        Self {
            base_url: base_url.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Defaults with the vendor's `*_BASE_URL` override applied.
    pub fn from_env(vendor: Vendor) -> Self {
        Self::from_lookup(vendor, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(vendor: Vendor, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::for_vendor(vendor);
        if let Some(url) = lookup(vendor.base_url_env()).filter(|u| !u.trim().is_empty()) {
            config.base_url = url;
        }
        config
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// `base_url` joined with `path`, without doubling the slash.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// API keys, read from the credentials file and the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_key: Option<String>,
}

impl Credentials {
    /// Reads the credentials file. A missing file yields empty credentials.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let creds: Credentials = serde_json::from_str(&raw)?;
                debug!(path = %path.display(), "loaded credentials file");
                Ok(creds)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the file, readable only by the owner on Unix.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Environment keys win over file keys.
    pub fn with_env(self) -> Self {
        self.with_lookup(|name| std::env::var(name).ok())
    }

    pub fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for vendor in Vendor::ALL {
            if let Some(key) = lookup(vendor.key_env()).filter(|k| !k.trim().is_empty()) {
                self.set_key(vendor, key);
            }
        }
        self
    }

    pub fn key_for(&self, vendor: Vendor) -> Option<&str> {
        let key = match vendor {
            Vendor::OpenAi => self.openai_key.as_deref(),
            Vendor::Anthropic => self.anthropic_key.as_deref(),
        };
        key.filter(|k| !k.trim().is_empty())
    }

    pub fn set_key(&mut self, vendor: Vendor, key: impl Into<String>) {
        let slot = match vendor {
            Vendor::OpenAi => &mut self.openai_key,
            Vendor::Anthropic => &mut self.anthropic_key,
        };
        *slot = Some(key.into());
    }
}
