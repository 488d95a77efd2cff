use std::collections::HashMap;
use std::env;
use std::fs;
use std::time::Duration;

pub const DEFAULT_REQUEST_BUFFER_MS: u64 = 20;
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Default, Clone)]
pub struct AppConfig {
    values: HashMap<String, String>,
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self, String> {
        let content = fs::read_to_string(path).map_err(|e| format!("{}: {}", path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let mut values = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(format!("Invalid config line {}: {}", idx + 1, line));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("Missing key on config line {}: {}", idx + 1, line));
            }
            let mut value = value.trim().to_string();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = value[1..value.len() - 1].to_string();
            }
            values.insert(key.to_string(), value);
        }
        Ok(Self { values })
    }

    /// Loads `CONFIG_FILE` when set, otherwise an empty config.
    pub fn from_env() -> Result<Self, String> {
        match env::var("CONFIG_FILE") {
            Ok(path) => Self::from_file(&path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    /// File value first, then the process environment.
    pub fn get_prop(&self, key: &str) -> Option<String> {
        self.get(key).or_else(|| env::var(key).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// How long calls to one endpoint are held before the batch is sent.
    pub request_buffer: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_buffer: Duration::from_millis(DEFAULT_REQUEST_BUFFER_MS),
        }
    }
}

impl DispatcherConfig {
    pub fn with_request_buffer(request_buffer: Duration) -> Self {
        Self { request_buffer }
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, String> {
        let Some(raw) = config.get_prop("RPC_REQUEST_BUFFER_MS") else {
            return Ok(Self::default());
        };
        let millis = raw
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("Invalid RPC_REQUEST_BUFFER_MS {:?}: {}", raw, e))?;
        Ok(Self::with_request_buffer(Duration::from_millis(millis)))
    }
}
