use std::collections::HashMap;

use crate::config::AppConfig;

const SERVICE_WILDCARD: &str = "*";

/// Maps `service.method` to the endpoint URL that serves it.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    methods: HashMap<String, String>,
    services: HashMap<String, String>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: &str, method: &str, url: &str) -> &mut Self {
        self.methods
            .insert(format!("{}.{}", service, method), url.to_string());
        self
    }

    /// Fallback for every method of `service` without its own route.
    pub fn register_service(&mut self, service: &str, url: &str) -> &mut Self {
        self.services.insert(service.to_string(), url.to_string());
        self
    }

    pub fn resolve(&self, service: &str, method: &str) -> Option<&str> {
        self.methods
            .get(&format!("{}.{}", service, method))
            .or_else(|| self.services.get(service))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.services.is_empty()
    }

    /// Every `service.method=url` entry becomes a route, `service.*=url` a
    /// service fallback. Keys without a dot are settings and are skipped.
    pub fn from_config(config: &AppConfig) -> Result<Self, String> {
        let mut table = Self::new();
        for (key, url) in config.iter() {
            let Some((service, method)) = key.rsplit_once('.') else {
                continue;
            };
            if service.is_empty() || method.is_empty() {
                return Err(format!("Invalid route key {:?}", key));
            }
            if url.trim().is_empty() {
                return Err(format!("Route {:?} has no url", key));
            }
            if method == SERVICE_WILDCARD {
                table.register_service(service, url.trim());
            } else {
                table.register(service, method, url.trim());
            }
        }
        Ok(table)
    }
}
