use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use validator::Validate;

use crate::error::{ProxyError, ProxyResult};
use crate::plugin::PluginDescriptor;

/// On-disk configuration schema, loaded from a JSON-with-comments file
/// (`spec.md` §6). Grounded on the teacher's `config::Config`
/// (`#[derive(Validate)]` + nested validation + nested nested structs),
/// adapted from pingsix's route/upstream/service schema to devproxy's
/// url-matching/plugin schema and from YAML to JSONC.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(length(min = 1, message = "urlsToWatch must not be empty"))]
    #[serde(rename = "urlsToWatch", default)]
    pub urls_to_watch: Vec<String>,

    #[serde(rename = "pluginConfig", default)]
    #[validate(nested)]
    pub plugin_config: PluginConfigSection,

    #[serde(default)]
    pub record: bool,

    #[serde(rename = "logLevel", default = "default_log_level")]
    pub log_level: String,

    #[serde(rename = "ipAddress", default = "default_ip_address")]
    pub ip_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(rename = "timeoutSeconds", default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ip_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_timeout_seconds() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            urls_to_watch: vec!["https://jsonplaceholder.typicode.com/*".to_string()],
            plugin_config: PluginConfigSection::default(),
            record: false,
            log_level: default_log_level(),
            ip_address: default_ip_address(),
            port: default_port(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct PluginConfigSection {
    #[validate(nested)]
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PluginEntry {
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(rename = "configSection", default)]
    pub config_section: JsonValue,

    #[serde(rename = "urlsToWatch", default)]
    pub urls_to_watch: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl From<&PluginEntry> for PluginDescriptor {
    fn from(entry: &PluginEntry) -> Self {
        PluginDescriptor {
            name: entry.name.clone(),
            enabled: entry.enabled,
            config_section: entry.config_section.clone(),
            urls_to_watch: entry.urls_to_watch.clone(),
        }
    }
}

impl Config {
    pub fn plugin_descriptors(&self) -> Vec<PluginDescriptor> {
        self.plugin_config.plugins.iter().map(PluginDescriptor::from).collect()
    }

    pub fn from_jsonc(text: &str) -> ProxyResult<Self> {
        let stripped = strip_jsonc_comments(text);
        let config: Config = serde_json::from_str(&stripped)?;
        config
            .validate()
            .map_err(|e| ProxyError::Configuration(e.to_string()))?;
        Ok(config)
    }

    pub fn load_from_path(path: &std::path::Path) -> ProxyResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_jsonc(&text)
    }

    /// CLI flags override config-file values, mirroring the teacher's
    /// `Config::merge_with_opt`.
    pub fn merge_with_cli(mut self, cli: &crate::cli::Cli) -> Self {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(ip) = &cli.ip_address {
            self.ip_address = ip.clone();
        }
        if !cli.urls_to_watch.is_empty() {
            self.urls_to_watch = cli.urls_to_watch.clone();
        }
        if cli.record {
            self.record = true;
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
        self
    }
}

/// Strips `//` line comments and `/* */` block comments outside of
/// string literals so the result can be parsed with plain
/// `serde_json::from_str`. This is the whole of devproxy's JSONC
/// support; it intentionally does not attempt trailing-comma tolerance.
fn strip_jsonc_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_jsonc_with_comments() {
        let text = r#"
        {
            // watch only the api host
            "urlsToWatch": ["https://api.example.com/*"],
            /* plugins run in this exact order */
            "pluginConfig": { "plugins": [ { "name": "echo" } ] },
            "record": true
        }
        "#;
        let config = Config::from_jsonc(text).unwrap();
        assert_eq!(config.urls_to_watch, vec!["https://api.example.com/*"]);
        assert!(config.record);
        assert_eq!(config.plugin_config.plugins.len(), 1);
        assert_eq!(config.plugin_config.plugins[0].name, "echo");
    }

    #[test]
    fn comment_markers_inside_strings_are_preserved() {
        let text = r#"{ "urlsToWatch": ["https://example.com/not-a-//-comment"] }"#;
        let config = Config::from_jsonc(text).unwrap();
        assert_eq!(config.urls_to_watch[0], "https://example.com/not-a-//-comment");
    }

    #[test]
    fn empty_urls_to_watch_fails_validation() {
        let text = r#"{ "urlsToWatch": [] }"#;
        assert!(Config::from_jsonc(text).is_err());
    }

    #[test]
    fn plugin_descriptors_preserve_order() {
        let text = r#"{
            "urlsToWatch": ["https://example.com/*"],
            "pluginConfig": { "plugins": [ { "name": "b" }, { "name": "a" } ] }
        }"#;
        let config = Config::from_jsonc(text).unwrap();
        let names: Vec<String> = config.plugin_descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["b".to_string(), "a".to_string()]);
    }
}
