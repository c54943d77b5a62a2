use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::StatusRanges;

/// Immutable scan configuration, built once by the CLI layer and
/// threaded through constructors. Nothing in the engine mutates it, so
/// several independent scans can run in one process.
#[derive(Clone, Debug)]
pub struct ScanConfig {
    pub urls: Vec<String>,

    pub wordlists: Vec<PathBuf>,
    pub extensions: Vec<String>,
    pub force_extensions: bool,
    pub overwrite_extensions: bool,
    pub exclude_extensions: Vec<String>,
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
    pub uppercase: bool,
    pub lowercase: bool,
    pub capitalization: bool,
    pub mutation: bool,

    pub threads: usize,
    pub recursive: bool,
    pub deep_recursive: bool,
    pub force_recursive: bool,
    pub recursion_depth: usize,
    pub recursion_status: StatusRanges,
    pub filter_threshold: u32,
    pub subdirs: Vec<String>,
    pub exclude_subdirs: Vec<String>,

    pub include_status: StatusRanges,
    pub exclude_status: StatusRanges,
    pub exclude_sizes: HashSet<usize>,
    pub exclude_texts: Vec<String>,
    pub exclude_regex: Option<String>,
    pub exclude_redirect: Option<String>,
    pub exclude_response: Option<String>,
    pub min_response_size: usize,
    /// Zero means unbounded.
    pub max_response_size: usize,
    pub no_wildcard: bool,
    pub calibration: bool,
    pub skip_on_status: StatusRanges,

    pub http_method: String,
    pub headers: Vec<(String, String)>,
    pub cookie: Option<String>,
    pub auth: Option<String>,
    pub user_agent: Option<String>,
    pub follow_redirects: bool,
    pub proxy: Option<String>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,

    pub timeout: Duration,
    pub delay: Duration,
    /// Requests per second across all targets; zero means unlimited.
    pub max_rate: u32,
    pub retries: u32,
    pub exit_on_error: bool,
    pub max_time: Option<Duration>,
    pub target_max_time: Option<Duration>,

    pub waf_signatures: PathBuf,
    pub blacklist_dir: Option<PathBuf>,
    pub session_file: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            wordlists: Vec::new(),
            extensions: Vec::new(),
            force_extensions: false,
            overwrite_extensions: false,
            exclude_extensions: Vec::new(),
            prefixes: Vec::new(),
            suffixes: Vec::new(),
            uppercase: false,
            lowercase: false,
            capitalization: false,
            mutation: false,
            threads: 25,
            recursive: false,
            deep_recursive: false,
            force_recursive: false,
            recursion_depth: 0,
            recursion_status: crate::utils::parse_status_ranges("200-299,300-399")
                .unwrap_or_default(),
            filter_threshold: 0,
            subdirs: Vec::new(),
            exclude_subdirs: Vec::new(),
            include_status: StatusRanges::default(),
            exclude_status: StatusRanges::default(),
            exclude_sizes: HashSet::new(),
            exclude_texts: Vec::new(),
            exclude_regex: None,
            exclude_redirect: None,
            exclude_response: None,
            min_response_size: 0,
            max_response_size: 0,
            no_wildcard: false,
            calibration: false,
            skip_on_status: StatusRanges::default(),
            http_method: "GET".to_string(),
            headers: Vec::new(),
            cookie: None,
            auth: None,
            user_agent: None,
            follow_redirects: false,
            proxy: None,
            client_cert: None,
            client_key: None,
            timeout: Duration::from_secs(10),
            delay: Duration::ZERO,
            max_rate: 0,
            retries: 1,
            exit_on_error: false,
            max_time: None,
            target_max_time: None,
            waf_signatures: PathBuf::from("db/waf_signatures.json"),
            blacklist_dir: Some(PathBuf::from("db")),
            session_file: None,
        }
    }
}

/// On-disk config file; every field optional, CLI values win.
#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ConfigFile {
    pub urls: Option<Vec<String>>,
    pub wordlists: Option<Vec<String>>,
    pub extensions: Option<String>,
    pub force_extensions: Option<bool>,
    pub overwrite_extensions: Option<bool>,
    pub exclude_extensions: Option<String>,
    pub prefixes: Option<String>,
    pub suffixes: Option<String>,
    pub mutation: Option<bool>,
    pub threads: Option<usize>,
    pub recursive: Option<bool>,
    pub deep_recursive: Option<bool>,
    pub force_recursive: Option<bool>,
    pub recursion_depth: Option<usize>,
    pub recursion_status: Option<String>,
    pub filter_threshold: Option<u32>,
    pub exclude_subdirs: Option<String>,
    pub include_status: Option<String>,
    pub exclude_status: Option<String>,
    pub exclude_sizes: Option<String>,
    pub exclude_texts: Option<Vec<String>>,
    pub exclude_regex: Option<String>,
    pub exclude_redirect: Option<String>,
    pub min_response_size: Option<usize>,
    pub max_response_size: Option<usize>,
    pub no_wildcard: Option<bool>,
    pub calibration: Option<bool>,
    pub skip_on_status: Option<String>,
    pub http_method: Option<String>,
    pub headers: Option<Vec<String>>,
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
    pub follow_redirects: Option<bool>,
    pub proxy: Option<String>,
    pub timeout: Option<f64>,
    pub delay: Option<f64>,
    pub max_rate: Option<u32>,
    pub retries: Option<u32>,
    pub exit_on_error: Option<bool>,
    pub max_time: Option<u64>,
    pub target_max_time: Option<u64>,
    pub waf_signatures: Option<String>,
    pub blacklist_dir: Option<String>,
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_dir()?.join(".dirprobe").join("config.yml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn load_config(path: &PathBuf, allow_missing: bool) -> Result<ConfigFile, String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str::<ConfigFile>(&contents)
            .map_err(|e| format!("failed to parse config '{}': {e}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("config file not found '{}'", path.display()))
        }
        Err(e) => Err(format!("failed to read config '{}': {e}", path.display())),
    }
}

fn default_config_yaml() -> String {
    r#"# dirprobe config
#
# Location (default):
#   ~/.dirprobe/config.yml
# CLI flags override anything set here.

# Targets
# urls:
#   - https://example.com/

# Dictionary
# wordlists:
#   - ./wordlists/common.txt
# extensions: php,html
# force_extensions: false
# overwrite_extensions: false
# prefixes: "."
# suffixes: "~"
# mutation: false

# Scan
threads: 25
recursive: false
deep_recursive: false
force_recursive: false
recursion_depth: 0
recursion_status: "200-299,300-399"
filter_threshold: 0
# exclude_subdirs: "static,assets"

# Filters
# include_status: "200-299,301,302,401,403"
# exclude_status: "404"
# exclude_sizes: "0,1024"
# exclude_texts: ["Page not found"]
# exclude_regex: "(?i)maintenance"
# exclude_redirect: "/login$"
# min_response_size: 0
# max_response_size: 0
no_wildcard: false
calibration: false
# skip_on_status: "429"

# HTTP
http_method: GET
# headers:
#   - "X-Forwarded-For: 127.0.0.1"
# cookie: "session=..."
# user_agent: ""
follow_redirects: false
# proxy: http://127.0.0.1:8080

# Runtime
timeout: 10.0
delay: 0.0
max_rate: 0
retries: 1
exit_on_error: false
# max_time: 3600
# target_max_time: 600

# Assets
waf_signatures: db/waf_signatures.json
blacklist_dir: db
"#
    .to_string()
}

pub fn ensure_default_config_file(path: &PathBuf) -> Result<(), String> {
    if path.exists() {
        return Ok(());
    }
    let parent = path
        .parent()
        .ok_or_else(|| format!("invalid config path '{}'", path.display()))?;
    std::fs::create_dir_all(parent).map_err(|e| {
        format!(
            "failed to create config directory '{}': {e}",
            parent.display()
        )
    })?;
    std::fs::write(path, default_config_yaml())
        .map_err(|e| format!("failed to write config file '{}': {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_baseline() {
        let config = ScanConfig::default();
        assert_eq!(config.threads, 25);
        assert_eq!(config.retries, 1);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.recursion_status.contains(200));
        assert!(config.recursion_status.contains(301));
        assert!(!config.recursion_status.contains(404));
    }

    #[test]
    fn template_config_parses_back() {
        let parsed: ConfigFile = serde_yaml::from_str(&default_config_yaml()).unwrap();
        assert_eq!(parsed.threads, Some(25));
        assert_eq!(parsed.http_method.as_deref(), Some("GET"));
        assert_eq!(parsed.no_wildcard, Some(false));
    }

    #[test]
    fn tilde_expansion_uses_home() {
        if home_dir().is_none() {
            return;
        }
        let expanded = expand_tilde("~/wordlists/common.txt");
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}
