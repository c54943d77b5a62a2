use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::executor::ResponseSummary;
use crate::utils::{parse_status_ranges, StatusRanges};

/// Compiled-in copy of the shipped signature database, used when the
/// external file is missing or malformed.
const DEFAULT_SIGNATURES: &str = include_str!("../../db/waf_signatures.json");

/// Whether a signature identifies edge infrastructure (a WAF in front of
/// the origin) or application-layer behavior behind it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureLayer {
    Infra,
    App,
}

#[derive(Debug, Error)]
pub enum WafDbError {
    #[error("failed to read signature file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed signature file: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid regex in signature '{vendor}': {source}")]
    BadRegex {
        vendor: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid status pattern in signature '{vendor}': {message}")]
    BadStatus { vendor: String, message: String },
}

#[derive(Deserialize)]
struct RawSignature {
    vendor: String,
    layer: SignatureLayer,
    label: String,
    #[serde(rename = "match", default)]
    rules: RawRules,
}

#[derive(Deserialize, Default)]
struct RawRules {
    #[serde(default)]
    status: Vec<StatusPattern>,
    #[serde(default)]
    header: Vec<RawHeader>,
    #[serde(default)]
    body_regex: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusPattern {
    Code(u16),
    Range(String),
}

#[derive(Deserialize)]
struct RawHeader {
    name: String,
    regex: String,
}

/// One compiled signature. A signature matches when every rule group it
/// specifies matches: the status falls in the listed set, each named
/// header matches its regex, and at least one body regex hits.
pub struct WafSignature {
    pub vendor: String,
    pub layer: SignatureLayer,
    pub label: String,
    status: StatusRanges,
    headers: Vec<(String, Regex)>,
    body: Vec<Regex>,
}

impl WafSignature {
    fn matches(&self, summary: &ResponseSummary) -> bool {
        if !self.status.is_empty() && !self.status.contains(summary.status) {
            return false;
        }
        for (name, re) in self.headers.iter() {
            match summary.header(name) {
                Some(value) if re.is_match(value) => {}
                _ => return false,
            }
        }
        if !self.body.is_empty() {
            let text = summary.text();
            if !self.body.iter().any(|re| re.is_match(&text)) {
                return false;
            }
        }
        true
    }
}

/// Ordered signature database loaded from `db/waf_signatures.json`.
/// Signatures are evaluated in array order; the first match wins, so
/// more specific entries belong earlier in the file.
pub struct WafDatabase {
    signatures: Vec<WafSignature>,
}

impl WafDatabase {
    /// Loads the database from disk, falling back to the built-in set on
    /// any failure. The degradation is logged once here and scanning
    /// continues.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match Self::from_json(&text) {
                Ok(db) => db,
                Err(e) => {
                    log::warn!(
                        "signature file '{}' is malformed, using built-in signatures: {e}",
                        path.display()
                    );
                    Self::builtin()
                }
            },
            Err(e) => {
                log::warn!(
                    "cannot read signature file '{}', using built-in signatures: {e}",
                    path.display()
                );
                Self::builtin()
            }
        }
    }

    pub fn from_json(text: &str) -> Result<Self, WafDbError> {
        let raw: Vec<RawSignature> =
            serde_json::from_str(text).map_err(|e| WafDbError::Parse { source: e })?;
        let mut signatures = Vec::with_capacity(raw.len());
        for sig in raw {
            let mut status = StatusRanges::default();
            for pattern in sig.rules.status.iter() {
                let parsed = match pattern {
                    StatusPattern::Code(code) => parse_status_ranges(&code.to_string()),
                    StatusPattern::Range(range) => parse_status_ranges(range),
                };
                let parsed = parsed.map_err(|message| WafDbError::BadStatus {
                    vendor: sig.vendor.clone(),
                    message,
                })?;
                status.merge(&parsed);
            }

            let mut headers = Vec::with_capacity(sig.rules.header.len());
            for h in sig.rules.header.iter() {
                let re = Regex::new(&h.regex).map_err(|e| WafDbError::BadRegex {
                    vendor: sig.vendor.clone(),
                    source: e,
                })?;
                headers.push((h.name.to_ascii_lowercase(), re));
            }

            let mut body = Vec::with_capacity(sig.rules.body_regex.len());
            for pattern in sig.rules.body_regex.iter() {
                body.push(Regex::new(pattern).map_err(|e| WafDbError::BadRegex {
                    vendor: sig.vendor.clone(),
                    source: e,
                })?);
            }

            signatures.push(WafSignature {
                vendor: sig.vendor,
                layer: sig.layer,
                label: sig.label,
                status,
                headers,
                body,
            });
        }
        Ok(Self { signatures })
    }

    /// The compiled-in signature set shipped with the binary.
    pub fn builtin() -> Self {
        match Self::from_json(DEFAULT_SIGNATURES) {
            Ok(db) => db,
            Err(e) => {
                log::error!("built-in signature set failed to compile: {e}");
                Self {
                    signatures: Vec::new(),
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn detect(&self, summary: &ResponseSummary) -> Option<&WafSignature> {
        self.signatures.iter().find(|sig| sig.matches(summary))
    }
}

/// Built-in stock error pages of common servers. A hit means the origin
/// itself produced the page (server configuration), not the application.
pub fn stock_server_label(summary: &ResponseSummary) -> Option<&'static str> {
    if !matches!(summary.status, 403 | 404 | 500..=503) {
        return None;
    }
    let server = summary
        .header("server")
        .unwrap_or_default()
        .to_ascii_lowercase();
    let body = summary.text().to_ascii_lowercase();

    if server.contains("nginx") {
        if body.contains("<center>nginx</center>")
            || (body.len() < 200
                && (body.contains("403 forbidden") || body.contains("404 not found")))
        {
            return Some("Nginx Default");
        }
        return None;
    }

    if server.contains("apache") {
        if body.contains("<address>apache")
            || (body.len() < 200 && (body.contains("forbidden") || body.contains("not found")))
        {
            return Some("Apache Default");
        }
        return None;
    }

    if server.contains("microsoft-iis") || server == "iis" {
        if body.contains("the resource you are looking for has been removed")
            || body.contains("the page cannot be displayed")
            || body.len() < 200
        {
            return Some("IIS Default");
        }
        return None;
    }

    None
}
