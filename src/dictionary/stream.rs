use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::utils;

#[derive(Debug, Error)]
pub enum WordlistError {
    #[error("failed to open wordlist '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read wordlist '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Which letter-case forms each raw entry is emitted in. When several
/// flags are set the entry is emitted once per selected form; collisions
/// are deduplicated downstream by the expander.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaseTransforms {
    pub lowercase: bool,
    pub uppercase: bool,
    pub capitalization: bool,
}

impl CaseTransforms {
    fn apply(&self, entry: &str) -> Vec<String> {
        if !self.lowercase && !self.uppercase && !self.capitalization {
            return vec![entry.to_string()];
        }
        let mut out = Vec::new();
        if self.lowercase {
            out.push(entry.to_ascii_lowercase());
        }
        if self.uppercase {
            out.push(entry.to_ascii_uppercase());
        }
        if self.capitalization {
            out.push(capitalize(entry));
        }
        out
    }
}

fn capitalize(entry: &str) -> String {
    let mut chars = entry.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Lazy, finite stream of raw wordlist entries. Files are read line by
/// line and never materialized; comments, blanks, and duplicate entries
/// (tracked by a compact set of 64-bit hashes) are skipped.
pub struct WordlistStream {
    remaining: VecDeque<PathBuf>,
    current: Option<(String, Lines<BufReader<File>>)>,
    seen: HashSet<u64>,
    transforms: CaseTransforms,
    queued: VecDeque<String>,
}

impl WordlistStream {
    pub fn new(files: &[PathBuf], transforms: CaseTransforms) -> Self {
        Self {
            remaining: files.iter().cloned().collect(),
            current: None,
            seen: HashSet::new(),
            transforms,
            queued: VecDeque::new(),
        }
    }

    pub async fn next_entry(&mut self) -> Result<Option<String>, WordlistError> {
        loop {
            if let Some(entry) = self.queued.pop_front() {
                return Ok(Some(entry));
            }

            let (path, lines) = match self.current.as_mut() {
                Some(current) => current,
                None => {
                    let Some(next_path) = self.remaining.pop_front() else {
                        return Ok(None);
                    };
                    let display = next_path.to_string_lossy().to_string();
                    let handle = File::open(&next_path).await.map_err(|e| WordlistError::Open {
                        path: display.clone(),
                        source: e,
                    })?;
                    self.current = Some((display, BufReader::new(handle).lines()));
                    continue;
                }
            };

            match lines.next_line().await {
                Ok(Some(line)) => {
                    let entry = utils::lstrip_once(line.trim(), '/');
                    if entry.is_empty() || entry.starts_with('#') {
                        continue;
                    }
                    if !self.seen.insert(hash_entry(entry)) {
                        continue;
                    }
                    self.queued.extend(self.transforms.apply(entry));
                }
                Ok(None) => {
                    self.current = None;
                }
                Err(e) => {
                    return Err(WordlistError::Read {
                        path: path.clone(),
                        source: e,
                    })
                }
            }
        }
    }
}

fn hash_entry(entry: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    entry.hash(&mut hasher);
    hasher.finish()
}
