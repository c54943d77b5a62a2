use std::collections::HashSet;

/// A set of HTTP status codes expressed as inclusive ranges, parsed from
/// CSV input such as `200-299,301,403`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusRanges {
    ranges: Vec<(u16, u16)>,
}

impl StatusRanges {
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, status: u16) -> bool {
        self.ranges
            .iter()
            .any(|(lo, hi)| (*lo..=*hi).contains(&status))
    }

    pub fn merge(&mut self, other: &StatusRanges) {
        self.ranges.extend_from_slice(&other.ranges);
    }
}

pub fn parse_status_ranges(value: &str) -> Result<StatusRanges, String> {
    let raw = value.trim();
    if raw.is_empty() {
        return Ok(StatusRanges::default());
    }

    let mut ranges: Vec<(u16, u16)> = Vec::new();
    for part in raw.split(',') {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = item.split_once('-') {
            let lo: u16 = lo
                .trim()
                .parse()
                .map_err(|_| format!("invalid status range '{item}'"))?;
            let hi: u16 = hi
                .trim()
                .parse()
                .map_err(|_| format!("invalid status range '{item}'"))?;
            if lo > hi {
                return Err(format!("inverted status range '{item}'"));
            }
            ranges.push((lo, hi));
        } else {
            let code: u16 = item
                .parse()
                .map_err(|_| format!("invalid status code '{item}'"))?;
            ranges.push((code, code));
        }
    }
    Ok(StatusRanges { ranges })
}

pub fn parse_usize_set_csv(value: &str) -> Result<HashSet<usize>, String> {
    let raw = value.trim();
    if raw.is_empty() {
        return Ok(HashSet::new());
    }
    let mut out = HashSet::new();
    for part in raw.split(',') {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        let size: usize = item
            .parse()
            .map_err(|_| format!("invalid size '{item}'"))?;
        out.insert(size);
    }
    Ok(out)
}

pub fn parse_extensions_csv(value: &str) -> Result<Vec<String>, String> {
    let raw = value.trim();
    if raw.is_empty() {
        return Err("extensions list is empty".to_string());
    }
    let mut out: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for part in raw.split(',') {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        let cleaned = item.trim_start_matches('.');
        if cleaned.is_empty() {
            continue;
        }
        let key = cleaned.to_ascii_lowercase();
        if seen.insert(key) {
            out.push(cleaned.to_string());
        }
    }
    if out.is_empty() {
        return Err("extensions list is empty".to_string());
    }
    Ok(out)
}

pub fn parse_csv_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Strips a single leading occurrence of `prefix` so wordlist entries
/// compose with base URLs that already end in a slash.
pub fn lstrip_once(value: &str, prefix: char) -> &str {
    value.strip_prefix(prefix).unwrap_or(value)
}
