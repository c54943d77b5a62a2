use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Backup forms tried against every confirmed hit, in order.
const BACKUP_SUFFIXES: [&str; 6] = [".bak", ".old", ".orig", "~", ".swp", ".tmp"];

fn digit_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

fn has_backup_suffix(path: &str) -> bool {
    BACKUP_SUFFIXES.iter().any(|s| path.ends_with(s))
}

/// Emits near-neighbor variants of an accepted path in a fixed order:
/// backup forms, numeric version bumps, case toggles of the final
/// segment. The caller must not feed mutator output back in; candidates
/// of mutation origin are never mutated again.
pub fn mutate(path: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(path.to_string());

    let mut push = |variant: String, out: &mut Vec<String>| {
        if !variant.is_empty() && seen.insert(variant.clone()) {
            out.push(variant);
        }
    };

    if !has_backup_suffix(path) {
        for suffix in BACKUP_SUFFIXES {
            push(format!("{path}{suffix}"), &mut out);
        }
    }

    // Every embedded decimal integer gets bumped one up and one down,
    // independently; results that would reach zero are skipped.
    for m in digit_run_re().find_iter(path) {
        let Ok(n) = m.as_str().parse::<u64>() else {
            continue;
        };
        let mut replaced = |value: u64, out: &mut Vec<String>| {
            let mut variant = String::with_capacity(path.len() + 1);
            variant.push_str(&path[..m.start()]);
            variant.push_str(&value.to_string());
            variant.push_str(&path[m.end()..]);
            push(variant, out);
        };
        if let Some(up) = n.checked_add(1) {
            replaced(up, &mut out);
        }
        if n > 1 {
            replaced(n - 1, &mut out);
        }
    }

    for variant in case_toggles(path) {
        push(variant, &mut out);
    }

    out
}

/// Lower/upper/capitalized forms of the final path segment, directories
/// included (the trailing slash is preserved).
fn case_toggles(path: &str) -> Vec<String> {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    let trailing = if path.ends_with('/') { "/" } else { "" };
    let (head, segment) = match trimmed.rsplit_once('/') {
        Some((head, segment)) => (format!("{head}/"), segment),
        None => (String::new(), trimmed),
    };
    if segment.is_empty() {
        return Vec::new();
    }

    let mut forms = vec![
        segment.to_ascii_lowercase(),
        segment.to_ascii_uppercase(),
        capitalize(segment),
    ];
    forms.dedup();
    forms
        .into_iter()
        .filter(|form| form != segment)
        .map(|form| format!("{head}{form}{trailing}"))
        .collect()
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => {
            first.to_uppercase().collect::<String>() + &chars.as_str().to_ascii_lowercase()
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_forms_come_first_in_fixed_order() {
        let out = mutate("admin.php");
        assert_eq!(
            &out[..6],
            &[
                "admin.php.bak",
                "admin.php.old",
                "admin.php.orig",
                "admin.php~",
                "admin.php.swp",
                "admin.php.tmp",
            ]
        );
    }

    #[test]
    fn numeric_bumps_go_both_ways_and_skip_zero() {
        let out = mutate("api/v1/users");
        assert!(out.contains(&"api/v2/users".to_string()));
        // v1 - 1 would be v0, which is skipped.
        assert!(!out.contains(&"api/v0/users".to_string()));

        let out = mutate("api/v3/users");
        assert!(out.contains(&"api/v4/users".to_string()));
        assert!(out.contains(&"api/v2/users".to_string()));
    }

    #[test]
    fn each_embedded_integer_bumps_independently() {
        let out = mutate("v2/user5");
        assert!(out.contains(&"v3/user5".to_string()));
        assert!(out.contains(&"v1/user5".to_string()));
        assert!(out.contains(&"v2/user6".to_string()));
        assert!(out.contains(&"v2/user4".to_string()));
        assert!(!out.contains(&"v3/user6".to_string()));
    }

    #[test]
    fn case_toggles_touch_only_the_final_segment() {
        let out = mutate("api/Admin");
        assert!(out.contains(&"api/admin".to_string()));
        assert!(out.contains(&"api/ADMIN".to_string()));
        assert!(!out.iter().any(|p| p.starts_with("API/")));
    }

    #[test]
    fn directories_keep_their_trailing_slash() {
        let out = mutate("admin/");
        assert!(out.contains(&"ADMIN/".to_string()));
        assert!(out.contains(&"Admin/".to_string()));
    }

    #[test]
    fn output_never_contains_the_input_or_duplicates() {
        let out = mutate("api/v1/Admin.php");
        assert!(!out.contains(&"api/v1/Admin.php".to_string()));
        let unique: HashSet<_> = out.iter().collect();
        assert_eq!(unique.len(), out.len());
    }

    #[test]
    fn backup_forms_are_not_stacked() {
        let out = mutate("admin.php.bak");
        assert!(!out.iter().any(|p| p.ends_with(".bak.bak")));
        assert!(!out.iter().any(|p| p.ends_with(".bak.old")));
    }
}
