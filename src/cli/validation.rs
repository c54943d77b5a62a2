use std::path::PathBuf;
use std::time::Duration;

use crate::cli::args::CliArgs;
use crate::config::{expand_tilde, ConfigFile, ScanConfig};
use crate::utils;

/// Merges CLI arguments over the config file and produces the immutable
/// scan configuration. Returns a human-readable message on any invalid
/// value or flag combination; the caller maps that to exit code 1.
pub fn build_config(args: &CliArgs, file: &ConfigFile) -> Result<ScanConfig, String> {
    let mut config = ScanConfig::default();

    let mut urls: Vec<String> = Vec::new();
    urls.extend(args.url.iter().map(|u| u.trim().to_string()));
    if urls.is_empty() {
        if let Some(file_urls) = file.urls.as_ref() {
            urls.extend(file_urls.iter().map(|u| u.trim().to_string()));
        }
    }
    if let Some(path) = args.url_file.as_deref() {
        let path = expand_tilde(path);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read url file '{}': {e}", path.display()))?;
        urls.extend(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(String::from),
        );
    }
    urls.retain(|u| !u.is_empty());
    if urls.is_empty() {
        return Err("no targets: pass -u/--url or -l/--url-file".to_string());
    }
    config.urls = urls;

    let wordlists = args
        .wordlists
        .clone()
        .or_else(|| file.wordlists.as_ref().map(|w| w.join(",")))
        .ok_or_else(|| "no wordlists: pass -w/--wordlists".to_string())?;
    config.wordlists = utils::parse_csv_list(&wordlists)
        .into_iter()
        .map(|p| expand_tilde(&p))
        .collect();
    if config.wordlists.is_empty() {
        return Err("wordlist list is empty".to_string());
    }

    if let Some(exts) = args.extensions.as_deref().or(file.extensions.as_deref()) {
        config.extensions = utils::parse_extensions_csv(exts)?;
    }
    config.force_extensions = args.force_extensions || file.force_extensions.unwrap_or(false);
    config.overwrite_extensions =
        args.overwrite_extensions || file.overwrite_extensions.unwrap_or(false);
    if config.force_extensions && config.overwrite_extensions {
        return Err("use either --force-extensions or --overwrite-extensions, not both".to_string());
    }
    if (config.force_extensions || config.overwrite_extensions) && config.extensions.is_empty() {
        return Err("extension flags require -e/--extensions".to_string());
    }
    if let Some(exts) = args
        .exclude_extensions
        .as_deref()
        .or(file.exclude_extensions.as_deref())
    {
        config.exclude_extensions = utils::parse_extensions_csv(exts)?;
    }
    if let Some(prefixes) = args.prefixes.as_deref().or(file.prefixes.as_deref()) {
        config.prefixes = utils::parse_csv_list(prefixes);
    }
    if let Some(suffixes) = args.suffixes.as_deref().or(file.suffixes.as_deref()) {
        config.suffixes = utils::parse_csv_list(suffixes);
    }
    config.mutation = args.mutation || file.mutation.unwrap_or(false);
    config.uppercase = args.uppercase;
    config.lowercase = args.lowercase;
    config.capitalization = args.capital;
    if config.uppercase && config.lowercase {
        return Err("use either --uppercase or --lowercase, not both".to_string());
    }

    config.threads = args.threads.or(file.threads).unwrap_or(config.threads);
    if config.threads == 0 {
        return Err("thread count must be positive".to_string());
    }
    config.recursive = args.recursive || file.recursive.unwrap_or(false);
    config.deep_recursive = args.deep_recursive || file.deep_recursive.unwrap_or(false);
    config.force_recursive = args.force_recursive || file.force_recursive.unwrap_or(false);
    config.recursion_depth = args
        .max_recursion_depth
        .or(file.recursion_depth)
        .unwrap_or(config.recursion_depth);
    if let Some(codes) = args
        .recursion_status
        .as_deref()
        .or(file.recursion_status.as_deref())
    {
        config.recursion_status =
            utils::parse_status_ranges(codes).map_err(|e| format!("recursion-status: {e}"))?;
    }
    config.filter_threshold = args
        .filter_threshold
        .or(file.filter_threshold)
        .unwrap_or(config.filter_threshold);
    if let Some(subdirs) = args.subdirs.as_deref() {
        config.subdirs = utils::parse_csv_list(subdirs);
    }
    if let Some(excluded) = args
        .exclude_subdirs
        .as_deref()
        .or(file.exclude_subdirs.as_deref())
    {
        config.exclude_subdirs = utils::parse_csv_list(excluded);
    }

    if let Some(codes) = args
        .include_status
        .as_deref()
        .or(file.include_status.as_deref())
    {
        config.include_status =
            utils::parse_status_ranges(codes).map_err(|e| format!("include-status: {e}"))?;
    }
    if let Some(codes) = args
        .exclude_status
        .as_deref()
        .or(file.exclude_status.as_deref())
    {
        config.exclude_status =
            utils::parse_status_ranges(codes).map_err(|e| format!("exclude-status: {e}"))?;
    }
    if let Some(sizes) = args
        .exclude_sizes
        .as_deref()
        .or(file.exclude_sizes.as_deref())
    {
        config.exclude_sizes =
            utils::parse_usize_set_csv(sizes).map_err(|e| format!("exclude-sizes: {e}"))?;
    }
    config.exclude_texts = if args.exclude_text.is_empty() {
        file.exclude_texts.clone().unwrap_or_default()
    } else {
        args.exclude_text.clone()
    };
    config.exclude_regex = args.exclude_regex.clone().or(file.exclude_regex.clone());
    config.exclude_redirect = args
        .exclude_redirect
        .clone()
        .or(file.exclude_redirect.clone());
    config.exclude_response = args.exclude_response.clone();
    config.min_response_size = args
        .min_response_size
        .or(file.min_response_size)
        .unwrap_or(0);
    config.max_response_size = args
        .max_response_size
        .or(file.max_response_size)
        .unwrap_or(0);
    if config.max_response_size > 0 && config.min_response_size > config.max_response_size {
        return Err("min-response-size exceeds max-response-size".to_string());
    }
    config.no_wildcard = args.no_wildcard || file.no_wildcard.unwrap_or(false);
    config.calibration = args.calibration || file.calibration.unwrap_or(false);
    if let Some(codes) = args
        .skip_on_status
        .as_deref()
        .or(file.skip_on_status.as_deref())
    {
        config.skip_on_status =
            utils::parse_status_ranges(codes).map_err(|e| format!("skip-on-status: {e}"))?;
    }

    config.http_method = args
        .http_method
        .clone()
        .or(file.http_method.clone())
        .unwrap_or(config.http_method);
    let raw_headers = if args.header.is_empty() {
        file.headers.clone().unwrap_or_default()
    } else {
        args.header.clone()
    };
    for raw in raw_headers.iter() {
        let (name, value) = raw
            .split_once(':')
            .ok_or_else(|| format!("invalid header '{raw}', expected 'Name: Value'"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("invalid header '{raw}', empty name"));
        }
        config
            .headers
            .push((name.to_string(), value.trim().to_string()));
    }
    config.cookie = args.cookie.clone().or(file.cookie.clone());
    config.auth = args.auth.clone();
    config.user_agent = args.user_agent.clone().or(file.user_agent.clone());
    config.follow_redirects = args.follow_redirects || file.follow_redirects.unwrap_or(false);
    config.proxy = args.proxy.clone().or(file.proxy.clone());
    config.client_cert = args.cert.as_deref().map(expand_tilde);
    config.client_key = args.key.as_deref().map(expand_tilde);

    let timeout = args.timeout.or(file.timeout).unwrap_or(10.0);
    if !timeout.is_finite() || timeout <= 0.0 {
        return Err("timeout must be positive".to_string());
    }
    config.timeout = Duration::from_secs_f64(timeout);
    let delay = args.delay.or(file.delay).unwrap_or(0.0);
    if !delay.is_finite() || delay < 0.0 {
        return Err("delay must be non-negative".to_string());
    }
    config.delay = Duration::from_secs_f64(delay);
    config.max_rate = args.max_rate.or(file.max_rate).unwrap_or(0);
    config.retries = args.retries.or(file.retries).unwrap_or(config.retries);
    config.exit_on_error = args.exit_on_error || file.exit_on_error.unwrap_or(false);
    config.max_time = args
        .max_time
        .or(file.max_time)
        .filter(|t| *t > 0)
        .map(Duration::from_secs);
    config.target_max_time = args
        .target_max_time
        .or(file.target_max_time)
        .filter(|t| *t > 0)
        .map(Duration::from_secs);

    if let Some(path) = args
        .waf_signatures
        .as_deref()
        .or(file.waf_signatures.as_deref())
    {
        config.waf_signatures = expand_tilde(path);
    }
    config.blacklist_dir = match args.blacklist_dir.as_deref().or(file.blacklist_dir.as_deref()) {
        Some(dir) if dir.trim().is_empty() => None,
        Some(dir) => Some(expand_tilde(dir)),
        None => config.blacklist_dir,
    };
    config.session_file = args.session_file.as_deref().map(PathBuf::from);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> CliArgs {
        CliArgs::parse_from(std::iter::once("dirprobe").chain(argv.iter().copied()))
    }

    fn wordlist() -> String {
        let path =
            std::env::temp_dir().join(format!("dirprobe-cli-wl-{}.txt", std::process::id()));
        std::fs::write(&path, "admin\n").unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn minimal_invocation_builds() {
        let wl = wordlist();
        let args = parse(&["-u", "http://example.com/", "-w", &wl]);
        let config = build_config(&args, &ConfigFile::default()).unwrap();
        assert_eq!(config.urls, vec!["http://example.com/"]);
        assert_eq!(config.threads, 25);
    }

    #[test]
    fn missing_targets_or_wordlists_fail() {
        let wl = wordlist();
        let args = parse(&["-w", &wl]);
        assert!(build_config(&args, &ConfigFile::default()).is_err());

        let args = parse(&["-u", "http://example.com/"]);
        assert!(build_config(&args, &ConfigFile::default()).is_err());
    }

    #[test]
    fn conflicting_flags_are_rejected() {
        let wl = wordlist();
        let args = parse(&[
            "-u",
            "http://example.com/",
            "-w",
            &wl,
            "-e",
            "php",
            "-f",
            "--overwrite-extensions",
        ]);
        assert!(build_config(&args, &ConfigFile::default()).is_err());

        let args = parse(&["-u", "http://example.com/", "-w", &wl, "-f"]);
        assert!(build_config(&args, &ConfigFile::default())
            .unwrap_err()
            .contains("extensions"));

        let args = parse(&[
            "-u",
            "http://example.com/",
            "-w",
            &wl,
            "--uppercase",
            "--lowercase",
        ]);
        assert!(build_config(&args, &ConfigFile::default()).is_err());
    }

    #[test]
    fn cli_overrides_config_file() {
        let wl = wordlist();
        let file = ConfigFile {
            threads: Some(5),
            max_rate: Some(100),
            ..Default::default()
        };
        let args = parse(&["-u", "http://example.com/", "-w", &wl, "-t", "50"]);
        let config = build_config(&args, &file).unwrap();
        assert_eq!(config.threads, 50);
        assert_eq!(config.max_rate, 100);
    }

    #[test]
    fn headers_are_parsed_and_validated() {
        let wl = wordlist();
        let args = parse(&[
            "-u",
            "http://example.com/",
            "-w",
            &wl,
            "-H",
            "X-Forwarded-For: 127.0.0.1",
        ]);
        let config = build_config(&args, &ConfigFile::default()).unwrap();
        assert_eq!(
            config.headers,
            vec![("X-Forwarded-For".to_string(), "127.0.0.1".to_string())]
        );

        let args = parse(&["-u", "http://example.com/", "-w", &wl, "-H", "broken"]);
        assert!(build_config(&args, &ConfigFile::default()).is_err());
    }

    #[test]
    fn status_ranges_parse_from_flags() {
        let wl = wordlist();
        let args = parse(&[
            "-u",
            "http://example.com/",
            "-w",
            &wl,
            "-i",
            "200-299,401",
            "--skip-on-status",
            "429",
        ]);
        let config = build_config(&args, &ConfigFile::default()).unwrap();
        assert!(config.include_status.contains(250));
        assert!(config.include_status.contains(401));
        assert!(!config.include_status.contains(500));
        assert!(config.skip_on_status.contains(429));
    }
}
