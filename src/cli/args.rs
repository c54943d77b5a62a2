use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dirprobe",
    version,
    about = "web-path discovery engine",
    long_about = "dirprobe probes candidate paths against HTTP origins, calibrates away \
wildcard/soft-404 noise, classifies survivors (WAF / application / server defaults), and \
streams findings as structured records.\n\nExamples:\n  dirprobe -u https://target.tld/ -w wordlist.txt\n  dirprobe -u https://target.tld/ -w wordlist.txt -e php,html -f -r -R 2\n  dirprobe -l targets.txt -w wordlist.txt --max-rate 50 -o findings.jsonl"
)]
pub struct CliArgs {
    #[arg(
        short = 'u',
        long = "url",
        value_name = "URL",
        action = ArgAction::Append,
        help_heading = "Target",
        help = "Target URL (repeatable)."
    )]
    pub url: Vec<String>,

    #[arg(
        short = 'l',
        long = "url-file",
        value_name = "FILE",
        help_heading = "Target",
        help = "Load target URLs from a file (one per line)."
    )]
    pub url_file: Option<String>,

    #[arg(
        short = 'w',
        long = "wordlists",
        value_name = "FILES",
        help_heading = "Dictionary",
        help = "Wordlist files (comma-separated)."
    )]
    pub wordlists: Option<String>,

    #[arg(
        short = 'e',
        long = "extensions",
        value_name = "EXTS",
        help_heading = "Dictionary",
        help = "Extensions substituted for %EXT% (comma-separated)."
    )]
    pub extensions: Option<String>,

    #[arg(
        short = 'f',
        long = "force-extensions",
        help_heading = "Dictionary",
        help = "Append each extension to extensionless entries."
    )]
    pub force_extensions: bool,

    #[arg(
        long = "overwrite-extensions",
        help_heading = "Dictionary",
        help = "Swap recognized trailing extensions for the configured ones."
    )]
    pub overwrite_extensions: bool,

    #[arg(
        long = "exclude-extensions",
        value_name = "EXTS",
        help_heading = "Dictionary",
        help = "Drop candidates with these final extensions (comma-separated)."
    )]
    pub exclude_extensions: Option<String>,

    #[arg(
        long = "prefixes",
        value_name = "STRS",
        help_heading = "Dictionary",
        help = "Prefixes prepended to every entry (comma-separated)."
    )]
    pub prefixes: Option<String>,

    #[arg(
        long = "suffixes",
        value_name = "STRS",
        help_heading = "Dictionary",
        help = "Suffixes appended to non-directory entries (comma-separated)."
    )]
    pub suffixes: Option<String>,

    #[arg(
        long = "mutation",
        help_heading = "Dictionary",
        help = "Derive backup/version/case variants from confirmed hits."
    )]
    pub mutation: bool,

    #[arg(long = "uppercase", help_heading = "Dictionary", help = "Emit entries uppercased.")]
    pub uppercase: bool,

    #[arg(long = "lowercase", help_heading = "Dictionary", help = "Emit entries lowercased.")]
    pub lowercase: bool,

    #[arg(
        long = "capital",
        help_heading = "Dictionary",
        help = "Emit entries with the first letter capitalized."
    )]
    pub capital: bool,

    #[arg(
        short = 't',
        long = "threads",
        value_name = "N",
        help_heading = "Scan",
        help = "Worker pool size (default 25)."
    )]
    pub threads: Option<usize>,

    #[arg(
        short = 'r',
        long = "recursive",
        help_heading = "Scan",
        help = "Re-scan under discovered directories."
    )]
    pub recursive: bool,

    #[arg(
        long = "deep-recursive",
        help_heading = "Scan",
        help = "Also enqueue unvisited ancestor directories of findings."
    )]
    pub deep_recursive: bool,

    #[arg(
        long = "force-recursive",
        help_heading = "Scan",
        help = "Recurse into non-directory findings too."
    )]
    pub force_recursive: bool,

    #[arg(
        short = 'R',
        long = "max-recursion-depth",
        value_name = "N",
        help_heading = "Scan",
        help = "Recursion depth bound (0 = unbounded)."
    )]
    pub max_recursion_depth: Option<usize>,

    #[arg(
        long = "recursion-status",
        value_name = "CODES",
        help_heading = "Scan",
        help = "Statuses that trigger recursion (default 200-299,300-399)."
    )]
    pub recursion_status: Option<String>,

    #[arg(
        long = "filter-threshold",
        value_name = "N",
        help_heading = "Scan",
        help = "Suppress a duplicate signature after N kept results (0 = off)."
    )]
    pub filter_threshold: Option<u32>,

    #[arg(
        long = "subdirs",
        value_name = "DIRS",
        help_heading = "Scan",
        help = "Scan only under these sub-directories (comma-separated)."
    )]
    pub subdirs: Option<String>,

    #[arg(
        long = "exclude-subdirs",
        value_name = "DIRS",
        help_heading = "Scan",
        help = "Never recurse under these sub-directories (comma-separated)."
    )]
    pub exclude_subdirs: Option<String>,

    #[arg(
        short = 'i',
        long = "include-status",
        value_name = "CODES",
        help_heading = "Filters",
        help = "Keep only these statuses (codes and ranges, comma-separated)."
    )]
    pub include_status: Option<String>,

    #[arg(
        short = 'x',
        long = "exclude-status",
        value_name = "CODES",
        help_heading = "Filters",
        help = "Drop these statuses (codes and ranges, comma-separated)."
    )]
    pub exclude_status: Option<String>,

    #[arg(
        long = "exclude-sizes",
        value_name = "BYTES",
        help_heading = "Filters",
        help = "Drop responses with these exact body sizes (comma-separated)."
    )]
    pub exclude_sizes: Option<String>,

    #[arg(
        long = "exclude-text",
        value_name = "TEXT",
        action = ArgAction::Append,
        help_heading = "Filters",
        help = "Drop responses whose body contains this text (repeatable)."
    )]
    pub exclude_text: Vec<String>,

    #[arg(
        long = "exclude-regex",
        value_name = "REGEX",
        help_heading = "Filters",
        help = "Drop responses whose body matches this regex."
    )]
    pub exclude_regex: Option<String>,

    #[arg(
        long = "exclude-redirect",
        value_name = "REGEX",
        help_heading = "Filters",
        help = "Drop responses whose redirect target matches this regex."
    )]
    pub exclude_redirect: Option<String>,

    #[arg(
        long = "exclude-response",
        value_name = "PATH",
        help_heading = "Filters",
        help = "Drop responses similar to the one served at PATH."
    )]
    pub exclude_response: Option<String>,

    #[arg(
        long = "min-response-size",
        value_name = "BYTES",
        help_heading = "Filters",
        help = "Drop responses smaller than this."
    )]
    pub min_response_size: Option<usize>,

    #[arg(
        long = "max-response-size",
        value_name = "BYTES",
        help_heading = "Filters",
        help = "Drop responses larger than this (0 = unbounded)."
    )]
    pub max_response_size: Option<usize>,

    #[arg(
        long = "no-wildcard",
        help_heading = "Filters",
        help = "Disable wildcard calibration; nothing is suppressed."
    )]
    pub no_wildcard: bool,

    #[arg(
        long = "calibration",
        help_heading = "Filters",
        help = "Force the calibration phase even when other flags would skip it."
    )]
    pub calibration: bool,

    #[arg(
        long = "skip-on-status",
        value_name = "CODES",
        help_heading = "Filters",
        help = "Cancel the target as soon as one of these statuses is seen."
    )]
    pub skip_on_status: Option<String>,

    #[arg(
        short = 'm',
        long = "http-method",
        value_name = "METHOD",
        help_heading = "HTTP",
        help = "HTTP method (default GET)."
    )]
    pub http_method: Option<String>,

    #[arg(
        short = 'H',
        long = "header",
        value_name = "NAME: VALUE",
        action = ArgAction::Append,
        help_heading = "HTTP",
        help = "Extra request header (repeatable)."
    )]
    pub header: Vec<String>,

    #[arg(long = "cookie", value_name = "COOKIE", help_heading = "HTTP", help = "Cookie header value.")]
    pub cookie: Option<String>,

    #[arg(
        long = "auth",
        value_name = "CREDENTIALS",
        help_heading = "HTTP",
        help = "Authorization header value, passed through verbatim."
    )]
    pub auth: Option<String>,

    #[arg(long = "user-agent", value_name = "UA", help_heading = "HTTP", help = "User-Agent override.")]
    pub user_agent: Option<String>,

    #[arg(
        long = "follow-redirects",
        help_heading = "HTTP",
        help = "Follow redirects (up to 10 hops)."
    )]
    pub follow_redirects: bool,

    #[arg(long = "proxy", value_name = "URL", help_heading = "HTTP", help = "HTTP/SOCKS proxy.")]
    pub proxy: Option<String>,

    #[arg(
        long = "cert",
        value_name = "PEM",
        help_heading = "HTTP",
        requires = "key",
        help = "Client certificate (PEM); requires --key."
    )]
    pub cert: Option<String>,

    #[arg(
        long = "key",
        value_name = "PEM",
        help_heading = "HTTP",
        requires = "cert",
        help = "Client private key (PEM); requires --cert."
    )]
    pub key: Option<String>,

    #[arg(
        long = "timeout",
        value_name = "SECONDS",
        help_heading = "Runtime",
        help = "Per-request timeout (default 10)."
    )]
    pub timeout: Option<f64>,

    #[arg(
        long = "delay",
        value_name = "SECONDS",
        help_heading = "Runtime",
        help = "Minimum gap between requests to the same target."
    )]
    pub delay: Option<f64>,

    #[arg(
        long = "max-rate",
        value_name = "RPS",
        help_heading = "Runtime",
        help = "Global request rate limit (0 = unlimited)."
    )]
    pub max_rate: Option<u32>,

    #[arg(
        long = "retries",
        value_name = "N",
        help_heading = "Runtime",
        help = "Transport retries per request (default 1)."
    )]
    pub retries: Option<u32>,

    #[arg(
        long = "exit-on-error",
        help_heading = "Runtime",
        help = "Abort the whole scan on any unrecoverable error."
    )]
    pub exit_on_error: bool,

    #[arg(
        long = "max-time",
        value_name = "SECONDS",
        help_heading = "Runtime",
        help = "Scan-wide deadline."
    )]
    pub max_time: Option<u64>,

    #[arg(
        long = "target-max-time",
        value_name = "SECONDS",
        help_heading = "Runtime",
        help = "Per-target deadline."
    )]
    pub target_max_time: Option<u64>,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Append findings as JSON lines to FILE."
    )]
    pub output: Option<String>,

    #[arg(short = 'q', long = "quiet", help_heading = "Output", help = "No banner, no per-finding lines.")]
    pub quiet: bool,

    #[arg(long = "no-color", help_heading = "Output", help = "Disable colored output.")]
    pub no_color: bool,

    #[arg(
        long = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Config file path (defaults to ~/.dirprobe/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        long = "session-file",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write resume state here when the scan is interrupted."
    )]
    pub session_file: Option<String>,

    #[arg(
        long = "waf-signatures",
        value_name = "FILE",
        help_heading = "Input",
        help = "WAF signature database (default db/waf_signatures.json)."
    )]
    pub waf_signatures: Option<String>,

    #[arg(
        long = "blacklist-dir",
        value_name = "DIR",
        help_heading = "Input",
        help = "Directory holding per-status path blacklists (default db)."
    )]
    pub blacklist_dir: Option<String>,
}
