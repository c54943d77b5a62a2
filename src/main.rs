use std::path::Path;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use dirprobe::cli::args::CliArgs;
use dirprobe::cli::validation::build_config;
use dirprobe::config::{default_config_path, ensure_default_config_file, expand_tilde, load_config, ConfigFile};
use dirprobe::executor::{HttpExecutor, HttpExecutorConfig};
use dirprobe::output::{JsonLinesSink, PlainSink, Sink};
use dirprobe::runner::{ScanReport, Scanner, TargetOutcome};
use dirprobe::waf::WafDatabase;

fn print_banner() {
    const BANNER: &str = r#"
     _ _                       _
  __| (_)_ __ _ __  _ __ ___ | |__   ___
 / _` | | '__| '_ \| '__/ _ \| '_ \ / _ \
| (_| | | |  | |_) | | | (_) | |_) |  __/
 \__,_|_|_|  | .__/|_|  \___/|_.__/ \___|
             |_|
"#;
    println!("{}", BANNER.cyan().bold());
    println!(
        "{}{}{} {}",
        "[".bold().white(),
        "WRN".bold().yellow(),
        "]".bold().white(),
        "Only scan systems you are authorized to test.".bold().white()
    );
    println!();
}

fn load_config_file(args: &CliArgs) -> Result<ConfigFile, String> {
    if let Some(path) = args.config.as_deref() {
        return load_config(&expand_tilde(path), false);
    }
    match default_config_path() {
        Some(path) => {
            if let Err(e) = ensure_default_config_file(&path) {
                log::debug!("could not seed default config: {e}");
            }
            load_config(&path, true)
        }
        None => Ok(ConfigFile::default()),
    }
}

fn print_summary(report: &ScanReport) {
    println!();
    for target in report.targets.iter() {
        let outcome = match &target.outcome {
            TargetOutcome::Completed => "completed".green().bold().to_string(),
            TargetOutcome::DeadlineExpired => "deadline reached".yellow().bold().to_string(),
            TargetOutcome::SkippedOnStatus(status) => format!("skipped on status {status}")
                .yellow()
                .bold()
                .to_string(),
            TargetOutcome::SetupFailed(reason) => {
                format!("{} {reason}", "setup failed".red().bold())
            }
            TargetOutcome::Cancelled => "cancelled".red().bold().to_string(),
        };
        println!(
            "{} {} {}",
            target.base_url.bold().white(),
            outcome,
            format!(
                "({} requests, {} findings, {} filtered, {} errors)",
                target.stats.requests,
                target.stats.kept,
                target.stats.filtered,
                target.stats.errors
            )
            .white()
        );
    }
}

async fn run() -> i32 {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = CliArgs::parse();
    if args.no_color {
        colored::control::set_override(false);
    }
    if !args.quiet {
        print_banner();
    }

    let config_file = match load_config_file(&args) {
        Ok(file) => file,
        Err(message) => {
            eprintln!("{} {}", "error:".red().bold(), message);
            return 1;
        }
    };
    let config = match build_config(&args, &config_file) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{} {}", "error:".red().bold(), message);
            return 1;
        }
    };

    let executor_config = HttpExecutorConfig {
        user_agent: config.user_agent.clone(),
        proxy: config.proxy.clone(),
        follow_redirects: config.follow_redirects,
        timeout: config.timeout,
        client_cert: config.client_cert.clone(),
        client_key: config.client_key.clone(),
    };
    let executor = match HttpExecutor::new(&executor_config) {
        Ok(executor) => Arc::new(executor),
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            return 1;
        }
    };
    let waf = Arc::new(WafDatabase::load(&config.waf_signatures));

    let progress = if args.quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("scanning");
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    };

    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    if !args.quiet {
        let sink = match progress.as_ref() {
            Some(pb) => PlainSink::with_progress(pb.clone()),
            None => PlainSink::new(),
        };
        sinks.push(Box::new(sink));
    }
    if let Some(path) = args.output.as_deref() {
        match JsonLinesSink::create(Path::new(path)) {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(err) => {
                eprintln!("{} {}", "error:".red().bold(), err);
                return 1;
            }
        }
    }

    let session_path = config.session_file.clone();
    let scanner = match Scanner::new(config, executor, waf, sinks) {
        Ok(scanner) => scanner,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            return 1;
        }
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let report = scanner.run(&cancel).await;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    if !args.quiet {
        print_summary(&report);
    }

    if report.interrupted {
        if let Some(path) = session_path.as_deref() {
            match report.session_state().save(path) {
                Ok(()) => println!("session saved to {}", path.display()),
                Err(err) => eprintln!("{} {}", "error:".red().bold(), err),
            }
        }
    }

    if let Some(message) = report.fatal_error.as_deref() {
        eprintln!("{} {}", "fatal:".red().bold(), message);
        return 3;
    }
    if report.interrupted {
        return 2;
    }
    if report.any_completed() {
        0
    } else {
        1
    }
}

#[tokio::main]
async fn main() {
    exit(run().await);
}
