//! jarsig CLI
//!
//! Entry point for the `jarsig` command-line tool.

use clap::{ArgAction, Parser, Subcommand};
use der::pem::LineEnding;
use der::EncodePem;
use jarsig::{CollectError, CollectorConfig, JarSignatureCollector, SignerIdentity};
use log::LevelFilter;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process;

/// Exit code for usage, config and I/O errors
const EXIT_ERROR: i32 = 1;
/// Exit code when entries are signed by different signers
const EXIT_MISMATCH: i32 = 2;
/// Exit code when the archive fails integrity or signature checks
const EXIT_SECURITY: i32 = 3;

#[derive(Parser)]
#[command(name = "jarsig")]
#[command(about = "Report the signers common to every entry of a JAR", version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the signers of an archive
    Signers {
        /// Archive to inspect
        jar: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Sort by display name instead of signature order
        #[arg(long)]
        sort_by_name: bool,

        /// Path to collector config file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// List SHA-256 fingerprints of the signing keys
    Keys {
        /// Archive to inspect
        jar: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Path to collector config file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Print the signers' certificates as PEM
    Certs {
        /// Archive to inspect
        jar: PathBuf,

        /// Path to collector config file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

/// One signer in `signers --json` output
#[derive(Serialize)]
struct SignerReport {
    name: String,
    /// SHA-256 over the DER certificate chain
    fingerprint: String,
    /// SHA-256 over the leaf SubjectPublicKeyInfo
    key_fingerprint: String,
    chain_length: usize,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Signers {
            jar,
            json,
            sort_by_name,
            config,
        } => {
            run_signers(&jar, json, sort_by_name, config);
        }
        Commands::Keys { jar, json, config } => {
            run_keys(&jar, json, config);
        }
        Commands::Certs { jar, config } => {
            run_certs(&jar, config);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // RUST_LOG wins over -v
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn run_signers(jar: &Path, json: bool, sort_by_name: bool, config_path: Option<PathBuf>) {
    let collector = load_collector(config_path);
    let result = if sort_by_name {
        collector.collect_signing_parties(jar)
    } else {
        collector.collect_signers(jar)
    };
    let signers = result.unwrap_or_else(|e| exit_with(&e));

    if json {
        let reports = match signers
            .iter()
            .map(signer_report)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(reports) => reports,
            Err(e) => exit_with(&e),
        };
        print_json(&reports);
    } else if signers.is_empty() {
        println!("{}: unsigned", jar.display());
    } else {
        for signer in &signers {
            println!("{}", signer.display_name());
        }
    }
}

fn run_keys(jar: &Path, json: bool, config_path: Option<PathBuf>) {
    let collector = load_collector(config_path);
    let keys = collector
        .collect_signing_keys(jar)
        .unwrap_or_else(|e| exit_with(&e));
    let fingerprints: Vec<String> = keys.iter().map(|key| sha256_hex(key)).collect();

    if json {
        print_json(&fingerprints);
    } else {
        for fingerprint in &fingerprints {
            println!("{}", fingerprint);
        }
    }
}

fn run_certs(jar: &Path, config_path: Option<PathBuf>) {
    let collector = load_collector(config_path);
    let certificates = collector
        .collect_certificates(jar)
        .unwrap_or_else(|e| exit_with(&e));

    for certificate in &certificates {
        match certificate.to_pem(LineEnding::LF) {
            Ok(pem) => print!("{}", pem),
            Err(e) => {
                eprintln!("Error encoding certificate: {}", e);
                process::exit(EXIT_ERROR);
            }
        }
    }
}

fn load_collector(config_path: Option<PathBuf>) -> JarSignatureCollector {
    let config = match config_path {
        Some(path) => match CollectorConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                process::exit(EXIT_ERROR);
            }
        },
        None => CollectorConfig::default(),
    };
    JarSignatureCollector::new(&config)
}

fn signer_report(signer: &SignerIdentity) -> Result<SignerReport, CollectError> {
    let key = signer.public_key_der()?;
    Ok(SignerReport {
        name: signer.display_name().to_string(),
        fingerprint: hex::encode(signer.fingerprint()),
        key_fingerprint: sha256_hex(&key),
        chain_length: signer.chain().certificates().len(),
    })
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(EXIT_ERROR);
        }
    }
}

fn exit_with(err: &CollectError) -> ! {
    let code = match err {
        CollectError::SignerMismatch(_) => EXIT_MISMATCH,
        _ if err.is_security_failure() => EXIT_SECURITY,
        _ => EXIT_ERROR,
    };
    eprintln!("Error: {}", err);
    process::exit(code);
}
