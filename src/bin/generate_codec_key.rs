//! QR codec key generation utility.
//!
//! Writes a fresh 32-byte AES-256-GCM key, base64-encoded, to a file with
//! 0600 permissions. Point `HEDERA_QR_KEY_FILE` at the result.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin generate_codec_key -- --out <path> [--force]
//! ```
//!
//! Only the key fingerprint is printed.

use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use zeroize::Zeroizing;

use hedera_health::domain::CodecKey;

#[derive(Parser)]
#[command(name = "generate_codec_key")]
#[command(about = "Write a base64 QR codec key with 0600 permissions")]
struct Cli {
    /// Destination key file
    #[arg(long)]
    out: PathBuf,
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.out.exists() && !cli.force {
        anyhow::bail!(
            "Refusing to overwrite existing file {:?}. Use --force.",
            cli.out
        );
    }

    if let Some(parent) = cli.out.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let key = CodecKey::generate();
    let encoded = Zeroizing::new(key.to_base64());

    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        opts.mode(0o600);
    }

    let mut file = opts
        .open(&cli.out)
        .with_context(|| format!("Failed to open {:?}", cli.out))?;
    file.write_all(encoded.as_bytes())?;
    file.write_all(b"\n")?;

    println!("Wrote QR codec key (base64) to {:?}", cli.out);
    println!("Key fingerprint: {}", key.fingerprint);
    Ok(())
}
