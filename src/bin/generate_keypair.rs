//! Ed25519 keypair generation for model signing.
//!
//! Writes the base64 signing seed with 0600 permissions (Unix) and optionally
//! the base64 verifying key. Only non-secret material is printed.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin generate_keypair -- --out-seed <path> [--out-pub <path>] [--force]
//! ```

use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

const USAGE: &str = "Usage: generate_keypair --out-seed <path> [--out-pub <path>] [--force]";

struct Args {
    out_seed: PathBuf,
    out_pub: Option<PathBuf>,
    force: bool,
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = std::env::args().skip(1);
    let mut out_seed: Option<PathBuf> = None;
    let mut out_pub: Option<PathBuf> = None;
    let mut force = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out-seed" => {
                let p = args.next().filter(|p| !p.is_empty());
                out_seed = Some(p.ok_or_else(|| anyhow!(USAGE))?.into());
            }
            "--out-pub" => {
                let p = args.next().filter(|p| !p.is_empty());
                out_pub = Some(p.ok_or_else(|| anyhow!(USAGE))?.into());
            }
            "--force" => force = true,
            "-h" | "--help" => return Ok(None),
            _ => bail!("Unknown arg: {arg}\n{USAGE}"),
        }
    }

    let out_seed = out_seed.ok_or_else(|| anyhow!(USAGE))?;
    Ok(Some(Args {
        out_seed,
        out_pub,
        force,
    }))
}

fn write_file(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = opts
        .open(path)
        .with_context(|| format!("Failed to open {path:?}"))?;
    file.write_all(contents)?;
    file.write_all(b"\n")?;
    Ok(())
}

fn main() -> Result<()> {
    let Some(args) = parse_args()? else {
        println!(
            "{USAGE}\n\nWrites the base64 Ed25519 seed to <path> with 0600 permissions. \
             Optionally writes the base64 public key to --out-pub."
        );
        return Ok(());
    };

    for path in std::iter::once(&args.out_seed).chain(args.out_pub.as_ref()) {
        if path.exists() && !args.force {
            bail!("Refusing to overwrite existing file {path:?}. Use --force.");
        }
    }

    let mut seed = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(&mut seed[..]);

    let verifying_key = SigningKey::from_bytes(&seed).verifying_key();
    let seed_b64 = Zeroizing::new(general_purpose::STANDARD.encode(&seed[..]));
    let pub_b64 = general_purpose::STANDARD.encode(verifying_key.as_bytes());

    write_file(&args.out_seed, seed_b64.as_bytes(), 0o600)?;
    println!("Wrote signing seed (base64) to {:?}", args.out_seed);

    if let Some(pub_path) = &args.out_pub {
        // Public key is non-secret; allow read access.
        write_file(pub_path, pub_b64.as_bytes(), 0o644)?;
        println!("Wrote public key (base64) to {pub_path:?}");
    }

    println!("PUBKEY (base64)={pub_b64}");
    Ok(())
}
