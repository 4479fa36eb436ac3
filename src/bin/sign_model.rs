//! Model signing utility.
//!
//! Writes `manifest.json` (SHA-256 of `model.json`, serial, timestamp, nonce)
//! and its Ed25519 signature `model.sig` into a model directory.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sign_model -- <model_dir> [--serial <n>]
//! ```
//!
//! The signing seed is read from, in order: the FD in
//! `MEDREC_MODEL_SIGNING_KEY_B64_FD`, the file in
//! `MEDREC_MODEL_SIGNING_KEY_B64_FILE`, the docker secret
//! `/run/secrets/medrec_model_signing_key_b64`, and in debug builds only
//! `MEDREC_MODEL_SIGNING_KEY_B64`.

use std::env;
use std::fs;
#[cfg(unix)]
use std::os::unix::io::FromRawFd;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::SigningKey;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use medrec::adapters::linear::signature::sign_model_dir;

const KEY_FD_ENV: &str = "MEDREC_MODEL_SIGNING_KEY_B64_FD";
const KEY_FILE_ENV: &str = "MEDREC_MODEL_SIGNING_KEY_B64_FILE";
const DOCKER_SECRET_PATH: &str = "/run/secrets/medrec_model_signing_key_b64";
const KEY_ENV: &str = "MEDREC_MODEL_SIGNING_KEY_B64";

const USAGE: &str = "Usage: sign_model <model_dir> [--serial <u64>]";

#[derive(Zeroize, ZeroizeOnDrop)]
struct Seed([u8; 32]);

fn non_empty_secret(raw: &str) -> Result<Zeroizing<String>> {
    let secret = Zeroizing::new(raw.trim_end_matches(['\n', '\r']).to_string());
    if secret.is_empty() {
        bail!("Empty signing key");
    }
    Ok(secret)
}

fn read_signing_seed_b64() -> Result<Zeroizing<String>> {
    #[cfg(unix)]
    if let Ok(fd_str) = env::var(KEY_FD_ENV) {
        use std::io::Read;

        let fd: i32 = fd_str
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid key FD"))?;
        if fd <= 2 {
            bail!("Refusing to read signing key from stdio FD");
        }
        // SAFETY: take ownership of FD for one-time secret read.
        let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
        let mut buf = Zeroizing::new(String::new());
        file.read_to_string(&mut buf)
            .context("Failed reading signing key from FD")?;
        return non_empty_secret(&buf);
    }

    if let Ok(path) = env::var(KEY_FILE_ENV) {
        let content = Zeroizing::new(
            fs::read_to_string(path.trim()).context("Failed reading signing key file")?,
        );
        return non_empty_secret(&content);
    }

    if Path::new(DOCKER_SECRET_PATH).exists() {
        let content = Zeroizing::new(
            fs::read_to_string(DOCKER_SECRET_PATH).context("Failed reading docker secret")?,
        );
        return non_empty_secret(&content);
    }

    // Dev-only fallback.
    if cfg!(debug_assertions) {
        if let Ok(v) = env::var(KEY_ENV) {
            return non_empty_secret(&Zeroizing::new(v));
        }
    }

    bail!(
        "Missing signing key. Provide one of: {KEY_FD_ENV}, {KEY_FILE_ENV}, or {DOCKER_SECRET_PATH} (env var fallback only in debug builds)."
    )
}

fn read_signing_seed() -> Result<Seed> {
    let b64 = read_signing_seed_b64()?;
    let raw = Zeroizing::new(
        general_purpose::STANDARD
            .decode(b64.trim())
            .context("Invalid base64 in signing key")?,
    );

    if raw.len() != 32 {
        bail!(
            "Signing key seed must be 32 bytes after base64 decode (got {})",
            raw.len()
        );
    }

    let mut seed = Seed([0u8; 32]);
    seed.0.copy_from_slice(&raw);
    Ok(seed)
}

fn parse_args() -> Result<(PathBuf, Option<u64>)> {
    let mut args = env::args().skip(1);
    let mut model_dir: Option<PathBuf> = None;
    let mut serial: Option<u64> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--serial" => {
                let v = args.next().ok_or_else(|| anyhow!(USAGE))?;
                serial = Some(
                    v.trim()
                        .parse::<u64>()
                        .map_err(|_| anyhow!("--serial must be a u64"))?,
                );
            }
            "-h" | "--help" => bail!(USAGE),
            _ if model_dir.is_none() => model_dir = Some(PathBuf::from(arg)),
            _ => bail!(USAGE),
        }
    }

    let model_dir = model_dir.ok_or_else(|| anyhow!(USAGE))?;
    Ok((model_dir, serial))
}

fn main() -> Result<()> {
    let (model_dir, serial) = parse_args()?;

    let model_dir = if model_dir.is_file() {
        model_dir
            .parent()
            .ok_or_else(|| anyhow!("Model path has no parent directory"))?
            .to_path_buf()
    } else {
        model_dir
    };

    let seed = read_signing_seed()?;
    let signing_key = SigningKey::from_bytes(&seed.0);
    drop(seed);

    let manifest = sign_model_dir(&model_dir, &signing_key, serial)?;

    println!("Signed manifest in {model_dir:?} (serial={})", manifest.serial);
    for (file, digest) in &manifest.files {
        println!("  {file}: sha256={digest}");
    }
    println!(
        "PUBKEY (base64)={}",
        general_purpose::STANDARD.encode(signing_key.verifying_key().as_bytes())
    );

    Ok(())
}
