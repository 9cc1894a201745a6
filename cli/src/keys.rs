//! Keyring seed files
//!
//! A seed file is a JSON array of 32 bytes, readable only by its owner.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use cbd_core::Keyring;
use cbd_core::cbd_pre::key_bytes;
use rand::RngCore;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

const KEY_DIR_NAME: &str = ".cbd";
const DEFAULT_KEY_FILE: &str = "keyring.json";

pub fn genkey(filename: Option<String>) -> Result<()> {
    let home = dirs_home()?;
    let key_dir = home.join(KEY_DIR_NAME);
    let key_path = key_dir.join(filename.unwrap_or_else(|| DEFAULT_KEY_FILE.to_string()));

    if !key_dir.exists() {
        fs::create_dir_all(&key_dir)?;
        #[cfg(unix)]
        fs::set_permissions(&key_dir, fs::Permissions::from_mode(0o700))?;
        println!("Created directory: {}", key_dir.display());
    }

    let keyring = write_new_seed(&key_path)?;
    println!("Keyring written to {}", key_path.display());
    print_public_keys(&keyring);
    Ok(())
}

fn dirs_home() -> Result<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .map_err(|_| anyhow!("Could not determine home directory"))
}

/// Create a fresh seed at `path`; never overwrites
pub fn write_new_seed(path: &Path) -> Result<Keyring> {
    if path.exists() {
        bail!(
            "File {} already exists. Remove it first or use a different filename.",
            path.display()
        );
    }

    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    fs::write(path, serde_json::to_string(&seed.to_vec())?)
        .with_context(|| format!("writing {}", path.display()))?;
    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(Keyring::from_seed(seed)?)
}

pub fn read_seed(path: &Path) -> Result<Keyring> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let bytes: Vec<u8> = serde_json::from_str(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;
    let seed: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
        anyhow!("seed in {} has {} bytes, expected 32", path.display(), b.len())
    })?;
    Ok(Keyring::from_seed(seed)?)
}

pub fn print_public_keys(keyring: &Keyring) {
    println!(
        "  verifying key:  {}",
        hex::encode(key_bytes(&keyring.signer().verifying_key()))
    );
    println!(
        "  encrypting key: {}",
        hex::encode(key_bytes(&keyring.encrypting_public_key()))
    );
}
