//! Prints an argon2 hash for `TIPLINE_SECURITY__ADMIN_PASSWORD_HASH`.
//!
//! Reads the password from the first line of stdin so it never lands in
//! shell history.

use anyhow::{bail, Context};
use std::io::BufRead;

fn main() -> anyhow::Result<()> {
    let mut password = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut password)
        .context("failed to read password from stdin")?;
    let password = password.trim_end_matches(['\r', '\n']);

    if password.len() < 12 {
        bail!("admin password must be at least 12 characters");
    }

    let hash = auth_adapters::hash_admin_password(password)?;
    println!("{hash}");
    Ok(())
}
