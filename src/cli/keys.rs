//! Signing key CLI command

use super::Context;
use crate::error::{BackupError, BackupResult};
use crate::signing::Ed25519Signer;

/// Generate the Ed25519 signing keypair, locked with the profile's password
///
/// Backups of profiles sharing this password are signed automatically.
pub fn handle_keygen(ctx: &Context, profile_name: &str, force: bool) -> BackupResult<()> {
    let profile = ctx.profile(profile_name)?;
    let signer = Ed25519Signer::at(&ctx.paths);
    if signer.exists() && !force {
        return Err(BackupError::Validation(
            "A signing key already exists (use --force to replace it)".into(),
        ));
    }

    ctx.paths.ensure_directories()?;
    let password = ctx.password(&profile.name)?;
    let verifying_key = signer.generate(&password, &ctx.settings.crypto.argon2_params())?;

    println!("Signing key written to {}", ctx.paths.signing_key().display());
    println!("Public key: {}", hex::encode(verifying_key.to_bytes()));
    Ok(())
}
