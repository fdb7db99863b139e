//! Daemon CLI command
//!
//! Runs the profile's backup on a fixed interval until SIGINT or SIGTERM.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use super::backup::print_outcome;
use super::Context;
use crate::audit::{Operation, Status};
use crate::daemon::Daemon;
use crate::error::{BackupError, BackupResult};
use crate::services::BackupService;
use crate::signing::{ArchiveSigner, Ed25519Signer};

static SHUTDOWN: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Run backups of `profile_name` every `interval_secs` seconds
pub fn handle_daemon(ctx: &Context, profile_name: &str, interval_secs: u64) -> BackupResult<()> {
    if interval_secs == 0 {
        return Err(BackupError::Validation("Interval must be at least one second".into()));
    }

    let profile = ctx.profile(profile_name)?;
    let repo = ctx.repository(&profile.repo)?;
    let password = ctx.password(&profile.name)?;
    let signer = Ed25519Signer::load(&ctx.paths);

    let daemon = Daemon::new(Duration::from_secs(interval_secs));
    install_signal_handlers(daemon.shutdown_flag());

    let mut service = BackupService::new(&repo).with_workers(ctx.settings.hash_workers);
    if let Some(signer) = &signer {
        service = service.with_signer(signer as &dyn ArchiveSigner);
    }

    println!(
        "Backing up profile '{}' every {}s. Press Ctrl+C to stop.",
        profile.name, interval_secs
    );
    let stats = daemon.run(|iteration| {
        info!(iteration, "Starting scheduled backup");
        let outcome = service.run(profile, &password, false)?;
        print_outcome(&outcome);
        Ok(())
    });

    repo.audit(
        Operation::Daemon,
        &profile.name,
        if stats.failures == 0 { Status::Success } else { Status::Partial },
        json!({
            "iterations": stats.iterations,
            "successes": stats.successes,
            "failures": stats.failures,
            "uptime_secs": stats.uptime.as_secs(),
        }),
    );

    println!(
        "Daemon stopped after {} run(s): {} succeeded, {} failed.",
        stats.iterations, stats.successes, stats.failures
    );
    Ok(())
}

#[cfg(unix)]
fn install_signal_handlers(flag: Arc<AtomicBool>) {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    extern "C" fn on_signal(_: std::ffi::c_int) {
        if let Some(flag) = SHUTDOWN.get() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    if SHUTDOWN.set(flag).is_err() {
        warn!("Signal handlers already installed");
        return;
    }

    let action = SigAction::new(SigHandler::Handler(on_signal), SaFlags::SA_RESTART, SigSet::empty());
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only performs an atomic store.
        if let Err(e) = unsafe { sigaction(signal, &action) } {
            warn!(signal = %signal, error = %e, "Failed to install signal handler");
        }
    }
}

#[cfg(not(unix))]
fn install_signal_handlers(flag: Arc<AtomicBool>) {
    let _ = SHUTDOWN.set(flag);
    warn!("Signal handling is not available on this platform; stop the process to exit");
}
