//! Optional process-wide engine.
//!
//! Prefer passing an `Arc<AclEngine>` to consumers. Hosts that need a
//! global accessor install the engine once at startup.

use std::sync::{Arc, OnceLock};

use crate::engine::AclEngine;
use crate::error::{AclError, AclResult};

static ENGINE: OnceLock<Arc<AclEngine>> = OnceLock::new();

/// Install the process-wide engine.
///
/// # Errors
///
/// [`AclError::AlreadyInstalled`] if an engine was installed before.
pub fn install(engine: Arc<AclEngine>) -> AclResult<()> {
    ENGINE.set(engine).map_err(|_| AclError::AlreadyInstalled)
}

/// Get the process-wide engine.
///
/// # Errors
///
/// [`AclError::NotInstalled`] if [`install`] has not been called.
pub fn instance() -> AclResult<Arc<AclEngine>> {
    ENGINE.get().cloned().ok_or(AclError::NotInstalled)
}
