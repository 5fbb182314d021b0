//! Session-scoped logging handle.
//!
//! Components receive a `Telemetry` in their constructor and log through it,
//! so every line carries the session label and a per-component target.
//! The process-wide logger itself is installed once by the binary.

use log::Level;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct Telemetry {
    session: Arc<str>,
    target: &'static str,
}

impl Telemetry {
    pub fn new(session: impl Into<Arc<str>>) -> Self {
        Self {
            session: session.into(),
            target: "beat_boxer",
        }
    }

    /// A handle for one component: same session label, own log target.
    pub fn scoped(&self, target: &'static str) -> Self {
        Self {
            session: Arc::clone(&self.session),
            target,
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        log::log!(target: self.target, level, "[{}] {}", self.session, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn trace(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Trace, args);
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new("session")
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("session", &self.session)
            .field("target", &self.target)
            .finish()
    }
}
