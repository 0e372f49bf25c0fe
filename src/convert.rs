//! Prose converters.
//!
//! A converter turns Org prose into Markdown without knowing anything about
//! the link graph. Calls go through [`convert_with_timeout`] so that one
//! stuck conversion fails its own note and nothing else.

mod org;
mod pandoc;

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::config::{ConverterConfig, ConverterKind};

pub use org::OrgConverter;
pub use pandoc::PandocConverter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Org,
    Markdown,
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to start converter {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("converter I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("converter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("converter timed out after {0:?}")]
    Timeout(Duration),

    #[error("{converter} cannot convert {from:?} to {to:?}")]
    Unsupported {
        converter: &'static str,
        from: Dialect,
        to: Dialect,
    },

    #[error("converter thread terminated without a result")]
    WorkerLost,
}

/// Converts prose between dialects. Implementations must be callable from
/// several worker threads at once.
pub trait ProseConverter: Send + Sync {
    fn name(&self) -> &'static str;

    fn convert(&self, text: &str, from: Dialect, to: Dialect) -> Result<String, ConvertError>;
}

/// Returns text unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityConverter;

impl ProseConverter for IdentityConverter {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn convert(&self, text: &str, _from: Dialect, _to: Dialect) -> Result<String, ConvertError> {
        Ok(text.to_string())
    }
}

/// Builds the converter selected by `config`.
pub fn build(config: &ConverterConfig) -> Arc<dyn ProseConverter> {
    match config.kind {
        ConverterKind::Pandoc => Arc::new(PandocConverter::new(
            config.pandoc_path.clone(),
            config.pandoc_args.clone(),
            config.timeout(),
        )),
        ConverterKind::Builtin => Arc::new(OrgConverter),
        ConverterKind::None => Arc::new(IdentityConverter),
    }
}

/// Runs one conversion on a helper thread and waits at most `timeout`.
///
/// On timeout the helper is abandoned; converters that own external
/// resources enforce their own deadline as well.
pub fn convert_with_timeout(
    converter: &Arc<dyn ProseConverter>,
    text: String,
    from: Dialect,
    to: Dialect,
    timeout: Duration,
) -> Result<String, ConvertError> {
    let (tx, rx) = mpsc::channel();
    let converter = Arc::clone(converter);

    thread::Builder::new()
        .name(format!("convert-{}", converter.name()))
        .spawn(move || {
            let result = converter.convert(&text, from, to);
            let _ = tx.send(result);
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(ConvertError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(ConvertError::WorkerLost),
    }
}
