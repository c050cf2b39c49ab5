//! Assembly configuration.

use h5j_core::{CalibrationConvention, Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// What to do when a channel's depth differs from channel 0's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// Truncate to the smaller depth, stop at that channel, and report a warning.
    #[default]
    Truncate,
    /// Abort with [`Error::ChannelDepthMismatch`].
    Fail,
}

/// Configuration for [`crate::StackReassembler`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Handling of channels whose depth differs from channel 0.
    pub mismatch_policy: MismatchPolicy,
    /// Decode channels after channel 0 on parallel workers.
    pub parallel: bool,
    /// Worker count for a dedicated pool; `None` uses the global rayon pool.
    pub threads: Option<usize>,
    /// Where spacing and unit are read from.
    pub convention: CalibrationConvention,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            mismatch_policy: MismatchPolicy::Truncate,
            parallel: true,
            threads: None,
            convention: CalibrationConvention::Auto,
        }
    }
}

impl AssemblyConfig {
    /// Sets the mismatch policy.
    #[must_use]
    pub fn with_mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.mismatch_policy = policy;
        self
    }

    /// Enables or disables parallel channel decoding.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets the dedicated worker count; `0` means the global pool.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = (threads > 0).then_some(threads);
        self
    }

    /// Sets the calibration convention.
    #[must_use]
    pub fn with_convention(mut self, convention: CalibrationConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Load configuration from a JSON string. Missing fields take defaults.
    ///
    /// # Errors
    /// Returns [`Error::Config`] on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| Error::Config(format!("{}: {e}", path.as_ref().display())))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::Config(e.to_string()))
    }
}
