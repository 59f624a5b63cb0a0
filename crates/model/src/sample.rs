//! Labelled input samples

use fixnet_fixed_point::FixedVector;

/// How the loader treats a malformed sample record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Abort on the first malformed record
    #[default]
    Strict,
    /// Skip malformed records with a warning
    BestEffort,
}

/// One input vector (in the configured input format) and its class label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Input pixels
    pub input: FixedVector,
    /// Ground-truth class index
    pub label: usize,
}

/// Samples read from one file
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Well-formed samples in file order
    pub samples: Vec<Sample>,
    /// Records dropped in best-effort mode
    pub skipped: usize,
}

impl Dataset {
    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if there are no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
