//! Error types for consensus validation and block assembly

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Transaction validation failed: {0}")]
    TransactionValidation(String),

    #[error("Block validation failed: {0}")]
    BlockValidation(String),

    #[error("Script execution failed: {0}")]
    ScriptExecution(String),

    #[error("UTXO not found: {0}")]
    UtxoNotFound(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid proof of work: {0}")]
    InvalidProofOfWork(String),

    #[error("Economic validation failed: {0}")]
    EconomicValidation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Consensus rule violation: {0}")]
    ConsensusRuleViolation(String),

    #[error("Proof of knowledge requested over an empty transaction list")]
    EmptyTransactionList,

    #[error("Could not build block template: {0}")]
    TemplateAssembly(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Proof-of-work verdict for a header
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowError {
    #[error("proof of work failed: nBits below minimum work")]
    BelowMinimumWork,

    #[error("proof of work failed: hash doesn't match nBits")]
    ExceedsTarget,
}

impl PowError {
    /// Stable rejection reason
    pub fn reason(&self) -> &'static str {
        match self {
            PowError::BelowMinimumWork => "bad-diffbits",
            PowError::ExceedsTarget => "high-hash",
        }
    }
}

/// Block-level proof verdict: work, knowledge, and header signature
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    #[error("{0}")]
    FailedProofOfWork(PowError),

    #[error("proof of knowledge does not match block contents")]
    PoKMismatch,

    #[error("header signature does not verify against the coinbase key")]
    BadHeaderSignature,
}

impl BlockError {
    /// Stable rejection reason
    pub fn reason(&self) -> &'static str {
        match self {
            BlockError::FailedProofOfWork(err) => err.reason(),
            BlockError::PoKMismatch => "bad-pok",
            BlockError::BadHeaderSignature => "bad-header-sig",
        }
    }
}

impl From<PowError> for BlockError {
    fn from(err: PowError) -> Self {
        BlockError::FailedProofOfWork(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings_are_stable() {
        assert_eq!(PowError::BelowMinimumWork.reason(), "bad-diffbits");
        assert_eq!(PowError::ExceedsTarget.reason(), "high-hash");
        assert_eq!(BlockError::PoKMismatch.reason(), "bad-pok");
        assert_eq!(BlockError::from(PowError::ExceedsTarget).reason(), "high-hash");
    }

    #[test]
    fn test_template_error_message() {
        let err = ConsensusError::TemplateAssembly("connect failed".to_string());
        assert_eq!(err.to_string(), "Could not build block template: connect failed");
    }
}
