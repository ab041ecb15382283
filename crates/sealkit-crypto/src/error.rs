use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// The random source could not supply the requested bytes.
    #[error("entropy unavailable: {0}")]
    EntropyUnavailable(String),

    /// A primitive could not be instantiated with the given parameters.
    #[error("algorithm unavailable: {0}")]
    AlgorithmUnavailable(String),

    /// Key or IV bytes of the wrong shape (e.g. from a foreign bundle).
    #[error("malformed cipher material: {0}")]
    MalformedMaterial(String),

    /// Ciphertext is truncated, not block-aligned, or has invalid padding.
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),
}
