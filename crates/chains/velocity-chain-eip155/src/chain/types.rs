use std::fmt::{Display, Formatter};
use velocity_types::chain::ChainId;

/// The CAIP-2 namespace for EVM-compatible chains.
pub const EIP155_NAMESPACE: &str = "eip155";

/// A numeric chain ID for EVM-compatible networks.
///
/// ```
/// use velocity_chain_eip155::chain::Eip155ChainReference;
/// use velocity_types::chain::ChainId;
///
/// let devnet = Eip155ChainReference::new(1337);
/// let chain_id: ChainId = devnet.into();
/// assert_eq!(chain_id.to_string(), "eip155:1337");
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Eip155ChainReference(u64);

impl Eip155ChainReference {
    pub fn new(chain_id: u64) -> Self {
        Self(chain_id)
    }

    /// Returns the numeric chain ID.
    pub fn inner(&self) -> u64 {
        self.0
    }

    pub fn as_chain_id(&self) -> ChainId {
        ChainId::new(EIP155_NAMESPACE, self.0.to_string())
    }
}

impl From<Eip155ChainReference> for ChainId {
    fn from(value: Eip155ChainReference) -> Self {
        value.as_chain_id()
    }
}

impl TryFrom<&ChainId> for Eip155ChainReference {
    type Error = Eip155ChainReferenceFormatError;

    fn try_from(value: &ChainId) -> Result<Self, Self::Error> {
        if value.namespace != EIP155_NAMESPACE {
            return Err(Eip155ChainReferenceFormatError::InvalidNamespace(
                value.namespace.clone(),
            ));
        }
        let chain_id: u64 = value.reference.parse().map_err(|_| {
            Eip155ChainReferenceFormatError::InvalidReference(value.reference.clone())
        })?;
        Ok(Eip155ChainReference(chain_id))
    }
}

impl TryFrom<ChainId> for Eip155ChainReference {
    type Error = Eip155ChainReferenceFormatError;

    fn try_from(value: ChainId) -> Result<Self, Self::Error> {
        Self::try_from(&value)
    }
}

/// Error returned when converting a [`ChainId`] to an [`Eip155ChainReference`].
#[derive(Debug, thiserror::Error)]
pub enum Eip155ChainReferenceFormatError {
    #[error("Invalid namespace {0}, expected eip155")]
    InvalidNamespace(String),
    #[error("Invalid eip155 chain reference {0}")]
    InvalidReference(String),
}

impl Display for Eip155ChainReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_reference_from_chain_id() {
        let chain_id = ChainId::new("eip155", "2021");
        let reference = Eip155ChainReference::try_from(&chain_id).unwrap();
        assert_eq!(reference.inner(), 2021);
        assert_eq!(ChainId::from(reference), chain_id);
    }

    #[test]
    fn test_chain_reference_rejects_foreign_chains() {
        assert!(matches!(
            Eip155ChainReference::try_from(ChainId::new("solana", "1")),
            Err(Eip155ChainReferenceFormatError::InvalidNamespace(_))
        ));
        assert!(matches!(
            Eip155ChainReference::try_from(ChainId::new("eip155", "base")),
            Err(Eip155ChainReferenceFormatError::InvalidReference(_))
        ));
    }
}
