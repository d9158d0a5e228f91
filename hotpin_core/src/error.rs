use crate::ContentId;

pub type PinResult<T> = std::result::Result<T, PinError>;

/// Failures surfaced by the pin ledger and the pinning adapter.
///
/// Nothing below `PinningAdapter` retries; every variant reaches the caller.
#[derive(thiserror::Error, Debug)]
pub enum PinError {
    /// The content id is not tracked by the ledger at all.
    #[error("content {0} is not tracked by the pin ledger")]
    NotFound(ContentId),

    /// An internal consistency check failed, e.g. a GC purge of an entry
    /// that still has a durable holder.
    #[error("pin ledger invariant violated: {0}")]
    InvariantViolation(String),

    /// The key-value store failed to read, write or decode a record.
    #[error("persistence failure: {context}")]
    Persistence {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// The storage node rejected a call, was unreachable or timed out.
    #[error("storage node failure: {context}")]
    Upstream {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Discriminant of [`PinError`], handy for matching without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinErrorKind {
    NotFound,
    InvariantViolation,
    Persistence,
    Upstream,
}

impl PinError {
    pub fn kind(&self) -> PinErrorKind {
        match self {
            PinError::NotFound(_) => PinErrorKind::NotFound,
            PinError::InvariantViolation(_) => PinErrorKind::InvariantViolation,
            PinError::Persistence { .. } => PinErrorKind::Persistence,
            PinError::Upstream { .. } => PinErrorKind::Upstream,
        }
    }

    pub fn persistence(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        PinError::Persistence {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn upstream(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        PinError::Upstream {
            context: context.into(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn source_chain_is_kept() {
        let err = PinError::persistence("put pins/x", anyhow::anyhow!("disk full"));
        assert_eq!(err.kind(), PinErrorKind::Persistence);
        assert_eq!(err.to_string(), "persistence failure: put pins/x");
        assert_eq!(err.source().unwrap().to_string(), "disk full");
    }

    #[test]
    fn not_found_names_the_content() {
        let c = ContentId::for_raw_bytes(b"missing");
        let err = PinError::NotFound(c);
        assert_eq!(err.kind(), PinErrorKind::NotFound);
        assert!(err.to_string().contains(&c.to_string()));
    }
}
