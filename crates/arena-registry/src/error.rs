//! Error types for the registry layer.

/// Errors that can occur while acquiring an entity.
///
/// Ids are carried pre-rendered so the error type stays independent of the
/// registry's key type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The entity isn't tracked and the caller didn't ask to create it.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Another holder kept the lock for longer than the configured bound.
    /// Not retried here; the caller decides.
    #[error("timed out waiting for exclusive access to {kind} {id}")]
    LockTimeout { kind: &'static str, id: String },

    /// The entity was destroyed while this caller was waiting for it.
    #[error("{kind} {id} was destroyed")]
    Destroyed { kind: &'static str, id: String },
}
