use thiserror::Error;

/// Error type for every encode/decode/registry operation.
///
/// All errors are fatal to the current encode or decode call; there is no
/// partial-result recovery. Callers may retry after fixing registry state.
#[derive(Debug, Error)]
pub enum ObjectraError {
    #[error("codec ({0}) not found")]
    CodecNotFound(String),
    #[error("no codec of ({0}) or its ancestors exposes the required callback")]
    CodecMatchNotFound(String),
    #[error("codec ({0}) already registered")]
    DuplicateRegistration(String),
    #[error("codec ({0}) config already sealed")]
    AlreadyConfigured(String),
    #[error("codec ({0}) does not have a serializer")]
    SerializeMethodMissing(String),
    #[error("codec ({0}) does not have an instantiator")]
    InstantiateMethodMissing(String),
    #[error("type ({type_name}) constructor rejected its arguments: {message}")]
    InvalidConstructorArguments { type_name: String, message: String },
    #[error("type ({0}) has no applicable reconstruction strategy for its arity")]
    InvalidConstructorArity(String),
    #[error("codec ({0}) serializer re-entered its own value without decomposing it")]
    SelfSerialization(String),
    #[error("codec ({0}) instantiator re-entered its own value without decomposing it")]
    SelfInstantiation(String),
    #[error("backloop token does not belong to the current invocation")]
    ForeignReferenceToken,
    #[error("invalid reference injection path")]
    InvalidReferenceInjectionPath,
    #[error("({type_name}) could not compose into an instance")]
    Composition {
        type_name: String,
        #[source]
        source: Box<ObjectraError>,
    },
    #[error("malformed model: {0}")]
    MalformedModel(String),
    /// Escape hatch for user codec callbacks to signal their own failures.
    #[error("{0}")]
    Custom(String),
}
