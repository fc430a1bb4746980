use thiserror::Error;

/// Whole-batch rejection. The message is the exact diagnostic returned to the
/// indexer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkillError {
    #[error("{skill_name} - Invalid request record array.")]
    MalformedRequest { skill_name: String },
}

/// Per-record failure; attached to that record's `errors` while the rest of the
/// batch carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("missing image_url: expected a path ending in a parent folder and a file name")]
    MissingImageUrl,
    #[error("image_url must be a string, found {found}")]
    ImageUrlNotString { found: &'static str },
    #[error("invalid image_url \"{image_url}\": expected a parent folder and a file name")]
    InvalidImageUrl { image_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(
        "no blob container configured (set SKILL_CONTAINER_URI or SKILL_STORAGE_CONNECTION_STRING with SKILL_CONTAINER_NAME)"
    )]
    MissingContainer,
    #[error("SKILL_CONTAINER_NAME is required with a storage connection string")]
    MissingContainerName,
    #[error("storage connection string is missing {0}")]
    MissingConnectionField(&'static str),
    #[error("storage connection string segment {0:?} is not Key=Value")]
    MalformedConnectionSegment(String),
    #[error("invalid container uri {uri:?}: {reason}")]
    InvalidContainerUri { uri: String, reason: String },
    #[error("invalid {key}={value:?}")]
    InvalidValue { key: &'static str, value: String },
}
