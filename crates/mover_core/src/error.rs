use std::fmt;

use thiserror::Error;

/// Which polymorphic base a replicated item belongs to.
///
/// Wire ids are only meaningful inside one family, so a valid id for a
/// modifier is still rejected when it shows up inside a layered move array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    LayeredMove,
    LayeredMoveData,
    MovementModifier,
    InstantEffect,
    DataStruct,
}

impl TypeFamily {
    pub const ALL: [TypeFamily; 5] = [
        TypeFamily::LayeredMove,
        TypeFamily::LayeredMoveData,
        TypeFamily::MovementModifier,
        TypeFamily::InstantEffect,
        TypeFamily::DataStruct,
    ];

    /// One-byte tag written in front of every replicated item.
    pub fn wire_tag(self) -> u8 {
        match self {
            TypeFamily::LayeredMove => 1,
            TypeFamily::LayeredMoveData => 2,
            TypeFamily::MovementModifier => 3,
            TypeFamily::InstantEffect => 4,
            TypeFamily::DataStruct => 5,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.wire_tag() == tag)
    }
}

impl fmt::Display for TypeFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypeFamily::LayeredMove => write!(f, "layered move"),
            TypeFamily::LayeredMoveData => write!(f, "layered move data"),
            TypeFamily::MovementModifier => write!(f, "movement modifier"),
            TypeFamily::InstantEffect => write!(f, "instant movement effect"),
            TypeFamily::DataStruct => write!(f, "mover data struct"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("Unknown wire type id {id} for {family}")]
    UnknownTypeId { family: TypeFamily, id: u16 },

    #[error("Expected a {expected} but the archive holds a {found}")]
    WrongFamily { expected: TypeFamily, found: TypeFamily },

    #[error("Unknown type family tag {0}")]
    UnknownFamilyTag(u8),

    #[error("Type '{type_name}' is not registered as a {family}")]
    UnregisteredType { family: TypeFamily, type_name: String },

    #[error("Type '{type_name}' is already registered as a {family}")]
    DuplicateType { family: TypeFamily, type_name: String },

    #[error("Unexpected end of archive: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("Payload of {0} bytes is too large to replicate")]
    PayloadTooLarge(usize),

    #[error("Invalid UTF-8 string in archive")]
    InvalidString,

    #[error("Archive has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

#[derive(Error, Debug)]
pub enum MoverError {
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Movement mode not registered: {name}")]
    ModeNotRegistered { name: String },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: &'static str },

    #[error("Blackboard entry not found: {name}")]
    BlackboardEntryNotFound { name: String },

    #[error("Blackboard entry already exists: {name}")]
    BlackboardEntryExists { name: String },

    #[error("Blackboard entry '{name}' has no readable value")]
    BlackboardEntryUnreadable { name: String },

    #[error("No layered move logic registered for data type {data_type}")]
    MissingMoveLogic { data_type: String },

    #[error("Frame {frame} is not in the state history")]
    FrameNotInHistory { frame: u32 },

    #[error("Replication error: {0}")]
    Replication(#[from] ReplicationError),
}

impl MoverError {
    /// Errors a live simulation can log and keep ticking through.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MoverError::ModeNotRegistered { .. } => true,
            MoverError::BlackboardEntryNotFound { .. } => true,
            MoverError::BlackboardEntryUnreadable { .. } => true,
            MoverError::MissingMoveLogic { .. } => true,
            MoverError::FrameNotInHistory { .. } => true,
            MoverError::Replication(_) => false,
            MoverError::TypeMismatch { .. } => false,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for MoverError {
    fn from(err: serde_json::Error) -> Self {
        MoverError::ParseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MoverError>;
