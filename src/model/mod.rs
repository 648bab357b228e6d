//! View-model types shared by the chat and review controllers

pub mod conversation;
pub mod evaluation;
pub mod message;

pub use conversation::{Conversation, UNTITLED};
pub use evaluation::{
    EvalMeta, EvaluationData, JudgeResult, ToolCall, ToolTraceEntry, TraceContent, TraceMessage,
    ValidationResult,
};
pub use message::{
    synthesize_id, AddedBy, Message, Place, PlaceDetails, PlaceList, QuickResponse, Role,
    VolatilePlaceData,
};
