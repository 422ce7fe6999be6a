pub mod qa_turn;
pub mod query;
pub mod repair_context;
pub mod session;

pub use qa_turn::{normalize_history, ConversationMessage, QaTurn};
pub use query::{
    collect_files, GeneratedAnswer, QueryRequest, QueryResponse, RetrievedContext,
    SessionResponse, Timing,
};
pub use repair_context::{normalize_whitespace, RepairContext};
pub use session::{Session, SessionId};
