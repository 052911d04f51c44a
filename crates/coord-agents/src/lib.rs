//! Message, session, and agent-capability model shared by the coordination
//! engine: what gets said, who says it, and who can be asked.

mod agent;
mod error;
mod message;
mod registry;
mod session;
pub mod testing;

pub use agent::{ConstraintRecord, CritiqueDecision, Proposal, ReasoningAgent, Verdict};
pub use error::AgentError;
pub use message::{Message, MessageContent, MessageKind, Recipients};
pub use registry::AgentRegistry;
pub use session::{CoordinationSession, LedgerReceipt, NegotiationRound, SessionState};
