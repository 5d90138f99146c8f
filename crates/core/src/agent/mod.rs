//! The agent graph: ROUTER picks a specialist, the specialist produces turns,
//! TOOLS executes invocations, CORRECTION nudges idle specialists, DONE ends.

pub mod correction;
pub mod graph;
pub mod orchestrator;
pub mod prompts;
pub mod router;
pub mod sanitize;
pub mod specialist;
pub mod summary;
pub mod tools;

pub use graph::{GraphError, Signal, TransitionTable};
pub use orchestrator::{
  AgentState, ExecutionReport, Orchestrator, OrchestratorError, OrchestratorSettings, Outcome,
};
pub use router::Router;
pub use specialist::Specialist;
