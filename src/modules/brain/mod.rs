pub mod gate;
pub mod llm;
pub mod template;
pub mod chain;

pub use gate::QualityGate;
pub use llm::{LlmProvider, TextProvider};
pub use chain::FallbackChain;
