//! LearnForge Context Engine
//!
//! Turns a learner's query into a packed, analyzed grounding context:
//! query expansion, hybrid retrieval, token-budgeted packing, concept and
//! conflict analysis, cross-subject aggregation and grounded synthesis.

pub mod aggregator;
pub mod concepts;
pub mod conflicts;
pub mod engine;
pub mod expander;
pub mod packer;
pub mod synthesizer;

pub use aggregator::{AggregatedContext, ConceptCluster, ContextAggregator, PrerequisiteLink};
pub use concepts::{Agreement, ConceptAnalyzer, ConceptMap, ConceptSummary};
pub use conflicts::{Claim, Confidence, Conflict, ConflictResolver, ConsensusArea, ConsensusFinder};
pub use engine::{ContextEngine, ContextResult, SourceContribution};
pub use expander::{QueryExpander, QueryExpansion};
pub use packer::{ContextPacker, PackedContext};
pub use synthesizer::{
    Completion, LanguageModel, OpenAiCompatibleClient, SynthesisOptions, SynthesizedOutput,
    Synthesizer,
};
