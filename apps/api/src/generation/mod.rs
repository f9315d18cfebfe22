// Fused generation: one rewrite-and-score call per job.
// All LLM calls go through llm_client; no direct provider calls here.

pub mod fused;
pub mod prompts;
pub mod tone;
