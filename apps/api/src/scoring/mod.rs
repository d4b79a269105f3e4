// Deterministic scoring layered on top of model judgments. No I/O, no LLM calls.

pub mod ats;
