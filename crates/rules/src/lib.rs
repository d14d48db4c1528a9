//! File-based persistence for automation rules: one JSON document per rule
//! under a configured directory, named by the rule's id.

pub mod persistence;

pub use persistence::RuleStore;
