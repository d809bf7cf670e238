//! Integration test suite for the entity-component store, organized by
//! behavior: entity lifecycle, phase-gated access and queries, and chunk
//! sanitization.

pub mod entity_lifecycle_tests;
pub mod phase_and_query_tests;
pub mod sanitize_and_allocator_tests;
