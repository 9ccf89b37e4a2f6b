//! Test suites for the orchestrator.

mod support;
