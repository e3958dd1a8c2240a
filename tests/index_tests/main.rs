//! Tests for the chunk index and its persisted form

mod codec_tests;
mod table_tests;
