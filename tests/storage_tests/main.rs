//! Tests for the storage backends

mod metadata_tests;
