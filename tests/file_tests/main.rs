//! Tests for the buffered append file
