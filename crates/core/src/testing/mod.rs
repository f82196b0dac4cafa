//! Test doubles shared across unit and integration tests.

mod mock_converter;

pub use mock_converter::MockConverter;
