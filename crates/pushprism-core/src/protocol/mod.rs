//! Exposition wire formats.
//!
//! - `text`: pushed payloads, parsed by `openmetrics_parser` and mapped onto
//!   the typed model.
//! - `encode`: text and delimited-protobuf encoders for scrapes.
//!
//! Malformed input is reported as `PushPrismError::Parse`.

pub mod encode;
pub mod text;
