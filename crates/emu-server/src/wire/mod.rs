//! The wire protocol: form decoding, XML encoding, error mapping.
//!
//! `emu-core` never depends on any of this; it is the server crate's sole
//! responsibility to know that requests are form-encoded and responses are
//! XML (spec.md §4.6, §6).

pub mod error;
pub mod form;
pub mod xml;

pub use error::HttpError;
pub use form::FormParams;
