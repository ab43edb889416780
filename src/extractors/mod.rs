//! Request extractors.

mod request_context;
