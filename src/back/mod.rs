//! Backends. Only SPIR-V is implemented; this module exists so future
//! targets can sit alongside it without touching the front end.

pub mod spv;
