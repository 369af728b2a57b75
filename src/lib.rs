//! Dusk: a standalone compiler translating Dusk shading-language source
//! text into Vulkan SPIR-V binary modules.
//!
//! Pipeline: lex ([`front::lexer`]) → parse ([`front::parser`]) → analyze
//! ([`analysis`]) → lower to IR ([`ir`]) → emit SPIR-V words
//! ([`back::spv`]). [`driver::compile`] drives the whole pipeline and is
//! the crate's single public entry point.
//!
//! Most long-lived structures are stored in an [`Arena`] and referenced by
//! [`Handle`], following the arena/handle substrate this crate's structure
//! is grounded on.
#![allow(clippy::new_without_default)]
#![deny(clippy::panic)]

mod arena;
pub mod analysis;
pub mod back;
pub mod diagnostics;
pub mod driver;
pub mod front;
pub mod ir;
pub mod ty;

pub use crate::arena::{Arena, Handle};
pub use crate::driver::compile;

use std::collections::{HashMap, HashSet};
use std::hash::BuildHasherDefault;

/// Hash map that is faster but not resilient to DoS attacks.
pub type FastHashMap<K, T> = HashMap<K, T, BuildHasherDefault<fxhash::FxHasher>>;
/// Hash set that is faster but not resilient to DoS attacks.
pub type FastHashSet<K> = HashSet<K, BuildHasherDefault<fxhash::FxHasher>>;
