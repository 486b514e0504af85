//! A user-space dynamic binary translator that executes AArch64 (ARM64) guest machine code on an
//! x86_64 host: a guest instruction decoder, a block-at-a-time translation pipeline with
//! per-instruction-family lowering to byte-exact x86_64 machine code, and a direct-mapped
//! translation cache keyed by guest program counter.
//!
//! The module layout follows the translator pipeline end to end:
//!
//! - [`buffer`] — C1, the append-only host code sink.
//! - [`emit`] — C2, the byte-exact x86_64 instruction emitter.
//! - [`decode`] — C3, the guest instruction classifier.
//! - [`translate`] — C4, the per-family operation translators.
//! - [`block`] — C5, block discovery.
//! - [`cache`] — C6, the translation cache.
//! - [`arena`] — C7, the executable memory arena.
//! - [`state`] — C8, the guest CPU state image.
//! - [`trace`] — C9, the debug/trace sink.
//! - [`memory`] — the guest memory collaborator interface.
//! - [`dispatch`] — the execution trampoline that calls into translated code.
//! - [`translator`] — the public `Translator`/`TranslatorBuilder` facade composing all of the above.

pub mod arena;
pub mod block;
pub mod buffer;
pub mod cache;
pub mod decode;
pub mod dispatch;
pub mod emit;
pub mod error;
pub mod memory;
pub mod state;
pub mod trace;
pub mod translate;
pub mod translator;

pub use error::Error;
pub use translator::{Translator, TranslatorBuilder};
