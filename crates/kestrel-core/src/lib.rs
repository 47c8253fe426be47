//! # Kestrel Core
//!
//! Runtime core of the Kestrel scripting engine.
//!
//! ## Design Principles
//!
//! - **Shared objects**: every value is an [`ObjRef`], an atomically counted
//!   handle; mutable state sits behind a per-object reader/writer lock
//! - **Quark dispatch**: methods are looked up by interned symbol through a
//!   chain of per-type [`MethodTable`]s
//! - **Cons evaluation**: code is data; [`Evaluator`] walks cons cells
//! - **Typed serialization**: objects travel as a family/sub-id header
//!   followed by their state

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod builtin;
pub mod config;
pub mod cons;
pub mod dispatch;
mod drop_guard;
pub mod error;
pub mod evaluator;
pub mod lexical;
pub mod literal;
pub mod nameset;
pub mod object;
pub mod object_cell;
pub mod quark;
pub mod serial;
pub mod stream;

pub use builtin::{Builtin, install_core_forms};
pub use config::EngineConfig;
pub use cons::{Cons, ConsKind};
pub use dispatch::{Arity, MethodTable, NativeMethod};
pub use error::{CoreError, CoreResult, SerialError, SerialResult};
pub use evaluator::Evaluator;
pub use lexical::Lexical;
pub use literal::{Boolean, Integer, Str};
pub use nameset::Nameset;
pub use object::{ObjRef, Object, Value};
pub use object_cell::ObjectCell;
pub use quark::{Quark, QuarkZone, intern};
pub use serial::{Serial, SerialHeader, deserialize, register_family, serialize};
pub use stream::{InputStream, OutputStream};
