//! The typed SSA IR the translator lowers into: types,
//! instruction and module arenas, an insertion-point
//! builder, a textual printer in LLVM's `.ll` dialect, a
//! declaration scanner for imports, and a structural
//! verifier with cleanup passes.

pub mod builder;
pub mod instr;
pub mod module;
pub mod parse;
pub mod print;
pub mod ty;
pub mod verify;

pub use builder::{Bookmark, Builder};
pub use instr::{BinTag, BlockId, CastTag, Cond, Const, FuncId, InstrId, Op, Val, ValKind};
pub use module::{Function, Module};
pub use parse::{scan_declarations, ScannedFunc};
pub use ty::{parse_type, Type};
