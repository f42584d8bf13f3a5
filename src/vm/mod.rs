pub mod bytecode;
pub mod compiler;
pub mod disasm;
pub mod machine;
pub mod serialize;
pub mod value;

pub use bytecode::{Arg, Constant, Instruction, Module, Op};
pub use compiler::Compiler;
pub use machine::{Vm, VmError, VmErrorKind};
pub use serialize::{LoadError, load_module, save_module};
pub use value::Value;
