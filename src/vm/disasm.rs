use std::fmt::{self, Write};

use super::bytecode::{Arg, Constant, Instruction, Module};

pub fn disassemble_module_to_string(module: &Module) -> String {
    let mut output = String::new();
    let _ = disassemble_module(module, &mut output);
    output
}

pub fn disassemble_module(module: &Module, w: &mut impl Write) -> fmt::Result {
    writeln!(w, "=== Module Disassembly ===")?;
    writeln!(w)?;

    writeln!(w, "Constants ({}):", module.constants.len())?;
    for (i, c) in module.constants.iter().enumerate() {
        writeln!(w, "  {}: {}", i, fmt_constant(c))?;
    }
    writeln!(w)?;

    writeln!(w, "Instructions ({}):", module.instructions.len())?;
    for (i, ins) in module.instructions.iter().enumerate() {
        write!(w, "  {:4}: ", i)?;
        disassemble_instruction(module, ins, w)?;
        writeln!(w)?;
    }

    Ok(())
}

fn fmt_constant(c: &Constant) -> String {
    match c {
        Constant::Number(n) => format!("number {}", n),
        Constant::Str(s) => format!("string {:?}", s),
        Constant::FuncPtr(entry) => format!("funcptr -> {}", entry),
        Constant::Bool(b) => format!("bool {}", b),
        Constant::Nil => "nil".to_string(),
    }
}

fn disassemble_instruction(module: &Module, ins: &Instruction, w: &mut impl Write) -> fmt::Result {
    match &ins.arg {
        None => write!(w, "{}", ins.op),
        Some(Arg::Const(idx)) => {
            let resolved = module
                .constants
                .get(*idx as usize)
                .map(fmt_constant)
                .unwrap_or_else(|| "<out of range>".to_string());
            write!(w, "{} {} ({})", ins.op, idx, resolved)
        }
        Some(Arg::Int(v)) => write!(w, "{} {}", ins.op, v),
        Some(Arg::Float(f)) => write!(w, "{} {}", ins.op, f),
        Some(Arg::Str(s)) => write!(w, "{} {:?}", ins.op, s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::bytecode::Op;

    #[test]
    fn test_disassembly_lists_constants_and_instructions() {
        let module = Module {
            constants: vec![Constant::Number(42.0), Constant::Str("hi".to_string())],
            instructions: vec![
                Instruction::new(Op::Constant, Some(Arg::Const(0)), 1),
                Instruction::new(Op::SetGlobal, Some(Arg::Str("x".to_string())), 1),
                Instruction::new(Op::Halt, None, 1),
            ],
        };
        let text = disassemble_module_to_string(&module);
        assert!(text.contains("Constants (2):"));
        assert!(text.contains("number 42"));
        assert!(text.contains("Instructions (3):"));
        assert!(text.contains("Constant 0 (number 42)"));
        assert!(text.contains("SetGlobal \"x\""));
        assert!(text.contains("Halt"));
    }
}
