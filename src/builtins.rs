use crate::runtime_io::RuntimeIo;
use crate::vm::value::{Value, display_value};

pub type BuiltinFn = fn(&[Value], &mut dyn RuntimeIo) -> Result<Value, String>;

/// A builtin function: the VM resolves direct calls against this registry
/// before looking at globals. Builtins receive their arguments in push order
/// and always hand exactly one value (possibly nil) back to the caller.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub min_arity: usize,
    pub max_arity: usize,
    pub func: BuiltinFn,
}

const PRINT: Builtin = Builtin {
    name: "print",
    min_arity: 0,
    max_arity: 255,
    func: builtin_print,
};

const LEN: Builtin = Builtin {
    name: "len",
    min_arity: 1,
    max_arity: 1,
    func: builtin_len,
};

const TYPE: Builtin = Builtin {
    name: "type",
    min_arity: 1,
    max_arity: 1,
    func: builtin_type,
};

const STR: Builtin = Builtin {
    name: "str",
    min_arity: 1,
    max_arity: 1,
    func: builtin_str,
};

const NUM: Builtin = Builtin {
    name: "num",
    min_arity: 1,
    max_arity: 1,
    func: builtin_num,
};

static REGISTRY: &[Builtin] = &[PRINT, LEN, TYPE, STR, NUM];

pub fn all() -> &'static [Builtin] {
    REGISTRY
}

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    REGISTRY.iter().find(|b| b.name == name)
}

fn builtin_print(args: &[Value], io: &mut dyn RuntimeIo) -> Result<Value, String> {
    let parts: Vec<String> = args.iter().map(display_value).collect();
    io.write_line(&parts.join(" "));
    Ok(Value::Nil)
}

fn builtin_len(args: &[Value], _io: &mut dyn RuntimeIo) -> Result<Value, String> {
    match &args[0] {
        Value::Array(items) => Ok(Value::Number(items.borrow().len() as f64)),
        Value::Table(map) => Ok(Value::Number(map.borrow().len() as f64)),
        Value::Str(s) => Ok(Value::Number(s.len() as f64)),
        other => Err(format!("len: cannot take length of {}", other.type_name())),
    }
}

fn builtin_type(args: &[Value], _io: &mut dyn RuntimeIo) -> Result<Value, String> {
    Ok(Value::string(args[0].type_name()))
}

fn builtin_str(args: &[Value], _io: &mut dyn RuntimeIo) -> Result<Value, String> {
    Ok(Value::string(&display_value(&args[0])))
}

fn builtin_num(args: &[Value], _io: &mut dyn RuntimeIo) -> Result<Value, String> {
    match &args[0] {
        Value::Number(n) => Ok(Value::Number(*n)),
        Value::Str(s) => Ok(s
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .unwrap_or(Value::Nil)),
        _ => Ok(Value::Nil),
    }
}
