use std::collections::HashMap;
use std::rc::Rc;

use super::bytecode::{Arg, Constant, Instruction, Module, Op};
use super::value::{Value, display_value};
use crate::builtins;
use crate::runtime_io::{RuntimeIo, StdIo};

#[derive(Debug, PartialEq, Eq)]
pub enum VmErrorKind {
    DivisionByZero,
    UndefinedFunction,
    NotCallable,
    StackUnderflow,
    BadConstant,
    Builtin,
}

#[derive(Debug)]
pub struct VmError {
    pub kind: VmErrorKind,
    pub message: String,
    /// Source line recorded on the offending instruction.
    pub line: u16,
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "runtime error (line {}): {:?}: {}",
            self.line, self.kind, self.message
        )
    }
}

impl std::error::Error for VmError {}

pub type VmResult<T> = Result<T, VmError>;

/// An activation record. The instruction stream is shared by every frame;
/// local slot `i` of this frame lives at stack position `base + i`.
#[derive(Debug, Clone, Copy)]
struct Frame {
    ip: usize,
    base: usize,
    #[allow(dead_code)]
    arg_count: usize,
}

const INITIAL_STACK_SLOTS: usize = 8192;

pub struct Vm {
    stack: Vec<Value>,
    sp: usize,
    frames: Vec<Frame>,
    globals: HashMap<String, Value>,
    current_line: u16,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self {
            stack: vec![Value::Nil; INITIAL_STACK_SLOTS],
            sp: 0,
            frames: Vec::with_capacity(32),
            globals: HashMap::with_capacity(128),
            current_line: 0,
        }
    }

    pub fn run(&mut self, module: &Module) -> VmResult<()> {
        let mut stdio = StdIo;
        self.run_with_io(module, &mut stdio)
    }

    /// Executes the module with an explicit runtime I/O provider. All VM
    /// state is reset first, so a `Vm` can be reused across runs.
    pub fn run_with_io<IO: RuntimeIo>(&mut self, module: &Module, io: &mut IO) -> VmResult<()> {
        self.reset();
        if module.instructions.is_empty() {
            return Ok(());
        }
        self.frames.push(Frame {
            ip: 0,
            base: 0,
            arg_count: 0,
        });

        loop {
            let (ip, base) = match self.frames.last() {
                Some(f) => (f.ip, f.base),
                None => return Ok(()),
            };

            // Running off the end of the stream terminates the main frame;
            // a callee that does so is abandoned (the emitter always closes
            // function bodies with Return).
            if ip >= module.instructions.len() {
                if self.frames.len() == 1 {
                    return Ok(());
                }
                self.frames.pop();
                continue;
            }

            let ins = &module.instructions[ip];
            if let Some(f) = self.frames.last_mut() {
                f.ip = ip + 1;
            }
            self.current_line = ins.line;

            match ins.op {
                Op::Constant => {
                    let c = self.constant(module, ins)?;
                    let v = Value::from_constant(c);
                    self.push(v);
                }
                Op::Add => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let result = match (&a, &b) {
                        (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
                        _ => Value::string(&format!("{}{}", display_value(&a), display_value(&b))),
                    };
                    self.push(result);
                }
                Op::Sub => {
                    let b = self.pop()?.as_number();
                    let a = self.pop()?.as_number();
                    self.push(Value::Number(a - b));
                }
                Op::Mul => {
                    let b = self.pop()?.as_number();
                    let a = self.pop()?.as_number();
                    self.push(Value::Number(a * b));
                }
                Op::Div => {
                    let b = self.pop()?.as_number();
                    let a = self.pop()?.as_number();
                    if b == 0.0 {
                        return Err(self.error(VmErrorKind::DivisionByZero, "div by zero"));
                    }
                    self.push(Value::Number(a / b));
                }
                Op::CmpEq | Op::CmpNe => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let mut eq = a == b;
                    if ins.op == Op::CmpNe {
                        eq = !eq;
                    }
                    self.push(Value::Number(if eq { 1.0 } else { 0.0 }));
                }
                Op::CmpLt => self.compare(|a, b| a < b)?,
                Op::CmpLte => self.compare(|a, b| a <= b)?,
                Op::CmpGt => self.compare(|a, b| a > b)?,
                Op::CmpGte => self.compare(|a, b| a >= b)?,
                Op::Not => {
                    let v = self.pop()?;
                    self.push(Value::Number(if v.is_truthy() { 0.0 } else { 1.0 }));
                }
                Op::Pop => {
                    self.pop()?;
                }
                Op::SetGlobal => {
                    let v = self.pop()?;
                    let name = self.arg_str(ins)?;
                    self.globals.insert(name.to_string(), v);
                }
                Op::GetGlobal => {
                    let name = self.arg_str(ins)?;
                    let v = self.globals.get(name).cloned().unwrap_or(Value::Nil);
                    self.push(v);
                }
                Op::SetLocal => {
                    let idx = self.arg_index(ins)?;
                    let v = self.pop()?;
                    self.set_local(base, idx, v);
                }
                Op::GetLocal => {
                    let idx = self.arg_index(ins)?;
                    let v = self.get_local(base, idx);
                    self.push(v);
                }
                Op::GetIndex => {
                    let index = self.pop()?;
                    let container = self.pop()?;
                    let v = match &container {
                        Value::Array(items) => {
                            let i = index.as_number() as i64;
                            let items = items.borrow();
                            if i >= 0 && (i as usize) < items.len() {
                                items[i as usize].clone()
                            } else {
                                Value::Nil
                            }
                        }
                        Value::Table(map) => {
                            let key = display_value(&index);
                            map.borrow().get(&key).cloned().unwrap_or(Value::Nil)
                        }
                        _ => Value::Nil,
                    };
                    self.push(v);
                }
                Op::SetIndex => {
                    let value = self.pop()?;
                    let index = self.pop()?;
                    let container = self.pop()?;
                    match &container {
                        Value::Array(items) => {
                            let i = index.as_number() as i64;
                            let mut items = items.borrow_mut();
                            // out-of-range writes are silently dropped
                            if i >= 0 && (i as usize) < items.len() {
                                items[i as usize] = value;
                            }
                        }
                        Value::Table(map) => {
                            map.borrow_mut().insert(display_value(&index), value);
                        }
                        _ => {}
                    }
                    self.push(container);
                }
                Op::Table => {
                    self.push(Value::table());
                }
                Op::Array => {
                    let count = self.arg_index(ins)?;
                    if self.sp < count {
                        return Err(self.error(VmErrorKind::StackUnderflow, "stack underflow"));
                    }
                    let start = self.sp - count;
                    let items: Vec<Value> = self.stack[start..self.sp]
                        .iter_mut()
                        .map(|slot| std::mem::replace(slot, Value::Nil))
                        .collect();
                    self.sp = start;
                    self.push(Value::array(items));
                }
                Op::MakeFunc => {
                    let entry = match self.constant(module, ins)? {
                        Constant::FuncPtr(entry) => *entry as usize,
                        other => {
                            let msg = format!("MakeFunc on non-funcptr constant {:?}", other);
                            return Err(self.error(VmErrorKind::BadConstant, &msg));
                        }
                    };
                    self.push(Value::Function(Rc::new(super::value::FuncObj { entry })));
                }
                Op::Call => {
                    let count = self.pop()?.as_number() as usize;
                    let name = self.arg_str(ins)?.to_string();

                    if let Some(builtin) = builtins::lookup(&name) {
                        self.call_builtin(builtin, count, io)?;
                        continue;
                    }

                    match self.globals.get(&name).cloned() {
                        Some(Value::Function(f)) => self.enter_function(f.entry, count)?,
                        Some(_) => {
                            let msg = format!("'{}' is not a function", name);
                            return Err(self.error(VmErrorKind::NotCallable, &msg));
                        }
                        None => {
                            let msg = format!("function '{}' not found", name);
                            return Err(self.error(VmErrorKind::UndefinedFunction, &msg));
                        }
                    }
                }
                Op::CallIndirect => {
                    let count = self.pop()?.as_number() as usize;
                    let callee = self.pop()?;
                    match callee {
                        Value::Function(f) => self.enter_function(f.entry, count)?,
                        other => {
                            let msg = format!("cannot call non-function {}", other.type_name());
                            return Err(self.error(VmErrorKind::NotCallable, &msg));
                        }
                    }
                }
                Op::Return => {
                    let frame = match self.frames.pop() {
                        Some(f) => f,
                        None => return Ok(()),
                    };
                    let ret = if self.sp > frame.base {
                        self.pop()?
                    } else {
                        Value::Nil
                    };
                    if self.frames.is_empty() {
                        self.sp = 0;
                        return Ok(());
                    }
                    // The argument block of the popped frame becomes the
                    // caller's expression result.
                    self.sp = frame.base;
                    self.push(ret);
                }
                Op::Jump => {
                    let target = self.arg_index(ins)?;
                    if let Some(f) = self.frames.last_mut() {
                        f.ip = target;
                    }
                }
                Op::JumpIfFalse => {
                    let cond = self.pop()?;
                    if !cond.is_truthy() {
                        let target = self.arg_index(ins)?;
                        if let Some(f) = self.frames.last_mut() {
                            f.ip = target;
                        }
                    }
                }
                Op::Nop => {}
                Op::Halt => return Ok(()),
            }
        }
    }

    fn reset(&mut self) {
        self.sp = 0;
        self.frames.clear();
        self.globals.clear();
        self.stack.fill(Value::Nil);
        self.current_line = 0;
    }

    /// Pushes a frame whose base makes the topmost `count` stack values the
    /// callee's locals 0..count.
    fn enter_function(&mut self, entry: usize, count: usize) -> VmResult<()> {
        let base = self
            .sp
            .checked_sub(count)
            .ok_or_else(|| self.error(VmErrorKind::StackUnderflow, "stack underflow"))?;
        self.frames.push(Frame {
            ip: entry,
            base,
            arg_count: count,
        });
        Ok(())
    }

    fn call_builtin<IO: RuntimeIo>(
        &mut self,
        builtin: &builtins::Builtin,
        count: usize,
        io: &mut IO,
    ) -> VmResult<()> {
        if count < builtin.min_arity || count > builtin.max_arity {
            let msg = format!(
                "{}() called with {} arguments",
                builtin.name, count
            );
            return Err(self.error(VmErrorKind::Builtin, &msg));
        }
        let start = self
            .sp
            .checked_sub(count)
            .ok_or_else(|| self.error(VmErrorKind::StackUnderflow, "stack underflow"))?;
        let args: Vec<Value> = self.stack[start..self.sp]
            .iter_mut()
            .map(|slot| std::mem::replace(slot, Value::Nil))
            .collect();
        self.sp = start;
        match (builtin.func)(&args, io) {
            Ok(v) => {
                self.push(v);
                Ok(())
            }
            Err(msg) => Err(self.error(VmErrorKind::Builtin, &msg)),
        }
    }

    fn compare(&mut self, cmp: fn(f64, f64) -> bool) -> VmResult<()> {
        let b = self.pop()?.as_number();
        let a = self.pop()?.as_number();
        self.push(Value::Number(if cmp(a, b) { 1.0 } else { 0.0 }));
        Ok(())
    }

    fn push(&mut self, v: Value) {
        if self.sp == self.stack.len() {
            let grown = self.stack.len() + (self.stack.len() >> 1);
            self.stack.resize(grown, Value::Nil);
        }
        self.stack[self.sp] = v;
        self.sp += 1;
    }

    fn pop(&mut self) -> VmResult<Value> {
        if self.sp == 0 {
            return Err(self.error(VmErrorKind::StackUnderflow, "stack underflow"));
        }
        self.sp -= 1;
        Ok(std::mem::replace(&mut self.stack[self.sp], Value::Nil))
    }

    fn get_local(&self, base: usize, idx: usize) -> Value {
        self.stack.get(base + idx).cloned().unwrap_or(Value::Nil)
    }

    /// Writes a local slot. Slots at or above `sp` are pulled into the
    /// protected region so later pushes cannot clobber them.
    fn set_local(&mut self, base: usize, idx: usize, v: Value) {
        let slot = base + idx;
        if slot >= self.stack.len() {
            let grown = (slot + 1).max(self.stack.len() + (self.stack.len() >> 1));
            self.stack.resize(grown, Value::Nil);
        }
        self.stack[slot] = v;
        if self.sp <= slot {
            self.sp = slot + 1;
        }
    }

    fn constant<'m>(&self, module: &'m Module, ins: &Instruction) -> VmResult<&'m Constant> {
        let idx = self.arg_index(ins)?;
        module
            .constants
            .get(idx)
            .ok_or_else(|| self.error(VmErrorKind::BadConstant, "constant index out of range"))
    }

    fn arg_index(&self, ins: &Instruction) -> VmResult<usize> {
        match &ins.arg {
            Some(Arg::Const(i)) => Ok(*i as usize),
            Some(Arg::Int(i)) if *i >= 0 => Ok(*i as usize),
            other => {
                let msg = format!("{} has invalid argument {:?}", ins.op, other);
                Err(self.error(VmErrorKind::BadConstant, &msg))
            }
        }
    }

    fn arg_str<'i>(&self, ins: &'i Instruction) -> VmResult<&'i str> {
        match &ins.arg {
            Some(Arg::Str(s)) => Ok(s),
            other => {
                let msg = format!("{} has invalid argument {:?}", ins.op, other);
                Err(self.error(VmErrorKind::BadConstant, &msg))
            }
        }
    }

    fn error(&self, kind: VmErrorKind, message: &str) -> VmError {
        VmError {
            kind,
            message: message.to_string(),
            line: self.current_line,
        }
    }
}
