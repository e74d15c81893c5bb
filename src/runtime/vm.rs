use std::collections::HashMap;
use std::io::{BufRead, Write};

use crate::bytecode::ir::Program;
use crate::bytecode::op::{Op, Operand};
use crate::lang::scope::{ScopeId, ScopeTree};
use crate::lang::symbol::{Symbol, SymbolKind};
use crate::lang::value::{Value, ZERO_EPSILON};
use crate::runtime::runtime_error::RuntimeError;

/// Execution safety bounds.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Hard ceiling on executed instructions; guarantees termination on
    /// runaway control flow.
    pub max_steps: usize,
    pub max_call_depth: usize,
    pub max_stack_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_steps: 1_000_000,
            max_call_depth: 1_000,
            max_stack_size: 10_000,
        }
    }
}

/// One active function call.
#[derive(Debug)]
struct Frame {
    return_ip: usize,
    caller_scope: ScopeId,
}

/// A promoted operand pair for binary operators, popped right-then-left.
enum NumPair {
    Ints(i64, i64),
    Reals(f64, f64),
}

/// The IR virtual machine: a fetch-decode-execute loop over a finished
/// program, with an operand stack, a frame stack for calls, and its own
/// scope tree for variable storage.
///
/// Input and output are caller-supplied handles; `print` writes one value
/// per line, `read*` consume one whitespace-delimited token each.
pub struct Vm<R, W> {
    scopes: ScopeTree,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    labels: HashMap<String, usize>,
    functions: HashMap<String, (usize, usize)>,
    config: VmConfig,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Vm<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Vm::with_config(input, output, VmConfig::default())
    }

    pub fn with_config(input: R, output: W, config: VmConfig) -> Self {
        Vm {
            scopes: ScopeTree::new(),
            stack: Vec::new(),
            frames: Vec::new(),
            labels: HashMap::new(),
            functions: HashMap::new(),
            config,
            input,
            output,
        }
    }

    /// Execute a program from instruction 0 until an `exit`, the end of the
    /// program, or a fatal error. Each call starts from fresh state.
    pub fn run(&mut self, program: &Program) -> Result<(), RuntimeError> {
        self.scopes = ScopeTree::new();
        self.stack.clear();
        self.frames.clear();
        self.build_index(program)?;

        let mut ip = 0;
        let mut steps: usize = 0;
        while ip < program.len() {
            steps += 1;
            if steps > self.config.max_steps {
                return Err(RuntimeError::StepLimitExceeded {
                    limit: self.config.max_steps,
                });
            }
            if self.stack.len() > self.config.max_stack_size {
                return Err(RuntimeError::StackOverflow {
                    ip,
                    limit: self.config.max_stack_size,
                });
            }
            match self.step(program, ip)? {
                Some(next) => ip = next,
                None => return Ok(()),
            }
        }
        Ok(())
    }

    /// One pass over the program recording every label index and every
    /// function's (start, end) pair.
    fn build_index(&mut self, program: &Program) -> Result<(), RuntimeError> {
        self.labels.clear();
        self.functions.clear();

        let mut open: Option<(String, usize)> = None;
        for (i, op) in program.iter().enumerate() {
            match op {
                Op::Label(name) => {
                    if self.labels.insert(name.clone(), i).is_some() {
                        return Err(RuntimeError::DuplicateLabel {
                            name: name.clone(),
                            ip: i,
                        });
                    }
                }
                Op::StartFunc(name) => {
                    if let Some((_, start)) = &open {
                        return Err(RuntimeError::UnterminatedFunction { ip: *start });
                    }
                    if self.functions.contains_key(name) {
                        return Err(RuntimeError::DuplicateFunction {
                            name: name.clone(),
                            ip: i,
                        });
                    }
                    open = Some((name.clone(), i));
                }
                Op::EndFunc => {
                    if let Some((name, start)) = open.take() {
                        self.functions.insert(name, (start, i));
                    }
                }
                _ => {}
            }
        }
        if let Some((_, start)) = open {
            return Err(RuntimeError::UnterminatedFunction { ip: start });
        }
        Ok(())
    }

    /// Execute the instruction at `ip` and return the next instruction
    /// pointer, or `None` to halt. Every instruction kind has its own arm;
    /// there is deliberately no catch-all.
    fn step(&mut self, program: &Program, ip: usize) -> Result<Option<usize>, RuntimeError> {
        match program.at(ip) {
            // Function framing. A function body reached by sequential flow
            // is skipped; only `Call` enters it.
            Op::StartFunc(name) => {
                let (_, end) = self.function_bounds(name, ip)?;
                Ok(Some(end + 1))
            }
            Op::ArgInt(name) => {
                let value = self.pop(ip)?;
                let n = match value {
                    Value::Int(n) => n,
                    Value::Real(x) => x as i64,
                    other => {
                        return Err(RuntimeError::TypeMismatch {
                            expected: "a scalar argument",
                            found: other.type_name(),
                            ip,
                        });
                    }
                };
                self.define_arg(name, SymbolKind::Int, Value::Int(n), ip)?;
                Ok(Some(ip + 1))
            }
            Op::ArgReal(name) => {
                let value = self.pop(ip)?;
                let x = match value {
                    Value::Int(n) => n as f64,
                    Value::Real(x) => x,
                    other => {
                        return Err(RuntimeError::TypeMismatch {
                            expected: "a scalar argument",
                            found: other.type_name(),
                            ip,
                        });
                    }
                };
                self.define_arg(name, SymbolKind::Real, Value::Real(x), ip)?;
                Ok(Some(ip + 1))
            }
            Op::ArgIntArray(name) => {
                let value = self.pop(ip)?;
                let Value::IntArray(items) = value else {
                    return Err(RuntimeError::TypeMismatch {
                        expected: "an int array argument",
                        found: value.type_name(),
                        ip,
                    });
                };
                self.define_arg(
                    name,
                    SymbolKind::IntArray { size: None },
                    Value::IntArray(items),
                    ip,
                )?;
                Ok(Some(ip + 1))
            }
            Op::ArgRealArray(name) => {
                let value = self.pop(ip)?;
                let Value::RealArray(items) = value else {
                    return Err(RuntimeError::TypeMismatch {
                        expected: "a real array argument",
                        found: value.type_name(),
                        ip,
                    });
                };
                self.define_arg(
                    name,
                    SymbolKind::RealArray { size: None },
                    Value::RealArray(items),
                    ip,
                )?;
                Ok(Some(ip + 1))
            }
            Op::Return => Ok(Some(self.return_from_call(ip)?)),
            // Falling off the end of a body is the implicit return of a
            // void function.
            Op::EndFunc => Ok(Some(self.return_from_call(ip)?)),
            Op::Call(name) => {
                let (start, _) = self.function_bounds(name, ip)?;
                if self.frames.len() >= self.config.max_call_depth {
                    return Err(RuntimeError::CallDepthExceeded {
                        limit: self.config.max_call_depth,
                    });
                }

                // The callee's leading argument instructions pop one value
                // each. Arguments were pushed left to right, so the top of
                // the stack is reversed to make the bindings line up.
                let mut arity = 0;
                let mut j = start + 1;
                while j < program.len() {
                    match program.at(j) {
                        Op::ArgInt(_)
                        | Op::ArgIntArray(_)
                        | Op::ArgReal(_)
                        | Op::ArgRealArray(_) => {
                            arity += 1;
                            j += 1;
                        }
                        _ => break,
                    }
                }
                if self.stack.len() < arity {
                    return Err(RuntimeError::StackUnderflow { ip });
                }
                let split = self.stack.len() - arity;
                self.stack[split..].reverse();

                self.frames.push(Frame {
                    return_ip: ip + 1,
                    caller_scope: self.scopes.current(),
                });
                let root = self.scopes.root();
                self.scopes.set_current(root);
                self.scopes.push();
                Ok(Some(start + 1))
            }

            // Labels are pure jump targets.
            Op::Label(_) => Ok(Some(ip + 1)),
            Op::EnterScope => {
                self.scopes.push();
                Ok(Some(ip + 1))
            }
            Op::ExitScope => {
                self.scopes
                    .pop()
                    .map_err(|_| RuntimeError::ScopeUnderflow { ip })?;
                Ok(Some(ip + 1))
            }

            // Declarations.
            Op::VarInt(name) => {
                self.define_var(name, SymbolKind::Int, None, ip)?;
                Ok(Some(ip + 1))
            }
            Op::VarReal(name) => {
                self.define_var(name, SymbolKind::Real, None, ip)?;
                Ok(Some(ip + 1))
            }
            Op::VarIntArray { name, size } => {
                let len = self.operand_int(size, ip)?;
                if len < 1 {
                    return Err(RuntimeError::InvalidArrayLength {
                        name: name.clone(),
                        len,
                        ip,
                    });
                }
                self.define_var(
                    name,
                    SymbolKind::IntArray { size: Some(len) },
                    Some(Value::IntArray(vec![0; len as usize])),
                    ip,
                )?;
                Ok(Some(ip + 1))
            }
            Op::VarRealArray { name, size } => {
                let len = self.operand_int(size, ip)?;
                if len < 1 {
                    return Err(RuntimeError::InvalidArrayLength {
                        name: name.clone(),
                        len,
                        ip,
                    });
                }
                self.define_var(
                    name,
                    SymbolKind::RealArray { size: Some(len) },
                    Some(Value::RealArray(vec![0.0; len as usize])),
                    ip,
                )?;
                Ok(Some(ip + 1))
            }

            // Pushes. The value's own tag decides numeric behavior
            // downstream, so both scalar push kinds share one path.
            Op::PushInt(operand) => {
                self.push_operand(operand, ip)?;
                Ok(Some(ip + 1))
            }
            Op::PushReal(operand) => {
                self.push_operand(operand, ip)?;
                Ok(Some(ip + 1))
            }
            Op::PushIntArray { name, index } => {
                self.push_element(name, index, ip)?;
                Ok(Some(ip + 1))
            }
            Op::PushRealArray { name, index } => {
                self.push_element(name, index, ip)?;
                Ok(Some(ip + 1))
            }

            // Stores coerce to the target's declared kind.
            Op::Pop => {
                self.pop(ip)?;
                Ok(Some(ip + 1))
            }
            Op::PopInt(name) => {
                let value = self.pop(ip)?;
                self.store_scalar(name, value, ip)?;
                Ok(Some(ip + 1))
            }
            Op::PopReal(name) => {
                let value = self.pop(ip)?;
                self.store_scalar(name, value, ip)?;
                Ok(Some(ip + 1))
            }
            Op::PopIntArray { name, index } => {
                let value = self.pop(ip)?;
                self.store_element(name, index, value, ip)?;
                Ok(Some(ip + 1))
            }
            Op::PopRealArray { name, index } => {
                let value = self.pop(ip)?;
                self.store_element(name, index, value, ip)?;
                Ok(Some(ip + 1))
            }

            // Arithmetic: left-op-right, promoting to real when either side
            // is real.
            Op::Add => {
                let result = match self.pop_numeric_pair(ip)? {
                    NumPair::Ints(a, b) => Value::Int(a + b),
                    NumPair::Reals(a, b) => Value::Real(a + b),
                };
                self.stack.push(result);
                Ok(Some(ip + 1))
            }
            Op::Sub => {
                let result = match self.pop_numeric_pair(ip)? {
                    NumPair::Ints(a, b) => Value::Int(a - b),
                    NumPair::Reals(a, b) => Value::Real(a - b),
                };
                self.stack.push(result);
                Ok(Some(ip + 1))
            }
            Op::Mul => {
                let result = match self.pop_numeric_pair(ip)? {
                    NumPair::Ints(a, b) => Value::Int(a * b),
                    NumPair::Reals(a, b) => Value::Real(a * b),
                };
                self.stack.push(result);
                Ok(Some(ip + 1))
            }
            Op::Div => {
                let result = match self.pop_numeric_pair(ip)? {
                    NumPair::Ints(a, b) => {
                        if b == 0 {
                            return Err(RuntimeError::DivideByZero { ip });
                        }
                        Value::Int(a / b)
                    }
                    NumPair::Reals(a, b) => {
                        if b.abs() < ZERO_EPSILON {
                            return Err(RuntimeError::DivideByZero { ip });
                        }
                        Value::Real(a / b)
                    }
                };
                self.stack.push(result);
                Ok(Some(ip + 1))
            }
            Op::Mod => {
                let result = match self.pop_numeric_pair(ip)? {
                    NumPair::Ints(a, b) => {
                        if b == 0 {
                            return Err(RuntimeError::ModuloByZero { ip });
                        }
                        Value::Int(a % b)
                    }
                    NumPair::Reals(a, b) => {
                        if b.abs() < ZERO_EPSILON {
                            return Err(RuntimeError::ModuloByZero { ip });
                        }
                        Value::Real(a % b)
                    }
                };
                self.stack.push(result);
                Ok(Some(ip + 1))
            }

            // Comparisons produce the integers 1 and 0.
            Op::CmpEq => {
                let truth = match self.pop_numeric_pair(ip)? {
                    NumPair::Ints(a, b) => a == b,
                    NumPair::Reals(a, b) => a == b,
                };
                self.stack.push(Value::Int(truth as i64));
                Ok(Some(ip + 1))
            }
            Op::CmpNe => {
                let truth = match self.pop_numeric_pair(ip)? {
                    NumPair::Ints(a, b) => a != b,
                    NumPair::Reals(a, b) => a != b,
                };
                self.stack.push(Value::Int(truth as i64));
                Ok(Some(ip + 1))
            }
            Op::CmpGt => {
                let truth = match self.pop_numeric_pair(ip)? {
                    NumPair::Ints(a, b) => a > b,
                    NumPair::Reals(a, b) => a > b,
                };
                self.stack.push(Value::Int(truth as i64));
                Ok(Some(ip + 1))
            }
            Op::CmpLt => {
                let truth = match self.pop_numeric_pair(ip)? {
                    NumPair::Ints(a, b) => a < b,
                    NumPair::Reals(a, b) => a < b,
                };
                self.stack.push(Value::Int(truth as i64));
                Ok(Some(ip + 1))
            }
            Op::CmpGe => {
                let truth = match self.pop_numeric_pair(ip)? {
                    NumPair::Ints(a, b) => a >= b,
                    NumPair::Reals(a, b) => a >= b,
                };
                self.stack.push(Value::Int(truth as i64));
                Ok(Some(ip + 1))
            }
            Op::CmpLe => {
                let truth = match self.pop_numeric_pair(ip)? {
                    NumPair::Ints(a, b) => a <= b,
                    NumPair::Reals(a, b) => a <= b,
                };
                self.stack.push(Value::Int(truth as i64));
                Ok(Some(ip + 1))
            }

            // Boolean operators treat nonzero as true.
            Op::And => {
                let b = self.pop_truthy(ip)?;
                let a = self.pop_truthy(ip)?;
                self.stack.push(Value::Int((a && b) as i64));
                Ok(Some(ip + 1))
            }
            Op::Or => {
                let b = self.pop_truthy(ip)?;
                let a = self.pop_truthy(ip)?;
                self.stack.push(Value::Int((a || b) as i64));
                Ok(Some(ip + 1))
            }
            Op::Not => {
                let a = self.pop_truthy(ip)?;
                self.stack.push(Value::Int(!a as i64));
                Ok(Some(ip + 1))
            }
            Op::Neg => {
                let value = self.pop(ip)?;
                let result = match value {
                    Value::Int(n) => Value::Int(-n),
                    Value::Real(x) => Value::Real(-x),
                    other => {
                        return Err(RuntimeError::TypeMismatch {
                            expected: "number",
                            found: other.type_name(),
                            ip,
                        });
                    }
                };
                self.stack.push(result);
                Ok(Some(ip + 1))
            }

            // Control flow.
            Op::Jump(label) => Ok(Some(self.label_target(label, ip)?)),
            Op::JumpZero(label) => {
                let value = self.pop(ip)?;
                if !value.is_scalar() {
                    return Err(RuntimeError::TypeMismatch {
                        expected: "number",
                        found: value.type_name(),
                        ip,
                    });
                }
                if value.is_zero() {
                    Ok(Some(self.label_target(label, ip)?))
                } else {
                    Ok(Some(ip + 1))
                }
            }
            Op::JumpNotZero(label) => {
                let value = self.pop(ip)?;
                if !value.is_scalar() {
                    return Err(RuntimeError::TypeMismatch {
                        expected: "number",
                        found: value.type_name(),
                        ip,
                    });
                }
                if value.is_zero() {
                    Ok(Some(ip + 1))
                } else {
                    Ok(Some(self.label_target(label, ip)?))
                }
            }

            // I/O.
            Op::Print => {
                let value = self.pop(ip)?;
                writeln!(self.output, "{}", value).map_err(|e| RuntimeError::WriteFailed {
                    message: e.to_string(),
                    ip,
                })?;
                Ok(Some(ip + 1))
            }
            Op::ReadInt(name) => {
                self.read_scalar(name, ip)?;
                Ok(Some(ip + 1))
            }
            Op::ReadReal(name) => {
                self.read_scalar(name, ip)?;
                Ok(Some(ip + 1))
            }
            Op::ReadIntArray { name, index } => {
                self.read_element(name, index, ip)?;
                Ok(Some(ip + 1))
            }
            Op::ReadRealArray { name, index } => {
                self.read_element(name, index, ip)?;
                Ok(Some(ip + 1))
            }

            Op::Exit => Ok(None),
        }
    }

    // =========================================================================
    // Stack and name plumbing
    // =========================================================================

    fn pop(&mut self, ip: usize) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or(RuntimeError::StackUnderflow { ip })
    }

    /// Pop the right operand, then the left, promoting to reals when either
    /// side is real.
    fn pop_numeric_pair(&mut self, ip: usize) -> Result<NumPair, RuntimeError> {
        let right = self.pop(ip)?;
        let left = self.pop(ip)?;
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(NumPair::Ints(a, b)),
            (Value::Int(a), Value::Real(b)) => Ok(NumPair::Reals(a as f64, b)),
            (Value::Real(a), Value::Int(b)) => Ok(NumPair::Reals(a, b as f64)),
            (Value::Real(a), Value::Real(b)) => Ok(NumPair::Reals(a, b)),
            (a, b) => Err(RuntimeError::TypeMismatch {
                expected: "number",
                found: if a.is_scalar() {
                    b.type_name()
                } else {
                    a.type_name()
                },
                ip,
            }),
        }
    }

    fn pop_truthy(&mut self, ip: usize) -> Result<bool, RuntimeError> {
        let value = self.pop(ip)?;
        if !value.is_scalar() {
            return Err(RuntimeError::TypeMismatch {
                expected: "number",
                found: value.type_name(),
                ip,
            });
        }
        Ok(!value.is_zero())
    }

    fn lookup(&self, name: &str, ip: usize) -> Result<&Symbol, RuntimeError> {
        self.scopes.resolve(name).map_err(|_| RuntimeError::Unresolved {
            name: name.to_string(),
            ip,
        })
    }

    fn lookup_mut(&mut self, name: &str, ip: usize) -> Result<&mut Symbol, RuntimeError> {
        self.scopes
            .resolve_mut(name)
            .map_err(|_| RuntimeError::Unresolved {
                name: name.to_string(),
                ip,
            })
    }

    fn function_bounds(&self, name: &str, ip: usize) -> Result<(usize, usize), RuntimeError> {
        self.functions
            .get(name)
            .copied()
            .ok_or_else(|| RuntimeError::UnknownFunction {
                name: name.to_string(),
                ip,
            })
    }

    fn label_target(&self, name: &str, ip: usize) -> Result<usize, RuntimeError> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| RuntimeError::UnknownLabel {
                name: name.to_string(),
                ip,
            })
    }

    fn return_from_call(&mut self, ip: usize) -> Result<usize, RuntimeError> {
        let frame = self
            .frames
            .pop()
            .ok_or(RuntimeError::ReturnOutsideCall { ip })?;
        self.scopes.set_current(frame.caller_scope);
        Ok(frame.return_ip)
    }

    fn define_var(
        &mut self,
        name: &str,
        kind: SymbolKind,
        value: Option<Value>,
        ip: usize,
    ) -> Result<(), RuntimeError> {
        let mut symbol = Symbol::new(name, kind);
        symbol.value = value;
        self.scopes
            .define(symbol)
            .map_err(|_| RuntimeError::Redefined {
                name: name.to_string(),
                ip,
            })
    }

    fn define_arg(
        &mut self,
        name: &str,
        kind: SymbolKind,
        value: Value,
        ip: usize,
    ) -> Result<(), RuntimeError> {
        let mut symbol = Symbol::with_value(name, kind, value);
        symbol.assigned = true;
        self.scopes
            .define(symbol)
            .map_err(|_| RuntimeError::Redefined {
                name: name.to_string(),
                ip,
            })
    }

    /// Resolve an operand to an integer: a literal, or an assigned int
    /// scalar variable.
    fn operand_int(&self, operand: &Operand, ip: usize) -> Result<i64, RuntimeError> {
        match operand {
            Operand::Int(n) => Ok(*n),
            Operand::Real(_) => Err(RuntimeError::TypeMismatch {
                expected: "an integer operand",
                found: "real",
                ip,
            }),
            Operand::Var(name) => {
                let symbol = self.lookup(name, ip)?;
                if !symbol.assigned {
                    return Err(RuntimeError::Unassigned {
                        name: name.clone(),
                        ip,
                    });
                }
                match &symbol.value {
                    Some(Value::Int(n)) => Ok(*n),
                    Some(other) => Err(RuntimeError::TypeMismatch {
                        expected: "int",
                        found: other.type_name(),
                        ip,
                    }),
                    None => Err(RuntimeError::Unassigned {
                        name: name.clone(),
                        ip,
                    }),
                }
            }
        }
    }

    fn push_operand(&mut self, operand: &Operand, ip: usize) -> Result<(), RuntimeError> {
        let value = match operand {
            Operand::Int(n) => Value::Int(*n),
            Operand::Real(x) => Value::Real(*x),
            Operand::Var(name) => {
                let symbol = self.lookup(name, ip)?;
                if symbol.kind.is_function() {
                    return Err(RuntimeError::TypeMismatch {
                        expected: "variable",
                        found: "function",
                        ip,
                    });
                }
                if !symbol.assigned {
                    return Err(RuntimeError::Unassigned {
                        name: name.clone(),
                        ip,
                    });
                }
                match &symbol.value {
                    Some(value) => value.clone(),
                    None => {
                        return Err(RuntimeError::Unassigned {
                            name: name.clone(),
                            ip,
                        });
                    }
                }
            }
        };
        self.stack.push(value);
        Ok(())
    }

    fn push_element(&mut self, name: &str, index: &Operand, ip: usize) -> Result<(), RuntimeError> {
        let idx = self.operand_int(index, ip)?;
        let symbol = self.lookup(name, ip)?;
        if !symbol.assigned {
            return Err(RuntimeError::Unassigned {
                name: name.to_string(),
                ip,
            });
        }
        let value = match &symbol.value {
            Some(Value::IntArray(items)) => {
                if idx < 0 || idx as usize >= items.len() {
                    return Err(RuntimeError::IndexOutOfBounds {
                        name: name.to_string(),
                        index: idx,
                        len: items.len(),
                        ip,
                    });
                }
                Value::Int(items[idx as usize])
            }
            Some(Value::RealArray(items)) => {
                if idx < 0 || idx as usize >= items.len() {
                    return Err(RuntimeError::IndexOutOfBounds {
                        name: name.to_string(),
                        index: idx,
                        len: items.len(),
                        ip,
                    });
                }
                Value::Real(items[idx as usize])
            }
            _ => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "array",
                    found: symbol.kind.describe(),
                    ip,
                });
            }
        };
        self.stack.push(value);
        Ok(())
    }

    /// Store a popped value into a scalar variable, coercing to the
    /// variable's declared kind.
    fn store_scalar(&mut self, name: &str, value: Value, ip: usize) -> Result<(), RuntimeError> {
        let symbol = self.lookup_mut(name, ip)?;
        match (&symbol.kind, value) {
            (SymbolKind::Int, Value::Int(n)) => {
                symbol.value = Some(Value::Int(n));
            }
            (SymbolKind::Int, Value::Real(x)) => {
                symbol.value = Some(Value::Int(x as i64));
            }
            (SymbolKind::Real, Value::Int(n)) => {
                symbol.value = Some(Value::Real(n as f64));
            }
            (SymbolKind::Real, Value::Real(x)) => {
                symbol.value = Some(Value::Real(x));
            }
            (SymbolKind::Int | SymbolKind::Real, other) => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "a scalar value",
                    found: other.type_name(),
                    ip,
                });
            }
            (_, _) => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "a scalar variable",
                    found: symbol.kind.describe(),
                    ip,
                });
            }
        }
        symbol.assigned = true;
        Ok(())
    }

    /// Store a popped value into an array element, coercing to the element
    /// kind and checking the offset against the actual length.
    fn store_element(
        &mut self,
        name: &str,
        index: &Operand,
        value: Value,
        ip: usize,
    ) -> Result<(), RuntimeError> {
        let idx = self.operand_int(index, ip)?;
        let symbol = self.lookup_mut(name, ip)?;
        match &mut symbol.value {
            Some(Value::IntArray(items)) => {
                let n = match value {
                    Value::Int(n) => n,
                    Value::Real(x) => x as i64,
                    other => {
                        return Err(RuntimeError::TypeMismatch {
                            expected: "a scalar value",
                            found: other.type_name(),
                            ip,
                        });
                    }
                };
                if idx < 0 || idx as usize >= items.len() {
                    return Err(RuntimeError::IndexOutOfBounds {
                        name: name.to_string(),
                        index: idx,
                        len: items.len(),
                        ip,
                    });
                }
                items[idx as usize] = n;
            }
            Some(Value::RealArray(items)) => {
                let x = match value {
                    Value::Int(n) => n as f64,
                    Value::Real(x) => x,
                    other => {
                        return Err(RuntimeError::TypeMismatch {
                            expected: "a scalar value",
                            found: other.type_name(),
                            ip,
                        });
                    }
                };
                if idx < 0 || idx as usize >= items.len() {
                    return Err(RuntimeError::IndexOutOfBounds {
                        name: name.to_string(),
                        index: idx,
                        len: items.len(),
                        ip,
                    });
                }
                items[idx as usize] = x;
            }
            _ => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "an array variable",
                    found: symbol.kind.describe(),
                    ip,
                });
            }
        }
        symbol.assigned = true;
        Ok(())
    }

    // =========================================================================
    // Console I/O
    // =========================================================================

    /// Read one whitespace-delimited token from the input stream.
    fn read_word(&mut self, ip: usize) -> Result<String, RuntimeError> {
        let mut word = String::new();
        loop {
            let buffer = self
                .input
                .fill_buf()
                .map_err(|e| RuntimeError::ReadFailed {
                    message: e.to_string(),
                    ip,
                })?;
            if buffer.is_empty() {
                break;
            }
            let mut used = 0;
            let mut done = false;
            for &byte in buffer {
                if byte.is_ascii_whitespace() {
                    used += 1;
                    if !word.is_empty() {
                        done = true;
                        break;
                    }
                } else {
                    word.push(byte as char);
                    used += 1;
                }
            }
            self.input.consume(used);
            if done {
                break;
            }
        }
        if word.is_empty() {
            return Err(RuntimeError::ReadFailed {
                message: "unexpected end of input".to_string(),
                ip,
            });
        }
        Ok(word)
    }

    /// Read one value into a scalar variable, typed by its declared kind.
    fn read_scalar(&mut self, name: &str, ip: usize) -> Result<(), RuntimeError> {
        let kind = self.lookup(name, ip)?.kind.clone();
        let word = self.read_word(ip)?;
        let value = match kind {
            SymbolKind::Int => Value::Int(word.parse::<i64>().map_err(|_| {
                RuntimeError::ReadFailed {
                    message: format!("invalid int \"{}\"", word),
                    ip,
                }
            })?),
            SymbolKind::Real => Value::Real(word.parse::<f64>().map_err(|_| {
                RuntimeError::ReadFailed {
                    message: format!("invalid real \"{}\"", word),
                    ip,
                }
            })?),
            other => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "a scalar variable",
                    found: other.describe(),
                    ip,
                });
            }
        };
        self.store_scalar(name, value, ip)
    }

    /// Read one value into an array element, typed by the element kind.
    fn read_element(&mut self, name: &str, index: &Operand, ip: usize) -> Result<(), RuntimeError> {
        let kind = self.lookup(name, ip)?.kind.clone();
        let word = self.read_word(ip)?;
        let value = match kind {
            SymbolKind::IntArray { .. } => Value::Int(word.parse::<i64>().map_err(|_| {
                RuntimeError::ReadFailed {
                    message: format!("invalid int \"{}\"", word),
                    ip,
                }
            })?),
            SymbolKind::RealArray { .. } => Value::Real(word.parse::<f64>().map_err(|_| {
                RuntimeError::ReadFailed {
                    message: format!("invalid real \"{}\"", word),
                    ip,
                }
            })?),
            other => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "an array variable",
                    found: other.describe(),
                    ip,
                });
            }
        };
        self.store_element(name, index, value, ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // ============================================================
    // Test helpers
    // ============================================================

    fn exec(ops: Vec<Op>, input: &str, config: VmConfig) -> Result<String, RuntimeError> {
        let program: Program = ops.into_iter().collect();
        let mut out = Vec::new();
        {
            let mut vm = Vm::with_config(Cursor::new(input.as_bytes().to_vec()), &mut out, config);
            vm.run(&program)?;
        }
        Ok(String::from_utf8(out).expect("output should be utf-8"))
    }

    fn run_ops(ops: Vec<Op>) -> Result<String, RuntimeError> {
        exec(ops, "", VmConfig::default())
    }

    fn run_ops_with_input(ops: Vec<Op>, input: &str) -> Result<String, RuntimeError> {
        exec(ops, input, VmConfig::default())
    }

    fn assert_output(ops: Vec<Op>, expected: &str) {
        let output = run_ops(ops).expect("execution should succeed");
        assert_eq!(output, expected);
    }

    fn var(name: &str) -> Operand {
        Operand::Var(name.to_string())
    }

    // ============================================================
    // Straight-line execution
    // ============================================================

    #[test]
    fn test_declare_assign_print() {
        assert_output(
            vec![
                Op::VarInt("a".to_string()),
                Op::PushInt(Operand::Int(5)),
                Op::PopInt("a".to_string()),
                Op::PushInt(var("a")),
                Op::Print,
                Op::Exit,
            ],
            "5\n",
        );
    }

    #[test]
    fn test_exit_halts_before_later_instructions() {
        assert_output(
            vec![Op::Exit, Op::PushInt(Operand::Int(1)), Op::Print],
            "",
        );
    }

    #[test]
    fn test_running_off_the_end_halts() {
        assert_output(vec![Op::PushInt(Operand::Int(1))], "");
    }

    #[test]
    fn test_int_store_coerces_real() {
        assert_output(
            vec![
                Op::VarInt("a".to_string()),
                Op::PushReal(Operand::Real(2.9)),
                Op::PopInt("a".to_string()),
                Op::PushInt(var("a")),
                Op::Print,
            ],
            "2\n",
        );
    }

    #[test]
    fn test_real_store_promotes_int() {
        assert_output(
            vec![
                Op::VarReal("x".to_string()),
                Op::PushInt(Operand::Int(3)),
                Op::PopReal("x".to_string()),
                Op::PushReal(var("x")),
                Op::Print,
            ],
            "3\n",
        );
    }

    // ============================================================
    // Arithmetic
    // ============================================================

    fn binary(a: Operand, b: Operand, op: Op) -> Vec<Op> {
        vec![Op::PushInt(a), Op::PushInt(b), op, Op::Print]
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_output(binary(Operand::Int(2), Operand::Int(3), Op::Add), "5\n");
        assert_output(binary(Operand::Int(10), Operand::Int(4), Op::Sub), "6\n");
        assert_output(binary(Operand::Int(6), Operand::Int(7), Op::Mul), "42\n");
        assert_output(binary(Operand::Int(7), Operand::Int(2), Op::Div), "3\n");
        assert_output(binary(Operand::Int(7), Operand::Int(3), Op::Mod), "1\n");
    }

    #[test]
    fn test_mixed_operands_promote_to_real() {
        assert_output(
            vec![
                Op::PushInt(Operand::Int(1)),
                Op::PushReal(Operand::Real(0.5)),
                Op::Add,
                Op::Print,
            ],
            "1.5\n",
        );
    }

    #[test]
    fn test_subtraction_is_left_minus_right() {
        // Push order is source order; the right operand is popped first.
        assert_output(binary(Operand::Int(1), Operand::Int(10), Op::Sub), "-9\n");
    }

    #[test]
    fn test_integer_divide_by_zero() {
        let err = run_ops(binary(Operand::Int(1), Operand::Int(0), Op::Div)).unwrap_err();
        assert!(matches!(err, RuntimeError::DivideByZero { ip: 2 }));
    }

    #[test]
    fn test_real_divide_by_near_zero() {
        let err = run_ops(vec![
            Op::PushReal(Operand::Real(1.0)),
            Op::PushReal(Operand::Real(1e-12)),
            Op::Div,
        ])
        .unwrap_err();
        assert!(matches!(err, RuntimeError::DivideByZero { .. }));
    }

    #[test]
    fn test_modulo_by_zero() {
        let err = run_ops(binary(Operand::Int(5), Operand::Int(0), Op::Mod)).unwrap_err();
        assert!(matches!(err, RuntimeError::ModuloByZero { .. }));
    }

    #[test]
    fn test_stack_underflow_reports_instruction() {
        let err = run_ops(vec![Op::PushInt(Operand::Int(1)), Op::Add]).unwrap_err();
        assert!(matches!(err, RuntimeError::StackUnderflow { ip: 1 }));
    }

    // ============================================================
    // Comparisons and boolean operators
    // ============================================================

    #[test]
    fn test_comparisons_follow_source_order() {
        assert_output(binary(Operand::Int(1), Operand::Int(2), Op::CmpLt), "1\n");
        assert_output(binary(Operand::Int(1), Operand::Int(2), Op::CmpGt), "0\n");
        assert_output(binary(Operand::Int(2), Operand::Int(2), Op::CmpEq), "1\n");
        assert_output(binary(Operand::Int(2), Operand::Int(2), Op::CmpNe), "0\n");
        assert_output(binary(Operand::Int(2), Operand::Int(2), Op::CmpGe), "1\n");
        assert_output(binary(Operand::Int(3), Operand::Int(2), Op::CmpLe), "0\n");
    }

    #[test]
    fn test_mixed_comparison_promotes() {
        assert_output(
            vec![
                Op::PushInt(Operand::Int(1)),
                Op::PushReal(Operand::Real(1.5)),
                Op::CmpLt,
                Op::Print,
            ],
            "1\n",
        );
    }

    #[test]
    fn test_boolean_ops() {
        assert_output(binary(Operand::Int(1), Operand::Int(0), Op::And), "0\n");
        assert_output(binary(Operand::Int(1), Operand::Int(0), Op::Or), "1\n");
        assert_output(vec![Op::PushInt(Operand::Int(0)), Op::Not, Op::Print], "1\n");
        assert_output(
            vec![Op::PushInt(Operand::Int(9)), Op::Neg, Op::Print],
            "-9\n",
        );
    }

    // ============================================================
    // Jumps, labels and scopes
    // ============================================================

    #[test]
    fn test_unconditional_jump_skips() {
        assert_output(
            vec![
                Op::Jump("over".to_string()),
                Op::PushInt(Operand::Int(1)),
                Op::Print,
                Op::Label("over".to_string()),
                Op::PushInt(Operand::Int(2)),
                Op::Print,
            ],
            "2\n",
        );
    }

    #[test]
    fn test_jump_zero_taken_and_not_taken() {
        let branch = |cond: i64| {
            vec![
                Op::PushInt(Operand::Int(cond)),
                Op::JumpZero("end".to_string()),
                Op::PushInt(Operand::Int(1)),
                Op::Print,
                Op::Label("end".to_string()),
            ]
        };
        assert_output(branch(0), "");
        assert_output(branch(7), "1\n");
    }

    #[test]
    fn test_jump_not_zero() {
        assert_output(
            vec![
                Op::PushInt(Operand::Int(1)),
                Op::JumpNotZero("end".to_string()),
                Op::PushInt(Operand::Int(1)),
                Op::Print,
                Op::Label("end".to_string()),
            ],
            "",
        );
    }

    #[test]
    fn test_real_near_zero_counts_as_zero() {
        assert_output(
            vec![
                Op::PushReal(Operand::Real(1e-12)),
                Op::JumpZero("end".to_string()),
                Op::PushInt(Operand::Int(1)),
                Op::Print,
                Op::Label("end".to_string()),
            ],
            "",
        );
    }

    #[test]
    fn test_unknown_label() {
        let err = run_ops(vec![Op::Jump("ghost".to_string())]).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownLabel { .. }));
    }

    #[test]
    fn test_duplicate_label_rejected_at_index_build() {
        let err = run_ops(vec![
            Op::Label("l".to_string()),
            Op::Label("l".to_string()),
        ])
        .unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicateLabel { .. }));
    }

    #[test]
    fn test_scope_shadowing_at_runtime() {
        assert_output(
            vec![
                Op::VarInt("a".to_string()),
                Op::PushInt(Operand::Int(1)),
                Op::PopInt("a".to_string()),
                Op::EnterScope,
                Op::VarInt("a".to_string()),
                Op::PushInt(Operand::Int(2)),
                Op::PopInt("a".to_string()),
                Op::PushInt(var("a")),
                Op::Print,
                Op::ExitScope,
                Op::PushInt(var("a")),
                Op::Print,
            ],
            "2\n1\n",
        );
    }

    #[test]
    fn test_inner_scope_writes_through_to_outer() {
        assert_output(
            vec![
                Op::VarInt("a".to_string()),
                Op::EnterScope,
                Op::PushInt(Operand::Int(9)),
                Op::PopInt("a".to_string()),
                Op::ExitScope,
                Op::PushInt(var("a")),
                Op::Print,
            ],
            "9\n",
        );
    }

    #[test]
    fn test_redeclaration_in_same_scope_fails() {
        let err = run_ops(vec![
            Op::VarInt("a".to_string()),
            Op::VarInt("a".to_string()),
        ])
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Redefined { .. }));
    }

    #[test]
    fn test_scope_underflow() {
        let err = run_ops(vec![Op::ExitScope]).unwrap_err();
        assert!(matches!(err, RuntimeError::ScopeUnderflow { ip: 0 }));
    }

    #[test]
    fn test_step_limit_stops_infinite_loop() {
        let err = exec(
            vec![
                Op::Label("spin".to_string()),
                Op::Jump("spin".to_string()),
            ],
            "",
            VmConfig {
                max_steps: 100,
                ..VmConfig::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::StepLimitExceeded { limit: 100 }));
    }

    // ============================================================
    // Variables and arrays
    // ============================================================

    #[test]
    fn test_push_unassigned_variable() {
        let err = run_ops(vec![
            Op::VarInt("a".to_string()),
            Op::PushInt(var("a")),
        ])
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Unassigned { .. }));
    }

    #[test]
    fn test_push_unresolved_name() {
        let err = run_ops(vec![Op::PushInt(var("ghost"))]).unwrap_err();
        assert!(matches!(err, RuntimeError::Unresolved { .. }));
    }

    #[test]
    fn test_array_element_round_trip() {
        assert_output(
            vec![
                Op::VarIntArray {
                    name: "a".to_string(),
                    size: Operand::Int(3),
                },
                Op::PushInt(Operand::Int(7)),
                Op::PopIntArray {
                    name: "a".to_string(),
                    index: Operand::Int(2),
                },
                Op::PushIntArray {
                    name: "a".to_string(),
                    index: Operand::Int(2),
                },
                Op::Print,
            ],
            "7\n",
        );
    }

    #[test]
    fn test_variable_offset_is_checked_at_runtime() {
        let err = run_ops(vec![
            Op::VarIntArray {
                name: "a".to_string(),
                size: Operand::Int(3),
            },
            Op::VarInt("i".to_string()),
            Op::PushInt(Operand::Int(5)),
            Op::PopInt("i".to_string()),
            Op::PushInt(Operand::Int(1)),
            Op::PopIntArray {
                name: "a".to_string(),
                index: var("i"),
            },
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::IndexOutOfBounds {
                index: 5,
                len: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_negative_offset_is_rejected() {
        let err = run_ops(vec![
            Op::VarIntArray {
                name: "a".to_string(),
                size: Operand::Int(3),
            },
            Op::PushInt(Operand::Int(1)),
            Op::PopIntArray {
                name: "a".to_string(),
                index: Operand::Int(-1),
            },
        ])
        .unwrap_err();
        assert!(matches!(err, RuntimeError::IndexOutOfBounds { index: -1, .. }));
    }

    #[test]
    fn test_variable_sized_declaration() {
        assert_output(
            vec![
                Op::VarInt("n".to_string()),
                Op::PushInt(Operand::Int(4)),
                Op::PopInt("n".to_string()),
                Op::VarIntArray {
                    name: "a".to_string(),
                    size: var("n"),
                },
                Op::PushInt(Operand::Int(1)),
                Op::PopIntArray {
                    name: "a".to_string(),
                    index: Operand::Int(3),
                },
                Op::PushIntArray {
                    name: "a".to_string(),
                    index: Operand::Int(3),
                },
                Op::Print,
            ],
            "1\n",
        );
    }

    #[test]
    fn test_invalid_array_length() {
        let err = run_ops(vec![
            Op::VarInt("n".to_string()),
            Op::PushInt(Operand::Int(0)),
            Op::PopInt("n".to_string()),
            Op::VarIntArray {
                name: "a".to_string(),
                size: var("n"),
            },
        ])
        .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidArrayLength { len: 0, .. }));
    }

    #[test]
    fn test_real_array_element_coerces_int_store() {
        assert_output(
            vec![
                Op::VarRealArray {
                    name: "xs".to_string(),
                    size: Operand::Int(2),
                },
                Op::PushInt(Operand::Int(3)),
                Op::PopRealArray {
                    name: "xs".to_string(),
                    index: Operand::Int(0),
                },
                Op::PushRealArray {
                    name: "xs".to_string(),
                    index: Operand::Int(0),
                },
                Op::Print,
            ],
            "3\n",
        );
    }

    // ============================================================
    // Console I/O
    // ============================================================

    #[test]
    fn test_read_int() {
        let output = run_ops_with_input(
            vec![
                Op::VarInt("a".to_string()),
                Op::ReadInt("a".to_string()),
                Op::PushInt(var("a")),
                Op::Print,
            ],
            "42\n",
        )
        .unwrap();
        assert_eq!(output, "42\n");
    }

    #[test]
    fn test_read_is_whitespace_delimited() {
        let output = run_ops_with_input(
            vec![
                Op::VarInt("a".to_string()),
                Op::VarInt("b".to_string()),
                Op::ReadInt("a".to_string()),
                Op::ReadInt("b".to_string()),
                Op::PushInt(var("a")),
                Op::PushInt(var("b")),
                Op::Add,
                Op::Print,
            ],
            "  3\t4\n",
        )
        .unwrap();
        assert_eq!(output, "7\n");
    }

    #[test]
    fn test_read_real_and_element() {
        let output = run_ops_with_input(
            vec![
                Op::VarReal("x".to_string()),
                Op::ReadReal("x".to_string()),
                Op::VarRealArray {
                    name: "xs".to_string(),
                    size: Operand::Int(2),
                },
                Op::ReadRealArray {
                    name: "xs".to_string(),
                    index: Operand::Int(1),
                },
                Op::PushReal(var("x")),
                Op::PushRealArray {
                    name: "xs".to_string(),
                    index: Operand::Int(1),
                },
                Op::Add,
                Op::Print,
            ],
            "1.5 2.25",
        )
        .unwrap();
        assert_eq!(output, "3.75\n");
    }

    #[test]
    fn test_read_invalid_int() {
        let err = run_ops_with_input(
            vec![Op::VarInt("a".to_string()), Op::ReadInt("a".to_string())],
            "pear",
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::ReadFailed { .. }));
    }

    #[test]
    fn test_read_past_end_of_input() {
        let err = run_ops_with_input(
            vec![Op::VarInt("a".to_string()), Op::ReadInt("a".to_string())],
            "",
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::ReadFailed { .. }));
    }

    // ============================================================
    // Function calls
    // ============================================================

    #[test]
    fn test_sequential_flow_skips_function_bodies() {
        assert_output(
            vec![
                Op::StartFunc("f".to_string()),
                Op::PushInt(Operand::Int(1)),
                Op::Print,
                Op::Return,
                Op::EndFunc,
                Op::PushInt(Operand::Int(2)),
                Op::Print,
                Op::Exit,
            ],
            "2\n",
        );
    }

    #[test]
    fn test_call_binds_argument_and_returns_value() {
        assert_output(
            vec![
                Op::StartFunc("inc".to_string()),
                Op::ArgInt("x".to_string()),
                Op::PushInt(var("x")),
                Op::PushInt(Operand::Int(1)),
                Op::Add,
                Op::Return,
                Op::EndFunc,
                Op::PushInt(Operand::Int(41)),
                Op::Call("inc".to_string()),
                Op::Print,
                Op::Exit,
            ],
            "42\n",
        );
    }

    #[test]
    fn test_arguments_bind_left_to_right() {
        // f(10, 4) computing a - b must see a = 10, b = 4.
        assert_output(
            vec![
                Op::StartFunc("diff".to_string()),
                Op::ArgInt("a".to_string()),
                Op::ArgInt("b".to_string()),
                Op::PushInt(var("a")),
                Op::PushInt(var("b")),
                Op::Sub,
                Op::Return,
                Op::EndFunc,
                Op::PushInt(Operand::Int(10)),
                Op::PushInt(Operand::Int(4)),
                Op::Call("diff".to_string()),
                Op::Print,
                Op::Exit,
            ],
            "6\n",
        );
    }

    #[test]
    fn test_void_function_falls_through_endfunc() {
        assert_output(
            vec![
                Op::StartFunc("ping".to_string()),
                Op::PushInt(Operand::Int(7)),
                Op::Print,
                Op::EndFunc,
                Op::Call("ping".to_string()),
                Op::PushInt(Operand::Int(8)),
                Op::Print,
                Op::Exit,
            ],
            "7\n8\n",
        );
    }

    #[test]
    fn test_function_sees_globals_but_not_caller_locals() {
        assert_output(
            vec![
                Op::VarInt("g".to_string()),
                Op::PushInt(Operand::Int(5)),
                Op::PopInt("g".to_string()),
                Op::StartFunc("show".to_string()),
                Op::PushInt(var("g")),
                Op::Print,
                Op::EndFunc,
                Op::Call("show".to_string()),
                Op::Exit,
            ],
            "5\n",
        );
    }

    #[test]
    fn test_caller_local_is_invisible_to_callee() {
        let err = run_ops(vec![
            Op::StartFunc("peek".to_string()),
            Op::PushInt(var("hidden")),
            Op::Print,
            Op::EndFunc,
            Op::EnterScope,
            Op::VarInt("hidden".to_string()),
            Op::PushInt(Operand::Int(1)),
            Op::PopInt("hidden".to_string()),
            Op::Call("peek".to_string()),
            Op::ExitScope,
        ])
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Unresolved { .. }));
    }

    #[test]
    fn test_array_argument_passes_by_value() {
        assert_output(
            vec![
                Op::StartFunc("smash".to_string()),
                Op::ArgIntArray("xs".to_string()),
                Op::PushInt(Operand::Int(99)),
                Op::PopIntArray {
                    name: "xs".to_string(),
                    index: Operand::Int(0),
                },
                Op::EndFunc,
                Op::VarIntArray {
                    name: "a".to_string(),
                    size: Operand::Int(1),
                },
                Op::PushInt(Operand::Int(1)),
                Op::PopIntArray {
                    name: "a".to_string(),
                    index: Operand::Int(0),
                },
                Op::PushInt(var("a")),
                Op::Call("smash".to_string()),
                Op::PushIntArray {
                    name: "a".to_string(),
                    index: Operand::Int(0),
                },
                Op::Print,
                Op::Exit,
            ],
            "1\n",
        );
    }

    #[test]
    fn test_unknown_function() {
        let err = run_ops(vec![Op::Call("ghost".to_string())]).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownFunction { .. }));
    }

    #[test]
    fn test_return_outside_call() {
        let err = run_ops(vec![Op::Return]).unwrap_err();
        assert!(matches!(err, RuntimeError::ReturnOutsideCall { .. }));
    }

    #[test]
    fn test_call_depth_limit() {
        let err = exec(
            vec![
                Op::StartFunc("spin".to_string()),
                Op::Call("spin".to_string()),
                Op::EndFunc,
                Op::Call("spin".to_string()),
                Op::Exit,
            ],
            "",
            VmConfig {
                max_call_depth: 10,
                ..VmConfig::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::CallDepthExceeded { limit: 10 }));
    }

    #[test]
    fn test_unterminated_function_rejected_at_index_build() {
        let err = run_ops(vec![Op::StartFunc("f".to_string())]).unwrap_err();
        assert!(matches!(err, RuntimeError::UnterminatedFunction { ip: 0 }));
    }

    #[test]
    fn test_duplicate_function_rejected_at_index_build() {
        let err = run_ops(vec![
            Op::StartFunc("f".to_string()),
            Op::EndFunc,
            Op::StartFunc("f".to_string()),
            Op::EndFunc,
        ])
        .unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicateFunction { .. }));
    }
}
