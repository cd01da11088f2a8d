//! vm.rs — Boucle fetch-decode-dispatch, frames d'appel, classes et
//! fermetures de la VM à pile du langage Vitte.
//!
//! Traduction directe de `run()` (vm.c) : un seul gros `match` sur l'octet
//! d'opération, une pile `Vec<Value>` et une pile de frames parallèle. Les
//! indices (`ObjRef`) remplacent les pointeurs bruts de la source — voir
//! `vitte_core::object` pour la justification.

use std::io::Write as _;

use vitte_compiler::compile;
use vitte_core::{
    disassemble_instruction, Heap, ObjBoundMethod, ObjClass, ObjClosure, ObjFunction,
    ObjInstance, ObjRef, ObjUpvalue, Object, OpCode, Table, UpvalueSlot, Value,
};

use crate::error::{InterpretError, RuntimeError};
use crate::natives;

/// Nombre maximal de frames d'appel actives simultanément.
pub const FRAMES_MAX: usize = 64;

/// Options de construction de la VM — la seule surface de configuration de
/// ce crate : pas de fichier de config, pas de variables d'environnement
/// lues par le langage lui-même.
#[derive(Debug, Clone, Copy)]
pub struct VmOptions {
    /// Émet un événement `tracing::trace!` par instruction dispatchée.
    pub trace: bool,
    /// Force une collecte à chaque allocation (utilisé par les tests GC).
    pub stress_gc: bool,
    /// Profondeur maximale de la pile de frames.
    pub frames_max: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            trace: false,
            stress_gc: false,
            frames_max: FRAMES_MAX,
        }
    }
}

struct CallFrame {
    closure: ObjRef,
    /// Fonction de la fermeture, mise en cache pour éviter un aller-retour
    /// par `heap.as_closure` à chaque lecture d'octet : la fermeture d'un
    /// frame ne change jamais pendant sa durée de vie.
    function: ObjRef,
    ip: usize,
    slot_base: usize,
}

/// La machine virtuelle : pile de valeurs, pile de frames, globales, tas
/// garbage-collecté et liste des upvalues ouverts. Instance unique par
/// processus, non réentrante et mono-thread.
pub struct Vm {
    heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    /// Triée par adresse de pile décroissante.
    open_upvalues: Vec<ObjRef>,
    /// Chaîne internée "init", gardée vivante explicitement (c'est une
    /// racine du GC) et comparée par identité à chaque construction
    /// d'instance.
    init_string: ObjRef,
    options: VmOptions,
    /// Destination de `print` — `stdout` par défaut, un buffer en mémoire
    /// dans les tests pour vérifier le rendu exact des scénarios bout en
    /// bout.
    output: Box<dyn std::io::Write>,
}

type OpResult = Result<(), RuntimeError>;

impl Vm {
    pub fn new() -> Self {
        Self::with_options(VmOptions::default())
    }

    pub fn with_options(options: VmOptions) -> Self {
        Self::with_options_and_output(options, Box::new(std::io::stdout()))
    }

    /// Variante de [`Vm::with_options`] qui redirige la sortie de `print`
    /// vers `output` plutôt que `stdout` — utilisé par les tests bout en
    /// bout qui vérifient le rendu exact, et disponible pour embarquer la VM
    /// dans un hôte qui veut capturer sa sortie.
    pub fn with_options_and_output(options: VmOptions, output: Box<dyn std::io::Write>) -> Self {
        let mut heap = Heap::new();
        heap.stress_gc = options.stress_gc;
        let init_string = heap.intern("init");
        let mut vm = Self {
            heap,
            stack: Vec::with_capacity(options.frames_max * 256),
            frames: Vec::with_capacity(options.frames_max),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            init_string,
            options,
            output,
        };
        vm.define_native("clock", natives::clock);
        vm
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Compile puis exécute une source complète dans cette VM.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let function = compile(source, &mut self.heap).map_err(InterpretError::Compile)?;
        self.run_function(function).map_err(InterpretError::Runtime)
    }

    fn run_function(&mut self, function: ObjFunction) -> OpResult {
        let function_ref = self.heap.alloc_function(function);
        self.push(Value::Obj(function_ref));
        let closure_ref = self.heap.alloc_closure(ObjClosure {
            function: function_ref,
            upvalues: Vec::new(),
        });
        self.pop();
        self.push(Value::Obj(closure_ref));
        self.call_closure(closure_ref, 0)?;
        self.run()
    }

    pub fn define_native(&mut self, name: &str, function: vitte_core::NativeFn) {
        let name_ref = self.heap.intern(name);
        // Même discipline que `defineNative` (vm.c) : on enracine le nom et
        // le natif sur la pile avant de peupler la table des globales, pour
        // qu'ils survivent à une collecte déclenchée par l'internement ou
        // l'allocation qui suit ("push before intern").
        self.push(Value::Obj(name_ref));
        let native_ref = self.heap.alloc_native(name_ref, function);
        self.push(Value::Obj(native_ref));
        let hash = self.heap.as_string(name_ref).hash;
        self.globals.set(name_ref, hash, self.stack[self.stack.len() - 1]);
        self.pop();
        self.pop();
    }

    // ------------------------------------------------------------------
    // Pile
    // ------------------------------------------------------------------

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("pop on empty VM stack")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    // ------------------------------------------------------------------
    // Lecture du bytecode courant
    // ------------------------------------------------------------------

    fn frame_function(&self) -> ObjRef {
        self.frames.last().expect("no active frame").function
    }

    fn read_byte(&mut self) -> u8 {
        let idx = self.frames.len() - 1;
        let function = self.frames[idx].function;
        let ip = self.frames[idx].ip;
        let byte = self.heap.as_function(function).chunk.read_byte(ip);
        self.frames[idx].ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let idx = self.frames.len() - 1;
        let function = self.frames[idx].function;
        let ip = self.frames[idx].ip;
        let value = self.heap.as_function(function).chunk.read_u16(ip);
        self.frames[idx].ip += 2;
        value
    }

    fn read_u24(&mut self) -> u32 {
        let idx = self.frames.len() - 1;
        let function = self.frames[idx].function;
        let ip = self.frames[idx].ip;
        let value = self.heap.as_function(function).chunk.read_u24(ip);
        self.frames[idx].ip += 3;
        value
    }

    fn read_constant(&mut self, idx: usize) -> Value {
        self.heap.as_function(self.frame_function()).chunk.constants[idx]
    }

    fn read_constant_short(&mut self) -> Value {
        let idx = self.read_byte() as usize;
        self.read_constant(idx)
    }

    fn read_constant_long(&mut self) -> Value {
        let idx = self.read_u24() as usize;
        self.read_constant(idx)
    }

    fn read_string_short(&mut self) -> ObjRef {
        self.read_constant_short().as_obj().expect("name constant is always a string")
    }

    // ------------------------------------------------------------------
    // Erreurs runtime
    // ------------------------------------------------------------------

    fn runtime_error(&mut self, message: impl Into<String>) -> RuntimeError {
        let message = message.into();
        let mut trace = Vec::with_capacity(self.frames.len());
        for frame in self.frames.iter().rev() {
            let function = self.heap.as_function(frame.function);
            let line = function.chunk.get_line(frame.ip.saturating_sub(1));
            let name = match function.name {
                Some(n) => format!("{}()", self.heap.as_string(n).chars),
                None => "script".to_string(),
            };
            trace.push(format!("[line {line}] in {name}"));
        }
        self.reset_stack();
        RuntimeError { message, trace }
    }

    // ------------------------------------------------------------------
    // Garbage collector
    // ------------------------------------------------------------------

    /// Vérifie le seuil d'allocation et déclenche un cycle si besoin, en
    /// rassemblant l'ensemble des racines : pile de valeurs, les
    /// fermetures des frames actives, les upvalues ouverts, la table des
    /// globales et la sentinelle `init`.
    fn maybe_collect(&mut self) {
        if !self.heap.should_collect() {
            return;
        }
        let stack_roots = self.stack.clone();
        let frame_roots: Vec<Value> = self.frames.iter().map(|f| Value::Obj(f.closure)).collect();
        let upvalue_roots: Vec<Value> = self.open_upvalues.iter().map(|&r| Value::Obj(r)).collect();
        let roots = stack_roots
            .into_iter()
            .chain(frame_roots)
            .chain(upvalue_roots)
            .chain(std::iter::once(Value::Obj(self.init_string)));
        self.heap.collect_garbage(roots, &[&self.globals]);
    }

    // ------------------------------------------------------------------
    // Upvalues
    // ------------------------------------------------------------------

    fn capture_upvalue(&mut self, stack_index: usize) -> ObjRef {
        for &existing in &self.open_upvalues {
            match self.heap.as_upvalue(existing).slot {
                UpvalueSlot::Open(loc) if loc == stack_index => return existing,
                UpvalueSlot::Open(loc) if loc < stack_index => break,
                _ => {}
            }
        }
        let created = self.heap.alloc_upvalue(ObjUpvalue::open(stack_index));
        let pos = self
            .open_upvalues
            .iter()
            .position(|&r| match self.heap.as_upvalue(r).slot {
                UpvalueSlot::Open(loc) => loc < stack_index,
                UpvalueSlot::Closed => false,
            })
            .unwrap_or(self.open_upvalues.len());
        self.open_upvalues.insert(pos, created);
        created
    }

    fn close_upvalues(&mut self, from: usize) {
        while let Some(&top) = self.open_upvalues.first() {
            let loc = match self.heap.as_upvalue(top).slot {
                UpvalueSlot::Open(loc) => loc,
                UpvalueSlot::Closed => break,
            };
            if loc < from {
                break;
            }
            let value = self.stack[loc];
            let up = self.heap.as_upvalue_mut(top);
            up.closed = value;
            up.slot = UpvalueSlot::Closed;
            self.open_upvalues.remove(0);
        }
    }

    // ------------------------------------------------------------------
    // Appels
    // ------------------------------------------------------------------

    fn call_closure(&mut self, closure_ref: ObjRef, argc: u8) -> OpResult {
        let function_ref = self.heap.as_closure(closure_ref).function;
        let arity = self.heap.as_function(function_ref).arity;
        if argc != arity {
            return Err(self.runtime_error(format!("Expected {arity} arguments but got {argc}.")));
        }
        if self.frames.len() >= self.options.frames_max {
            return Err(self.runtime_error("Stack overflow."));
        }
        let slot_base = self.stack.len() - argc as usize - 1;
        self.frames.push(CallFrame {
            closure: closure_ref,
            function: function_ref,
            ip: 0,
            slot_base,
        });
        Ok(())
    }

    fn call_value(&mut self, callee: Value, argc: u8) -> OpResult {
        let Value::Obj(obj_ref) = callee else {
            return Err(self.runtime_error("Can only call functions and classes."));
        };
        match self.heap.get(obj_ref) {
            Object::Closure(_) => self.call_closure(obj_ref, argc),
            Object::Native(native) => {
                let function = native.function;
                let args_start = self.stack.len() - argc as usize;
                let args: Vec<Value> = self.stack[args_start..].to_vec();
                match function(&args) {
                    Ok(result) => {
                        self.stack.truncate(args_start - 1);
                        self.push(result);
                        Ok(())
                    }
                    Err(message) => Err(self.runtime_error(message)),
                }
            }
            Object::Class(_) => {
                let instance_ref = self.heap.alloc_instance(ObjInstance::new(obj_ref));
                let slot = self.stack.len() - argc as usize - 1;
                self.stack[slot] = Value::Obj(instance_ref);
                let hash = self.heap.as_string(self.init_string).hash;
                let init = self.heap.as_class(obj_ref).methods.get(self.init_string, hash);
                match init {
                    Some(init_val) => {
                        let init_closure = init_val.as_obj().expect("init is always a closure");
                        self.call_closure(init_closure, argc)
                    }
                    None if argc != 0 => {
                        Err(self.runtime_error(format!("Expected 0 arguments but got {argc}.")))
                    }
                    None => Ok(()),
                }
            }
            Object::BoundMethod(bound) => {
                let receiver = bound.receiver;
                let method = bound.method;
                let slot = self.stack.len() - argc as usize - 1;
                self.stack[slot] = receiver;
                self.call_closure(method, argc)
            }
            _ => Err(self.runtime_error("Can only call functions and classes.")),
        }
    }

    fn instance_ref(&mut self, value: Value, message: &str) -> Result<ObjRef, RuntimeError> {
        if let Value::Obj(r) = value {
            if matches!(self.heap.get(r), Object::Instance(_)) {
                return Ok(r);
            }
        }
        Err(self.runtime_error(message))
    }

    fn bind_method(&mut self, class_ref: ObjRef, name_ref: ObjRef) -> OpResult {
        let hash = self.heap.as_string(name_ref).hash;
        let method = self.heap.as_class(class_ref).methods.get(name_ref, hash);
        let Some(method_val) = method else {
            let name = self.heap.as_string(name_ref).chars.to_string();
            return Err(self.runtime_error(format!("Undefined property '{name}'.")));
        };
        let closure_ref = method_val.as_obj().expect("method table values are always closures");
        let receiver = self.peek(0);
        let bound_ref = self.heap.alloc_bound_method(ObjBoundMethod {
            receiver,
            method: closure_ref,
        });
        self.pop();
        self.push(Value::Obj(bound_ref));
        Ok(())
    }

    fn invoke_from_class(&mut self, class_ref: ObjRef, name_ref: ObjRef, argc: u8) -> OpResult {
        let hash = self.heap.as_string(name_ref).hash;
        let method = self.heap.as_class(class_ref).methods.get(name_ref, hash);
        let Some(method_val) = method else {
            let name = self.heap.as_string(name_ref).chars.to_string();
            return Err(self.runtime_error(format!("Undefined property '{name}'.")));
        };
        let closure_ref = method_val.as_obj().expect("method table values are always closures");
        self.call_closure(closure_ref, argc)
    }

    fn invoke(&mut self, name_ref: ObjRef, argc: u8) -> OpResult {
        let receiver = self.peek(argc as usize);
        let instance_ref = self.instance_ref(receiver, "Only instances have methods.")?;
        let hash = self.heap.as_string(name_ref).hash;
        if let Some(field) = self.heap.as_instance(instance_ref).fields.get(name_ref, hash) {
            let slot = self.stack.len() - 1 - argc as usize;
            self.stack[slot] = field;
            return self.call_value(field, argc);
        }
        let class_ref = self.heap.as_instance(instance_ref).class;
        self.invoke_from_class(class_ref, name_ref, argc)
    }

    // ------------------------------------------------------------------
    // Boucle d'exécution
    // ------------------------------------------------------------------

    fn run(&mut self) -> OpResult {
        loop {
            self.maybe_collect();

            if self.options.trace {
                let idx = self.frames.len() - 1;
                let function = self.frames[idx].function;
                let ip = self.frames[idx].ip;
                let chunk = &self.heap.as_function(function).chunk;
                let (text, _) = disassemble_instruction(chunk, ip);
                tracing::trace!(stack_depth = self.stack.len(), "{text}");
            }

            let byte = self.read_byte();
            let Some(op) = OpCode::from_byte(byte) else {
                return Err(self.runtime_error(format!("Unknown opcode {byte}.")));
            };

            match op {
                OpCode::Constant => {
                    let v = self.read_constant_short();
                    self.push(v);
                }
                OpCode::ConstantLong => {
                    let v = self.read_constant_long();
                    self.push(v);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames.last().unwrap().slot_base;
                    self.push(self.stack[base + slot]);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames.last().unwrap().slot_base;
                    self.stack[base + slot] = self.peek(0);
                }
                OpCode::GetGlobal => {
                    let name_ref = self.read_string_short();
                    let hash = self.heap.as_string(name_ref).hash;
                    match self.globals.get(name_ref, hash) {
                        Some(v) => self.push(v),
                        None => {
                            let name = self.heap.as_string(name_ref).chars.to_string();
                            return Err(self.runtime_error(format!("Undefined variable '{name}'.")));
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name_ref = self.read_string_short();
                    let hash = self.heap.as_string(name_ref).hash;
                    let value = self.peek(0);
                    self.globals.set(name_ref, hash, value);
                    self.pop();
                }
                OpCode::SetGlobal => {
                    let name_ref = self.read_string_short();
                    let hash = self.heap.as_string(name_ref).hash;
                    let value = self.peek(0);
                    if self.globals.set(name_ref, hash, value) {
                        self.globals.delete(name_ref, hash);
                        let name = self.heap.as_string(name_ref).chars.to_string();
                        return Err(self.runtime_error(format!("Undefined variable '{name}'.")));
                    }
                }
                OpCode::GetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let closure = self.frames.last().unwrap().closure;
                    let up_ref = self.heap.as_closure(closure).upvalues[slot];
                    let value = match self.heap.as_upvalue(up_ref).slot {
                        UpvalueSlot::Open(idx) => self.stack[idx],
                        UpvalueSlot::Closed => self.heap.as_upvalue(up_ref).closed,
                    };
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let closure = self.frames.last().unwrap().closure;
                    let up_ref = self.heap.as_closure(closure).upvalues[slot];
                    let value = self.peek(0);
                    match self.heap.as_upvalue(up_ref).slot {
                        UpvalueSlot::Open(idx) => self.stack[idx] = value,
                        UpvalueSlot::Closed => self.heap.as_upvalue_mut(up_ref).closed = value,
                    }
                }
                OpCode::GetProperty => {
                    let name_ref = self.read_string_short();
                    let receiver = self.peek(0);
                    let instance_ref = self.instance_ref(receiver, "Only instances have properties.")?;
                    let hash = self.heap.as_string(name_ref).hash;
                    if let Some(value) = self.heap.as_instance(instance_ref).fields.get(name_ref, hash) {
                        self.pop();
                        self.push(value);
                    } else {
                        let class_ref = self.heap.as_instance(instance_ref).class;
                        self.bind_method(class_ref, name_ref)?;
                    }
                }
                OpCode::SetProperty => {
                    let name_ref = self.read_string_short();
                    let receiver = self.peek(1);
                    let instance_ref = self.instance_ref(receiver, "Only instances have fields.")?;
                    let hash = self.heap.as_string(name_ref).hash;
                    let value = self.peek(0);
                    self.heap.as_instance_mut(instance_ref).fields.set(name_ref, hash, value);
                    let value = self.pop();
                    self.pop();
                    self.push(value);
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Greater => self.binary_compare(|a, b| a > b)?,
                OpCode::Less => self.binary_compare(|a, b| a < b)?,
                OpCode::Add => self.add()?,
                OpCode::Subtract => self.binary_number(|a, b| a - b)?,
                OpCode::Multiply => self.binary_number(|a, b| a * b)?,
                OpCode::Divide => self.binary_number(|a, b| a / b)?,
                OpCode::Negate => {
                    let Some(n) = self.peek(0).as_number() else {
                        return Err(self.runtime_error("Operand must be a number."));
                    };
                    self.pop();
                    self.push(Value::Number(-n));
                }
                OpCode::Not => {
                    let v = self.pop();
                    self.push(Value::Bool(v.is_falsey()));
                }
                OpCode::Print => {
                    let v = self.pop();
                    let text = self.heap.stringify(v);
                    writeln!(self.output, "{text}").expect("write to print sink");
                }
                OpCode::Jump => {
                    let offset = self.read_u16() as usize;
                    self.frames.last_mut().unwrap().ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16() as usize;
                    if self.peek(0).is_falsey() {
                        self.frames.last_mut().unwrap().ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16() as usize;
                    self.frames.last_mut().unwrap().ip -= offset;
                }
                OpCode::Call => {
                    let argc = self.read_byte();
                    let callee = self.peek(argc as usize);
                    self.call_value(callee, argc)?;
                }
                OpCode::Invoke => {
                    let name_ref = self.read_string_short();
                    let argc = self.read_byte();
                    self.invoke(name_ref, argc)?;
                }
                OpCode::SuperInvoke => {
                    let name_ref = self.read_string_short();
                    let argc = self.read_byte();
                    let superclass_val = self.pop();
                    let Value::Obj(superclass_ref) = superclass_val else {
                        return Err(self.runtime_error("Superclass must be a class."));
                    };
                    self.invoke_from_class(superclass_ref, name_ref, argc)?;
                }
                OpCode::Closure => {
                    let const_idx = self.read_byte() as usize;
                    let function_val = self.read_constant(const_idx);
                    let function_ref = function_val.as_obj().expect("closure constant is always a function");
                    let upvalue_count = self.heap.as_function(function_ref).upvalue_count as usize;
                    let current_closure = self.frames.last().unwrap().closure;
                    let slot_base = self.frames.last().unwrap().slot_base;
                    let mut upvalues = Vec::with_capacity(upvalue_count);
                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte() != 0;
                        let index = self.read_byte() as usize;
                        let up_ref = if is_local {
                            self.capture_upvalue(slot_base + index)
                        } else {
                            self.heap.as_closure(current_closure).upvalues[index]
                        };
                        upvalues.push(up_ref);
                    }
                    let closure_ref = self.heap.alloc_closure(ObjClosure {
                        function: function_ref,
                        upvalues,
                    });
                    self.push(Value::Obj(closure_ref));
                }
                OpCode::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let slot_base = self.frames.last().unwrap().slot_base;
                    self.close_upvalues(slot_base);
                    self.frames.pop();
                    if self.frames.is_empty() {
                        self.pop();
                        return Ok(());
                    }
                    self.stack.truncate(slot_base);
                    self.push(result);
                }
                OpCode::Class => {
                    let name_ref = self.read_string_short();
                    let class_ref = self.heap.alloc_class(ObjClass::new(name_ref));
                    self.push(Value::Obj(class_ref));
                }
                OpCode::Inherit => {
                    let superclass_val = self.peek(1);
                    let Value::Obj(superclass_ref) = superclass_val else {
                        return Err(self.runtime_error("Superclass must be a class."));
                    };
                    if !matches!(self.heap.get(superclass_ref), Object::Class(_)) {
                        return Err(self.runtime_error("Superclass must be a class."));
                    }
                    let Value::Obj(subclass_ref) = self.peek(0) else {
                        unreachable!("OP_INHERIT always runs with the subclass on top")
                    };
                    let super_methods = self.heap.as_class(superclass_ref).methods.clone();
                    self.heap.as_class_mut(subclass_ref).methods.copy_from(&super_methods);
                    // La valeur au sommet n'est que la référence temporaire
                    // de classe utilisée par cette instruction : le
                    // compilateur en recharge une autre juste après pour
                    // définir les méthodes (voir compiler.rs::class_declaration).
                    self.pop();
                }
                OpCode::Method => {
                    let name_ref = self.read_string_short();
                    let method = self.peek(0);
                    let Value::Obj(class_ref) = self.peek(1) else {
                        unreachable!("OP_METHOD always runs with the class below the method closure")
                    };
                    let hash = self.heap.as_string(name_ref).hash;
                    self.heap.as_class_mut(class_ref).methods.set(name_ref, hash, method);
                    self.pop();
                }
                OpCode::GetSuper => {
                    let name_ref = self.read_string_short();
                    let superclass_val = self.pop();
                    let Value::Obj(superclass_ref) = superclass_val else {
                        return Err(self.runtime_error("Superclass must be a class."));
                    };
                    self.bind_method(superclass_ref, name_ref)?;
                }
            }
        }
    }

    fn binary_number(&mut self, op: impl FnOnce(f64, f64) -> f64) -> OpResult {
        let (Some(b), Some(a)) = (self.peek(0).as_number(), self.peek(1).as_number()) else {
            return Err(self.runtime_error("Operands must be numbers."));
        };
        self.pop();
        self.pop();
        self.push(Value::Number(op(a, b)));
        Ok(())
    }

    fn binary_compare(&mut self, op: impl FnOnce(f64, f64) -> bool) -> OpResult {
        let (Some(b), Some(a)) = (self.peek(0).as_number(), self.peek(1).as_number()) else {
            return Err(self.runtime_error("Operands must be numbers."));
        };
        self.pop();
        self.pop();
        self.push(Value::Bool(op(a, b)));
        Ok(())
    }

    fn add(&mut self) -> OpResult {
        let b = self.peek(0);
        let a = self.peek(1);
        let both_strings = matches!(
            (a, b),
            (Value::Obj(ra), Value::Obj(rb))
                if matches!(self.heap.get(ra), Object::String(_)) && matches!(self.heap.get(rb), Object::String(_))
        );
        if both_strings {
            let (Value::Obj(ra), Value::Obj(rb)) = (a, b) else { unreachable!() };
            let concatenated = format!("{}{}", self.heap.as_string(ra).chars, self.heap.as_string(rb).chars);
            let result_ref = self.heap.intern(&concatenated);
            self.pop();
            self.pop();
            self.push(Value::Obj(result_ref));
            return Ok(());
        }
        if let (Some(an), Some(bn)) = (a.as_number(), b.as_number()) {
            self.pop();
            self.pop();
            self.push(Value::Number(an + bn));
            return Ok(());
        }
        Err(self.runtime_error("Operands must be two numbers or two strings."))
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
