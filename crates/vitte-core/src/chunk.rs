//! chunk.rs — Format binaire d'un chunk de bytecode Vitte.
//!
//! Un `Chunk` est la sortie unique du compilateur pour une fonction donnée :
//! un flux d'octets (`code`), une table de lignes compacte en RLE (pour ne
//! pas payer un `u32` par octet de bytecode) et un pool de constantes.

use std::fmt;

use crate::value::Value;

/// Numéro maximal de constantes représentables (3 octets little-endian pour
/// `CONSTANT_LONG`).
pub const MAX_CONSTANTS: usize = 1 << 24;

/// Jeu d'instructions complet de la VM Vitte.
///
/// ⚠️ Ne pas réordonner : si un format binaire est sérialisé quelque part,
/// l'ordre des variantes fait partie de sa compatibilité.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OpCode {
    Constant,
    ConstantLong,
    Nil,
    True,
    False,
    Pop,
    GetLocal,
    SetLocal,
    GetGlobal,
    DefineGlobal,
    SetGlobal,
    GetUpvalue,
    SetUpvalue,
    GetProperty,
    SetProperty,
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Negate,
    Not,
    Print,
    Jump,
    JumpIfFalse,
    Loop,
    Call,
    Invoke,
    SuperInvoke,
    Closure,
    CloseUpvalue,
    Return,
    Class,
    Inherit,
    Method,
    GetSuper,
}

impl OpCode {
    pub const fn to_byte(self) -> u8 {
        match self {
            OpCode::Constant => 0,
            OpCode::ConstantLong => 1,
            OpCode::Nil => 2,
            OpCode::True => 3,
            OpCode::False => 4,
            OpCode::Pop => 5,
            OpCode::GetLocal => 6,
            OpCode::SetLocal => 7,
            OpCode::GetGlobal => 8,
            OpCode::DefineGlobal => 9,
            OpCode::SetGlobal => 10,
            OpCode::GetUpvalue => 11,
            OpCode::SetUpvalue => 12,
            OpCode::GetProperty => 13,
            OpCode::SetProperty => 14,
            OpCode::Equal => 15,
            OpCode::Greater => 16,
            OpCode::Less => 17,
            OpCode::Add => 18,
            OpCode::Subtract => 19,
            OpCode::Multiply => 20,
            OpCode::Divide => 21,
            OpCode::Negate => 22,
            OpCode::Not => 23,
            OpCode::Print => 24,
            OpCode::Jump => 25,
            OpCode::JumpIfFalse => 26,
            OpCode::Loop => 27,
            OpCode::Call => 28,
            OpCode::Invoke => 29,
            OpCode::SuperInvoke => 30,
            OpCode::Closure => 31,
            OpCode::CloseUpvalue => 32,
            OpCode::Return => 33,
            OpCode::Class => 34,
            OpCode::Inherit => 35,
            OpCode::Method => 36,
            OpCode::GetSuper => 37,
        }
    }

    pub fn from_byte(b: u8) -> Option<OpCode> {
        use OpCode::*;
        Some(match b {
            0 => Constant,
            1 => ConstantLong,
            2 => Nil,
            3 => True,
            4 => False,
            5 => Pop,
            6 => GetLocal,
            7 => SetLocal,
            8 => GetGlobal,
            9 => DefineGlobal,
            10 => SetGlobal,
            11 => GetUpvalue,
            12 => SetUpvalue,
            13 => GetProperty,
            14 => SetProperty,
            15 => Equal,
            16 => Greater,
            17 => Less,
            18 => Add,
            19 => Subtract,
            20 => Multiply,
            21 => Divide,
            22 => Negate,
            23 => Not,
            24 => Print,
            25 => Jump,
            26 => JumpIfFalse,
            27 => Loop,
            28 => Call,
            29 => Invoke,
            30 => SuperInvoke,
            31 => Closure,
            32 => CloseUpvalue,
            33 => Return,
            34 => Class,
            35 => Inherit,
            36 => Method,
            37 => GetSuper,
            _ => return None,
        })
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Constant => "OP_CONSTANT",
            OpCode::ConstantLong => "OP_CONSTANT_LONG",
            OpCode::Nil => "OP_NIL",
            OpCode::True => "OP_TRUE",
            OpCode::False => "OP_FALSE",
            OpCode::Pop => "OP_POP",
            OpCode::GetLocal => "OP_GET_LOCAL",
            OpCode::SetLocal => "OP_SET_LOCAL",
            OpCode::GetGlobal => "OP_GET_GLOBAL",
            OpCode::DefineGlobal => "OP_DEFINE_GLOBAL",
            OpCode::SetGlobal => "OP_SET_GLOBAL",
            OpCode::GetUpvalue => "OP_GET_UPVALUE",
            OpCode::SetUpvalue => "OP_SET_UPVALUE",
            OpCode::GetProperty => "OP_GET_PROPERTY",
            OpCode::SetProperty => "OP_SET_PROPERTY",
            OpCode::Equal => "OP_EQUAL",
            OpCode::Greater => "OP_GREATER",
            OpCode::Less => "OP_LESS",
            OpCode::Add => "OP_ADD",
            OpCode::Subtract => "OP_SUBTRACT",
            OpCode::Multiply => "OP_MULTIPLY",
            OpCode::Divide => "OP_DIVIDE",
            OpCode::Negate => "OP_NEGATE",
            OpCode::Not => "OP_NOT",
            OpCode::Print => "OP_PRINT",
            OpCode::Jump => "OP_JUMP",
            OpCode::JumpIfFalse => "OP_JUMP_IF_FALSE",
            OpCode::Loop => "OP_LOOP",
            OpCode::Call => "OP_CALL",
            OpCode::Invoke => "OP_INVOKE",
            OpCode::SuperInvoke => "OP_SUPER_INVOKE",
            OpCode::Closure => "OP_CLOSURE",
            OpCode::CloseUpvalue => "OP_CLOSE_UPVALUE",
            OpCode::Return => "OP_RETURN",
            OpCode::Class => "OP_CLASS",
            OpCode::Inherit => "OP_INHERIT",
            OpCode::Method => "OP_METHOD",
            OpCode::GetSuper => "OP_GET_SUPER",
        }
    }
}

/// Table de lignes en run-length encoding : `(ligne, nombre d'octets de
/// bytecode consécutifs qui portent cette ligne)`. Le contrat externe est
/// `get(offset) -> ligne`, rien de plus (tableau parallèle ou RLE, les deux
/// représentations sont valides).
#[derive(Debug, Clone, Default)]
struct LineTable {
    runs: Vec<(u32, u32)>,
}

impl LineTable {
    fn push(&mut self, line: u32) {
        if let Some(last) = self.runs.last_mut() {
            if last.0 == line {
                last.1 += 1;
                return;
            }
        }
        self.runs.push((line, 1));
    }

    fn get(&self, offset: usize) -> u32 {
        let mut remaining = offset;
        for &(line, count) in &self.runs {
            if remaining < count as usize {
                return line;
            }
            remaining -= count as usize;
        }
        self.runs.last().map(|r| r.0).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    lines: LineTable,
    pub constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn write_byte(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    pub fn write_op(&mut self, op: OpCode, line: u32) {
        self.write_byte(op.to_byte(), line);
    }

    /// Ajoute une constante au pool et renvoie son index. Le compilateur est
    /// responsable de choisir entre `OP_CONSTANT` (index ≤ 255) et
    /// `OP_CONSTANT_LONG` (index sur 3 octets) et de refuser un dépassement
    /// de [`MAX_CONSTANTS`].
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub fn get_line(&self, offset: usize) -> u32 {
        self.lines.get(offset)
    }

    pub fn read_byte(&self, offset: usize) -> u8 {
        self.code[offset]
    }

    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset], self.code[offset + 1]])
    }

    /// Les opérandes de constante longue sont stockés petit-boutiste (à la
    /// `OP_CONSTANT_LONG` du bytecode de référence) ; à distinguer des
    /// opérandes de saut, qui sont gros-boutistes (`patchJump`).
    pub fn read_u24(&self, offset: usize) -> u32 {
        u32::from_le_bytes([self.code[offset], self.code[offset + 1], self.code[offset + 2], 0])
    }

    pub fn write_u24(&mut self, value: u32, line: u32) {
        let bytes = value.to_le_bytes();
        self.write_byte(bytes[0], line);
        self.write_byte(bytes[1], line);
        self.write_byte(bytes[2], line);
    }

    pub fn write_u16_be(&mut self, value: u16, line: u32) {
        let bytes = value.to_be_bytes();
        self.write_byte(bytes[0], line);
        self.write_byte(bytes[1], line);
    }

    pub fn patch_u16_be_at(&mut self, offset: usize, value: u16) {
        let bytes = value.to_be_bytes();
        self.code[offset] = bytes[0];
        self.code[offset + 1] = bytes[1];
    }
}

/// Désassemble une instruction sans résoudre les constantes objet (le GC et
/// le tas ne sont pas visibles depuis ce crate) ; utilisé par le mode trace
/// de la VM et par les tests. Renvoie le texte et l'offset de l'instruction
/// suivante.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> (String, usize) {
    let byte = chunk.read_byte(offset);
    let line = chunk.get_line(offset);
    let Some(op) = OpCode::from_byte(byte) else {
        return (format!("{offset:04} line {line:>4} Unknown opcode {byte}"), offset + 1);
    };
    let (operand, next) = match op {
        OpCode::Constant | OpCode::GetLocal | OpCode::SetLocal | OpCode::GetGlobal
        | OpCode::DefineGlobal | OpCode::SetGlobal | OpCode::GetUpvalue | OpCode::SetUpvalue
        | OpCode::GetProperty | OpCode::SetProperty | OpCode::Call | OpCode::Class
        | OpCode::Method | OpCode::GetSuper => {
            let idx = chunk.read_byte(offset + 1);
            (format!(" {idx}"), offset + 2)
        }
        OpCode::ConstantLong => {
            let idx = chunk.read_u24(offset + 1);
            (format!(" {idx}"), offset + 4)
        }
        OpCode::Invoke | OpCode::SuperInvoke => {
            let idx = chunk.read_byte(offset + 1);
            let argc = chunk.read_byte(offset + 2);
            (format!(" {idx} ({argc} args)"), offset + 3)
        }
        OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => {
            let jump = chunk.read_u16(offset + 1);
            (format!(" {jump}"), offset + 3)
        }
        OpCode::Closure => {
            // L'opérande complet (index de fonction + paires upvalue) ne
            // peut être décodé en toute généralité sans connaître le nombre
            // d'upvalues de la fonction visée (qui vit côté tas) : on ne
            // montre que l'index de constante ici.
            let idx = chunk.read_byte(offset + 1);
            (format!(" {idx} ..."), offset + 2)
        }
        _ => (String::new(), offset + 1),
    };
    (format!("{offset:04} line {line:>4} {}{}", op.mnemonic(), operand), next)
}

pub fn disassemble_chunk(chunk: &Chunk, name: &str) -> String {
    use fmt::Write as _;
    let mut out = String::new();
    let _ = writeln!(out, "== {name} ==");
    let mut offset = 0;
    while offset < chunk.len() {
        let (line, next) = disassemble_instruction(chunk, offset);
        let _ = writeln!(out, "{line}");
        offset = next;
    }
    out
}
