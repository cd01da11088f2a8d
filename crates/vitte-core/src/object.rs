//! object.rs — Hiérarchie des objets tas du langage Vitte.
//!
//! Chaque valeur allouée sur le tas (chaîne, fonction, fermeture, classe…)
//! est représentée par une variante d'[`Object`], rangée dans l'arène du
//! [`crate::heap::Heap`] et référencée ailleurs par un [`ObjRef`] — un simple
//! index 32 bits, jamais un pointeur brut (voir DESIGN.md : cette indirection
//! est ce qui permet au GC de tracer les cycles classe/instance sans
//! `unsafe`).

use crate::chunk::Chunk;
use crate::table::Table;
use crate::value::Value;

/// Poignée opaque vers un objet tas. Stable tant que l'objet est vivant ;
/// invalidée (et potentiellement réutilisée) après un passage du GC qui
/// l'aurait jugé mort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(pub u32);

impl ObjRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Fonction native (host). Reçoit les arguments bruts, renvoie une valeur ou
/// un message d'erreur (erreur runtime "Other").
pub type NativeFn = fn(&[Value]) -> Result<Value, String>;

/// Chaîne internée. Deux `ObjString` distincts dans le tas ne portent jamais
/// les mêmes octets : l'intern pool du `Heap` garantit l'unicité à la
/// création.
#[derive(Debug, Clone)]
pub struct ObjString {
    pub chars: Box<str>,
    /// Hash FNV-1a 32 bits, calculé une fois à la création.
    pub hash: u32,
}

/// Fonction compilée : arité, nombre d'upvalues attendues par ses fermetures,
/// et son propre `Chunk`. Le nom est `None` pour le script de plus haut
/// niveau (affiché `<script>`).
#[derive(Debug, Clone)]
pub struct ObjFunction {
    pub arity: u8,
    pub upvalue_count: u32,
    pub chunk: Chunk,
    pub name: Option<ObjRef>,
}

impl ObjFunction {
    pub fn new(name: Option<ObjRef>) -> Self {
        Self {
            arity: 0,
            upvalue_count: 0,
            chunk: Chunk::new(),
            name,
        }
    }
}

/// Fonction native enregistrée sous un nom (utilisée pour l'affichage et le
/// placement dans la table des globales).
#[derive(Debug, Clone, Copy)]
pub struct ObjNative {
    pub name: ObjRef,
    pub function: NativeFn,
}

/// Emplacement d'un upvalue : tant qu'il est ouvert, il alias un slot vivant
/// de la pile d'évaluation (identifié par son index absolu) ; une fois
/// refermé, il possède sa propre copie de la valeur.
#[derive(Debug, Clone, Copy)]
pub enum UpvalueSlot {
    Open(usize),
    Closed,
}

#[derive(Debug, Clone)]
pub struct ObjUpvalue {
    pub slot: UpvalueSlot,
    /// Valeur possédée une fois l'upvalue refermé (`slot = Closed`). Ignorée
    /// tant que l'upvalue est ouvert.
    pub closed: Value,
}

impl ObjUpvalue {
    pub fn open(stack_index: usize) -> Self {
        Self {
            slot: UpvalueSlot::Open(stack_index),
            closed: Value::Nil,
        }
    }
}

/// Fermeture : une fonction compilée plus le tableau d'upvalues capturées à
/// sa création. `upvalues.len() == function.upvalue_count`.
#[derive(Debug, Clone)]
pub struct ObjClosure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

/// Classe : son nom et sa table de méthodes (nom → fermeture, stockée comme
/// `Value::Obj` pointant vers un `ObjClosure`).
#[derive(Debug, Clone)]
pub struct ObjClass {
    pub name: ObjRef,
    pub methods: Table,
}

impl ObjClass {
    pub fn new(name: ObjRef) -> Self {
        Self {
            name,
            methods: Table::new(),
        }
    }
}

/// Instance : référence vers sa classe et ses champs mutables.
#[derive(Debug, Clone)]
pub struct ObjInstance {
    pub class: ObjRef,
    pub fields: Table,
}

impl ObjInstance {
    pub fn new(class: ObjRef) -> Self {
        Self {
            class,
            fields: Table::new(),
        }
    }
}

/// Méthode liée : préserve `this` entre un accès de propriété et l'appel qui
/// suit (`obj.method()` n'alloue qu'un seul `BoundMethod`, `obj.method` sans
/// appel en alloue un qu'on peut stocker).
#[derive(Debug, Clone, Copy)]
pub struct ObjBoundMethod {
    pub receiver: Value,
    /// `ObjRef` vers un `ObjClosure`.
    pub method: ObjRef,
}

/// Un objet tas, quel que soit son type concret.
#[derive(Debug, Clone)]
pub enum Object {
    String(ObjString),
    Function(ObjFunction),
    Native(ObjNative),
    Upvalue(ObjUpvalue),
    Closure(ObjClosure),
    Class(ObjClass),
    Instance(ObjInstance),
    BoundMethod(ObjBoundMethod),
}

impl Object {
    /// Nom de type utilisé dans les messages d'erreur et le rendu `Debug`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Object::String(_) => "string",
            Object::Function(_) => "function",
            Object::Native(_) => "native",
            Object::Upvalue(_) => "upvalue",
            Object::Closure(_) => "closure",
            Object::Class(_) => "class",
            Object::Instance(_) => "instance",
            Object::BoundMethod(_) => "bound method",
        }
    }
}
