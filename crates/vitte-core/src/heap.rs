//! heap.rs — Arène d'objets et GC mark-sweep précis, tri-color.
//!
//! Les objets ne sont jamais déplacés ni référencés par pointeur brut : ils
//! vivent dans un `Vec<Option<Slot>>` et sont désignés par leur index
//! ([`ObjRef`]). La liste intrusive d'objets du GC de référence ("tous les
//! objets tas sont chaînés dans une liste unique possédée par la VM") est
//! donc simplement ce vecteur — parcourable dans son intégralité pour le
//! sweep, sans pointeur `next` explicite.
//!
//! Déclenchement : chaque allocation augmente `bytes_allocated` ; quand il
//! dépasse `next_gc`, l'appelant (la VM) déclenche un cycle via
//! [`Heap::collect_garbage`], qui reçoit l'ensemble des racines déjà
//! rassemblées (pile de valeurs, table des globales...). `next_gc` est
//! ensuite recalculé à `bytes_allocated * GC_HEAP_GROW_FACTOR`.

use crate::object::{
    NativeFn, ObjBoundMethod, ObjClass, ObjClosure, ObjFunction, ObjInstance, ObjNative, ObjRef,
    ObjString, ObjUpvalue, Object, UpvalueSlot,
};
use crate::table::Table;
use crate::value::Value;

/// Facteur de croissance du seuil de déclenchement après chaque collecte.
pub const GC_HEAP_GROW_FACTOR: usize = 2;
const INITIAL_NEXT_GC: usize = 1024 * 1024;

struct Slot {
    object: Object,
    marked: bool,
    size: usize,
}

pub struct Heap {
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
    /// Pool d'internement : clés = `ObjRef` de `ObjString`, valeurs ignorées
    /// (`Value::Nil`). Sert uniquement à dédupliquer par contenu.
    strings: Table,
    bytes_allocated: usize,
    next_gc: usize,
    /// Pile de travail tri-color ("gray stack") : objets connus atteignables
    /// dont les enfants n'ont pas encore été visités.
    gray: Vec<ObjRef>,
    /// Force une collecte à chaque allocation (tests).
    pub stress_gc: bool,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            strings: Table::new(),
            bytes_allocated: 0,
            next_gc: INITIAL_NEXT_GC,
            gray: Vec::new(),
            stress_gc: false,
        }
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn should_collect(&self) -> bool {
        self.stress_gc || self.bytes_allocated > self.next_gc
    }

    fn alloc_raw(&mut self, object: Object, size: usize) -> ObjRef {
        self.bytes_allocated += size;
        let slot = Some(Slot {
            object,
            marked: false,
            size,
        });
        if let Some(i) = self.free.pop() {
            self.slots[i as usize] = slot;
            ObjRef(i)
        } else {
            self.slots.push(slot);
            ObjRef((self.slots.len() - 1) as u32)
        }
    }

    // ----------------------------------------------------------------
    // Internement de chaînes
    // ----------------------------------------------------------------

    /// Internement déduplicant par (longueur, hash, octets), comme
    /// `findString`. Crée une nouvelle chaîne seulement si aucune entrée
    /// existante ne correspond.
    pub fn intern(&mut self, s: &str) -> ObjRef {
        let hash = fnv1a_hash(s.as_bytes());
        if let Some(existing) = Self::find_interned(&self.strings, &self.slots, s, hash) {
            return existing;
        }
        let size = std::mem::size_of::<ObjString>() + s.len();
        let obj_ref = self.alloc_raw(
            Object::String(ObjString {
                chars: s.into(),
                hash,
            }),
            size,
        );
        self.strings.set(obj_ref, hash, Value::Nil);
        obj_ref
    }

    fn find_interned(table: &Table, slots: &[Option<Slot>], target: &str, hash: u32) -> Option<ObjRef> {
        let cap = table.entries.len();
        if cap == 0 {
            return None;
        }
        let mut idx = (hash as usize) % cap;
        loop {
            let e = &table.entries[idx];
            match e.key {
                None if matches!(e.value, Value::Nil) => return None,
                None => {} // tombstone : continuer le sondage
                Some(k) => {
                    if e.hash == hash {
                        if let Some(Slot {
                            object: Object::String(s),
                            ..
                        }) = &slots[k.index()]
                        {
                            if s.chars.len() == target.len() && s.chars.as_ref() == target {
                                return Some(k);
                            }
                        }
                    }
                }
            }
            idx = (idx + 1) % cap;
        }
    }

    // ----------------------------------------------------------------
    // Allocation des autres types d'objets
    // ----------------------------------------------------------------

    pub fn alloc_function(&mut self, function: ObjFunction) -> ObjRef {
        let size = std::mem::size_of::<ObjFunction>() + function.chunk.code.len();
        self.alloc_raw(Object::Function(function), size)
    }

    pub fn alloc_native(&mut self, name: ObjRef, function: NativeFn) -> ObjRef {
        let size = std::mem::size_of::<ObjNative>();
        self.alloc_raw(Object::Native(ObjNative { name, function }), size)
    }

    pub fn alloc_upvalue(&mut self, upvalue: ObjUpvalue) -> ObjRef {
        let size = std::mem::size_of::<ObjUpvalue>();
        self.alloc_raw(Object::Upvalue(upvalue), size)
    }

    pub fn alloc_closure(&mut self, closure: ObjClosure) -> ObjRef {
        let size = std::mem::size_of::<ObjClosure>() + closure.upvalues.len() * std::mem::size_of::<ObjRef>();
        self.alloc_raw(Object::Closure(closure), size)
    }

    pub fn alloc_class(&mut self, class: ObjClass) -> ObjRef {
        let size = std::mem::size_of::<ObjClass>();
        self.alloc_raw(Object::Class(class), size)
    }

    pub fn alloc_instance(&mut self, instance: ObjInstance) -> ObjRef {
        let size = std::mem::size_of::<ObjInstance>();
        self.alloc_raw(Object::Instance(instance), size)
    }

    pub fn alloc_bound_method(&mut self, bound: ObjBoundMethod) -> ObjRef {
        let size = std::mem::size_of::<ObjBoundMethod>();
        self.alloc_raw(Object::BoundMethod(bound), size)
    }

    // ----------------------------------------------------------------
    // Accès
    // ----------------------------------------------------------------

    pub fn get(&self, r: ObjRef) -> &Object {
        &self
            .slots
            .get(r.index())
            .and_then(|s| s.as_ref())
            .expect("ObjRef invalide : objet déjà libéré ou jamais alloué")
            .object
    }

    fn get_mut(&mut self, r: ObjRef) -> &mut Object {
        &mut self
            .slots
            .get_mut(r.index())
            .and_then(|s| s.as_mut())
            .expect("ObjRef invalide : objet déjà libéré ou jamais alloué")
            .object
    }

    pub fn as_string(&self, r: ObjRef) -> &ObjString {
        match self.get(r) {
            Object::String(s) => s,
            other => panic!("attendu une chaîne, trouvé {}", other.kind_name()),
        }
    }

    pub fn as_function(&self, r: ObjRef) -> &ObjFunction {
        match self.get(r) {
            Object::Function(f) => f,
            other => panic!("attendu une fonction, trouvé {}", other.kind_name()),
        }
    }

    pub fn as_function_mut(&mut self, r: ObjRef) -> &mut ObjFunction {
        match self.get_mut(r) {
            Object::Function(f) => f,
            other => panic!("attendu une fonction, trouvé {}", other.kind_name()),
        }
    }

    pub fn as_native(&self, r: ObjRef) -> &ObjNative {
        match self.get(r) {
            Object::Native(n) => n,
            other => panic!("attendu un natif, trouvé {}", other.kind_name()),
        }
    }

    pub fn as_upvalue(&self, r: ObjRef) -> &ObjUpvalue {
        match self.get(r) {
            Object::Upvalue(u) => u,
            other => panic!("attendu un upvalue, trouvé {}", other.kind_name()),
        }
    }

    pub fn as_upvalue_mut(&mut self, r: ObjRef) -> &mut ObjUpvalue {
        match self.get_mut(r) {
            Object::Upvalue(u) => u,
            other => panic!("attendu un upvalue, trouvé {}", other.kind_name()),
        }
    }

    pub fn as_closure(&self, r: ObjRef) -> &ObjClosure {
        match self.get(r) {
            Object::Closure(c) => c,
            other => panic!("attendu une fermeture, trouvé {}", other.kind_name()),
        }
    }

    pub fn as_class(&self, r: ObjRef) -> &ObjClass {
        match self.get(r) {
            Object::Class(c) => c,
            other => panic!("attendu une classe, trouvé {}", other.kind_name()),
        }
    }

    pub fn as_class_mut(&mut self, r: ObjRef) -> &mut ObjClass {
        match self.get_mut(r) {
            Object::Class(c) => c,
            other => panic!("attendu une classe, trouvé {}", other.kind_name()),
        }
    }

    pub fn as_instance(&self, r: ObjRef) -> &ObjInstance {
        match self.get(r) {
            Object::Instance(i) => i,
            other => panic!("attendu une instance, trouvé {}", other.kind_name()),
        }
    }

    pub fn as_instance_mut(&mut self, r: ObjRef) -> &mut ObjInstance {
        match self.get_mut(r) {
            Object::Instance(i) => i,
            other => panic!("attendu une instance, trouvé {}", other.kind_name()),
        }
    }

    pub fn as_bound_method(&self, r: ObjRef) -> &ObjBoundMethod {
        match self.get(r) {
            Object::BoundMethod(b) => b,
            other => panic!("attendu une méthode liée, trouvé {}", other.kind_name()),
        }
    }

    /// Rendu canonique d'une valeur affichée par `print`.
    pub fn stringify(&self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(n),
            Value::Obj(r) => match self.get(r) {
                Object::String(s) => s.chars.to_string(),
                Object::Function(f) => match f.name {
                    Some(n) => format!("<fn {}>", self.as_string(n).chars),
                    None => "<script>".to_string(),
                },
                Object::Native(_) => "<native fn>".to_string(),
                Object::Closure(c) => self.stringify(Value::Obj(c.function)),
                Object::Upvalue(_) => "<upvalue>".to_string(),
                Object::Class(c) => self.as_string(c.name).chars.to_string(),
                Object::Instance(i) => format!("{} instance", self.as_string(self.as_class(i.class).name).chars),
                Object::BoundMethod(b) => self.stringify(Value::Obj(b.method)),
            },
        }
    }

    // ----------------------------------------------------------------
    // Collecte mark-sweep
    // ----------------------------------------------------------------

    pub fn mark_value(&mut self, v: Value) {
        if let Value::Obj(r) = v {
            self.mark_object(r);
        }
    }

    pub fn mark_object(&mut self, r: ObjRef) {
        let Some(slot) = self.slots.get_mut(r.index()).and_then(|s| s.as_mut()) else {
            return;
        };
        if slot.marked {
            return;
        }
        slot.marked = true;
        self.gray.push(r);
    }

    pub fn mark_table(&mut self, table: &Table) {
        let pairs: Vec<(ObjRef, Value)> = table.iter().collect();
        for (k, v) in pairs {
            self.mark_object(k);
            self.mark_value(v);
        }
    }

    /// Exécute un cycle complet : marque les racines fournies par
    /// l'appelant, trace la fermeture transitive, purge les chaînes
    /// internées devenues inatteignables puis balaie le tas.
    pub fn collect_garbage(&mut self, value_roots: impl IntoIterator<Item = Value>, table_roots: &[&Table]) {
        for v in value_roots {
            self.mark_value(v);
        }
        for t in table_roots {
            self.mark_table(t);
        }
        self.trace_references();
        self.remove_white_strings();
        self.sweep();
        self.next_gc = (self.bytes_allocated * GC_HEAP_GROW_FACTOR).max(INITIAL_NEXT_GC);
    }

    fn trace_references(&mut self) {
        while let Some(r) = self.gray.pop() {
            self.blacken_object(r);
        }
    }

    fn blacken_object(&mut self, r: ObjRef) {
        enum Children {
            None,
            Obj(ObjRef),
            Val(Value),
            Function { name: Option<ObjRef>, consts: Vec<Value> },
            Closure { function: ObjRef, upvalues: Vec<ObjRef> },
            Class,
            Instance,
            BoundMethod { receiver: Value, method: ObjRef },
        }
        let children = match &self.slots[r.index()].as_ref().unwrap().object {
            Object::String(_) => Children::None,
            Object::Native(n) => Children::Obj(n.name),
            Object::Upvalue(u) => Children::Val(u.closed),
            Object::Function(f) => Children::Function {
                name: f.name,
                consts: f.chunk.constants.clone(),
            },
            Object::Closure(c) => Children::Closure {
                function: c.function,
                upvalues: c.upvalues.clone(),
            },
            Object::Class(_) => Children::Class,
            Object::Instance(_) => Children::Instance,
            Object::BoundMethod(b) => Children::BoundMethod {
                receiver: b.receiver,
                method: b.method,
            },
        };
        match children {
            Children::None => {}
            Children::Obj(o) => self.mark_object(o),
            Children::Val(v) => self.mark_value(v),
            Children::Function { name, consts } => {
                if let Some(n) = name {
                    self.mark_object(n);
                }
                for c in consts {
                    self.mark_value(c);
                }
            }
            Children::Closure { function, upvalues } => {
                self.mark_object(function);
                for u in upvalues {
                    self.mark_object(u);
                }
            }
            Children::Class => {
                self.mark_object_field(r, |obj| match obj {
                    Object::Class(c) => Some(c.name),
                    _ => None,
                });
                let pairs = self.table_snapshot(r, |obj| match obj {
                    Object::Class(c) => Some(&c.methods),
                    _ => None,
                });
                for (k, v) in pairs {
                    self.mark_object(k);
                    self.mark_value(v);
                }
            }
            Children::Instance => {
                self.mark_object_field(r, |obj| match obj {
                    Object::Instance(i) => Some(i.class),
                    _ => None,
                });
                let pairs = self.table_snapshot(r, |obj| match obj {
                    Object::Instance(i) => Some(&i.fields),
                    _ => None,
                });
                for (k, v) in pairs {
                    self.mark_object(k);
                    self.mark_value(v);
                }
            }
            Children::BoundMethod { receiver, method } => {
                self.mark_value(receiver);
                self.mark_object(method);
            }
        }
    }

    fn mark_object_field(&mut self, r: ObjRef, extract: impl Fn(&Object) -> Option<ObjRef>) {
        if let Some(field) = extract(&self.slots[r.index()].as_ref().unwrap().object) {
            self.mark_object(field);
        }
    }

    fn table_snapshot(&self, r: ObjRef, extract: impl Fn(&Object) -> Option<&Table>) -> Vec<(ObjRef, Value)> {
        extract(&self.slots[r.index()].as_ref().unwrap().object)
            .map(|t| t.iter().collect())
            .unwrap_or_default()
    }

    /// Avant le sweep, retire du pool d'internement toute chaîne non
    /// marquée : sinon une recherche ultérieure (`findString`) pourrait
    /// renvoyer une clé qui va être libérée.
    fn remove_white_strings(&mut self) {
        let slots = &self.slots;
        for e in self.strings.entries.iter_mut() {
            if let Some(k) = e.key {
                let marked = slots.get(k.index()).and_then(|s| s.as_ref()).map(|s| s.marked).unwrap_or(false);
                if !marked {
                    e.key = None;
                    e.value = Value::Bool(true);
                }
            }
        }
    }

    fn sweep(&mut self) {
        for i in 0..self.slots.len() {
            if let Some(slot) = &mut self.slots[i] {
                if slot.marked {
                    slot.marked = false;
                } else {
                    let size = slot.size;
                    self.slots[i] = None;
                    self.free.push(i as u32);
                    self.bytes_allocated -= size;
                }
            }
        }
    }
}

/// Formatage `%g` d'un nombre pour `print`, au sens de `printf("%g", …)`
/// (`original_source/value.c`'s `printValue`) : 6 chiffres significatifs par
/// défaut, bascule en notation exponentielle hors de `[1e-4, 1e precision)`,
/// zéros de fin et point décimal superflu retirés.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    format_g(n, 6)
}

/// Rendu `%g` à `precision` chiffres significatifs (`precision >= 1`).
fn format_g(value: f64, precision: usize) -> String {
    if value == 0.0 {
        return if value.is_sign_negative() { "-0".to_string() } else { "0".to_string() };
    }
    let precision = precision.max(1);
    let negative = value.is_sign_negative();
    let magnitude = value.abs();

    // Arrondit d'abord à `precision` chiffres significatifs via la notation
    // exponentielle de Rust, pour en lire l'exposant décimal réel.
    let exp_form = format!("{:.*e}", precision - 1, magnitude);
    let (mantissa, exp_part) = exp_form.split_once('e').expect("scientific format always has an 'e'");
    let exponent: i32 = exp_part.parse().expect("exponent is an integer");

    let body = if exponent < -4 || exponent >= precision as i32 {
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{exp_sign}{:02}", trim_trailing_zeros(mantissa), exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_trailing_zeros(&format!("{magnitude:.decimals$}"))
    };

    if negative {
        format!("-{body}")
    } else {
        body
    }
}

/// Retire les zéros de fin d'une partie fractionnaire (et le point décimal
/// devenu superflu), comme `%g` le fait en l'absence du drapeau `#`.
fn trim_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// FNV-1a 32 bits, utilisé pour hacher les chaînes internées.
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}
