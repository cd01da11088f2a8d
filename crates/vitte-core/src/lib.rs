//! vitte-core — Cœur du langage Vitte : modèle de valeurs, objets tas,
//! format de bytecode et tas garbage-collecté.
//!
//! Ce crate ne sait ni lexer ni parser : il fournit les briques que
//! `vitte-compiler` remplit (via [`chunk::Chunk`]) et que `vitte-vm`
//! exécute. Il ne connaît pas non plus la notion de pile d'évaluation ou de
//! frame d'appel — ce sont des concepts VM, pas des concepts de valeur.
//!
//! ## Modules
//! - [`value`] : la valeur dynamique `nil | bool | nombre | objet`.
//! - [`object`] : la hiérarchie des objets tas (chaînes, fonctions,
//!   fermetures, classes, instances, méthodes liées, upvalues).
//! - [`chunk`] : le format `Chunk` (bytecode + lignes + constantes).
//! - [`table`] : table de hachage à adressage ouvert (globales, champs,
//!   méthodes).
//! - [`heap`] : l'arène d'objets et le GC mark-sweep tri-color.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]

pub mod chunk;
pub mod heap;
pub mod object;
pub mod table;
pub mod value;

pub use chunk::{disassemble_chunk, disassemble_instruction, Chunk, OpCode, MAX_CONSTANTS};
pub use heap::{fnv1a_hash, Heap, GC_HEAP_GROW_FACTOR};
pub use object::{
    NativeFn, ObjBoundMethod, ObjClass, ObjClosure, ObjFunction, ObjInstance, ObjNative, ObjRef,
    ObjString, ObjUpvalue, Object, UpvalueSlot,
};
pub use table::Table;
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates_identical_strings() {
        let mut heap = Heap::new();
        let a = heap.intern("hello");
        let b = heap.intern("hello");
        assert_eq!(a, b);
        let c = heap.intern("world");
        assert_ne!(a, c);
    }

    #[test]
    fn table_survives_tombstones_and_growth() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let keys: Vec<ObjRef> = (0..20).map(|i| heap.intern(&format!("key{i}"))).collect();
        for (i, k) in keys.iter().enumerate() {
            let hash = heap.as_string(*k).hash;
            assert!(table.set(*k, hash, Value::Number(i as f64)));
        }
        // Supprime la moitié, laissant des tombstones.
        for k in keys.iter().step_by(2) {
            let hash = heap.as_string(*k).hash;
            assert!(table.delete(*k, hash));
        }
        for (i, k) in keys.iter().enumerate() {
            let hash = heap.as_string(*k).hash;
            if i % 2 == 0 {
                assert_eq!(table.get(*k, hash), None);
            } else {
                assert_eq!(table.get(*k, hash), Some(Value::Number(i as f64)));
            }
        }
    }

    #[test]
    fn gc_reclaims_unreachable_strings() {
        let mut heap = Heap::new();
        let garbage = heap.intern("temporary");
        assert_eq!(heap.as_string(garbage).chars.as_ref(), "temporary");
        heap.collect_garbage(std::iter::empty(), &[]);
        // Plus aucune racine ne protège `garbage` : une nouvelle chaîne
        // identique doit être réallouée (et non retrouvée dans le pool).
        let reinterned = heap.intern("temporary");
        assert_eq!(heap.as_string(reinterned).chars.as_ref(), "temporary");
    }

    #[test]
    fn gc_keeps_rooted_values_alive() {
        let mut heap = Heap::new();
        let kept = heap.intern("kept");
        heap.collect_garbage([Value::Obj(kept)], &[]);
        assert_eq!(heap.as_string(kept).chars.as_ref(), "kept");
    }

    #[test]
    fn value_equality_matches_spec_rules() {
        assert_eq!(Value::Nil, Value::Nil);
        assert_eq!(Value::Bool(true), Value::Bool(true));
        assert_ne!(Value::Bool(true), Value::Bool(false));
        let nan = Value::Number(f64::NAN);
        assert_ne!(nan, nan);
        assert_eq!(Value::Number(1.0), Value::Number(1.0));
    }
}
