//! table.rs — table de hachage à adressage ouvert pour les clés internées.
//!
//! Sondage linéaire, tombstones, facteur de charge ≤ 0.75 (rehash ×2 sinon).
//! Les clés sont toujours des `ObjRef` vers des chaînes internées ; le hash
//! est fourni par l'appelant (déjà calculé et mis en cache sur l'`ObjString`
//! au moment de l'internement), ce qui évite à cette structure de dépendre
//! du tas pour les opérations courantes (globales, champs, méthodes).
//!
//! La déduplication des chaînes elles-mêmes (`findString`) compare en
//! revanche le contenu et vit dans [`crate::heap`], seul endroit qui a
//! accès simultanément à la table et aux octets des chaînes.

use crate::object::ObjRef;
use crate::value::Value;

const MAX_LOAD_FACTOR: f64 = 0.75;
const INITIAL_CAPACITY: usize = 8;

#[derive(Clone, Copy)]
pub(crate) struct Entry {
    pub(crate) key: Option<ObjRef>,
    pub(crate) hash: u32,
    pub(crate) value: Value,
}

impl Default for Entry {
    fn default() -> Self {
        Entry {
            key: None,
            hash: 0,
            value: Value::Nil,
        }
    }
}

/// Un slot vide a `value == Nil` ; un tombstone (entrée supprimée) a
/// `value == Bool(true)`. Les deux ont `key == None`.
fn is_tombstone(e: &Entry) -> bool {
    e.key.is_none() && matches!(e.value, Value::Bool(true))
}

#[derive(Default, Clone)]
pub struct Table {
    pub(crate) entries: Vec<Entry>,
    pub(crate) count: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nombre d'entrées occupées (tombstones compris, comme dans
    /// l'implémentation de référence — cela maintient les garanties de
    /// terminaison du sondage linéaire).
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn find_slot(entries: &[Entry], key: ObjRef, hash: u32) -> usize {
        let cap = entries.len();
        let mut idx = (hash as usize) % cap;
        let mut tombstone: Option<usize> = None;
        loop {
            let e = &entries[idx];
            match e.key {
                None if is_tombstone(e) => {
                    if tombstone.is_none() {
                        tombstone = Some(idx);
                    }
                }
                None => return tombstone.unwrap_or(idx),
                Some(k) if k == key => return idx,
                _ => {}
            }
            idx = (idx + 1) % cap;
        }
    }

    fn grow(&mut self, new_capacity: usize) {
        let mut new_entries = vec![Entry::default(); new_capacity];
        let mut new_count = 0;
        for e in self.entries.iter() {
            if let Some(k) = e.key {
                let idx = Self::find_slot(&new_entries, k, e.hash);
                new_entries[idx] = Entry {
                    key: Some(k),
                    hash: e.hash,
                    value: e.value,
                };
                new_count += 1;
            }
        }
        self.entries = new_entries;
        self.count = new_count;
    }

    pub fn get(&self, key: ObjRef, hash: u32) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = Self::find_slot(&self.entries, key, hash);
        self.entries[idx].key.map(|_| self.entries[idx].value)
    }

    /// Insère ou met à jour `key`. Renvoie `true` si la clé était absente.
    pub fn set(&mut self, key: ObjRef, hash: u32, value: Value) -> bool {
        if self.count + 1 > (self.capacity() as f64 * MAX_LOAD_FACTOR) as usize {
            let new_cap = if self.capacity() == 0 {
                INITIAL_CAPACITY
            } else {
                self.capacity() * 2
            };
            self.grow(new_cap);
        }
        let idx = Self::find_slot(&self.entries, key, hash);
        let is_new_key = self.entries[idx].key.is_none();
        // Réutiliser un tombstone n'augmente pas le compte ; seule une
        // insertion dans un slot réellement vide le fait.
        if is_new_key && matches!(self.entries[idx].value, Value::Nil) {
            self.count += 1;
        }
        self.entries[idx] = Entry {
            key: Some(key),
            hash,
            value,
        };
        is_new_key
    }

    /// Supprime `key`, laissant un tombstone. Renvoie `false` si la clé
    /// n'était pas présente.
    pub fn delete(&mut self, key: ObjRef, hash: u32) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let idx = Self::find_slot(&self.entries, key, hash);
        if self.entries[idx].key.is_none() {
            return false;
        }
        self.entries[idx] = Entry {
            key: None,
            hash: 0,
            value: Value::Bool(true),
        };
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.entries.iter().filter_map(|e| e.key.map(|k| (k, e.value)))
    }

    /// Copie toutes les entrées de `src` dans `self` — utilisé par
    /// `OP_INHERIT` pour faire hériter une sous-classe des méthodes de son
    /// parent.
    pub fn copy_from(&mut self, src: &Table) {
        for e in src.entries.iter() {
            if let Some(k) = e.key {
                self.set(k, e.hash, e.value);
            }
        }
    }
}
