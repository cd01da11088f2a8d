//! natives.rs — Fonctions natives enregistrées au démarrage de la VM.
//!
//! Le langage n'expose qu'un seul natif (`clock`), les autres mécanismes
//! (enregistrement, signature `fn(&[Value]) -> Result<Value, String>`)
//! étant de la plomberie ambiante déjà prévue par [`vitte_core::NativeFn`].

use std::time::{SystemTime, UNIX_EPOCH};

use vitte_core::Value;

/// Secondes écoulées depuis l'époque Unix, en double précision — substitut
/// portable au `clock()/CLOCKS_PER_SEC` de la source d'origine (monotone en
/// pratique pour l'usage qu'en fait le langage : mesurer des durées entre
/// deux appels).
pub fn clock(_args: &[Value]) -> Result<Value, String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| "system clock before Unix epoch".to_string())?;
    Ok(Value::Number(now.as_secs_f64()))
}
