//! Codec de posición.
//!
//! Formato: `<entry1>/<entry2>/...:<call1>/<call2>/...`. Los entry points
//! conservan el orden de primera llegada; las llamadas se emiten ordenadas
//! (vienen de un `BTreeSet`) para que dos instancias con el mismo estado
//! produzcan exactamente el mismo string.
//!
//! No hay escapado: un identificador vacío o que contenga `/` o `:` se
//! rechaza tanto al codificar como al decodificar.
use std::collections::BTreeSet;

use indexmap::IndexSet;

use crate::constants::{GROUP_SEPARATOR, ITEM_SEPARATOR};
use crate::errors::CodecError;

/// `true` si el identificador puede viajar en un fingerprint.
pub fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty() && !id.contains(GROUP_SEPARATOR) && !id.contains(ITEM_SEPARATOR)
}

fn join<'a, I>(items: I) -> Result<String, CodecError>
    where I: IntoIterator<Item = &'a String>
{
    let mut out = String::new();
    for (i, item) in items.into_iter().enumerate() {
        if !is_valid_identifier(item) {
            return Err(CodecError::InvalidIdentifier(item.clone()));
        }
        if i > 0 {
            out.push(ITEM_SEPARATOR);
        }
        out.push_str(item);
    }
    Ok(out)
}

/// Codifica `(entry points alcanzados, llamadas ejecutadas)` en un fingerprint.
pub fn encode(reached: &IndexSet<String>, calls: &BTreeSet<String>) -> Result<String, CodecError> {
    let entries = join(reached)?;
    let calls = join(calls)?;
    Ok(format!("{entries}{GROUP_SEPARATOR}{calls}"))
}

fn split_side(fingerprint: &str, side: &str) -> Result<Vec<String>, CodecError> {
    if side.is_empty() {
        return Ok(Vec::new());
    }
    side.split(ITEM_SEPARATOR)
        .map(|s| {
            if s.is_empty() {
                Err(CodecError::EmptySegment(fingerprint.to_string()))
            } else if !is_valid_identifier(s) {
                Err(CodecError::InvalidIdentifier(s.to_string()))
            } else {
                Ok(s.to_string())
            }
        })
        .collect()
}

/// Decodifica un fingerprint.
///
/// Se parte en el primer `:`; un lado ausente o vacío es un conjunto vacío.
/// Un fingerprint sin `:` se interpreta como sólo entry points. Un segundo
/// `:` deja un identificador que `encode` no podría emitir, así que se
/// rechaza aquí.
pub fn decode(fingerprint: &str) -> Result<(IndexSet<String>, BTreeSet<String>), CodecError> {
    let (entries, calls) = match fingerprint.split_once(GROUP_SEPARATOR) {
        Some((e, c)) => (e, c),
        None => (fingerprint, ""),
    };
    let reached: IndexSet<String> = split_side(fingerprint, entries)?.into_iter().collect();
    let executed: BTreeSet<String> = split_side(fingerprint, calls)?.into_iter().collect();
    Ok((reached, executed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(items: &[&str]) -> IndexSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn calls(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn encode_matches_documented_format() {
        let fp = encode(&entries(&["b", "a"]), &calls(&["send_mail", "charge"])).unwrap();
        assert_eq!(fp, "b/a:charge/send_mail");
    }

    #[test]
    fn empty_state_encodes_to_lone_colon() {
        assert_eq!(encode(&entries(&[]), &calls(&[])).unwrap(), ":");
        let (r, c) = decode(":").unwrap();
        assert!(r.is_empty() && c.is_empty());
    }

    #[test]
    fn calls_only_fingerprint() {
        let (r, c) = decode(":grant_access").unwrap();
        assert!(r.is_empty());
        assert_eq!(c, calls(&["grant_access"]));
    }

    #[test]
    fn missing_colon_means_entries_only() {
        let (r, c) = decode("a/b").unwrap();
        assert_eq!(r, entries(&["a", "b"]));
        assert!(c.is_empty());
        let (r, c) = decode("").unwrap();
        assert!(r.is_empty() && c.is_empty());
    }

    #[test]
    fn decode_preserves_entry_order_and_splits_on_first_colon() {
        let (r, _) = decode("zeta/alpha/mid:x").unwrap();
        let order: Vec<&str> = r.iter().map(|s| s.as_str()).collect();
        assert_eq!(order, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn second_colon_is_rejected_on_decode() {
        assert_eq!(decode("a:b:c"), Err(CodecError::InvalidIdentifier("b:c".into())));
        assert_eq!(decode(":x/b:c"), Err(CodecError::InvalidIdentifier("b:c".into())));
    }

    #[test]
    fn round_trip_keeps_both_groups() {
        let r = entries(&["start_review", "approve", "ship"]);
        let c = calls(&["notify", "charge_card", "__workflow_finished__"]);
        let (r2, c2) = decode(&encode(&r, &c).unwrap()).unwrap();
        assert_eq!(r2, r);
        assert_eq!(c2, c);
        assert!(r2.iter().eq(r.iter()));
    }

    #[test]
    fn separators_in_identifiers_are_rejected() {
        assert_eq!(encode(&entries(&["a/b"]), &calls(&[])),
                   Err(CodecError::InvalidIdentifier("a/b".into())));
        assert_eq!(encode(&entries(&[]), &calls(&["x:y"])),
                   Err(CodecError::InvalidIdentifier("x:y".into())));
        assert!(encode(&entries(&[""]), &calls(&[])).is_err());
    }

    #[test]
    fn empty_segments_are_malformed() {
        assert_eq!(decode("a//b:"), Err(CodecError::EmptySegment("a//b:".into())));
        assert!(decode(":x/").is_err());
    }
}
