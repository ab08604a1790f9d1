//! Fuzzy `@token` persona resolution.
//!
//! Maintains a lookup built from mention id, full name, and first name, all
//! normalized by lowercasing and stripping punctuation/underscores. On
//! ambiguity, declaration order wins. No free-form LLM name matching.

use crate::entities::Persona;

/// Normalize a candidate string for matching: lowercase, drop underscores
/// and ASCII punctuation.
fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_ascii_punctuation() || *c == ' ')
        .collect::<String>()
        .replace('_', " ")
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract the first `@token` from `text`, if any. A token runs until the
/// next whitespace character.
pub fn extract_mention(text: &str) -> Option<&str> {
    let at = text.find('@')?;
    let rest = &text[at + 1..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let token = &rest[..end];
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Resolve a mention token against a declaration-ordered persona slice.
/// Matches against mention id, full name, and first name, all normalized.
/// The first persona (in declaration order) whose any of those three forms
/// normalizes equal to the normalized token wins.
pub fn resolve_mention<'a>(token: &str, personas: &'a [Persona]) -> Option<&'a Persona> {
    let needle = normalize(token);
    if needle.is_empty() {
        return None;
    }
    personas.iter().find(|p| {
        let mention_id = normalize(&p.mention_id());
        let full_name = normalize(&p.name);
        let first_name = normalize(p.name.split_whitespace().next().unwrap_or(""));
        needle == mention_id || needle == full_name || needle == first_name
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn persona(name: &str) -> Persona {
        Persona {
            id: Uuid::new_v4(),
            scenario_id: Uuid::new_v4(),
            name: name.to_string(),
            role: "role".into(),
            background: String::new(),
            correlation: String::new(),
            primary_goals: vec![],
            personality_traits: HashMap::new(),
        }
    }

    #[test]
    fn extracts_mention_token() {
        assert_eq!(extract_mention("@cfo good morning"), Some("cfo"));
        assert_eq!(extract_mention("hello @isabel"), Some("isabel"));
        assert_eq!(extract_mention("no mention here"), None);
    }

    #[test]
    fn resolves_by_mention_id() {
        let personas = vec![persona("CFO Dana")];
        let resolved = resolve_mention("cfo_dana", &personas).unwrap();
        assert_eq!(resolved.name, "CFO Dana");
    }

    #[test]
    fn resolves_fuzzy_with_unicode_and_punctuation() {
        let personas = vec![persona("Isabel Díaz")];
        let resolved = resolve_mention("isabel", &personas).unwrap();
        assert_eq!(resolved.name, "Isabel Díaz");
    }

    #[test]
    fn ambiguity_resolves_to_declaration_order() {
        let personas = vec![persona("Alex Smith"), persona("Alex Jones")];
        let resolved = resolve_mention("alex", &personas).unwrap();
        assert_eq!(resolved.name, "Alex Smith");
    }

    #[test]
    fn unknown_token_resolves_to_none() {
        let personas = vec![persona("CFO Dana")];
        assert!(resolve_mention("nobody", &personas).is_none());
    }
}
