//! Fixed lookup tables used by query rewriting and ranking.
//!
//! These are data, not behavior: typo corrections, brand nicknames, stop words,
//! the brand dictionary and the terms offered as spelling suggestions. Scoring
//! code reaches them only through [`Lexicon`], so a deployment can extend the
//! built-in tables without touching the ranking logic.

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;

use crate::config::LexiconExtras;

/// Common misspellings, keyed by the misspelled (lowercase) form.
const TYPO_CORRECTIONS: &[(&str, &str)] = &[
    ("savage", "sauvage"),
    ("sauvge", "sauvage"),
    ("suavage", "sauvage"),
    ("sauvag", "sauvage"),
    ("aventis", "aventus"),
    ("aventos", "aventus"),
    ("adventus", "aventus"),
    ("erros", "eros"),
    ("versache", "versace"),
    ("versase", "versace"),
    ("channel", "chanel"),
    ("chanell", "chanel"),
    ("armany", "armani"),
    ("giorgo", "giorgio"),
    ("aqua", "acqua"),
    ("guerlan", "guerlain"),
    ("tobaco", "tobacco"),
    ("vanile", "vanille"),
    ("layten", "layton"),
    ("invictis", "invictus"),
    ("spicebom", "spicebomb"),
    ("khamra", "khamrah"),
    ("bacarat", "baccarat"),
    ("baccarrat", "baccarat"),
    ("kurkdjan", "kurkdjian"),
    ("gaultiere", "gaultier"),
    ("gautier", "gaultier"),
];

/// Brand abbreviations and fragrance nicknames, expanded to canonical forms.
const NICKNAMES: &[(&str, &str)] = &[
    ("ysl", "yves saint laurent"),
    ("tf", "tom ford"),
    ("adg", "acqua di gio"),
    ("bdc", "bleu de chanel"),
    ("jpg", "jean paul gaultier"),
    ("pdm", "parfums de marly"),
    ("mfk", "maison francis kurkdjian"),
    ("br540", "baccarat rouge 540"),
    ("d&g", "dolce & gabbana"),
    ("dg", "dolce & gabbana"),
    ("ck", "calvin klein"),
    ("cdnim", "club de nuit intense man"),
    ("gia", "giorgio armani"),
    ("lv", "louis vuitton"),
    ("mm", "maison margiela"),
    ("git", "green irish tweed"),
];

/// Articles, prepositions and words common to nearly every product name.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "of", "by", "for", "and", "in", "on", "at", "to", "with", "de", "la", "le",
    "du", "des", "di", "eau", "parfum", "toilette", "cologne", "edp", "edt", "extrait", "men",
    "women", "man", "woman", "unisex", "pour", "homme", "femme", "him", "her",
];

const BRANDS: &[&str] = &[
    "Dior", "Chanel", "Creed", "Versace", "Giorgio Armani", "Yves Saint Laurent", "Tom Ford",
    "Jean Paul Gaultier", "Parfums de Marly", "Maison Francis Kurkdjian", "Le Labo", "Hermes",
    "Calvin Klein", "Dolce & Gabbana", "Prada", "Paco Rabanne", "Viktor & Rolf", "Mugler",
    "Guerlain", "Rasasi", "Armaf", "Lattafa", "Gucci", "Burberry", "Hugo Boss", "Montblanc",
    "Azzaro", "Givenchy", "Valentino", "Carolina Herrera", "Lancome", "Byredo", "Kilian",
    "Xerjoff", "Amouage", "Initio", "Nishane", "Maison Margiela", "Jo Malone", "Louis Vuitton",
];

/// Frequently searched brand and fragrance words offered as suggestions.
const COMMON_TERMS: &[&str] = &[
    "sauvage", "aventus", "eros", "bleu", "chanel", "dior", "creed", "versace", "armani",
    "acqua", "tobacco", "vanille", "oud", "baccarat", "santal", "layton", "invictus", "million",
    "spicebomb", "libre", "tom ford", "gaultier", "khamrah", "shalimar",
];

static BUILTIN: Lazy<Lexicon> = Lazy::new(Lexicon::new);

/// Named lookup interface over the fixed tables.
#[derive(Debug, Clone)]
pub struct Lexicon {
    corrections: HashMap<String, String>,
    nicknames: HashMap<String, String>,
    stop_words: HashSet<String>,
    brands: Vec<String>,
    common_terms: Vec<String>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexicon {
    /// Lexicon populated from the built-in tables.
    pub fn new() -> Self {
        let pairs = |table: &[(&str, &str)]| {
            table.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<HashMap<_, _>>()
        };
        Self {
            corrections: pairs(TYPO_CORRECTIONS),
            nicknames: pairs(NICKNAMES),
            stop_words: STOP_WORDS.iter().map(|s| s.to_string()).collect(),
            brands: BRANDS.iter().map(|s| s.to_string()).collect(),
            common_terms: COMMON_TERMS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Shared instance of the built-in tables.
    pub fn builtin() -> &'static Lexicon {
        &BUILTIN
    }

    pub fn with_correction(mut self, misspelled: &str, correct: &str) -> Self {
        self.corrections.insert(misspelled.to_lowercase(), correct.to_lowercase());
        self
    }

    pub fn with_nickname(mut self, nickname: &str, expansion: &str) -> Self {
        self.nicknames.insert(nickname.to_lowercase(), expansion.to_lowercase());
        self
    }

    pub fn with_stop_word(mut self, word: &str) -> Self {
        self.stop_words.insert(word.to_lowercase());
        self
    }

    pub fn with_brand(mut self, brand: &str) -> Self {
        if !self.brands.iter().any(|b| b.eq_ignore_ascii_case(brand)) {
            self.brands.push(brand.to_string());
        }
        self
    }

    /// Apply configured additions on top of this lexicon.
    pub fn extended(self, extras: &LexiconExtras) -> Self {
        let mut lexicon = self;
        for (misspelled, correct) in &extras.corrections {
            lexicon = lexicon.with_correction(misspelled, correct);
        }
        for (nickname, expansion) in &extras.nicknames {
            lexicon = lexicon.with_nickname(nickname, expansion);
        }
        for word in &extras.stop_words {
            lexicon = lexicon.with_stop_word(word);
        }
        for brand in &extras.brands {
            lexicon = lexicon.with_brand(brand);
        }
        lexicon
    }

    /// Corrected form of a lowercase word or phrase, if it is a known misspelling.
    pub fn correction(&self, text: &str) -> Option<&str> {
        self.corrections.get(text).map(String::as_str)
    }

    /// Canonical expansion of a lowercase nickname or abbreviation.
    pub fn expansion(&self, text: &str) -> Option<&str> {
        self.nicknames.get(text).map(String::as_str)
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }

    pub fn brands(&self) -> &[String] {
        &self.brands
    }

    pub fn common_terms(&self) -> &[String] {
        &self.common_terms
    }

    /// Nickname table in the shape the remote engine's synonym setting expects.
    pub fn synonyms(&self) -> BTreeMap<String, Vec<String>> {
        self.nicknames
            .iter()
            .map(|(nick, canonical)| (nick.clone(), vec![canonical.clone()]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_corrections() {
        let lexicon = Lexicon::builtin();
        assert_eq!(lexicon.correction("savage"), Some("sauvage"));
        assert_eq!(lexicon.correction("aventis"), Some("aventus"));
        assert_eq!(lexicon.correction("sauvage"), None);
    }

    #[test]
    fn test_builtin_nicknames() {
        let lexicon = Lexicon::builtin();
        assert_eq!(lexicon.expansion("ysl"), Some("yves saint laurent"));
        assert_eq!(lexicon.expansion("tf"), Some("tom ford"));
        assert_eq!(lexicon.expansion("adg"), Some("acqua di gio"));
    }

    #[test]
    fn test_stop_words_cover_generic_fragrance_words() {
        let lexicon = Lexicon::builtin();
        for word in ["eau", "parfum", "toilette", "men", "women", "unisex", "the", "of"] {
            assert!(lexicon.is_stop_word(word), "{word} should be a stop word");
        }
        assert!(!lexicon.is_stop_word("sauvage"));
    }

    #[test]
    fn test_extension_does_not_touch_builtin() {
        let custom = Lexicon::new().with_correction("Sovage", "Sauvage").with_brand("Zara");
        assert_eq!(custom.correction("sovage"), Some("sauvage"));
        assert!(custom.brands().iter().any(|b| b == "Zara"));
        assert_eq!(Lexicon::builtin().correction("sovage"), None);
    }

    #[test]
    fn test_extended_from_config() {
        let mut extras = LexiconExtras::default();
        extras.corrections.insert("Sovaj".into(), "Sauvage".into());
        extras.nicknames.insert("pdm".into(), "parfums de marly".into());
        extras.stop_words.push("Cologne".into());
        let lexicon = Lexicon::new().extended(&extras);
        assert_eq!(lexicon.correction("sovaj"), Some("sauvage"));
        assert_eq!(lexicon.expansion("pdm"), Some("parfums de marly"));
        assert!(lexicon.is_stop_word("cologne"));
        assert_eq!(lexicon.correction("savage"), Some("sauvage"));
    }

    #[test]
    fn test_with_brand_ignores_duplicates() {
        let before = Lexicon::new().brands().len();
        let after = Lexicon::new().with_brand("dior").brands().len();
        assert_eq!(before, after);
    }

    #[test]
    fn test_synonyms_shape() {
        let synonyms = Lexicon::builtin().synonyms();
        assert_eq!(synonyms.get("ysl"), Some(&vec!["yves saint laurent".to_string()]));
    }
}
