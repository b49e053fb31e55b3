//! Bibliography entries and their presentation.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE_WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref RE_SENTENCE_END: Regex = Regex::new(r"[.!?]").unwrap();
}

/// One bibliographic record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibEntry {
    pub key: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<String>,
    /// File name or remote source the entry was listed from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub origin: String,
}

impl BibEntry {
    pub fn new(key: impl Into<String>, entry_type: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        Self {
            key: key.into(),
            entry_type: entry_type.into(),
            fields,
            ..Default::default()
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// BibTeX source of the entry, fields sorted by name
    pub fn to_bibtex(&self) -> String {
        let mut item = format!("\n@{}{{{}", self.entry_type.to_lowercase(), self.key);
        for (name, value) in &self.fields {
            if is_number(value) {
                item.push_str(&format!(",\n\t{name} = {value}"));
            } else {
                item.push_str(&format!(",\n\t{name} = {{{value}}}"));
            }
        }
        item.push_str("\n}\n");
        item
    }

    /// [`BibEntry::to_bibtex`] without any whitespace, for comparisons
    pub fn to_plain(&self) -> String {
        RE_WHITESPACE.replace_all(&self.to_bibtex(), "").into_owned()
    }

    /// Presentation strings, one per format.
    ///
    /// Placeholders: `{key}`, `{type}`, `{author}`, `{sauthor}`,
    /// `{journal}`, `{title}`, `{stitle}`, `{year}`, `{origin}`. Missing
    /// fields render as `None`.
    pub fn panel_lines(&self, formats: &[String]) -> Vec<String> {
        let none = || "None".to_string();
        let author = self.field("author").map(|a| a.trim_matches(|c| c == ' ' || c == ',').to_string());
        let short_author = self.field("author").map(|a| {
            if a.matches("and").count() > 1 {
                format!("{} et al.", a.split(',').next().unwrap_or(a))
            } else {
                a.trim_matches(|c| c == ' ' || c == ',').to_string()
            }
        });
        let short_title = self
            .field("title")
            .map(|t| RE_SENTENCE_END.split(t).next().unwrap_or(t).to_string());

        let values = [
            ("key", self.key.clone()),
            ("type", self.entry_type.clone()),
            ("author", author.unwrap_or_else(none)),
            ("sauthor", short_author.unwrap_or_else(none)),
            ("journal", self.field("journal").map(str::to_string).unwrap_or_else(none)),
            ("title", self.field("title").map(str::to_string).unwrap_or_else(none)),
            ("stitle", short_title.unwrap_or_else(none)),
            ("year", self.field("year").map(str::to_string).unwrap_or_else(none)),
            ("origin", self.origin.clone()),
        ];
        formats.iter().map(|f| fill_placeholders(f, &values)).collect()
    }
}

fn is_number(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// Replace every `{name}` in `template` with its value
pub fn fill_placeholders(template: &str, values: &[(&str, String)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |acc, (name, value)| acc.replace(&format!("{{{name}}}"), value))
}

/// `a`..`z`, then `aa`, `ab`, ... for the n-th repeat (1-based)
fn repeat_suffix(mut n: u32) -> String {
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'a' + (n % 26) as u8));
        n /= 26;
    }
    letters.iter().rev().collect()
}

/// Keys for presentation: repeated keys get `a`, `b`, ... in listing order.
///
/// The first occurrence keeps its key unchanged.
pub fn disambiguate_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<&str, u32> = HashMap::new();
    keys.into_iter()
        .map(|key| {
            let count = seen.entry(key).or_insert(0);
            let presented = match *count {
                0 => key.to_string(),
                n => format!("{key}{}", repeat_suffix(n)),
            };
            *count += 1;
            presented
        })
        .collect()
}

/// Lowercase and fold common accented letters to ASCII
pub fn tidy_accents(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        match c {
            'ä' | 'æ' => folded.push_str("ae"),
            'ö' | 'œ' => folded.push_str("oe"),
            'ü' => folded.push_str("ue"),
            'à' | 'á' | 'â' | 'ã' | 'å' => folded.push('a'),
            'ç' => folded.push('c'),
            'è' | 'é' | 'ê' | 'ë' => folded.push('e'),
            'ì' | 'í' | 'î' | 'ï' => folded.push('i'),
            'ñ' => folded.push('n'),
            'ò' | 'ó' | 'ô' | 'õ' => folded.push('o'),
            'ù' | 'ú' | 'û' => folded.push('u'),
            'ý' | 'ÿ' => folded.push('y'),
            c => folded.push(c),
        }
    }
    folded
}

/// Keep ASCII letters, digits, `?` and `_` of the decomposed key
pub fn validate_citekey(key: &str) -> String {
    key.nfkd()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '?' || *c == '_')
        .collect()
}

/// First letter of each word upper case, the rest lower case
pub fn title_case(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut word_start = true;
    for c in text.chars() {
        if c.is_alphabetic() {
            if word_start {
                result.extend(c.to_uppercase());
            } else {
                result.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            result.push(c);
            word_start = true;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry() -> BibEntry {
        BibEntry::new(
            "knuth84",
            "Book",
            BTreeMap::from([
                ("title".to_string(), "The TeXbook. A guide".to_string()),
                ("author".to_string(), "Knuth, Donald E.".to_string()),
                ("year".to_string(), "1984".to_string()),
            ]),
        )
        .with_origin("refs.bib")
    }

    #[test]
    fn test_to_bibtex() {
        assert_eq!(
            entry().to_bibtex(),
            "\n@book{knuth84,\n\tauthor = {Knuth, Donald E.},\n\ttitle = {The TeXbook. A guide},\n\tyear = 1984\n}\n"
        );
        assert_eq!(
            entry().to_plain(),
            "@book{knuth84,author={Knuth,DonaldE.},title={TheTeXbook.Aguide},year=1984}"
        );
    }

    #[test]
    fn test_panel_lines() {
        let formats = vec![
            "{key}: {title}".to_string(),
            "#{type} by {sauthor} ({year}) {stitle} [{journal}] {origin}".to_string(),
        ];
        assert_eq!(
            entry().panel_lines(&formats),
            vec![
                "knuth84: The TeXbook. A guide".to_string(),
                "#Book by Knuth, Donald E. (1984) The TeXbook [None] refs.bib".to_string(),
            ]
        );
    }

    #[test]
    fn test_short_author_with_many_authors() {
        let mut many = entry();
        many.fields
            .insert("author".to_string(), "Doe, J. and Roe, R. and Poe, E.".to_string());
        assert_eq!(many.panel_lines(&["{sauthor}".to_string()]), vec!["Doe et al.".to_string()]);
    }

    #[test]
    fn test_disambiguate_keys() {
        let keys = ["smith2020", "doe2019", "smith2020", "smith2020"];
        assert_eq!(
            disambiguate_keys(keys),
            vec!["smith2020", "doe2019", "smith2020a", "smith2020b"]
        );
        assert_eq!(keys[2], "smith2020");
    }

    #[test]
    fn test_disambiguate_many_repeats_stay_unique() {
        let keys = vec!["k"; 30];
        let presented = disambiguate_keys(keys);
        assert_eq!(presented[1], "ka");
        assert_eq!(presented[26], "kz");
        assert_eq!(presented[27], "kaa");
        assert_eq!(presented[28], "kab");
        let unique: std::collections::HashSet<&String> = presented.iter().collect();
        assert_eq!(unique.len(), presented.len());
    }

    #[test]
    fn test_key_helpers() {
        assert_eq!(tidy_accents("Müller"), "mueller");
        assert_eq!(validate_citekey("Gödel 1931?"), "Godel1931?");
        assert_eq!(title_case("inPROCEEDINGS"), "Inproceedings");
        assert_eq!(title_case("o'neil"), "O'Neil");
    }
}
