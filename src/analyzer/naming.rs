use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Field names that look like a reference to another resource:
/// `userId`, `user_id`, `userID`.
static ID_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>[A-Za-z][A-Za-z0-9_]*?)(?:_id|Id|ID)$")
        .expect("failed to compile id field regex")
});

/// Known resource names and the names they may appear under.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("user", &["user", "account", "member", "profile"]),
    ("author", &["user", "author"]),
    ("owner", &["user", "owner"]),
    ("creator", &["user"]),
    ("assignee", &["user"]),
    ("reviewer", &["user"]),
    ("customer", &["customer", "user", "client"]),
    ("client", &["client", "customer"]),
    ("account", &["account", "user"]),
    ("organization", &["organization", "org", "company", "team"]),
    ("org", &["organization", "org"]),
    ("company", &["company", "organization"]),
    ("team", &["team", "group"]),
    ("group", &["group", "team"]),
    ("project", &["project"]),
    ("product", &["product", "item"]),
    ("item", &["item", "product"]),
    ("order", &["order", "purchase"]),
    ("category", &["category"]),
    ("parent", &["category", "node", "folder"]),
    ("post", &["post", "article"]),
    ("article", &["article", "post"]),
    ("comment", &["comment"]),
    ("tag", &["tag", "label"]),
    ("file", &["file", "attachment", "document"]),
    ("service", &["service"]),
    ("suite", &["suite", "test_suite"]),
];

/// Resource base of an identifier field, snake-cased:
/// `parentCategoryId` → `parent_category`.
pub fn id_field_base(field: &str) -> Option<String> {
    let caps = ID_FIELD_RE.captures(field)?;
    let base = to_snake_case(caps.name("base")?.as_str());
    let base = base.trim_end_matches('_').to_string();
    (!base.is_empty()).then_some(base)
}

pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch == '-' || ch == ' ' {
            out.push('_');
            prev_lower = false;
        } else if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{stem}y");
        }
    }
    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with('s') && !word.ends_with("ss") && word.len() > 1 {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

pub fn pluralize(word: &str) -> String {
    let bytes = word.as_bytes();
    if word.ends_with('y')
        && bytes.len() > 1
        && !matches!(bytes[bytes.len() - 2], b'a' | b'e' | b'i' | b'o' | b'u')
    {
        return format!("{}ies", &word[..word.len() - 1]);
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        return format!("{word}es");
    }
    format!("{word}s")
}

/// Synonym table: built-ins overlaid with caller-supplied entries.
pub struct SynonymTable {
    entries: BTreeMap<String, Vec<String>>,
}

impl SynonymTable {
    pub fn new(extra: &BTreeMap<String, Vec<String>>) -> Self {
        let mut entries: BTreeMap<String, Vec<String>> = SYNONYMS
            .iter()
            .map(|(key, names)| {
                (key.to_string(), names.iter().map(|n| n.to_string()).collect())
            })
            .collect();
        for (key, names) in extra {
            entries.insert(singularize(&to_snake_case(key)), names.clone());
        }
        Self { entries }
    }

    /// Singular resource names `base` may refer to, and whether the
    /// table recognised it.
    pub fn candidates(&self, base: &str) -> (Vec<String>, bool) {
        let singular = singularize(base);
        let mut names = vec![singular.clone()];
        // `parent_category` also tries `category`
        if let Some((_, last)) = singular.rsplit_once('_') {
            names.push(last.to_string());
        }

        let mut known = false;
        for name in names.clone() {
            if let Some(aliases) = self.entries.get(&name) {
                known = true;
                for alias in aliases {
                    let alias = singularize(&to_snake_case(alias));
                    if !names.contains(&alias) {
                        names.push(alias);
                    }
                }
            }
        }
        (names, known)
    }
}
