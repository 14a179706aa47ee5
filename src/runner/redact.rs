//! Credential masking for subprocess output

use regex::Regex;
use tracing::warn;

const MASK: &str = "****";

#[derive(Debug, Clone)]
enum Matcher {
    Pattern(Regex),
    /// Plain replacement, longest value first
    Literal(Vec<String>),
}

/// Replaces known credential values with `****`
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    matcher: Option<Matcher>,
}

impl Redactor {
    pub fn new<'a>(secrets: impl IntoIterator<Item = &'a str>) -> Self {
        let mut values: Vec<&str> = secrets.into_iter().filter(|s| !s.is_empty()).collect();

        if values.is_empty() {
            return Self { matcher: None };
        }

        // Longest first so a secret containing another is masked whole
        values.sort_by(|a, b| b.len().cmp(&a.len()));
        values.dedup();

        let alternation = values
            .iter()
            .map(|v| regex::escape(v))
            .collect::<Vec<_>>()
            .join("|");

        let matcher = match Regex::new(&alternation) {
            Ok(re) => Matcher::Pattern(re),
            Err(e) => {
                warn!("Credential pattern rejected ({}), masking by plain replacement", e);
                Matcher::Literal(values.iter().map(|v| v.to_string()).collect())
            }
        };
        Self {
            matcher: Some(matcher),
        }
    }

    pub fn apply(&self, text: &str) -> String {
        match &self.matcher {
            Some(Matcher::Pattern(re)) => re.replace_all(text, MASK).into_owned(),
            Some(Matcher::Literal(values)) => values
                .iter()
                .fold(text.to_string(), |acc, v| acc.replace(v.as_str(), MASK)),
            None => text.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matcher.is_none()
    }
}
