//! Path templates such as `/repos/{owner}/{repo}` matched against literal request paths.

use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("unbalanced braces in path template '{0}'")]
    Unbalanced(String),
    #[error("empty placeholder in path template '{0}'")]
    EmptyPlaceholder(String),
    #[error("invalid path template '{template}': {source}")]
    Regex {
        template: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled template. A `{name}` segment matches exactly one path component.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    template: String,
    regex: Regex,
    literal_len: usize,
}

impl PathTemplate {
    pub fn compile(template: &str) -> Result<Self, TemplateError> {
        let mut expression = String::from("^");
        let mut literal = String::new();
        let mut literal_len = 0;
        let mut chars = template.chars();

        while let Some(ch) = chars.next() {
            match ch {
                '{' => {
                    expression.push_str(&regex::escape(&literal));
                    literal.clear();
                    let mut name = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        if inner == '{' || inner == '/' {
                            return Err(TemplateError::Unbalanced(template.to_string()));
                        }
                        name.push(inner);
                    }
                    if !closed {
                        return Err(TemplateError::Unbalanced(template.to_string()));
                    }
                    if name.trim().is_empty() {
                        return Err(TemplateError::EmptyPlaceholder(template.to_string()));
                    }
                    expression.push_str("[^/]+");
                }
                '}' => return Err(TemplateError::Unbalanced(template.to_string())),
                other => {
                    literal.push(other);
                    literal_len += 1;
                }
            }
        }
        expression.push_str(&regex::escape(&literal));
        expression.push('$');

        let regex = Regex::new(&expression).map_err(|source| TemplateError::Regex {
            template: template.to_string(),
            source,
        })?;
        Ok(Self {
            template: template.to_string(),
            regex,
            literal_len,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Number of characters outside placeholders.
    pub fn literal_len(&self) -> usize {
        self.literal_len
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// Pick the template for a literal path.
///
/// An identical template wins outright. Otherwise the matching template with the most
/// literal characters wins; on equal counts the earliest template in iteration order is kept.
/// Templates that fail to compile never match.
pub fn select_path<'a, I>(templates: I, path: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, usize)> = None;
    for template in templates {
        if template == path {
            return Some(template);
        }
        let compiled = match PathTemplate::compile(template) {
            Ok(compiled) => compiled,
            Err(err) => {
                tracing::warn!("skipping stub path: {}", err);
                continue;
            }
        };
        if !compiled.is_match(path) {
            continue;
        }
        let score = compiled.literal_len();
        if best.map(|(_, best_score)| score > best_score).unwrap_or(true) {
            best = Some((template, score));
        }
    }
    best.map(|(template, _)| template)
}
