//! Tag block tokenizer
//!
//! Splits a docblock into `@name arg...` groups. Docblock decoration
//! (`/**`, `*`, `*/`, `///`) is stripped first. Arguments are whitespace
//! separated; a quoted argument may contain spaces and a parenthesised group
//! such as `name(a, b)` stays one argument. A line break ends the current
//! tag, and words before the first tag of a line are ignored as prose.

/// One `@name arg...` group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagToken {
    /// Lowercased tag name without the `@`
    pub name: String,
    pub args: Vec<String>,
}

impl TagToken {
    /// Arguments joined back into a phrase
    pub fn joined_args(&self) -> String {
        self.args.join(" ")
    }
}

/// Tokenize a whole tag block
pub fn tokenize(block: &str) -> Vec<TagToken> {
    let mut tags = Vec::new();
    for line in block.lines() {
        let mut current: Option<TagToken> = None;
        for word in split_words(strip_decoration(line)) {
            let tag_name = match word.quoted {
                true => None,
                false => word.text.strip_prefix('@'),
            };
            if let Some(name) = tag_name {
                if let Some(tag) = current.take() {
                    tags.push(tag);
                }
                if !name.is_empty() {
                    current = Some(TagToken {
                        name: name.to_ascii_lowercase(),
                        args: Vec::new(),
                    });
                }
            } else if let Some(tag) = current.as_mut() {
                tag.args.push(word.text);
            }
        }
        if let Some(tag) = current.take() {
            tags.push(tag);
        }
    }
    tags
}

fn strip_decoration(line: &str) -> &str {
    let mut rest = line.trim();
    for prefix in ["/**", "/*!", "/*", "///", "//!", "//"] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }
    let rest = rest.trim_end();
    let rest = rest.strip_suffix("*/").unwrap_or(rest);
    rest.trim_start_matches(|c: char| c == '*' || c.is_whitespace())
}

struct Word {
    text: String,
    quoted: bool,
}

fn split_words(line: &str) -> Vec<Word> {
    let mut words = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch == '\'' || ch == '"' {
            let quote = ch;
            chars.next();
            let mut text = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            text.push(escaped);
                        }
                    }
                    c if c == quote => break,
                    c => text.push(c),
                }
            }
            words.push(Word { text, quoted: true });
            continue;
        }

        let mut text = String::new();
        let mut depth = 0usize;
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() && depth == 0 {
                break;
            }
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
            if !(c.is_whitespace() && depth > 0) {
                text.push(c);
            }
            chars.next();
        }
        words.push(Word {
            text,
            quoted: false,
        });
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str, args: &[&str]) -> TagToken {
        TagToken {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn test_tags_on_one_line() {
        let tokens = tokenize("@column @varchar 255 @unique");
        assert_eq!(
            tokens,
            vec![tag("column", &[]), tag("varchar", &["255"]), tag("unique", &[])]
        );
    }

    #[test]
    fn test_docblock_decoration_and_prose_are_ignored() {
        let block = "/**\n * The user's email address.\n * @column\n * @VarChar 191\n * @Comment \"Primary contact\"\n */";
        let tokens = tokenize(block);
        assert_eq!(
            tokens,
            vec![
                tag("column", &[]),
                tag("varchar", &["191"]),
                tag("comment", &["Primary contact"]),
            ]
        );
    }

    #[test]
    fn test_parenthesised_group_is_one_argument() {
        let tokens = tokenize("@index tenant_created(tenant_id, created_at)");
        assert_eq!(tokens, vec![tag("index", &["tenant_created(tenant_id,created_at)"])]);
    }

    #[test]
    fn test_line_break_ends_tag_arguments() {
        let tokens = tokenize("@comment first line\nmore prose here\n@nullable");
        assert_eq!(
            tokens,
            vec![tag("comment", &["first", "line"]), tag("nullable", &[])]
        );
    }

    #[test]
    fn test_quoted_at_sign_is_an_argument() {
        let tokens = tokenize("@default '@home' @comment 'it\\'s'");
        assert_eq!(
            tokens,
            vec![tag("default", &["@home"]), tag("comment", &["it's"])]
        );
    }
}
