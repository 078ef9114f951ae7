//! Quote-aware tokenizer for command lines.
//!
//! Splits on whitespace. A `'...'` or `"..."` span is part of a single token
//! and its quote characters are dropped. Quotes do not nest: inside a span
//! the other quote character is literal. An unterminated span runs to the
//! end of the input.

/// A token plus the byte offset just past its last input character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Span {
    pub text: String,
    pub end: usize,
}

pub fn tokenize(input: &str) -> Vec<String> {
    tokenize_spans(input).into_iter().map(|s| s.text).collect()
}

pub(crate) fn tokenize_spans(input: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for (idx, ch) in input.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                in_token = true;
            }
            None if ch.is_whitespace() => {
                if in_token {
                    spans.push(Span {
                        text: std::mem::take(&mut current),
                        end: idx,
                    });
                    in_token = false;
                }
            }
            None => {
                current.push(ch);
                in_token = true;
            }
        }
    }
    if in_token {
        spans.push(Span {
            text: current,
            end: input.len(),
        });
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_any_whitespace() {
        assert_eq!(tokenize("  a \t b\nc  "), vec!["a", "b", "c"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn double_quoted_span_is_one_token() {
        assert_eq!(
            tokenize(r#"/create-stakeholder "John Smith""#),
            vec!["/create-stakeholder", "John Smith"]
        );
    }

    #[test]
    fn single_quotes_work_and_other_quote_is_literal() {
        assert_eq!(tokenize(r#"'it "works"' x"#), vec![r#"it "works""#, "x"]);
    }

    #[test]
    fn unterminated_quote_consumes_rest() {
        assert_eq!(tokenize(r#"a "b c d"#), vec!["a", "b c d"]);
    }

    #[test]
    fn empty_quotes_yield_empty_token() {
        assert_eq!(tokenize(r#"a "" b"#), vec!["a", "", "b"]);
    }

    #[test]
    fn quotes_inside_a_word_join_it() {
        assert_eq!(tokenize(r#"ab"c d"e f"#), vec!["abc de", "f"]);
    }

    #[test]
    fn spans_record_token_end() {
        let spans = tokenize_spans("help  run-foundation");
        assert_eq!(spans[0].end, 4);
        assert_eq!(spans[1].end, "help  run-foundation".len());
    }
}
