// Copyright 2026 rengine Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::{ParserError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Unquoted word; keywords are matched case-insensitively by the parser.
    Ident(String),
    /// Backtick-quoted identifier, taken verbatim.
    QuotedIdent(String),
    Number(String),
    SingleQuotedString(String),
    DoubleQuotedString(String),
    Comma,
    Period,
    LParen,
    RParen,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
}

impl Token {
    /// Does this token spell the given keyword (case-insensitive)?
    pub fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Token::Ident(w) if w.eq_ignore_ascii_case(kw))
    }
}

pub fn tokenize(sql: &str) -> Result<Vec<Token>> {
    let mut tokens = vec![];
    let mut chars = sql.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(word));
            }
            c if c.is_ascii_digit() => {
                let mut num = String::new();
                let mut seen_dot = false;
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() {
                        num.push(c);
                        chars.next();
                    } else if c == '.' && !seen_dot {
                        // lookahead: `1.5` is a decimal, `1.x` is not ours
                        let mut ahead = chars.clone();
                        ahead.next();
                        match ahead.peek() {
                            Some(d) if d.is_ascii_digit() => {
                                seen_dot = true;
                                num.push(c);
                                chars.next();
                            }
                            _ => break,
                        }
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(num));
            }
            '\'' => {
                chars.next();
                tokens.push(Token::SingleQuotedString(read_quoted(&mut chars, '\'')?));
            }
            '"' => {
                chars.next();
                tokens.push(Token::DoubleQuotedString(read_quoted(&mut chars, '"')?));
            }
            '`' => {
                chars.next();
                let mut word = String::new();
                loop {
                    match chars.next() {
                        Some('`') => break,
                        Some(c) => word.push(c),
                        None => {
                            return Err(ParserError::Tokenizer(
                                "unterminated backtick identifier".into(),
                            ))
                        }
                    }
                }
                tokens.push(Token::QuotedIdent(word));
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Period);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Asterisk);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        chars.next();
                        tokens.push(Token::NotEq);
                    }
                    _ => return Err(ParserError::Tokenizer("expected = after !".into())),
                }
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        chars.next();
                        tokens.push(Token::LtEq);
                    }
                    Some('>') => {
                        chars.next();
                        tokens.push(Token::NotEq);
                    }
                    _ => tokens.push(Token::Lt),
                }
            }
            '>' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        chars.next();
                        tokens.push(Token::GtEq);
                    }
                    _ => tokens.push(Token::Gt),
                }
            }
            other => {
                return Err(ParserError::Tokenizer(format!(
                    "unexpected character {other:?}"
                )))
            }
        }
    }
    Ok(tokens)
}

fn read_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, quote: char) -> Result<String> {
    let mut s = String::new();
    loop {
        match chars.next() {
            Some(c) if c == quote => {
                // doubled quote is an escape
                if chars.peek() == Some(&quote) {
                    chars.next();
                    s.push(quote);
                } else {
                    return Ok(s);
                }
            }
            Some('\\') => match chars.next() {
                Some(c) => s.push(c),
                None => return Err(ParserError::Tokenizer("unterminated string".into())),
            },
            Some(c) => s.push(c),
            None => return Err(ParserError::Tokenizer("unterminated string".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_select() {
        let tokens = tokenize("SELECT color, size*5 FROM demo WHERE size >= 3").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("SELECT".into()),
                Token::Ident("color".into()),
                Token::Comma,
                Token::Ident("size".into()),
                Token::Asterisk,
                Token::Number("5".into()),
                Token::Ident("FROM".into()),
                Token::Ident("demo".into()),
                Token::Ident("WHERE".into()),
                Token::Ident("size".into()),
                Token::GtEq,
                Token::Number("3".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_strings_and_quoted_idents() {
        let tokens = tokenize("`from` != 'it''s' <> \"x\"").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::QuotedIdent("from".into()),
                Token::NotEq,
                Token::SingleQuotedString("it's".into()),
                Token::NotEq,
                Token::DoubleQuotedString("x".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_decimal_vs_qualified() {
        assert_eq!(
            tokenize("1.5").unwrap(),
            vec![Token::Number("1.5".into())]
        );
        assert_eq!(
            tokenize("demo.ts").unwrap(),
            vec![
                Token::Ident("demo".into()),
                Token::Period,
                Token::Ident("ts".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_rejects_garbage() {
        assert!(tokenize("select ; from").is_err());
    }
}
