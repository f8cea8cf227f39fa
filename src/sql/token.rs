//! Token and keyword model for the bundled SQL parser.

use std::fmt;

macro_rules! keywords {
    [$($ident:ident)*] => {
        /// Reserved words, recognized case-insensitively.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[allow(clippy::upper_case_acronyms)]
        pub enum Keyword {
            $($ident),*
        }

        impl Keyword {
            /// Look a keyword up from raw identifier text.
            #[must_use]
            pub fn lookup(text: &str) -> Option<Self> {
                let upper = text.to_ascii_uppercase();
                match upper.as_str() {
                    $(stringify!($ident) => Some(Self::$ident),)*
                    _ => None,
                }
            }

            #[must_use]
            pub const fn name(&self) -> &'static str {
                match self {
                    $(Self::$ident => stringify!($ident)),*
                }
            }
        }
    };
}

keywords![
    SELECT FROM WHERE AS WITH RECURSIVE UNION ALL DISTINCT
    JOIN INNER LEFT RIGHT FULL OUTER CROSS ON
    GROUP BY HAVING ORDER ASC DESC LIMIT OFFSET
    AND OR NOT IN BETWEEN LIKE ESCAPE IS NULL EXISTS
    CASE WHEN THEN ELSE END
    INSERT INTO VALUES UPDATE SET DELETE
    CREATE TABLE ALTER DROP CONSTRAINT PRIMARY KEY INDEX
    FOREIGN REFERENCES CHECK UNIQUE DEFAULT IF AUTOINCREMENT
];

/// True when `text` is a reserved word the generators must escape.
#[must_use]
pub fn is_reserved_word(text: &str) -> bool {
    Keyword::lookup(text).is_some()
}

/// A single lexed token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,
    Star,
    Plus,
    Minus,
    Slash,
    Percent,
    Eq,
    /// `<>` or `!=`.
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Quotes stripped, escapes resolved.
    StringLit(String),
    /// Digits and dots, verbatim.
    Number(String),
    /// Plain or bracketed identifier (brackets stripped).
    Identifier(String),
    Keyword(Keyword),
    /// Named placeholder such as `@p0` or `@Title_2` (sigil stripped).
    Parameter(String),
    Eof,
}

impl Token {
    /// Short description used in parse-error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::Comma => "','".to_string(),
            Self::Semicolon => "';'".to_string(),
            Self::Dot => "'.'".to_string(),
            Self::Star => "'*'".to_string(),
            Self::Plus => "'+'".to_string(),
            Self::Minus => "'-'".to_string(),
            Self::Slash => "'/'".to_string(),
            Self::Percent => "'%'".to_string(),
            Self::Eq => "'='".to_string(),
            Self::Ne => "'<>'".to_string(),
            Self::Lt => "'<'".to_string(),
            Self::Le => "'<='".to_string(),
            Self::Gt => "'>'".to_string(),
            Self::Ge => "'>='".to_string(),
            Self::StringLit(s) => format!("string '{s}'"),
            Self::Number(n) => format!("number {n}"),
            Self::Identifier(i) => format!("identifier '{i}'"),
            Self::Keyword(k) => format!("keyword {}", k.name()),
            Self::Parameter(p) => format!("parameter @{p}"),
            Self::Eof => "end of input".to_string(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_lookup_is_case_insensitive() {
        assert_eq!(Keyword::lookup("select"), Some(Keyword::SELECT));
        assert_eq!(Keyword::lookup("Select"), Some(Keyword::SELECT));
        assert_eq!(Keyword::lookup("SELECT"), Some(Keyword::SELECT));
        assert_eq!(Keyword::lookup("selects"), None);
    }

    #[test]
    fn reserved_set_covers_generator_escapes() {
        for word in ["Order", "Group", "Index", "Check", "Key", "Values"] {
            assert!(is_reserved_word(word), "{word} should be reserved");
        }
        assert!(!is_reserved_word("Title"));
        assert!(!is_reserved_word("Version"));
    }
}
