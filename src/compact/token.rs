//! Token types for the compact syntax lexer.

use std::fmt;

/// A source position: 1-based line and 1-based UTF-16 column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A compact syntax token kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RncToken {
    // === Keywords ===
    Attribute,
    Datatypes,
    Default,
    Div,
    Element,
    Empty,
    External,
    Grammar,
    Include,
    Inherit,
    List,
    Mixed,
    Namespace,
    NotAllowed,
    Parent,
    Start,
    String,
    Text,
    Token,

    // === Names and literals ===
    /// NCName that is not a keyword, or any `\`-escaped name
    Identifier,
    /// `prefix:local`
    CName,
    /// `prefix:*`; the token text is the prefix
    NsName,
    /// Quoted literal; the token text is the decoded value
    Literal,

    // === Punctuation ===
    /// `=`
    Assign,
    /// `|=`
    ChoiceAssign,
    /// `&=`
    InterleaveAssign,
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    Comma,
    Pipe,
    Amp,
    Question,
    Star,
    Plus,
    Minus,
    Tilde,

    Eof,
}

impl RncToken {
    pub fn is_keyword(self) -> bool {
        use RncToken::*;
        matches!(
            self,
            Attribute
                | Datatypes
                | Default
                | Div
                | Element
                | Empty
                | External
                | Grammar
                | Include
                | Inherit
                | List
                | Mixed
                | Namespace
                | NotAllowed
                | Parent
                | Start
                | String
                | Text
                | Token
        )
    }

    /// Source spelling of punctuation, `None` for everything else
    pub fn symbol(self) -> Option<&'static str> {
        use RncToken::*;
        let symbol = match self {
            Assign => "=",
            ChoiceAssign => "|=",
            InterleaveAssign => "&=",
            LeftBrace => "{",
            RightBrace => "}",
            LeftParen => "(",
            RightParen => ")",
            Comma => ",",
            Pipe => "|",
            Amp => "&",
            Question => "?",
            Star => "*",
            Plus => "+",
            Minus => "-",
            Tilde => "~",
            _ => return None,
        };
        Some(symbol)
    }
}

/// A token with its kind, start position and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: RncToken,
    pub pos: Pos,
    pub text: String,
}

impl Token {
    pub fn new(kind: RncToken, pos: Pos, text: impl Into<String>) -> Self {
        Self {
            kind,
            pos,
            text: text.into(),
        }
    }

    /// How the token reads in an error message
    pub fn describe(&self) -> String {
        match self.kind {
            RncToken::Eof => "end of input".to_string(),
            RncToken::Literal => "literal".to_string(),
            RncToken::NsName => format!("'{}:*'", self.text),
            kind => match kind.symbol() {
                Some(symbol) => format!("'{symbol}'"),
                None => format!("'{}'", self.text),
            },
        }
    }
}

/// Looks up a keyword. Compact syntax keywords are case-sensitive.
pub fn lookup_keyword(name: &str) -> Option<RncToken> {
    match name {
        "attribute" => Some(RncToken::Attribute),
        "datatypes" => Some(RncToken::Datatypes),
        "default" => Some(RncToken::Default),
        "div" => Some(RncToken::Div),
        "element" => Some(RncToken::Element),
        "empty" => Some(RncToken::Empty),
        "external" => Some(RncToken::External),
        "grammar" => Some(RncToken::Grammar),
        "include" => Some(RncToken::Include),
        "inherit" => Some(RncToken::Inherit),
        "list" => Some(RncToken::List),
        "mixed" => Some(RncToken::Mixed),
        "namespace" => Some(RncToken::Namespace),
        "notAllowed" => Some(RncToken::NotAllowed),
        "parent" => Some(RncToken::Parent),
        "start" => Some(RncToken::Start),
        "string" => Some(RncToken::String),
        "text" => Some(RncToken::Text),
        "token" => Some(RncToken::Token),
        _ => None,
    }
}
