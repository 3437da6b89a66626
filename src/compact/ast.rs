//! Parsed compact schemas with names and datatypes already resolved.

use super::token::Pos;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schema {
    Pattern(Pattern),
    Grammar(Vec<Component>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combine {
    Choice,
    Interleave,
}

impl Combine {
    pub fn as_str(self) -> &'static str {
        match self {
            Combine::Choice => "choice",
            Combine::Interleave => "interleave",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Start {
        combine: Option<Combine>,
        pattern: Pattern,
        pos: Pos,
    },
    Define {
        name: String,
        combine: Option<Combine>,
        pattern: Pattern,
        pos: Pos,
    },
    Div {
        components: Vec<Component>,
        pos: Pos,
    },
    Include {
        href: String,
        ns: Option<String>,
        components: Vec<Component>,
        pos: Pos,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub kind: PatternKind,
    pub pos: Pos,
}

impl Pattern {
    pub fn new(kind: PatternKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}

/// Datatype library URI and type name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datatype {
    pub library: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub value: String,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternKind {
    Element(NameClass, Box<Pattern>),
    Attribute(NameClass, Box<Pattern>),
    Group(Vec<Pattern>),
    Choice(Vec<Pattern>),
    Interleave(Vec<Pattern>),
    Optional(Box<Pattern>),
    ZeroOrMore(Box<Pattern>),
    OneOrMore(Box<Pattern>),
    List(Box<Pattern>),
    Mixed(Box<Pattern>),
    Ref(String),
    ParentRef(String),
    Empty,
    Text,
    NotAllowed,
    External {
        href: String,
        ns: Option<String>,
    },
    Grammar(Vec<Component>),
    Data {
        datatype: Datatype,
        params: Vec<Param>,
        except: Option<Box<Pattern>>,
    },
    Value {
        datatype: Datatype,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameClass {
    pub kind: NameClassKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameClassKind {
    /// A single name in namespace `ns` (empty for none)
    Name { ns: String, local: String },
    AnyName(Option<Box<NameClass>>),
    NsName {
        ns: String,
        except: Option<Box<NameClass>>,
    },
    Choice(Vec<NameClass>),
}
