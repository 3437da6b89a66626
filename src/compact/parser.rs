//! Recursive descent parser for compact syntax schemas.
//!
//! Declarations are read first, so namespace prefixes and datatype libraries
//! are resolved while patterns are parsed. Parsing stops at the first error.

use std::collections::HashMap;

use super::CompactError;
use super::ast::*;
use super::token::{Pos, RncToken, Token};

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XSD_DATATYPES: &str = "http://www.w3.org/2001/XMLSchema-datatypes";

type ParseResult<T> = Result<T, CompactError>;

pub struct RncParser {
    tokens: Vec<Token>,
    pos: usize,
    namespaces: HashMap<String, String>,
    default_namespace: String,
    datatypes: HashMap<String, String>,
}

impl RncParser {
    /// Creates a parser over a token stream ending with [`RncToken::Eof`].
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            namespaces: HashMap::from([("xml".to_string(), XML_NAMESPACE.to_string())]),
            default_namespace: String::new(),
            datatypes: HashMap::from([("xsd".to_string(), XSD_DATATYPES.to_string())]),
        }
    }

    // ========================================================================
    // Primitive operations
    // ========================================================================

    fn current_token(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn current(&self) -> RncToken {
        self.current_token().kind
    }

    fn current_pos(&self) -> Pos {
        self.current_token().pos
    }

    fn peek_kind(&self, n: usize) -> RncToken {
        self.tokens
            .get(self.pos + n)
            .map_or(RncToken::Eof, |token| token.kind)
    }

    fn at(&self, kind: RncToken) -> bool {
        self.current() == kind
    }

    fn at_eof(&self) -> bool {
        self.at(RncToken::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.current_token().clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: RncToken) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: RncToken) -> ParseResult<Token> {
        if self.at(kind) {
            return Ok(self.advance());
        }
        let what = match kind.symbol() {
            Some(symbol) => format!("'{symbol}'"),
            None => format!("{kind:?}").to_lowercase(),
        };
        Err(self.expected(&what))
    }

    fn expected(&self, what: &str) -> CompactError {
        CompactError::new(
            self.current_pos(),
            format!("expected {what}, found {}", self.current_token().describe()),
        )
    }

    /// An identifier or keyword, as allowed for prefixes and parameter names
    fn expect_name_or_keyword(&mut self, what: &str) -> ParseResult<Token> {
        if self.at(RncToken::Identifier) || self.current().is_keyword() {
            Ok(self.advance())
        } else {
            Err(self.expected(what))
        }
    }

    // ========================================================================
    // Top level
    // ========================================================================

    pub fn parse_schema(&mut self) -> ParseResult<Schema> {
        self.parse_declarations()?;
        if self.at_eof() || self.at_grammar_content() {
            let components = self.parse_grammar_content(RncToken::Eof)?;
            return Ok(Schema::Grammar(components));
        }
        let pattern = self.parse_pattern()?;
        if !self.at_eof() {
            return Err(self.expected("end of schema"));
        }
        Ok(Schema::Pattern(pattern))
    }

    fn at_grammar_content(&self) -> bool {
        match self.current() {
            RncToken::Start | RncToken::Div | RncToken::Include => true,
            RncToken::Identifier => matches!(
                self.peek_kind(1),
                RncToken::Assign | RncToken::ChoiceAssign | RncToken::InterleaveAssign
            ),
            _ => false,
        }
    }

    fn parse_declarations(&mut self) -> ParseResult<()> {
        loop {
            match self.current() {
                RncToken::Namespace => {
                    self.advance();
                    let prefix = self.expect_name_or_keyword("a namespace prefix")?;
                    self.expect(RncToken::Assign)?;
                    let uri = self.parse_namespace_uri()?;
                    self.declare_namespace(&prefix, uri)?;
                }
                RncToken::Default => {
                    self.advance();
                    self.expect(RncToken::Namespace)?;
                    let prefix = if self.at(RncToken::Assign) {
                        None
                    } else {
                        Some(self.expect_name_or_keyword("a namespace prefix")?)
                    };
                    self.expect(RncToken::Assign)?;
                    let uri = self.parse_namespace_uri()?;
                    if let Some(prefix) = prefix {
                        self.declare_namespace(&prefix, uri.clone())?;
                    }
                    self.default_namespace = uri;
                }
                RncToken::Datatypes => {
                    self.advance();
                    let prefix = self.expect_name_or_keyword("a datatypes prefix")?;
                    self.expect(RncToken::Assign)?;
                    let uri = self.parse_literal()?;
                    self.datatypes.insert(prefix.text, uri);
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_namespace_uri(&mut self) -> ParseResult<String> {
        if self.eat(RncToken::Inherit) {
            // Nothing to inherit from at the top of a standalone schema
            return Ok(String::new());
        }
        self.parse_literal()
    }

    fn declare_namespace(&mut self, prefix: &Token, uri: String) -> ParseResult<()> {
        match prefix.text.as_str() {
            "xmlns" => Err(CompactError::new(prefix.pos, "the prefix 'xmlns' cannot be declared")),
            "xml" if uri != XML_NAMESPACE => Err(CompactError::new(
                prefix.pos,
                "the prefix 'xml' cannot be bound to another namespace",
            )),
            _ => {
                self.namespaces.insert(prefix.text.clone(), uri);
                Ok(())
            }
        }
    }

    fn parse_grammar_content(&mut self, end: RncToken) -> ParseResult<Vec<Component>> {
        let mut components = Vec::new();
        while !self.at(end) {
            let pos = self.current_pos();
            let component = match self.current() {
                RncToken::Start => {
                    self.advance();
                    let combine = self.parse_assign_method()?;
                    let pattern = self.parse_pattern()?;
                    Component::Start {
                        combine,
                        pattern,
                        pos,
                    }
                }
                RncToken::Identifier => {
                    let name = self.advance().text;
                    let combine = self.parse_assign_method()?;
                    let pattern = self.parse_pattern()?;
                    Component::Define {
                        name,
                        combine,
                        pattern,
                        pos,
                    }
                }
                RncToken::Div => {
                    self.advance();
                    self.expect(RncToken::LeftBrace)?;
                    let components = self.parse_grammar_content(RncToken::RightBrace)?;
                    self.expect(RncToken::RightBrace)?;
                    Component::Div { components, pos }
                }
                RncToken::Include => {
                    self.advance();
                    let href = self.parse_literal()?;
                    let ns = self.parse_inherit()?;
                    let components = if self.eat(RncToken::LeftBrace) {
                        let components = self.parse_grammar_content(RncToken::RightBrace)?;
                        self.expect(RncToken::RightBrace)?;
                        components
                    } else {
                        Vec::new()
                    };
                    Component::Include {
                        href,
                        ns,
                        components,
                        pos,
                    }
                }
                RncToken::Eof => return Err(self.expected("'}'")),
                _ => return Err(self.expected("a definition")),
            };
            components.push(component);
        }
        Ok(components)
    }

    fn parse_assign_method(&mut self) -> ParseResult<Option<Combine>> {
        match self.current() {
            RncToken::Assign => {
                self.advance();
                Ok(None)
            }
            RncToken::ChoiceAssign => {
                self.advance();
                Ok(Some(Combine::Choice))
            }
            RncToken::InterleaveAssign => {
                self.advance();
                Ok(Some(Combine::Interleave))
            }
            _ => Err(self.expected("'=', '|=' or '&='")),
        }
    }

    fn parse_inherit(&mut self) -> ParseResult<Option<String>> {
        if !self.eat(RncToken::Inherit) {
            return Ok(None);
        }
        self.expect(RncToken::Assign)?;
        let prefix = self.expect_name_or_keyword("a namespace prefix")?;
        self.resolve_prefix(&prefix.text, prefix.pos).map(Some)
    }

    fn parse_literal(&mut self) -> ParseResult<String> {
        let mut value = self.expect(RncToken::Literal)?.text;
        while self.eat(RncToken::Tilde) {
            value.push_str(&self.expect(RncToken::Literal)?.text);
        }
        Ok(value)
    }

    // ========================================================================
    // Patterns
    // ========================================================================

    fn parse_pattern(&mut self) -> ParseResult<Pattern> {
        let first = self.parse_particle()?;
        let operator = self.current();
        if !matches!(operator, RncToken::Comma | RncToken::Pipe | RncToken::Amp) {
            return Ok(first);
        }

        let pos = first.pos;
        let mut items = vec![first];
        while self.eat(operator) {
            items.push(self.parse_particle()?);
        }
        if matches!(self.current(), RncToken::Comma | RncToken::Pipe | RncToken::Amp) {
            return Err(CompactError::new(
                self.current_pos(),
                "mixing ',', '|' and '&' requires parentheses",
            ));
        }

        let kind = match operator {
            RncToken::Comma => PatternKind::Group(items),
            RncToken::Pipe => PatternKind::Choice(items),
            _ => PatternKind::Interleave(items),
        };
        Ok(Pattern::new(kind, pos))
    }

    fn parse_particle(&mut self) -> ParseResult<Pattern> {
        let primary = self.parse_primary()?;
        let pos = primary.pos;
        let inner = Box::new(primary);
        let kind = match self.current() {
            RncToken::Question => PatternKind::Optional(inner),
            RncToken::Star => PatternKind::ZeroOrMore(inner),
            RncToken::Plus => PatternKind::OneOrMore(inner),
            _ => return Ok(*inner),
        };
        self.advance();
        if matches!(self.current(), RncToken::Question | RncToken::Star | RncToken::Plus) {
            return Err(CompactError::new(
                self.current_pos(),
                "repeated occurrence operator requires parentheses",
            ));
        }
        Ok(Pattern::new(kind, pos))
    }

    fn parse_braced_pattern(&mut self) -> ParseResult<Box<Pattern>> {
        self.expect(RncToken::LeftBrace)?;
        let pattern = self.parse_pattern()?;
        self.expect(RncToken::RightBrace)?;
        Ok(Box::new(pattern))
    }

    fn parse_primary(&mut self) -> ParseResult<Pattern> {
        let pos = self.current_pos();
        let kind = match self.current() {
            RncToken::Element | RncToken::Attribute => {
                let attribute = self.advance().kind == RncToken::Attribute;
                let name = self.parse_name_class(attribute)?;
                let body = self.parse_braced_pattern()?;
                if attribute {
                    PatternKind::Attribute(name, body)
                } else {
                    PatternKind::Element(name, body)
                }
            }
            RncToken::List => {
                self.advance();
                PatternKind::List(self.parse_braced_pattern()?)
            }
            RncToken::Mixed => {
                self.advance();
                PatternKind::Mixed(self.parse_braced_pattern()?)
            }
            RncToken::Identifier => PatternKind::Ref(self.advance().text),
            RncToken::Parent => {
                self.advance();
                PatternKind::ParentRef(self.expect(RncToken::Identifier)?.text)
            }
            RncToken::Empty => {
                self.advance();
                PatternKind::Empty
            }
            RncToken::Text => {
                self.advance();
                PatternKind::Text
            }
            RncToken::NotAllowed => {
                self.advance();
                PatternKind::NotAllowed
            }
            RncToken::External => {
                self.advance();
                let href = self.parse_literal()?;
                let ns = self.parse_inherit()?;
                PatternKind::External { href, ns }
            }
            RncToken::Grammar => {
                self.advance();
                self.expect(RncToken::LeftBrace)?;
                let components = self.parse_grammar_content(RncToken::RightBrace)?;
                self.expect(RncToken::RightBrace)?;
                PatternKind::Grammar(components)
            }
            RncToken::LeftParen => {
                self.advance();
                let pattern = self.parse_pattern()?;
                self.expect(RncToken::RightParen)?;
                return Ok(pattern);
            }
            RncToken::Literal => PatternKind::Value {
                datatype: Datatype {
                    library: String::new(),
                    name: "token".to_string(),
                },
                value: self.parse_literal()?,
            },
            RncToken::String | RncToken::Token | RncToken::CName => {
                let datatype = self.parse_datatype_name()?;
                self.parse_datatype(datatype)?
            }
            _ => return Err(self.expected("a pattern")),
        };
        Ok(Pattern::new(kind, pos))
    }

    fn parse_datatype_name(&mut self) -> ParseResult<Datatype> {
        let token = self.advance();
        match token.text.split_once(':') {
            Some((prefix, name)) => {
                let library = self.datatypes.get(prefix).cloned().ok_or_else(|| {
                    CompactError::new(token.pos, format!("undeclared datatypes prefix '{prefix}'"))
                })?;
                Ok(Datatype {
                    library,
                    name: name.to_string(),
                })
            }
            // Built-in `string` and `token`
            None => Ok(Datatype {
                library: String::new(),
                name: token.text.clone(),
            }),
        }
    }

    fn parse_datatype(&mut self, datatype: Datatype) -> ParseResult<PatternKind> {
        if self.at(RncToken::Literal) {
            let value = self.parse_literal()?;
            return Ok(PatternKind::Value { datatype, value });
        }

        let mut params = Vec::new();
        if self.eat(RncToken::LeftBrace) {
            while !self.eat(RncToken::RightBrace) {
                let name = self.expect_name_or_keyword("a parameter name")?;
                self.expect(RncToken::Assign)?;
                let value = self.parse_literal()?;
                params.push(Param {
                    name: name.text,
                    value,
                    pos: name.pos,
                });
            }
        }
        let except = if self.eat(RncToken::Minus) {
            Some(Box::new(self.parse_primary()?))
        } else {
            None
        };
        Ok(PatternKind::Data {
            datatype,
            params,
            except,
        })
    }

    // ========================================================================
    // Name classes
    // ========================================================================

    fn parse_name_class(&mut self, attribute: bool) -> ParseResult<NameClass> {
        let first = self.parse_basic_name_class(attribute)?;
        if !self.at(RncToken::Pipe) {
            return Ok(first);
        }
        let pos = first.pos;
        let mut items = vec![first];
        while self.eat(RncToken::Pipe) {
            items.push(self.parse_basic_name_class(attribute)?);
        }
        Ok(NameClass {
            kind: NameClassKind::Choice(items),
            pos,
        })
    }

    fn parse_basic_name_class(&mut self, attribute: bool) -> ParseResult<NameClass> {
        let pos = self.current_pos();
        let kind = match self.current() {
            RncToken::Identifier => self.unprefixed_name(attribute),
            kind if kind.is_keyword() => self.unprefixed_name(attribute),
            RncToken::CName => {
                let token = self.advance();
                let (prefix, local) = token.text.split_once(':').unwrap_or(("", token.text.as_str()));
                NameClassKind::Name {
                    ns: self.resolve_prefix(prefix, token.pos)?,
                    local: local.to_string(),
                }
            }
            RncToken::NsName => {
                let token = self.advance();
                let ns = self.resolve_prefix(&token.text, token.pos)?;
                let except = self.parse_name_class_except(attribute)?;
                NameClassKind::NsName { ns, except }
            }
            RncToken::Star => {
                self.advance();
                NameClassKind::AnyName(self.parse_name_class_except(attribute)?)
            }
            RncToken::LeftParen => {
                self.advance();
                let name = self.parse_name_class(attribute)?;
                self.expect(RncToken::RightParen)?;
                return Ok(name);
            }
            _ => return Err(self.expected("a name")),
        };
        Ok(NameClass { kind, pos })
    }

    /// Unprefixed element names take the default namespace; unprefixed
    /// attribute names are in no namespace.
    fn unprefixed_name(&mut self, attribute: bool) -> NameClassKind {
        let local = self.advance().text;
        let ns = if attribute {
            String::new()
        } else {
            self.default_namespace.clone()
        };
        NameClassKind::Name { ns, local }
    }

    fn parse_name_class_except(&mut self, attribute: bool) -> ParseResult<Option<Box<NameClass>>> {
        if self.eat(RncToken::Minus) {
            Ok(Some(Box::new(self.parse_basic_name_class(attribute)?)))
        } else {
            Ok(None)
        }
    }

    fn resolve_prefix(&self, prefix: &str, pos: Pos) -> ParseResult<String> {
        self.namespaces
            .get(prefix)
            .cloned()
            .ok_or_else(|| CompactError::new(pos, format!("undeclared namespace prefix '{prefix}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compact::lexer::lex;

    fn parse(source: &str) -> ParseResult<Schema> {
        RncParser::new(lex(source)?).parse_schema()
    }

    fn name(ns: &str, local: &str, pos: Pos) -> NameClass {
        NameClass {
            kind: NameClassKind::Name {
                ns: ns.to_string(),
                local: local.to_string(),
            },
            pos,
        }
    }

    #[test]
    fn test_pattern_schema() {
        let schema = parse("element doc { text }").unwrap();
        let expected = Pattern::new(
            PatternKind::Element(
                name("", "doc", Pos::new(1, 9)),
                Box::new(Pattern::new(PatternKind::Text, Pos::new(1, 15))),
            ),
            Pos::new(1, 1),
        );
        assert_eq!(schema, Schema::Pattern(expected));
    }

    #[test]
    fn test_grammar_components() {
        let schema = parse(
            "start = doc\ndoc = element doc { item* }\nitem |= element item { text }\ndiv { item |= empty }",
        )
        .unwrap();
        let Schema::Grammar(components) = schema else {
            panic!("expected a grammar");
        };
        assert_eq!(components.len(), 4);
        assert!(matches!(&components[0], Component::Start { combine: None, .. }));
        assert!(matches!(
            &components[2],
            Component::Define { name, combine: Some(Combine::Choice), pos, .. }
                if name == "item" && *pos == Pos::new(3, 1)
        ));
        assert!(matches!(&components[3], Component::Div { components, .. } if components.len() == 1));
    }

    #[test]
    fn test_namespaces_resolve_per_context() {
        let schema = parse(
            "default namespace = \"urn:d\"\nnamespace x = \"urn:x\"\nelement doc { attribute id { text }, attribute x:id { text }, element x:* - x:skip { empty } }",
        )
        .unwrap();
        let Schema::Pattern(Pattern {
            kind: PatternKind::Element(doc, body),
            ..
        }) = schema
        else {
            panic!("expected an element");
        };
        assert_eq!(doc.kind, name("urn:d", "doc", doc.pos).kind);

        let PatternKind::Group(items) = body.kind else {
            panic!("expected a group");
        };
        let PatternKind::Attribute(id, _) = &items[0].kind else {
            panic!("expected an attribute");
        };
        assert_eq!(id.kind, name("", "id", id.pos).kind);
        let PatternKind::Attribute(xid, _) = &items[1].kind else {
            panic!("expected an attribute");
        };
        assert_eq!(xid.kind, name("urn:x", "id", xid.pos).kind);
        let PatternKind::Element(any, _) = &items[2].kind else {
            panic!("expected an element");
        };
        assert!(matches!(
            &any.kind,
            NameClassKind::NsName { ns, except: Some(_) } if ns == "urn:x"
        ));
    }

    #[test]
    fn test_datatypes_and_values() {
        let schema = parse(
            "datatypes d = \"urn:dt\"\nelement n { xsd:integer { minInclusive = \"1\" } - \"7\" | d:code | string \"a\" ~ 'b' | \"c\" }",
        )
        .unwrap();
        let Schema::Pattern(Pattern {
            kind: PatternKind::Element(_, body),
            ..
        }) = schema
        else {
            panic!("expected an element");
        };
        let PatternKind::Choice(items) = body.kind else {
            panic!("expected a choice");
        };
        assert!(matches!(
            &items[0].kind,
            PatternKind::Data { datatype, params, except: Some(_) }
                if datatype.library == XSD_DATATYPES && datatype.name == "integer" && params.len() == 1
        ));
        assert!(matches!(
            &items[1].kind,
            PatternKind::Data { datatype, .. } if datatype.library == "urn:dt" && datatype.name == "code"
        ));
        assert!(matches!(
            &items[2].kind,
            PatternKind::Value { datatype, value } if datatype.library.is_empty() && datatype.name == "string" && value == "ab"
        ));
        assert!(matches!(
            &items[3].kind,
            PatternKind::Value { datatype, value } if datatype.name == "token" && value == "c"
        ));
    }

    #[test]
    fn test_syntax_errors_carry_positions() {
        let err = parse("element doc { a, b | c }").unwrap_err();
        assert_eq!(err.pos, Pos::new(1, 20));
        assert!(err.message.contains("requires parentheses"));

        let err = parse("start = element doc {\n  text\n").unwrap_err();
        assert_eq!(err.pos, Pos::new(3, 1));
        assert_eq!(err.message, "expected '}', found end of input");

        let err = parse("element db:doc { empty }").unwrap_err();
        assert_eq!(err.pos, Pos::new(1, 9));
        assert_eq!(err.message, "undeclared namespace prefix 'db'");

        let err = parse("element doc { dt:x }").unwrap_err();
        assert_eq!(err.message, "undeclared datatypes prefix 'dt'");

        let err = parse("namespace xml = \"urn:other\"\nelement doc { empty }").unwrap_err();
        assert_eq!(err.pos, Pos::new(1, 11));

        let err = parse("element doc { text } extra").unwrap_err();
        assert_eq!(err.message, "expected end of schema, found 'extra'");
    }

    #[test]
    fn test_empty_schema_is_empty_grammar() {
        assert_eq!(parse("# nothing\n").unwrap(), Schema::Grammar(Vec::new()));
    }
}
