//! XML syntax output for parsed compact schemas.
//!
//! Every element is written on a line of its own, and the position of the
//! compact construct it came from is recorded per line. Names always carry
//! an explicit `ns` and datatypes an explicit `datatypeLibrary`, so nothing
//! depends on inherited attributes.

use super::Translation;
use super::ast::*;
use super::token::Pos;

const RELAXNG_NAMESPACE: &str = "http://relaxng.org/ns/structure/1.0";

pub fn write(schema: &Schema) -> Translation {
    let mut writer = XmlWriter::default();
    match schema {
        Schema::Pattern(pattern) => writer.pattern(pattern),
        Schema::Grammar(components) => {
            let pos = components.first().map_or(Pos::new(1, 1), component_pos);
            writer.open("grammar", &[], pos);
            writer.components(components);
            writer.close("grammar", pos);
        }
    }
    Translation {
        xml: writer.out,
        origins: writer.origins,
    }
}

fn component_pos(component: &Component) -> Pos {
    match component {
        Component::Start { pos, .. }
        | Component::Define { pos, .. }
        | Component::Div { pos, .. }
        | Component::Include { pos, .. } => *pos,
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\n' => escaped.push_str("&#10;"),
            '\r' => escaped.push_str("&#13;"),
            '\t' => escaped.push_str("&#9;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[derive(Default)]
struct XmlWriter {
    out: String,
    origins: Vec<Pos>,
    depth: usize,
}

impl XmlWriter {
    fn tag(&mut self, name: &str, attrs: &[(&str, &str)], pos: Pos) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push('<');
        self.out.push_str(name);
        if self.origins.is_empty() {
            self.out.push_str(" xmlns=\"");
            self.out.push_str(RELAXNG_NAMESPACE);
            self.out.push('"');
        }
        for (key, value) in attrs {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            self.out.push_str(&escape(value));
            self.out.push('"');
        }
        self.origins.push(pos);
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)], pos: Pos) {
        self.tag(name, attrs, pos);
        self.out.push_str(">\n");
        self.depth += 1;
    }

    fn close(&mut self, name: &str, pos: Pos) {
        self.depth -= 1;
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push_str(">\n");
        self.origins.push(pos);
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)], pos: Pos) {
        self.tag(name, attrs, pos);
        self.out.push_str("/>\n");
    }

    fn text(&mut self, name: &str, attrs: &[(&str, &str)], text: &str, pos: Pos) {
        self.tag(name, attrs, pos);
        self.out.push('>');
        self.out.push_str(&escape(text));
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push_str(">\n");
    }

    fn wrap(&mut self, name: &str, attrs: &[(&str, &str)], patterns: &[&Pattern], pos: Pos) {
        self.open(name, attrs, pos);
        for pattern in patterns {
            self.pattern(pattern);
        }
        self.close(name, pos);
    }

    fn components(&mut self, components: &[Component]) {
        for component in components {
            self.component(component);
        }
    }

    fn component(&mut self, component: &Component) {
        match component {
            Component::Start {
                combine,
                pattern,
                pos,
            } => {
                let attrs: Vec<(&str, &str)> =
                    combine.map(|c| ("combine", c.as_str())).into_iter().collect();
                self.wrap("start", &attrs, &[pattern], *pos);
            }
            Component::Define {
                name,
                combine,
                pattern,
                pos,
            } => {
                let mut attrs = vec![("name", name.as_str())];
                attrs.extend(combine.map(|c| ("combine", c.as_str())));
                self.wrap("define", &attrs, &[pattern], *pos);
            }
            Component::Div { components, pos } => {
                self.open("div", &[], *pos);
                self.components(components);
                self.close("div", *pos);
            }
            Component::Include {
                href,
                ns,
                components,
                pos,
            } => {
                let mut attrs = vec![("href", href.as_str())];
                attrs.extend(ns.as_deref().map(|ns| ("ns", ns)));
                if components.is_empty() {
                    self.empty("include", &attrs, *pos);
                } else {
                    self.open("include", &attrs, *pos);
                    self.components(components);
                    self.close("include", *pos);
                }
            }
        }
    }

    fn pattern(&mut self, pattern: &Pattern) {
        let pos = pattern.pos;
        match &pattern.kind {
            PatternKind::Element(name, body) => self.named("element", name, body, pos),
            PatternKind::Attribute(name, body) => self.named("attribute", name, body, pos),
            PatternKind::Group(items) => self.wrap("group", &[], &items.iter().collect::<Vec<_>>(), pos),
            PatternKind::Choice(items) => self.wrap("choice", &[], &items.iter().collect::<Vec<_>>(), pos),
            PatternKind::Interleave(items) => {
                self.wrap("interleave", &[], &items.iter().collect::<Vec<_>>(), pos)
            }
            PatternKind::Optional(inner) => self.wrap("optional", &[], &[&**inner], pos),
            PatternKind::ZeroOrMore(inner) => self.wrap("zeroOrMore", &[], &[&**inner], pos),
            PatternKind::OneOrMore(inner) => self.wrap("oneOrMore", &[], &[&**inner], pos),
            PatternKind::List(inner) => self.wrap("list", &[], &[&**inner], pos),
            PatternKind::Mixed(inner) => self.wrap("mixed", &[], &[&**inner], pos),
            PatternKind::Ref(name) => self.empty("ref", &[("name", name.as_str())], pos),
            PatternKind::ParentRef(name) => self.empty("parentRef", &[("name", name.as_str())], pos),
            PatternKind::Empty => self.empty("empty", &[], pos),
            PatternKind::Text => self.empty("text", &[], pos),
            PatternKind::NotAllowed => self.empty("notAllowed", &[], pos),
            PatternKind::External { href, ns } => {
                let mut attrs = vec![("href", href.as_str())];
                attrs.extend(ns.as_deref().map(|ns| ("ns", ns)));
                self.empty("externalRef", &attrs, pos);
            }
            PatternKind::Grammar(components) => {
                self.open("grammar", &[], pos);
                self.components(components);
                self.close("grammar", pos);
            }
            PatternKind::Data {
                datatype,
                params,
                except,
            } => {
                let attrs = [
                    ("type", datatype.name.as_str()),
                    ("datatypeLibrary", datatype.library.as_str()),
                ];
                if params.is_empty() && except.is_none() {
                    self.empty("data", &attrs, pos);
                    return;
                }
                self.open("data", &attrs, pos);
                for param in params {
                    self.text("param", &[("name", param.name.as_str())], &param.value, param.pos);
                }
                if let Some(except) = except {
                    self.wrap("except", &[], &[&**except], except.pos);
                }
                self.close("data", pos);
            }
            PatternKind::Value { datatype, value } => {
                let attrs = [
                    ("type", datatype.name.as_str()),
                    ("datatypeLibrary", datatype.library.as_str()),
                ];
                self.text("value", &attrs, value, pos);
            }
        }
    }

    fn named(&mut self, tag: &str, name: &NameClass, body: &Pattern, pos: Pos) {
        if let NameClassKind::Name { ns, local } = &name.kind {
            self.wrap(tag, &[("name", local.as_str()), ("ns", ns.as_str())], &[body], pos);
            return;
        }
        self.open(tag, &[], pos);
        self.name_class(name);
        self.pattern(body);
        self.close(tag, pos);
    }

    fn name_class(&mut self, name: &NameClass) {
        let pos = name.pos;
        match &name.kind {
            NameClassKind::Name { ns, local } => self.text("name", &[("ns", ns.as_str())], local, pos),
            NameClassKind::AnyName(except) => self.wildcard("anyName", &[], except.as_deref(), pos),
            NameClassKind::NsName { ns, except } => {
                self.wildcard("nsName", &[("ns", ns.as_str())], except.as_deref(), pos)
            }
            NameClassKind::Choice(items) => {
                self.open("choice", &[], pos);
                for item in items {
                    self.name_class(item);
                }
                self.close("choice", pos);
            }
        }
    }

    fn wildcard(&mut self, tag: &str, attrs: &[(&str, &str)], except: Option<&NameClass>, pos: Pos) {
        let Some(except) = except else {
            self.empty(tag, attrs, pos);
            return;
        };
        self.open(tag, attrs, pos);
        self.open("except", &[], except.pos);
        self.name_class(except);
        self.close("except", except.pos);
        self.close(tag, pos);
    }
}
