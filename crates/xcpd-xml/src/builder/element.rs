use super::{AliasMap, Attribute, Namespace};
use std::borrow::Cow;

#[derive(Debug, Clone)]
pub enum Content<'a> {
    None,
    Text(Cow<'a, str>),
    Elements(Vec<Element<'a>>),
}

/// A builder-style XML element. Namespace declarations made on an
/// element apply to that element and its descendants; a descendant
/// may redeclare the same URI under a different alias to shadow it.
#[derive(Debug, Clone)]
pub struct Element<'a> {
    name: &'a str,
    namespace: Option<Namespace<'a>>,
    declarations: Vec<(Namespace<'a>, Option<&'a str>)>,
    attributes: Vec<Attribute<'a>>,
    content: Content<'a>,
}

impl<'a> Element<'a> {
    pub fn new(name: &'a str) -> Self {
        Element {
            name,
            namespace: None,
            declarations: Vec::new(),
            attributes: Vec::new(),
            content: Content::None,
        }
    }

    /// Convenience constructor for `Element::new(name).set_namespace(ns)`.
    pub fn namespaced(name: &'a str, namespace: Namespace<'a>) -> Self {
        Element::new(name).set_namespace(namespace)
    }

    pub fn set_namespace(mut self, namespace: Namespace<'a>) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn set_namespace_optional(mut self, namespace: Option<Namespace<'a>>) -> Self {
        self.namespace = namespace;
        self
    }

    /// Declares a namespace on this element, with an optional alias
    /// (`None` means the default, unprefixed namespace).
    pub fn add_namespace_declaration(mut self, uri: &'a str, alias: Option<&'a str>) -> Self {
        self.declarations.push((Namespace::new(uri), alias));
        self
    }

    pub fn add_attribute(mut self, attribute: Attribute<'a>) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn add_attribute_opt(self, attribute: Option<Attribute<'a>>) -> Self {
        match attribute {
            Some(a) => self.add_attribute(a),
            None => self,
        }
    }

    pub fn add_child(mut self, child: Element<'a>) -> Self {
        match &mut self.content {
            Content::Elements(children) => children.push(child),
            _ => self.content = Content::Elements(vec![child]),
        }
        self
    }

    pub fn add_child_opt(self, child: Option<Element<'a>>) -> Self {
        match child {
            Some(c) => self.add_child(c),
            None => self,
        }
    }

    pub fn add_children(mut self, children: impl IntoIterator<Item = Element<'a>>) -> Self {
        for child in children {
            self = self.add_child(child);
        }
        self
    }

    pub fn set_text(mut self, text: impl Into<Cow<'a, str>>) -> Self {
        self.content = Content::Text(text.into());
        self
    }

    pub fn is_empty_content(&self) -> bool {
        matches!(self.content, Content::None)
    }

    fn resolve_name(&self, aliases: &AliasMap<'a>) -> String {
        match self.namespace.as_ref().and_then(|ns| aliases.get(ns)) {
            Some(alias) => format!("{alias}:{}", self.name),
            None => self.name.to_string(),
        }
    }

    pub(crate) fn write(&self, out: &mut String, inherited: &AliasMap<'a>) {
        let mut aliases = inherited.clone();
        for (ns, alias) in &self.declarations {
            if let Some(alias) = alias {
                aliases.insert(ns.clone(), alias);
            }
        }

        let name = self.resolve_name(&aliases);
        out.push('<');
        out.push_str(&name);

        for (ns, alias) in &self.declarations {
            match alias {
                Some(alias) => {
                    out.push_str(" xmlns:");
                    out.push_str(alias);
                    out.push_str("=\"");
                    out.push_str(ns.uri);
                    out.push('"');
                }
                None => {
                    out.push_str(" xmlns=\"");
                    out.push_str(ns.uri);
                    out.push('"');
                }
            }
        }

        for attribute in &self.attributes {
            attribute.write(out, &aliases);
        }

        match &self.content {
            Content::None => out.push_str("/>"),
            Content::Text(text) => {
                out.push('>');
                out.push_str(&super::escape(text));
                out.push_str("</");
                out.push_str(&name);
                out.push('>');
            }
            Content::Elements(children) => {
                out.push('>');
                for child in children {
                    child.write(out, &aliases);
                }
                out.push_str("</");
                out.push_str(&name);
                out.push('>');
            }
        }
    }
}
