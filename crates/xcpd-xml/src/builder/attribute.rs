use super::Namespace;
use std::borrow::Cow;

/// A single XML attribute. Values are `Cow` so callers can hand in
/// either a borrowed `&str` or an owned `String` (e.g. a formatted
/// timestamp) without an extra allocation on the common path.
#[derive(Debug, Clone)]
pub struct Attribute<'a> {
    pub(crate) name: &'a str,
    pub(crate) value: Cow<'a, str>,
    pub(crate) namespace: Option<Namespace<'a>>,
}

impl<'a> Attribute<'a> {
    pub fn new(name: &'a str, value: impl Into<Cow<'a, str>>) -> Self {
        Attribute {
            name,
            value: value.into(),
            namespace: None,
        }
    }

    pub fn set_namespace(mut self, namespace: Namespace<'a>) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub(crate) fn write(&self, out: &mut String, aliases: &super::AliasMap<'a>) {
        let name = match self.namespace.as_ref().and_then(|ns| aliases.get(ns)) {
            Some(alias) => format!("{alias}:{}", self.name),
            None => self.name.to_string(),
        };
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        out.push_str(&super::escape(&self.value));
        out.push('"');
    }
}
