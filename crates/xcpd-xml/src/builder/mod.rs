//! A lightweight XML document builder. Elements are assembled with a
//! fluent, owned builder API and rendered depth-first, threading a
//! namespace-alias map down from whichever ancestor declared it.

mod attribute;
mod declaration;
mod element;
mod namespace;

pub use attribute::Attribute;
pub use declaration::Declaration;
pub use element::{Content, Element};
pub use namespace::Namespace;

use std::collections::HashMap;

pub type AliasMap<'a> = HashMap<Namespace<'a>, &'a str>;

pub struct Builder<'a> {
    declaration: Option<Declaration<'a>>,
    root: Element<'a>,
}

impl<'a> Builder<'a> {
    pub fn new(declaration: Option<Declaration<'a>>, root: Element<'a>) -> Self {
        Builder { declaration, root }
    }

    pub fn to_xml_string(&self) -> Result<String, crate::XmlError> {
        let mut out = String::new();
        if let Some(decl) = &self.declaration {
            out.push_str(&decl.to_string());
            out.push(' ');
        }
        let aliases = AliasMap::new();
        self.root.write(&mut out, &aliases);
        Ok(out)
    }
}

/// Escapes the five predefined XML entities.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
