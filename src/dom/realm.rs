use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use kuchiki::traits::*;
use kuchiki::{parse_html, NodeRef};
use serde_json::{Map as JsonMap, Value};
use tracing::debug;

use super::{DomError, DomNode};

/// Per-node state that plain HTML documents cannot express.
struct NodeExtras {
    // Held so the node (and therefore its key) stays alive as long as the
    // extras do.
    _host: NodeRef,
    shadow_root: Option<NodeRef>,
    content_document: Option<NodeRef>,
    properties: JsonMap<String, Value>,
}

#[derive(Default)]
struct RealmState {
    extras: RefCell<HashMap<usize, NodeExtras>>,
}

/// A set of kuchiki documents stitched together through shadow roots and
/// iframe documents. Every document created from one realm can be reached
/// from the others through those links.
///
/// Meant to be short-lived: side tables for shadow roots, frame documents
/// and properties keep their nodes alive and are only freed with the realm.
#[derive(Clone, Default)]
pub struct Realm {
    state: Rc<RealmState>,
}

impl Realm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `html` into a standalone document node.
    pub fn parse_document(&self, html: &str) -> Element {
        Element {
            node: parse_html().one(html),
            state: Rc::clone(&self.state),
        }
    }
}

#[derive(Clone)]
pub struct Element {
    node: NodeRef,
    state: Rc<RealmState>,
}

fn node_key(node: &NodeRef) -> usize {
    Rc::as_ptr(&node.0) as usize
}

fn is_valid_tag_name(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
        }
        _ => false,
    }
}

impl Element {
    fn wrap(&self, node: NodeRef) -> Element {
        Element {
            node,
            state: Rc::clone(&self.state),
        }
    }

    fn with_extras<T>(&self, f: impl FnOnce(&mut NodeExtras) -> T) -> T {
        let mut extras = self.state.extras.borrow_mut();
        let entry = extras
            .entry(node_key(&self.node))
            .or_insert_with(|| NodeExtras {
                _host: self.node.clone(),
                shadow_root: None,
                content_document: None,
                properties: JsonMap::new(),
            });
        f(entry)
    }

    fn read_extras<T>(&self, f: impl FnOnce(&NodeExtras) -> Option<T>) -> Option<T> {
        self.state
            .extras
            .borrow()
            .get(&node_key(&self.node))
            .and_then(f)
    }

    pub fn tag_name(&self) -> Option<String> {
        self.node
            .as_element()
            .map(|element| element.name.local.to_string())
    }

    /// Attach a shadow root whose content is parsed from `html`, replacing
    /// any previous one.
    pub fn attach_shadow(&self, html: &str) -> Element {
        let root = parse_html().one(html);
        self.with_extras(|extras| extras.shadow_root = Some(root.clone()));
        self.wrap(root)
    }

    /// Load `html` as this element's iframe document, replacing any previous
    /// one.
    pub fn load_document(&self, html: &str) -> Element {
        let document = parse_html().one(html);
        self.with_extras(|extras| extras.content_document = Some(document.clone()));
        self.wrap(document)
    }

    pub fn set_property(&self, name: &str, value: Value) {
        self.with_extras(|extras| {
            extras.properties.insert(name.to_string(), value);
        });
    }

    /// Create an empty `<tag>` element and append it as the last child.
    pub fn append_element(&self, tag: &str) -> Result<Element, DomError> {
        if !is_valid_tag_name(tag) {
            return Err(DomError::InvalidTagName(tag.to_string()));
        }
        let scratch = parse_html().one(format!("<{tag}></{tag}>").as_str());
        let created = scratch
            .select_first(tag)
            .map_err(|_| DomError::InvalidTagName(tag.to_string()))?
            .as_node()
            .clone();
        created.detach();
        self.node.append(created.clone());
        Ok(self.wrap(created))
    }

    pub fn same_node(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.node.0, &other.node.0)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag_name() {
            Some(tag) => write!(f, "Element(<{tag}>)"),
            None => write!(f, "Element(#document)"),
        }
    }
}

impl DomNode for Element {
    fn shadow_root(&self) -> Option<Self> {
        self.read_extras(|extras| extras.shadow_root.clone())
            .map(|root| self.wrap(root))
    }

    fn content_document(&self) -> Option<Self> {
        self.read_extras(|extras| extras.content_document.clone())
            .map(|document| self.wrap(document))
    }

    fn query_selector(&self, selector: &str) -> Result<Option<Self>, DomError> {
        let mut matches = self
            .node
            .descendants()
            .select(selector)
            .map_err(|_| DomError::InvalidSelector(selector.to_string()))?;
        Ok(matches.next().map(|found| self.wrap(found.as_node().clone())))
    }

    fn attribute(&self, name: &str) -> Option<String> {
        let element = self.node.as_element()?;
        let attributes = element.attributes.borrow();
        attributes
            .get(name.to_ascii_lowercase().as_str())
            .map(str::to_string)
    }

    fn set_attribute(&self, name: &str, value: &str) {
        let Some(element) = self.node.as_element() else {
            debug!(target = "dom", attribute = name, "ignoring attribute write on non-element");
            return;
        };
        element
            .attributes
            .borrow_mut()
            .insert(name.to_ascii_lowercase().as_str(), value.to_string());
    }

    fn property(&self, name: &str) -> Option<Value> {
        self.read_extras(|extras| extras.properties.get(name).cloned())
    }
}
