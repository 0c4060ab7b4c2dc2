use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, path::Path, str::FromStr};
use thiserror::Error;
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

impl ElementId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element {}", self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Element {
    pub tag: String,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn text_content(&self) -> &str {
        &self.text
    }

    pub fn set_text_content(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    Click,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Click => f.write_str("click"),
        }
    }
}

/// Listeners see the element the event was dispatched to, like `this` in a handler.
pub type Listener = Box<dyn FnMut(&mut Element)>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unsupported selector `{0}`")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("document has no {0}")]
    UnknownElement(ElementId),
}

// tag, optional #id, any number of .class
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SelectorError::Empty);
        }
        let unsupported = || SelectorError::Unsupported(input.to_string());

        let mut selector = Self::default();
        let tag_len = input.find(['.', '#']).unwrap_or(input.len());
        let (tag, mut rest) = input.split_at(tag_len);
        match tag {
            "" | "*" => {}
            tag if is_ident(tag) => selector.tag = Some(tag.to_ascii_lowercase()),
            _ => return Err(unsupported()),
        }

        while let Some(marker) = rest.chars().next() {
            let after = &rest[1..];
            let len = after.find(['.', '#']).unwrap_or(after.len());
            let (name, tail) = after.split_at(len);
            if !is_ident(name) {
                return Err(unsupported());
            }
            if marker == '#' {
                if selector.id.replace(name.to_string()).is_some() {
                    return Err(unsupported());
                }
            } else {
                selector.classes.push(name.to_string());
            }
            rest = tail;
        }

        Ok(selector)
    }

    pub fn matches(&self, element: &Element) -> bool {
        self.tag
            .as_deref()
            .map_or(true, |tag| element.tag.eq_ignore_ascii_case(tag))
            && self
                .id
                .as_deref()
                .map_or(true, |id| element.get_attribute("id") == Some(id))
            && self.classes.iter().all(|class| element.has_class(class))
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub elements: Vec<Element>,
}

impl Page {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read page {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("invalid page description {}", path.display()))
    }

    pub fn buttons(count: usize) -> Self {
        let elements = (0..count)
            .map(|i| {
                Element::new("button")
                    .with_class("some-button")
                    .with_attribute("data-x", i.to_string())
                    .with_attribute("data-y", (i * 10).to_string())
                    .with_text("Click me")
            })
            .collect();
        Self { elements }
    }
}

struct Node {
    element: Element,
    listeners: Vec<(EventType, Listener)>,
}

#[derive(Default)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_page(page: Page) -> Self {
        let mut document = Self::new();
        for element in page.elements {
            document.append(element);
        }
        document
    }

    pub fn to_page(&self) -> Page {
        Page {
            elements: self.nodes.iter().map(|n| n.element.clone()).collect(),
        }
    }

    pub fn append(&mut self, element: Element) -> ElementId {
        self.nodes.push(Node {
            element,
            listeners: Vec::new(),
        });
        ElementId(self.nodes.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.nodes.get(id.0).map(|n| &n.element)
    }

    pub fn element_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.nodes.get_mut(id.0).map(|n| &mut n.element)
    }

    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (ElementId(i), &n.element))
    }

    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementId>, SelectorError> {
        let selector: Selector = selector.parse()?;
        Ok(self
            .elements()
            .filter(|(_, element)| selector.matches(element))
            .map(|(id, _)| id)
            .collect())
    }

    pub fn add_event_listener<F>(
        &mut self,
        id: ElementId,
        event: EventType,
        listener: F,
    ) -> Result<(), DomError>
    where
        F: FnMut(&mut Element) + 'static,
    {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or(DomError::UnknownElement(id))?;
        node.listeners.push((event, Box::new(listener)));
        Ok(())
    }

    pub fn listener_count(&self, id: ElementId) -> usize {
        self.nodes.get(id.0).map_or(0, |n| n.listeners.len())
    }

    /// Runs every listener registered for `event` on the element, in
    /// registration order, and returns how many ran.
    pub fn dispatch(&mut self, id: ElementId, event: EventType) -> Result<usize, DomError> {
        let Node { element, listeners } = self
            .nodes
            .get_mut(id.0)
            .ok_or(DomError::UnknownElement(id))?;
        trace!(%id, %event, "dispatch");

        let mut ran = 0;
        for (_, listener) in listeners.iter_mut().filter(|(ty, _)| *ty == event) {
            listener(&mut *element);
            ran += 1;
        }
        Ok(ran)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.nodes
                    .iter()
                    .map(|n| (&n.element, n.listeners.len())),
            )
            .finish()
    }
}
