//! In-memory session backend.
//!
//! `FakeSession` keeps a small element tree per loaded URL and answers every
//! [`Session`] call against it. Pages are registered as routes that build the
//! document when it is navigated to; elements can carry click and Enter
//! effects, appear or become visible after a delay, sit under an overlay, or
//! live inside an `<iframe>`.
//!
//! Lookups support the locator strategies page objects use: ids, names,
//! class names, tag names, link text, a CSS subset (tag, `#id`, `.class`,
//! `[attr]`, `[attr='v']`, descendant combinator, `,` groups) and an XPath
//! subset (`//tag[...]` with `@attr='v'`, `contains(@attr, 'v')`,
//! `contains(text(), 'v')` and `text()='v'` joined by `and`).

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::Value;

use super::{
    scripts, ElementHandle, ElementState, ScriptArg, Session, SessionError, SessionResult,
};
use crate::locator::{Locator, Strategy};

/// Index of a node in a [`FakeDom`]
pub type NodeId = usize;

const ROOT: NodeId = 0;
const DEFAULT_SIZE: (f64, f64) = (120.0, 24.0);
const MAX_REDIRECTS: usize = 10;
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Callback run against the document (click effect, Enter effect, route)
#[derive(Clone)]
struct Effect(Rc<dyn Fn(&mut FakeDom)>);

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Effect")
    }
}

/// Script result producer
#[derive(Clone)]
struct ScriptFn(Rc<dyn Fn(&FakeDom) -> Value>);

impl fmt::Debug for ScriptFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScriptFn")
    }
}

// =============================================================================
// ELEMENT BUILDER
// =============================================================================

/// Description of an element to insert into a [`FakeDom`]
#[derive(Debug, Clone)]
pub struct FakeElement {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    displayed: bool,
    enabled: bool,
    obscured: bool,
    inert: bool,
    size: (f64, f64),
    appear_after: Option<Duration>,
    show_after: Option<Duration>,
    hide_after: Option<Duration>,
    remove_after: Option<Duration>,
    on_click: Option<Effect>,
    on_enter: Option<Effect>,
    children: Vec<FakeElement>,
}

impl FakeElement {
    /// Visible, enabled element with the given tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            displayed: true,
            enabled: true,
            obscured: false,
            inert: false,
            size: DEFAULT_SIZE,
            appear_after: None,
            show_after: None,
            hide_after: None,
            remove_after: None,
            on_click: None,
            on_enter: None,
            children: Vec::new(),
        }
    }

    /// Set the `id` attribute
    #[must_use]
    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    /// Set the `class` attribute
    #[must_use]
    pub fn class(self, class: impl Into<String>) -> Self {
        self.attr("class", class)
    }

    /// Set the `value` attribute (form controls, options)
    #[must_use]
    pub fn value(self, value: impl Into<String>) -> Self {
        self.attr("value", value)
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Set the element's own text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Render with `display: none`
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// Mark as disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Place an overlay over the element so native clicks are intercepted
    #[must_use]
    pub const fn obscured(mut self) -> Self {
        self.obscured = true;
        self
    }

    /// Ignore pointer input so native clicks fail as not interactable
    #[must_use]
    pub const fn inert(mut self) -> Self {
        self.inert = true;
        self
    }

    /// Rendered size in CSS pixels
    #[must_use]
    pub const fn size(mut self, width: f64, height: f64) -> Self {
        self.size = (width, height);
        self
    }

    /// Insert into the document only after `delay`
    #[must_use]
    pub const fn appear_after(mut self, delay: Duration) -> Self {
        self.appear_after = Some(delay);
        self
    }

    /// Present immediately but hidden until `delay` has passed
    #[must_use]
    pub const fn show_after(mut self, delay: Duration) -> Self {
        self.show_after = Some(delay);
        self
    }

    /// Visible until `delay` has passed, hidden afterwards
    #[must_use]
    pub const fn hide_after(mut self, delay: Duration) -> Self {
        self.hide_after = Some(delay);
        self
    }

    /// Detached from the document once `delay` has passed
    #[must_use]
    pub const fn remove_after(mut self, delay: Duration) -> Self {
        self.remove_after = Some(delay);
        self
    }

    /// Run `effect` when the element is clicked (natively or by script)
    #[must_use]
    pub fn on_click(mut self, effect: impl Fn(&mut FakeDom) + 'static) -> Self {
        self.on_click = Some(Effect(Rc::new(effect)));
        self
    }

    /// Run `effect` when Enter is pressed on the element
    #[must_use]
    pub fn on_enter(mut self, effect: impl Fn(&mut FakeDom) + 'static) -> Self {
        self.on_enter = Some(Effect(Rc::new(effect)));
        self
    }

    /// Append a child element
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Append several child elements
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.children.extend(children);
        self
    }
}

// =============================================================================
// DOCUMENT
// =============================================================================

#[derive(Debug)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    displayed: bool,
    enabled: bool,
    obscured: bool,
    inert: bool,
    size: (f64, f64),
    present_from: Option<Instant>,
    shown_from: Option<Instant>,
    hidden_from: Option<Instant>,
    removed_from: Option<Instant>,
    removed: bool,
    on_click: Option<Effect>,
    on_enter: Option<Effect>,
}

impl Node {
    fn document() -> Self {
        Self {
            tag: "#document".to_string(),
            attrs: BTreeMap::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
            displayed: true,
            enabled: true,
            obscured: false,
            inert: false,
            size: (1280.0, 720.0),
            present_from: None,
            shown_from: None,
            hidden_from: None,
            removed_from: None,
            removed: false,
            on_click: None,
            on_enter: None,
        }
    }

    fn live(&self, now: Instant) -> bool {
        !self.removed
            && self.present_from.map_or(true, |t| now >= t)
            && self.removed_from.map_or(true, |t| now < t)
    }

    fn shown(&self, now: Instant) -> bool {
        self.displayed
            && self.shown_from.map_or(true, |t| now >= t)
            && self.hidden_from.map_or(true, |t| now < t)
    }

    fn is_frame(&self) -> bool {
        self.tag == "iframe" || self.tag == "frame"
    }

    fn classes(&self) -> impl Iterator<Item = &str> {
        self.attrs
            .get("class")
            .map(String::as_str)
            .unwrap_or_default()
            .split_whitespace()
    }
}

/// The document currently loaded in a [`FakeSession`].
///
/// Routes and effects receive it mutably to build or change the page.
#[derive(Debug)]
pub struct FakeDom {
    nodes: Vec<Node>,
    url: String,
    title: String,
    alert: Option<(String, Instant)>,
    pending_navigation: Option<String>,
}

impl FakeDom {
    fn blank(url: &str) -> Self {
        Self {
            nodes: vec![Node::document()],
            url: url.to_string(),
            title: String::new(),
            alert: None,
            pending_navigation: None,
        }
    }

    /// URL of the loaded document
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw value of a query-string parameter of the loaded URL
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let (_, query) = self.url.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.replace('+', " "))
    }

    /// Document title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Set the document title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Append an element to the document body
    pub fn append(&mut self, element: FakeElement) -> NodeId {
        self.insert(ROOT, element, Instant::now())
    }

    /// Append an element under the first match of `parent` (frames included)
    pub fn append_to(&mut self, parent: &Locator, element: FakeElement) -> Option<NodeId> {
        let parent = self.first(parent)?;
        Some(self.insert(parent, element, Instant::now()))
    }

    /// Detach every match of `locator`; returns how many were removed
    pub fn remove(&mut self, locator: &Locator) -> usize {
        let matches = self.all(locator);
        for &id in &matches {
            self.nodes[id].removed = true;
        }
        matches.len()
    }

    /// Replace the own text of the first match
    pub fn set_text(&mut self, locator: &Locator, text: impl Into<String>) -> bool {
        match self.first(locator) {
            Some(id) => {
                self.nodes[id].text = text.into();
                true
            }
            None => false,
        }
    }

    /// Set an attribute on the first match
    pub fn set_attr(
        &mut self,
        locator: &Locator,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> bool {
        match self.first(locator) {
            Some(id) => {
                self.nodes[id].attrs.insert(name.into(), value.into());
                true
            }
            None => false,
        }
    }

    /// Show or hide the first match
    pub fn set_displayed(&mut self, locator: &Locator, displayed: bool) -> bool {
        match self.first(locator) {
            Some(id) => {
                let node = &mut self.nodes[id];
                node.displayed = displayed;
                node.shown_from = None;
                node.hidden_from = None;
                true
            }
            None => false,
        }
    }

    /// `value` attribute of the first match
    #[must_use]
    pub fn value(&self, locator: &Locator) -> Option<String> {
        self.first(locator)
            .and_then(|id| self.nodes[id].attrs.get("value").cloned())
    }

    /// Attribute of the first match
    #[must_use]
    pub fn attr(&self, locator: &Locator, name: &str) -> Option<String> {
        self.first(locator)
            .and_then(|id| self.nodes[id].attrs.get(name).cloned())
    }

    /// Rendered text of the first match
    #[must_use]
    pub fn text(&self, locator: &Locator) -> Option<String> {
        self.first(locator)
            .map(|id| self.rendered_text(id, Instant::now()))
    }

    /// Number of live matches (frames included)
    #[must_use]
    pub fn count(&self, locator: &Locator) -> usize {
        self.all(locator).len()
    }

    /// Request a navigation once the current effect returns
    pub fn navigate(&mut self, url: impl Into<String>) {
        self.pending_navigation = Some(url.into());
    }

    /// Open a JavaScript dialog now
    pub fn open_alert(&mut self, text: impl Into<String>) {
        self.alert = Some((text.into(), Instant::now()));
    }

    /// Open a JavaScript dialog after `delay`
    pub fn open_alert_after(&mut self, text: impl Into<String>, delay: Duration) {
        self.alert = Some((text.into(), Instant::now() + delay));
    }

    fn open_alert_text(&self, now: Instant) -> Option<&str> {
        self.alert
            .as_ref()
            .filter(|(_, from)| now >= *from)
            .map(|(text, _)| text.as_str())
    }

    fn insert(&mut self, parent: NodeId, element: FakeElement, now: Instant) -> NodeId {
        let FakeElement {
            tag,
            attrs,
            text,
            displayed,
            enabled,
            obscured,
            inert,
            size,
            appear_after,
            show_after,
            hide_after,
            remove_after,
            on_click,
            on_enter,
            children,
        } = element;
        let id = self.nodes.len();
        self.nodes.push(Node {
            tag,
            attrs,
            text,
            parent: Some(parent),
            children: Vec::new(),
            displayed,
            enabled,
            obscured,
            inert,
            size,
            present_from: appear_after.map(|d| now + d),
            shown_from: show_after.map(|d| now + d),
            hidden_from: hide_after.map(|d| now + d),
            removed_from: remove_after.map(|d| now + d),
            removed: false,
            on_click,
            on_enter,
        });
        self.nodes[parent].children.push(id);
        for child in children {
            self.insert(id, child, now);
        }
        id
    }

    fn first(&self, locator: &Locator) -> Option<NodeId> {
        self.all(locator).into_iter().next()
    }

    fn all(&self, locator: &Locator) -> Vec<NodeId> {
        Matcher::parse(locator)
            .map(|matcher| self.search(ROOT, &matcher, Instant::now(), true))
            .unwrap_or_default()
    }

    /// Live matches under `root` in document order
    fn search(
        &self,
        root: NodeId,
        matcher: &Matcher,
        now: Instant,
        through_frames: bool,
    ) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[root].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if !node.live(now) {
                continue;
            }
            if matcher.matches(self, id, now) {
                found.push(id);
            }
            if through_frames || !node.is_frame() {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        found
    }

    fn is_present(&self, id: NodeId, now: Instant) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id];
            if !node.live(now) {
                return false;
            }
            current = node.parent;
        }
        true
    }

    fn is_displayed(&self, id: NodeId, now: Instant) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id];
            if !node.shown(now) {
                return false;
            }
            current = node.parent;
        }
        true
    }

    /// Closest enclosing frame element, or the top document
    fn document_of(&self, id: NodeId) -> NodeId {
        let mut current = self.nodes[id].parent;
        while let Some(node_id) = current {
            if node_id == ROOT || self.nodes[node_id].is_frame() {
                return node_id;
            }
            current = self.nodes[node_id].parent;
        }
        ROOT
    }

    fn rendered_text(&self, id: NodeId, now: Instant) -> String {
        let mut parts = Vec::new();
        self.collect_text(id, now, &mut parts);
        parts.join("\n")
    }

    fn collect_text(&self, id: NodeId, now: Instant, parts: &mut Vec<String>) {
        let node = &self.nodes[id];
        let own = node.text.trim();
        if !own.is_empty() {
            parts.push(own.to_string());
        }
        if node.is_frame() {
            return;
        }
        for &child in &node.children {
            let child_node = &self.nodes[child];
            if child_node.live(now) && child_node.shown(now) {
                self.collect_text(child, now, parts);
            }
        }
    }
}

// =============================================================================
// LOCATOR MATCHING
// =============================================================================

#[derive(Debug, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

impl Compound {
    fn parse(src: &str) -> Option<Self> {
        let mut compound = Self::default();
        let end = src.find(['#', '.', '[']).unwrap_or(src.len());
        let tag = &src[..end];
        if !tag.is_empty() && tag != "*" {
            compound.tag = Some(tag.to_ascii_lowercase());
        }
        let mut rest = &src[end..];
        while let Some(first) = rest.chars().next() {
            match first {
                '#' | '.' => {
                    let body = &rest[1..];
                    let end = body.find(['#', '.', '[']).unwrap_or(body.len());
                    let name = &body[..end];
                    if name.is_empty() {
                        return None;
                    }
                    if first == '#' {
                        compound.id = Some(name.to_string());
                    } else {
                        compound.classes.push(name.to_string());
                    }
                    rest = &body[end..];
                }
                '[' => {
                    let close = rest.find(']')?;
                    let inner = &rest[1..close];
                    let attr = match inner.split_once('=') {
                        Some((name, value)) => {
                            (name.trim().to_string(), Some(unquote(value.trim()).to_string()))
                        }
                        None => (inner.trim().to_string(), None),
                    };
                    compound.attrs.push(attr);
                    rest = &rest[close + 1..];
                }
                _ => return None,
            }
        }
        Some(compound)
    }

    fn matches(&self, node: &Node) -> bool {
        self.tag.as_ref().map_or(true, |tag| *tag == node.tag)
            && self
                .id
                .as_ref()
                .map_or(true, |id| node.attrs.get("id") == Some(id))
            && self
                .classes
                .iter()
                .all(|class| node.classes().any(|c| c == class.as_str()))
            && self.attrs.iter().all(|(name, value)| match value {
                Some(value) => node.attrs.get(name) == Some(value),
                None => node.attrs.contains_key(name),
            })
    }
}

#[derive(Debug)]
enum XPathClause {
    AttrEquals(String, String),
    AttrExists(String),
    AttrContains(String, String),
    TextContains(String),
    TextEquals(String),
}

impl XPathClause {
    fn parse(src: &str) -> Option<Self> {
        let src = src.trim();
        if let Some(args) = src
            .strip_prefix("contains(")
            .and_then(|s| s.strip_suffix(')'))
        {
            let (subject, needle) = args.split_once(',')?;
            let needle = unquote(needle.trim()).to_string();
            return match subject.trim() {
                "text()" | "." => Some(Self::TextContains(needle)),
                attr => attr
                    .strip_prefix('@')
                    .map(|name| Self::AttrContains(name.to_string(), needle)),
            };
        }
        if let Some((subject, value)) = src.split_once('=') {
            let value = unquote(value.trim()).to_string();
            return match subject.trim() {
                "text()" | "." => Some(Self::TextEquals(value)),
                attr => attr
                    .strip_prefix('@')
                    .map(|name| Self::AttrEquals(name.to_string(), value)),
            };
        }
        src.strip_prefix('@')
            .map(|name| Self::AttrExists(name.to_string()))
    }

    fn matches(&self, node: &Node) -> bool {
        match self {
            Self::AttrEquals(name, value) => node.attrs.get(name) == Some(value),
            Self::AttrExists(name) => node.attrs.contains_key(name),
            Self::AttrContains(name, needle) => node
                .attrs
                .get(name)
                .is_some_and(|value| value.contains(needle.as_str())),
            Self::TextContains(needle) => node.text.contains(needle.as_str()),
            Self::TextEquals(value) => node.text.trim() == value.as_str(),
        }
    }
}

#[derive(Debug)]
enum Matcher {
    Css(Vec<Vec<Compound>>),
    XPath {
        tag: Option<String>,
        clauses: Vec<XPathClause>,
    },
    Attr(&'static str, String),
    Class(String),
    Tag(String),
    LinkText { text: String, exact: bool },
}

impl Matcher {
    fn parse(locator: &Locator) -> SessionResult<Self> {
        let value = locator.value();
        let invalid = || SessionError::Protocol {
            message: format!("invalid selector: {locator}"),
        };
        Ok(match locator.strategy() {
            Strategy::Id => Self::Attr("id", value.to_string()),
            Strategy::Name => Self::Attr("name", value.to_string()),
            Strategy::ClassName => Self::Class(value.to_string()),
            Strategy::TagName => Self::Tag(value.to_ascii_lowercase()),
            Strategy::LinkText => Self::LinkText {
                text: value.to_string(),
                exact: true,
            },
            Strategy::PartialLinkText => Self::LinkText {
                text: value.to_string(),
                exact: false,
            },
            Strategy::CssSelector => {
                let groups = split_top_level(value, ",")
                    .into_iter()
                    .map(|group| {
                        split_top_level(group, " ")
                            .into_iter()
                            .filter(|part| !part.is_empty())
                            .map(Compound::parse)
                            .collect::<Option<Vec<_>>>()
                    })
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(invalid)?;
                if groups.iter().any(Vec::is_empty) {
                    return Err(invalid());
                }
                Self::Css(groups)
            }
            Strategy::XPath => {
                let body = value.strip_prefix("//").ok_or_else(invalid)?;
                let (tag, predicate) = match body.find('[') {
                    Some(open) => {
                        let predicate = body[open + 1..].strip_suffix(']').ok_or_else(invalid)?;
                        (&body[..open], Some(predicate))
                    }
                    None => (body, None),
                };
                let clauses = predicate
                    .map(|p| {
                        split_top_level(p, " and ")
                            .into_iter()
                            .map(XPathClause::parse)
                            .collect::<Option<Vec<_>>>()
                    })
                    .unwrap_or_else(|| Some(Vec::new()))
                    .ok_or_else(invalid)?;
                Self::XPath {
                    tag: (tag != "*").then(|| tag.to_ascii_lowercase()),
                    clauses,
                }
            }
        })
    }

    fn matches(&self, dom: &FakeDom, id: NodeId, now: Instant) -> bool {
        let node = &dom.nodes[id];
        match self {
            Self::Attr(name, value) => node.attrs.get(*name) == Some(value),
            Self::Class(class) => node.classes().any(|c| c == class.as_str()),
            Self::Tag(tag) => node.tag == *tag,
            Self::LinkText { text, exact } => {
                if node.tag != "a" {
                    return false;
                }
                let rendered = dom.rendered_text(id, now);
                if *exact {
                    rendered.trim() == text.as_str()
                } else {
                    rendered.contains(text.as_str())
                }
            }
            Self::XPath { tag, clauses } => {
                tag.as_ref().map_or(true, |t| *t == node.tag)
                    && clauses.iter().all(|clause| clause.matches(node))
            }
            Self::Css(groups) => groups
                .iter()
                .any(|chain| css_chain_matches(dom, id, chain)),
        }
    }
}

/// Right-to-left descendant matching, bounded by the node's document
fn css_chain_matches(dom: &FakeDom, id: NodeId, chain: &[Compound]) -> bool {
    let Some((last, ancestors)) = chain.split_last() else {
        return false;
    };
    if !last.matches(&dom.nodes[id]) {
        return false;
    }
    let boundary = dom.document_of(id);
    let mut pending = ancestors.iter().rev().peekable();
    let mut current = dom.nodes[id].parent;
    while let Some(compound) = pending.peek() {
        match current {
            Some(node_id) if node_id != boundary => {
                if compound.matches(&dom.nodes[node_id]) {
                    pending.next();
                }
                current = dom.nodes[node_id].parent;
            }
            _ => return false,
        }
    }
    true
}

/// Split on `sep` outside quotes and brackets
fn split_top_level<'a>(src: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut skip_until = 0;
    for (i, c) in src.char_indices() {
        if i < skip_until {
            continue;
        }
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, _) if depth == 0 && src[i..].starts_with(sep) => {
                parts.push(src[start..i].trim());
                start = i + sep.len();
                skip_until = start;
            }
            _ => {}
        }
    }
    parts.push(src[start..].trim());
    parts
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
        .unwrap_or(value)
}

// =============================================================================
// SESSION
// =============================================================================

/// Scripted in-memory browser session.
///
/// ```
/// use storefront::{FakeElement, FakeSession, Locator, Session};
///
/// let mut session = FakeSession::new().with_route("http://shop.test/login", |dom| {
///     dom.set_title("Login");
///     dom.append(FakeElement::new("input").id("email"));
/// });
/// session.navigate("http://shop.test/login").unwrap();
/// assert_eq!(session.title().unwrap(), "Login");
/// assert!(session.find(None, &Locator::id("email")).unwrap().is_some());
/// ```
#[derive(Debug)]
pub struct FakeSession {
    dom: FakeDom,
    generation: u64,
    routes: HashMap<String, Effect>,
    scripts: HashMap<String, ScriptFn>,
    frames: Vec<NodeId>,
    calls: Rc<RefCell<Vec<String>>>,
    closed: bool,
    fail_script_clicks: bool,
    fail_screenshots: bool,
    failing_urls: Vec<String>,
}

impl Default for FakeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSession {
    /// Session showing `about:blank`
    #[must_use]
    pub fn new() -> Self {
        Self {
            dom: FakeDom::blank("about:blank"),
            generation: 0,
            routes: HashMap::new(),
            scripts: HashMap::new(),
            frames: Vec::new(),
            calls: Rc::new(RefCell::new(Vec::new())),
            closed: false,
            fail_script_clicks: false,
            fail_screenshots: false,
            failing_urls: Vec::new(),
        }
    }

    /// Build the document for `url` (matched exactly, then without query)
    #[must_use]
    pub fn with_route(
        mut self,
        url: impl Into<String>,
        build: impl Fn(&mut FakeDom) + 'static,
    ) -> Self {
        self.add_route(url, build);
        self
    }

    /// Register a route on an existing session
    pub fn add_route(&mut self, url: impl Into<String>, build: impl Fn(&mut FakeDom) + 'static) {
        self.routes.insert(url.into(), Effect(Rc::new(build)));
    }

    /// Answer `code` with a fixed value
    #[must_use]
    pub fn with_script(self, code: impl Into<String>, result: Value) -> Self {
        self.with_script_fn(code, move |_| result.clone())
    }

    /// Answer `code` with a value computed from the document
    #[must_use]
    pub fn with_script_fn(
        mut self,
        code: impl Into<String>,
        result: impl Fn(&FakeDom) -> Value + 'static,
    ) -> Self {
        self.scripts.insert(code.into(), ScriptFn(Rc::new(result)));
        self
    }

    /// Make script-driven clicks fail
    #[must_use]
    pub const fn with_failing_script_clicks(mut self) -> Self {
        self.fail_script_clicks = true;
        self
    }

    /// Make screenshots fail
    #[must_use]
    pub const fn with_failing_screenshots(mut self) -> Self {
        self.fail_screenshots = true;
        self
    }

    /// Make navigation to `url` fail
    #[must_use]
    pub fn with_failing_navigation(mut self, url: impl Into<String>) -> Self {
        self.failing_urls.push(url.into());
        self
    }

    /// Loaded document
    #[must_use]
    pub const fn dom(&self) -> &FakeDom {
        &self.dom
    }

    /// Loaded document, for changing the page mid-test
    pub fn dom_mut(&mut self) -> &mut FakeDom {
        &mut self.dom
    }

    /// Shared handle to the call log; stays readable after the session is dropped
    #[must_use]
    pub fn call_log(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.calls)
    }

    /// Calls made so far
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Whether a call named `name` was made
    #[must_use]
    pub fn was_called(&self, name: &str) -> bool {
        self.calls
            .borrow()
            .iter()
            .any(|call| call == name || call.strip_prefix(name).is_some_and(|r| r.starts_with(' ')))
    }

    /// Number of frames entered
    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether `quit` was called
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.closed {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn handle(&self, id: NodeId) -> ElementHandle {
        ElementHandle::new(format!("{}:{id}", self.generation))
    }

    fn current_document(&self, now: Instant) -> SessionResult<NodeId> {
        match self.frames.last() {
            Some(&frame) if self.dom.is_present(frame, now) => Ok(frame),
            Some(_) => Err(SessionError::NoSuchFrame {
                message: "current frame was detached".to_string(),
            }),
            None => Ok(ROOT),
        }
    }

    /// Resolve a handle to a live node of the current document
    fn resolve(&self, element: &ElementHandle, now: Instant) -> SessionResult<NodeId> {
        let stale = || SessionError::StaleElement {
            id: element.id().to_string(),
        };
        let (generation, node) = element.id().split_once(':').ok_or_else(stale)?;
        let generation: u64 = generation.parse().map_err(|_| stale())?;
        let node: NodeId = node.parse().map_err(|_| stale())?;
        if generation != self.generation
            || node == ROOT
            || node >= self.dom.nodes.len()
            || !self.dom.is_present(node, now)
            || self.dom.document_of(node) != self.current_document(now)?
        {
            return Err(stale());
        }
        Ok(node)
    }

    fn interactable(&self, element: &ElementHandle, now: Instant) -> SessionResult<NodeId> {
        let id = self.resolve(element, now)?;
        let node = &self.dom.nodes[id];
        if !self.dom.is_displayed(id, now) || node.size.0 <= 0.0 || node.size.1 <= 0.0 {
            return Err(SessionError::NotInteractable {
                message: format!("element {} is not displayed", element.id()),
            });
        }
        if !node.enabled {
            return Err(SessionError::NotInteractable {
                message: format!("element {} is disabled", element.id()),
            });
        }
        Ok(id)
    }

    fn editable(&self, element: &ElementHandle, now: Instant) -> SessionResult<NodeId> {
        let id = self.interactable(element, now)?;
        if matches!(self.dom.nodes[id].tag.as_str(), "input" | "textarea") {
            Ok(id)
        } else {
            Err(SessionError::NotInteractable {
                message: format!("element {} is not editable", element.id()),
            })
        }
    }

    fn load(&mut self, url: &str) -> SessionResult<()> {
        if self.failing_urls.iter().any(|u| u == url) {
            return Err(SessionError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_REFUSED".to_string(),
            });
        }
        self.generation += 1;
        self.frames.clear();
        self.dom = FakeDom::blank(url);
        let route = self
            .routes
            .get(url)
            .or_else(|| url.split_once('?').and_then(|(path, _)| self.routes.get(path)))
            .cloned();
        match route {
            Some(Effect(build)) => build(&mut self.dom),
            None => self.dom.set_title("404 Not Found"),
        }
        Ok(())
    }

    /// Follow navigations requested by effects
    fn settle(&mut self) -> SessionResult<()> {
        for _ in 0..MAX_REDIRECTS {
            match self.dom.pending_navigation.take() {
                Some(next) => {
                    self.record(format!("navigate {next}"));
                    self.load(&next)?;
                }
                None => return Ok(()),
            }
        }
        Err(SessionError::Navigation {
            url: self.dom.url.clone(),
            message: "too many redirects".to_string(),
        })
    }

    fn run_effect(&mut self, effect: Option<Effect>) -> SessionResult<()> {
        if let Some(Effect(effect)) = effect {
            effect(&mut self.dom);
            self.settle()?;
        }
        Ok(())
    }

    fn activate(&mut self, id: NodeId) -> SessionResult<()> {
        let node = &self.dom.nodes[id];
        if node.on_click.is_some() {
            let effect = node.on_click.clone();
            return self.run_effect(effect);
        }
        if node.tag == "a" {
            if let Some(href) = node.attrs.get("href").filter(|h| !h.starts_with('#')) {
                let target = resolve_href(&self.dom.url, href);
                self.dom.navigate(target);
                return self.settle();
            }
        }
        Ok(())
    }

    fn select_option(&mut self, id: NodeId) -> SessionResult<()> {
        if self.dom.nodes[id].tag != "option" {
            return Err(SessionError::Script {
                message: "argument is not an <option>".to_string(),
            });
        }
        let value = self.dom.nodes[id]
            .attrs
            .get("value")
            .cloned()
            .unwrap_or_else(|| self.dom.nodes[id].text.trim().to_string());
        if let Some(select) = self.dom.nodes[id].parent {
            for sibling in self.dom.nodes[select].children.clone() {
                self.dom.nodes[sibling].attrs.remove("selected");
            }
            self.dom.nodes[select].attrs.insert("value".to_string(), value);
        }
        self.dom.nodes[id]
            .attrs
            .insert("selected".to_string(), "true".to_string());
        Ok(())
    }

    fn element_arg(&self, args: &[ScriptArg], now: Instant) -> SessionResult<NodeId> {
        match args.first() {
            Some(ScriptArg::Element(element)) => self.resolve(element, now),
            _ => Err(SessionError::Script {
                message: "expected an element as arguments[0]".to_string(),
            }),
        }
    }
}

fn resolve_href(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    let origin_end = base
        .find("://")
        .and_then(|scheme| base[scheme + 3..].find('/').map(|p| scheme + 3 + p))
        .unwrap_or(base.len());
    if href.starts_with('/') {
        format!("{}{href}", &base[..origin_end])
    } else {
        format!("{}/{href}", &base[..origin_end])
    }
}

impl Session for FakeSession {
    fn navigate(&mut self, url: &str) -> SessionResult<()> {
        self.ensure_open()?;
        self.record(format!("navigate {url}"));
        self.load(url)?;
        self.settle()
    }

    fn current_url(&self) -> SessionResult<String> {
        self.ensure_open()?;
        Ok(self.dom.url.clone())
    }

    fn title(&self) -> SessionResult<String> {
        self.ensure_open()?;
        Ok(self.dom.title.clone())
    }

    fn find_all(
        &self,
        scope: Option<&ElementHandle>,
        locator: &Locator,
    ) -> SessionResult<Vec<ElementHandle>> {
        self.ensure_open()?;
        self.record(format!("find_all {locator}"));
        let now = Instant::now();
        let root = match scope {
            Some(element) => self.resolve(element, now)?,
            None => self.current_document(now)?,
        };
        let matcher = Matcher::parse(locator)?;
        Ok(self
            .dom
            .search(root, &matcher, now, false)
            .into_iter()
            .map(|id| self.handle(id))
            .collect())
    }

    fn element_state(&self, element: &ElementHandle) -> SessionResult<ElementState> {
        self.ensure_open()?;
        let now = Instant::now();
        let id = self.resolve(element, now)?;
        let node = &self.dom.nodes[id];
        Ok(ElementState {
            displayed: self.dom.is_displayed(id, now),
            enabled: node.enabled,
            width: node.size.0,
            height: node.size.1,
        })
    }

    fn text(&self, element: &ElementHandle) -> SessionResult<String> {
        self.ensure_open()?;
        let now = Instant::now();
        let id = self.resolve(element, now)?;
        if self.dom.is_displayed(id, now) {
            Ok(self.dom.rendered_text(id, now))
        } else {
            Ok(String::new())
        }
    }

    fn attribute(&self, element: &ElementHandle, name: &str) -> SessionResult<Option<String>> {
        self.ensure_open()?;
        let id = self.resolve(element, Instant::now())?;
        Ok(self.dom.nodes[id].attrs.get(name).cloned())
    }

    fn click(&mut self, element: &ElementHandle) -> SessionResult<()> {
        self.ensure_open()?;
        self.record(format!("click {}", element.id()));
        let id = self.interactable(element, Instant::now())?;
        if self.dom.nodes[id].inert {
            return Err(SessionError::NotInteractable {
                message: format!("element {} does not accept pointer input", element.id()),
            });
        }
        if self.dom.nodes[id].obscured {
            return Err(SessionError::ClickIntercepted {
                message: format!(
                    "element {} is not clickable at point; another element would receive the click",
                    element.id()
                ),
            });
        }
        self.activate(id)
    }

    fn clear(&mut self, element: &ElementHandle) -> SessionResult<()> {
        self.ensure_open()?;
        self.record(format!("clear {}", element.id()));
        let id = self.editable(element, Instant::now())?;
        self.dom.nodes[id]
            .attrs
            .insert("value".to_string(), String::new());
        Ok(())
    }

    fn send_keys(&mut self, element: &ElementHandle, text: &str) -> SessionResult<()> {
        self.ensure_open()?;
        self.record(format!("send_keys {} {text}", element.id()));
        let id = self.editable(element, Instant::now())?;
        self.dom.nodes[id]
            .attrs
            .entry("value".to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    fn press_enter(&mut self, element: &ElementHandle) -> SessionResult<()> {
        self.ensure_open()?;
        self.record(format!("press_enter {}", element.id()));
        let id = self.interactable(element, Instant::now())?;
        let effect = self.dom.nodes[id].on_enter.clone();
        self.run_effect(effect)
    }

    fn hover(&mut self, element: &ElementHandle) -> SessionResult<()> {
        self.ensure_open()?;
        self.record(format!("hover {}", element.id()));
        let id = self.resolve(element, Instant::now())?;
        if self.dom.is_displayed(id, Instant::now()) {
            Ok(())
        } else {
            Err(SessionError::NotInteractable {
                message: format!("element {} is not displayed", element.id()),
            })
        }
    }

    fn execute_script(&mut self, code: &str, args: &[ScriptArg]) -> SessionResult<Value> {
        self.ensure_open()?;
        self.record(format!("execute_script {code}"));
        let now = Instant::now();
        match code {
            scripts::CLICK => {
                let id = self.element_arg(args, now)?;
                if self.fail_script_clicks {
                    return Err(SessionError::Script {
                        message: "HTMLElement.click() threw".to_string(),
                    });
                }
                self.activate(id)?;
                Ok(Value::Null)
            }
            scripts::SCROLL_INTO_VIEW => {
                self.element_arg(args, now)?;
                Ok(Value::Null)
            }
            scripts::SELECT_OPTION => {
                let id = self.element_arg(args, now)?;
                self.select_option(id)?;
                Ok(Value::Null)
            }
            _ => match self.scripts.get(code) {
                Some(ScriptFn(script)) => Ok(script(&self.dom)),
                None => Err(SessionError::Script {
                    message: format!("no scripted result for: {code}"),
                }),
            },
        }
    }

    fn screenshot(&self) -> SessionResult<Vec<u8>> {
        self.ensure_open()?;
        self.record("screenshot".to_string());
        if self.fail_screenshots {
            return Err(SessionError::Protocol {
                message: "screenshot capture failed".to_string(),
            });
        }
        Ok(PNG_SIGNATURE.to_vec())
    }

    fn alert_text(&self) -> SessionResult<Option<String>> {
        self.ensure_open()?;
        Ok(self
            .dom
            .open_alert_text(Instant::now())
            .map(str::to_string))
    }

    fn accept_alert(&mut self) -> SessionResult<()> {
        self.ensure_open()?;
        self.record("accept_alert".to_string());
        if self.dom.open_alert_text(Instant::now()).is_none() {
            return Err(SessionError::NoAlert);
        }
        self.dom.alert = None;
        Ok(())
    }

    fn dismiss_alert(&mut self) -> SessionResult<()> {
        self.ensure_open()?;
        self.record("dismiss_alert".to_string());
        if self.dom.open_alert_text(Instant::now()).is_none() {
            return Err(SessionError::NoAlert);
        }
        self.dom.alert = None;
        Ok(())
    }

    fn enter_frame(&mut self, frame: &ElementHandle) -> SessionResult<()> {
        self.ensure_open()?;
        self.record(format!("enter_frame {}", frame.id()));
        let id = self.resolve(frame, Instant::now())?;
        if !self.dom.nodes[id].is_frame() {
            return Err(SessionError::NoSuchFrame {
                message: format!("element {} is not a frame", frame.id()),
            });
        }
        self.frames.push(id);
        Ok(())
    }

    fn leave_frame(&mut self) -> SessionResult<()> {
        self.ensure_open()?;
        self.record("leave_frame".to_string());
        self.frames.pop();
        Ok(())
    }

    fn leave_all_frames(&mut self) -> SessionResult<()> {
        self.ensure_open()?;
        self.record("leave_all_frames".to_string());
        self.frames.clear();
        Ok(())
    }

    fn quit(&mut self) -> SessionResult<()> {
        self.record("quit".to_string());
        self.closed = true;
        Ok(())
    }
}
