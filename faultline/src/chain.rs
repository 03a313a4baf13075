//! Walks over the error graph.
//!
//! Every edge kind is normalized by [`unwrap_once`]; the other walks are
//! built on it. All of them use an explicit worklist and an identity set,
//! so graph depth never turns into native recursion and cycles terminate.
//!
//! Walks borrow the graph: results hold [`Link`]s and [`StackModel`]
//! references into the nodes passed in.

use crate::detect::{PanicDetector, PanicSite};
use crate::error::{RichError, SharedError};
use crate::stack::{Frame, StackModel};
use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::error::Error;
use std::fmt;
use std::mem;
use tracing::trace;

/// Identity of a graph node.
///
/// The address alone is not enough: a node may expose a field stored at
/// offset zero as its source, so the value size is part of the key. Text is
/// never used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    address: usize,
    size: usize,
}

impl NodeId {
    /// Identity of `error`.
    pub fn of(error: &(dyn Error + 'static)) -> Self {
        Self {
            address: (error as *const (dyn Error + 'static)).cast::<()>() as usize,
            size: mem::size_of_val(error),
        }
    }
}

// ─── Link ───────────────────────────────────────────────────────────

/// A borrowed graph node, plus the type name recorded when it entered the
/// graph through a [`SharedError`].
#[derive(Clone, Copy)]
pub struct Link<'a> {
    error: &'a (dyn Error + 'static),
    recorded: Option<&'static str>,
}

impl<'a> Link<'a> {
    /// A node with no recorded type name.
    pub fn new(error: &'a (dyn Error + 'static)) -> Self {
        Self {
            error,
            recorded: None,
        }
    }

    fn shared(shared: &'a SharedError) -> Self {
        Self {
            error: shared.as_error(),
            recorded: Some(shared.type_name()),
        }
    }

    /// The node.
    pub fn error(&self) -> &'a (dyn Error + 'static) {
        self.error
    }

    /// The node as a [`RichError`], if it is one.
    pub fn rich(&self) -> Option<&'a RichError> {
        self.error.downcast_ref::<RichError>()
    }

    /// Stack attached to the node.
    pub fn stack(&self) -> Option<&'a StackModel> {
        self.rich().and_then(RichError::stack)
    }

    /// Identity used for deduplication.
    pub fn id(&self) -> NodeId {
        NodeId::of(self.error)
    }

    /// Best available concrete type name.
    pub fn type_name(&self) -> Cow<'static, str> {
        if let Some(rich) = self.rich() {
            return Cow::Owned(rich.type_label());
        }
        if let Some(name) = self.recorded {
            return Cow::Borrowed(name);
        }
        debug_type_name(self.error)
    }
}

impl fmt::Debug for Link<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("type", &self.type_name())
            .field("message", &self.error.to_string())
            .finish()
    }
}

/// Leading identifier of the `Debug` output, e.g. `ParseIntError` for
/// `ParseIntError { kind: InvalidDigit }`.
fn debug_type_name(error: &(dyn Error + 'static)) -> Cow<'static, str> {
    let debug = format!("{error:?}");
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        Cow::Borrowed("dyn Error")
    } else {
        Cow::Owned(name)
    }
}

// ─── Single step ────────────────────────────────────────────────────

/// The outgoing edges of one node.
#[derive(Debug, Default)]
pub struct Unwrapped<'a> {
    /// Causal predecessor.
    pub next: Option<Link<'a>>,
    /// Joined siblings after the first, which is `next`.
    pub joined: Vec<Link<'a>>,
    /// Associated side error.
    pub associated: Option<Link<'a>>,
}

/// Normalize all edge kinds of `link` into one record.
pub fn unwrap_once<'a>(link: Link<'a>) -> Unwrapped<'a> {
    match link.rich() {
        Some(rich) => {
            let joined = rich.joined();
            Unwrapped {
                next: rich.cause().map(Link::shared),
                joined: joined.iter().skip(1).map(Link::shared).collect(),
                associated: rich.associated().map(Link::shared),
            }
        }
        None => Unwrapped {
            next: link.error.source().map(Link::new),
            ..Unwrapped::default()
        },
    }
}

// ─── Chains ─────────────────────────────────────────────────────────

/// How a chain was reached from the node that discovered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// The walk started here.
    Root,
    /// A joined sibling after the first.
    Joined,
    /// An associated side error.
    Associated,
}

/// One causal chain segment, oldest node first.
#[derive(Debug, Clone)]
pub struct Chain<'a> {
    nodes: Vec<Link<'a>>,
    edge: Edge,
}

impl<'a> Chain<'a> {
    /// The node the chain was entered from (its newest node).
    pub fn head(&self) -> Link<'a> {
        // Segments are never empty.
        self.nodes[self.nodes.len() - 1]
    }

    /// Nodes, oldest first.
    pub fn nodes(&self) -> &[Link<'a>] {
        &self.nodes
    }

    /// Nodes, newest first.
    pub fn newest_first(&self) -> impl Iterator<Item = Link<'a>> + '_ {
        self.nodes.iter().rev().copied()
    }

    /// Edge the chain's head was reached through.
    pub fn edge(&self) -> Edge {
        self.edge
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the chain has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Queued,
    Traversed,
}

/// Every causal chain reachable from `root`, in first-discovery order.
///
/// The first chain is `root`'s own, so `chains[0].head()` is `root`. Joined
/// siblings and associated errors start chains of their own, traversed
/// after the current chain ends. A chain stops at the first node already
/// traversed by an earlier walk.
pub fn enumerate_chains<'a>(root: Option<&'a (dyn Error + 'static)>) -> Vec<Chain<'a>> {
    match root {
        Some(root) => enumerate_links(Link::new(root)),
        None => Vec::new(),
    }
}

pub(crate) fn enumerate_links(root: Link<'_>) -> Vec<Chain<'_>> {
    let mut chains = Vec::new();
    let mut seen: HashMap<NodeId, Visit> = HashMap::new();
    let mut heads = VecDeque::new();

    seen.insert(root.id(), Visit::Queued);
    heads.push_back((root, Edge::Root));

    while let Some((head, edge)) = heads.pop_front() {
        let mut segment = Vec::new();
        let mut current = Some(head);

        while let Some(link) = current {
            let id = link.id();
            if seen.insert(id, Visit::Traversed) == Some(Visit::Traversed) {
                trace!(node = ?id, "chain reached a traversed node");
                break;
            }
            segment.push(link);

            let step = unwrap_once(link);
            let joined = step.joined.into_iter().map(|link| (link, Edge::Joined));
            let associated = step.associated.map(|link| (link, Edge::Associated));
            for (extra, kind) in joined.chain(associated) {
                match seen.entry(extra.id()) {
                    Entry::Vacant(slot) => {
                        slot.insert(Visit::Queued);
                        heads.push_back((extra, kind));
                    }
                    Entry::Occupied(_) => trace!(node = ?extra.id(), "side error already seen"),
                }
            }
            current = step.next;
        }

        if !segment.is_empty() {
            segment.reverse();
            chains.push(Chain {
                nodes: segment,
                edge,
            });
        }
    }
    chains
}

// ─── Causal spine ───────────────────────────────────────────────────

/// Causal spine of `root`, newest first, ignoring joined and associated
/// edges. Stops at a repeated node.
fn spine(root: Link<'_>) -> Vec<Link<'_>> {
    let mut seen = HashSet::new();
    let mut nodes = Vec::new();
    let mut current = Some(root);
    while let Some(link) = current {
        if !seen.insert(link.id()) {
            trace!(node = ?link.id(), "causal spine loops back");
            break;
        }
        nodes.push(link);
        current = unwrap_once(link).next;
    }
    nodes
}

/// Concrete type names along the causal spine, `root` first.
pub fn dump_types(root: Option<&(dyn Error + 'static)>) -> Vec<String> {
    root.map(|root| {
        spine(Link::new(root))
            .into_iter()
            .map(|link| link.type_name().into_owned())
            .collect()
    })
    .unwrap_or_default()
}

/// Stacks attached along the causal spine, oldest first.
pub fn collect_stacks<'a>(root: Option<&'a (dyn Error + 'static)>) -> Vec<&'a StackModel> {
    let Some(root) = root else {
        return Vec::new();
    };
    let mut stacks: Vec<&StackModel> = spine(Link::new(root))
        .into_iter()
        .filter_map(|link| link.stack())
        .collect();
    stacks.reverse();
    stacks
}

// ─── Panic search ───────────────────────────────────────────────────

/// Result of [`first_panic_stack`].
#[derive(Debug, Clone, Copy)]
pub struct PanicStack<'a> {
    /// The chosen stack.
    pub stack: &'a StackModel,
    /// Where the panic sits in `stack`; `None` for the fallback stack.
    pub site: Option<PanicSite>,
    /// Stacks examined, oldest first, up to and including `stack`.
    pub examined: usize,
    /// The node carrying `stack`.
    pub owner: Link<'a>,
}

impl<'a> PanicStack<'a> {
    /// True if the stack was captured during a panic.
    pub fn is_panic(&self) -> bool {
        self.site.is_some()
    }

    /// The frame to report: the panic site, or where the stack was
    /// captured.
    pub fn location_frame(&self) -> &'a Frame {
        match self.site {
            Some(site) => &self.stack.frames()[site.panic_index],
            None => self.stack.origin(),
        }
    }
}

/// The oldest stack on the causal spine that `detector` marks as a panic.
///
/// Falls back to the oldest stack of all, with no site, when none is a
/// panic. Returns `None` when the spine carries no stack.
pub fn first_panic_stack<'a>(
    root: Option<&'a (dyn Error + 'static)>,
    detector: &PanicDetector,
) -> Option<PanicStack<'a>> {
    root.and_then(|root| first_panic_link(Link::new(root), detector))
}

pub(crate) fn first_panic_link<'a>(
    root: Link<'a>,
    detector: &PanicDetector,
) -> Option<PanicStack<'a>> {
    let mut stacked: Vec<(Link<'a>, &'a StackModel)> = spine(root)
        .into_iter()
        .filter_map(|link| link.stack().map(|stack| (link, stack)))
        .collect();
    stacked.reverse();

    for (i, &(owner, stack)) in stacked.iter().enumerate() {
        if let Some(site) = detector.indices(stack) {
            return Some(PanicStack {
                stack,
                site: Some(site),
                examined: i + 1,
                owner,
            });
        }
    }

    let examined = stacked.len();
    stacked.first().map(|&(owner, stack)| PanicStack {
        stack,
        site: None,
        examined,
        owner,
    })
}
