//! Arena keys and the connectivity ledger shared by every element.
//!
//! Elements never hold references to each other. Each one lives in a slot of
//! the [`Grid`](crate::Grid) arena and records the keys of the elements it
//! touches, in connection order.

use std::fmt;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::branch::Branch;
use crate::bus::Bus;
use crate::load::Load;
use crate::source::VoltageSource;

// Newtype wrappers for arena keys for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusKey(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchKey(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadKey(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceKey(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(usize);

macro_rules! impl_key {
    ($name:ident) => {
        impl $name {
            #[inline]
            pub fn new(value: usize) -> Self {
                Self(value)
            }

            #[inline]
            pub fn value(&self) -> usize {
                self.0
            }
        }
    };
}

impl_key!(BusKey);
impl_key!(BranchKey);
impl_key!(LoadKey);
impl_key!(SourceKey);
impl_key!(NetworkId);

/// Key of any element of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKey {
    Bus(BusKey),
    Branch(BranchKey),
    Load(LoadKey),
    Source(SourceKey),
}

impl From<BusKey> for ElementKey {
    fn from(key: BusKey) -> Self {
        ElementKey::Bus(key)
    }
}

impl From<BranchKey> for ElementKey {
    fn from(key: BranchKey) -> Self {
        ElementKey::Branch(key)
    }
}

impl From<LoadKey> for ElementKey {
    fn from(key: LoadKey) -> Self {
        ElementKey::Load(key)
    }
}

impl From<SourceKey> for ElementKey {
    fn from(key: SourceKey) -> Self {
        ElementKey::Source(key)
    }
}

/// Category of an element, used for id uniqueness and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Bus,
    Line,
    Transformer,
    Switch,
    Load,
    Source,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Bus => "bus",
            ElementKind::Line => "line",
            ElementKind::Transformer => "transformer",
            ElementKind::Switch => "switch",
            ElementKind::Load => "load",
            ElementKind::Source => "voltage source",
        }
    }

    /// Lines and switches conduct galvanically, transformers isolate.
    pub fn is_galvanic(&self) -> bool {
        matches!(self, ElementKind::Line | ElementKind::Switch)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One arena cell: the element, its ledger, its owner and its cached results.
#[derive(Debug, Clone)]
pub(crate) struct Slot<T, R> {
    pub(crate) item: T,
    pub(crate) connected: Vec<ElementKey>,
    pub(crate) network: Option<NetworkId>,
    pub(crate) results: Option<R>,
}

impl<T, R> Slot<T, R> {
    pub(crate) fn new(item: T) -> Self {
        Self {
            item,
            connected: Vec::new(),
            network: None,
            results: None,
        }
    }

    /// Idempotent append to the ledger.
    pub(crate) fn link(&mut self, other: ElementKey) {
        if !self.connected.contains(&other) {
            self.connected.push(other);
        }
    }

    pub(crate) fn unlink(&mut self, other: ElementKey) {
        self.connected.retain(|key| *key != other);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BusEntry {
    pub(crate) bus: Bus,
    /// Last converged potential, used as the warm-start point.
    pub(crate) working: Option<Complex64>,
}

#[derive(Debug, Clone)]
pub(crate) struct BranchEntry {
    pub(crate) branch: Branch,
    pub(crate) bus1: BusKey,
    pub(crate) bus2: BusKey,
}

#[derive(Debug, Clone)]
pub(crate) struct LoadEntry {
    pub(crate) load: Load,
    /// `None` once disconnected.
    pub(crate) bus: Option<BusKey>,
}

#[derive(Debug, Clone)]
pub(crate) struct SourceEntry {
    pub(crate) source: VoltageSource,
    pub(crate) bus: Option<BusKey>,
}
