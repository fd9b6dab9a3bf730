//! Document tree
//!
//! A [`Tree`] is an ordered list of branches (one per YAML document, one for
//! every other format). A branch is an ordered list of items; an item is a
//! named value or a comment. Order matters: it drives the MAC input and the
//! serialized output.
//!
//! The lifecycle state is part of the type. Stores load a `Tree<Encrypted>`,
//! the engine turns it into a new `Tree<Plaintext>`, and nothing mixes the
//! two.

use crate::error::Result;
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use zeroize::Zeroize;

mod sealed {
    pub trait Sealed {}
}

/// Lifecycle state of a [`Tree`]
pub trait TreeState: sealed::Sealed {
    const NAME: &'static str;
}

/// Values that should be encrypted hold `ENC[...]` strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Encrypted;

/// Every value holds cleartext
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Plaintext;

impl sealed::Sealed for Encrypted {}
impl sealed::Sealed for Plaintext {}

impl TreeState for Encrypted {
    const NAME: &'static str = "encrypted";
}

impl TreeState for Plaintext {
    const NAME: &'static str = "plaintext";
}

/// A value in the tree
#[derive(Debug, Clone, PartialEq, Zeroize)]
pub enum TreeValue {
    String(String),
    /// Raw bytes that are not valid UTF-8 (binary documents)
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    Branch(TreeBranch),
    Sequence(Vec<TreeValue>),
}

impl TreeValue {
    /// Whether this value is a scalar leaf (not a branch or sequence)
    pub fn is_leaf(&self) -> bool {
        !matches!(self, TreeValue::Branch(_) | TreeValue::Sequence(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TreeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// String form of a scalar.
    ///
    /// Integers are decimal, floats use the shortest form without exponent,
    /// booleans are `True`/`False` and null is empty. Containers and
    /// non-UTF-8 bytes have no canonical text and yield `None`.
    pub fn canonical(&self) -> Option<String> {
        match self {
            TreeValue::String(s) => Some(s.clone()),
            TreeValue::Bytes(b) => String::from_utf8(b.clone()).ok(),
            TreeValue::Int(i) => Some(i.to_string()),
            TreeValue::Float(f) => Some(format_float(*f)),
            TreeValue::Bool(true) => Some("True".to_string()),
            TreeValue::Bool(false) => Some("False".to_string()),
            TreeValue::Null => Some(String::new()),
            TreeValue::Branch(_) | TreeValue::Sequence(_) => None,
        }
    }

    /// Bytes fed into the MAC for a scalar
    pub fn canonical_bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            TreeValue::String(s) => Some(Cow::Borrowed(s.as_bytes())),
            TreeValue::Bytes(b) => Some(Cow::Borrowed(b.as_slice())),
            other => other.canonical().map(|s| Cow::Owned(s.into_bytes())),
        }
    }

    /// Name used in type errors
    pub fn kind(&self) -> &'static str {
        match self {
            TreeValue::String(_) => "string",
            TreeValue::Bytes(_) => "bytes",
            TreeValue::Int(_) => "int",
            TreeValue::Float(_) => "float",
            TreeValue::Bool(_) => "bool",
            TreeValue::Null => "null",
            TreeValue::Branch(_) => "mapping",
            TreeValue::Sequence(_) => "sequence",
        }
    }
}

/// Shortest decimal form without exponent, integral values without `.0`.
///
/// Non-finite values are spelled `+Inf`, `-Inf` and `NaN`.
pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f == f64::INFINITY {
        "+Inf".to_string()
    } else if f == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{}", f)
    }
}

impl From<&str> for TreeValue {
    fn from(s: &str) -> Self {
        TreeValue::String(s.to_string())
    }
}

impl From<String> for TreeValue {
    fn from(s: String) -> Self {
        TreeValue::String(s)
    }
}

impl From<Vec<u8>> for TreeValue {
    fn from(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(s) => TreeValue::String(s),
            Err(e) => TreeValue::Bytes(e.into_bytes()),
        }
    }
}

impl From<i64> for TreeValue {
    fn from(i: i64) -> Self {
        TreeValue::Int(i)
    }
}

impl From<f64> for TreeValue {
    fn from(f: f64) -> Self {
        TreeValue::Float(f)
    }
}

impl From<bool> for TreeValue {
    fn from(b: bool) -> Self {
        TreeValue::Bool(b)
    }
}

impl From<TreeBranch> for TreeValue {
    fn from(b: TreeBranch) -> Self {
        TreeValue::Branch(b)
    }
}

/// Key of a tree item
#[derive(Debug, Clone, PartialEq, Eq, Zeroize)]
pub enum TreeKey {
    Name(String),
    /// Comment line; the item's value is always `Null`
    Comment(String),
}

/// One entry of a branch
#[derive(Debug, Clone, PartialEq, Zeroize)]
pub struct TreeItem {
    pub key: TreeKey,
    pub value: TreeValue,
}

impl TreeItem {
    pub fn new(key: impl Into<String>, value: impl Into<TreeValue>) -> Self {
        Self {
            key: TreeKey::Name(key.into()),
            value: value.into(),
        }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            key: TreeKey::Comment(text.into()),
            value: TreeValue::Null,
        }
    }

    /// The item's name, `None` for comments
    pub fn name(&self) -> Option<&str> {
        match &self.key {
            TreeKey::Name(n) => Some(n),
            TreeKey::Comment(_) => None,
        }
    }
}

/// Ordered list of items
#[derive(Debug, Clone, PartialEq, Default, Zeroize)]
pub struct TreeBranch {
    items: Vec<TreeItem>,
}

impl TreeBranch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: TreeItem) {
        self.items.push(item);
    }

    /// Builder-style insert of a named value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<TreeValue>) -> Self {
        self.push(TreeItem::new(key, value));
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TreeItem> {
        self.items.iter()
    }

    pub fn items(&self) -> &[TreeItem] {
        &self.items
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&TreeValue> {
        self.items
            .iter()
            .find(|item| item.name() == Some(key))
            .map(|item| &item.value)
    }

    /// Remove and return the first value stored under `key`
    pub fn remove(&mut self, key: &str) -> Option<TreeValue> {
        let pos = self.items.iter().position(|item| item.name() == Some(key))?;
        Some(self.items.remove(pos).value)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<TreeItem> for TreeBranch {
    fn from_iter<I: IntoIterator<Item = TreeItem>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TreeBranch {
    type Item = &'a TreeItem;
    type IntoIter = std::slice::Iter<'a, TreeItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Callbacks used when rebuilding a tree leaf by leaf
pub trait LeafVisitor {
    /// Map a scalar leaf found at `path`
    fn value(&mut self, path: &[String], value: &TreeValue) -> Result<TreeValue>;

    /// Map a comment found inside the branch at `path`
    fn comment(&mut self, _path: &[String], text: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

/// A document tree in lifecycle state `S`.
///
/// Branch contents are zeroed when the tree is dropped.
#[derive(Clone, PartialEq)]
pub struct Tree<S: TreeState = Plaintext> {
    branches: Vec<TreeBranch>,
    state: PhantomData<S>,
}

impl<S: TreeState> Tree<S> {
    pub fn new(branches: Vec<TreeBranch>) -> Self {
        Self {
            branches,
            state: PhantomData,
        }
    }

    pub fn branches(&self) -> &[TreeBranch] {
        &self.branches
    }

    /// Visit every scalar leaf in document order.
    ///
    /// Sequence elements share their parent's path. Comments are skipped.
    pub fn for_each_leaf(&self, mut f: impl FnMut(&[String], &TreeValue)) {
        let mut path = Vec::new();
        for branch in &self.branches {
            for_each_in_branch(branch, &mut path, &mut f);
        }
    }

    /// Build a tree in state `T` by mapping every leaf through `visitor`.
    ///
    /// The first visitor error aborts the walk; no partial tree escapes.
    pub fn transform<T: TreeState>(&self, visitor: &mut impl LeafVisitor) -> Result<Tree<T>> {
        let mut path = Vec::new();
        let branches = self
            .branches
            .iter()
            .map(|branch| transform_branch(branch, &mut path, visitor))
            .collect::<Result<Vec<_>>>()?;
        Ok(Tree::new(branches))
    }
}

impl<S: TreeState> Drop for Tree<S> {
    fn drop(&mut self) {
        self.branches.zeroize();
    }
}

impl<S: TreeState> fmt::Debug for Tree<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: usize = self.branches.iter().map(TreeBranch::len).sum();
        write!(
            f,
            "Tree<{}>({} branches, {} items)",
            S::NAME,
            self.branches.len(),
            items
        )
    }
}

fn for_each_in_branch(
    branch: &TreeBranch,
    path: &mut Vec<String>,
    f: &mut impl FnMut(&[String], &TreeValue),
) {
    for item in branch {
        if let TreeKey::Name(name) = &item.key {
            path.push(name.clone());
            for_each_in_value(&item.value, path, f);
            path.pop();
        }
    }
}

fn for_each_in_value(
    value: &TreeValue,
    path: &mut Vec<String>,
    f: &mut impl FnMut(&[String], &TreeValue),
) {
    match value {
        TreeValue::Branch(branch) => for_each_in_branch(branch, path, f),
        TreeValue::Sequence(values) => {
            for v in values {
                for_each_in_value(v, path, f);
            }
        }
        leaf => f(path, leaf),
    }
}

fn transform_branch(
    branch: &TreeBranch,
    path: &mut Vec<String>,
    visitor: &mut impl LeafVisitor,
) -> Result<TreeBranch> {
    let mut out = TreeBranch::new();
    for item in branch {
        match &item.key {
            TreeKey::Comment(text) => {
                out.push(TreeItem::comment(visitor.comment(path, text)?));
            }
            TreeKey::Name(name) => {
                path.push(name.clone());
                let value = transform_value(&item.value, path, visitor);
                path.pop();
                out.push(TreeItem::new(name.clone(), value?));
            }
        }
    }
    Ok(out)
}

fn transform_value(
    value: &TreeValue,
    path: &mut Vec<String>,
    visitor: &mut impl LeafVisitor,
) -> Result<TreeValue> {
    match value {
        TreeValue::Branch(branch) => Ok(TreeValue::Branch(transform_branch(
            branch, path, visitor,
        )?)),
        TreeValue::Sequence(values) => values
            .iter()
            .map(|v| transform_value(v, path, visitor))
            .collect::<Result<Vec<_>>>()
            .map(TreeValue::Sequence),
        leaf => visitor.value(path, leaf),
    }
}
