//! The recursive ID3 tree builder on top of the secure protocol stack.
//!
//! [`SecureId3::run`] grows a decision tree by greedy top-down induction.
//! The impurity evaluation of classic ID3 is replaced, transparently, by the
//! secure square-division protocol: for every candidate attribute, one
//! computation per attribute value is issued through the
//! [`InitiatorController`] and the returned ratios are accumulated into a
//! gain score. The recursion itself is sequential; it suspends only while
//! awaiting a computation's future.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use crate::controller::{Error, InitiatorController};
use crate::data::Row;
use crate::messages::{ClassValue, NodeValuePair};

/// A candidate splitting attribute: a name and the ordered set of its
/// values.
///
/// The values define the branches a tree node splitting on this attribute
/// will have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    values: Vec<String>,
}

impl Attribute {
    /// Creates an attribute from its name and ordered values.
    pub fn new(
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Attribute {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Derives an attribute from rows, collecting its distinct values in
    /// encounter order.
    pub fn from_rows(name: impl Into<String>, rows: &[Row]) -> Self {
        let name = name.into();
        let mut values: Vec<String> = Vec::new();
        for row in rows {
            if let Some(value) = row.get(&name)
                && !values.contains(value)
            {
                values.push(value.clone());
            }
        }
        Attribute { name, values }
    }

    /// The attribute's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attribute's values, in branch order.
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.name, self.values)
    }
}

/// A node of an induced decision tree.
///
/// Internal nodes are labeled with an attribute name and own one child per
/// attribute value; leaves are labeled with a class value and have no
/// children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Id3Node {
    label: String,
    children: BTreeMap<String, Id3Node>,
}

impl Id3Node {
    /// Creates a node without children.
    pub fn new(label: impl Into<String>) -> Self {
        Id3Node {
            label: label.into(),
            children: BTreeMap::new(),
        }
    }

    /// The node's label: an attribute name for internal nodes, a class value
    /// for leaves.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Attaches `child` under the branch `edge`.
    pub fn add(&mut self, edge: impl Into<String>, child: Id3Node) {
        self.children.insert(edge.into(), child);
    }

    /// The branch values leading to children.
    pub fn edges(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    /// The child reached over the branch `edge`, if any.
    pub fn child(&self, edge: &str) -> Option<&Id3Node> {
        self.children.get(edge)
    }

    /// Whether this node is a leaf.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The depth of the subtree below this node; `0` for a leaf.
    pub fn depth(&self) -> usize {
        self.children
            .values()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, prefix: &str) -> fmt::Result {
        let mut children = self.children.iter().peekable();
        while let Some((edge, child)) = children.next() {
            let last = children.peek().is_none();
            let connector = if last { "└╴" } else { "├╴" };
            writeln!(f, "{prefix}{connector} {edge} -> {}", child.label)?;

            let extension = if last { "     " } else { "│    " };
            child.render(f, &format!("{prefix}{extension}"))?;
        }
        Ok(())
    }
}

impl fmt::Display for Id3Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.label)?;
        self.render(f, "")
    }
}

/// Gain evaluation outcome for one candidate attribute.
enum AttributeGain {
    /// Some value of the attribute produced the pure-split sentinel ratio.
    Pure(Option<ClassValue>),
    /// Accumulated ratio over all values of the attribute.
    Sum(f64),
}

/// The recursive ID3 tree builder at the querying party.
pub struct SecureId3 {
    controller: Arc<InitiatorController>,
}

impl SecureId3 {
    /// Creates a tree builder issuing its computations through `controller`.
    pub fn new(controller: Arc<InitiatorController>) -> Self {
        SecureId3 { controller }
    }

    /// The underlying controller, for wiring up transports.
    pub fn controller(&self) -> &Arc<InitiatorController> {
        &self.controller
    }

    /// Induces a decision tree over `attributes`, starting from the filter
    /// constraints in `path` (empty for the tree root).
    ///
    /// A failed sub-computation aborts the whole run. Two quirks of the
    /// protocol as designed are reproduced deliberately: an attribute is
    /// considered fully pure when a value's ratio is exactly `1`, and a leaf
    /// for which no concrete class value could be attributed is labeled with
    /// the placeholder `"empty"`. The class-value attribution is not
    /// well-defined for more than two parties; see the crate documentation.
    pub async fn run(
        &self,
        attributes: &[Attribute],
        path: Vec<NodeValuePair>,
    ) -> Result<Id3Node, Error> {
        self.induce(attributes.to_vec(), path).await
    }

    fn induce(
        &self,
        attributes: Vec<Attribute>,
        path: Vec<NodeValuePair>,
    ) -> BoxFuture<'_, Result<Id3Node, Error>> {
        Box::pin(async move {
            let mut max_gain = 0.0;
            let mut best: Option<usize> = None;
            let mut pure_attributes = 0usize;
            let mut class_value: Option<ClassValue> = None;

            for (index, attribute) in attributes.iter().enumerate() {
                match self.gini_gain(attribute, &path).await? {
                    AttributeGain::Pure(cv) => {
                        pure_attributes += 1;
                        class_value = cv;
                    }
                    // Ties keep the first attribute encountered.
                    AttributeGain::Sum(gain) if gain > max_gain => {
                        max_gain = gain;
                        best = Some(index);
                    }
                    AttributeGain::Sum(_) => {}
                }
            }

            let (Some(best), false) = (best, pure_attributes == 1) else {
                let label = class_value
                    .map(|cv| cv.to_string())
                    .unwrap_or_else(|| "empty".to_string());
                debug!(label = %label, "creating leaf");
                return Ok(Id3Node::new(label));
            };

            let winner = &attributes[best];
            debug!(attribute = winner.name(), gain = max_gain, "splitting");
            let mut node = Id3Node::new(winner.name());

            let remaining: Vec<Attribute> = attributes
                .iter()
                .filter(|a| a.name() != winner.name())
                .cloned()
                .collect();

            for value in winner.values() {
                // A value with no attributes left is pruned rather than
                // growing a dead branch.
                if remaining.is_empty() {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(NodeValuePair::new(winner.name(), value));
                let child = self.induce(remaining.clone(), next_path).await?;
                node.add(value.clone(), child);
            }

            Ok(node)
        })
    }

    /// Accumulates the secure Z/W ratios over all values of `attribute`.
    ///
    /// A ratio of exactly `1` is the pure-split sentinel and short-circuits
    /// the evaluation.
    async fn gini_gain(
        &self,
        attribute: &Attribute,
        path: &[NodeValuePair],
    ) -> Result<AttributeGain, Error> {
        let mut sum = 0.0;
        for value in attribute.values() {
            let result = self.controller.compute(attribute.name(), value, path).await?;
            if result.ratio == 1.0 {
                return Ok(AttributeGain::Pure(result.class_value));
            }
            sum += result.ratio;
        }
        Ok(AttributeGain::Sum(sum))
    }
}
