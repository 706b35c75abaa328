//! Tree decompositions of the stop graph, and the walk that reduces them to introduce, forget and
//! join steps.

use std::{
    collections::{BTreeSet, HashMap},
    fs,
    io::Write,
    path::Path,
};

use itertools::Itertools;
use tracing::debug;

use crate::{
    error::{DecompositionError, ParseError},
    graph::{Graph, NodeId},
};

/// A node of a tree decomposition
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bag {
    pub vertices: BTreeSet<NodeId>,
    pub children: Vec<usize>,
    pub parent: Option<usize>,
}

/// Receives the primitive steps of a nice tree decomposition walk
pub trait NiceVisitor: Sized {
    /// `v` enters the bag
    fn introduce(self, v: NodeId) -> Self;
    /// `v` leaves the bag for good
    fn forget(self, v: NodeId) -> Self;
    /// Combine with a sibling that ended in the same bag
    fn join(self, other: Self) -> Self;
}

/// A rooted tree of bags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeDecomposition {
    bags: Vec<Bag>,
    root: usize,
}
impl TreeDecomposition {
    /// Orient an undirected tree of bags away from `root`
    pub fn from_tree(vertices: Vec<BTreeSet<NodeId>>, tree_edges: &[(usize, usize)], root: usize) -> Result<Self, DecompositionError> {
        if vertices.is_empty() {
            return Err(DecompositionError::NoBags);
        }
        let mut neighbours = vec![vec![]; vertices.len()];
        for &(a, b) in tree_edges {
            neighbours[a].push(b);
            neighbours[b].push(a);
        }
        let mut bags = vertices.into_iter()
            .map(|vertices| Bag { vertices, ..Bag::default() })
            .collect_vec();
        let mut seen = vec![false; bags.len()];
        seen[root] = true;
        let mut stack = vec![root];
        while let Some(bag) = stack.pop() {
            for &next in &neighbours[bag] {
                if !seen[next] {
                    seen[next] = true;
                    bags[next].parent = Some(bag);
                    bags[bag].children.push(next);
                    stack.push(next);
                }
            }
        }
        if let Some(unreached) = seen.iter().position(|&s| !s) {
            return Err(DecompositionError::Unreachable(unreached));
        }
        Ok(Self { bags, root })
    }

    /// A path of bags, the first one being the root
    pub fn from_path_decomposition(bags: impl IntoIterator<Item = BTreeSet<NodeId>>) -> Result<Self, DecompositionError> {
        let vertices = bags.into_iter().collect_vec();
        let chain = (1..vertices.len()).map(|i| (i - 1, i)).collect_vec();
        Self::from_tree(vertices, &chain, 0)
    }

    /// The decomposition obtained by eliminating stops in `order`.
    ///
    /// Each stop gets a bag with its neighbours that are eliminated later, with fill-in edges
    /// between them. Stops missing from `order` are eliminated last, in ascending order.
    pub fn from_elimination_order(graph: &Graph, order: &[NodeId]) -> Result<Self, DecompositionError> {
        let order = order.iter().copied()
            .chain(graph.nodes().iter().copied())
            .filter(|v| graph.contains_node(*v))
            .unique()
            .collect_vec();
        if order.is_empty() {
            return Ok(Self { bags: vec![Bag::default()], root: 0 });
        }
        let rank: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, &v)| (v, i)).collect();
        let mut adjacent: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();
        for edge in graph.edges() {
            adjacent.entry(edge.left).or_default().insert(edge.right);
            adjacent.entry(edge.right).or_default().insert(edge.left);
        }

        let mut vertices = Vec::with_capacity(order.len());
        let mut tree_edges = vec![];
        for (i, &v) in order.iter().enumerate() {
            let later: BTreeSet<NodeId> = adjacent.get(&v).into_iter().flatten()
                .copied()
                .filter(|u| rank[u] > i)
                .collect();
            for (&a, &b) in later.iter().tuple_combinations() {
                adjacent.entry(a).or_default().insert(b);
                adjacent.entry(b).or_default().insert(a);
            }
            // attach to the bag of the next neighbour to be eliminated, or to the last bag
            let parent = later.iter().map(|u| rank[u]).min().unwrap_or(order.len() - 1);
            if parent != i {
                tree_edges.push((i, parent));
            }
            vertices.push(later.into_iter().chain([v]).collect());
        }
        Self::from_tree(vertices, &tree_edges, order.len() - 1)
    }

    /// Elimination order by repeatedly picking a stop of minimum degree in the fill-in graph
    pub fn min_degree_order(graph: &Graph) -> Vec<NodeId> {
        let mut adjacent: HashMap<NodeId, BTreeSet<NodeId>> = graph.nodes().iter().map(|&v| (v, BTreeSet::new())).collect();
        for edge in graph.edges() {
            adjacent.entry(edge.left).or_default().insert(edge.right);
            adjacent.entry(edge.right).or_default().insert(edge.left);
        }
        let mut order = Vec::with_capacity(adjacent.len());
        while let Some(v) = adjacent.iter().min_by_key(|(&v, n)| (n.len(), v)).map(|(&v, _)| v) {
            let neighbours = adjacent.remove(&v).unwrap_or_default();
            for &u in &neighbours {
                if let Some(n) = adjacent.get_mut(&u) {
                    n.remove(&v);
                    n.extend(neighbours.iter().filter(|&&w| w != u));
                }
            }
            order.push(v);
        }
        order
    }

    pub fn bags(&self) -> &[Bag] {
        &self.bags
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn max_bag_size(&self) -> usize {
        self.bags.iter().map(|b| b.vertices.len()).max().unwrap_or(0)
    }

    /// Treewidth of this decomposition
    pub fn width(&self) -> usize {
        self.max_bag_size().saturating_sub(1)
    }

    /// Whether no bag has more than one child
    pub fn is_path(&self) -> bool {
        self.bags.iter().all(|b| b.children.len() <= 1)
    }

    /// Check the decomposition properties against `graph`
    pub fn validate(&self, graph: &Graph) -> Result<(), DecompositionError> {
        for (i, bag) in self.bags.iter().enumerate() {
            if let Some(&stop) = bag.vertices.iter().find(|v| !graph.contains_node(**v)) {
                return Err(DecompositionError::UnknownStop { bag: i, stop });
            }
        }
        for edge in graph.edges() {
            if !self.bags.iter().any(|b| b.vertices.contains(&edge.left) && b.vertices.contains(&edge.right)) {
                return Err(DecompositionError::UncoveredEdge { edge: edge.id, left: edge.left, right: edge.right });
            }
        }
        // the bags holding a stop form a subtree iff exactly one of them has no parent holding it
        let mut tops: HashMap<NodeId, usize> = HashMap::new();
        for bag in &self.bags {
            let parent = bag.parent.map(|p| &self.bags[p].vertices);
            for &v in &bag.vertices {
                if !parent.is_some_and(|p| p.contains(&v)) {
                    *tops.entry(v).or_default() += 1;
                }
            }
        }
        for &v in graph.nodes() {
            match tops.get(&v) {
                None => return Err(DecompositionError::MissingStop(v)),
                Some(&n) if n > 1 => return Err(DecompositionError::Disconnected(v)),
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Walk the decomposition bottom-up as a nice tree decomposition.
    ///
    /// A fresh visitor from `leaf` starts at every leaf. Above the real root, a synthetic empty
    /// bag forgets every remaining stop.
    pub fn nice_visit<V: NiceVisitor>(&self, leaf: &impl Fn() -> V) -> V {
        self.visit(&BTreeSet::new(), &[self.root], leaf)
    }

    fn visit<V: NiceVisitor>(&self, vertices: &BTreeSet<NodeId>, children: &[usize], leaf: &impl Fn() -> V) -> V {
        let Some((&first, rest)) = children.split_first() else {
            return vertices.iter().fold(leaf(), |visitor, &v| visitor.introduce(v));
        };
        // stops in no child can wait until the children are joined
        let introduce_later: BTreeSet<NodeId> = vertices.iter()
            .filter(|v| children.iter().all(|&c| !self.bags[c].vertices.contains(v)))
            .copied()
            .collect();
        let descend = |child: usize| {
            let bag = &self.bags[child];
            let mut visitor = self.visit(&bag.vertices, &bag.children, leaf);
            for &v in bag.vertices.difference(vertices) {
                visitor = visitor.forget(v);
            }
            for &v in vertices.difference(&bag.vertices).filter(|v| !introduce_later.contains(v)) {
                visitor = visitor.introduce(v);
            }
            visitor
        };
        let joined = rest.iter().fold(descend(first), |visitor, &c| visitor.join(descend(c)));
        introduce_later.iter().fold(joined, |visitor, &v| visitor.introduce(v))
    }

    /// Parse the PACE `.td` format. Bags are numbered from 1; the last bag becomes the root.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut vertices: Vec<BTreeSet<NodeId>> = vec![];
        let mut tree_edges = vec![];
        let mut header_seen = false;
        // every bag needs its own `b` line
        let line_count = text.lines().count();
        for (number, line) in text.lines().enumerate().map(|(i, l)| (i + 1, l.trim())) {
            if line.is_empty() || line.starts_with('c') {
                continue;
            }
            let tokens = line.split_whitespace().collect_vec();
            let int = |token: &str| token.parse::<usize>()
                .map_err(|_| ParseError::malformed(number, format!("`{token}` is not a number")));
            match tokens[0] {
                "s" => {
                    if tokens.len() < 5 || tokens[1] != "td" {
                        return Err(ParseError::malformed(number, "expected `s td <bags> <bag size> <vertices>`"));
                    }
                    let bags = int(tokens[2])?;
                    if bags > line_count {
                        return Err(ParseError::malformed(number, format!("header announces {bags} bags in {line_count} lines")));
                    }
                    vertices = vec![BTreeSet::new(); bags];
                    header_seen = true;
                }
                "b" => {
                    let id = tokens.get(1).ok_or_else(|| ParseError::malformed(number, "bag line without id"))?;
                    let bag = int(id)?.checked_sub(1)
                        .filter(|&b| b < vertices.len())
                        .ok_or_else(|| ParseError::malformed(number, format!("bag {id} out of range")))?;
                    for token in &tokens[2..] {
                        vertices[bag].insert(int(token)? as NodeId);
                    }
                }
                _ => {
                    if !header_seen {
                        return Err(ParseError::malformed(number, "tree edge before the `s td` header"));
                    }
                    let [a, b] = tokens[..] else {
                        return Err(ParseError::malformed(number, "expected a tree edge `<bag> <bag>`"));
                    };
                    let index = |token: &str| int(token)?.checked_sub(1)
                        .filter(|&b| b < vertices.len())
                        .ok_or_else(|| ParseError::malformed(number, format!("bag {token} out of range")));
                    tree_edges.push((index(a)?, index(b)?));
                }
            }
        }
        let root = vertices.len().checked_sub(1)
            .ok_or_else(|| ParseError::malformed(0, "no bags"))?;
        Self::from_tree(vertices, &tree_edges, root)
            .map_err(|e| ParseError::malformed(0, e.to_string()))
    }

    /// Read a PACE `.td` file
    pub fn read(path: &Path) -> Result<Self, ParseError> {
        let text = fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
        let td = Self::parse(&text)?;
        debug!(path = %path.display(), bags = td.bags.len(), width = td.width(), "read tree decomposition");
        Ok(td)
    }

    /// Write in PACE `.td` format, with the root as the last bag so that reading it back keeps it
    pub fn write(&self, out: &mut impl Write) -> std::io::Result<()> {
        let order = (0..self.bags.len()).filter(|&i| i != self.root).chain([self.root]).collect_vec();
        let number: HashMap<usize, usize> = order.iter().enumerate().map(|(n, &i)| (i, n + 1)).collect();
        let stops = self.bags.iter().flat_map(|b| b.vertices.iter()).unique().count();
        writeln!(out, "s td {} {} {}", self.bags.len(), self.max_bag_size(), stops)?;
        for &i in &order {
            writeln!(out, "b {} {}", number[&i], self.bags[i].vertices.iter().join(" "))?;
        }
        for &i in &order {
            if let Some(parent) = self.bags[i].parent {
                writeln!(out, "{} {}", number[&i], number[&parent])?;
            }
        }
        Ok(())
    }
}
