//! Finalized topology and the router adjacency graph.

use std::collections::{BTreeMap, VecDeque};

use super::types::{InterfaceId, Link, Node, NodeKind, RoutingMode, Segment, SegmentId};

/// One usable edge of the router graph, seen from the local router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjacency {
    pub neighbor: String,
    /// Segment carrying the edge: a point-to-point link or a shared transit LAN
    pub segment: SegmentId,
    pub local: InterfaceId,
    pub remote: InterfaceId,
}

/// Graph whose vertices are routers and whose edges are the segments they share
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterGraph {
    adjacency: BTreeMap<String, Vec<Adjacency>>,
}

impl RouterGraph {
    /// Derive router adjacency from segment membership.
    ///
    /// Every pair of distinct routers on a segment is an edge, so a LAN that
    /// carries several routers acts as a transit segment. When two routers
    /// share several segments the earliest declared one carries the edge.
    pub(crate) fn from_segments(nodes: &BTreeMap<String, Node>, segments: &[Segment]) -> Self {
        let mut adjacency: BTreeMap<String, Vec<Adjacency>> = nodes
            .values()
            .filter(|n| n.is_router())
            .map(|n| (n.name.clone(), Vec::new()))
            .collect();

        for segment in segments {
            let routers: Vec<&InterfaceId> = segment
                .members
                .iter()
                .filter(|m| nodes.get(&m.node).map_or(false, Node::is_router))
                .collect();

            for local in &routers {
                for remote in &routers {
                    if local.node == remote.node {
                        continue;
                    }
                    let Some(edges) = adjacency.get_mut(&local.node) else {
                        continue;
                    };
                    if edges.iter().any(|e| e.neighbor == remote.node) {
                        continue;
                    }
                    edges.push(Adjacency {
                        neighbor: remote.node.clone(),
                        segment: segment.id,
                        local: (*local).clone(),
                        remote: (*remote).clone(),
                    });
                }
            }
        }

        for edges in adjacency.values_mut() {
            edges.sort_by(|a, b| a.neighbor.cmp(&b.neighbor));
        }

        Self { adjacency }
    }

    /// Router names in lexicographic order
    pub fn routers(&self) -> impl Iterator<Item = &str> {
        self.adjacency.keys().map(String::as_str)
    }

    pub fn contains(&self, router: &str) -> bool {
        self.adjacency.contains_key(router)
    }

    /// Neighbors of a router, sorted by neighbor name
    pub fn neighbors(&self, router: &str) -> &[Adjacency] {
        self.adjacency.get(router).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The edge from `router` to `neighbor`, if they are adjacent
    pub fn edge(&self, router: &str, neighbor: &str) -> Option<&Adjacency> {
        self.neighbors(router).iter().find(|a| a.neighbor == neighbor)
    }

    /// Number of undirected edges
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum::<usize>() / 2
    }

    /// Unweighted multi-source BFS; routers absent from the result are unreachable
    pub fn distances_from(&self, sources: &[&str]) -> BTreeMap<String, usize> {
        let mut dist = BTreeMap::new();
        let mut queue = VecDeque::new();

        for &source in sources {
            if self.contains(source) && !dist.contains_key(source) {
                dist.insert(source.to_string(), 0);
                queue.push_back(source.to_string());
            }
        }

        while let Some(current) = queue.pop_front() {
            let next = dist[&current] + 1;
            for adj in self.neighbors(&current) {
                if !dist.contains_key(&adj.neighbor) {
                    dist.insert(adj.neighbor.clone(), next);
                    queue.push_back(adj.neighbor.clone());
                }
            }
        }

        dist
    }
}

/// A validated topology; immutable once built
#[derive(Debug, Clone)]
pub struct Topology {
    pub(crate) nodes: BTreeMap<String, Node>,
    pub(crate) links: Vec<Link>,
    pub(crate) segments: Vec<Segment>,
    pub(crate) interface_segments: BTreeMap<InterfaceId, SegmentId>,
    pub(crate) router_graph: RouterGraph,
    pub(crate) mode: RoutingMode,
}

impl Topology {
    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<NodeKind> {
        self.nodes.get(name).map(|n| n.kind)
    }

    /// Router names ordered by name
    pub fn routers(&self) -> impl Iterator<Item = &str> {
        self.nodes.values().filter(|n| n.is_router()).map(|n| n.name.as_str())
    }

    /// Host names ordered by name
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.nodes.values().filter(|n| n.is_host()).map(|n| n.name.as_str())
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Segments in declaration order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, id: SegmentId) -> &Segment {
        &self.segments[id.0]
    }

    pub fn segment_of(&self, interface: &InterfaceId) -> Option<SegmentId> {
        self.interface_segments.get(interface).copied()
    }

    pub fn router_graph(&self) -> &RouterGraph {
        &self.router_graph
    }

    /// Segments reachable from `router` without a hop
    pub fn attached_segments(&self, router: &str) -> Vec<SegmentId> {
        let mut attached: Vec<SegmentId> = self
            .nodes
            .get(router)
            .into_iter()
            .flat_map(|n| n.interfaces.iter().map(move |i| InterfaceId::new(&n.name, i)))
            .filter_map(|id| self.segment_of(&id))
            .collect();
        attached.sort();
        attached.dedup();
        attached
    }

    /// Router interfaces on a segment, in attachment order
    pub fn routers_on(&self, segment: SegmentId) -> impl Iterator<Item = &InterfaceId> {
        self.members_of_kind(segment, NodeKind::Router)
    }

    /// Host interfaces on a segment, in attachment order
    pub fn hosts_on(&self, segment: SegmentId) -> impl Iterator<Item = &InterfaceId> {
        self.members_of_kind(segment, NodeKind::Host)
    }

    fn members_of_kind(&self, segment: SegmentId, kind: NodeKind) -> impl Iterator<Item = &InterfaceId> {
        self.segment(segment)
            .members
            .iter()
            .filter(move |m| self.kind_of(&m.node) == Some(kind))
    }

    /// The single interface of a host
    pub fn host_interface(&self, host: &str) -> Option<InterfaceId> {
        let node = self.nodes.get(host).filter(|n| n.is_host())?;
        node.interfaces.first().map(|i| InterfaceId::new(host, i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{EndpointSpec, NodeKind, TopologyBuilder};

    fn chain() -> Topology {
        // r1 - r2 - r3, plus r4 isolated behind its own LAN
        let mut b = TopologyBuilder::new();
        for r in ["r1", "r2", "r3", "r4"] {
            b.add_node(r, NodeKind::Router);
        }
        b.add_node("s4", NodeKind::Switch).add_node("h4", NodeKind::Host);
        b.add_link(EndpointSpec::node("r1"), EndpointSpec::node("r2"))
            .add_link(EndpointSpec::node("r2"), EndpointSpec::node("r3"))
            .add_link(EndpointSpec::node("r4"), EndpointSpec::node("s4"))
            .add_link(EndpointSpec::node("h4"), EndpointSpec::node("s4"));
        b.build(RoutingMode::FullMesh).unwrap()
    }

    #[test]
    fn test_bfs_distances() {
        let topo = chain();
        let dist = topo.router_graph().distances_from(&["r1"]);
        assert_eq!(dist.get("r1"), Some(&0));
        assert_eq!(dist.get("r2"), Some(&1));
        assert_eq!(dist.get("r3"), Some(&2));
        assert_eq!(dist.get("r4"), None);
    }

    #[test]
    fn test_multi_source_bfs() {
        let topo = chain();
        let dist = topo.router_graph().distances_from(&["r1", "r3"]);
        assert_eq!(dist.get("r2"), Some(&1));
        assert_eq!(dist.get("r3"), Some(&0));
    }

    #[test]
    fn test_edges_are_symmetric() {
        let topo = chain();
        let graph = topo.router_graph();
        assert_eq!(graph.edge_count(), 2);
        let forward = graph.edge("r1", "r2").unwrap();
        let backward = graph.edge("r2", "r1").unwrap();
        assert_eq!(forward.segment, backward.segment);
        assert_eq!(forward.local, backward.remote);
        assert!(graph.neighbors("r4").is_empty());
    }

    #[test]
    fn test_attached_segments() {
        let topo = chain();
        assert_eq!(topo.attached_segments("r2").len(), 2);
        assert_eq!(topo.attached_segments("r4").len(), 1);
        assert!(topo.attached_segments("nope").is_empty());
    }
}
