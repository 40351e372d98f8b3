//! Topology construction and structural validation.

use ipnet::Ipv4Net;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};

use super::graph::{RouterGraph, Topology};
use super::types::{
    Endpoint, EndpointSpec, InterfaceId, Link, Node, NodeKind, RoutingMode, Segment, SegmentId,
    SegmentKind, SegmentRequirements,
};
use crate::config::Config;
use crate::error::TopologyError;

/// Interface name a host gets when the link does not name one
pub const DEFAULT_HOST_INTERFACE: &str = "eth0";

#[derive(Debug, Clone)]
struct NodeDecl {
    name: String,
    kind: NodeKind,
    address: Option<Ipv4Net>,
}

/// Collects node, link and segment declarations; [`TopologyBuilder::build`]
/// checks them and produces an immutable [`Topology`].
#[derive(Debug, Clone, Default)]
pub struct TopologyBuilder {
    nodes: Vec<NodeDecl>,
    links: Vec<(EndpointSpec, EndpointSpec)>,
    lan_requirements: Vec<(String, SegmentRequirements)>,
    point_to_point: SegmentRequirements,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate a parsed configuration into builder declarations
    pub fn from_config(config: &Config) -> Result<Self, TopologyError> {
        let mut builder = Self::new();

        for node in &config.nodes {
            builder.add_node_with_address(&node.name, node.kind, node.address);
        }

        for link in &config.links {
            builder.add_link(link.a.parse()?, link.b.parse()?);
        }

        for segment in &config.segments {
            builder.segment_requirements(
                &segment.switch,
                SegmentRequirements {
                    host_count: segment.hosts,
                    prefix_len: segment.prefix_len,
                    cidr: segment.cidr,
                    pool: segment.pool,
                },
            );
        }

        builder.point_to_point(SegmentRequirements {
            prefix_len: Some(config.point_to_point.prefix_len),
            pool: config.point_to_point.pool,
            ..Default::default()
        });

        Ok(builder)
    }

    pub fn add_node(&mut self, name: &str, kind: NodeKind) -> &mut Self {
        self.add_node_with_address(name, kind, None)
    }

    pub fn add_node_with_address(&mut self, name: &str, kind: NodeKind, address: Option<Ipv4Net>) -> &mut Self {
        self.nodes.push(NodeDecl {
            name: name.to_string(),
            kind,
            address,
        });
        self
    }

    pub fn add_link(&mut self, a: EndpointSpec, b: EndpointSpec) -> &mut Self {
        self.links.push((a, b));
        self
    }

    /// Addressing requirements for the LAN behind `switch`
    pub fn segment_requirements(&mut self, switch: &str, requirements: SegmentRequirements) -> &mut Self {
        self.lan_requirements.push((switch.to_string(), requirements));
        self
    }

    /// Addressing requirements shared by all interface-to-interface links
    pub fn point_to_point(&mut self, requirements: SegmentRequirements) -> &mut Self {
        self.point_to_point = requirements;
        self
    }

    /// Validate the declarations and derive segments and the router graph.
    ///
    /// `mode` matters for one check only: under [`RoutingMode::FullMesh`]
    /// every segment needs at least one router attachment.
    pub fn build(&self, mode: RoutingMode) -> Result<Topology, TopologyError> {
        let mut nodes = self.collect_nodes()?;
        let links = self.resolve_links(&mut nodes)?;

        for node in nodes.values() {
            if node.kind != NodeKind::Switch && node.interfaces.is_empty() {
                return Err(TopologyError::DetachedNode {
                    node: node.name.clone(),
                    kind: node.kind.to_string(),
                });
            }
        }

        let segments = self.derive_segments(&nodes, &links)?;

        if mode.forwards() {
            for segment in &segments {
                let has_router = segment
                    .members
                    .iter()
                    .any(|m| nodes.get(&m.node).map_or(false, Node::is_router));
                if !has_router {
                    return Err(TopologyError::SegmentWithoutRouter(segment.name.clone()));
                }
            }
        }

        let interface_segments = segments
            .iter()
            .flat_map(|s| s.members.iter().map(move |m| (m.clone(), s.id)))
            .collect();

        let router_graph = RouterGraph::from_segments(&nodes, &segments);
        debug!(
            "Topology built: {} nodes, {} links, {} segments, {} router edges",
            nodes.len(),
            links.len(),
            segments.len(),
            router_graph.edge_count()
        );

        Ok(Topology {
            nodes,
            links,
            segments,
            interface_segments,
            router_graph,
            mode,
        })
    }

    fn collect_nodes(&self) -> Result<BTreeMap<String, Node>, TopologyError> {
        let mut nodes = BTreeMap::new();

        for decl in &self.nodes {
            if decl.name.trim().is_empty() {
                return Err(TopologyError::EmptyNodeName);
            }
            if decl.address.is_some() {
                match decl.kind {
                    NodeKind::Switch => return Err(TopologyError::SwitchAddressed(decl.name.clone())),
                    NodeKind::Router => return Err(TopologyError::RouterAddressed(decl.name.clone())),
                    NodeKind::Host => {}
                }
            }
            let node = Node {
                name: decl.name.clone(),
                kind: decl.kind,
                interfaces: Vec::new(),
                address: decl.address,
            };
            if nodes.insert(decl.name.clone(), node).is_some() {
                return Err(TopologyError::DuplicateNode(decl.name.clone()));
            }
        }

        Ok(nodes)
    }

    fn resolve_links(&self, nodes: &mut BTreeMap<String, Node>) -> Result<Vec<Link>, TopologyError> {
        let mut attached: HashMap<InterfaceId, usize> = HashMap::new();
        let mut links = Vec::with_capacity(self.links.len());

        for (index, (a, b)) in self.links.iter().enumerate() {
            let unsupported = || TopologyError::UnsupportedLink {
                link: index,
                a: a.to_string(),
                b: b.to_string(),
            };

            if a.node == b.node {
                return Err(unsupported());
            }
            let kind_a = Self::kind_of(nodes, a, index)?;
            let kind_b = Self::kind_of(nodes, b, index)?;
            if kind_a == NodeKind::Switch && kind_b == NodeKind::Switch {
                return Err(unsupported());
            }

            let a = Self::resolve_endpoint(nodes, &mut attached, a, index)?;
            let b = Self::resolve_endpoint(nodes, &mut attached, b, index)?;
            links.push(Link { index, a, b });
        }

        Ok(links)
    }

    fn kind_of(nodes: &BTreeMap<String, Node>, spec: &EndpointSpec, link: usize) -> Result<NodeKind, TopologyError> {
        nodes
            .get(&spec.node)
            .map(|n| n.kind)
            .ok_or_else(|| TopologyError::UnknownNode {
                link,
                node: spec.node.clone(),
            })
    }

    fn resolve_endpoint(
        nodes: &mut BTreeMap<String, Node>,
        attached: &mut HashMap<InterfaceId, usize>,
        spec: &EndpointSpec,
        link: usize,
    ) -> Result<Endpoint, TopologyError> {
        let node = nodes.get_mut(&spec.node).ok_or_else(|| TopologyError::UnknownNode {
            link,
            node: spec.node.clone(),
        })?;

        let name = match node.kind {
            NodeKind::Switch => {
                if let Some(interface) = &spec.interface {
                    return Err(TopologyError::InterfaceOnSwitch {
                        link,
                        node: spec.node.clone(),
                        interface: interface.clone(),
                    });
                }
                return Ok(Endpoint::Switch(node.name.clone()));
            }
            NodeKind::Host => {
                let name = spec
                    .interface
                    .clone()
                    .unwrap_or_else(|| DEFAULT_HOST_INTERFACE.to_string());
                if let Some(existing) = node.interfaces.first() {
                    if *existing != name {
                        return Err(TopologyError::HostMultihomed {
                            host: node.name.clone(),
                            interface: name,
                            link,
                        });
                    }
                }
                name
            }
            NodeKind::Router => match &spec.interface {
                Some(name) => name.clone(),
                None => next_free_interface(&node.interfaces),
            },
        };

        let id = InterfaceId::new(&node.name, &name);
        if let Some(&first) = attached.get(&id) {
            return Err(TopologyError::InterfaceReused {
                interface: id.to_string(),
                first,
                second: link,
            });
        }
        attached.insert(id.clone(), link);
        node.interfaces.push(name);

        Ok(Endpoint::Interface(id))
    }

    fn derive_segments(&self, nodes: &BTreeMap<String, Node>, links: &[Link]) -> Result<Vec<Segment>, TopologyError> {
        let mut requirements: BTreeMap<&str, &SegmentRequirements> = BTreeMap::new();
        for (switch, req) in &self.lan_requirements {
            match nodes.get(switch) {
                Some(node) if node.kind == NodeKind::Switch => {
                    requirements.insert(switch.as_str(), req);
                }
                _ => return Err(TopologyError::NotASwitch(switch.clone())),
            }
        }

        let mut segments: Vec<Segment> = Vec::new();
        let mut lan_index: HashMap<String, SegmentId> = HashMap::new();

        for link in links {
            match (&link.a, &link.b) {
                (Endpoint::Switch(switch), Endpoint::Interface(member))
                | (Endpoint::Interface(member), Endpoint::Switch(switch)) => {
                    let id = *lan_index.entry(switch.clone()).or_insert_with(|| {
                        let id = SegmentId(segments.len());
                        segments.push(Segment {
                            id,
                            name: switch.clone(),
                            kind: SegmentKind::Lan { switch: switch.clone() },
                            members: Vec::new(),
                            requirements: requirements
                                .get(switch.as_str())
                                .map(|r| (*r).clone())
                                .unwrap_or_default(),
                        });
                        id
                    });
                    segments[id.0].members.push(member.clone());
                }
                (Endpoint::Interface(a), Endpoint::Interface(b)) => {
                    let id = SegmentId(segments.len());
                    segments.push(Segment {
                        id,
                        name: format!("{}<->{}", a, b),
                        kind: SegmentKind::PointToPoint { link: link.index },
                        members: vec![a.clone(), b.clone()],
                        requirements: self.point_to_point.clone(),
                    });
                }
                (Endpoint::Switch(a), Endpoint::Switch(b)) => {
                    return Err(TopologyError::UnsupportedLink {
                        link: link.index,
                        a: a.clone(),
                        b: b.clone(),
                    });
                }
            }
        }

        for node in nodes.values().filter(|n| n.kind == NodeKind::Switch) {
            if !lan_index.contains_key(&node.name) {
                warn!("Switch '{}' has no attachments and forms no segment", node.name);
            }
        }

        Ok(segments)
    }
}

/// First `ethN` not yet used by the node
fn next_free_interface(existing: &[String]) -> String {
    (0..)
        .map(|n| format!("eth{}", n))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or_else(|| format!("eth{}", existing.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lan_builder() -> TopologyBuilder {
        let mut b = TopologyBuilder::new();
        b.add_node("r1", NodeKind::Router)
            .add_node("s1", NodeKind::Switch)
            .add_node("h1", NodeKind::Host)
            .add_node("h2", NodeKind::Host);
        b.add_link(EndpointSpec::node("h1"), EndpointSpec::node("s1"))
            .add_link(EndpointSpec::node("h2"), EndpointSpec::node("s1"))
            .add_link(EndpointSpec::node("r1"), EndpointSpec::node("s1"));
        b
    }

    #[test]
    fn test_single_lan() {
        let topo = lan_builder().build(RoutingMode::FullMesh).unwrap();
        assert_eq!(topo.segments().len(), 1);
        let lan = &topo.segments()[0];
        assert!(lan.is_lan());
        assert_eq!(lan.name, "s1");
        assert_eq!(lan.members.len(), 3);
        assert_eq!(topo.routers_on(lan.id).count(), 1);
        assert_eq!(topo.hosts_on(lan.id).count(), 2);
        assert_eq!(topo.host_interface("h1"), Some(InterfaceId::new("h1", "eth0")));
    }

    #[test]
    fn test_router_interfaces_numbered_in_declaration_order() {
        let mut b = lan_builder();
        b.add_node("r2", NodeKind::Router)
            .add_link(EndpointSpec::node("r1"), EndpointSpec::node("r2"))
            .add_link(EndpointSpec::interface("r2", "eth3"), EndpointSpec::interface("r1", "eth5"))
            .add_link(EndpointSpec::node("r2"), EndpointSpec::node("s1"));
        let topo = b.build(RoutingMode::LocalOnly).unwrap();
        let r1 = topo.node("r1").unwrap();
        assert_eq!(r1.interfaces, vec!["eth0", "eth1", "eth5"]);
        let r2 = topo.node("r2").unwrap();
        // the implicit name skips eth3, which was claimed explicitly
        assert_eq!(r2.interfaces, vec!["eth0", "eth3", "eth1"]);
    }

    #[test]
    fn test_explicit_interface_reuse_rejected() {
        let mut b = lan_builder();
        b.add_node("r2", NodeKind::Router)
            .add_link(EndpointSpec::interface("r1", "eth0"), EndpointSpec::node("r2"));
        let err = b.build(RoutingMode::LocalOnly).unwrap_err();
        assert!(matches!(err, TopologyError::InterfaceReused { first: 2, second: 3, .. }));
    }

    #[test]
    fn test_host_second_link_rejected() {
        let mut b = lan_builder();
        b.add_node("s2", NodeKind::Switch)
            .add_link(EndpointSpec::node("h1"), EndpointSpec::node("s2"));
        let err = b.build(RoutingMode::LocalOnly).unwrap_err();
        assert!(matches!(err, TopologyError::InterfaceReused { .. }));

        let mut b = lan_builder();
        b.add_node("s2", NodeKind::Switch)
            .add_link(EndpointSpec::interface("h1", "eth1"), EndpointSpec::node("s2"));
        let err = b.build(RoutingMode::LocalOnly).unwrap_err();
        assert!(matches!(err, TopologyError::HostMultihomed { .. }));
    }

    #[test]
    fn test_unknown_node() {
        let mut b = lan_builder();
        b.add_link(EndpointSpec::node("ghost"), EndpointSpec::node("s1"));
        let err = b.build(RoutingMode::FullMesh).unwrap_err();
        assert_eq!(err, TopologyError::UnknownNode { link: 3, node: "ghost".to_string() });
    }

    #[test]
    fn test_switch_address_rejected() {
        let mut b = TopologyBuilder::new();
        b.add_node_with_address("s1", NodeKind::Switch, Some("10.0.0.1/24".parse().unwrap()));
        let err = b.build(RoutingMode::LocalOnly).unwrap_err();
        assert_eq!(err, TopologyError::SwitchAddressed("s1".to_string()));
    }

    #[test]
    fn test_switch_to_switch_and_self_links_rejected() {
        let mut b = lan_builder();
        b.add_node("s2", NodeKind::Switch)
            .add_link(EndpointSpec::node("s1"), EndpointSpec::node("s2"));
        assert!(matches!(
            b.build(RoutingMode::LocalOnly),
            Err(TopologyError::UnsupportedLink { .. })
        ));

        let mut b = lan_builder();
        b.add_link(EndpointSpec::interface("r1", "eth1"), EndpointSpec::interface("r1", "eth2"));
        assert!(matches!(
            b.build(RoutingMode::LocalOnly),
            Err(TopologyError::UnsupportedLink { .. })
        ));
    }

    #[test]
    fn test_interface_on_switch_rejected() {
        let mut b = lan_builder();
        b.add_node("h3", NodeKind::Host)
            .add_link(EndpointSpec::node("h3"), EndpointSpec::interface("s1", "eth9"));
        assert!(matches!(
            b.build(RoutingMode::LocalOnly),
            Err(TopologyError::InterfaceOnSwitch { .. })
        ));
    }

    #[test]
    fn test_lan_without_router_depends_on_mode() {
        let mut b = TopologyBuilder::new();
        b.add_node("s1", NodeKind::Switch)
            .add_node("h1", NodeKind::Host)
            .add_node("h2", NodeKind::Host)
            .add_link(EndpointSpec::node("h1"), EndpointSpec::node("s1"))
            .add_link(EndpointSpec::node("h2"), EndpointSpec::node("s1"));
        assert!(b.build(RoutingMode::LocalOnly).is_ok());
        assert_eq!(
            b.build(RoutingMode::FullMesh).unwrap_err(),
            TopologyError::SegmentWithoutRouter("s1".to_string())
        );
    }

    #[test]
    fn test_detached_host_rejected() {
        let mut b = lan_builder();
        b.add_node("h9", NodeKind::Host);
        assert!(matches!(
            b.build(RoutingMode::LocalOnly),
            Err(TopologyError::DetachedNode { .. })
        ));
    }

    #[test]
    fn test_requirements_must_name_a_switch() {
        let mut b = lan_builder();
        b.segment_requirements("h1", SegmentRequirements::default());
        assert_eq!(
            b.build(RoutingMode::LocalOnly).unwrap_err(),
            TopologyError::NotASwitch("h1".to_string())
        );
    }

    #[test]
    fn test_transit_lan_links_routers() {
        // Two routers share LAN s1; r2 additionally owns s2
        let mut b = lan_builder();
        b.add_node("r2", NodeKind::Router)
            .add_node("s2", NodeKind::Switch)
            .add_node("h3", NodeKind::Host)
            .add_link(EndpointSpec::node("r2"), EndpointSpec::node("s1"))
            .add_link(EndpointSpec::node("r2"), EndpointSpec::node("s2"))
            .add_link(EndpointSpec::node("h3"), EndpointSpec::node("s2"));
        let topo = b.build(RoutingMode::FullMesh).unwrap();
        let edge = topo.router_graph().edge("r1", "r2").unwrap();
        assert_eq!(topo.segment(edge.segment).name, "s1");
        assert_eq!(edge.remote, InterfaceId::new("r2", "eth0"));
    }

    #[test]
    fn test_duplicate_node() {
        let mut b = lan_builder();
        b.add_node("h1", NodeKind::Host);
        assert_eq!(
            b.build(RoutingMode::LocalOnly).unwrap_err(),
            TopologyError::DuplicateNode("h1".to_string())
        );
    }
}
