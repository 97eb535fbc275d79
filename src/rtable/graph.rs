//! Intra-area shortest path tree over the Router- and Network-LSAs of one area.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::area::lsdb::LsaDb;
use crate::interface::Interface;
use crate::lsa::router::{LS_ID_POINT_TO_POINT, LS_ID_STUB, LS_ID_TRANSIT, LS_ID_VIRTUAL_LINK};
use crate::lsa::{LsaBody, LSInfinity};

use super::{NextHop, Prefix, RouterRoute};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeType {
    Router,
    Transit,
}

/// `id` is the router id, or the link state id of the Network-LSA for transit nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Node {
    pub node_type: NodeType,
    pub id: u32,
}

impl Node {
    pub fn router(id: u32) -> Self {
        Self {
            node_type: NodeType::Router,
            id,
        }
    }
    pub fn transit(id: u32) -> Self {
        Self {
            node_type: NodeType::Transit,
            id,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Edge {
    pub cost: u32,
    /// link data of the originating router link; the interface address on the root.
    pub link_data: u32,
}

#[derive(Clone, Copy, Debug)]
struct Stub {
    prefix: Prefix,
    metric: u32,
}

#[derive(Default)]
pub struct Graph {
    pub nodes: BTreeSet<Node>,
    pub edges: BTreeMap<Node, BTreeMap<Node, Edge>>,
    stubs: BTreeMap<u32, Vec<Stub>>,
    transit_masks: BTreeMap<u32, u32>,
    flags: BTreeMap<u32, u8>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node);
    }
    /// parallel links keep the cheapest one.
    pub fn add_edge(&mut self, from: Node, to: Node, edge: Edge) {
        let edges = self.edges.entry(from).or_default();
        match edges.get(&to) {
            Some(existing) if existing.cost <= edge.cost => {}
            _ => {
                edges.insert(to, edge);
            }
        }
    }
    fn has_edge(&self, from: Node, to: Node) -> bool {
        self.edges
            .get(&from)
            .map(|edges| edges.contains_key(&to))
            .unwrap_or(false)
    }

    /// Builds the graph from the area database. Instances at MaxAge or being
    /// flushed take no part in the calculation.
    pub fn build(lsdb: &LsaDb) -> Self {
        let mut graph = Self::new();
        for (_, entry) in lsdb.iter() {
            if entry.lsa.is_max_age() || entry.flushing {
                continue;
            }
            let header = &entry.lsa.header;
            match &entry.lsa.body {
                LsaBody::Router(router_lsa) => {
                    let node = Node::router(header.advertising_router);
                    graph.add_node(node);
                    graph.flags.insert(header.advertising_router, router_lsa.veb);
                    for link in &router_lsa.link_states {
                        let edge = Edge {
                            cost: link.metric as u32,
                            link_data: link.link_data,
                        };
                        match link.ls_type {
                            LS_ID_POINT_TO_POINT => {
                                graph.add_edge(node, Node::router(link.link_id), edge)
                            }
                            LS_ID_TRANSIT => graph.add_edge(node, Node::transit(link.link_id), edge),
                            LS_ID_STUB => graph
                                .stubs
                                .entry(header.advertising_router)
                                .or_default()
                                .push(Stub {
                                    prefix: Prefix::new(link.link_id, link.link_data),
                                    metric: link.metric as u32,
                                }),
                            LS_ID_VIRTUAL_LINK => {
                                crate::util::debug(&format!(
                                    "virtual link from {} ignored",
                                    crate::util::fmt_id(header.advertising_router)
                                ));
                            }
                            other => {
                                crate::util::error(&format!("unknown router link type: {}", other));
                            }
                        }
                    }
                }
                LsaBody::Network(network_lsa) => {
                    let node = Node::transit(header.link_state_id);
                    graph.add_node(node);
                    graph
                        .transit_masks
                        .insert(header.link_state_id, network_lsa.network_mask);
                    for router in &network_lsa.attached_routers {
                        graph.add_edge(
                            node,
                            Node::router(*router),
                            Edge {
                                cost: 0,
                                link_data: 0,
                            },
                        );
                    }
                }
                _ => {}
            }
        }
        graph
    }
}

#[derive(Debug, PartialEq, Eq)]
struct State {
    cost: u32,
    node: Node,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed for a min-heap; routers before transit nodes on equal cost
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// What one area's shortest path tree yields.
#[derive(Debug, Default)]
pub struct SpfResult {
    /// every router reached, the root excluded.
    pub routers: BTreeMap<u32, RouterRoute>,
    pub networks: BTreeMap<Prefix, (u32, BTreeSet<NextHop>)>,
}

impl SpfResult {
    pub fn abrs(&self) -> BTreeMap<u32, RouterRoute> {
        self.routers
            .iter()
            .filter(|(_, route)| route.veb & crate::lsa::router::ROUTER_FLAG_B != 0)
            .map(|(id, route)| (*id, route.clone()))
            .collect()
    }
    pub fn asbrs(&self) -> BTreeMap<u32, RouterRoute> {
        self.routers
            .iter()
            .filter(|(_, route)| route.veb & crate::lsa::router::ROUTER_FLAG_E != 0)
            .map(|(id, route)| (*id, route.clone()))
            .collect()
    }
    fn add_network(&mut self, prefix: Prefix, cost: u32, next_hops: BTreeSet<NextHop>) {
        match self.networks.get_mut(&prefix) {
            Some((best, _)) if *best < cost => {}
            Some((best, hops)) if *best == cost => hops.extend(next_hops),
            _ => {
                self.networks.insert(prefix, (cost, next_hops));
            }
        }
    }
}

fn interface_by_addr(interfaces: &[Interface], addr: u32) -> Option<u32> {
    interfaces
        .iter()
        .find(|i| crate::util::ipv4_addr_to_bits(i.ip) == addr)
        .or_else(|| interfaces.iter().find(|i| i.ifindex == addr))
        .map(|i| i.ifindex)
}

fn interface_on(interfaces: &[Interface], prefix: &Prefix) -> Option<u32> {
    interfaces
        .iter()
        .find(|i| {
            crate::util::ipv4_addr_to_bits(i.mask) == prefix.mask && i.network() == prefix.addr
        })
        .map(|i| i.ifindex)
}

/// Next hops for `to` reached from `from` over `edge`.
fn next_hops_via(
    root: Node,
    from: Node,
    to: Node,
    edge: &Edge,
    hops: &BTreeMap<Node, BTreeSet<NextHop>>,
    interfaces: &[Interface],
) -> BTreeSet<NextHop> {
    if from == root {
        let ifindex = interface_by_addr(interfaces, edge.link_data);
        let router = match to.node_type {
            NodeType::Router => to.id,
            NodeType::Transit => 0,
        };
        return BTreeSet::from([NextHop { ifindex, router }]);
    }
    let parent = hops.get(&from).cloned().unwrap_or_default();
    if from.node_type == NodeType::Transit && to.node_type == NodeType::Router {
        // a network the root sits on: the neighbor itself is the first hop
        if parent.iter().all(|hop| hop.router == 0) {
            return parent
                .into_iter()
                .map(|hop| NextHop {
                    ifindex: hop.ifindex,
                    router: to.id,
                })
                .collect();
        }
    }
    parent
}

/// Dijkstra from `root` with the two-way connectivity check and equal cost
/// next hop merging. `interfaces` are the root's up interfaces in the area.
pub fn shortest_path_tree(root: u32, lsdb: &LsaDb, interfaces: &[Interface]) -> SpfResult {
    let graph = Graph::build(lsdb);
    let root = Node::router(root);
    let mut result = SpfResult::default();
    if !graph.nodes.contains(&root) {
        return result;
    }

    let mut dist: BTreeMap<Node, u32> = BTreeMap::from([(root, 0)]);
    let mut hops: BTreeMap<Node, BTreeSet<NextHop>> = BTreeMap::new();
    let mut done: BTreeSet<Node> = BTreeSet::new();
    let mut heap = BinaryHeap::new();
    heap.push(State { cost: 0, node: root });

    while let Some(State { cost, node }) = heap.pop() {
        if cost > dist.get(&node).copied().unwrap_or(LSInfinity) || !done.insert(node) {
            continue;
        }
        let Some(edges) = graph.edges.get(&node) else {
            continue;
        };
        for (&to, edge) in edges {
            if done.contains(&to) || !graph.nodes.contains(&to) || !graph.has_edge(to, node) {
                continue;
            }
            let new_cost = cost.saturating_add(edge.cost);
            let new_hops = next_hops_via(root, node, to, edge, &hops, interfaces);
            match dist.get(&to).copied() {
                Some(known) if new_cost > known => {}
                Some(known) if new_cost == known => {
                    hops.entry(to).or_default().extend(new_hops);
                }
                _ => {
                    dist.insert(to, new_cost);
                    hops.insert(to, new_hops);
                    heap.push(State {
                        cost: new_cost,
                        node: to,
                    });
                }
            }
        }
    }

    for node in &done {
        let cost = dist[node];
        let node_hops = hops.get(node).cloned().unwrap_or_default();
        match node.node_type {
            NodeType::Transit => {
                let mask = graph.transit_masks.get(&node.id).copied().unwrap_or(u32::MAX);
                result.add_network(Prefix::new(node.id, mask), cost, node_hops);
            }
            NodeType::Router => {
                for stub in graph.stubs.get(&node.id).into_iter().flatten() {
                    let stub_hops = if *node == root {
                        BTreeSet::from([NextHop {
                            ifindex: interface_on(interfaces, &stub.prefix),
                            router: 0,
                        }])
                    } else {
                        node_hops.clone()
                    };
                    result.add_network(stub.prefix, cost.saturating_add(stub.metric), stub_hops);
                }
                if *node != root {
                    result.routers.insert(
                        node.id,
                        RouterRoute {
                            cost,
                            next_hops: node_hops,
                            veb: graph.flags.get(&node.id).copied().unwrap_or(0),
                        },
                    );
                }
            }
        }
    }
    result
}
