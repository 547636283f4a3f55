//! Connectivity graph: the directed device graph derived from a layout,
//! with the traversal queries the engine and tooling run over it.

use crate::device::{Connection, Device, EditorLayout};
use crate::id::{DeviceId, NodeKey};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::{HashMap, HashSet, VecDeque};

// ---------------------------------------------------------------------------
// Core data structures
// ---------------------------------------------------------------------------

/// A device together with its deduplicated neighbor lists.
#[derive(Debug, Clone)]
pub struct GraphNode {
    device: Device,
    /// Devices with a connection into this one, in first-seen order.
    inputs: Vec<DeviceId>,
    /// Devices this one connects to, in first-seen order.
    outputs: Vec<DeviceId>,
}

impl GraphNode {
    fn new(device: Device) -> Self {
        Self {
            device,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn inputs(&self) -> &[DeviceId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[DeviceId] {
        &self.outputs
    }
}

/// Node colors for depth-first cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

// ---------------------------------------------------------------------------
// ConnectivityGraph
// ---------------------------------------------------------------------------

/// Directed graph over the devices of one layout.
///
/// The graph is the single owner of the device records. Nodes live in a
/// `SlotMap` arena, indexed by [`DeviceId`] and kept in layout order, so every
/// reader that goes through the graph sees device mutations immediately.
/// The topology is fixed once built; a new layout means a new graph.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityGraph {
    nodes: SlotMap<NodeKey, GraphNode>,
    index: HashMap<DeviceId, NodeKey>,
    /// Node keys in the order their devices first appeared in the layout.
    order: Vec<NodeKey>,
    edge_count: usize,
}

impl ConnectivityGraph {
    /// Build a graph from a layout, copying its devices.
    pub fn build(layout: &EditorLayout) -> Self {
        Self::from_parts(layout.devices.clone(), &layout.connections)
    }

    /// Build a graph that takes ownership of `devices`.
    ///
    /// A device id declared twice keeps its first position with the last
    /// definition. Connections whose endpoints are not both present are
    /// dropped; repeated connections between the same pair collapse into
    /// one edge.
    pub fn from_parts(devices: Vec<Device>, connections: &[Connection]) -> Self {
        let mut graph = Self::default();

        for device in devices {
            let existing = graph.index.get(&device.id).copied();
            match existing {
                Some(key) => graph.nodes[key].device = device,
                None => {
                    let id = device.id.clone();
                    let key = graph.nodes.insert(GraphNode::new(device));
                    graph.index.insert(id, key);
                    graph.order.push(key);
                }
            }
        }

        for conn in connections {
            let (Some(&from), Some(&to)) = (
                graph.index.get(&conn.from_device_id),
                graph.index.get(&conn.to_device_id),
            ) else {
                continue;
            };

            let outputs = &mut graph.nodes[from].outputs;
            if outputs.contains(&conn.to_device_id) {
                continue;
            }
            outputs.push(conn.to_device_id.clone());

            let inputs = &mut graph.nodes[to].inputs;
            if !inputs.contains(&conn.from_device_id) {
                inputs.push(conn.from_device_id.clone());
            }
            graph.edge_count += 1;
        }

        graph
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn get_node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&key| &self.nodes[key])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// The device record for `id`.
    pub fn device(&self, id: &str) -> Option<&Device> {
        self.get_node(id).map(GraphNode::device)
    }

    /// Mutable access to a device record. Only the engine mutates devices.
    pub(crate) fn device_mut(&mut self, id: &str) -> Option<&mut Device> {
        let key = *self.index.get(id)?;
        self.nodes.get_mut(key).map(|node| &mut node.device)
    }

    /// Outputs of `id`; empty for unknown ids.
    pub fn connected_outputs(&self, id: &str) -> &[DeviceId] {
        self.get_node(id).map(GraphNode::outputs).unwrap_or(&[])
    }

    /// Inputs of `id`; empty for unknown ids.
    pub fn connected_inputs(&self, id: &str) -> &[DeviceId] {
        self.get_node(id).map(GraphNode::inputs).unwrap_or(&[])
    }

    /// Iterate over the devices in layout order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.order.iter().map(|&key| &self.nodes[key].device)
    }

    /// Mutable iteration over every device, in no particular order.
    pub(crate) fn devices_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.nodes.values_mut().map(|node| &mut node.device)
    }

    /// Iterate over the device ids in layout order.
    pub fn device_ids(&self) -> impl Iterator<Item = &DeviceId> {
        self.devices().map(|d| &d.id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct directed edges.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    /// Shortest path (by edge count) from `from` to `to`, both ends included.
    /// `Some([from])` when they are equal; `None` when `to` is unreachable.
    pub fn path(&self, from: &str, to: &str) -> Option<Vec<DeviceId>> {
        if from == to {
            return Some(vec![DeviceId::from(from)]);
        }
        let start = *self.index.get(from)?;

        let mut parent: SecondaryMap<NodeKey, NodeKey> = SecondaryMap::new();
        let mut visited: HashSet<NodeKey> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(key) = queue.pop_front() {
            for next_id in &self.nodes[key].outputs {
                let next = self.index[next_id];
                if !visited.insert(next) {
                    continue;
                }
                parent.insert(next, key);
                if next_id.as_str() == to {
                    let mut path = vec![next_id.clone()];
                    let mut cursor = next;
                    while let Some(&prev) = parent.get(cursor) {
                        path.push(self.nodes[prev].device.id.clone());
                        cursor = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }

        None
    }

    /// Every device reachable from `start` by following outputs, in
    /// breadth-first order. `start` itself is never included.
    pub fn reachable_devices(&self, start: &str) -> Vec<DeviceId> {
        let Some(&start_key) = self.index.get(start) else {
            return Vec::new();
        };

        let mut visited: HashSet<NodeKey> = HashSet::from([start_key]);
        let mut queue = VecDeque::from([start_key]);
        let mut reached = Vec::new();

        while let Some(key) = queue.pop_front() {
            for next_id in &self.nodes[key].outputs {
                let next = self.index[next_id];
                if visited.insert(next) {
                    reached.push(next_id.clone());
                    queue.push_back(next);
                }
            }
        }

        reached
    }

    /// Devices with no inputs, plus every device tagged as a source.
    pub fn source_devices(&self) -> Vec<&Device> {
        self.order
            .iter()
            .map(|&key| &self.nodes[key])
            .filter(|node| node.inputs.is_empty() || node.device.is_source())
            .map(GraphNode::device)
            .collect()
    }

    /// Devices with no outputs, plus every device tagged as a sink.
    pub fn sink_devices(&self) -> Vec<&Device> {
        self.order
            .iter()
            .map(|&key| &self.nodes[key])
            .filter(|node| node.outputs.is_empty() || node.device.is_sink())
            .map(GraphNode::device)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Cycles and ordering
    // -----------------------------------------------------------------------

    /// White/gray/black depth-first search. Self-loops count as cycles.
    pub fn has_cycle(&self) -> bool {
        let mut marks: SecondaryMap<NodeKey, Mark> = SecondaryMap::new();
        for &key in &self.order {
            marks.insert(key, Mark::White);
        }

        for &root in &self.order {
            if marks[root] != Mark::White {
                continue;
            }

            // Explicit stack of (node, next output index) so deep chains
            // cannot overflow the call stack.
            marks[root] = Mark::Gray;
            let mut stack: Vec<(NodeKey, usize)> = vec![(root, 0)];

            while let Some(top) = stack.last_mut() {
                let (key, next) = *top;
                let outputs = &self.nodes[key].outputs;
                if next == outputs.len() {
                    marks[key] = Mark::Black;
                    stack.pop();
                    continue;
                }
                top.1 += 1;
                let child = self.index[&outputs[next]];

                match marks[child] {
                    Mark::Gray => return true,
                    Mark::White => {
                        marks[child] = Mark::Gray;
                        stack.push((child, 0));
                    }
                    Mark::Black => {}
                }
            }
        }

        false
    }

    /// Kahn's algorithm over in-degrees, seeded in layout order.
    ///
    /// Returns every device, disconnected components included, or `None`
    /// when a cycle leaves some node unprocessed.
    pub fn topological_sort(&self) -> Option<Vec<DeviceId>> {
        let mut in_degree: SecondaryMap<NodeKey, usize> = SecondaryMap::new();
        let mut queue: VecDeque<NodeKey> = VecDeque::new();
        for &key in &self.order {
            let deg = self.nodes[key].inputs.len();
            in_degree.insert(key, deg);
            if deg == 0 {
                queue.push_back(key);
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(key) = queue.pop_front() {
            let node = &self.nodes[key];
            order.push(node.device.id.clone());

            for dest_id in &node.outputs {
                let dest = self.index[dest_id];
                let deg = &mut in_degree[dest];
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(dest);
                }
            }
        }

        (order.len() == self.nodes.len()).then_some(order)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
