use crate::element::{BranchKey, BusKey, ElementKind, NetworkId};
use crate::grid::Grid;
use crate::branch::Branch;
use anyhow::{anyhow, Result};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};

/// Node weight of [`to_graph`]: one per bus.
#[derive(Debug, Clone, PartialEq)]
pub struct BusNode {
    pub key: BusKey,
    pub id: String,
}

/// Edge weight of [`to_graph`]: one per branch.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchEdge {
    pub key: BranchKey,
    pub id: String,
    pub kind: ElementKind,
    pub params_id: Option<String>,
    /// Ampacity times max loading of a line (A)
    pub max_current: Option<f64>,
    /// Rated power times max loading of a transformer (VA)
    pub max_power: Option<f64>,
}

pub type NetworkGraph = UnGraph<BusNode, BranchEdge>;

/// Island summary used in `graph islands`.
#[derive(Debug)]
pub struct IslandSummary {
    pub island_id: usize,
    pub node_count: usize,
}

/// Island of every bus, for `graph islands --emit`.
#[derive(Debug)]
pub struct NodeAssignment {
    pub node_index: usize,
    pub label: String,
    pub island_id: usize,
}

#[derive(Debug)]
pub struct IslandAnalysis {
    pub islands: Vec<IslandSummary>,
    pub assignments: Vec<NodeAssignment>,
}

/// Builds the bus/branch multigraph of a network.
pub fn to_graph(grid: &Grid, net: NetworkId) -> Result<NetworkGraph> {
    let mut graph = NetworkGraph::default();
    let mut nodes: HashMap<BusKey, NodeIndex> = HashMap::new();
    for &key in grid.network_buses(net)? {
        let id = grid.bus(key)?.id().to_string();
        nodes.insert(key, graph.add_node(BusNode { key, id }));
    }
    for &key in grid.network_branches(net)? {
        let (bus1, bus2) = grid.branch_buses(key)?;
        let (Some(&a), Some(&b)) = (nodes.get(&bus1), nodes.get(&bus2)) else {
            return Err(anyhow!("branch #{} ends outside the network", key.value()));
        };
        let branch = grid.branch(key)?;
        let (max_current, max_power) = match branch {
            Branch::Line(line) => (line.max_current().map(|i| i * line.max_loading()), None),
            Branch::Transformer(transformer) => (None, Some(transformer.max_power())),
            Branch::Switch(_) => (None, None),
        };
        graph.add_edge(
            a,
            b,
            BranchEdge {
                key,
                id: branch.id().to_string(),
                kind: branch.kind(),
                params_id: branch.parameters_id().map(str::to_string),
                max_current,
                max_power,
            },
        );
    }
    Ok(graph)
}

/// Groups buses into galvanic islands: buses joined by lines and switches.
/// Transformers separate islands.
pub fn find_islands(grid: &Grid, net: NetworkId) -> Result<IslandAnalysis> {
    let graph = to_graph(grid, net)?;
    let mut visited = HashSet::new();
    let mut islands = Vec::new();
    let mut assignments = Vec::new();
    let mut island_id = 0;
    for start in graph.node_indices() {
        if visited.contains(&start) {
            continue;
        }
        let mut queue = VecDeque::from([start]);
        let mut members = Vec::new();
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            members.push(node);
            for edge in graph.edges(node) {
                if !edge.weight().kind.is_galvanic() {
                    continue;
                }
                let neighbor = if edge.source() == node { edge.target() } else { edge.source() };
                if !visited.contains(&neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        islands.push(IslandSummary {
            island_id,
            node_count: members.len(),
        });
        for node in members {
            assignments.push(NodeAssignment {
                node_index: node.index(),
                label: graph[node].id.clone(),
                island_id,
            });
        }
        island_id += 1;
    }
    assignments.sort_by_key(|assignment| assignment.node_index);
    Ok(IslandAnalysis {
        islands,
        assignments,
    })
}

/// Export the topology to a DOT string (Graphviz).
pub fn export_graph(grid: &Grid, net: NetworkId, format: &str) -> Result<String> {
    match format.to_ascii_lowercase().as_str() {
        "graphviz" | "dot" => Ok(render_dot(&to_graph(grid, net)?)),
        other => Err(anyhow!("unsupported graph export format '{other}'")),
    }
}

fn render_dot(graph: &NetworkGraph) -> String {
    let mut buffer = String::new();
    buffer.push_str("graph spnet_network {\n");
    for node in graph.node_indices() {
        let label = sanitize_label(&graph[node].id);
        buffer.push_str(&format!("  n{} [label=\"{}\"];\n", node.index(), label));
    }
    for edge in graph.edge_references() {
        let source = edge.source().index();
        let target = edge.target().index();
        let weight = edge.weight();
        let style = match weight.kind {
            ElementKind::Transformer => ", style=bold",
            ElementKind::Switch => ", style=dashed",
            _ => "",
        };
        buffer.push_str(&format!(
            "  n{source} -- n{target} [label=\"{}\"{style}];\n",
            sanitize_label(&weight.id)
        ));
    }
    buffer.push('}');
    buffer
}

fn sanitize_label(label: &str) -> String {
    label.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{Line, Switch, Transformer};
    use crate::bus::Bus;
    use crate::parameters::{LineParameters, TransformerParameters};
    use crate::source::VoltageSource;
    use num_complex::Complex64;
    use std::sync::Arc;

    fn network() -> (Grid, NetworkId) {
        let lp = Arc::new(LineParameters::new("lp", Complex64::new(0.1, 0.1), None).with_ampacity(200.0));
        let tp = Arc::new(
            TransformerParameters::new(
                "tp",
                20e3,
                400.0,
                160e3,
                Complex64::new(0.02, 0.05),
                Complex64::new(1e-7, -1e-6),
            )
            .unwrap(),
        );
        let mut grid = Grid::new();
        let hv = grid.add_bus(Bus::new("hv"));
        let lv1 = grid.add_bus(Bus::new("lv\"1"));
        let lv2 = grid.add_bus(Bus::new("lv2"));
        let lv3 = grid.add_bus(Bus::new("lv3"));
        grid.add_source(VoltageSource::new("vs", Complex64::new(20e3, 0.0)), hv)
            .unwrap();
        grid.add_transformer(Transformer::new("tr", tp), hv, lv1).unwrap();
        grid.add_line(Line::new("l", lp, 0.5).unwrap(), lv1, lv2).unwrap();
        grid.add_switch(Switch::new("s"), lv2, lv3).unwrap();
        let net = grid.network_from_element(hv).unwrap();
        (grid, net)
    }

    #[test]
    fn test_to_graph_edges_carry_limits() {
        let (grid, net) = network();
        let graph = to_graph(&grid, net).unwrap();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);

        let line = graph
            .edge_weights()
            .find(|edge| edge.kind == ElementKind::Line)
            .unwrap();
        assert_eq!(line.params_id.as_deref(), Some("lp"));
        assert_eq!(line.max_current, Some(200.0));
        let transformer = graph
            .edge_weights()
            .find(|edge| edge.kind == ElementKind::Transformer)
            .unwrap();
        assert_eq!(transformer.max_power, Some(160e3));
    }

    #[test]
    fn test_transformers_split_islands() {
        let (grid, net) = network();
        let analysis = find_islands(&grid, net).unwrap();
        assert_eq!(analysis.islands.len(), 2);
        assert_eq!(analysis.islands[0].node_count, 1);
        assert_eq!(analysis.islands[1].node_count, 3);
        assert_eq!(analysis.assignments[3].label, "lv3");
        assert_eq!(analysis.assignments[3].island_id, 1);
    }

    #[test]
    fn test_export_graph_dot() {
        let (grid, net) = network();
        let dot = export_graph(&grid, net, "dot").unwrap();
        assert!(dot.starts_with("graph spnet_network {"));
        assert!(dot.contains("[label=\"lv\\\"1\"]"));
        assert!(dot.contains("style=dashed"));
        assert!(export_graph(&grid, net, "svg").is_err());
    }
}
