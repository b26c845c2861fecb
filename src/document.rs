//! Document assembly.
//!
//! Merges the builder's sizes and colors, the layout's positions and each
//! node's neighbor list into the documents handed to the sink. Field names
//! follow what vis.js network consumers read (`from`/`to` on edges,
//! `value`, `title`, `group` and `font.size` on nodes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::graph::VisGraph;
use crate::ingest::{CommunityId, GraphKey, NodeId};
use crate::layout::{Layout, Point};

/// Line separator used inside hover labels, which are rendered as HTML.
pub const LINE_BREAK: &str = "<br>";

/// Multiplier from the layout's normalized coordinates to display units.
pub const DISPLAY_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Font {
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    pub id: NodeId,
    pub label: String,
    pub shape: String,
    pub size: u32,
    pub value: u32,
    pub font: Font,
    pub title: String,
    pub group: CommunityId,
    pub rank: u32,
    pub color: Color,
    pub x: f64,
    pub y: f64,
    pub neighbors: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDocument {
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f64,
    pub color: Color,
}

/// A finished visualization, stored once per [`GraphKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationDocument {
    #[serde(flatten)]
    pub key: GraphKey,
    pub nodes: Vec<NodeDocument>,
    pub edges: Vec<EdgeDocument>,
}

impl VisualizationDocument {
    pub fn payload(&self) -> GraphPayload<'_> {
        GraphPayload {
            nodes: &self.nodes,
            edges: &self.edges,
        }
    }
}

/// The `{"nodes": [...], "edges": [...]}` shape printed by the CLI.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GraphPayload<'a> {
    pub nodes: &'a [NodeDocument],
    pub edges: &'a [EdgeDocument],
}

/// Lifecycle of a generation job as seen by pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Written before the provider is contacted. No document is readable
    /// under this status.
    Started,
    /// Written together with the document it announces.
    Done,
}

/// Status row for one [`GraphKey`], stamped with the time it was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: JobStatus,
    pub datetime: DateTime<Utc>,
    #[serde(flatten)]
    pub key: GraphKey,
}

impl StatusRecord {
    pub fn new(status: JobStatus, key: GraphKey) -> Self {
        Self {
            status,
            datetime: Utc::now(),
            key,
        }
    }

    pub fn started(key: GraphKey) -> Self {
        Self::new(JobStatus::Started, key)
    }

    pub fn done(key: GraphKey) -> Self {
        Self::new(JobStatus::Done, key)
    }

    pub fn is_done(&self) -> bool {
        self.status == JobStatus::Done
    }
}

/// Hover text: community, rank and id, then one neighbor per line.
pub fn hover_title(community: &CommunityId, rank: u32, id: &NodeId, neighbors: &[NodeId]) -> String {
    let mut title = format!("Community: {community}{LINE_BREAK}Rank: {rank}{LINE_BREAK}{id} Neighbors:");

    for neighbor in neighbors {
        title.push_str(LINE_BREAK);
        title.push_str(neighbor.as_str());
    }

    title
}

/// Builds the final document. Nodes come out in graph insertion order, edges
/// in record order.
pub fn assemble(
    graph: &VisGraph,
    layout: &Layout,
    key: GraphKey,
    display_scale: f64,
) -> VisualizationDocument {
    let adjacency = graph.adjacency();

    let nodes = graph
        .nodes()
        .map(|(index, node)| {
            let neighbors: Vec<NodeId> = adjacency[index.index()]
                .iter()
                .filter_map(|&j| graph.graph.node_weight(j))
                .map(|neighbor| neighbor.id.clone())
                .collect();

            let position = layout.get(index).unwrap_or(Point::ORIGIN);

            NodeDocument {
                label: node.id.to_string(),
                shape: "dot".to_string(),
                size: node.size,
                value: node.size,
                font: Font { size: node.size },
                title: hover_title(&node.community, node.rank.get(), &node.id, &neighbors),
                group: node.community.clone(),
                rank: node.rank.get(),
                color: node.color,
                x: position.x * display_scale,
                y: position.y * display_scale,
                id: node.id.clone(),
                neighbors,
            }
        })
        .collect();

    let edges = graph
        .edges()
        .map(|(source, target, edge)| EdgeDocument {
            from: source.clone(),
            to: target.clone(),
            weight: edge.weight,
            color: edge.color,
        })
        .collect();

    VisualizationDocument { key, nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorAssignment;
    use crate::graph::{SizeScale, build};
    use crate::ingest::{EdgeRow, GraphRequest};
    use crate::layout::{LayoutConfig, spring_layout};

    fn key() -> GraphKey {
        GraphRequest::new("study", "user_user", "louvain", "pagerank", 10, true)
            .unwrap()
            .key()
    }

    fn document(rows: Vec<EdgeRow>) -> (VisualizationDocument, ColorAssignment) {
        let (graph, colors) = build(
            rows.into_iter().map(Ok),
            SizeScale::default(),
            ColorAssignment::new(5),
        )
        .unwrap();
        let layout = spring_layout(&graph, &LayoutConfig::default());
        (assemble(&graph, &layout, key(), DISPLAY_SCALE), colors)
    }

    #[test]
    fn test_hover_title() {
        let title = hover_title(
            &CommunityId::from("3"),
            2,
            &NodeId::from("alice"),
            &[NodeId::from("bob"), NodeId::from("carol")],
        );
        assert_eq!(
            title,
            "Community: 3<br>Rank: 2<br>alice Neighbors:<br>bob<br>carol"
        );
    }

    #[test]
    fn test_assembled_fields() {
        let (doc, colors) = document(vec![
            EdgeRow::new(("A", "B"), (1, 1), (1, 2), 3),
            EdgeRow::new(("B", "C"), (1, 2), (2, 5), 1),
        ]);

        let ids: Vec<_> = doc.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);

        let b = &doc.nodes[1];
        assert_eq!(b.size, 55);
        assert_eq!(b.value, 55);
        assert_eq!(b.font.size, 55);
        assert_eq!(b.label, "B");
        assert_eq!(b.neighbors, vec![NodeId::from("A"), NodeId::from("C")]);
        assert!(b.title.ends_with("Neighbors:<br>A<br>C"));

        let c = &doc.nodes[2];
        assert_eq!(c.color, colors.get(&CommunityId::from("2")).unwrap());
        assert_eq!(c.group, CommunityId::from("2"));

        assert_eq!(doc.edges.len(), 2);
        assert_eq!(doc.edges[1].from, NodeId::from("B"));
        assert_eq!(doc.edges[1].to, NodeId::from("C"));
        assert_eq!(
            doc.edges[1].color,
            colors.get(&CommunityId::from("1")).unwrap()
        );

        for node in &doc.nodes {
            assert!(node.x.is_finite() && node.y.is_finite());
            assert!(node.x.abs() <= DISPLAY_SCALE + 1e-6);
            assert!(node.y.abs() <= DISPLAY_SCALE + 1e-6);
        }
    }

    #[test]
    fn test_document_json_shape() {
        let (doc, _) = document(vec![EdgeRow::new(("A", "B"), (1, 1), (1, 2), 3)]);
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["graph_name"], "user_user");
        assert_eq!(value["max_rank"], 10);
        assert_eq!(value["nodes"][0]["font"]["size"], 60);
        assert_eq!(value["nodes"][0]["shape"], "dot");
        assert_eq!(value["edges"][0]["from"], "A");
        assert!(value["edges"][0]["color"].as_str().unwrap().starts_with("rgb("));

        let payload = serde_json::to_value(doc.payload()).unwrap();
        assert_eq!(payload.as_object().unwrap().len(), 2);

        let back: VisualizationDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back.key, doc.key);
        assert_eq!(back.nodes[1].neighbors, doc.nodes[1].neighbors);
        assert_eq!(back.edges[0].color, doc.edges[0].color);
    }

    #[test]
    fn test_status_record() {
        let before = Utc::now();
        let status = StatusRecord::done(key());
        assert!(status.is_done());
        assert!(status.datetime >= before);

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["status"], "done");
        assert_eq!(value["community_attr"], "louvain");
        assert!(value["datetime"].is_string());

        let back: StatusRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, status);

        let started = StatusRecord::started(key());
        assert!(!started.is_done());
        assert_eq!(serde_json::to_value(&started).unwrap()["status"], "started");
    }
}
