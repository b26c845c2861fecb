//! Query strategies for the three graph shapes.
//!
//! Each [`GraphKind`] knows how to select its links from the relational store:
//! rank every node by the centrality attribute, join it with its community,
//! then keep only links whose endpoints are both within `max_rank` and either
//! share a community or `show_interaction` is set. The SQL text is rendered
//! here with bind parameters only, running it is the provider's job.

use crate::ingest::{EdgeRow, GraphRequest, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    UserUser,
    UserHashtag,
    HashtagHashtag,
}

impl GraphKind {
    /// Unknown graph names fall back to user/user.
    pub fn from_graph_name(name: &str) -> Self {
        match name {
            "user_hashtag" => GraphKind::UserHashtag,
            "hashtag_hashtag" => GraphKind::HashtagHashtag,
            _ => GraphKind::UserUser,
        }
    }

    pub fn links_query(self, request: &GraphRequest) -> LinksQuery {
        let schema = quote_ident(&request.schema);

        // Users and hashtags share the node id space in the user/hashtag
        // graph, the first character tells them apart and each kind gets its
        // own ranking.
        let partition = match self {
            GraphKind::UserHashtag => "graph_name, SUBSTRING(node_id FOR 1)",
            GraphKind::UserUser | GraphKind::HashtagHashtag => "graph_name",
        };

        let (select, joins) = match self {
            GraphKind::UserUser => (
                "user1.screen_name AS source,\n    user2.screen_name AS target,",
                format!(
                    "    INNER JOIN {schema}.user user1 ON user1.id = link.node_out\n    \
                     INNER JOIN {schema}.user user2 ON user2.id = link.node_in\n"
                ),
            ),
            GraphKind::UserHashtag => (
                "'@' || user1.screen_name AS source,\n    node2.node_id AS target,",
                format!(
                    "    INNER JOIN {schema}.user user1 ON user1.id = SUBSTRING(link.node_out FROM 2)\n"
                ),
            ),
            GraphKind::HashtagHashtag => (
                "node1.node_id AS source,\n    node2.node_id AS target,",
                String::new(),
            ),
        };

        let sql = format!(
            "WITH node_rank AS (
    SELECT node_id, graph_name, name,
        RANK () OVER (PARTITION BY {partition} ORDER BY value DESC, node_id) AS rank
    FROM {schema}.node_attribute
    WHERE name = $1
), node_complete AS (
    SELECT nc.graph_name AS graph_name, nr.node_id AS node_id, nr.rank AS rank, nc.value AS community
    FROM {schema}.graph g
        INNER JOIN node_rank nr ON g.name = nr.graph_name
        INNER JOIN {schema}.node_attribute nc ON g.graph_parent = nc.graph_name
            AND nr.graph_name SIMILAR TO $2
            AND nr.node_id = nc.node_id
    WHERE nc.name = $3
)
SELECT {select}
    node1.community AS source_community,
    node2.community AS target_community,
    node1.rank AS source_rank,
    node2.rank AS target_rank,
    weight
FROM node_complete node1
    INNER JOIN {schema}.link link ON node1.node_id = link.node_out
        AND node1.graph_name = link.graph_name
    INNER JOIN node_complete node2 ON node2.node_id = link.node_in
        AND node2.graph_name = link.graph_name
{joins}WHERE node1.graph_name = $4
    AND node1.rank <= $5
    AND node2.rank <= $5
    AND (node1.community = node2.community OR $6)"
        );

        let params = vec![
            QueryParam::Text(request.centrality_attr.clone()),
            QueryParam::Text(format!(
                "{}_{}_[1-9]+",
                request.graph_name, request.community_attr
            )),
            QueryParam::Text(request.community_attr.clone()),
            QueryParam::Text(request.graph_name.clone()),
            QueryParam::Integer(request.max_rank.into()),
            QueryParam::Bool(request.show_interaction),
        ];

        LinksQuery {
            kind: self,
            sql,
            params,
            filter: RowFilter {
                max_rank: request.max_rank,
                show_interaction: request.show_interaction,
            },
        }
    }
}

/// Bind value for a `$n` placeholder, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Text(String),
    Integer(i64),
    Bool(bool),
}

#[derive(Debug, Clone)]
pub struct LinksQuery {
    pub kind: GraphKind,
    pub sql: String,
    pub params: Vec<QueryParam>,
    pub filter: RowFilter,
}

/// The rank and community predicate of [`LinksQuery::sql`], for providers
/// that hold already resolved link rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowFilter {
    pub max_rank: u32,
    pub show_interaction: bool,
}

impl RowFilter {
    /// Rows whose fields can't be interpreted are admitted, rejecting them is
    /// left to validation so the caller gets a precise error.
    pub fn admits(&self, row: &EdgeRow) -> bool {
        let max_rank = i64::from(self.max_rank);

        let within = |rank: &Option<Scalar>| {
            rank.as_ref()
                .and_then(Scalar::as_integer)
                .is_none_or(|rank| rank <= max_rank)
        };

        if !within(&row.source_rank) || !within(&row.target_rank) {
            return false;
        }

        if self.show_interaction {
            return true;
        }

        let source = row.source_community.as_ref().and_then(|c| c.as_label());
        let target = row.target_community.as_ref().and_then(|c| c.as_label());

        match (source, target) {
            (Some(source), Some(target)) => source == target,
            _ => true,
        }
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
