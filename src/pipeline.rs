//! End-to-end generation: query, build, layout, assemble, commit.

use std::time::Instant;

use tracing::Level;

use crate::color::ColorAssignment;
use crate::document::{DISPLAY_SCALE, StatusRecord, VisualizationDocument, assemble};
use crate::error::VisError;
use crate::graph::{SizeScale, build};
use crate::ingest::{EdgeSource, GraphKey, GraphRequest};
use crate::layout::{LayoutConfig, spring_layout};
use crate::sink::DocumentSink;
use crate::utils::as_overhead;

/// What a run produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A fresh document, already committed to the sink.
    Generated(VisualizationDocument),
    /// A `done` document found in the sink; nothing was recomputed.
    Cached(VisualizationDocument),
}

impl Outcome {
    pub fn document(&self) -> &VisualizationDocument {
        match self {
            Outcome::Generated(doc) | Outcome::Cached(doc) => doc,
        }
    }

    pub fn into_document(self) -> VisualizationDocument {
        match self {
            Outcome::Generated(doc) | Outcome::Cached(doc) => doc,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Outcome::Cached(_))
    }
}

/// Run configuration. All knobs have working defaults, so
/// `Pipeline::new().run(..)` is enough for the common case.
#[derive(Debug, Clone)]
pub struct Pipeline {
    seed: u64,
    size_scale: SizeScale,
    layout: LayoutConfig,
    display_scale: f64,
    force: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            seed: crate::DEFAULT_SEED,
            size_scale: SizeScale::default(),
            layout: LayoutConfig::default(),
            display_scale: DISPLAY_SCALE,
            force: false,
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed for both community colors and initial layout positions.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn size_scale(mut self, size_scale: SizeScale) -> Self {
        self.size_scale = size_scale;
        self
    }

    /// Layout parameters. The layout seed is overridden by [`Pipeline::seed`].
    pub fn layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    pub fn display_scale(mut self, display_scale: f64) -> Self {
        self.display_scale = display_scale;
        self
    }

    /// Regenerate even when the sink already holds a finished document.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Produces the document for `request`.
    ///
    /// A `started` status is written before the provider is contacted. If any
    /// later stage fails, the status the sink held before the run is put
    /// back, so a failed run leaves no trace. The document and its `done`
    /// status are committed together once everything else succeeded.
    pub fn run<S, K>(
        &self,
        request: &GraphRequest,
        source: &mut S,
        sink: &mut K,
    ) -> Result<Outcome, VisError>
    where
        S: EdgeSource + ?Sized,
        K: DocumentSink + ?Sized,
    {
        let span = tracing::span!(
            Level::INFO,
            "generate",
            schema = %request.schema,
            graph = %request.graph_name,
        );
        let _enter = span.enter();

        let key = request.key();

        if !self.force {
            if let Some(doc) = sink.load(&key)? {
                tracing::info!("reusing finished visualization");
                return Ok(Outcome::Cached(doc));
            }
        }

        let previous = sink.status(&key)?;
        sink.set_status(&StatusRecord::started(key.clone()))?;

        let document = match self.generate(request, source) {
            Ok(document) => document,
            Err(err) => {
                restore_status(sink, &key, previous.as_ref());
                return Err(err);
            }
        };

        let s = Instant::now();
        if let Err(err) = sink.commit(&document, &StatusRecord::done(key.clone())) {
            // The stored document may already be the new one, never announce
            // it as done.
            if let Err(cleanup) = sink.remove_status(&key) {
                tracing::warn!(error = %cleanup, "couldn't withdraw started status");
            }
            return Err(err.into());
        }
        tracing::info!("document stored {}", as_overhead(s));

        Ok(Outcome::Generated(document))
    }

    fn generate<S>(
        &self,
        request: &GraphRequest,
        source: &mut S,
    ) -> Result<VisualizationDocument, VisError>
    where
        S: EdgeSource + ?Sized,
    {
        let s = Instant::now();
        let query = request.kind().links_query(request);
        tracing::debug!(kind = ?query.kind, sql = %query.sql, "links query");

        let rows = source.edges(&query)?;
        let (graph, colors) = build(rows, self.size_scale, ColorAssignment::new(self.seed))?;
        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            communities = colors.len(),
            "graph built {}",
            as_overhead(s)
        );

        let s = Instant::now();
        let config = LayoutConfig {
            seed: self.seed,
            ..self.layout
        };
        let layout = spring_layout(&graph, &config);
        tracing::info!("layout computed {}", as_overhead(s));

        Ok(assemble(&graph, &layout, request.key(), self.display_scale))
    }
}

/// Puts back the status seen before a failed run. Failing to do so is only
/// logged, the caller gets the error that aborted the run.
fn restore_status<K>(sink: &mut K, key: &GraphKey, previous: Option<&StatusRecord>)
where
    K: DocumentSink + ?Sized,
{
    let restored = match previous {
        Some(status) => sink.set_status(status),
        None => sink.remove_status(key),
    };

    if let Err(err) = restored {
        tracing::warn!(error = %err, "couldn't restore previous status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::JobStatus;
    use crate::error::{DataIntegrityError, ProviderError, SinkError};
    use crate::ingest::{EdgeRow, JsonLinesSource, MemorySource, NodeId};
    use crate::sink::{DirectorySink, MemorySink};

    /// Delegates to a [`MemorySink`] and remembers what a reader would have
    /// seen right before the commit.
    #[derive(Default)]
    struct Observed {
        inner: MemorySink,
        before_commit: Option<(Option<JobStatus>, bool)>,
    }

    impl DocumentSink for Observed {
        fn status(&self, key: &GraphKey) -> Result<Option<StatusRecord>, SinkError> {
            self.inner.status(key)
        }

        fn load(&self, key: &GraphKey) -> Result<Option<VisualizationDocument>, SinkError> {
            self.inner.load(key)
        }

        fn set_status(&mut self, status: &StatusRecord) -> Result<(), SinkError> {
            self.inner.set_status(status)
        }

        fn remove_status(&mut self, key: &GraphKey) -> Result<(), SinkError> {
            self.inner.remove_status(key)
        }

        fn commit(
            &mut self,
            document: &VisualizationDocument,
            status: &StatusRecord,
        ) -> Result<(), SinkError> {
            let seen = self.inner.status(&document.key)?.map(|s| s.status);
            let readable = self.inner.load(&document.key)?.is_some();
            self.before_commit = Some((seen, readable));
            self.inner.commit(document, status)
        }

        fn clear(&mut self, key: &GraphKey) -> Result<(), SinkError> {
            self.inner.clear(key)
        }
    }

    fn request(max_rank: u32, show_interaction: bool) -> GraphRequest {
        GraphRequest::new(
            "study",
            "user_user",
            "louvain",
            "pagerank",
            max_rank,
            show_interaction,
        )
        .unwrap()
    }

    fn chain() -> Vec<EdgeRow> {
        vec![
            EdgeRow::new(("A", "B"), (1, 1), (1, 2), 3),
            EdgeRow::new(("B", "C"), (1, 2), (2, 5), 1),
        ]
    }

    #[test]
    fn test_generates_and_commits() {
        let mut source = MemorySource::new(chain());
        let mut sink = MemorySink::new();

        let outcome = Pipeline::new()
            .run(&request(10, true), &mut source, &mut sink)
            .unwrap();
        assert!(!outcome.is_cached());

        let doc = outcome.document();
        let sizes: Vec<_> = doc.nodes.iter().map(|n| (n.id.as_str(), n.size)).collect();
        assert_eq!(sizes, vec![("A", 60), ("B", 55), ("C", 40)]);
        assert_eq!(doc.edges.len(), 2);
        assert_eq!(
            doc.nodes[1].neighbors,
            vec![NodeId::from("A"), NodeId::from("C")]
        );

        let key = request(10, true).key();
        assert!(sink.status(&key).unwrap().unwrap().is_done());
        assert_eq!(sink.load(&key).unwrap().as_ref(), Some(doc));
        assert_eq!(sink.commits(), 1);
    }

    #[test]
    fn test_cross_community_edges_hidden() {
        let mut source = MemorySource::new(vec![EdgeRow::new(("A", "B"), (1, 2), (1, 1), 1)]);
        let mut sink = MemorySink::new();

        let doc = Pipeline::new()
            .run(&request(10, false), &mut source, &mut sink)
            .unwrap()
            .into_document();

        assert!(doc.nodes.is_empty());
        assert!(doc.edges.is_empty());
        assert!(sink.status(&request(10, false).key()).unwrap().unwrap().is_done());
    }

    #[test]
    fn test_max_rank_filters_rows() {
        let mut source = MemorySource::new(vec![
            EdgeRow::new(("A", "B"), (1, 1), (1, 2), 1),
            EdgeRow::new(("B", "C"), (1, 1), (2, 7), 1),
        ]);
        let mut sink = MemorySink::new();

        let doc = Pipeline::new()
            .run(&request(5, true), &mut source, &mut sink)
            .unwrap()
            .into_document();

        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.edges.len(), 1);
    }

    #[test]
    fn test_invalid_rank_leaves_sink_untouched() {
        let mut source = MemorySource::new(vec![EdgeRow::new(("A", "B"), (1, 1), (0, 2), 1)]);
        let mut sink = MemorySink::new();

        let err = Pipeline::new()
            .run(&request(10, true), &mut source, &mut sink)
            .unwrap_err();

        assert!(matches!(
            err,
            VisError::DataIntegrity(DataIntegrityError::InvalidRank { .. })
        ));
        let key = request(10, true).key();
        assert!(sink.status(&key).unwrap().is_none());
        assert!(sink.load(&key).unwrap().is_none());
        assert_eq!(sink.commits(), 0);
    }

    #[test]
    fn test_malformed_row_leaves_sink_untouched() {
        let input = concat!(
            r#"{"source":"A","target":"B","source_community":1,"target_community":1,"source_rank":1,"target_rank":2,"weight":3}"#,
            "\n",
            "{\"source\": oops\n",
        );
        let mut source = JsonLinesSource::new(input.as_bytes());
        let mut sink = MemorySink::new();

        let err = Pipeline::new()
            .run(&request(10, true), &mut source, &mut sink)
            .unwrap_err();

        assert!(matches!(
            err,
            VisError::Provider(ProviderError::Malformed { line: 2, .. })
        ));
        let key = request(10, true).key();
        assert!(sink.status(&key).unwrap().is_none());
        assert!(sink.load(&key).unwrap().is_none());
        assert_eq!(sink.commits(), 0);
    }

    #[test]
    fn test_started_status_during_run() {
        let mut sink = Observed::default();

        Pipeline::new()
            .run(&request(10, true), &mut MemorySource::new(chain()), &mut sink)
            .unwrap();

        assert_eq!(sink.before_commit, Some((Some(JobStatus::Started), false)));
        let status = sink.status(&request(10, true).key()).unwrap().unwrap();
        assert_eq!(status.status, JobStatus::Done);
    }

    #[test]
    fn test_failed_forced_run_keeps_previous_document() {
        let mut sink = MemorySink::new();
        let key = request(10, true).key();

        let first = Pipeline::new()
            .run(&request(10, true), &mut MemorySource::new(chain()), &mut sink)
            .unwrap()
            .into_document();
        let done = sink.status(&key).unwrap();

        let bad = vec![EdgeRow::new(("A", "B"), (1, 1), (0, 2), 1)];
        let result = Pipeline::new()
            .force(true)
            .run(&request(10, true), &mut MemorySource::new(bad), &mut sink);

        assert!(result.is_err());
        assert_eq!(sink.status(&key).unwrap(), done);
        assert_eq!(sink.load(&key).unwrap(), Some(first));
        assert_eq!(sink.commits(), 1);
    }

    #[test]
    fn test_cached_and_forced_runs() {
        let mut sink = MemorySink::new();
        let pipeline = Pipeline::new();

        let first = pipeline
            .run(&request(10, true), &mut MemorySource::new(chain()), &mut sink)
            .unwrap()
            .into_document();

        // The second source is never read on a cache hit.
        let cached = pipeline
            .run(&request(10, true), &mut MemorySource::new(vec![]), &mut sink)
            .unwrap();
        assert!(cached.is_cached());
        assert_eq!(cached.document(), &first);
        assert_eq!(sink.commits(), 1);

        let forced = pipeline
            .clone()
            .force(true)
            .run(&request(10, true), &mut MemorySource::new(vec![]), &mut sink)
            .unwrap();
        assert!(!forced.is_cached());
        assert!(forced.document().nodes.is_empty());
        assert_eq!(sink.commits(), 2);
    }

    #[test]
    fn test_same_seed_same_document() {
        let run = || {
            Pipeline::new()
                .seed(7)
                .run(
                    &request(10, true),
                    &mut MemorySource::new(chain()),
                    &mut MemorySink::new(),
                )
                .unwrap()
                .into_document()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_directory_sink_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let mut sink = DirectorySink::for_schema(&root, "study").unwrap();

        Pipeline::new()
            .run(&request(10, true), &mut MemorySource::new(chain()), &mut sink)
            .unwrap();

        let cached = Pipeline::new()
            .run(&request(10, true), &mut MemorySource::new(vec![]), &mut sink)
            .unwrap();
        assert!(cached.is_cached());
        assert_eq!(cached.document().nodes.len(), 3);
    }
}
