use std::io::{self, Write};
use std::time::Instant;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use clap::builder::BoolishValueParser;
use console::style;
use netvis::{
    DirectorySink, EdgeSource, GraphRequest, JsonLinesSource, LayoutConfig, Outcome, Pipeline,
    as_overhead,
};

/// Generate a positioned, colored network visualization from link rows.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    /// Namespace the links belong to; also selects the storage directory.
    schema: String,
    /// Name of the graph, e.g. `user_user`, `user_hashtag`, `hashtag_hashtag`.
    graph_name: String,
    /// Community detection attribute.
    community: String,
    /// Centrality attribute used for ranking.
    centrality: String,
    /// Keep nodes ranked at most this within their community.
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    max_rank: u32,
    /// Whether to keep links between different communities.
    #[arg(action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    show_interaction: bool,

    /// JSON lines file with link rows, `-` reads stdin.
    #[arg(long, default_value = "-")]
    input: String,
    /// Directory holding finished visualizations.
    #[arg(long, default_value = "vis-store")]
    store: Utf8PathBuf,
    /// Seed for colors and initial positions.
    #[arg(long, default_value_t = netvis::DEFAULT_SEED)]
    seed: u64,
    /// Maximum number of layout iterations.
    #[arg(long)]
    iterations: Option<usize>,
    /// Regenerate even if a finished visualization is stored.
    #[arg(long)]
    force: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    netvis::init_logging()?;

    let s = Instant::now();
    eprintln!(
        "{} {} {}",
        style("netvis").bold().green(),
        style(&args.schema).cyan(),
        style(&args.graph_name).cyan(),
    );

    let request = GraphRequest::new(
        &args.schema,
        &args.graph_name,
        &args.community,
        &args.centrality,
        args.max_rank,
        args.show_interaction,
    )?;

    let mut layout = LayoutConfig::default();
    if let Some(iterations) = args.iterations {
        layout.iterations = iterations;
    }

    let pipeline = Pipeline::new()
        .seed(args.seed)
        .layout(layout)
        .force(args.force);

    let mut sink = DirectorySink::for_schema(&args.store, &args.schema)?;

    let mut source: Box<dyn EdgeSource> = if args.input == "-" {
        Box::new(JsonLinesSource::new(io::stdin().lock()))
    } else {
        Box::new(
            JsonLinesSource::open(&args.input)
                .with_context(|| format!("couldn't open {}", args.input))?,
        )
    };

    let outcome = pipeline.run(&request, source.as_mut(), &mut sink)?;

    let label = match outcome {
        Outcome::Generated(_) => "generated",
        Outcome::Cached(_) => "cached",
    };

    let doc = outcome.document();
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, &doc.payload())?;
    writeln!(stdout)?;

    eprintln!(
        "{} {} nodes, {} edges {}",
        style(label).bold(),
        doc.nodes.len(),
        doc.edges.len(),
        as_overhead(s)
    );

    Ok(())
}
