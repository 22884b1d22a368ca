use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::io::{BufReader, BufWriter, Write};

use pgalign::align::{align_query, align_with_seeder, edit_path, AlignOpt, AlignmentResult, ScoreParams, Seeder};
use pgalign::augment::add_alignment;
use pgalign::graph::Graph;
use pgalign::io::{load_graph, save_graph, GraphMeta, SeqReader, SeqRecord};
use pgalign::PgError;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "pgalign", author, version, about = "Align sequences to a pangenome graph and grow the graph", arg_required_else_help = true)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a graph from FASTA: the first record seeds the graph, the rest are aligned and added
    Build {
        /// Input FASTA file
        fasta: String,
        /// Output graph snapshot
        #[arg(short, long, default_value = "graph.pg")]
        output: String,
        #[command(flatten)]
        params: AlignArgs,
    },
    /// Align reads (FASTA or FASTQ) against a graph
    Align {
        /// Graph snapshot
        #[arg(short = 'g', long = "graph")]
        graph: String,
        /// Reads file
        reads: String,
        /// Add every aligned read to the graph as a path named after the read
        #[arg(long)]
        add: bool,
        /// Where to write the augmented graph (defaults to overwriting --graph)
        #[arg(long = "graph-out", requires = "add")]
        graph_out: Option<String>,
        /// Output table path (stdout if omitted)
        #[arg(short, long)]
        out: Option<String>,
        #[command(flatten)]
        params: AlignArgs,
    },
    /// Print a summary of a graph snapshot
    Stats {
        /// Graph snapshot
        graph: String,
    },
}

#[derive(Args, Debug)]
struct AlignArgs {
    #[arg(short = 'k', long, default_value_t = 3)]
    k: usize,
    #[arg(short = 'w', long, default_value_t = 5)]
    w: usize,
    /// Chain score per seed
    #[arg(long, default_value_t = 10)]
    reward: i64,
    /// Chain objective
    #[arg(long, default_value = "max")]
    objective: String,
    #[arg(long = "match", default_value_t = 2)]
    match_score: i32,
    #[arg(long = "mismatch", default_value_t = 4)]
    mismatch_penalty: i32,
    #[arg(long = "gap-open", default_value_t = 4)]
    gap_open: i32,
    #[arg(long = "gap-ext", default_value_t = 2)]
    gap_extend: i32,
    /// Largest graph/query gap difference in a chain; also the extension DP band
    #[arg(long = "max-gap-diff", default_value_t = 50)]
    max_gap_diff: usize,
    #[arg(long = "max-walks", default_value_t = 256)]
    max_walks: usize,
    /// Also index reverse-complemented node sequences
    #[arg(long = "index-reverse")]
    index_reverse: bool,
}

impl AlignArgs {
    fn to_opt(&self) -> Result<AlignOpt> {
        let opt = AlignOpt {
            k: self.k,
            w: self.w,
            reward: self.reward,
            objective: self.objective.clone(),
            index_reverse: self.index_reverse,
            max_gap_diff: self.max_gap_diff,
            max_walks: self.max_walks,
            score: ScoreParams {
                match_score: self.match_score,
                mismatch_penalty: self.mismatch_penalty,
                gap_open: self.gap_open,
                gap_extend: self.gap_extend,
            },
        };
        opt.validate()?;
        Ok(opt)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();

    match cli.command {
        Commands::Build { fasta, output, params } => run_build(&fasta, &output, &params.to_opt()?),
        Commands::Align { graph, reads, add, graph_out, out, params } => {
            let opt = params.to_opt()?;
            let graph_out = if add { Some(graph_out.unwrap_or_else(|| graph.clone())) } else { None };
            run_align(&graph, &reads, graph_out.as_deref(), out.as_deref(), &opt)
        }
        Commands::Stats { graph } => run_stats(&graph),
    }
}

fn open_reads(path: &str) -> Result<SeqReader<BufReader<std::fs::File>>> {
    let fh = std::fs::File::open(path).map_err(|e| anyhow!("cannot open '{}': {}", path, e))?;
    Ok(SeqReader::new(BufReader::new(fh)))
}

/// 单条 read 的失败只跳过该 read；其余错误终止
fn skippable(e: &PgError) -> bool {
    matches!(e, PgError::NoPath(_) | PgError::InvalidParameter(_))
}

fn run_build(fasta: &str, output: &str, opt: &AlignOpt) -> Result<()> {
    let mut reader = open_reads(fasta)?;
    let first = reader
        .next_record()?
        .ok_or_else(|| anyhow!("FASTA file '{}' contains no sequences", fasta))?;
    if first.seq.is_empty() {
        bail!("first record '{}' in '{}' is empty", first.id, fasta);
    }
    let mut graph = Graph::from_sequence(&first.id, &first.seq)?;
    let mut n_added = 0usize;

    for rec in reader {
        let rec = rec?;
        match augment_one(&graph, &rec, opt) {
            Ok((g, _)) => {
                graph = g;
                n_added += 1;
            }
            Err(e) if skippable(&e) => warn!("skipping '{}': {}", rec.id, e),
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        "graph: {} nodes, {} edges, {} paths ({} added), {} bp",
        graph.node_count(),
        graph.edge_count(),
        graph.path_count(),
        n_added,
        graph.total_len()
    );
    save_graph(output, &graph, &GraphMeta::now(fasta))
        .map_err(|e| anyhow!("cannot write graph to '{}': {}", output, e))?;
    info!("graph saved: {}", output);
    Ok(())
}

fn augment_one(graph: &Graph, rec: &SeqRecord, opt: &AlignOpt) -> pgalign::Result<(Graph, AlignmentResult)> {
    let res = align_query(graph, &rec.seq, opt, None)?;
    let g = add_alignment(graph, &rec.seq, &res.edits, &rec.id)?;
    Ok((g, res))
}

fn write_row(out: &mut dyn Write, rec: &SeqRecord, res: &AlignmentResult) -> Result<()> {
    let path = edit_path(&res.edits);
    let path = if path.is_empty() {
        "*".to_string()
    } else {
        path.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
    };
    writeln!(
        out,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
        rec.id,
        rec.seq.len(),
        res.seeds.len(),
        res.chain.len(),
        res.stats().nm(),
        res.cigar(),
        path
    )?;
    Ok(())
}

fn run_align(
    graph_path: &str,
    reads_path: &str,
    graph_out: Option<&str>,
    out_path: Option<&str>,
    opt: &AlignOpt,
) -> Result<()> {
    let (mut graph, meta) =
        load_graph(graph_path).map_err(|e| anyhow!("cannot load graph '{}': {}", graph_path, e))?;
    let reader = open_reads(reads_path)?;
    let mut out: Box<dyn Write> = match out_path {
        Some(p) => Box::new(BufWriter::new(
            std::fs::File::create(p).map_err(|e| anyhow!("cannot create '{}': {}", p, e))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    writeln!(out, "#read\tlen\tseeds\tchain\tnm\tcigar\tpath")?;

    let mut n_reads = 0usize;
    let mut n_skipped = 0usize;
    if graph_out.is_some() {
        for rec in reader {
            let rec = rec?;
            n_reads += 1;
            match augment_one(&graph, &rec, opt) {
                Ok((g, res)) => {
                    write_row(&mut *out, &rec, &res)?;
                    graph = g;
                }
                Err(e) if skippable(&e) => {
                    warn!("skipping '{}': {}", rec.id, e);
                    n_skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    } else {
        let seeder = Seeder::new(&graph, opt.seed_opt())?;
        info!("index: {} minimizers over {} nodes", seeder.index_len(), graph.node_count());
        for rec in reader {
            let rec = rec?;
            n_reads += 1;
            match align_with_seeder(&seeder, &rec.seq, opt, None) {
                Ok(res) => write_row(&mut *out, &rec, &res)?,
                Err(e) if skippable(&e) => {
                    warn!("skipping '{}': {}", rec.id, e);
                    n_skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    out.flush()?;
    info!("aligned {} reads ({} skipped)", n_reads - n_skipped, n_skipped);

    if let Some(path) = graph_out {
        let now = GraphMeta::now(reads_path);
        let meta = GraphMeta { build_args: now.build_args, build_timestamp: now.build_timestamp, ..meta };
        save_graph(path, &graph, &meta).map_err(|e| anyhow!("cannot write graph to '{}': {}", path, e))?;
        info!("graph saved: {} ({} nodes, {} paths)", path, graph.node_count(), graph.path_count());
    }
    Ok(())
}

fn run_stats(graph_path: &str) -> Result<()> {
    let (graph, meta) =
        load_graph(graph_path).map_err(|e| anyhow!("cannot load graph '{}': {}", graph_path, e))?;
    println!("graph: {}", graph_path);
    if let Some(src) = &meta.source {
        println!("source: {}", src);
    }
    if let Some(ts) = &meta.build_timestamp {
        println!("built: {}", ts);
    }
    if let Some(args) = &meta.build_args {
        println!("args: {}", args);
    }
    println!("nodes: {}", graph.node_count());
    println!("edges: {}", graph.edge_count());
    println!("total_len: {}", graph.total_len());
    println!("paths: {}", graph.path_count());
    for (name, steps) in graph.paths() {
        let len: usize = steps.iter().filter_map(|h| graph.node_len(h.node)).sum();
        println!("  {}\t{} steps\t{} bp", name, steps.len(), len);
    }
    Ok(())
}
