use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use rayon::prelude::*;
use sig_glue::{
    glue, parse_segment, summarize, GlueParams, GlueResult, GlueStrategy, OverlapPolicy, Segment,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod plot;
mod report;

use plot::{render_chart_guard, ChartKind};
use report::{ReportEntry, StatisticsLog};

#[derive(Parser, Debug)]
#[command(author, version, about = "Two-segment signal gluing CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Glue two signal segments into one CSV (and optional plots/report)
    Glue(GlueArgs),
    /// Print mean/std/max/min/duration for one or more signal files
    Stats(StatsArgs),
}

#[derive(Parser, Debug)]
struct GlueArgs {
    /// First segment (CSV/TSV: time, value)
    #[arg(value_hint = ValueHint::FilePath)]
    a: PathBuf,

    /// Second segment (CSV/TSV: time, value)
    #[arg(value_hint = ValueHint::FilePath)]
    b: PathBuf,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "glued.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// JSON file with glue parameters; explicit flags take precedence
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// How a gap between the segments is bridged
    #[arg(long, value_enum)]
    strategy: Option<StrategyOpt>,

    /// Number of bridge samples for the selected gap strategy
    #[arg(long)]
    points: Option<usize>,

    /// Harmonics kept per side (0 keeps all)
    #[arg(long)]
    harmonics: Option<usize>,

    /// How samples are paired inside an overlap
    #[arg(long, value_enum)]
    overlap_policy: Option<OverlapOpt>,

    /// Seconds added to every time of the first segment (after selection)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    shift_a: f64,

    /// Seconds added to every time of the second segment (after selection)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    shift_b: f64,

    /// Keep only samples of the first segment with MIN <= t <= MAX
    #[arg(long, value_name = "MIN:MAX", value_parser = parse_range, allow_hyphen_values = true)]
    select_a: Option<(f64, f64)>,

    /// Keep only samples of the second segment with MIN <= t <= MAX
    #[arg(long, value_name = "MIN:MAX", value_parser = parse_range, allow_hyphen_values = true)]
    select_b: Option<(f64, f64)>,

    /// Output PNG figure path (defaults next to CSV)
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Output SVG figure path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Disable plot generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Append this run's statistics to a JSON log
    #[arg(long, value_hint = ValueHint::FilePath)]
    report: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Log per-stage timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

#[derive(Parser, Debug)]
struct StatsArgs {
    /// Signal files to summarize
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StrategyOpt {
    Average,
    Linear,
    Harmonic,
}

impl From<StrategyOpt> for GlueStrategy {
    fn from(value: StrategyOpt) -> Self {
        match value {
            StrategyOpt::Average => GlueStrategy::Average,
            StrategyOpt::Linear => GlueStrategy::LinearGap,
            StrategyOpt::Harmonic => GlueStrategy::HarmonicGap,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OverlapOpt {
    Resample,
    Truncate,
    Strict,
}

impl From<OverlapOpt> for OverlapPolicy {
    fn from(value: OverlapOpt) -> Self {
        match value {
            OverlapOpt::Resample => OverlapPolicy::Resample,
            OverlapOpt::Truncate => OverlapPolicy::Truncate,
            OverlapOpt::Strict => OverlapPolicy::Strict,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Glue(args) => args.verbose,
        Command::Stats(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Glue(args) => handle_glue(args),
        Command::Stats(args) => handle_stats(args),
    }
}

fn handle_glue(args: GlueArgs) -> Result<()> {
    let params = resolve_params(&args)?;
    let timings = args.profile || args.verbose;

    let t_parse = Instant::now();
    let inputs = [args.a.clone(), args.b.clone()];
    let [a, b]: [Segment; 2] = load_segments(&inputs)?
        .try_into()
        .map_err(|_| anyhow!("expected exactly two segments"))?;
    let a = prepare_segment(a, args.select_a, args.shift_a)
        .with_context(|| format!("failed to prepare {}", args.a.display()))?;
    let b = prepare_segment(b, args.select_b, args.shift_b)
        .with_context(|| format!("failed to prepare {}", args.b.display()))?;
    if timings {
        info!(
            "Parse stage: {:.1} ms ({} + {} samples)",
            t_parse.elapsed().as_secs_f64() * 1000.0,
            a.len(),
            b.len()
        );
    }

    let t_glue = Instant::now();
    let result = glue(&a, &b, &params).context("failed to glue segments")?;
    if timings {
        info!(
            "Glue stage: {:.1} ms ({} samples)",
            t_glue.elapsed().as_secs_f64() * 1000.0,
            result.signal.len()
        );
    }
    info!(
        "Glued {:?} segments with {:?} bridge: {} samples over {:.3} s",
        result.classification.relation,
        result.bridge,
        result.signal.len(),
        result.duration
    );
    for warning in &result.warnings {
        warn!("{:?}", warning);
    }

    if args.output.as_os_str() == "-" {
        write_glued_stdout(&result)?;
    } else {
        let t_csv = Instant::now();
        write_glued_csv(&result, &args.output)?;
        if timings {
            info!(
                "CSV stage: {:.1} ms ({} rows)",
                t_csv.elapsed().as_secs_f64() * 1000.0,
                result.signal.len()
            );
        }
        info!("Wrote glued CSV: {}", args.output.display());
    }

    let mut image = None;
    if !args.no_plot {
        let png_path = args.png.clone().or_else(|| {
            (args.output.as_os_str() != "-").then(|| args.output.with_extension("png"))
        });
        if let Some(path) = png_path {
            let t_plot = Instant::now();
            if let Err(err) = render_chart_guard(&result, &path, ChartKind::Png) {
                warn!("Skipping PNG render ({}): {}", path.display(), err);
            } else {
                info!("Wrote plot: {}", path.display());
                image = Some(path.display().to_string());
            }
            if timings {
                info!("Plot stage: {:.1} ms", t_plot.elapsed().as_secs_f64() * 1000.0);
            }
        }
        if let Some(path) = args.svg.as_ref() {
            if let Err(err) = render_chart_guard(&result, path, ChartKind::Svg) {
                warn!("Skipping SVG render ({}): {}", path.display(), err);
            } else {
                info!("Wrote plot: {}", path.display());
                image.get_or_insert_with(|| path.display().to_string());
            }
        }
    }

    let stats = match result.statistics() {
        Ok(stats) => {
            info!(
                "mean {:.4}, std {:.4}, max {:.4}, min {:.4}, duration {:.3} s",
                stats.mean, stats.std_dev, stats.max, stats.min, stats.duration
            );
            Some(stats)
        }
        Err(err) => {
            warn!("No statistics for glued signal: {}", err);
            None
        }
    };

    if let Some(report_path) = args.report.as_ref() {
        let stats = stats.ok_or_else(|| {
            anyhow!("cannot append to {}: glued signal has no statistics", report_path.display())
        })?;
        let mut log = StatisticsLog::load(report_path)?;
        log.push(ReportEntry::new(
            &stats,
            result.classification.relation,
            result.bridge,
            result.signal.fingerprint(),
            params.params_hash_sha256()?,
            image,
        ));
        log.save(report_path)?;
        info!(
            "Appended statistics to {} ({} entries)",
            report_path.display(),
            log.entries().len()
        );
    }

    Ok(())
}

fn handle_stats(args: StatsArgs) -> Result<()> {
    let segments = load_segments(&args.inputs)?;
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());
    writer.write_record(["file", "samples", "mean", "std_dev", "max", "min", "duration"])?;
    for (path, segment) in args.inputs.iter().zip(&segments) {
        match summarize(segment.samples()) {
            Ok(stats) => writer.write_record([
                path.display().to_string(),
                segment.len().to_string(),
                format!("{:.6}", stats.mean),
                format!("{:.6}", stats.std_dev),
                format!("{:.6}", stats.max),
                format!("{:.6}", stats.min),
                format!("{:.6}", stats.duration),
            ])?,
            Err(err) => warn!("Skipping {}: {}", path.display(), err),
        }
    }
    writer.flush()?;
    Ok(())
}

/// Defaults, then the config file, then explicit flags.
fn resolve_params(args: &GlueArgs) -> Result<GlueParams> {
    let mut params = match args.config.as_ref() {
        Some(path) => load_params(path)?,
        None => GlueParams::default(),
    };
    if let Some(strategy) = args.strategy {
        params.strategy = strategy.into();
    }
    if let Some(points) = args.points {
        match params.strategy {
            GlueStrategy::HarmonicGap => params.harmonic_points = points,
            GlueStrategy::Average | GlueStrategy::LinearGap => params.linear_points = points,
        }
    }
    if let Some(harmonics) = args.harmonics {
        params.max_harmonics = harmonics;
    }
    if let Some(policy) = args.overlap_policy {
        params.overlap_policy = policy.into();
    }
    params.validate()?;
    debug!(?params, "resolved glue parameters");
    Ok(params)
}

fn load_params(path: &Path) -> Result<GlueParams> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_segments(paths: &[PathBuf]) -> Result<Vec<Segment>> {
    paths
        .par_iter()
        .map(|path| -> Result<Segment> {
            let data =
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            let hint = path
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("csv");
            parse_segment(&data, hint).with_context(|| format!("failed to parse {}", path.display()))
        })
        .collect()
}

fn prepare_segment(segment: Segment, select: Option<(f64, f64)>, shift: f64) -> Result<Segment> {
    let selected = match select {
        Some((min_t, max_t)) => segment.select(min_t, max_t)?,
        None => segment,
    };
    if shift == 0.0 {
        return Ok(selected);
    }
    Ok(selected.shifted(shift)?)
}

fn parse_range(input: &str) -> Result<(f64, f64), String> {
    let (lo, hi) = input
        .split_once(':')
        .ok_or_else(|| format!("expected MIN:MAX, got {:?}", input))?;
    let lo: f64 = lo
        .trim()
        .parse()
        .map_err(|_| format!("invalid range start {:?}", lo))?;
    let hi: f64 = hi
        .trim()
        .parse()
        .map_err(|_| format!("invalid range end {:?}", hi))?;
    if !lo.is_finite() || !hi.is_finite() {
        return Err(format!("range bounds must be finite, got {:?}", input));
    }
    Ok((lo, hi))
}

fn write_glued_stdout(result: &GlueResult) -> Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::Writer::from_writer(handle);
    write_glued_rows(result, &mut writer)
}

fn write_glued_csv(result: &GlueResult, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_glued_rows(result, &mut writer)
}

fn write_glued_rows<W: Write>(result: &GlueResult, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(["t", "value", "part"])?;
    for (idx, sample) in result.signal.samples.iter().enumerate() {
        writer.write_record([
            sample.t.to_string(),
            sample.value.to_string(),
            result.layout.part_of(idx).as_str().to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sig_glue::Sample;

    fn args(extra: &[&str]) -> GlueArgs {
        let mut argv = vec!["sig-glue", "glue", "a.csv", "b.csv"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Glue(args) => args,
            Command::Stats(_) => panic!("expected glue subcommand"),
        }
    }

    #[test]
    fn parse_range_accepts_negative_bounds() {
        assert_eq!(parse_range("-2.5:4").unwrap(), (-2.5, 4.0));
        assert_eq!(parse_range(" 1 : 3 ").unwrap(), (1.0, 3.0));
        assert!(parse_range("1-3").is_err());
        assert!(parse_range("a:3").is_err());
        assert!(parse_range("1:inf").is_err());
    }

    #[test]
    fn flags_parse_into_params() {
        let parsed = args(&[
            "--strategy",
            "harmonic",
            "--points",
            "40",
            "--harmonics",
            "6",
            "--overlap-policy",
            "strict",
            "--select-a",
            "-1:5",
            "--shift-b",
            "-0.5",
        ]);
        assert_eq!(parsed.select_a, Some((-1.0, 5.0)));
        assert_eq!(parsed.shift_b, -0.5);
        let params = resolve_params(&parsed).unwrap();
        assert_eq!(params.strategy, GlueStrategy::HarmonicGap);
        assert_eq!(params.harmonic_points, 40);
        assert_eq!(params.linear_points, GlueParams::default().linear_points);
        assert_eq!(params.max_harmonics, 6);
        assert_eq!(params.overlap_policy, OverlapPolicy::Strict);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("params.json");
        fs::write(
            &config,
            r#"{"strategy":"linear_gap","linear_points":7,"overlap_policy":"truncate"}"#,
        )
        .unwrap();
        let config_arg = config.display().to_string();
        let parsed = args(&["--config", &config_arg, "--overlap-policy", "resample"]);
        let params = resolve_params(&parsed).unwrap();
        assert_eq!(params.strategy, GlueStrategy::LinearGap);
        assert_eq!(params.linear_points, 7);
        assert_eq!(params.overlap_policy, OverlapPolicy::Resample);
    }

    #[test]
    fn rejects_too_few_linear_points() {
        let parsed = args(&["--strategy", "linear", "--points", "1"]);
        assert!(resolve_params(&parsed).is_err());
    }

    #[test]
    fn select_then_shift() {
        let segment = Segment::new(
            (0..5)
                .map(|i| Sample::new(i as f64, i as f64 * 10.0))
                .collect(),
        )
        .unwrap();
        let prepared = prepare_segment(segment.clone(), Some((1.0, 3.0)), 10.0).unwrap();
        assert_eq!(prepared.start(), 11.0);
        assert_eq!(prepared.end(), 13.0);
        assert_eq!(prepared.values().collect::<Vec<_>>(), vec![10.0, 20.0, 30.0]);
        assert!(prepare_segment(segment, Some((7.0, 9.0)), 0.0).is_err());
    }

    #[test]
    fn glued_rows_carry_part_labels() {
        let a = Segment::new(vec![Sample::new(0.0, 2.0), Sample::new(1.0, 4.0), Sample::new(2.0, 6.0)])
            .unwrap();
        let b = Segment::new(vec![Sample::new(1.0, 8.0), Sample::new(2.0, 4.0), Sample::new(3.0, 0.0)])
            .unwrap();
        let result = glue(&a, &b, &GlueParams::default()).unwrap();
        let mut writer = csv::Writer::from_writer(Vec::new());
        write_glued_rows(&result, &mut writer).unwrap();
        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "t,value,part\n0,2,left\n1,6,bridge\n2,5,bridge\n3,0,right\n");
    }

    #[test]
    fn loads_both_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.tsv");
        fs::write(&first, "time,value\n0,1\n1,2\n").unwrap();
        fs::write(&second, "5\t3\n6\t4\n7\t5\n").unwrap();
        let segments = load_segments(&[first, second]).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].len(), 2);
        assert_eq!(segments[1].start(), 5.0);
    }
}
