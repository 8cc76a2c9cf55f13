use std::fs::{self, File};
use std::io::{self, Write};
use std::panic;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use plotters::prelude::*;
use rayon::prelude::*;
use serde::Serialize;
use split_rank::{
    chart_hints, deviation_percent, load_grid, point_label, AnnotationStyle, ChartHints, ColorBand,
    Config, Grid, Pass, PassReport, RowReport,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization as _;

#[derive(Parser, Debug)]
#[command(author, version, about = "Checkpoint ranking and placing-deviation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rank total times, band segment times and write annotated grids
    Rank(RankArgs),
    /// Color placing deviations and chart placings for selected participants
    Deviation(DeviationArgs),
    /// Print the color legend
    Legend(LegendArgs),
}

#[derive(Parser, Debug)]
struct CommonArgs {
    /// Keep only rows mentioning one of these names (accents and case ignored)
    #[arg(long = "name", value_name = "NAME")]
    names: Vec<String>,

    /// JSON configuration file
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Columns containing this text are not ranked (empty disables)
    #[arg(long)]
    skip_marker: Option<String>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct RankArgs {
    /// CSV or JSON result grids
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Annotated grid path (`-` for stdout; single input only)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Also write a JSON report next to each annotated grid
    #[arg(long, action = ArgAction::SetTrue)]
    report: bool,

    /// Write ranks as `[N]` on newline-separated lines instead of HTML
    #[arg(long, action = ArgAction::SetTrue)]
    plain: bool,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Parser, Debug)]
struct DeviationArgs {
    /// CSV or JSON result grid
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Deviation CSV path (`-` for stdout)
    #[arg(short, long, default_value = "deviation.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Directory for per-participant PNG charts
    #[arg(long, value_hint = ValueHint::DirPath)]
    png: Option<PathBuf>,

    /// Directory for per-participant SVG charts
    #[arg(long, value_hint = ValueHint::DirPath)]
    svg: Option<PathBuf>,

    /// Disable chart generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Neutral band half-width (percent)
    #[arg(long)]
    dead_zone: Option<f64>,

    /// Deviation at which the gradient saturates (percent)
    #[arg(long)]
    max_percent: Option<f64>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Parser, Debug)]
struct LegendArgs {
    /// JSON configuration file
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Rank(args) => args.common.verbose,
        Command::Deviation(args) => args.common.verbose,
        Command::Legend(_) => false,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Rank(args) => handle_rank(args),
        Command::Deviation(args) => handle_deviation(args),
        Command::Legend(args) => handle_legend(args),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    Config::from_json_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn build_config(common: &CommonArgs) -> Result<Config> {
    let mut config = load_config(common.config.as_deref())?;
    if let Some(marker) = common.skip_marker.as_ref() {
        config.skip_marker = marker.clone();
    }
    Ok(config)
}

fn read_grid(path: &Path) -> Result<Grid> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let hint = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("csv");
    load_grid(&data, hint).with_context(|| format!("failed to parse {}", path.display()))
}

/// Lowercase with combining marks removed, so "Vilčinskas" matches "vilcinskas".
fn fold_name(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Indices of rows with a cell containing one of `names`; all rows when
/// `names` is empty.
fn select_rows(grid: &Grid, names: &[String]) -> Vec<usize> {
    if names.is_empty() {
        return (0..grid.len()).collect();
    }
    let wanted: Vec<String> = names
        .iter()
        .map(|n| fold_name(n.trim()))
        .filter(|n| !n.is_empty())
        .collect();
    grid.rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            row.iter().any(|cell| {
                let folded = fold_name(cell);
                wanted.iter().any(|name| folded.contains(name.as_str()))
            })
        })
        .map(|(idx, _)| idx)
        .collect()
}

fn filter_grid(grid: Grid, names: &[String], source: &Path) -> Grid {
    if names.is_empty() {
        return grid;
    }
    let keep = select_rows(&grid, names);
    if keep.is_empty() {
        warn!("{}: no rows matched the requested names", source.display());
    } else {
        debug!("{}: kept {} of {} rows", source.display(), keep.len(), grid.len());
    }
    grid.subset(&keep)
}

fn derived_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("grid");
    input.with_file_name(format!("{stem}.{suffix}"))
}

#[derive(Serialize)]
struct RankOutput<'a> {
    source: String,
    generated_at: DateTime<Utc>,
    config: &'a Config,
    report: &'a PassReport,
}

fn handle_rank(args: RankArgs) -> Result<()> {
    if args.output.is_some() && args.inputs.len() > 1 {
        return Err(anyhow!("--output can only be used with a single input"));
    }

    let mut config = build_config(&args.common)?;
    if args.plain {
        config.annotation = AnnotationStyle::plain();
    }
    let pass = Pass::new(config).context("invalid ranking configuration")?;

    let summaries = args
        .inputs
        .par_iter()
        .map(|input| rank_one(input, &args, &pass))
        .collect::<Result<Vec<_>>>()?;

    for (input, output, report) in summaries {
        let changed: usize = report.columns.iter().map(|c| c.changed_rows().len()).sum();
        info!(
            "{}: {} checkpoint columns ranked, {} skipped, {} ranks new or changed -> {}",
            input.display(),
            report.columns.len(),
            report.skipped_columns.len(),
            changed,
            output
        );
    }
    Ok(())
}

fn rank_one(input: &Path, args: &RankArgs, pass: &Pass) -> Result<(PathBuf, String, PassReport)> {
    let grid = filter_grid(read_grid(input)?, &args.common.names, input);
    let all_rows: Vec<usize> = (0..grid.len()).collect();
    let report = pass.run(&grid, &all_rows);
    let annotated = grid.with_cells(&report.merged_texts());

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| derived_path(input, "ranked.csv"));
    let output_label = if output.as_os_str() == "-" {
        let stdout = io::stdout();
        annotated.write_csv(stdout.lock())?;
        "stdout".to_string()
    } else {
        let file = File::create(&output)
            .with_context(|| format!("failed to create {}", output.display()))?;
        annotated
            .write_csv(file)
            .with_context(|| format!("failed to write {}", output.display()))?;
        output.display().to_string()
    };

    if args.report {
        let path = derived_path(input, "report.json");
        let doc = RankOutput {
            source: input.display().to_string(),
            generated_at: Utc::now(),
            config: pass.config(),
            report: &report,
        };
        let text = serde_json::to_string_pretty(&doc)?;
        fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote report: {}", path.display());
    }

    Ok((input.to_path_buf(), output_label, report))
}

fn handle_deviation(args: DeviationArgs) -> Result<()> {
    let mut config = build_config(&args.common)?;
    if let Some(dead_zone) = args.dead_zone {
        config.deviation.dead_zone_percent = dead_zone;
    }
    if let Some(max_percent) = args.max_percent {
        config.deviation.max_percent = max_percent;
    }
    let pass = Pass::new(config).context("invalid deviation configuration")?;

    if args.common.names.is_empty() {
        warn!("no --name given; coloring every row");
    }
    let grid = filter_grid(read_grid(&args.input)?, &args.common.names, &args.input);
    let selected: Vec<usize> = (0..grid.len()).collect();
    let report = pass.run(&grid, &selected);
    info!(
        "Deviation pass: {} rows, {} checkpoints",
        report.rows.len(),
        report.checkpoint_count
    );

    let first = pass.config().first_checkpoint_column;
    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut writer = csv::Writer::from_writer(stdout.lock());
        write_deviation_rows(&report.rows, first, &mut writer)?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        write_deviation_rows(&report.rows, first, &mut writer)?;
        info!("Wrote deviation CSV: {}", args.output.display());
    }

    if args.no_plot {
        return Ok(());
    }
    for (dir, kind) in [(args.png.as_ref(), ChartKind::Png), (args.svg.as_ref(), ChartKind::Svg)] {
        let Some(dir) = dir else {
            continue;
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        for (idx, row) in report.rows.iter().enumerate() {
            let path = dir.join(chart_file_name(idx, &row.name, kind.extension()));
            if let Err(err) = render_chart_guard(row, &path, kind) {
                warn!("Skipping chart ({}): {}", path.display(), err);
            } else {
                info!("Wrote chart: {}", path.display());
            }
        }
    }
    Ok(())
}

fn write_deviation_rows<W: Write>(
    rows: &[RowReport],
    first_column: usize,
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    writer.write_record([
        "row",
        "name",
        "reference",
        "checkpoint",
        "placing",
        "deviation_pct",
        "color",
        "cell",
    ])?;

    for row in rows {
        for (idx, placing) in row.series.iter().enumerate() {
            let column = first_column + idx;
            let pct = deviation_percent(row.reference, *placing);
            writer.write_record([
                row.row.to_string(),
                row.name.clone(),
                row.reference.map(|v| v.to_string()).unwrap_or_default(),
                (idx + 1).to_string(),
                placing.map(|v| v.to_string()).unwrap_or_default(),
                pct.map(|v| format!("{:.1}", v)).unwrap_or_default(),
                row.deviation_colors
                    .get(&column)
                    .map(|c| c.to_hex())
                    .unwrap_or_default(),
                row.cells.get(column).cloned().unwrap_or_default(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

fn handle_legend(args: LegendArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_legend(&config, &mut out)?;
    Ok(())
}

fn write_legend<W: Write>(config: &Config, out: &mut W) -> io::Result<()> {
    const ORDINALS: [&str; 4] = ["fastest", "second fastest", "third fastest", "fourth fastest"];

    writeln!(out, "Segment times (per checkpoint column):")?;
    for (band, ordinal) in ColorBand::ALL.iter().zip(ORDINALS) {
        writeln!(
            out,
            "  {}  {:<6}  {} segment time",
            band.color(),
            band.name(),
            ordinal
        )?;
    }
    writeln!(
        out,
        "Number on the third line: total time rank at that checkpoint (1 = fastest total time)"
    )?;

    let scale = &config.deviation;
    writeln!(out, "Placing deviation (selected participants):")?;
    writeln!(
        out,
        "  {}  segment placing better than the overall placing by more than {}%",
        scale.better, scale.dead_zone_percent
    )?;
    writeln!(
        out,
        "  {}  segment placing within ±{}% of the overall placing",
        scale.neutral, scale.dead_zone_percent
    )?;
    writeln!(
        out,
        "  {}  segment placing worse than the overall placing by more than {}% (full color at {}%)",
        scale.worse, scale.dead_zone_percent, scale.max_percent
    )?;
    writeln!(
        out,
        "Charts: x axis = checkpoint number, y axis = placing in that segment (1 at the top)"
    )?;
    Ok(())
}

#[derive(Clone, Copy, Debug)]
enum ChartKind {
    Png,
    Svg,
}

impl ChartKind {
    fn extension(self) -> &'static str {
        match self {
            ChartKind::Png => "png",
            ChartKind::Svg => "svg",
        }
    }
}

fn chart_file_name(index: usize, name: &str, ext: &str) -> String {
    let slug: String = fold_name(name)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        format!("{:02}.{}", index + 1, ext)
    } else {
        format!("{:02}_{}.{}", index + 1, slug, ext)
    }
}

fn render_chart_guard(row: &RowReport, path: &Path, kind: ChartKind) -> Result<(), String> {
    let render = || -> Result<(), String> {
        match kind {
            ChartKind::Png => {
                let root = BitMapBackend::new(path, (800, 220)).into_drawing_area();
                draw_series_chart(root, row).map_err(|e| format!("plotting error: {}", e))
            }
            ChartKind::Svg => {
                let root = SVGBackend::new(path, (800, 220)).into_drawing_area();
                draw_series_chart(root, row).map_err(|e| format!("plotting error: {}", e))
            }
        }
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

/// Runs of consecutive checkpoints that have a placing, as `(checkpoint, placing)`.
fn contiguous_runs(series: &[Option<u32>]) -> Vec<Vec<(f64, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for (idx, value) in series.iter().enumerate() {
        match value {
            Some(v) => current.push(((idx + 1) as f64, *v as f64)),
            None if !current.is_empty() => runs.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Multiplier applied to placings before plotting; negating puts placing 1
/// at the top of a reversed axis.
fn y_sign(hints: &ChartHints) -> f64 {
    if hints.y_reversed {
        -1.0
    } else {
        1.0
    }
}

/// Tick label for an x coordinate: the hint label at whole checkpoints.
fn x_tick_label(hints: &ChartHints, x: f64) -> String {
    let rounded = x.round();
    if (x - rounded).abs() > 1e-6 || rounded < 1.0 {
        return String::new();
    }
    hints
        .x_labels
        .get(rounded as usize - 1)
        .cloned()
        .unwrap_or_default()
}

fn draw_series_chart<DB>(
    root: DrawingArea<DB, plotters::coord::Shift>,
    row: &RowReport,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let hints = chart_hints(&row.series);
    let x_max = row.series.len().max(1) as f64 + 0.5;
    let y_max = hints.y_suggested_max as f64;
    let sign = y_sign(&hints);
    let y_range = if hints.y_reversed { -y_max..0.0 } else { 0.0..y_max };
    let x_label = |x: &f64| x_tick_label(&hints, *x);

    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Chart: {}", row.name), ("sans-serif", 18))
        .margin(15)
        .set_label_area_size(LabelAreaPosition::Left, 45)
        .set_label_area_size(LabelAreaPosition::Bottom, 35)
        .build_cartesian_2d(0.5..x_max, y_range)?;

    chart
        .configure_mesh()
        .x_labels(hints.x_labels.len().max(1))
        .x_desc("Checkpoint")
        .y_desc("Placing")
        .x_label_formatter(&x_label)
        .y_label_formatter(&|v| format!("{:.0}", v.abs()))
        .draw()?;

    let line = RGBColor(0x19, 0x76, 0xd2);
    for run in contiguous_runs(&row.series) {
        chart.draw_series(LineSeries::new(
            run.into_iter().map(|(x, y)| (x, sign * y)),
            line.stroke_width(2),
        ))?;
    }

    let points: Vec<(f64, f64, u32)> = row
        .series
        .iter()
        .enumerate()
        .filter_map(|(idx, v)| v.map(|v| ((idx + 1) as f64, v as f64, v)))
        .collect();
    chart.draw_series(
        points
            .iter()
            .map(|&(x, y, _)| Circle::new((x, sign * y), 4, line.filled())),
    )?;
    let label_offset = y_max * 0.06;
    chart.draw_series(points.iter().map(|&(x, y, v)| {
        Text::new(
            point_label(Some(v)),
            (x, sign * y + label_offset),
            ("sans-serif", 12).into_font().color(&BLACK),
        )
    }))?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::new(vec![
            vec!["47".into(), "Romanovas Marijus".into(), "V40".into()],
            vec!["3".into(), "Vilčinskas Rimantas".into(), "V50".into()],
            vec!["9".into(), "Dauderienė Živilė".into(), "W40".into()],
        ])
    }

    #[test]
    fn folding_ignores_accents_and_case() {
        assert_eq!(fold_name("Dauderienė Živilė"), "dauderiene zivile");
        assert_eq!(fold_name("RIČKUS"), "rickus");
    }

    #[test]
    fn selects_rows_by_name() {
        let grid = grid();
        let names = vec!["Vilcinskas".to_string(), "živilė".to_string()];
        assert_eq!(select_rows(&grid, &names), vec![1, 2]);
        assert_eq!(select_rows(&grid, &[]), vec![0, 1, 2]);
        assert!(select_rows(&grid, &["Nobody".to_string()]).is_empty());
    }

    #[test]
    fn derived_paths_sit_next_to_input() {
        let path = derived_path(Path::new("/tmp/results.csv"), "ranked.csv");
        assert_eq!(path, PathBuf::from("/tmp/results.ranked.csv"));
    }

    #[test]
    fn runs_break_on_missing_placings() {
        let runs = contiguous_runs(&[Some(3), Some(4), None, Some(1), None]);
        assert_eq!(runs, vec![vec![(1.0, 3.0), (2.0, 4.0)], vec![(4.0, 1.0)]]);
        assert!(contiguous_runs(&[None, None]).is_empty());
    }

    #[test]
    fn chart_axes_follow_hints() {
        let mut hints = chart_hints(&[Some(3), None, Some(8)]);
        assert_eq!(y_sign(&hints), -1.0);
        assert_eq!(x_tick_label(&hints, 1.0), "1");
        assert_eq!(x_tick_label(&hints, 3.0), "3");
        assert_eq!(x_tick_label(&hints, 1.5), "");
        assert_eq!(x_tick_label(&hints, 4.0), "");
        assert_eq!(x_tick_label(&hints, 0.5), "");

        hints.y_reversed = false;
        hints.x_labels = vec!["CP1".into(), "CP2".into(), "Finish".into()];
        assert_eq!(y_sign(&hints), 1.0);
        assert_eq!(x_tick_label(&hints, 3.0), "Finish");
    }

    #[test]
    fn chart_names_are_filesystem_safe() {
        assert_eq!(chart_file_name(0, "Ričkus Arnoldas", "png"), "01_rickus_arnoldas.png");
        assert_eq!(chart_file_name(11, "", "svg"), "12.svg");
    }

    #[test]
    fn legend_mentions_every_band_and_scale() {
        let mut out = Vec::new();
        write_legend(&Config::default(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        for band in ColorBand::ALL {
            assert!(text.contains(&band.color().to_hex()));
        }
        assert!(text.contains("#4be04b"));
        assert!(text.contains("±10%"));
    }

    #[test]
    fn deviation_csv_has_one_line_per_checkpoint() {
        let grid = Grid::new(vec![vec![
            "40".into(),
            "Romanovas Marijus".into(),
            "V40".into(),
            "1:00<br>1:00 (60)".into(),
            "2:00<br>1:00<br><span style='font-weight:bold;color:#333'>1</span>".into(),
        ]]);
        let report = Pass::new(Config::default()).unwrap().run(&grid, &[0]);
        let mut writer = csv::Writer::from_writer(Vec::new());
        write_deviation_rows(&report.rows, 3, &mut writer).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "0,Romanovas Marijus,40,1,60,50.0,#ff4b4b,1:00<br>1:00 (60)");
        assert_eq!(lines[2], "0,Romanovas Marijus,40,2,,,,2:00<br>1:00<br>");
    }
}
