use std::{fmt, fs, path::Path};

use common::{
    record::RawResultRecord,
    util::{plural, title_case},
};
use itertools::Itertools;
use tracing::debug;

use crate::{Category, Point, category_points, combo_label};

/// Max TPS and every run of one (version, threshold) combination.
#[derive(Debug, Clone, PartialEq)]
struct ComboStats {
    version: String,
    threshold: Option<u64>,
    max_tps: f64,
    raw: Vec<f64>,
}

fn round_tps(value: f64) -> i64 {
    value.round_ties_even() as i64
}

fn format_change(max_tps: f64, baseline_max: f64) -> String {
    if baseline_max == 0.0 {
        return "(N/A)".to_owned();
    }
    let pct = (max_tps - baseline_max) / baseline_max * 100.0;
    if pct > 0.0 {
        format!("(+{pct:.1}%)")
    } else {
        format!("({pct:.1}%)")
    }
}

fn combo_stats(points: &[&Point]) -> Vec<ComboStats> {
    points
        .iter()
        .map(|p| (p.version.as_str(), p.threshold))
        .unique()
        .map(|(version, threshold)| {
            let raw = points
                .iter()
                .filter(|p| p.version == version && p.threshold == threshold)
                .map(|p| p.tps)
                .sorted_by(f64::total_cmp)
                .collect::<Vec<_>>();
            ComboStats {
                version: version.to_owned(),
                threshold,
                max_tps: raw.iter().copied().fold(f64::MIN, f64::max),
                raw,
            }
        })
        .collect()
}

fn read_sql(sql_dir: &Path, test_type: &str) -> Option<(String, String)> {
    let name = format!("{test_type}.sql");
    let content = fs::read_to_string(sql_dir.join(&name)).ok()?;
    debug!("Embedding {name}");
    Some((name, content))
}

fn x_heading(category: Category, x: u64) -> String {
    match category {
        Category::ConnectionsEqualJobs => {
            format!("{}, {}", plural_word(x, "Connection"), plural_word(x, "Job"))
        }
        Category::FixedConnections(c) => format!("{c} Connections, {}", plural_word(x, "Job")),
    }
}

fn plural_word(count: u64, word: &str) -> String {
    plural(count as usize, word)
}

fn write_test(
    out: &mut fmt::Formatter<'_>,
    category: Category,
    test_type: &str,
    points: &[&Point],
    sql_dir: &Path,
    baseline: &str,
) -> fmt::Result {
    match read_sql(sql_dir, test_type) {
        Some((name, content)) => {
            writeln!(out, "### TEST `{name}`\n")?;
            writeln!(out, "```sql")?;
            writeln!(out, "{}", content.trim_end_matches('\n'))?;
            writeln!(out, "```\n")?;
        }
        None => writeln!(out, "### Test: {}\n", title_case(test_type))?,
    }

    for x in points.iter().map(|p| p.x).sorted().dedup() {
        writeln!(out, "#### {}\n", x_heading(category, x))?;

        let x_points = points.iter().filter(|p| p.x == x).copied().collect::<Vec<_>>();
        let stats = combo_stats(&x_points);
        let Some(base) = stats.iter().find(|s| s.version == baseline) else {
            writeln!(out, "- No {baseline} baseline found for this configuration\n")?;
            continue;
        };
        let baseline_max = base.max_tps;

        for s in stats
            .iter()
            .sorted_by(|a, b| (&a.version, a.threshold).cmp(&(&b.version, b.threshold)))
        {
            let change = if s.version == baseline {
                "(baseline)".to_owned()
            } else {
                format_change(s.max_tps, baseline_max)
            };
            let raw = s.raw.iter().map(|v| round_tps(*v).to_string()).join(", ");
            writeln!(
                out,
                "- **{}**: {} TPS {change} `{{{raw}}}`",
                combo_label(&s.version, s.threshold, baseline),
                round_tps(s.max_tps)
            )?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Max TPS per version for every test type and x value, compared against the
/// baseline version.
pub fn render_markdown(
    records: &[RawResultRecord],
    fixed_connections: u64,
    sql_dir: &Path,
    baseline: &str,
) -> String {
    MarkdownSummary {
        records,
        fixed_connections,
        sql_dir,
        baseline,
    }
    .to_string()
}

struct MarkdownSummary<'a> {
    records: &'a [RawResultRecord],
    fixed_connections: u64,
    sql_dir: &'a Path,
    baseline: &'a str,
}

impl fmt::Display for MarkdownSummary<'_> {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let &MarkdownSummary {
            records,
            fixed_connections,
            sql_dir,
            baseline,
        } = self;
        writeln!(out, "# Performance Results Summary\n")?;

        for category in Category::all(fixed_connections) {
            let points = category_points(records, category);
            if points.is_empty() {
                continue;
            }
            writeln!(out, "## {}\n", category.heading())?;

            for test_type in points.iter().map(|p| p.test_type.as_str()).sorted().dedup() {
                let test_points = points
                    .iter()
                    .filter(|p| p.test_type == test_type)
                    .collect::<Vec<_>>();
                write_test(out, category, test_type, &test_points, sql_dir, baseline)?;
            }
        }
        Ok(())
    }
}
