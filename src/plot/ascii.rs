//! ASCII plotting for terminal output and text figure files.
//!
//! Fixed-size character grids, so output is deterministic:
//! - treated series: `*`
//! - synthetic series: `-`
//! - zero line (gap plot): `.`
//! - intervention month: `|`

use chrono::NaiveDate;

/// Treated vs synthetic over the evaluation months.
pub fn render_series_plot(
    dates: &[NaiveDate],
    treated: &[f64],
    synthetic: &[f64],
    t0: NaiveDate,
    width: usize,
    height: usize,
) -> String {
    let Some((y_min, y_max)) = finite_range(treated.iter().chain(synthetic.iter()).copied()) else {
        return "Plot: (no data)\n".to_string();
    };
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);
    let (width, height) = (width.max(10), height.max(5));

    let mut grid = vec![vec![' '; width]; height];
    draw_series(&mut grid, treated, y_min, y_max, '*');
    draw_series(&mut grid, synthetic, y_min, y_max, '-');
    draw_marker(&mut grid, dates, t0);

    let mut out = header(dates, y_min, y_max, t0);
    out.push_str("Legend: * treated | - synthetic | '|' t0\n");
    push_grid(&mut out, grid);
    out
}

/// Treated-minus-synthetic gap with a zero reference line.
pub fn render_gap_plot(dates: &[NaiveDate], gap: &[f64], t0: NaiveDate, width: usize, height: usize) -> String {
    let Some((y_min, y_max)) = finite_range(gap.iter().copied().chain(std::iter::once(0.0))) else {
        return "Plot: (no data)\n".to_string();
    };
    if dates.is_empty() {
        return "Plot: (no data)\n".to_string();
    }
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);
    let (width, height) = (width.max(10), height.max(5));

    let mut grid = vec![vec![' '; width]; height];
    draw_series(&mut grid, gap, y_min, y_max, '*');
    let zero = map_y(0.0, y_min, y_max, height);
    draw_line(&mut grid, 0, zero, width - 1, zero, '.');
    draw_marker(&mut grid, dates, t0);

    let mut out = header(dates, y_min, y_max, t0);
    out.push_str("Legend: * gap | . zero | '|' t0\n");
    push_grid(&mut out, grid);
    out
}

/// Horizontal histogram of the finite `values`, flagging the bin that holds `marker`.
pub fn render_histogram(values: &[f64], marker: Option<f64>, bins: usize, bar_width: usize) -> String {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return "Histogram: (no finite values)\n".to_string();
    }
    let marker = marker.filter(|m| m.is_finite());
    let bins = bins.max(1);
    let bar_width = bar_width.max(1);

    let Some((mut lo, mut hi)) = finite_range(finite.iter().copied().chain(marker)) else {
        return "Histogram: (no finite values)\n".to_string();
    };
    if hi - lo <= f64::EPSILON * lo.abs().max(1.0) {
        lo -= 0.5;
        hi += 0.5;
    }
    let step = (hi - lo) / bins as f64;
    let bin_of = |v: f64| (((v - lo) / step).floor().max(0.0) as usize).min(bins - 1);

    let mut counts = vec![0usize; bins];
    for &v in &finite {
        counts[bin_of(v)] += 1;
    }
    let max_count = counts.iter().copied().max().unwrap_or(0).max(1);
    let marker_bin = marker.map(bin_of);

    let mut out = format!("Histogram: n={} | bins={bins}\n", finite.len());
    for (i, &count) in counts.iter().enumerate() {
        let bar_len = ((count as f64 / max_count as f64) * bar_width as f64).round() as usize;
        let bar = "#".repeat(bar_len);
        let mut line = format!(
            "{:>10.3} .. {:>10.3} | {:<bar_width$} {count}",
            lo + step * i as f64,
            lo + step * (i + 1) as f64,
            bar,
        );
        if marker_bin == Some(i) {
            line.push_str(" <- treated");
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn header(dates: &[NaiveDate], y_min: f64, y_max: f64, t0: NaiveDate) -> String {
    let first = dates.first().map(|d| d.to_string()).unwrap_or_default();
    let last = dates.last().map(|d| d.to_string()).unwrap_or_default();
    format!("Plot: {first}..{last} | y=[{y_min:.2}, {y_max:.2}] | t0={t0}\n")
}

fn push_grid(out: &mut String, grid: Vec<Vec<char>>) {
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
}

fn finite_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(i: usize, n: usize, width: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    let u = i as f64 / (n - 1) as f64;
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // Row 0 is the top of the plot.
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

/// Connect consecutive finite points; a non-finite value breaks the line.
fn draw_series(grid: &mut [Vec<char>], values: &[f64], y_min: f64, y_max: f64, ch: char) {
    let height = grid.len();
    let width = grid[0].len();
    let n = values.len();

    let mut prev = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            prev = None;
            continue;
        }
        let x = map_x(i, n, width);
        let y = map_y(v, y_min, y_max, height);
        match prev {
            Some((x0, y0)) => draw_line(grid, x0, y0, x, y, ch),
            None => draw_line(grid, x, y, x, y, ch),
        }
        prev = Some((x, y));
    }
}

fn draw_marker(grid: &mut [Vec<char>], dates: &[NaiveDate], t0: NaiveDate) {
    let idx = dates.partition_point(|d| *d < t0);
    if idx >= dates.len() {
        return;
    }
    let x = map_x(idx, dates.len(), grid[0].len());
    let bottom = grid.len() - 1;
    draw_line(grid, x, 0, x, bottom, '|');
}

/// Integer line drawing (Bresenham); only fills blank cells.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
