//! Elevation statistics and a text histogram for diagnostics.

use std::fmt::Write;

use serde::Serialize;

use crate::tilemap::Tilemap;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistogramBin {
    pub start: f32,
    pub end: f32,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeightStats {
    pub count: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub median: f32,
    pub std_dev: f64,
    /// Cells strictly below sea level
    pub below_sea_level: usize,
    pub bins: Vec<HistogramBin>,
}

impl HeightStats {
    /// Statistics over every cell. `num_bins` is clamped to 5..=50.
    /// Returns `None` for an empty grid.
    pub fn compute(heights: &Tilemap<f32>, num_bins: usize) -> Option<Self> {
        Self::from_values(heights.as_slice().to_vec(), num_bins)
    }

    /// Statistics over the valid cells of a grid with no-data markers.
    pub fn compute_valid(cells: &Tilemap<Option<f32>>, num_bins: usize) -> Option<Self> {
        Self::from_values(cells.as_slice().iter().flatten().copied().collect(), num_bins)
    }

    fn from_values(mut heights: Vec<f32>, num_bins: usize) -> Option<Self> {
        if heights.is_empty() {
            return None;
        }
        let num_bins = num_bins.clamp(5, 50);
        let count = heights.len();

        let mut min_h = f32::MAX;
        let mut max_h = f32::MIN;
        let mut sum = 0.0f64;
        for &h in &heights {
            min_h = min_h.min(h);
            max_h = max_h.max(h);
            sum += h as f64;
        }
        let mean = sum / count as f64;

        let variance: f64 = heights
            .iter()
            .map(|h| {
                let diff = *h as f64 - mean;
                diff * diff
            })
            .sum::<f64>()
            / count as f64;

        heights.sort_by(f32::total_cmp);
        let median = if count % 2 == 0 {
            (heights[count / 2 - 1] + heights[count / 2]) / 2.0
        } else {
            heights[count / 2]
        };

        let below_sea_level = heights.iter().filter(|h| **h < 0.0).count();

        // Flat grids collapse into the first bin
        let range = max_h - min_h;
        let bin_width = if range > 0.0 { range / num_bins as f32 } else { 1.0 };
        let mut counts = vec![0usize; num_bins];
        for h in &heights {
            let idx = (((*h - min_h) / bin_width) as usize).min(num_bins - 1);
            counts[idx] += 1;
        }
        let bins = counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| HistogramBin {
                start: min_h + i as f32 * bin_width,
                end: min_h + (i + 1) as f32 * bin_width,
                count,
            })
            .collect();

        Some(Self {
            count,
            min: min_h,
            max: max_h,
            mean,
            median,
            std_dev: variance.sqrt(),
            below_sea_level,
            bins,
        })
    }

    /// Boxed text report with one bar per bin.
    pub fn report(&self, title: &str) -> String {
        let mut out = String::new();
        let max_bin = self.bins.iter().map(|b| b.count).max().unwrap_or(1).max(1);
        let bar_max_width = 40;
        let above = self.count - self.below_sea_level;

        let _ = writeln!(out, "╔{}╗", "═".repeat(70));
        let _ = writeln!(out, "║ {:^68} ║", title);
        let _ = writeln!(out, "╠{}╣", "═".repeat(70));
        let _ = writeln!(
            out,
            "║   Min: {:>10.2}m   Max: {:>10.2}m   Range: {:>10.2}m{:>11}║",
            self.min,
            self.max,
            self.max - self.min,
            ""
        );
        let _ = writeln!(
            out,
            "║   Mean: {:>9.2}m   Median: {:>8.2}m   Std Dev: {:>8.2}m{:>10}║",
            self.mean, self.median, self.std_dev, ""
        );
        let _ = writeln!(
            out,
            "║   Above sea level: {:>8} ({:>5.1}%)   Below: {:>8} ({:>5.1}%){:>4}║",
            above,
            100.0 * above as f64 / self.count as f64,
            self.below_sea_level,
            100.0 * self.below_sea_level as f64 / self.count as f64,
            ""
        );
        let _ = writeln!(out, "╠{}╣", "═".repeat(70));

        for bin in &self.bins {
            let bar_len = bin.count * bar_max_width / max_bin;
            let pct = 100.0 * bin.count as f64 / self.count as f64;
            let marker = if bin.start <= 0.0 && bin.end > 0.0 { "◄SEA" } else { "    " };
            let _ = writeln!(
                out,
                "║ {:>8.0} - {:>7.0}m │{:<40}│{:>5.1}% {} ║",
                bin.start,
                bin.end,
                "█".repeat(bar_len),
                pct,
                marker
            );
        }
        let _ = writeln!(out, "╚{}╝", "═".repeat(70));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_statistics() {
        let map = Tilemap::from_vec(5, 1, vec![-10.0, 0.0, 10.0, 20.0, 30.0]).unwrap();
        let stats = HeightStats::compute(&map, 5).unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, -10.0);
        assert_eq!(stats.max, 30.0);
        assert_eq!(stats.median, 10.0);
        assert!((stats.mean - 10.0).abs() < 1e-9);
        assert_eq!(stats.below_sea_level, 1);
        assert_eq!(stats.bins.iter().map(|b| b.count).sum::<usize>(), 5);
        assert_eq!(stats.bins[4].count, 1);
    }

    #[test]
    fn test_flat_and_empty() {
        let flat = Tilemap::new_with(3, 3, 7.0f32);
        let stats = HeightStats::compute(&flat, 10).unwrap();
        assert_eq!(stats.bins[0].count, 9);
        assert_eq!(stats.std_dev, 0.0);

        let empty: Tilemap<Option<f32>> = Tilemap::new_with(2, 2, None);
        assert!(HeightStats::compute_valid(&empty, 10).is_none());
    }

    #[test]
    fn test_report_mentions_title() {
        let map = Tilemap::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let text = HeightStats::compute(&map, 5).unwrap().report("SMOOTHED ELEVATION");
        assert!(text.contains("SMOOTHED ELEVATION"));
        assert_eq!(text.lines().count(), 8 + 5);
    }
}
