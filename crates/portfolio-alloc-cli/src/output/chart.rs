use colored::Colorize;

const BAR_WIDTH: usize = 40;
const BAR: char = '█';

/// One bar of the allocation chart.
#[derive(Debug, Clone)]
pub struct ChartBar {
    pub ticker: String,
    pub weight: f64,
    pub amount: String,
}

/// Horizontal bar chart of the allocation, one row per asset.
///
/// ```text
/// Optimized Portfolio Allocation (Investment: $10000)
/// AAPL  ████████████████████████                 $6000.00 (60.0%)
/// MSFT  ████████████████                         $4000.00 (40.0%)
/// ```
pub fn render_chart(bars: &[ChartBar], investment_amount: &str, color: bool) -> String {
    let label_width = bars.iter().map(|b| b.ticker.len()).max().unwrap_or(0);
    let mut out = format!(
        "Optimized Portfolio Allocation (Investment: ${})\n",
        investment_amount
    );

    for bar in bars {
        let filled = bar_length(bar.weight);
        let body: String = std::iter::repeat(BAR).take(filled).collect();
        let body = if color {
            body.green().to_string()
        } else {
            body
        };
        out.push_str(&format!(
            "{:<label$}  {}{}  ${} ({:.1}%)\n",
            bar.ticker,
            body,
            " ".repeat(BAR_WIDTH - filled),
            bar.amount,
            bar.weight * 100.0,
            label = label_width
        ));
    }
    out
}

pub fn print_chart(bars: &[ChartBar], investment_amount: &str) {
    println!();
    print!("{}", render_chart(bars, investment_amount, true));
}

/// Weights outside [0, 1] (from a failed solve) are drawn clipped.
fn bar_length(weight: f64) -> usize {
    if !weight.is_finite() {
        return 0;
    }
    (weight.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bar(ticker: &str, weight: f64, amount: &str) -> ChartBar {
        ChartBar {
            ticker: ticker.into(),
            weight,
            amount: amount.into(),
        }
    }

    #[test]
    fn test_bar_lengths_follow_weights() {
        let chart = render_chart(
            &[bar("AAPL", 0.75, "7500.00"), bar("TSLA", 0.25, "2500.00")],
            "10000",
            false,
        );
        let lines: Vec<&str> = chart.lines().collect();
        assert_eq!(lines[0], "Optimized Portfolio Allocation (Investment: $10000)");
        assert_eq!(lines[1].matches(BAR).count(), 30);
        assert_eq!(lines[2].matches(BAR).count(), 10);
        assert!(lines[1].ends_with("$7500.00 (75.0%)"));
        assert!(lines[2].starts_with("TSLA  "));
    }

    #[test]
    fn test_out_of_range_weights_clipped() {
        assert_eq!(bar_length(1.3), BAR_WIDTH);
        assert_eq!(bar_length(-0.2), 0);
        assert_eq!(bar_length(f64::NAN), 0);
    }
}
