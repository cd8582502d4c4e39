//! Terminal output formatting with colors.

use colored::Colorize;

use crate::analysis::{BlueResult, MultiBlueResult};

/// Format a scalar combination for human-readable terminal output.
///
/// Negative weights are highlighted: they are legitimate in BLUE but signal
/// strongly correlated inputs worth a second look.
pub fn format_blue(result: &BlueResult) -> String {
    let mut output = String::new();
    let sep = "\u{2500}".repeat(62);

    output.push_str("blue-combine\n");
    output.push_str(&sep);
    output.push_str("\n\n");

    output.push_str(&format!(
        "  {}\n",
        format!("Combined: {:.6} \u{00B1} {:.6}", result.value, result.unc).bold()
    ));
    output.push_str(&format!(
        "  Fit: {}\n\n",
        format_chi2(result.chi2, result.ndf)
    ));

    output.push_str("  Weights:\n");
    for (i, weight) in result.weights.iter().enumerate() {
        output.push_str(&format!(
            "    {:<24} {}\n",
            entry_label(&result.entries, i),
            format_weight(*weight)
        ));
    }

    if !result.breakdown.is_empty() {
        output.push('\n');
        output.push_str("  Uncertainty breakdown:\n");
        for contribution in &result.breakdown {
            output.push_str(&format!(
                "    {:<24} {:.6}\n",
                contribution.name, contribution.unc
            ));
        }
    }

    output.push('\n');
    output.push_str(&sep);
    output.push('\n');
    output
}

/// Format a multi-observable combination for human-readable terminal output.
pub fn format_multi(result: &MultiBlueResult) -> String {
    let mut output = String::new();
    let sep = "\u{2500}".repeat(62);

    output.push_str("blue-combine (multi-observable)\n");
    output.push_str(&sep);
    output.push_str("\n\n");

    for (o, name) in result.observables.iter().enumerate() {
        output.push_str(&format!(
            "  {:<20} {}\n",
            name,
            format!("{:.6} \u{00B1} {:.6}", result.values[o], result.uncs[o]).bold()
        ));
    }
    output.push_str(&format!(
        "\n  Fit: {}\n\n",
        format_chi2(result.chi2, result.ndf)
    ));

    output.push_str("  Weights:\n");
    for i in 0..result.weights.ncols() {
        let row: Vec<String> = (0..result.weights.nrows())
            .map(|o| format_weight(result.weights[(o, i)]))
            .collect();
        output.push_str(&format!(
            "    {:<24} {}\n",
            entry_label(&result.entries, i),
            row.join("  ")
        ));
    }

    output.push('\n');
    output.push_str(&sep);
    output.push('\n');
    output
}

fn entry_label(entries: &[String], i: usize) -> String {
    entries
        .get(i)
        .cloned()
        .unwrap_or_else(|| format!("#{}", i))
}

fn format_weight(weight: f64) -> String {
    let text = format!("{:>+9.4}", weight);
    if weight < 0.0 {
        text.yellow().to_string()
    } else {
        text
    }
}

/// χ²/ndf colored by how far it is from one.
fn format_chi2(chi2: f64, ndf: usize) -> String {
    let text = format!("\u{03C7}\u{00B2}/ndf = {:.3}/{}", chi2, ndf);
    if ndf == 0 {
        return text;
    }
    let reduced = chi2 / ndf as f64;
    if reduced <= 2.0 {
        text.green().to_string()
    } else if reduced <= 4.0 {
        text.yellow().to_string()
    } else {
        text.red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Matrix, Vector};

    #[test]
    fn test_format_blue() {
        colored::control::set_override(false);
        let result = BlueResult {
            entries: vec!["atlas[0]".to_string()],
            value: 10.5,
            unc: 1.5,
            weights: Vector::from_vec(vec![1.2, -0.2]),
            chi2: 0.3,
            ndf: 1,
            breakdown: Vec::new(),
        };
        let output = format_blue(&result);
        assert!(output.contains("blue-combine"));
        assert!(output.contains("Combined: 10.500000 \u{00B1} 1.500000"));
        assert!(output.contains("atlas[0]"));
        // Second entry has no label.
        assert!(output.contains("#1"));
        assert!(output.contains("-0.2000"));
        assert!(!output.contains("breakdown"));
    }

    #[test]
    fn test_format_multi() {
        colored::control::set_override(false);
        let result = MultiBlueResult {
            observables: vec!["a".to_string(), "b".to_string()],
            entries: Vec::new(),
            values: Vector::from_vec(vec![1.0, 2.0]),
            uncs: Vector::from_vec(vec![0.1, 0.2]),
            weights: Matrix::from_row_slice(2, 3, &[0.5, 0.5, 0.0, 0.0, 0.0, 1.0]),
            chi2: 0.0,
            ndf: 1,
        };
        let output = format_multi(&result);
        assert!(output.contains("multi-observable"));
        assert!(output.contains("2.000000 \u{00B1} 0.200000"));
        assert!(output.contains("#2"));
    }
}
