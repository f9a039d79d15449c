//! Results-marker detection in child output.
//!
//! The external executables announce their artifact with a single line
//! containing `Results saved to <path>`. The match is kept in one place so
//! the contract can be hardened later without touching the supervisor's
//! control flow.

/// Literal marker the executables emit before the artifact path.
pub const RESULTS_MARKER: &str = "Results saved to ";

/// Extract the results-file path from an output line, if present.
///
/// Matches the marker anywhere in the line and takes the trimmed remainder,
/// so executables that prepend timestamps or log levels keep working.
pub fn parse_results_marker(line: &str) -> Option<&str> {
    let (_, rest) = line.split_once(RESULTS_MARKER)?;
    let path = rest.trim();
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_plain_marker_line() {
        assert_eq!(parse_results_marker("Results saved to out.csv"), Some("out.csv"));
    }

    #[test]
    fn matches_marker_mid_line() {
        assert_eq!(
            parse_results_marker("[12:01:33] INFO Results saved to results/run_7.csv"),
            Some("results/run_7.csv")
        );
    }

    #[test]
    fn trims_trailing_whitespace() {
        assert_eq!(parse_results_marker("Results saved to out.csv \t"), Some("out.csv"));
    }

    #[test]
    fn ignores_unrelated_lines() {
        assert_eq!(parse_results_marker("verifying part number 1234"), None);
        assert_eq!(parse_results_marker("results were saved elsewhere"), None);
    }

    #[test]
    fn rejects_marker_with_no_path() {
        assert_eq!(parse_results_marker("Results saved to "), None);
    }
}
