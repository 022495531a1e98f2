//! Cleanup of free-text recognizer output
//!
//! OCR reads whatever is printed on the label, so the serial usually comes
//! back wrapped in a caption ("S/N: XJ990021") and edge noise from the crop
//! border. Cleanup strips the known captions and the noise.

use serde::{Deserialize, Serialize};

/// Captions stripped from OCR output unless configured otherwise
pub const DEFAULT_LABEL_PREFIXES: [&str; 3] = ["S/N:", "SN:", "Serial"];

/// Where a label caption is allowed to match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StripMode {
    /// Remove the first occurrence anywhere in the text
    #[default]
    Substring,
    /// Remove only when the text starts with it
    Prefix,
}

/// Cleanup filter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cleanup {
    prefixes: Vec<String>,
    mode: StripMode,
    prune_edges: bool,
}

impl Default for Cleanup {
    fn default() -> Self {
        Self::new(
            DEFAULT_LABEL_PREFIXES.iter().map(|p| p.to_string()).collect(),
            StripMode::default(),
            true,
        )
    }
}

impl Cleanup {
    pub fn new(prefixes: Vec<String>, mode: StripMode, prune_edges: bool) -> Self {
        let prefixes = prefixes.into_iter().filter(|p| !p.is_empty()).collect();
        Self {
            prefixes,
            mode,
            prune_edges,
        }
    }

    pub fn mode(&self) -> StripMode {
        self.mode
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Clean recognizer output
    ///
    /// Passes repeat until the text stops changing, so
    /// `apply(apply(s)) == apply(s)` for every input. Every pass that changes
    /// the text makes it strictly shorter.
    pub fn apply(&self, raw: &str) -> String {
        let mut current = raw.to_string();
        loop {
            let next = self.pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn pass(&self, text: &str) -> String {
        let mut text = text.trim().to_string();

        for prefix in &self.prefixes {
            match self.mode {
                StripMode::Substring => {
                    if let Some(pos) = text.find(prefix.as_str()) {
                        text.replace_range(pos..pos + prefix.len(), "");
                    }
                }
                StripMode::Prefix => {
                    if let Some(rest) = text.strip_prefix(prefix.as_str()) {
                        text = rest.to_string();
                    }
                }
            }
            text = text.trim().to_string();
        }

        if self.prune_edges {
            text = text
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_string();
        }

        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix_mode() -> Cleanup {
        Cleanup::new(
            DEFAULT_LABEL_PREFIXES.iter().map(|p| p.to_string()).collect(),
            StripMode::Prefix,
            true,
        )
    }

    #[test]
    fn test_strips_serial_caption() {
        let cleanup = Cleanup::default();
        assert_eq!(cleanup.apply("S/N: XJ990021"), "XJ990021");
        assert_eq!(cleanup.apply("  SN:ABC-77 \n"), "ABC-77");
        assert_eq!(cleanup.apply("Serial 5544"), "5544");
    }

    #[test]
    fn test_substring_mode_strips_inside_text() {
        let cleanup = Cleanup::default();
        // Observed behaviour: the caption is removed wherever it appears
        assert_eq!(cleanup.apply("MODEL7 SN:99"), "MODEL7 99");
    }

    #[test]
    fn test_prefix_mode_keeps_inner_matches() {
        let cleanup = prefix_mode();
        assert_eq!(cleanup.apply("S/N: XJ990021"), "XJ990021");
        assert_eq!(cleanup.apply("ABCSN:99"), "ABCSN:99");
    }

    #[test]
    fn test_prunes_edge_noise() {
        let cleanup = Cleanup::default();
        assert_eq!(cleanup.apply("|~XJ990021.;"), "XJ990021");
        assert_eq!(cleanup.apply("--AB-12--"), "AB-12");
    }

    #[test]
    fn test_edge_pruning_can_be_disabled() {
        let cleanup = Cleanup::new(vec!["S/N:".to_string()], StripMode::Substring, false);
        assert_eq!(cleanup.apply("S/N: [XJ99]"), "[XJ99]");
    }

    #[test]
    fn test_noise_only_cleans_to_empty() {
        let cleanup = Cleanup::default();
        assert_eq!(cleanup.apply("  S/N: ... "), "");
        assert_eq!(cleanup.apply(""), "");
    }

    #[test]
    fn test_idempotent_on_tricky_inputs() {
        let inputs = [
            "S/S/N:N:X1",
            "SN:SN:SN:42",
            "-SN:123",
            ". Serial S/N: 7 .",
            "SerialSerial",
            "XJ990021",
            "  ",
            "ÄÖ-ü SN: Ωmega",
        ];

        for cleanup in [Cleanup::default(), prefix_mode()] {
            for input in inputs {
                let once = cleanup.apply(input);
                assert_eq!(cleanup.apply(&once), once, "input {:?}", input);
            }
        }
    }

    #[test]
    fn test_nested_caption_fully_removed() {
        let cleanup = Cleanup::default();
        assert_eq!(cleanup.apply("S/S/N:N:X1"), "X1");
    }

    #[test]
    fn test_empty_prefixes_ignored() {
        let cleanup = Cleanup::new(vec![String::new()], StripMode::Substring, true);
        assert!(cleanup.prefixes().is_empty());
        assert_eq!(cleanup.apply("ABC"), "ABC");
    }
}
