use super::{CodeExtractor, Extraction};
use regex::Regex;

/// Extractor keyed on Markdown code fences.
///
/// Picks the longest fenced block in the response; when no fence is present
/// it falls back to treating the whole response as code with a confidence
/// score derived from how code-shaped the lines look.
pub struct FencedExtractor {
    fence: Regex,
}

impl FencedExtractor {
    pub fn new() -> Self {
        Self {
            // Language tag, then everything up to the closing fence.
            fence: Regex::new(r"(?s)```([A-Za-z0-9_+#.-]*)[ \t]*\r?\n(.*?)```")
                .expect("fence regex is valid"),
        }
    }

    /// Fraction of non-empty lines that end or start like source code.
    fn code_shape_score(text: &str) -> f64 {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            return 0.0;
        }
        let code_like = lines
            .iter()
            .filter(|line| {
                let t = line.trim();
                t.ends_with(';')
                    || t.ends_with('{')
                    || t.ends_with('}')
                    || t.starts_with("fn ")
                    || t.starts_with("pub ")
                    || t.starts_with("use ")
                    || t.starts_with("def ")
                    || t.starts_with("class ")
                    || t.starts_with("import ")
                    || t.starts_with("#include")
                    || t.starts_with("//")
                    || t.starts_with('#')
            })
            .count();
        code_like as f64 / lines.len() as f64
    }
}

impl Default for FencedExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeExtractor for FencedExtractor {
    fn extract(&self, text: &str) -> Extraction {
        let mut best: Option<&str> = None;
        for captures in self.fence.captures_iter(text) {
            if let Some(body) = captures.get(2) {
                let body = body.as_str();
                if best.is_none_or(|current| body.len() > current.len()) {
                    best = Some(body);
                }
            }
        }

        if let Some(code) = best {
            return Extraction {
                code: code.to_string(),
                confidence: 0.9,
                used_delimiters: true,
            };
        }

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Extraction {
                code: String::new(),
                confidence: 0.0,
                used_delimiters: false,
            };
        }

        // No fences; the response may still be bare code.
        let shape = Self::code_shape_score(trimmed);
        Extraction {
            code: trimmed.to_string(),
            confidence: (0.2 + 0.5 * shape).min(0.7),
            used_delimiters: false,
        }
    }

    fn clean(&self, code: &str, language: Option<&str>) -> String {
        let mut out = code.trim().to_string();

        // A truncated-then-continued response can leave a dangling fence.
        if let Some(rest) = out.strip_prefix("```") {
            let rest = match rest.split_once('\n') {
                Some((first_line, body)) if first_line.trim().len() <= 16 => body,
                _ => rest,
            };
            out = rest.to_string();
        }
        if let Some(rest) = out.strip_suffix("```") {
            out = rest.to_string();
        }

        // A stray tag line can survive when the model restarts its block.
        if let Some(lang) = language {
            if let Some(rest) = out.trim_start().strip_prefix(lang) {
                if rest.starts_with('\n') {
                    out = rest[1..].to_string();
                }
            }
        }

        let mut out = out.trim_end().to_string();
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_longest_fenced_block() {
        let text = "Here is the code:\n```rust\nfn main() {}\n```\nand a helper:\n```rust\nfn helper() {\n    println!(\"hi\");\n}\n```\n";
        let extraction = FencedExtractor::new().extract(text);
        assert!(extraction.used_delimiters);
        assert!(extraction.code.contains("helper"));
        assert!(extraction.confidence > 0.8);
    }

    #[test]
    fn bare_code_gets_reduced_confidence() {
        let text = "use std::fmt;\n\nfn main() {\n    println!(\"ok\");\n}\n";
        let extraction = FencedExtractor::new().extract(text);
        assert!(!extraction.used_delimiters);
        assert!(extraction.confidence > 0.2);
        assert!(extraction.confidence < 0.9);
        assert_eq!(extraction.code, text.trim());
    }

    #[test]
    fn empty_response_scores_zero() {
        let extraction = FencedExtractor::new().extract("   \n ");
        assert_eq!(extraction.code, "");
        assert_eq!(extraction.confidence, 0.0);
    }

    #[test]
    fn prose_scores_below_code() {
        let prose = "I am sorry, I cannot produce that program for you today.";
        let extraction = FencedExtractor::new().extract(prose);
        assert!(extraction.confidence < 0.5);
    }

    #[test]
    fn clean_strips_dangling_fences() {
        let extractor = FencedExtractor::new();
        let cleaned = extractor.clean("```rust\nfn main() {}\n```", Some("rust"));
        assert_eq!(cleaned, "fn main() {}\n");

        let cleaned = extractor.clean("fn main() {}\n```", None);
        assert_eq!(cleaned, "fn main() {}\n");
    }

    #[test]
    fn clean_is_idempotent_on_plain_code() {
        let extractor = FencedExtractor::new();
        let cleaned = extractor.clean("fn main() {}\n", None);
        assert_eq!(cleaned, "fn main() {}\n");
    }
}
