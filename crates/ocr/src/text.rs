use regex::Regex;
use std::sync::OnceLock;

fn re_space_runs() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"[ \t]+").expect("invalid regex"))
}

/// Tidy raw OCR output: collapse runs of spaces/tabs, keep at most two
/// consecutive blank lines, trim the ends. Line structure is preserved since
/// the regex patterns rely on it.
pub fn clean_ocr_text(raw: &str) -> String {
    let mut lines = Vec::new();
    let mut blank_run = 0;

    for line in raw.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run <= 2 {
                lines.push(String::new());
            }
        } else {
            blank_run = 0;
            lines.push(re_space_runs().replace_all(line.trim_end(), " ").into_owned());
        }
    }

    lines.join("\n").trim().to_string()
}
