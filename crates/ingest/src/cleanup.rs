use regex::Regex;
use std::collections::HashMap;

/// Clean extracted page texts in place: drop repeating headers/footers,
/// repair hyphenated line wraps, normalize bullets and whitespace.
/// Operates on all pages together because header/footer detection needs
/// cross-page line frequencies.
pub fn cleanup_pages(page_texts: &mut [String], max_header_fraction: f32) {
    let per_page_lines: Vec<Vec<String>> = page_texts
        .iter()
        .map(|text| {
            text.lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect()
        })
        .collect();

    let repeated = repeated_lines(&per_page_lines, max_header_fraction);

    for (page, lines) in page_texts.iter_mut().zip(per_page_lines) {
        let kept: Vec<String> = lines
            .into_iter()
            .filter(|l| !repeated.contains_key(l.as_str()))
            .collect();
        let joined = fix_hyphenation(kept);
        *page = normalize_lines(joined);
    }
}

/// Lines that show up on more than `max_fraction` of pages are page
/// furniture (running headers, footers, page numbers in templates), not
/// content.
fn repeated_lines(pages: &[Vec<String>], max_fraction: f32) -> HashMap<String, usize> {
    if pages.len() < 3 {
        return HashMap::new();
    }

    let mut page_counts: HashMap<String, usize> = HashMap::new();
    for lines in pages {
        let mut seen: Vec<&String> = lines.iter().collect();
        seen.sort();
        seen.dedup();
        for line in seen {
            *page_counts.entry(line.clone()).or_insert(0) += 1;
        }
    }

    let cutoff = (max_fraction * pages.len() as f32).ceil() as usize;
    page_counts.retain(|_, count| *count > cutoff.max(1));
    page_counts
}

/// Join lines broken by end-of-line hyphenation in PDF text layers.
fn fix_hyphenation(lines: Vec<String>) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();

    for line in lines {
        if line.ends_with('-') && !line.ends_with("--") {
            buf.push_str(&line[..line.len() - 1]);
        } else {
            buf.push_str(&line);
            out.push(std::mem::take(&mut buf));
        }
    }
    if !buf.is_empty() {
        out.push(buf);
    }
    out
}

fn normalize_lines(lines: Vec<String>) -> String {
    let bullet = Regex::new(r"^[\u{2022}\u{2023}\u{25E6}\u{2043}\-\*]\s+").unwrap();
    let spaces = Regex::new(r"\s+").unwrap();

    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let line = bullet.replace(&line, "").replace('\u{00A0}', " ");
        let line = spaces.replace_all(&line, " ").trim().to_string();
        if !line.is_empty() {
            out.push(line);
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_removed_across_pages() {
        let mut pages = vec![
            "ACME ANNUAL REPORT\nAlice works at Acme.".to_string(),
            "ACME ANNUAL REPORT\nAcme is in Springfield.".to_string(),
            "ACME ANNUAL REPORT\nRevenue grew.".to_string(),
        ];
        cleanup_pages(&mut pages, 0.5);
        assert_eq!(pages[0], "Alice works at Acme.");
        assert!(!pages[2].contains("ANNUAL REPORT"));
    }

    #[test]
    fn test_hyphenation_repaired() {
        let mut pages = vec!["The organi-\nzation grew fast.".to_string()];
        cleanup_pages(&mut pages, 0.2);
        assert_eq!(pages[0], "The organization grew fast.");
    }

    #[test]
    fn test_bullets_and_nbsp_normalized() {
        let mut pages = vec!["\u{2022} first\u{00A0}item\n* second  item".to_string()];
        cleanup_pages(&mut pages, 0.2);
        assert_eq!(pages[0], "first item\nsecond item");
    }
}
