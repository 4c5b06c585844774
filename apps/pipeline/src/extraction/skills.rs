use regex::Regex;

/// Case-insensitive whole-word matching of `skills` against `text`.
///
/// Returns the matched skills in caller order. No fuzzy or synonym matching:
/// "js" does not match "javascript". Word edges are any non-alphanumeric
/// character, so symbol-bearing skills like "c++" or "node.js" still match.
pub fn skills_found(text: &str, skills: &[String]) -> Vec<String> {
    let mut found = Vec::new();
    for skill in skills {
        let needle = skill.trim();
        if needle.is_empty() || found.iter().any(|f: &String| f.eq_ignore_ascii_case(needle)) {
            continue;
        }
        let pattern = format!(
            r"(?i)(?:^|[^\p{{L}}\p{{N}}]){}(?:$|[^\p{{L}}\p{{N}}])",
            regex::escape(needle)
        );
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        if re.is_match(text) {
            found.push(needle.to_string());
        }
    }
    found
}
