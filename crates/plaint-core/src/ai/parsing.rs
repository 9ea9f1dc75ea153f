//! Cleanup helpers for model responses
//!
//! Models wrap short answers in code fences, quotes or labels such as
//! `输出：` no matter how firmly the prompt asks them not to. These helpers
//! reduce a response to the bare answer.

/// Labels a model may put in front of its answer
const ANSWER_LABELS: &[&str] = &[
    "输出", "类别", "分类", "回复", "表达式", "答案", "output", "category", "reply", "answer",
    "expression", "filter",
];

/// Quote pairs stripped from around a whole answer
const QUOTE_PAIRS: &[(char, char)] = &[
    ('"', '"'),
    ('\'', '\''),
    ('`', '`'),
    ('“', '”'),
    ('‘', '’'),
    ('「', '」'),
];

/// Reduce a response to its bare answer
pub fn clean_response(response: &str) -> String {
    let mut text = strip_code_fence(response.trim()).trim().to_string();
    text = strip_label(&text).trim().to_string();
    strip_quotes(&text).trim().to_string()
}

/// Map a classification answer onto a known category
///
/// Exact match first, then the longest known category mentioned anywhere in
/// the answer, else the fallback.
pub fn parse_category(response: &str, categories: &[&str], fallback: &str) -> String {
    let answer = clean_response(response);
    let answer = answer.trim_end_matches(&['。', '.', '!', '！'][..]);

    if let Some(exact) = categories
        .iter()
        .chain(std::iter::once(&fallback))
        .find(|c| c.eq_ignore_ascii_case(answer))
    {
        return exact.to_string();
    }

    let mut by_length: Vec<&&str> = categories.iter().collect();
    by_length.sort_by_key(|c| std::cmp::Reverse(c.chars().count()));
    let lowered = answer.to_lowercase();
    by_length
        .into_iter()
        .find(|c| lowered.contains(&c.to_lowercase()))
        .map(|c| c.to_string())
        .unwrap_or_else(|| fallback.to_string())
}

/// Clean a generated reply (empty when the model said nothing useful)
pub fn parse_reply(response: &str) -> String {
    clean_response(response)
}

/// Extract a filter expression from a query-translation answer
///
/// Multi-line expressions are joined; blank answers mean "no filter".
pub fn parse_filter_expression(response: &str) -> String {
    let cleaned = clean_response(response);
    cleaned
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_code_fence(text: &str) -> &str {
    let Some(after_open) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an info string such as ```python
    let body = match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        None => after_open,
    };
    match body.rfind("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

fn strip_label(text: &str) -> &str {
    for label in ANSWER_LABELS {
        let Some(prefix) = text.get(..label.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(label) {
            continue;
        }
        let rest = text[label.len()..].trim_start();
        if let Some(after) = rest.strip_prefix('：').or_else(|| rest.strip_prefix(':')) {
            return after;
        }
    }
    text
}

fn strip_quotes(text: &str) -> &str {
    for (open, close) in QUOTE_PAIRS {
        if let Some(inner) = text
            .strip_prefix(*open)
            .and_then(|rest| rest.strip_suffix(*close))
        {
            // Only a single quoted literal, not an expression starting and ending with quotes
            if !inner.contains(*open) && !inner.contains(*close) {
                return inner;
            }
        }
    }
    text
}
