//! URL fetching and web search.

use std::fmt::Write as _;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::config::Limits;

const SEARCH_ENDPOINT: &str = "https://api.duckduckgo.com/";
const SEARCH_TOPICS: usize = 5;
const TOPIC_CHARS: usize = 100;

pub(super) async fn fetch(http: &reqwest::Client, limits: &Limits, url: &str) -> String {
    let url = if url.starts_with("http") {
        url.to_string()
    } else {
        format!("https://{url}")
    };

    tracing::info!(url = %url, "fetching web content");

    let response = match http
        .get(&url)
        .timeout(Duration::from_secs(limits.fetch_timeout_secs))
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return format!("Error: {e}"),
    };

    let is_html = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("html"));

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return format!("Error: {e}"),
    };

    let content = if is_html { html_to_text(&body) } else { body };
    format_fetched(&url, &content, limits.fetch_bytes)
}

fn format_fetched(url: &str, content: &str, max_bytes: usize) -> String {
    let mut out = format!("URL: {url} ({} bytes)\n", content.len());
    if content.len() > max_bytes {
        out.push_str(truncate_at_boundary(content, max_bytes));
        out.push_str("\n... (truncated)");
    } else {
        out.push_str(content);
    }
    out
}

#[derive(Debug, Deserialize)]
struct InstantAnswer {
    #[serde(rename = "Abstract", default)]
    abstract_text: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
struct RelatedTopic {
    #[serde(rename = "Text")]
    text: Option<String>,
}

pub(super) async fn search(http: &reqwest::Client, limits: &Limits, query: &str) -> String {
    let url = match reqwest::Url::parse_with_params(
        SEARCH_ENDPOINT,
        [("q", query), ("format", "json"), ("no_html", "1")],
    ) {
        Ok(url) => url,
        Err(e) => return format!("Error: {e}"),
    };

    tracing::info!(query = %query, "searching the web");

    let response = match http
        .get(url)
        .timeout(Duration::from_secs(limits.search_timeout_secs))
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return format!("Error: {e}"),
    };

    match response.json::<InstantAnswer>().await {
        Ok(answer) => format_answer(query, &answer),
        Err(e) => format!("Error: {e}"),
    }
}

fn format_answer(query: &str, answer: &InstantAnswer) -> String {
    let mut out = format!("Search: {query}\n");
    if !answer.abstract_text.is_empty() {
        let _ = writeln!(out, "\n{}", answer.abstract_text);
    }

    let topics: Vec<&str> = answer
        .related_topics
        .iter()
        .filter_map(|t| t.text.as_deref())
        .filter(|t| !t.is_empty())
        .take(SEARCH_TOPICS)
        .collect();

    if answer.abstract_text.is_empty() && topics.is_empty() {
        out.push_str("No results");
        return out;
    }

    for topic in topics {
        if topic.chars().count() > TOPIC_CHARS {
            let short: String = topic.chars().take(TOPIC_CHARS).collect();
            let _ = writeln!(out, "• {short}...");
        } else {
            let _ = writeln!(out, "• {topic}");
        }
    }
    out
}

/// Longest prefix of `s` no longer than `max` bytes that ends on a char boundary.
fn truncate_at_boundary(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

static SCRIPT_STYLE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").ok());
static BLOCK_TAGS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)<(br|p|div|h[1-6]|li|tr)[^>]*>").ok());
static ANY_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]+>").ok());
static BLANKS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[ \t]+").ok());
static EXTRA_NEWLINES: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n{3,}").ok());

fn replace_all(re: Option<&Regex>, text: &str, with: &str) -> String {
    match re {
        Some(re) => re.replace_all(text, with).into_owned(),
        None => text.to_string(),
    }
}

/// Strip markup from an HTML page, keeping rough paragraph structure.
pub(super) fn html_to_text(html: &str) -> String {
    let text = replace_all(SCRIPT_STYLE.as_ref(), html, "");
    let text = replace_all(BLOCK_TAGS.as_ref(), &text, "\n");
    let text = replace_all(ANY_TAG.as_ref(), &text, "");

    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'");

    let text = replace_all(BLANKS.as_ref(), &text, " ");
    let text = text.lines().map(str::trim).collect::<Vec<_>>().join("\n");
    replace_all(EXTRA_NEWLINES.as_ref(), &text, "\n\n").trim().to_string()
}
