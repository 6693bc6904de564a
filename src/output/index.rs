//! `index.html` generation
//!
//! A single static page listing every stored snapshot in store order,
//! with a link to each file relative to the output directory.

use crate::output::traits::StoredPage;
use chrono::{DateTime, Utc};

const STYLE: &str = "body{font-family:Arial,sans-serif;line-height:1.6;margin:0;padding:20px;}\
h1{color:#2c3e50;}.header{margin-bottom:30px;}.url-list{list-style-type:none;padding:0;}\
.url-item{margin-bottom:10px;padding:10px;background:#f5f5f5;border-radius:4px;}\
.url-item a{color:#2980b9;text-decoration:none;}.timestamp{color:#7f8c8d;font-size:0.9em;}";

/// Formats the index page
///
/// # Arguments
///
/// * `pages` - Stored pages in the order they should be listed
/// * `generated_at` - Timestamp shown in the header
pub fn format_index(pages: &[StoredPage], generated_at: DateTime<Utc>) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"UTF-8\">\n");
    html.push_str("<title>Unfurl Crawl Results</title>\n");
    html.push_str(&format!("<style>{}</style>\n", STYLE));
    html.push_str("</head>\n<body>\n");

    html.push_str("<div class=\"header\">\n<h1>Unfurl Crawl Results</h1>\n");
    html.push_str(&format!(
        "<p class=\"timestamp\">Generated on: {}</p>\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str(&format!("<p>Total pages: {}</p>\n</div>\n", pages.len()));

    html.push_str("<ul class=\"url-list\">\n");
    for page in pages {
        html.push_str(&format!(
            "<li class=\"url-item\"><a href=\"{}\" target=\"_blank\">{}</a></li>\n",
            escape(&page.location),
            escape(&page.url)
        ));
    }
    html.push_str("</ul>\n</body>\n</html>\n");

    html
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
