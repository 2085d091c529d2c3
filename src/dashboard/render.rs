use chrono::{DateTime, Utc};
use std::fmt::Write;

use super::board::{LineBoard, local_time};
use crate::model::LineId;

const STYLE: &str = "body{font-family:sans-serif;margin:2em}\
table{border-collapse:collapse;margin-bottom:1em}\
td,th{border:1px solid #ccc;padding:2px 8px;text-align:left}";

/// Escapes text for use in HTML element content and quoted attributes.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title>\
         <style>{STYLE}</style></head><body>\n{body}</body></html>\n",
        escape(title)
    )
}

fn last_update(observed_at: Option<DateTime<Utc>>) -> String {
    match observed_at {
        Some(at) => format!("<p>Last updated: {} (New York)</p>\n", local_time(at)),
        None => "<p>No data yet.</p>\n".to_string(),
    }
}

/// Landing page: one link per line with stored data, and the refresh button.
pub fn index(lines: &[LineId], last_observed_at: Option<DateTime<Utc>>) -> String {
    let mut body = String::from("<h1>MTA Subway Real-Time Tracker</h1>\n");
    body.push_str(&last_update(last_observed_at));
    body.push_str(
        "<form method=\"post\" action=\"/refresh\">\
         <button type=\"submit\">Refresh Live Data</button></form>\n",
    );

    if lines.is_empty() {
        body.push_str("<p>No data in the database. Refresh to begin.</p>\n");
    } else {
        body.push_str("<ul>\n");
        for line in lines {
            let line = escape(line.as_str());
            let _ = writeln!(body, "<li><a href=\"/lines/{line}\">{line}</a></li>");
        }
        body.push_str("</ul>\n");
    }

    page("Subway Tracker", &body)
}

/// Per-line page: one section per direction, one table per train.
pub fn line_page(board: &LineBoard) -> String {
    let line = escape(board.line.as_str());
    let mut body = format!("<p><a href=\"/\">All lines</a></p>\n<h1>Line {line}</h1>\n");
    body.push_str(&last_update(board.observed_at));
    let _ = writeln!(body, "<p>{} trains in service</p>", board.train_count());

    for direction in &board.directions {
        let _ = writeln!(body, "<h2>{}</h2>", direction.label);
        if direction.trains.is_empty() {
            let _ = writeln!(body, "<p>No {} trains found.</p>", direction.label.to_lowercase());
            continue;
        }

        for train in &direction.trains {
            let _ = writeln!(body, "<h3>Train ID: {}</h3>", escape(&train.trip_id));
            if let Some(status) = &train.status {
                let _ = writeln!(body, "<p>{}</p>", escape(status));
            }
            body.push_str("<table><tr><th>Station</th><th>Est. Arrival</th></tr>\n");
            for stop in &train.stops {
                let _ = writeln!(
                    body,
                    "<tr><td>{}</td><td>{}</td></tr>",
                    escape(&stop.stop_name),
                    stop.arrival_local
                );
            }
            body.push_str("</table>\n");
        }
    }

    page(&format!("Line {}", board.line), &body)
}
